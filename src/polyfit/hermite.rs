/*
    Erebus, blazing fast astrodynamics
    Copyright (C) 2023 Christopher Rabotin <christopher.rabotin@gmail.com>

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use crate::polyfit::polynomial::{multiply, Polynomial};
use crate::ErebusError;

/// Builds a polynomial interpolation matching both the values and the first
/// derivatives at every abscissa, using divided differences.
pub fn hermite<const DEGREE: usize>(
    xs: &[f64],
    ys: &[f64],
    derivs: &[f64],
) -> Result<Polynomial<DEGREE>, ErebusError> {
    if xs.is_empty() {
        return Err(ErebusError::InvalidInterpolationData(
            "No X data to interpolate".to_owned(),
        ));
    }
    if xs.len() != ys.len() {
        return Err(ErebusError::InvalidInterpolationData(
            "Lengths of X and Y data differ".to_owned(),
        ));
    }
    if xs.len() != derivs.len() {
        return Err(ErebusError::InvalidInterpolationData(
            "Lengths of X and its derivatives data differ".to_owned(),
        ));
    }

    if DEGREE < 2 * xs.len() - 1 {
        warn!(
            "Building Hermite interpolation of degree {} with {} samples, {} degree recommended",
            DEGREE,
            xs.len(),
            2 * xs.len() - 1
        );
    }

    let mut zs = vec![0.0; 2 * xs.len()];
    let mut qs = vec![0.0; 4 * xs.len() * xs.len()];

    for i in 0..xs.len() {
        zs[2 * i] = xs[i];
        zs[2 * i + 1] = xs[i];
        qs[2 * i] = ys[i];
        qs[2 * i + 1] = ys[i];
        qs[2 * i + 1 + (2 * xs.len())] = derivs[i];

        if i != 0 {
            qs[2 * i + (2 * xs.len())] = (qs[2 * i] - qs[2 * i - 1]) / (zs[2 * i] - zs[2 * i - 1]);
        }
    }

    for i in 2..2 * xs.len() {
        for j in 2..=i {
            qs[i + j * (2 * xs.len())] = (qs[i + (j - 1) * (2 * xs.len())]
                - qs[i - 1 + (j - 1) * (2 * xs.len())])
                / (zs[i] - zs[i - j]);
        }
    }

    let mut hermite = Polynomial::<DEGREE>::zeros();
    for i in (1..2 * xs.len()).rev() {
        hermite += qs[i + i * (2 * xs.len())];
        let new_poly = Polynomial::<2> {
            coefficients: [-xs[(i - 1) / 2], 1.0],
        };
        hermite = multiply::<DEGREE, 2, DEGREE>(hermite, new_poly);
    }
    hermite += qs[0];

    if hermite.is_nan() {
        return Err(ErebusError::InvalidInterpolationData(format!(
            "Hermite interpolation over {} samples yielded NaN coefficients",
            xs.len()
        )));
    }

    Ok(hermite)
}

/// The cubic obtained by Hermite interpolation of the values and derivatives
/// at both ends of an interval.
#[derive(Copy, Clone, Debug)]
pub struct Hermite3 {
    t0: f64,
    t1: f64,
    /// Coefficients of the powers of (t − t0).
    coefficients: [f64; 4],
}

impl Hermite3 {
    pub fn new(arguments: (f64, f64), values: (f64, f64), derivatives: (f64, f64)) -> Self {
        let (t0, t1) = arguments;
        let (v0, v1) = values;
        let (d0, d1) = derivatives;
        let h = t1 - t0;
        let delta_over_h = (v1 - v0) / h;
        let a2 = (3.0 * delta_over_h - 2.0 * d0 - d1) / h;
        let a3 = ((d0 + d1) - 2.0 * delta_over_h) / (h * h);
        Self {
            t0,
            t1,
            coefficients: [v0, d0, a2, a3],
        }
    }

    pub fn evaluate(&self, t: f64) -> f64 {
        let u = t - self.t0;
        let [a0, a1, a2, a3] = self.coefficients;
        ((a3 * u + a2) * u + a1) * u + a0
    }

    pub fn evaluate_derivative(&self, t: f64) -> f64 {
        let u = t - self.t0;
        let [_, a1, a2, a3] = self.coefficients;
        (3.0 * a3 * u + 2.0 * a2) * u + a1
    }

    /// Returns the abscissæ where the derivative vanishes, anywhere on the
    /// real line. The caller is responsible for filtering to its interval of
    /// interest.
    pub fn find_extrema(&self) -> Vec<f64> {
        let [_, a1, a2, a3] = self.coefficients;
        // Roots of 3 a3 u² + 2 a2 u + a1.
        if a3.abs() < f64::EPSILON {
            if a2.abs() < f64::EPSILON {
                return Vec::new();
            }
            return vec![self.t0 - a1 / (2.0 * a2)];
        }
        let discriminant = a2 * a2 - 3.0 * a3 * a1;
        if discriminant < 0.0 {
            return Vec::new();
        }
        let sqrt_discriminant = discriminant.sqrt();
        vec![
            self.t0 + (-a2 - sqrt_discriminant) / (3.0 * a3),
            self.t0 + (-a2 + sqrt_discriminant) / (3.0 * a3),
        ]
    }

    pub fn interval(&self) -> (f64, f64) {
        (self.t0, self.t1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hermite_sine() {
        let xs: Vec<_> = (0..8).map(|i| i as f64 / 4.0).collect();
        let ys: Vec<_> = xs.iter().map(|x| x.cos()).collect();
        let derivs: Vec<_> = xs.iter().map(|x| -x.sin()).collect();

        let poly = hermite::<16>(&xs, &ys, &derivs).unwrap();

        for i in 0..100 {
            let x = 1.75 * (i as f64) / 100.0;
            let (val, deriv) = poly.eval_n_deriv(x);
            assert!((val - x.cos()).abs() < 1e-9, "poly(x) off at {x}");
            assert!((deriv + x.sin()).abs() < 1e-7, "poly'(x) off at {x}");
        }
    }

    #[test]
    fn hermite3_recovers_cubic() {
        // f(t) = t³ − 2 t² + 5, on [1, 3]
        let f = |t: f64| t * t * t - 2.0 * t * t + 5.0;
        let fdot = |t: f64| 3.0 * t * t - 4.0 * t;
        let h3 = Hermite3::new((1.0, 3.0), (f(1.0), f(3.0)), (fdot(1.0), fdot(3.0)));
        for i in 0..=20 {
            let t = 1.0 + 2.0 * (i as f64) / 20.0;
            assert!((h3.evaluate(t) - f(t)).abs() < 1e-12);
            assert!((h3.evaluate_derivative(t) - fdot(t)).abs() < 1e-12);
        }
        // Extrema of f: t = 0 and t = 4/3.
        let extrema = h3.find_extrema();
        assert_eq!(extrema.len(), 2);
        assert!(extrema.iter().any(|t| (t - 4.0 / 3.0).abs() < 1e-12));
        assert!(extrema.iter().any(|t| t.abs() < 1e-12));
    }
}
