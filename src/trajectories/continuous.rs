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

use crate::cosmic::DegreesOfFreedom;
use crate::linalg::Vector3;
use crate::polyfit::{hermite, Polynomial};
use crate::utils::normalize;
use hifitime::{Duration, Epoch};

/// Number of subintervals covered by one fitted polynomial piece.
pub(crate) const DIVISIONS_PER_PIECE: usize = 8;
/// Samples per piece: the window boundaries are shared between pieces.
pub(crate) const SAMPLES_PER_PIECE: usize = DIVISIONS_PER_PIECE + 1;
/// Coefficients per coordinate polynomial, matching a full Hermite
/// interpolation of the window.
pub(crate) const PIECE_COEFFS: usize = 2 * SAMPLES_PER_PIECE;

/// One fitted polynomial piece, valid on [t_min, t_max], with the time
/// normalized to [-1, 1] over that interval.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Piece {
    pub(crate) t_min: Epoch,
    pub(crate) t_max: Epoch,
    pub(crate) x: Polynomial<PIECE_COEFFS>,
    pub(crate) y: Polynomial<PIECE_COEFFS>,
    pub(crate) z: Polynomial<PIECE_COEFFS>,
}

impl Piece {
    fn contains(&self, time: Epoch) -> bool {
        self.t_min <= time && time <= self.t_max
    }

    fn evaluate(&self, time: Epoch) -> DegreesOfFreedom {
        let span_s = (self.t_max - self.t_min).to_seconds();
        let tau = normalize((time - self.t_min).to_seconds(), 0.0, span_s);
        let dtau_dt = 2.0 / span_s;
        let (x, vx) = self.x.eval_n_deriv(tau);
        let (y, vy) = self.y.eval_n_deriv(tau);
        let (z, vz) = self.z.eval_n_deriv(tau);
        DegreesOfFreedom::new(
            Vector3::new(x, y, z),
            Vector3::new(vx, vy, vz) * dtau_dt,
        )
    }
}

/// An opaque cache which amortises the piece lookup across sequential
/// queries. Each caller holds its own hint; hints are never shared across
/// threads.
#[derive(Clone, Copy, Debug, Default)]
pub struct Hint {
    piece_index: usize,
}

/// A continuously-interpolatable trajectory of one massive body: a series of
/// polynomial pieces in time, appended to by the planetary integrator and
/// queried by the probe flows.
///
/// Within `[t_min, t_max]` the evaluation differs from the appended samples
/// by at most the fitting tolerance.
#[derive(Clone, Debug, PartialEq)]
pub struct ContinuousTrajectory {
    step: Duration,
    fitting_tolerance_km: f64,
    pub(crate) pieces: Vec<Piece>,
    /// Samples of the piece currently being assembled. Its first entry is
    /// the last sample of the previous piece, if any.
    pub(crate) pending: Vec<(Epoch, DegreesOfFreedom)>,
}

impl ContinuousTrajectory {
    /// # Panics
    /// Panics if the step or the fitting tolerance is not strictly positive.
    pub fn new(step: Duration, fitting_tolerance_km: f64) -> Self {
        assert!(
            step > Duration::ZERO,
            "the continuous trajectory step must be strictly positive"
        );
        assert!(
            fitting_tolerance_km > 0.0,
            "the fitting tolerance must be strictly positive"
        );
        Self {
            step,
            fitting_tolerance_km,
            pieces: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    pub fn fitting_tolerance_km(&self) -> f64 {
        self.fitting_tolerance_km
    }

    /// A trajectory is empty until its first polynomial piece is closed.
    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn t_min(&self) -> Option<Epoch> {
        self.pieces.first().map(|piece| piece.t_min)
    }

    pub fn t_max(&self) -> Option<Epoch> {
        self.pieces.last().map(|piece| piece.t_max)
    }

    /// Appends a sample; once enough samples accumulate a new polynomial
    /// piece is fitted and the evaluation window extends to cover it.
    ///
    /// # Panics
    /// Panics if `time` is not strictly after all previously appended times.
    pub fn append(&mut self, time: Epoch, dof: DegreesOfFreedom) {
        if let Some((last_time, _)) = self.pending.last() {
            assert!(
                time > *last_time,
                "samples must be appended in strictly increasing time order: {time} <= {last_time}"
            );
        }
        self.pending.push((time, dof));
        if self.pending.len() == SAMPLES_PER_PIECE {
            self.fit_pending_piece();
            // The window boundary seeds the next piece.
            self.pending.drain(..SAMPLES_PER_PIECE - 1);
        }
    }

    fn fit_pending_piece(&mut self) {
        let t_min = self.pending[0].0;
        let t_max = self.pending[SAMPLES_PER_PIECE - 1].0;
        let span_s = (t_max - t_min).to_seconds();
        let dt_dtau = span_s / 2.0;

        let mut taus = [0.0; SAMPLES_PER_PIECE];
        let mut values = [[0.0; SAMPLES_PER_PIECE]; 3];
        let mut derivatives = [[0.0; SAMPLES_PER_PIECE]; 3];
        for (i, (time, dof)) in self.pending.iter().enumerate() {
            taus[i] = normalize((*time - t_min).to_seconds(), 0.0, span_s);
            for axis in 0..3 {
                values[axis][i] = dof.position_km[axis];
                derivatives[axis][i] = dof.velocity_km_s[axis] * dt_dtau;
            }
        }

        let mut polynomials = [Polynomial::<PIECE_COEFFS>::zeros(); 3];
        for axis in 0..3 {
            let poly = hermite::<PIECE_COEFFS>(&taus, &values[axis], &derivatives[axis])
                .unwrap_or_else(|error| panic!("piece fitting failed: {error}"));
            let mut residual = 0.0_f64;
            for (i, tau) in taus.iter().enumerate() {
                residual = residual.max((poly.eval(*tau) - values[axis][i]).abs());
            }
            if residual > self.fitting_tolerance_km {
                warn!(
                    "fitted piece residual {residual} km exceeds the tolerance {} km",
                    self.fitting_tolerance_km
                );
            }
            polynomials[axis] = poly;
        }

        let [x, y, z] = polynomials;
        self.pieces.push(Piece {
            t_min,
            t_max,
            x,
            y,
            z,
        });
    }

    fn locate(&self, time: Epoch, hint: &mut Hint) -> usize {
        assert!(
            !self.pieces.is_empty(),
            "cannot evaluate an empty continuous trajectory at {time}"
        );
        let t_min = self.pieces[0].t_min;
        let t_max = self.pieces[self.pieces.len() - 1].t_max;
        assert!(
            t_min <= time && time <= t_max,
            "evaluation at {time} outside of [{t_min}, {t_max}]"
        );
        if let Some(piece) = self.pieces.get(hint.piece_index) {
            if piece.contains(time) {
                return hint.piece_index;
            }
        }
        let index = match self
            .pieces
            .binary_search_by(|piece| piece.t_min.cmp(&time))
        {
            Ok(index) => index,
            Err(index) => index - 1,
        };
        hint.piece_index = index;
        index
    }

    /// Evaluates the position at `time`.
    ///
    /// # Panics
    /// Panics if `time` is outside of `[t_min, t_max]`.
    pub fn evaluate_position(&self, time: Epoch, hint: &mut Hint) -> Vector3<f64> {
        self.evaluate_degrees_of_freedom(time, hint).position_km
    }

    /// Evaluates the position and velocity at `time`.
    ///
    /// # Panics
    /// Panics if `time` is outside of `[t_min, t_max]`.
    pub fn evaluate_degrees_of_freedom(&self, time: Epoch, hint: &mut Hint) -> DegreesOfFreedom {
        let index = self.locate(time, hint);
        self.pieces[index].evaluate(time)
    }

    /// Drops the polynomial pieces that lie entirely earlier than `time`.
    pub fn forget_before(&mut self, time: Epoch) {
        self.pieces.retain(|piece| piece.t_max >= time);
    }

    /// Truncates the trajectory to the pieces ending at or before `time` and
    /// restarts the pending window from `(time, dof)`. `time` must be a piece
    /// boundary of the remaining series.
    pub(crate) fn forget_after(&mut self, time: Epoch, dof: DegreesOfFreedom) {
        self.pieces.retain(|piece| piece.t_max <= time);
        if let Some(piece) = self.pieces.last() {
            assert_eq!(
                piece.t_max, time,
                "the rewind time must be a piece boundary"
            );
        }
        self.pending.clear();
        self.pending.push((time, dof));
    }
}
