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

use crate::linalg::Vector3;
use hifitime::Epoch;
use serde::{Deserialize, Serialize};

/// Standard gravity acceleration, in m/s^2.
pub const STD_GRAVITY: f64 = 9.80665;

/// The pair (position, velocity) of a body at a given instant.
///
/// All positions are in kilometers and all velocities in kilometers per
/// second, in one common inertial frame shared by an entire simulation.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DegreesOfFreedom {
    pub position_km: Vector3<f64>,
    pub velocity_km_s: Vector3<f64>,
}

impl DegreesOfFreedom {
    pub fn new(position_km: Vector3<f64>, velocity_km_s: Vector3<f64>) -> Self {
        Self {
            position_km,
            velocity_km_s,
        }
    }

    /// A body at rest at the origin of the frame.
    pub fn origin() -> Self {
        Self::new(Vector3::zeros(), Vector3::zeros())
    }
}

/// The state of a full system of bodies at one instant, positions and
/// velocities indexed by body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    pub time: Epoch,
    pub positions_km: Vec<Vector3<f64>>,
    pub velocities_km_s: Vec<Vector3<f64>>,
}

impl SystemState {
    pub fn new(time: Epoch, degrees_of_freedom: &[DegreesOfFreedom]) -> Self {
        Self {
            time,
            positions_km: degrees_of_freedom.iter().map(|dof| dof.position_km).collect(),
            velocities_km_s: degrees_of_freedom
                .iter()
                .map(|dof| dof.velocity_km_s)
                .collect(),
        }
    }

    /// The state of a single body, e.g. a probe.
    pub fn single(time: Epoch, dof: DegreesOfFreedom) -> Self {
        Self::new(time, &[dof])
    }

    pub fn len(&self) -> usize {
        self.positions_km.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions_km.is_empty()
    }

    pub fn degrees_of_freedom(&self, index: usize) -> DegreesOfFreedom {
        DegreesOfFreedom::new(self.positions_km[index], self.velocities_km_s[index])
    }
}

/// The axisymmetric part of the gravity field of a body, truncated to the
/// second zonal harmonic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Oblateness {
    /// Unit vector along the axis of rotation, in the ambient frame.
    pub axis: Vector3<f64>,
    /// J₂ times the square of the reference radius, in km².
    pub j2_over_mu_km2: f64,
}

/// A celestial body with a gravitational parameter, either spherical or
/// oblate. Oblate bodies carry their symmetry axis and degree-2 zonal
/// coefficient.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MassiveBody {
    gravitational_parameter_km3_s2: f64,
    oblateness: Option<Oblateness>,
}

impl MassiveBody {
    /// Builds a spherically symmetric body.
    ///
    /// # Panics
    /// Panics if the gravitational parameter is not strictly positive.
    pub fn spherical(gravitational_parameter_km3_s2: f64) -> Self {
        assert!(
            gravitational_parameter_km3_s2 > 0.0,
            "gravitational parameter must be strictly positive"
        );
        Self {
            gravitational_parameter_km3_s2,
            oblateness: None,
        }
    }

    /// Builds an oblate body from its dimensionless J₂ coefficient, its
    /// reference (equatorial) radius, and its axis of rotation.
    ///
    /// # Panics
    /// Panics if the gravitational parameter, J₂ or the reference radius is
    /// not strictly positive, or if the axis is degenerate.
    pub fn oblate(
        gravitational_parameter_km3_s2: f64,
        j2: f64,
        reference_radius_km: f64,
        axis: Vector3<f64>,
    ) -> Self {
        assert!(
            gravitational_parameter_km3_s2 > 0.0,
            "gravitational parameter must be strictly positive"
        );
        assert!(j2 > 0.0, "J₂ must be strictly positive");
        assert!(
            reference_radius_km > 0.0,
            "reference radius must be strictly positive"
        );
        let norm = axis.norm();
        assert!(norm > 0.0, "the axis of rotation must not vanish");
        Self {
            gravitational_parameter_km3_s2,
            oblateness: Some(Oblateness {
                axis: axis / norm,
                j2_over_mu_km2: j2 * reference_radius_km * reference_radius_km,
            }),
        }
    }

    pub fn gravitational_parameter_km3_s2(&self) -> f64 {
        self.gravitational_parameter_km3_s2
    }

    pub fn is_oblate(&self) -> bool {
        self.oblateness.is_some()
    }

    pub fn oblateness(&self) -> Option<&Oblateness> {
        self.oblateness.as_ref()
    }
}
