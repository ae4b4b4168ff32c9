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

use crate::cosmic::{DegreesOfFreedom, STD_GRAVITY};
use crate::linalg::Vector3;
use hifitime::{Epoch, Unit};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Defines a thruster with a maximum isp and a maximum thrust.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thruster {
    /// The thrust is to be provided in Newtons
    pub thrust_n: f64,
    /// The Isp is to be provided in seconds
    pub isp_s: f64,
}

impl Thruster {
    /// Returns the exhaust velocity v_e in meters per second
    pub fn exhaust_velocity_m_s(&self) -> f64 {
        self.isp_s * STD_GRAVITY
    }
}

/// The frame in which the Δv of a burn is expressed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BurnFrame {
    /// The ambient inertial frame of the simulation.
    Inertial,
    /// Velocity / Normal / Cross frame of the coasting trajectory at the
    /// start of the burn: X along the velocity, Y along the orbital momentum,
    /// Z completing the triad.
    VelocityNormalBinormal,
}

/// The user-facing description of a manœuvre: a thruster, an ignition time
/// and a Δv in the chosen frame.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Burn {
    pub thruster: Thruster,
    pub initial_time: Epoch,
    pub delta_v_km_s: Vector3<f64>,
    pub frame: BurnFrame,
}

/// An immutable manœuvre value: a burn bound to the mass of the vehicle at
/// ignition, from which the duration, the mass flow and the intrinsic
/// acceleration all derive through the rocket equation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NavigationManoeuvre {
    burn: Burn,
    initial_mass_kg: f64,
    /// Unit thrust direction in the ambient frame; resolved against the
    /// coasting trajectory for a velocity-frame burn.
    direction: Option<Vector3<f64>>,
}

impl NavigationManoeuvre {
    /// # Panics
    /// Panics if the initial mass is not strictly positive, or if the
    /// thruster data is negative.
    pub fn new(burn: Burn, initial_mass_kg: f64) -> Self {
        assert!(
            initial_mass_kg > 0.0,
            "the initial mass must be strictly positive"
        );
        assert!(burn.thruster.thrust_n >= 0.0, "thrust cannot be negative");
        assert!(
            burn.thruster.isp_s > 0.0,
            "the specific impulse must be strictly positive"
        );
        let direction = match burn.frame {
            BurnFrame::Inertial => {
                let norm = burn.delta_v_km_s.norm();
                (norm > 0.0).then(|| burn.delta_v_km_s / norm)
            }
            BurnFrame::VelocityNormalBinormal => None,
        };
        Self {
            burn,
            initial_mass_kg,
            direction,
        }
    }

    pub fn burn(&self) -> &Burn {
        &self.burn
    }

    pub fn initial_time(&self) -> Epoch {
        self.burn.initial_time
    }

    pub fn thrust_n(&self) -> f64 {
        self.burn.thruster.thrust_n
    }

    pub fn specific_impulse_s(&self) -> f64 {
        self.burn.thruster.isp_s
    }

    pub fn initial_mass_kg(&self) -> f64 {
        self.initial_mass_kg
    }

    /// Magnitude of the Δv, in km/s.
    pub fn delta_v_km_s(&self) -> f64 {
        self.burn.delta_v_km_s.norm()
    }

    pub fn mass_flow_rate_kg_s(&self) -> f64 {
        self.burn.thruster.thrust_n / self.burn.thruster.exhaust_velocity_m_s()
    }

    /// Burn duration from the rocket equation, in seconds. Infinite when the
    /// Δv demands more mass than the vehicle has, or when the thrust
    /// vanishes.
    pub fn duration_s(&self) -> f64 {
        let exhaust_velocity = self.burn.thruster.exhaust_velocity_m_s();
        let delta_v_m_s = self.burn.delta_v_km_s.norm() * 1e3;
        let consumed_mass_kg = self.initial_mass_kg * (1.0 - (-delta_v_m_s / exhaust_velocity).exp());
        consumed_mass_kg * exhaust_velocity / self.burn.thruster.thrust_n
    }

    pub fn final_time(&self) -> Epoch {
        self.burn.initial_time + self.duration_s() * Unit::Second
    }

    pub fn final_mass_kg(&self) -> f64 {
        self.initial_mass_kg - self.mass_flow_rate_kg_s() * self.duration_s()
    }

    /// Mass of the vehicle while the burn is in progress, in kg.
    pub fn mass_kg(&self, t: Epoch) -> f64 {
        self.initial_mass_kg
            - self.mass_flow_rate_kg_s() * (t - self.burn.initial_time).to_seconds()
    }

    /// A manœuvre is singular when its duration is not finite, e.g. when the
    /// Δv demands accelerating the mass to infinity.
    pub fn is_singular(&self) -> bool {
        !self.duration_s().is_finite()
    }

    /// True iff the whole burn interval is contained in `[begin, end]`.
    pub fn fits_between(&self, begin: Epoch, end: Epoch) -> bool {
        begin <= self.initial_time() && self.final_time() <= end
    }

    /// Resolves the thrust direction in the ambient frame from the state of
    /// the coasting trajectory at ignition. Required before integrating a
    /// velocity-frame burn.
    pub fn set_coasting_state(&mut self, dof: DegreesOfFreedom) {
        if self.burn.frame == BurnFrame::Inertial {
            return;
        }
        let velocity = dof.velocity_km_s;
        let speed = velocity.norm();
        assert!(
            speed > 0.0,
            "cannot orient a velocity-frame burn on a vanishing velocity"
        );
        let v_hat = velocity / speed;
        let momentum = dof.position_km.cross(&velocity);
        let momentum_norm = momentum.norm();
        assert!(
            momentum_norm > 0.0,
            "cannot orient a velocity-frame burn on a degenerate orbit"
        );
        let n_hat = momentum / momentum_norm;
        let c_hat = v_hat.cross(&n_hat);
        let delta_v = self.burn.delta_v_km_s;
        let ambient = v_hat * delta_v[0] + n_hat * delta_v[1] + c_hat * delta_v[2];
        let norm = ambient.norm();
        self.direction = (norm > 0.0).then(|| ambient / norm);
    }

    /// Unit thrust direction in the ambient frame.
    ///
    /// # Panics
    /// Panics on a velocity-frame burn whose coasting state has not been
    /// resolved yet.
    pub fn direction(&self) -> Vector3<f64> {
        self.direction
            .unwrap_or_else(|| panic!("the direction of this manœuvre has not been resolved"))
    }

    /// The acceleration imparted by the thruster at `t`, in km/s²: zero
    /// outside `[initial_time, final_time]`, thrust over current mass along
    /// the burn direction inside.
    pub fn intrinsic_acceleration(&self, t: Epoch) -> Vector3<f64> {
        if t < self.initial_time() || t > self.final_time() {
            return Vector3::zeros();
        }
        match self.direction {
            None => Vector3::zeros(),
            Some(direction) => {
                // Thrust over mass is in m/s².
                direction * (self.burn.thruster.thrust_n / self.mass_kg(t) * 1e-3)
            }
        }
    }
}

impl fmt::Display for NavigationManoeuvre {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "manœuvre of {:.3} m/s at {} for {:.3} s ({:.1} N, Isp {:.1} s)",
            self.delta_v_km_s() * 1e3,
            self.initial_time(),
            self.duration_s(),
            self.thrust_n(),
            self.specific_impulse_s(),
        )
    }
}
