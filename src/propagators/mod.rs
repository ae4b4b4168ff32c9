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

/*! Integrators for the Newtonian motion equation.

Both integrators operate on a [`SystemState`](crate::cosmic::SystemState)
`(positions, velocities)` and are parameterised by two callbacks: a
"compute acceleration" function `(t, positions, &mut accelerations)` and a
"publish state" function called at every completed step. The fixed-step
integrator advances the massive-body problem; the adaptive-step integrator
advances massless probes.
*/

use crate::linalg::Vector3;
use hifitime::Duration;

mod sprk;
pub use sprk::{sprk_solve, McLachlanAtela1992Order5Optimal, Symplectic};

mod embedded;
pub use embedded::{embedded_solve, DormandPrince54, EmbeddedRk};

/// The local error estimate of one attempted adaptive step, separated into
/// its position and velocity components.
#[derive(Clone, Debug)]
pub struct SystemStateError {
    pub position_error_km: Vec<Vector3<f64>>,
    pub velocity_error_km_s: Vec<Vector3<f64>>,
}

/// Why an adaptive integration stopped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TerminationCondition {
    /// The final time was reached.
    Done,
    /// The step budget was exhausted before the final time.
    ReachedMaximalStepCount,
    /// The step size underflowed, which indicates a singularity of the
    /// equation of motion.
    VanishingStepSize,
}

/// The control parameters of one adaptive integration.
pub struct AdaptiveStepSize<'a> {
    /// The first step to attempt, usually the whole remaining interval.
    pub first_time_step: Duration,
    /// Multiplicative margin on step acceptance and adaptation, e.g. 0.9.
    pub safety_factor: f64,
    /// Bound on the number of accepted steps.
    pub max_steps: i64,
    /// Returns the smallest ratio of the tolerances to the actual error
    /// components; a step is accepted when this ratio is at least 1.
    pub tolerance_to_error_ratio: &'a dyn Fn(Duration, &SystemStateError) -> f64,
}
