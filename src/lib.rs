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

/*! # erebus

Erebus maintains the gravitational state of a set of massive celestial bodies
over time and integrates the motion of massless probes through that field,
including user-planned thrust segments (flight plans).

The two central types are [`ephemeris::Ephemeris`], which owns the massive
bodies and their continuously-interpolatable trajectories, and
[`md::FlightPlan`], a validated sequence of coast and burn segments flown
through an ephemeris.
*/

/// Massive bodies, degrees of freedom and system states.
pub mod cosmic;

/// The ephemeris: massive bodies, their continuous trajectories, and probe flows.
pub mod ephemeris;

mod errors;
pub use self::errors::ErebusError;

/// Serialization records and configuration structures.
pub mod io;

/// Mission design: manœuvres and flight plans.
pub mod md;

/// Polynomial and fitting module.
pub mod polyfit;

/// Provides the fixed-step and adaptive-step integrators.
pub mod propagators;

/// Continuous (fitted) and discrete (sampled, forkable) trajectories.
pub mod trajectories;

/// Utility functions shared by different modules.
pub mod utils;

#[macro_use]
extern crate log;

/// Re-export of hifitime
pub mod time {
    pub use hifitime::*;
}

/// Re-export nalgebra
pub mod linalg {
    pub use nalgebra::base::*;
}

/// Re-export of the most common types.
pub mod prelude {
    pub use crate::cosmic::{DegreesOfFreedom, MassiveBody, SystemState};
    pub use crate::ephemeris::{
        AdaptiveStepParameters, Ephemeris, FixedStepParameters, UNLIMITED_MAX_EPHEMERIS_STEPS,
    };
    pub use crate::md::{Burn, BurnFrame, FlightPlan, NavigationManoeuvre, Thruster};
    pub use crate::trajectories::{DiscreteTrajectory, ForkId};
    pub use crate::ErebusError;
}
