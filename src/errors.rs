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

use thiserror::Error;

/// Represents all recoverable errors of this library.
///
/// Violations of documented preconditions (non-positive steps or tolerances,
/// out-of-window evaluations, fork-time mismatches) are _not_ represented
/// here: those are programming errors and cause a panic at the call site.
/// Numerical budget failures (an adaptive flow not reaching its target, an
/// anomalous flight plan) are reported as boolean returns by the functions
/// concerned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ErebusError {
    /// Occurs when the interpolation data is invalid, e.g. mismatched lengths.
    #[error("Invalid interpolation data: {0}")]
    InvalidInterpolationData(String),

    /// Occurs when a serialization record is inconsistent and cannot be read back.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}
