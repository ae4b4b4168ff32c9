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

use crate::cosmic::SystemState;
use crate::linalg::Vector3;
use hifitime::{Duration, Epoch, Unit};

/// Coefficients of a symplectic partitioned Runge-Kutta method for a
/// second-order equation of motion q̈ = f(t, q).
///
/// At stage i the velocities are kicked with weight `B_COEFFS[i]` using the
/// accelerations at the current positions, then the positions drift with
/// weight `A_COEFFS[i]` using the updated velocities.
pub trait Symplectic {
    const ORDER: u8;
    const STAGES: usize;
    const A_COEFFS: &'static [f64];
    const B_COEFFS: &'static [f64];
}

/// The optimal 5th order method of McLachlan and Atela (1992), for motion in
/// a position-dependent force field.
pub struct McLachlanAtela1992Order5Optimal;

impl Symplectic for McLachlanAtela1992Order5Optimal {
    const ORDER: u8 = 5;
    const STAGES: usize = 6;
    const A_COEFFS: &'static [f64] = &[
        0.339_839_625_839_110_000,
        -0.088_601_336_903_027_329,
        0.585_856_476_825_962_118_8,
        -0.603_039_356_536_491_888,
        0.323_580_796_554_697_639_4,
        0.442_363_794_219_749_458_7,
    ];
    const B_COEFFS: &'static [f64] = &[
        0.119_390_029_287_567_275_8,
        0.698_927_370_382_475_230_8,
        -0.171_312_358_271_600_775_4,
        0.401_269_502_251_353_448_0,
        0.010_705_081_848_235_984_0,
        -0.058_979_625_498_031_163_2,
    ];
}

/// Advances `initial_state` with fixed steps of `step` until the smallest
/// multiple of `step` from the initial time that is at or past `t_final`,
/// calling `append_state` at every completed step. Returns the final state.
///
/// # Panics
/// Panics if `step` is not strictly positive.
pub fn sprk_solve<M, A, P>(
    compute_acceleration: &mut A,
    append_state: &mut P,
    initial_state: &SystemState,
    t_final: Epoch,
    step: Duration,
) -> SystemState
where
    M: Symplectic,
    A: FnMut(Epoch, &[Vector3<f64>], &mut [Vector3<f64>]),
    P: FnMut(&SystemState),
{
    assert!(
        step > Duration::ZERO,
        "the fixed integration step must be strictly positive"
    );
    let mut state = initial_state.clone();
    let span = t_final - state.time;
    if span <= Duration::ZERO {
        return state;
    }
    let span_ns = span.total_nanoseconds();
    let step_ns = step.total_nanoseconds();
    let steps = ((span_ns + step_ns - 1) / step_ns) as i64;

    let dimension = state.len();
    let hs = step.to_seconds();
    let mut accelerations = vec![Vector3::zeros(); dimension];

    for completed in 0..steps {
        let step_start = state.time;
        let mut c = 0.0;
        for stage in 0..M::STAGES {
            let stage_time = step_start + (c * hs) * Unit::Second;
            compute_acceleration(stage_time, &state.positions_km, &mut accelerations);
            let a_i = M::A_COEFFS[stage];
            let b_i = M::B_COEFFS[stage];
            for body in 0..dimension {
                state.velocities_km_s[body] += hs * b_i * accelerations[body];
                state.positions_km[body] += hs * a_i * state.velocities_km_s[body];
            }
            c += a_i;
        }
        // Reconstruct the time from the initial one so that step boundaries
        // stay exact multiples of the step.
        state.time = initial_state.time
            + Duration::from_total_nanoseconds((completed as i128 + 1) * step_ns);
        append_state(&state);
    }

    state
}
