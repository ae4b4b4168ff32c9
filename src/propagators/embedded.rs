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

use super::{AdaptiveStepSize, SystemStateError, TerminationCondition};
use crate::cosmic::SystemState;
use crate::linalg::Vector3;
use hifitime::{Duration, Epoch, Unit};

/// Coefficients of an embedded explicit Runge-Kutta method.
///
/// `A_COEFFS` is the flattened strict lower triangle of the Butcher tableau;
/// `B_COEFFS` holds the higher-order weights followed by the lower-order
/// ones, so that the difference of the two halves weighs the error estimate.
pub trait EmbeddedRk {
    /// Order of the propagating (higher-order) solution.
    const ORDER: u8;
    const STAGES: usize;
    const A_COEFFS: &'static [f64];
    const B_COEFFS: &'static [f64];
}

/// The Dormand-Prince 5(4) embedded method.
#[allow(clippy::excessive_precision)]
pub struct DormandPrince54;

impl EmbeddedRk for DormandPrince54 {
    const ORDER: u8 = 5;
    const STAGES: usize = 7;
    const A_COEFFS: &'static [f64] = &[
        1.0 / 5.0,
        3.0 / 40.0,
        9.0 / 40.0,
        44.0 / 45.0,
        -56.0 / 15.0,
        32.0 / 9.0,
        19_372.0 / 6_561.0,
        -25_360.0 / 2_187.0,
        64_448.0 / 6_561.0,
        -212.0 / 729.0,
        9_017.0 / 3_168.0,
        -355.0 / 33.0,
        46_732.0 / 5_247.0,
        49.0 / 176.0,
        -5_103.0 / 18_656.0,
        35.0 / 384.0,
        0.0,
        500.0 / 1_113.0,
        125.0 / 192.0,
        -2_187.0 / 6_784.0,
        11.0 / 84.0,
    ];
    const B_COEFFS: &'static [f64] = &[
        35.0 / 384.0,
        0.0,
        500.0 / 1_113.0,
        125.0 / 192.0,
        -2_187.0 / 6_784.0,
        11.0 / 84.0,
        0.0,
        5_179.0 / 57_600.0,
        0.0,
        7_571.0 / 16_695.0,
        393.0 / 640.0,
        -92_097.0 / 339_200.0,
        187.0 / 2_100.0,
        1.0 / 40.0,
    ];
}

/// Advances `initial_state` until `t_final` with an embedded Runge-Kutta
/// method and the step control of `adaptive`, calling `append_state` at
/// every accepted step.
///
/// # Panics
/// Panics if `adaptive.first_time_step` is not strictly positive.
pub fn embedded_solve<M, A, P>(
    compute_acceleration: &mut A,
    append_state: &mut P,
    initial_state: &SystemState,
    t_final: Epoch,
    adaptive: &AdaptiveStepSize,
) -> TerminationCondition
where
    M: EmbeddedRk,
    A: FnMut(Epoch, &[Vector3<f64>], &mut [Vector3<f64>]),
    P: FnMut(&SystemState),
{
    assert!(
        adaptive.first_time_step > Duration::ZERO,
        "flow back to the future: {} <= {}",
        t_final,
        initial_state.time
    );

    let dimension = initial_state.len();
    let stages = M::STAGES;
    // The derivative of the positions is stored in kq, the derivative of the
    // velocities in kv.
    let mut kq = vec![vec![Vector3::zeros(); dimension]; stages];
    let mut kv = vec![vec![Vector3::zeros(); dimension]; stages];
    let mut trial_q = vec![Vector3::zeros(); dimension];
    let mut trial_v = vec![Vector3::zeros(); dimension];
    let mut candidate_q = vec![Vector3::zeros(); dimension];
    let mut candidate_v = vec![Vector3::zeros(); dimension];

    let mut state = initial_state.clone();
    let mut time_step = adaptive.first_time_step;
    let mut accepted: i64 = 0;

    loop {
        if state.time >= t_final {
            return TerminationCondition::Done;
        }
        if accepted >= adaptive.max_steps {
            return TerminationCondition::ReachedMaximalStepCount;
        }

        let remaining = t_final - state.time;
        let step = if time_step > remaining {
            remaining
        } else {
            time_step
        };
        let hs = step.to_seconds();

        kq[0].copy_from_slice(&state.velocities_km_s);
        compute_acceleration(state.time, &state.positions_km, &mut kv[0]);

        let mut a_idx = 0;
        for stage in 1..stages {
            let mut ci = 0.0;
            trial_q.copy_from_slice(&state.positions_km);
            trial_v.copy_from_slice(&state.velocities_km_s);
            for j in 0..stage {
                let a_ij = M::A_COEFFS[a_idx];
                a_idx += 1;
                ci += a_ij;
                if a_ij == 0.0 {
                    continue;
                }
                for body in 0..dimension {
                    trial_q[body] += hs * a_ij * kq[j][body];
                    trial_v[body] += hs * a_ij * kv[j][body];
                }
            }
            kq[stage].copy_from_slice(&trial_v);
            let stage_time = state.time + (ci * hs) * Unit::Second;
            compute_acceleration(stage_time, &trial_q, &mut kv[stage]);
        }

        candidate_q.copy_from_slice(&state.positions_km);
        candidate_v.copy_from_slice(&state.velocities_km_s);
        let mut error = SystemStateError {
            position_error_km: vec![Vector3::zeros(); dimension],
            velocity_error_km_s: vec![Vector3::zeros(); dimension],
        };
        for stage in 0..stages {
            let b_i = M::B_COEFFS[stage];
            let b_hat_i = M::B_COEFFS[stage + stages];
            let db_i = b_i - b_hat_i;
            for body in 0..dimension {
                candidate_q[body] += hs * b_i * kq[stage][body];
                candidate_v[body] += hs * b_i * kv[stage][body];
                error.position_error_km[body] += hs * db_i * kq[stage][body];
                error.velocity_error_km_s[body] += hs * db_i * kv[stage][body];
            }
        }

        let ratio = (adaptive.tolerance_to_error_ratio)(step, &error);
        if ratio >= 1.0 {
            state.time = state.time + step;
            state.positions_km.copy_from_slice(&candidate_q);
            state.velocities_km_s.copy_from_slice(&candidate_v);
            accepted += 1;
            append_state(&state);

            let factor = adaptive.safety_factor * ratio.powf(1.0 / f64::from(M::ORDER));
            let factor = if factor.is_finite() {
                factor.min(4.0)
            } else {
                4.0
            };
            time_step = (step.to_seconds() * factor) * Unit::Second;
        } else {
            let factor = adaptive.safety_factor * ratio.powf(1.0 / f64::from(M::ORDER - 1));
            let factor = if factor.is_finite() {
                factor.clamp(0.1, 0.9)
            } else {
                0.1
            };
            time_step = (step.to_seconds() * factor) * Unit::Second;
            if time_step < 1 * Unit::Nanosecond {
                return TerminationCondition::VanishingStepSize;
            }
        }
    }
}
