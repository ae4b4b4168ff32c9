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

/*! The ephemeris owns a set of massive bodies and advances their N-body
problem with a fixed-step symplectic integrator, maintaining one
continuously-interpolatable trajectory per body. Massless probes are flown
through the resulting field with an adaptive-step integrator.
*/

use crate::cosmic::{DegreesOfFreedom, MassiveBody, Oblateness, SystemState};
use crate::linalg::Vector3;
use crate::polyfit::Hermite3;
use crate::propagators::{
    embedded_solve, sprk_solve, AdaptiveStepSize, DormandPrince54,
    McLachlanAtela1992Order5Optimal, SystemStateError, TerminationCondition,
};
use crate::trajectories::{ContinuousTrajectory, DiscreteTrajectory, ForkId, Hint};
use hifitime::{Duration, Epoch, Unit};
use serde::{Deserialize, Serialize};

/// Probe flows with this cap never limit how far the ephemeris is advanced.
pub const UNLIMITED_MAX_EPHEMERIS_STEPS: i64 = i64::MAX;

/// Rewind checkpoints are recorded at most this often.
const MAX_TIME_BETWEEN_INTERMEDIATE_STATES_DAYS: f64 = 180.0;

/// Identifies the fixed-step method advancing the massive bodies.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixedStepIntegratorId {
    McLachlanAtela1992Order5Optimal,
}

/// Identifies the adaptive-step method flying probes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdaptiveStepIntegratorId {
    DormandPrince54,
}

/// The integrator and step of the massive-body problem.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FixedStepParameters {
    integrator: FixedStepIntegratorId,
    step: Duration,
}

impl FixedStepParameters {
    /// # Panics
    /// Panics if the step is not strictly positive.
    pub fn new(integrator: FixedStepIntegratorId, step: Duration) -> Self {
        assert!(
            step > Duration::ZERO,
            "the fixed integration step must be strictly positive"
        );
        Self { integrator, step }
    }

    pub fn integrator(&self) -> FixedStepIntegratorId {
        self.integrator
    }

    pub fn step(&self) -> Duration {
        self.step
    }
}

/// The integrator, step budget and tolerances of one adaptive probe flow.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveStepParameters {
    integrator: AdaptiveStepIntegratorId,
    max_steps: i64,
    length_integration_tolerance_km: f64,
    speed_integration_tolerance_km_s: f64,
}

impl AdaptiveStepParameters {
    /// # Panics
    /// Panics if `max_steps` is not strictly positive or either tolerance is
    /// not strictly positive.
    pub fn new(
        integrator: AdaptiveStepIntegratorId,
        max_steps: i64,
        length_integration_tolerance_km: f64,
        speed_integration_tolerance_km_s: f64,
    ) -> Self {
        assert!(max_steps > 0, "max_steps must be strictly positive");
        assert!(
            length_integration_tolerance_km > 0.0,
            "the length integration tolerance must be strictly positive"
        );
        assert!(
            speed_integration_tolerance_km_s > 0.0,
            "the speed integration tolerance must be strictly positive"
        );
        Self {
            integrator,
            max_steps,
            length_integration_tolerance_km,
            speed_integration_tolerance_km_s,
        }
    }

    pub fn integrator(&self) -> AdaptiveStepIntegratorId {
        self.integrator
    }

    pub fn max_steps(&self) -> i64 {
        self.max_steps
    }

    pub fn length_integration_tolerance_km(&self) -> f64 {
        self.length_integration_tolerance_km
    }

    pub fn speed_integration_tolerance_km_s(&self) -> f64 {
        self.speed_integration_tolerance_km_s
    }

    pub fn set_length_integration_tolerance_km(&mut self, tolerance: f64) {
        assert!(tolerance > 0.0);
        self.length_integration_tolerance_km = tolerance;
    }

    pub fn set_speed_integration_tolerance_km_s(&mut self, tolerance: f64) {
        assert!(tolerance > 0.0);
        self.speed_integration_tolerance_km_s = tolerance;
    }
}

/// A persistent, extensible record of the positions and velocities of a set
/// of massive bodies, interpolatable at any instant within `[t_min, t_max]`.
///
/// Bodies are stored with the oblate ones first so that the inner loops of
/// the acceleration kernel specialise on the oblateness of each operand
/// without branching; the construction order remains the externally visible
/// one.
pub struct Ephemeris {
    /// Oblate bodies first, then spherical ones.
    bodies: Vec<MassiveBody>,
    trajectories: Vec<ContinuousTrajectory>,
    number_of_oblate_bodies: usize,
    /// Maps a construction (serialization) index to an internal index.
    construction_to_internal: Vec<usize>,
    /// Maps an internal index back to the construction order.
    internal_to_construction: Vec<usize>,
    pub(crate) last_state: SystemState,
    /// Chronologically ordered rewind checkpoints.
    pub(crate) intermediate_states: Vec<SystemState>,
    fitting_tolerance_km: f64,
    parameters: FixedStepParameters,
}

impl Ephemeris {
    /// Constructs an ephemeris over the provided bodies, which must all have
    /// their degrees of freedom given at `initial_time`.
    ///
    /// # Panics
    /// Panics if no body is provided, if the counts disagree, or if the
    /// fitting tolerance is not strictly positive.
    pub fn new(
        bodies: Vec<MassiveBody>,
        initial_state: &[DegreesOfFreedom],
        initial_time: Epoch,
        fitting_tolerance_km: f64,
        parameters: FixedStepParameters,
    ) -> Self {
        assert!(!bodies.is_empty(), "an ephemeris needs at least one body");
        assert_eq!(
            bodies.len(),
            initial_state.len(),
            "one set of degrees of freedom per body is required"
        );
        assert!(
            fitting_tolerance_km > 0.0,
            "the fitting tolerance must be strictly positive"
        );

        let total = bodies.len();
        let mut ephemeris = Self {
            bodies: Vec::with_capacity(total),
            trajectories: Vec::with_capacity(total),
            number_of_oblate_bodies: 0,
            construction_to_internal: vec![0; total],
            internal_to_construction: Vec::with_capacity(total),
            last_state: SystemState {
                time: initial_time,
                positions_km: Vec::with_capacity(total),
                velocities_km_s: Vec::with_capacity(total),
            },
            intermediate_states: Vec::new(),
            fitting_tolerance_km,
            parameters,
        };

        for (construction_index, (body, dof)) in
            bodies.into_iter().zip(initial_state.iter()).enumerate()
        {
            let mut trajectory = ContinuousTrajectory::new(parameters.step, fitting_tolerance_km);
            trajectory.append(initial_time, *dof);
            debug!(
                "constructed trajectory for body with μ = {} km³/s²",
                body.gravitational_parameter_km3_s2()
            );

            if body.is_oblate() {
                // Inserting at the beginning keeps the oblate bodies in the
                // range [0, number_of_oblate_bodies).
                let at = ephemeris.number_of_oblate_bodies;
                ephemeris.bodies.insert(at, body);
                ephemeris.trajectories.insert(at, trajectory);
                ephemeris.last_state.positions_km.insert(at, dof.position_km);
                ephemeris
                    .last_state
                    .velocities_km_s
                    .insert(at, dof.velocity_km_s);
                ephemeris.internal_to_construction.insert(at, construction_index);
                ephemeris.number_of_oblate_bodies += 1;
            } else {
                ephemeris.bodies.push(body);
                ephemeris.trajectories.push(trajectory);
                ephemeris.last_state.positions_km.push(dof.position_km);
                ephemeris.last_state.velocities_km_s.push(dof.velocity_km_s);
                ephemeris.internal_to_construction.push(construction_index);
            }
        }

        for (internal, construction) in ephemeris.internal_to_construction.iter().enumerate() {
            ephemeris.construction_to_internal[*construction] = internal;
        }

        ephemeris
    }

    /// Number of massive bodies.
    pub fn number_of_bodies(&self) -> usize {
        self.bodies.len()
    }

    /// The body at the provided construction index.
    pub fn body(&self, index: usize) -> &MassiveBody {
        &self.bodies[self.construction_to_internal[index]]
    }

    /// All bodies, in construction order.
    pub fn bodies(&self) -> Vec<&MassiveBody> {
        self.construction_to_internal
            .iter()
            .map(|internal| &self.bodies[*internal])
            .collect()
    }

    /// The continuous trajectory of the body at the provided construction
    /// index.
    pub fn trajectory(&self, index: usize) -> &ContinuousTrajectory {
        &self.trajectories[self.construction_to_internal[index]]
    }

    pub(crate) fn internal_index(&self, index: usize) -> usize {
        self.construction_to_internal[index]
    }

    pub(crate) fn trajectories(&self) -> &[ContinuousTrajectory] {
        &self.trajectories
    }

    pub(crate) fn trajectory_mut_internal(&mut self, internal: usize) -> &mut ContinuousTrajectory {
        &mut self.trajectories[internal]
    }

    pub(crate) fn replace_trajectories(&mut self, trajectories: Vec<ContinuousTrajectory>) {
        assert_eq!(trajectories.len(), self.bodies.len());
        self.trajectories = trajectories;
    }

    pub fn fitting_tolerance_km(&self) -> f64 {
        self.fitting_tolerance_km
    }

    pub fn parameters(&self) -> &FixedStepParameters {
        &self.parameters
    }

    pub fn last_state_time(&self) -> Epoch {
        self.last_state.time
    }

    /// True until the first polynomial piece of every body is closed.
    pub fn is_empty(&self) -> bool {
        self.trajectories
            .iter()
            .any(ContinuousTrajectory::is_empty)
    }

    /// The earliest time at which every trajectory can be evaluated.
    pub fn t_min(&self) -> Option<Epoch> {
        self.trajectories
            .iter()
            .map(ContinuousTrajectory::t_min)
            .try_fold(None::<Epoch>, |acc, t| {
                t.map(|t| Some(acc.map_or(t, |acc| acc.max(t))))
            })
            .flatten()
    }

    /// The latest time at which every trajectory can be evaluated.
    pub fn t_max(&self) -> Option<Epoch> {
        self.trajectories
            .iter()
            .map(ContinuousTrajectory::t_max)
            .try_fold(None::<Epoch>, |acc, t| {
                t.map(|t| Some(acc.map_or(t, |acc| acc.min(t))))
            })
            .flatten()
    }

    /// Advances the fixed-step integration until `t_max() >= t`.
    ///
    /// `t` may be at or before the time of the last integrated state; the
    /// integrator then still performs at least one step to make progress,
    /// since the series of the last polynomial piece may not be finalised
    /// until a further step forces its closure.
    pub fn prolong(&mut self, t: Epoch) {
        let step = self.parameters.step;
        let mut t_final = if t <= self.last_state.time {
            self.last_state.time + step
        } else {
            t
        };
        while self.t_max().map_or(true, |t_max| t_max < t) {
            self.flow_massive_bodies(t_final);
            t_final = t_final + step;
        }
    }

    fn flow_massive_bodies(&mut self, t_final: Epoch) {
        let step = self.parameters.step;
        let integrator = self.parameters.integrator;
        let initial = self.last_state.clone();
        let Self {
            bodies,
            trajectories,
            number_of_oblate_bodies,
            last_state,
            intermediate_states,
            ..
        } = self;
        let number_of_oblate_bodies = *number_of_oblate_bodies;

        let mut compute_acceleration =
            |_t: Epoch, positions: &[Vector3<f64>], accelerations: &mut [Vector3<f64>]| {
                compute_massive_bodies_gravitational_accelerations(
                    bodies,
                    number_of_oblate_bodies,
                    positions,
                    accelerations,
                );
            };
        let mut append_state = |state: &SystemState| {
            *last_state = state.clone();
            for (index, trajectory) in trajectories.iter_mut().enumerate() {
                trajectory.append(state.time, state.degrees_of_freedom(index));
            }

            // Record an intermediate state if we have not done so for too
            // long and this time closes a polynomial piece.
            if trajectories[0].t_max() == Some(state.time) {
                let stale = match intermediate_states.last() {
                    None => true,
                    Some(previous) => {
                        state.time - previous.time
                            > MAX_TIME_BETWEEN_INTERMEDIATE_STATES_DAYS * Unit::Day
                    }
                };
                if stale {
                    intermediate_states.push(state.clone());
                }
            }
        };

        match integrator {
            FixedStepIntegratorId::McLachlanAtela1992Order5Optimal => {
                sprk_solve::<McLachlanAtela1992Order5Optimal, _, _>(
                    &mut compute_acceleration,
                    &mut append_state,
                    &initial,
                    t_final,
                    step,
                );
            }
        }
    }

    /// Integrates the fork of `trajectory` with the adaptive-step method up
    /// to `t`, under massive-body gravity plus the provided intrinsic
    /// acceleration. At most `max_ephemeris_steps` fixed steps of background
    /// integration are performed, so that long flows stay responsive; the
    /// caller repeats the call with the same `t` to make further progress.
    ///
    /// Returns `true` iff the flow reached `t`.
    #[allow(clippy::type_complexity)]
    pub fn flow_with_adaptive_step(
        &mut self,
        trajectory: &mut DiscreteTrajectory,
        fork: ForkId,
        intrinsic_acceleration: Option<&dyn Fn(Epoch) -> Vector3<f64>>,
        t: Epoch,
        parameters: &AdaptiveStepParameters,
        max_ephemeris_steps: i64,
    ) -> bool {
        let step = self.parameters.step;
        let (last_time, last_dof) = trajectory
            .last(fork)
            .unwrap_or_else(|| panic!("cannot flow an empty trajectory"));

        // The min is here to prevent us from spending too much time
        // computing the ephemeris. The max ensures that we always try to
        // integrate forward. `last_state.time` is used because it is always
        // finite, contrary to `t_max()`, which is undefined when `empty()`.
        let ephemeris_limit =
            self.last_state.time + (max_ephemeris_steps as f64 * step.to_seconds()) * Unit::Second;
        let t_final = t.min(ephemeris_limit.max(last_time + step));
        if t_final <= last_time {
            // The trajectory already extends to the target of this call.
            return t_final == t;
        }
        self.prolong(t_final);

        let mut hints = vec![Hint::default(); self.bodies.len()];
        let initial = SystemState::single(last_time, last_dof);
        let ephemeris = &*self;
        let mut compute_acceleration =
            |time: Epoch, positions: &[Vector3<f64>], accelerations: &mut [Vector3<f64>]| {
                ephemeris.compute_massless_bodies_gravitational_accelerations(
                    time,
                    positions,
                    accelerations,
                    &mut hints,
                );
                if let Some(intrinsic) = intrinsic_acceleration {
                    for acceleration in accelerations.iter_mut() {
                        *acceleration += intrinsic(time);
                    }
                }
            };
        let mut append_state = |state: &SystemState| {
            trajectory.append(fork, state.time, state.degrees_of_freedom(0));
        };

        let length_tolerance = parameters.length_integration_tolerance_km;
        let speed_tolerance = parameters.speed_integration_tolerance_km_s;
        let tolerance_to_error_ratio = move |current_step: Duration, error: &SystemStateError| {
            tolerance_to_error_ratio(length_tolerance, speed_tolerance, current_step, error)
        };
        let adaptive = AdaptiveStepSize {
            first_time_step: t_final - last_time,
            safety_factor: 0.9,
            max_steps: parameters.max_steps,
            tolerance_to_error_ratio: &tolerance_to_error_ratio,
        };

        let outcome = match parameters.integrator {
            AdaptiveStepIntegratorId::DormandPrince54 => embedded_solve::<DormandPrince54, _, _>(
                &mut compute_acceleration,
                &mut append_state,
                &initial,
                t_final,
                &adaptive,
            ),
        };

        outcome == TerminationCondition::Done && t_final == t
    }

    /// Integrates the fork of `trajectory` with the fixed-step method up to
    /// the smallest step multiple at or past `t`, under massive-body gravity
    /// only.
    pub fn flow_with_fixed_step(
        &mut self,
        trajectory: &mut DiscreteTrajectory,
        fork: ForkId,
        t: Epoch,
        parameters: &FixedStepParameters,
    ) {
        // The probe flow may overshoot `t` by up to one step; cover it.
        self.prolong(t + parameters.step);

        let (last_time, last_dof) = trajectory
            .last(fork)
            .unwrap_or_else(|| panic!("cannot flow an empty trajectory"));
        let mut hints = vec![Hint::default(); self.bodies.len()];
        let initial = SystemState::single(last_time, last_dof);
        let ephemeris = &*self;
        let mut compute_acceleration =
            |time: Epoch, positions: &[Vector3<f64>], accelerations: &mut [Vector3<f64>]| {
                ephemeris.compute_massless_bodies_gravitational_accelerations(
                    time,
                    positions,
                    accelerations,
                    &mut hints,
                );
            };
        let mut append_state = |state: &SystemState| {
            trajectory.append(fork, state.time, state.degrees_of_freedom(0));
        };

        match parameters.integrator {
            FixedStepIntegratorId::McLachlanAtela1992Order5Optimal => {
                sprk_solve::<McLachlanAtela1992Order5Optimal, _, _>(
                    &mut compute_acceleration,
                    &mut append_state,
                    &initial,
                    t,
                    parameters.step,
                );
            }
        }
    }

    /// Rewinds the ephemeris to the earliest checkpointed intermediate state
    /// at or after `t`, restoring the last state and truncating every
    /// continuous trajectory. If no such checkpoint exists this is a no-op:
    /// the trajectories do not extend that far.
    pub fn forget_after(&mut self, t: Epoch) {
        let index = self
            .intermediate_states
            .partition_point(|state| state.time < t);
        if index == self.intermediate_states.len() {
            return;
        }
        let state = self.intermediate_states[index].clone();
        for (body, trajectory) in self.trajectories.iter_mut().enumerate() {
            trajectory.forget_after(state.time, state.degrees_of_freedom(body));
        }
        self.last_state = state;
        self.intermediate_states.truncate(index);
    }

    /// Drops the polynomial pieces entirely earlier than `t` in every body.
    pub fn forget_before(&mut self, t: Epoch) {
        for trajectory in &mut self.trajectories {
            trajectory.forget_before(t);
        }
    }

    /// The total gravitational acceleration exerted by the massive bodies on
    /// a massless body at `position_km` at time `t`, in km/s².
    pub fn compute_gravitational_acceleration_on_massless_body(
        &self,
        position_km: Vector3<f64>,
        t: Epoch,
    ) -> Vector3<f64> {
        let mut hints = vec![Hint::default(); self.bodies.len()];
        let mut accelerations = [Vector3::zeros()];
        self.compute_massless_bodies_gravitational_accelerations(
            t,
            &[position_km],
            &mut accelerations,
            &mut hints,
        );
        accelerations[0]
    }

    /// The total gravitational acceleration exerted on the body at the
    /// provided construction index by all the other massive bodies at time
    /// `t`, in km/s².
    pub fn compute_gravitational_acceleration_on_massive_body(
        &self,
        index: usize,
        t: Epoch,
    ) -> Vector3<f64> {
        let mut hints = vec![Hint::default(); self.bodies.len()];
        let positions: Vec<Vector3<f64>> = self
            .trajectories
            .iter()
            .zip(hints.iter_mut())
            .map(|(trajectory, hint)| trajectory.evaluate_position(t, hint))
            .collect();
        let mut accelerations = vec![Vector3::zeros(); self.bodies.len()];
        compute_massive_bodies_gravitational_accelerations(
            &self.bodies,
            self.number_of_oblate_bodies,
            &positions,
            &mut accelerations,
        );
        accelerations[self.construction_to_internal[index]]
    }

    /// Detects the apsides of the provided probe samples about the body at
    /// the provided construction index, appending the interpolated states to
    /// `apoapsides` and `periapsides` (at their roots).
    pub fn compute_apsides<I>(
        &self,
        index: usize,
        samples: I,
        apoapsides: &mut DiscreteTrajectory,
        periapsides: &mut DiscreteTrajectory,
    ) where
        I: IntoIterator<Item = (Epoch, DegreesOfFreedom)>,
    {
        let body_trajectory = self.trajectory(index);
        let mut hint = Hint::default();

        let mut previous: Option<(Epoch, DegreesOfFreedom, f64, f64)> = None;
        for (time, dof) in samples {
            let body_dof = body_trajectory.evaluate_degrees_of_freedom(time, &mut hint);
            let displacement = dof.position_km - body_dof.position_km;
            let relative_velocity = dof.velocity_km_s - body_dof.velocity_km_s;
            let squared_distance = displacement.dot(&displacement);
            let squared_distance_derivative = 2.0 * displacement.dot(&relative_velocity);

            if let Some((
                previous_time,
                previous_dof,
                previous_squared_distance,
                previous_derivative,
            )) = previous
            {
                if squared_distance_derivative.signum() != previous_derivative.signum() {
                    // The derivative of the squared distance changed sign:
                    // fit a Hermite cubic to it and find its extremum in the
                    // interval.
                    let h = (time - previous_time).to_seconds();
                    let approximation = Hermite3::new(
                        (0.0, h),
                        (previous_squared_distance, squared_distance),
                        (previous_derivative, squared_distance_derivative),
                    );
                    let mut apsis_offset_s = 0.0;
                    let mut valid_extrema = 0;
                    for extremum in approximation.find_extrema() {
                        if (0.0..=h).contains(&extremum) {
                            apsis_offset_s = extremum;
                            valid_extrema += 1;
                        }
                    }
                    if valid_extrema != 1 {
                        // Ill-conditioned fit: interpolate the derivative's
                        // zero linearly instead.
                        apsis_offset_s =
                            h * previous_derivative / (previous_derivative - squared_distance_derivative);
                    }
                    let apsis_time = previous_time + apsis_offset_s * Unit::Second;

                    // An extremum of the squared-distance approximation is
                    // not exactly an extremum of the position approximation,
                    // but it is close enough to derive the state there.
                    let mut position = Vector3::zeros();
                    let mut velocity = Vector3::zeros();
                    for axis in 0..3 {
                        let approximation = Hermite3::new(
                            (0.0, h),
                            (previous_dof.position_km[axis], dof.position_km[axis]),
                            (previous_dof.velocity_km_s[axis], dof.velocity_km_s[axis]),
                        );
                        position[axis] = approximation.evaluate(apsis_offset_s);
                        velocity[axis] = approximation.evaluate_derivative(apsis_offset_s);
                    }
                    let apsis_dof = DegreesOfFreedom::new(position, velocity);
                    if squared_distance_derivative < 0.0 {
                        apoapsides.append(ForkId::ROOT, apsis_time, apsis_dof);
                    } else {
                        periapsides.append(ForkId::ROOT, apsis_time, apsis_dof);
                    }
                }
            }

            previous = Some((time, dof, squared_distance, squared_distance_derivative));
        }
    }

    fn compute_massless_bodies_gravitational_accelerations(
        &self,
        t: Epoch,
        positions: &[Vector3<f64>],
        accelerations: &mut [Vector3<f64>],
        hints: &mut [Hint],
    ) {
        assert_eq!(positions.len(), accelerations.len());
        for acceleration in accelerations.iter_mut() {
            *acceleration = Vector3::zeros();
        }

        for b1 in 0..self.number_of_oblate_bodies {
            self.acceleration_by_massive_body_on_massless_bodies::<true>(
                t,
                b1,
                positions,
                accelerations,
                &mut hints[b1],
            );
        }
        for b1 in self.number_of_oblate_bodies..self.bodies.len() {
            self.acceleration_by_massive_body_on_massless_bodies::<false>(
                t,
                b1,
                positions,
                accelerations,
                &mut hints[b1],
            );
        }
    }

    fn acceleration_by_massive_body_on_massless_bodies<const BODY1_IS_OBLATE: bool>(
        &self,
        t: Epoch,
        b1: usize,
        positions: &[Vector3<f64>],
        accelerations: &mut [Vector3<f64>],
        hint: &mut Hint,
    ) {
        let body1 = &self.bodies[b1];
        let mu1 = body1.gravitational_parameter_km3_s2();
        let position1 = self.trajectories[b1].evaluate_position(t, hint);

        for (b2, position2) in positions.iter().enumerate() {
            let dq = position1 - position2;
            let dq_squared = dq.dot(&dq);
            let one_over_dq_cubed = dq_squared.sqrt() / (dq_squared * dq_squared);

            accelerations[b2] += dq * (mu1 * one_over_dq_cubed);

            if BODY1_IS_OBLATE {
                if let Some(oblateness) = body1.oblateness() {
                    let one_over_dq_squared = 1.0 / dq_squared;
                    let zonal_effect = order_2_zonal_effect(
                        oblateness,
                        dq,
                        one_over_dq_squared,
                        one_over_dq_cubed,
                    );
                    accelerations[b2] += zonal_effect * mu1;
                }
            }
        }
    }
}

/// The degree-2 zonal acceleration per unit gravitational parameter exerted
/// by an oblate body, evaluated at separation `r` from its center:
///
///   −(J₂/μ) (1/|r|⁵) (3 ĵ (r·ĵ) + r (3 − 15 (r·ĵ)²/|r|²) / 2)
///
/// where ĵ is the unit vector along the axis of rotation.
#[inline]
fn order_2_zonal_effect(
    oblateness: &Oblateness,
    r: Vector3<f64>,
    one_over_r_squared: f64,
    one_over_r_cubed: f64,
) -> Vector3<f64> {
    let axis = oblateness.axis;
    let r_axis_projection = axis.dot(&r);
    let j2_over_r_fifth = oblateness.j2_over_mu_km2 * one_over_r_cubed * one_over_r_squared;
    let axis_effect = axis * (-3.0 * j2_over_r_fifth * r_axis_projection);
    let radial_effect = r * (j2_over_r_fifth
        * (-1.5 + 7.5 * r_axis_projection * r_axis_projection * one_over_r_squared));
    axis_effect + radial_effect
}

/// Accumulates the accelerations of every unordered pair (b1, b2) with
/// b2 in [max(b1 + 1, b2_begin), b2_end), applying Newton's third law, with
/// the oblateness of both operands resolved at compile time.
fn accelerations_between_massive_bodies<const BODY1_IS_OBLATE: bool, const BODY2_IS_OBLATE: bool>(
    bodies: &[MassiveBody],
    b1: usize,
    b2_begin: usize,
    b2_end: usize,
    positions: &[Vector3<f64>],
    accelerations: &mut [Vector3<f64>],
) {
    let body1 = &bodies[b1];
    let mu1 = body1.gravitational_parameter_km3_s2();
    let mut acceleration_on_b1 = Vector3::zeros();

    for b2 in b2_begin.max(b1 + 1)..b2_end {
        let body2 = &bodies[b2];
        let mu2 = body2.gravitational_parameter_km3_s2();

        let dq = positions[b1] - positions[b2];
        let dq_squared = dq.dot(&dq);
        // Computing 1/Δq² here would slow down the spherical path.
        let one_over_dq_cubed = dq_squared.sqrt() / (dq_squared * dq_squared);

        accelerations[b2] += dq * (mu1 * one_over_dq_cubed);
        // The reaction on b1 is equal and opposite.
        acceleration_on_b1 -= dq * (mu2 * one_over_dq_cubed);

        if BODY1_IS_OBLATE || BODY2_IS_OBLATE {
            let one_over_dq_squared = 1.0 / dq_squared;
            if BODY1_IS_OBLATE {
                if let Some(oblateness) = body1.oblateness() {
                    let zonal_effect = order_2_zonal_effect(
                        oblateness,
                        dq,
                        one_over_dq_squared,
                        one_over_dq_cubed,
                    );
                    acceleration_on_b1 -= zonal_effect * mu2;
                    accelerations[b2] += zonal_effect * mu1;
                }
            }
            if BODY2_IS_OBLATE {
                if let Some(oblateness) = body2.oblateness() {
                    let zonal_effect = order_2_zonal_effect(
                        oblateness,
                        dq,
                        one_over_dq_squared,
                        one_over_dq_cubed,
                    );
                    acceleration_on_b1 -= zonal_effect * mu2;
                    accelerations[b2] += zonal_effect * mu1;
                }
            }
        }
    }

    accelerations[b1] += acceleration_on_b1;
}

/// The massive-body N-body kernel: mutual gravitation of every pair, with
/// the degree-2 zonal term of the oblate bodies, which are the first
/// `number_of_oblate_bodies` entries.
pub(crate) fn compute_massive_bodies_gravitational_accelerations(
    bodies: &[MassiveBody],
    number_of_oblate_bodies: usize,
    positions: &[Vector3<f64>],
    accelerations: &mut [Vector3<f64>],
) {
    for acceleration in accelerations.iter_mut() {
        *acceleration = Vector3::zeros();
    }
    let total = bodies.len();

    for b1 in 0..number_of_oblate_bodies {
        accelerations_between_massive_bodies::<true, true>(
            bodies,
            b1,
            0,
            number_of_oblate_bodies,
            positions,
            accelerations,
        );
        accelerations_between_massive_bodies::<true, false>(
            bodies,
            b1,
            number_of_oblate_bodies,
            total,
            positions,
            accelerations,
        );
    }
    for b1 in number_of_oblate_bodies..total {
        accelerations_between_massive_bodies::<false, false>(
            bodies,
            b1,
            number_of_oblate_bodies,
            total,
            positions,
            accelerations,
        );
    }
}

/// The ratio used by the adaptive flows to accept or reject a step:
/// min(ε_L / max‖δq‖, ε_v / max‖δv‖).
fn tolerance_to_error_ratio(
    length_integration_tolerance_km: f64,
    speed_integration_tolerance_km_s: f64,
    _current_step: Duration,
    error: &SystemStateError,
) -> f64 {
    let mut max_length_error = 0.0_f64;
    let mut max_speed_error = 0.0_f64;
    for position_error in &error.position_error_km {
        max_length_error = max_length_error.max(position_error.norm());
    }
    for velocity_error in &error.velocity_error_km_s {
        max_speed_error = max_speed_error.max(velocity_error.norm());
    }
    (length_integration_tolerance_km / max_length_error)
        .min(speed_integration_tolerance_km_s / max_speed_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oblate_bodies_are_stored_first() {
        let epoch = Epoch::from_gregorian_utc_at_midnight(2023, 5, 17);
        let spherical = MassiveBody::spherical(4_902.800_066);
        let oblate = MassiveBody::oblate(
            398_600.4415,
            1.082_626_68e-3,
            6_378.1363,
            Vector3::new(0.0, 0.0, 1.0),
        );
        let ephemeris = Ephemeris::new(
            vec![spherical.clone(), oblate.clone()],
            &[
                DegreesOfFreedom::new(Vector3::new(384_400.0, 0.0, 0.0), Vector3::zeros()),
                DegreesOfFreedom::origin(),
            ],
            epoch,
            1e-6,
            FixedStepParameters::new(
                FixedStepIntegratorId::McLachlanAtela1992Order5Optimal,
                45.0 * Unit::Minute,
            ),
        );
        // Internal storage puts the oblate body first, the externally
        // visible order is the construction one.
        assert!(ephemeris.bodies[0].is_oblate());
        assert!(!ephemeris.body(0).is_oblate());
        assert!(ephemeris.body(1).is_oblate());
        assert_eq!(ephemeris.bodies().len(), 2);
    }

    #[test]
    fn zonal_effect_vanishes_for_large_distances() {
        let oblateness = Oblateness {
            axis: Vector3::new(0.0, 0.0, 1.0),
            j2_over_mu_km2: 1.082_626_68e-3 * 6_378.1363 * 6_378.1363,
        };
        let near = order_2_zonal_effect(&oblateness, Vector3::new(7_000.0, 0.0, 0.0), 1.0 / 49e6, 1.0 / 343e9);
        let r_far = 384_400.0_f64;
        let far = order_2_zonal_effect(
            &oblateness,
            Vector3::new(r_far, 0.0, 0.0),
            1.0 / (r_far * r_far),
            1.0 / (r_far * r_far * r_far),
        );
        assert!(near.norm() > 1e4 * far.norm());
    }
}
