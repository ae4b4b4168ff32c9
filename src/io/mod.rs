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

/*! Serialization records and configuration.

Every persistent entity maps to a structured record with labelled fields.
Writing and reading records round-trips bit-exactly. Two legacy layouts are
accepted on read: per-celestial ephemerides (histories plus prolongation)
and flight plans carrying explicit segment pointers.
*/

use crate::cosmic::{DegreesOfFreedom, MassiveBody, SystemState};
use crate::ephemeris::{
    AdaptiveStepIntegratorId, AdaptiveStepParameters, Ephemeris, FixedStepIntegratorId,
    FixedStepParameters,
};
use crate::md::{FlightPlan, NavigationManoeuvre};
use crate::polyfit::Polynomial;
use crate::trajectories::continuous::{Piece, PIECE_COEFFS};
use crate::trajectories::{ContinuousTrajectory, DiscreteTrajectory, ForkId};
use crate::ErebusError;
use hifitime::{Duration, Epoch};
use serde::{Deserialize, Serialize};

/// One fitted polynomial piece of a continuous trajectory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PieceRecord {
    pub t_min: Epoch,
    pub t_max: Epoch,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

/// A continuous trajectory: its fitted pieces and the pending window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContinuousTrajectoryRecord {
    pub step: Duration,
    pub fitting_tolerance_km: f64,
    pub pieces: Vec<PieceRecord>,
    pub pending: Vec<(Epoch, DegreesOfFreedom)>,
}

/// One node of a discrete trajectory tree. Nodes are listed depth-first
/// from the root; `parent` indexes into the same record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscreteTrajectoryNodeRecord {
    pub parent: Option<usize>,
    pub fork_time: Option<Epoch>,
    pub samples: Vec<(Epoch, DegreesOfFreedom)>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscreteTrajectoryRecord {
    pub nodes: Vec<DiscreteTrajectoryNodeRecord>,
}

/// The current ephemeris layout: bodies in construction order, trajectories
/// in internal (oblate-first) order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EphemerisRecord {
    pub bodies: Vec<MassiveBody>,
    pub trajectories: Vec<ContinuousTrajectoryRecord>,
    pub fixed_step_parameters: FixedStepParameters,
    pub fitting_tolerance_km: f64,
    pub last_state: SystemState,
}

/// The legacy per-celestial layout: each body carries its own discrete
/// history and prolongation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CelestialRecord {
    pub body: MassiveBody,
    pub history: Vec<(Epoch, DegreesOfFreedom)>,
    pub prolongation: Vec<(Epoch, DegreesOfFreedom)>,
}

/// A flight plan. The `segments`, `integrator` and tolerance fields are only
/// present in the legacy layout, which carried explicit segment pointers
/// (node indices into the root trajectory record) and bare adaptive
/// settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlightPlanRecord {
    pub initial_time: Epoch,
    pub final_time: Epoch,
    pub initial_mass_kg: f64,
    pub adaptive_step_parameters: Option<AdaptiveStepParameters>,
    pub manoeuvres: Vec<NavigationManoeuvre>,
    #[serde(default)]
    pub segments: Vec<usize>,
    #[serde(default)]
    pub integrator: Option<AdaptiveStepIntegratorId>,
    #[serde(default)]
    pub length_integration_tolerance_km: Option<f64>,
    #[serde(default)]
    pub speed_integration_tolerance_km_s: Option<f64>,
}

fn piece_to_record(piece: &Piece) -> PieceRecord {
    PieceRecord {
        t_min: piece.t_min,
        t_max: piece.t_max,
        x: piece.x.coefficients.to_vec(),
        y: piece.y.coefficients.to_vec(),
        z: piece.z.coefficients.to_vec(),
    }
}

fn polynomial_from_record(coefficients: &[f64]) -> Result<Polynomial<PIECE_COEFFS>, ErebusError> {
    if coefficients.len() != PIECE_COEFFS {
        return Err(ErebusError::InvalidRecord(format!(
            "piece polynomial has {} coefficients, expected {PIECE_COEFFS}",
            coefficients.len()
        )));
    }
    let mut polynomial = Polynomial::zeros();
    polynomial.coefficients.copy_from_slice(coefficients);
    Ok(polynomial)
}

impl ContinuousTrajectory {
    pub fn write_to_record(&self) -> ContinuousTrajectoryRecord {
        ContinuousTrajectoryRecord {
            step: self.step(),
            fitting_tolerance_km: self.fitting_tolerance_km(),
            pieces: self.pieces.iter().map(piece_to_record).collect(),
            pending: self.pending.clone(),
        }
    }

    pub fn read_from_record(record: &ContinuousTrajectoryRecord) -> Result<Self, ErebusError> {
        if record.step <= Duration::ZERO || record.fitting_tolerance_km <= 0.0 {
            return Err(ErebusError::InvalidRecord(
                "non-positive step or fitting tolerance".to_string(),
            ));
        }
        let mut trajectory =
            ContinuousTrajectory::new(record.step, record.fitting_tolerance_km);
        for piece in &record.pieces {
            trajectory.pieces.push(Piece {
                t_min: piece.t_min,
                t_max: piece.t_max,
                x: polynomial_from_record(&piece.x)?,
                y: polynomial_from_record(&piece.y)?,
                z: polynomial_from_record(&piece.z)?,
            });
        }
        trajectory.pending = record.pending.clone();
        Ok(trajectory)
    }
}

impl DiscreteTrajectory {
    /// The fork handles in the order their nodes appear in the record.
    pub fn fork_ids_in_record_order(&self) -> Vec<ForkId> {
        self.depth_first()
    }

    pub fn write_to_record(&self) -> DiscreteTrajectoryRecord {
        let order = self.depth_first();
        let index_of = |id: ForkId| order.iter().position(|other| *other == id);
        let nodes = order
            .iter()
            .map(|id| {
                let (parent, fork_time, samples) = self.node_parts(*id);
                DiscreteTrajectoryNodeRecord {
                    parent: parent.and_then(index_of),
                    fork_time,
                    samples: samples.to_vec(),
                }
            })
            .collect();
        DiscreteTrajectoryRecord { nodes }
    }

    /// Rebuilds a tree from a record. Also returns the fork handle of every
    /// record node, in record order, so that external references (e.g.
    /// flight plan segments) can be resolved.
    pub fn read_from_record(
        record: &DiscreteTrajectoryRecord,
    ) -> Result<(Self, Vec<ForkId>), ErebusError> {
        let mut trajectory = DiscreteTrajectory::new();
        let mut ids: Vec<ForkId> = Vec::with_capacity(record.nodes.len());
        for (index, node) in record.nodes.iter().enumerate() {
            let parent = match node.parent {
                None => {
                    if index != 0 {
                        return Err(ErebusError::InvalidRecord(format!(
                            "node {index} has no parent but is not the root"
                        )));
                    }
                    None
                }
                Some(parent_index) => {
                    if parent_index >= index {
                        return Err(ErebusError::InvalidRecord(format!(
                            "node {index} references the later node {parent_index} as parent"
                        )));
                    }
                    Some(ids[parent_index])
                }
            };
            let id = trajectory.adopt_node(parent, node.fork_time, node.samples.clone());
            ids.push(id);
        }
        Ok((trajectory, ids))
    }
}

impl Ephemeris {
    pub fn write_to_record(&self) -> EphemerisRecord {
        // The bodies are serialized in the order in which they were given at
        // construction; the trajectories in the internal order resulting
        // from the separation between oblate and spherical bodies.
        EphemerisRecord {
            bodies: self.bodies().into_iter().cloned().collect(),
            trajectories: self
                .trajectories()
                .iter()
                .map(ContinuousTrajectory::write_to_record)
                .collect(),
            fixed_step_parameters: *self.parameters(),
            fitting_tolerance_km: self.fitting_tolerance_km(),
            last_state: self.last_state.clone(),
        }
    }

    pub fn read_from_record(record: &EphemerisRecord) -> Result<Self, ErebusError> {
        let n = record.bodies.len();
        if n == 0 {
            return Err(ErebusError::InvalidRecord("no body in the record".to_string()));
        }
        if record.trajectories.len() != n
            || record.last_state.positions_km.len() != n
            || record.last_state.velocities_km_s.len() != n
        {
            return Err(ErebusError::InvalidRecord(format!(
                "inconsistent body counts: {} bodies, {} trajectories, {} state entries",
                n,
                record.trajectories.len(),
                record.last_state.positions_km.len()
            )));
        }
        if record.fitting_tolerance_km <= 0.0 {
            return Err(ErebusError::InvalidRecord(
                "non-positive fitting tolerance".to_string(),
            ));
        }

        // Construct with placeholder degrees of freedom, then overwrite the
        // last state and the trajectories from the record.
        let placeholder = vec![DegreesOfFreedom::origin(); n];
        let mut ephemeris = Ephemeris::new(
            record.bodies.clone(),
            &placeholder,
            record.last_state.time,
            record.fitting_tolerance_km,
            record.fixed_step_parameters,
        );
        let trajectories = record
            .trajectories
            .iter()
            .map(ContinuousTrajectory::read_from_record)
            .collect::<Result<Vec<_>, _>>()?;
        ephemeris.replace_trajectories(trajectories);
        ephemeris.last_state = record.last_state.clone();
        Ok(ephemeris)
    }

    /// Reconstructs an ephemeris from per-celestial records: inserts the
    /// bodies with their initial degrees of freedom, replays the history
    /// samples aligned on the fixed step into the new continuous
    /// trajectories, and prolongs to the final time of the prolongations.
    pub fn read_from_pre_bourbaki_records(
        celestials: &[CelestialRecord],
        fitting_tolerance_km: f64,
        parameters: FixedStepParameters,
    ) -> Result<Self, ErebusError> {
        info!(
            "Reading {} celestials in pre-Bourbaki compatibility mode",
            celestials.len()
        );
        if celestials.is_empty() {
            return Err(ErebusError::InvalidRecord("no celestial record".to_string()));
        }
        let mut bodies = Vec::with_capacity(celestials.len());
        let mut initial_state = Vec::with_capacity(celestials.len());
        let mut initial_time: Option<Epoch> = None;
        let mut final_time: Option<Epoch> = None;
        for celestial in celestials {
            let (begin_time, begin_dof) = celestial.history.first().ok_or_else(|| {
                ErebusError::InvalidRecord("a celestial has an empty history".to_string())
            })?;
            let (end_time, _) = celestial
                .prolongation
                .last()
                .or_else(|| celestial.history.last())
                .unwrap();
            if *initial_time.get_or_insert(*begin_time) != *begin_time {
                return Err(ErebusError::InvalidRecord(
                    "celestial histories do not share their initial time".to_string(),
                ));
            }
            if *final_time.get_or_insert(*end_time) != *end_time {
                return Err(ErebusError::InvalidRecord(
                    "celestial prolongations do not share their final time".to_string(),
                ));
            }
            bodies.push(celestial.body.clone());
            initial_state.push(*begin_dof);
        }
        let initial_time = initial_time.unwrap();
        let final_time = final_time.unwrap();
        info!("Initial time is {initial_time}, final time is {final_time}");

        let mut ephemeris = Ephemeris::new(
            bodies,
            &initial_state,
            initial_time,
            fitting_tolerance_km,
            parameters,
        );

        // Extend the continuous trajectories using the data from the
        // discrete histories, stopping at the first unaligned sample.
        let step = parameters.step();
        let mut common_last_time: Option<Epoch> = None;
        for (construction_index, celestial) in celestials.iter().enumerate() {
            let internal = ephemeris.internal_index(construction_index);
            let mut last_time = initial_time;
            let mut last_dof = initial_state[construction_index];
            for (time, dof) in &celestial.history {
                let duration_since_last_time = *time - last_time;
                if duration_since_last_time == step {
                    // A time aligned on the continuous trajectory.
                    last_time = *time;
                    last_dof = *dof;
                    ephemeris.trajectory_mut_internal(internal).append(*time, *dof);
                } else if duration_since_last_time > step {
                    // Unaligned; stop here, the prolongation recomputes the
                    // rest.
                    break;
                }
            }
            if *common_last_time.get_or_insert(last_time) != last_time {
                return Err(ErebusError::InvalidRecord(
                    "celestial histories do not share their last aligned time".to_string(),
                ));
            }
            ephemeris.last_state.positions_km[internal] = last_dof.position_km;
            ephemeris.last_state.velocities_km_s[internal] = last_dof.velocity_km_s;
        }
        let common_last_time = common_last_time.unwrap();
        ephemeris.last_state.time = common_last_time;
        info!("Last time in the discrete histories is {common_last_time}");

        // This may create small discrepancies from the discrete histories.
        ephemeris.prolong(final_time);
        Ok(ephemeris)
    }
}

impl FlightPlan<'_> {
    pub fn write_to_record(&self) -> FlightPlanRecord {
        FlightPlanRecord {
            initial_time: self.initial_time,
            final_time: self.final_time,
            initial_mass_kg: self.initial_mass_kg,
            adaptive_step_parameters: Some(self.adaptive_step_parameters),
            manoeuvres: self.manoeuvres.clone(),
            segments: Vec::new(),
            integrator: None,
            length_integration_tolerance_km: None,
            speed_integration_tolerance_km_s: None,
        }
    }
}

/// Reads a flight plan record against an already-deserialized root
/// trajectory and ephemeris. `node_ids` are the fork handles of the root
/// record nodes, as returned by `DiscreteTrajectory::read_from_record`, and
/// resolve the explicit segment pointers of legacy records.
///
/// Returns `None` when the record is unusable, in particular when a legacy
/// plan remains anomalous after recomputation.
pub fn read_flight_plan_from_record<'a>(
    record: &FlightPlanRecord,
    root: &'a mut DiscreteTrajectory,
    node_ids: &[ForkId],
    ephemeris: &'a mut Ephemeris,
) -> Option<FlightPlan<'a>> {
    let is_pre_buniakovski = !record.segments.is_empty();

    let adaptive_step_parameters = if is_pre_buniakovski {
        AdaptiveStepParameters::new(
            record.integrator?,
            1000,
            record.length_integration_tolerance_km?,
            record.speed_integration_tolerance_km_s?,
        )
    } else {
        record.adaptive_step_parameters?
    };

    let mut flight_plan = FlightPlan::new(
        root,
        record.initial_time,
        record.final_time,
        record.initial_mass_kg,
        ephemeris,
        adaptive_step_parameters,
    );

    if is_pre_buniakovski {
        // The constructor has forked a segment; remove it and adopt the
        // segments pointed to by the record.
        flight_plan.pop_last_segment();
        for segment_index in &record.segments {
            match node_ids.get(*segment_index) {
                Some(id) => flight_plan.segments.push(*id),
                None => {
                    warn!("legacy flight plan references the unknown node {segment_index}");
                    return None;
                }
            }
        }
        flight_plan.manoeuvres = record.manoeuvres.clone();
        // We may end up here with a flight plan that has too many anomalous
        // segments because of past bugs. The best we can do is to ignore it.
        if !flight_plan.recompute_segments() {
            warn!("discarding an anomalous legacy flight plan");
            return None;
        }
    } else {
        flight_plan.manoeuvres = record.manoeuvres.clone();
        // Forcefully prolong, otherwise the ephemeris step limit might be
        // exceeded while recomputing the segments.
        let start_of_last_coast = flight_plan.start_of_last_coast();
        flight_plan.ephemeris.prolong(start_of_last_coast);
        let recomputed = flight_plan.recompute_segments();
        assert!(recomputed, "recomputing a current-layout record must succeed");
    }

    Some(flight_plan)
}

/// The recognised ephemeris options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EphemerisConfig {
    pub step: Duration,
    pub fitting_tolerance: f64,
    pub planetary_integrator: FixedStepIntegratorId,
}

impl EphemerisConfig {
    pub fn fixed_step_parameters(&self) -> FixedStepParameters {
        FixedStepParameters::new(self.planetary_integrator, self.step)
    }
}

/// The recognised adaptive-flow options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    pub integrator: AdaptiveStepIntegratorId,
    pub max_steps: i64,
    pub length_tolerance: f64,
    pub speed_tolerance: f64,
}

impl AdaptiveConfig {
    pub fn adaptive_step_parameters(&self) -> AdaptiveStepParameters {
        AdaptiveStepParameters::new(
            self.integrator,
            self.max_steps,
            self.length_tolerance,
            self.speed_tolerance,
        )
    }
}

/// The recognised flight plan options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlightPlanConfig {
    pub initial_time: Epoch,
    pub final_time: Epoch,
    pub initial_mass: f64,
    pub adaptive: AdaptiveConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::Vector3;
    use hifitime::Unit;

    #[test]
    fn discrete_trajectory_record_round_trips() {
        let t0 = Epoch::from_gregorian_utc_at_midnight(2023, 5, 17);
        let dof = |x: f64| {
            DegreesOfFreedom::new(Vector3::new(x, 0.0, 0.0), Vector3::new(0.0, x, 0.0))
        };
        let mut trajectory = DiscreteTrajectory::new();
        for k in 0..4 {
            trajectory.append(ForkId::ROOT, t0 + (k as f64) * Unit::Minute, dof(k as f64));
        }
        let fork = trajectory.new_fork_without_copy_at(ForkId::ROOT, t0 + 2.0 * Unit::Minute);
        trajectory.append(fork, t0 + 2.5 * Unit::Minute, dof(25.0));
        let nested = trajectory.new_fork_at_last(fork);
        trajectory.append(nested, t0 + 3.0 * Unit::Minute, dof(30.0));
        // Free-list churn must not leak into the record.
        let doomed = trajectory.new_fork_at_last(ForkId::ROOT);
        trajectory.delete_fork(doomed);

        let record = trajectory.write_to_record();
        let (reread, ids) = DiscreteTrajectory::read_from_record(&record).unwrap();
        assert_eq!(reread.write_to_record(), record);
        assert_eq!(ids.len(), 3);

        // The unified timelines survive the round trip.
        let original: Vec<_> = trajectory.iter(nested).collect();
        let recovered: Vec<_> = reread.iter(ids[2]).collect();
        assert_eq!(original, recovered);
    }

    #[test]
    fn adaptive_config_from_json() {
        let config: AdaptiveConfig = serde_json::from_str(
            r#"{
                "integrator": "DormandPrince54",
                "max_steps": 1000,
                "length_tolerance": 1e-6,
                "speed_tolerance": 1e-9
            }"#,
        )
        .unwrap();
        let parameters = config.adaptive_step_parameters();
        assert_eq!(parameters.max_steps(), 1000);
        assert!((parameters.length_integration_tolerance_km() - 1e-6).abs() < 1e-20);
    }
}
