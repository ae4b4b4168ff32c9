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
use crate::ephemeris::{AdaptiveStepParameters, Ephemeris};
use crate::md::NavigationManoeuvre;
use crate::trajectories::{DiscreteTrajectory, ForkId};
use hifitime::Epoch;

use super::Burn;

/// Bound on the background ephemeris work of any single segment
/// integration, so that editing a plan stays responsive.
pub const MAX_EPHEMERIS_STEPS_PER_FRAME: i64 = 1000;

/// A flight plan: alternating coast and burn trajectory segments forked off
/// a root trajectory, kept consistent with an ordered list of manœuvres.
///
/// A plan with K manœuvres always has exactly 2K+1 segments (coast₀, burn₀,
/// coast₁, …, coast_K), with matching boundary times between adjacent
/// segments. The trailing segments may be _anomalous_ (they failed to reach
/// their target time within the integration budget); the plan remains valid
/// while at most two are, since one failed burn may leave the following
/// coast uncomputable.
///
/// The plan borrows its ephemeris and the root trajectory for its lifetime;
/// the segment forks themselves live in the root's tree and are destroyed
/// with the plan.
pub struct FlightPlan<'a> {
    pub(crate) initial_time: Epoch,
    pub(crate) final_time: Epoch,
    pub(crate) initial_mass_kg: f64,
    pub(crate) manoeuvres: Vec<NavigationManoeuvre>,
    pub(crate) segments: Vec<ForkId>,
    /// Number of contiguous trailing segments which failed to reach their
    /// target time.
    pub(crate) anomalous_segments: usize,
    pub(crate) adaptive_step_parameters: AdaptiveStepParameters,
    pub(crate) ephemeris: &'a mut Ephemeris,
    pub(crate) root: &'a mut DiscreteTrajectory,
}

impl<'a> FlightPlan<'a> {
    /// Creates a plan over `[initial_time, final_time]` starting from the
    /// root sample at or immediately before `initial_time`, and coasts it to
    /// `final_time`.
    ///
    /// # Panics
    /// Panics if `final_time < initial_time`, if the initial mass is not
    /// strictly positive, or if the root has no sample at or before
    /// `initial_time`.
    pub fn new(
        root: &'a mut DiscreteTrajectory,
        initial_time: Epoch,
        final_time: Epoch,
        initial_mass_kg: f64,
        ephemeris: &'a mut Ephemeris,
        adaptive_step_parameters: AdaptiveStepParameters,
    ) -> Self {
        assert!(
            final_time >= initial_time,
            "the flight plan must end at or after its start"
        );
        assert!(
            initial_mass_kg > 0.0,
            "the initial mass must be strictly positive"
        );
        // Anchor on an actual sample of the root.
        let (anchor_time, _) = root
            .find_at_or_before(ForkId::ROOT, initial_time)
            .unwrap_or_else(|| {
                panic!("the root trajectory has no sample at or before {initial_time}")
            });

        let first_coast = root.new_fork_without_copy_at(ForkId::ROOT, anchor_time);
        let mut plan = Self {
            initial_time: anchor_time,
            final_time,
            initial_mass_kg,
            manoeuvres: Vec::new(),
            segments: vec![first_coast],
            anomalous_segments: 0,
            adaptive_step_parameters,
            ephemeris,
            root,
        };
        plan.coast_last_segment(plan.final_time);
        plan
    }

    pub fn initial_time(&self) -> Epoch {
        self.initial_time
    }

    pub fn final_time(&self) -> Epoch {
        self.final_time
    }

    pub fn initial_mass_kg(&self) -> f64 {
        self.initial_mass_kg
    }

    pub fn adaptive_step_parameters(&self) -> &AdaptiveStepParameters {
        &self.adaptive_step_parameters
    }

    pub fn number_of_manoeuvres(&self) -> usize {
        self.manoeuvres.len()
    }

    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn get_manoeuvre(&self, index: usize) -> &NavigationManoeuvre {
        &self.manoeuvres[index]
    }

    pub fn number_of_segments(&self) -> usize {
        self.segments.len()
    }

    /// Iterates the samples of the segment at `index`, fork point included.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn get_segment(
        &self,
        index: usize,
    ) -> impl Iterator<Item = (Epoch, DegreesOfFreedom)> + '_ {
        let segment = self.segments[index];
        let fork_time = self
            .root
            .fork_time(segment)
            .expect("plan segments are always forks");
        self.root.iter_from(segment, fork_time)
    }

    /// Iterates the unified timeline of the whole plan.
    pub fn get_all_segments(&self) -> impl Iterator<Item = (Epoch, DegreesOfFreedom)> + '_ {
        let first_fork_time = self
            .root
            .fork_time(self.segments[0])
            .expect("plan segments are always forks");
        self.root
            .iter_from(self.segments[self.segments.len() - 1], first_fork_time)
    }

    /// The root trajectory this plan is forked from.
    pub fn root(&self) -> &DiscreteTrajectory {
        &*self.root
    }

    /// True when more than two trailing segments failed to reach their
    /// target time, i.e. the plan can no longer be trusted.
    pub fn is_anomalous(&self) -> bool {
        self.anomalous_segments > 2
    }

    /// Appends a manœuvre built from `burn` with the mass at the end of the
    /// current plan. Returns false, leaving the plan unchanged, when the
    /// burn does not fit between the last manœuvre and the final time, is
    /// singular, or the coast to its ignition cannot be computed.
    pub fn append(&mut self, burn: Burn) -> bool {
        let tail_mass_kg = self
            .manoeuvres
            .last()
            .map_or(self.initial_mass_kg, NavigationManoeuvre::final_mass_kg);
        let manoeuvre = NavigationManoeuvre::new(burn, tail_mass_kg);
        if manoeuvre.fits_between(self.start_of_last_coast(), self.final_time)
            && !manoeuvre.is_singular()
        {
            if let Some(recomputed_last_coast) =
                self.coast_if_reaches_manoeuvre_initial_time(self.last_coast(), &manoeuvre)
            {
                self.replace_last_segment(recomputed_last_coast);
                self.append_manoeuvre(manoeuvre);
                return true;
            }
        }
        false
    }

    /// Removes the last manœuvre and coasts the reopened segment to the
    /// final time.
    ///
    /// # Panics
    /// Panics if the plan has no manœuvre.
    pub fn remove_last(&mut self) {
        assert!(
            !self.manoeuvres.is_empty(),
            "cannot remove a manœuvre from an empty plan"
        );
        self.manoeuvres.pop();
        self.pop_last_segment(); // Last coast.
        self.pop_last_segment(); // Last burn.
        self.reset_last_segment();
        self.coast_last_segment(self.final_time);
    }

    /// Replaces the last manœuvre. Equivalent to `remove_last` followed by
    /// `append`, but atomic: on failure the original plan is preserved.
    ///
    /// # Panics
    /// Panics if the plan has no manœuvre.
    pub fn replace_last(&mut self, burn: Burn) -> bool {
        assert!(
            !self.manoeuvres.is_empty(),
            "cannot replace a manœuvre of an empty plan"
        );
        let manoeuvre =
            NavigationManoeuvre::new(burn, self.manoeuvres[self.manoeuvres.len() - 1].initial_mass_kg());
        if manoeuvre.fits_between(self.start_of_penultimate_coast(), self.final_time)
            && !manoeuvre.is_singular()
        {
            if let Some(recomputed_penultimate_coast) =
                self.coast_if_reaches_manoeuvre_initial_time(self.penultimate_coast(), &manoeuvre)
            {
                self.manoeuvres.pop();
                self.pop_last_segment(); // Last coast.
                self.pop_last_segment(); // Last burn.
                self.replace_last_segment(recomputed_penultimate_coast);
                self.append_manoeuvre(manoeuvre);
                return true;
            }
        }
        false
    }

    /// Truncates or extends the last coast. Returns false when `final_time`
    /// is before the start of the last coast.
    pub fn set_final_time(&mut self, final_time: Epoch) -> bool {
        if self.start_of_last_coast() > final_time {
            return false;
        }
        self.final_time = final_time;
        self.reset_last_segment();
        self.coast_last_segment(self.final_time);
        true
    }

    /// Recomputes every segment with the new parameters. On failure the
    /// previous parameters are restored (and the segments recomputed with
    /// them) and false is returned.
    pub fn set_adaptive_step_parameters(
        &mut self,
        adaptive_step_parameters: AdaptiveStepParameters,
    ) -> bool {
        let original_adaptive_step_parameters = self.adaptive_step_parameters;
        self.adaptive_step_parameters = adaptive_step_parameters;
        if self.recompute_segments() {
            true
        } else {
            // If the recomputation fails, leave this place as clean as we
            // found it.
            self.adaptive_step_parameters = original_adaptive_step_parameters;
            let restored = self.recompute_segments();
            assert!(restored, "restoring the original parameters must succeed");
            false
        }
    }

    /// Pops all segments but the earliest coast, rewinds it, and replays
    /// every manœuvre: coast to its ignition, burn, repeat, then coast to
    /// the final time. Returns whether the plan is still valid.
    pub(crate) fn recompute_segments(&mut self) -> bool {
        // The segments must be destroyed in reverse chronological order of
        // the forks.
        while self.segments.len() > 1 {
            self.pop_last_segment();
        }
        self.reset_last_segment();
        for index in 0..self.manoeuvres.len() {
            let initial_time = self.manoeuvres[index].initial_time();
            self.coast_last_segment(initial_time);
            self.set_manoeuvre_coasting_state(index);
            self.add_segment();
            self.burn_last_segment(index);
            self.add_segment();
        }
        self.coast_last_segment(self.final_time);
        self.anomalous_segments <= 2
    }

    fn append_manoeuvre(&mut self, manoeuvre: NavigationManoeuvre) {
        debug_assert_eq!(
            Some(manoeuvre.initial_time()),
            self.root.last(self.last_coast()).map(|(time, _)| time),
        );
        self.manoeuvres.push(manoeuvre);
        let index = self.manoeuvres.len() - 1;
        self.set_manoeuvre_coasting_state(index);
        self.add_segment();
        self.burn_last_segment(index);
        self.add_segment();
        self.coast_last_segment(self.final_time);
    }

    /// Orients the manœuvre against the state at the end of the last coast.
    fn set_manoeuvre_coasting_state(&mut self, index: usize) {
        if self.anomalous_segments > 0 {
            // The coast did not reach the ignition; the burn will not be
            // integrated either, so there is nothing to orient.
            return;
        }
        if let Some((_, dof)) = self.root.last(self.last_coast()) {
            self.manoeuvres[index].set_coasting_state(dof);
        }
    }

    fn add_segment(&mut self) {
        let fork = self.root.new_fork_at_last(self.last_segment());
        self.segments.push(fork);
        if self.anomalous_segments > 0 {
            self.anomalous_segments += 1;
        }
    }

    fn reset_last_segment(&mut self) {
        let last = self.last_segment();
        let fork_time = self
            .root
            .fork_time(last)
            .expect("plan segments are always forks");
        self.root.forget_after(last, fork_time);
        if self.anomalous_segments == 1 {
            // The only anomalous segment was the last one, which was
            // anomalous because it ended early. It no longer is.
            self.anomalous_segments = 0;
        }
    }

    pub(crate) fn pop_last_segment(&mut self) {
        let last = self
            .segments
            .pop()
            .expect("the plan always has at least one segment");
        self.root.delete_fork(last);
        if self.anomalous_segments > 0 {
            self.anomalous_segments -= 1;
        }
    }

    fn replace_last_segment(&mut self, segment: ForkId) {
        let last = self.last_segment();
        assert_eq!(
            self.root.parent(segment),
            self.root.parent(last),
            "the replacement segment must share the parent of the replaced one"
        );
        assert_eq!(
            self.root.fork_time(segment),
            self.root.fork_time(last),
            "the replacement segment must share the fork time of the replaced one"
        );
        self.pop_last_segment();
        // The replacement is not anomalous, so it cannot follow an anomalous
        // segment.
        assert_eq!(self.anomalous_segments, 0);
        self.segments.push(segment);
    }

    fn coast_last_segment(&mut self, final_time: Epoch) {
        if self.anomalous_segments > 0 {
            return;
        }
        let last = self.last_segment();
        let reached_final_time = self.ephemeris.flow_with_adaptive_step(
            self.root,
            last,
            None,
            final_time,
            &self.adaptive_step_parameters,
            MAX_EPHEMERIS_STEPS_PER_FRAME,
        );
        if !reached_final_time {
            self.anomalous_segments = 1;
        }
    }

    fn burn_last_segment(&mut self, index: usize) {
        if self.anomalous_segments > 0 {
            return;
        }
        let manoeuvre = &self.manoeuvres[index];
        if manoeuvre.initial_time() < manoeuvre.final_time() {
            let last = self.segments[self.segments.len() - 1];
            let final_time = manoeuvre.final_time();
            let intrinsic = |t: Epoch| manoeuvre.intrinsic_acceleration(t);
            let reached_final_time = self.ephemeris.flow_with_adaptive_step(
                self.root,
                last,
                Some(&intrinsic),
                final_time,
                &self.adaptive_step_parameters,
                MAX_EPHEMERIS_STEPS_PER_FRAME,
            );
            if !reached_final_time {
                self.anomalous_segments = 1;
            }
        }
    }

    /// Tries a fresh coast from the parent of `coast`, at the same fork
    /// point, up to the ignition of `manoeuvre`. Returns the trial fork on
    /// success; deletes it and returns `None` otherwise.
    fn coast_if_reaches_manoeuvre_initial_time(
        &mut self,
        coast: ForkId,
        manoeuvre: &NavigationManoeuvre,
    ) -> Option<ForkId> {
        let parent = self
            .root
            .parent(coast)
            .expect("plan segments are always forks");
        let fork_time = self
            .root
            .fork_time(coast)
            .expect("plan segments are always forks");
        let recomputed_coast = self.root.new_fork_without_copy_at(parent, fork_time);
        let reached_manoeuvre_initial_time = self.ephemeris.flow_with_adaptive_step(
            self.root,
            recomputed_coast,
            None,
            manoeuvre.initial_time(),
            &self.adaptive_step_parameters,
            MAX_EPHEMERIS_STEPS_PER_FRAME,
        );
        if reached_manoeuvre_initial_time {
            Some(recomputed_coast)
        } else {
            self.root.delete_fork(recomputed_coast);
            None
        }
    }

    fn last_segment(&self) -> ForkId {
        self.segments[self.segments.len() - 1]
    }

    fn last_coast(&self) -> ForkId {
        self.last_segment()
    }

    fn penultimate_coast(&self) -> ForkId {
        // The penultimate coast is the antepenultimate segment.
        self.segments[self.segments.len() - 3]
    }

    pub(crate) fn start_of_last_coast(&self) -> Epoch {
        self.manoeuvres
            .last()
            .map_or(self.initial_time, NavigationManoeuvre::final_time)
    }

    fn start_of_penultimate_coast(&self) -> Epoch {
        if self.manoeuvres.len() == 1 {
            self.initial_time
        } else {
            self.manoeuvres[self.manoeuvres.len() - 2].final_time()
        }
    }
}

impl Drop for FlightPlan<'_> {
    fn drop(&mut self) {
        // Deleting the first fork deletes every segment.
        if let Some(first) = self.segments.first() {
            self.root.delete_fork(*first);
        }
    }
}
