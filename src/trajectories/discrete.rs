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
use hifitime::Epoch;
use serde::{Deserialize, Serialize};

/// Handle onto one node of a [`DiscreteTrajectory`] tree. The arena owns the
/// nodes; handles are borrowed views which remain valid until their node is
/// deleted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForkId(pub(crate) usize);

impl ForkId {
    /// The root of every discrete trajectory tree.
    pub const ROOT: ForkId = ForkId(0);
}

#[derive(Clone, Debug, PartialEq)]
struct Node {
    parent: Option<ForkId>,
    /// The time in the parent at which this fork begins. `None` iff root.
    fork_time: Option<Epoch>,
    /// This node's own samples, sorted by strictly increasing time.
    samples: Vec<(Epoch, DegreesOfFreedom)>,
    children: Vec<ForkId>,
}

/// A tree of time-indexed sample streams. Every spacecraft-side trajectory
/// is a node: the root holds the reference timeline, and children (forks)
/// branch off their parent at one of its sample times.
///
/// Iterating a fork yields the unified timeline: the ancestors' samples up
/// to and including each fork point, then the fork's own samples.
#[derive(Clone, Debug, PartialEq)]
pub struct DiscreteTrajectory {
    nodes: Vec<Option<Node>>,
}

impl Default for DiscreteTrajectory {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscreteTrajectory {
    /// Creates a tree holding an empty root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(Node {
                parent: None,
                fork_time: None,
                samples: Vec::new(),
                children: Vec::new(),
            })],
        }
    }

    fn node(&self, id: ForkId) -> &Node {
        self.nodes[id.0]
            .as_ref()
            .unwrap_or_else(|| panic!("dangling trajectory handle {id:?}"))
    }

    fn node_mut(&mut self, id: ForkId) -> &mut Node {
        self.nodes[id.0]
            .as_mut()
            .unwrap_or_else(|| panic!("dangling trajectory handle {id:?}"))
    }

    fn allocate(&mut self, node: Node) -> ForkId {
        match self.nodes.iter().position(Option::is_none) {
            Some(index) => {
                self.nodes[index] = Some(node);
                ForkId(index)
            }
            None => {
                self.nodes.push(Some(node));
                ForkId(self.nodes.len() - 1)
            }
        }
    }

    pub fn is_root(&self, id: ForkId) -> bool {
        self.node(id).parent.is_none()
    }

    pub fn parent(&self, id: ForkId) -> Option<ForkId> {
        self.node(id).parent
    }

    /// The time in the parent at which this fork begins, `None` for the root.
    pub fn fork_time(&self, id: ForkId) -> Option<Epoch> {
        self.node(id).fork_time
    }

    /// The chain from the root down to `id`, with, per entry, the exclusive
    /// end index of the node's own samples in the unified timeline of `id`.
    ///
    /// Each ancestor contributes its samples up to and including the
    /// earliest fork point below it; a fork which copied the sample at its
    /// fork point does not repeat the ancestor's sample there.
    fn chain(&self, id: ForkId) -> Vec<(ForkId, usize)> {
        let mut nodes = Vec::new();
        let mut cursor = Some(id);
        let mut bound: Option<Epoch> = None;
        while let Some(node_id) = cursor {
            let node = self.node(node_id);
            nodes.push((node_id, bound));
            bound = match (bound, node.fork_time) {
                (Some(b), Some(f)) => Some(b.min(f)),
                (None, f) => f,
                (b, None) => b,
            };
            cursor = node.parent;
        }
        nodes.reverse();

        let mut entries: Vec<(ForkId, usize)> = nodes
            .into_iter()
            .map(|(node_id, bound)| {
                let samples = &self.node(node_id).samples;
                let end = match bound {
                    None => samples.len(),
                    Some(t) => samples.partition_point(|(time, _)| *time <= t),
                };
                (node_id, end)
            })
            .collect();

        for i in 0..entries.len() {
            let (node_id, end) = entries[i];
            if end == 0 {
                continue;
            }
            let last_time = self.node(node_id).samples[end - 1].0;
            let mut duplicated = false;
            for (later_id, later_end) in &entries[i + 1..] {
                if *later_end == 0 {
                    continue;
                }
                duplicated = self.node(*later_id).samples[0].0 == last_time;
                break;
            }
            if duplicated {
                entries[i].1 = end - 1;
            }
        }
        entries
    }

    /// Iterates the unified timeline of `id`.
    pub fn iter(&self, id: ForkId) -> impl Iterator<Item = (Epoch, DegreesOfFreedom)> + '_ {
        self.chain(id).into_iter().flat_map(move |(node_id, end)| {
            self.node(node_id).samples[..end].iter().copied()
        })
    }

    /// Iterates the unified timeline of `id`, starting at the first sample
    /// at or after `time`.
    pub fn iter_from(
        &self,
        id: ForkId,
        time: Epoch,
    ) -> impl Iterator<Item = (Epoch, DegreesOfFreedom)> + '_ {
        self.iter(id).skip_while(move |(t, _)| *t < time)
    }

    /// The number of samples of the unified timeline.
    pub fn len(&self, id: ForkId) -> usize {
        self.chain(id).into_iter().map(|(_, end)| end).sum()
    }

    pub fn is_empty(&self, id: ForkId) -> bool {
        self.len(id) == 0
    }

    /// First sample of the unified timeline.
    pub fn first(&self, id: ForkId) -> Option<(Epoch, DegreesOfFreedom)> {
        self.iter(id).next()
    }

    /// Last sample of the unified timeline.
    pub fn last(&self, id: ForkId) -> Option<(Epoch, DegreesOfFreedom)> {
        for (node_id, end) in self.chain(id).into_iter().rev() {
            if end > 0 {
                return Some(self.node(node_id).samples[end - 1]);
            }
        }
        None
    }

    /// The sample at exactly `time`, if any.
    pub fn find(&self, id: ForkId, time: Epoch) -> Option<(Epoch, DegreesOfFreedom)> {
        for (node_id, end) in self.chain(id) {
            let samples = &self.node(node_id).samples[..end];
            if let Ok(index) = samples.binary_search_by(|(t, _)| t.cmp(&time)) {
                return Some(samples[index]);
            }
        }
        None
    }

    /// The first sample of the unified timeline at or after `time`.
    pub fn lower_bound(&self, id: ForkId, time: Epoch) -> Option<(Epoch, DegreesOfFreedom)> {
        self.iter_from(id, time).next()
    }

    /// The last sample of the unified timeline at or before `time`.
    pub fn find_at_or_before(
        &self,
        id: ForkId,
        time: Epoch,
    ) -> Option<(Epoch, DegreesOfFreedom)> {
        let mut best = None;
        for (node_id, end) in self.chain(id) {
            let samples = &self.node(node_id).samples[..end];
            let index = samples.partition_point(|(t, _)| *t <= time);
            if index > 0 {
                best = Some(samples[index - 1]);
            }
        }
        best
    }

    /// Appends a sample to `id`'s own timeline.
    ///
    /// # Panics
    /// Panics if `time` is not strictly after the last time of the unified
    /// timeline.
    pub fn append(&mut self, id: ForkId, time: Epoch, dof: DegreesOfFreedom) {
        if let Some((last_time, _)) = self.last(id) {
            assert!(
                time > last_time,
                "samples must be appended in strictly increasing time order: {time} <= {last_time}"
            );
        }
        self.node_mut(id).samples.push((time, dof));
    }

    /// Forks a child at `time`, which must be a sample time of the unified
    /// timeline of `id`, and copies the sample at `time` into the child.
    ///
    /// # Panics
    /// Panics if there is no sample at exactly `time`.
    pub fn new_fork_with_copy_at(&mut self, id: ForkId, time: Epoch) -> ForkId {
        let (_, dof) = self
            .find(id, time)
            .unwrap_or_else(|| panic!("cannot fork at {time}: no sample at that time"));
        self.fork(id, time, vec![(time, dof)])
    }

    /// Forks a child at `time`, which must be a sample time of the unified
    /// timeline of `id`. The child starts with no sample of its own: its
    /// timeline begins at the fork point through its parent.
    ///
    /// # Panics
    /// Panics if there is no sample at exactly `time`.
    pub fn new_fork_without_copy_at(&mut self, id: ForkId, time: Epoch) -> ForkId {
        assert!(
            self.find(id, time).is_some(),
            "cannot fork at {time}: no sample at that time"
        );
        self.fork(id, time, Vec::new())
    }

    /// Forks a child at the last sample of `id`.
    ///
    /// # Panics
    /// Panics if the unified timeline of `id` is empty.
    pub fn new_fork_at_last(&mut self, id: ForkId) -> ForkId {
        let (time, _) = self
            .last(id)
            .unwrap_or_else(|| panic!("cannot fork an empty trajectory at its last sample"));
        self.fork(id, time, Vec::new())
    }

    fn fork(&mut self, id: ForkId, time: Epoch, samples: Vec<(Epoch, DegreesOfFreedom)>) -> ForkId {
        let child = self.allocate(Node {
            parent: Some(id),
            fork_time: Some(time),
            samples,
            children: Vec::new(),
        });
        self.node_mut(id).children.push(child);
        child
    }

    /// Unlinks `id` from its parent and destroys it along with all of its
    /// descendants.
    ///
    /// # Panics
    /// Panics if `id` is the root.
    pub fn delete_fork(&mut self, id: ForkId) {
        let parent = self
            .node(id)
            .parent
            .unwrap_or_else(|| panic!("cannot delete the root"));
        self.node_mut(parent).children.retain(|child| *child != id);
        self.free_subtree(id);
    }

    fn free_subtree(&mut self, id: ForkId) {
        let children = self.node(id).children.clone();
        for child in children {
            self.free_subtree(child);
        }
        self.nodes[id.0] = None;
    }

    /// Drops all samples of `id`'s own timeline strictly after `time`, along
    /// with any fork branching after `time`.
    pub fn forget_after(&mut self, id: ForkId, time: Epoch) {
        let late_children: Vec<ForkId> = self
            .node(id)
            .children
            .iter()
            .copied()
            .filter(|child| self.node(*child).fork_time.unwrap() > time)
            .collect();
        for child in late_children {
            self.delete_fork(child);
        }
        self.node_mut(id)
            .samples
            .retain(|(sample_time, _)| *sample_time <= time);
    }

    /// Depth-first enumeration of the live nodes, parents before children.
    pub(crate) fn depth_first(&self) -> Vec<ForkId> {
        let mut order = Vec::new();
        let mut stack = vec![ForkId::ROOT];
        while let Some(id) = stack.pop() {
            order.push(id);
            for child in self.node(id).children.iter().rev() {
                stack.push(*child);
            }
        }
        order
    }

    pub(crate) fn node_parts(
        &self,
        id: ForkId,
    ) -> (Option<ForkId>, Option<Epoch>, &[(Epoch, DegreesOfFreedom)]) {
        let node = self.node(id);
        (node.parent, node.fork_time, &node.samples)
    }

    pub(crate) fn adopt_node(
        &mut self,
        parent: Option<ForkId>,
        fork_time: Option<Epoch>,
        samples: Vec<(Epoch, DegreesOfFreedom)>,
    ) -> ForkId {
        match parent {
            None => {
                // Replaces the root samples; only valid on a fresh tree.
                assert!(
                    self.node(ForkId::ROOT).samples.is_empty(),
                    "cannot adopt a second root"
                );
                self.node_mut(ForkId::ROOT).samples = samples;
                ForkId::ROOT
            }
            Some(parent) => self.fork(parent, fork_time.expect("forks carry a fork time"), samples),
        }
    }
}
