use itertools::Itertools;

use crate::action::{Action, ActionResult, Delta};
use crate::constraint::{empty_beds, ViolationKind};
use crate::model::assignment::Assignment;
use crate::model::condition::Score;
use crate::model::entity::Index;
use crate::problem::Problem;
use crate::score;

/// A must-together component and where it currently sits.
#[derive(Debug, Clone)]
pub struct Block {
    pub members: Vec<Index>,
    pub pinned: bool,
}

impl Block {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Incrementally maintained assignment with occupancy and objective tallies,
/// so that actions can be checked and scored in time proportional to the
/// moved members' constraint degree.
pub struct TableCache<'p> {
    problem: &'p Problem,
    slots: Vec<Option<Index>>,
    occupancy: Vec<u32>,
    blocks: Vec<Block>,
    dislike_pairs: u32,
    empty_beds: u32,
    affinity: Score,
}

impl<'p> TableCache<'p> {
    pub fn create(problem: &'p Problem, assignment: &Assignment) -> TableCache<'p> {
        let blocks = problem
            .together_blocks()
            .into_iter()
            .map(|members| {
                let pinned = members.iter().any(|m| problem.pin(*m).is_some());
                Block { members, pinned }
            })
            .collect();
        TableCache {
            problem,
            slots: assignment.slots().to_vec(),
            occupancy: assignment.occupancy(problem.n_rooms()),
            blocks,
            dislike_pairs: score::dislike_pairs(assignment, problem),
            empty_beds: empty_beds(assignment, problem),
            affinity: score::affinity(assignment, problem),
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn location(&self, block: Index) -> Option<Index> {
        self.slots[self.blocks[block].members[0]]
    }

    pub fn score(&self) -> Score {
        score::combine(self.problem.weights(), self.dislike_pairs, self.empty_beds, self.affinity)
    }

    pub fn assignment(&self) -> Assignment {
        Assignment::from_slots(self.slots.clone())
    }

    fn room_accepts(&self, room: Index, incoming: &[Index], leaving: &[Index]) -> Result<(), ViolationKind> {
        let load = self.occupancy[room] as usize + incoming.len() - leaving.len();
        if load > self.problem.capacity(room) as usize {
            return Err(ViolationKind::OverCapacity);
        }
        let clash = incoming.iter().any(|m| {
            self.problem
                .apart_from(*m)
                .iter()
                .any(|other| self.slots[*other] == Some(room) && !leaving.contains(other))
        });
        if clash {
            return Err(ViolationKind::MustApartViolated);
        }
        Ok(())
    }

    fn check_budget(&self, empty_change: i64) -> Result<(), ViolationKind> {
        match self.problem.policy().budget() {
            Some(budget) if self.empty_beds as i64 + empty_change > budget as i64 => {
                Err(ViolationKind::EmptyBedBudgetExceeded)
            }
            _ => Ok(()),
        }
    }

    fn check_block_target(&self, block: &Block, to: Option<Index>) -> Result<(), ViolationKind> {
        if block.pinned {
            return Err(ViolationKind::FixedAssignmentViolated);
        }
        if to.is_none() && block.len() > 1 {
            return Err(ViolationKind::MustTogetherViolated);
        }
        Ok(())
    }

    /// Objective change when each listed member moves to its new slot.
    fn delta_for(&self, moved: &[(Index, Option<Index>)]) -> Delta {
        let after = |m: Index| {
            moved
                .iter()
                .find(|(member, _)| *member == m)
                .map(|(_, to)| *to)
                .unwrap_or(self.slots[m])
        };
        let is_moved = |m: Index| moved.iter().any(|(member, _)| *member == m);
        let shared = |a: Option<Index>, b: Option<Index>| a.is_some() && a == b;

        let mut delta = Delta::default();
        for &(m, to) in moved {
            for &p in self.problem.disliked_by(m) {
                if is_moved(p) && p < m {
                    continue;
                }
                delta.dislike_pairs += shared(after(m), after(p)) as i64 - shared(self.slots[m], self.slots[p]) as i64;
            }
            let affinity = self.problem.affinity();
            for &(p, weight) in affinity.partners(m) {
                if is_moved(p) && p < m {
                    continue;
                }
                let change = shared(after(m), after(p)) as i64 - shared(self.slots[m], self.slots[p]) as i64;
                delta.affinity += change as Score * weight;
            }
            delta.affinity += to.map(|r| affinity.room_bonus(m, r)).unwrap_or(0.0)
                - self.slots[m].map(|r| affinity.room_bonus(m, r)).unwrap_or(0.0);
            delta.empty_beds += self.slots[m].is_some() as i64 - to.is_some() as i64;
        }
        delta
    }

    fn simulate_relocate(&self, block: &Block, to: Option<Index>) -> Result<Delta, ViolationKind> {
        let from = self.slots[block.members[0]];
        self.check_block_target(block, to)?;
        if from == to {
            return Ok(Delta::default());
        }
        if let Some(room) = to {
            self.room_accepts(room, &block.members, &[])?;
        }
        let moved = block.members.iter().map(|m| (*m, to)).collect_vec();
        let delta = self.delta_for(&moved);
        self.check_budget(delta.empty_beds)?;
        Ok(delta)
    }

    fn simulate_swap(&self, first: &Block, second: &Block) -> Result<Delta, ViolationKind> {
        let (x, y) = (self.slots[first.members[0]], self.slots[second.members[0]]);
        self.check_block_target(first, y)?;
        self.check_block_target(second, x)?;
        if x == y {
            return Ok(Delta::default());
        }
        if let Some(room) = y {
            self.room_accepts(room, &first.members, &second.members)?;
        }
        if let Some(room) = x {
            self.room_accepts(room, &second.members, &first.members)?;
        }
        let moved = first
            .members
            .iter()
            .map(|m| (*m, y))
            .chain(second.members.iter().map(|m| (*m, x)))
            .collect_vec();
        let delta = self.delta_for(&moved);
        self.check_budget(delta.empty_beds)?;
        Ok(delta)
    }

    pub fn simulate(&self, action: &Action) -> ActionResult {
        let result = match *action {
            Action::Relocate { block, to } => self.simulate_relocate(&self.blocks[block], to),
            Action::Swap(first, second) => self.simulate_swap(&self.blocks[first], &self.blocks[second]),
        };
        match result {
            Ok(delta) => ActionResult::ScoreDiff(delta),
            Err(kind) => ActionResult::Unsatisfied(kind),
        }
    }

    fn place(&mut self, member: Index, to: Option<Index>) {
        if let Some(room) = self.slots[member] {
            self.occupancy[room] -= 1;
        }
        if let Some(room) = to {
            self.occupancy[room] += 1;
        }
        self.slots[member] = to;
    }

    /// Applies an action that `simulate` reported as `ScoreDiff(delta)`.
    pub fn act(&mut self, action: &Action, delta: &Delta) {
        match *action {
            Action::Relocate { block, to } => {
                for m in self.blocks[block].members.clone() {
                    self.place(m, to);
                }
            }
            Action::Swap(first, second) => {
                let (x, y) = (self.location(first), self.location(second));
                for m in self.blocks[first].members.clone() {
                    self.place(m, y);
                }
                for m in self.blocks[second].members.clone() {
                    self.place(m, x);
                }
            }
        }
        self.dislike_pairs = (self.dislike_pairs as i64 + delta.dislike_pairs) as u32;
        self.empty_beds = (self.empty_beds as i64 + delta.empty_beds) as u32;
        self.affinity += delta.affinity;
    }
}
