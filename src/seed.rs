//! Feasible starting point for the search.
//!
//! Pinned members go first. Must-together blocks follow, largest first,
//! then every remaining member by ascending id. Each block takes the first
//! room that accepts it, singles fall back to staging, and a dead end
//! backtracks into earlier choices. The walk is exhaustive, so a failure is
//! a proof of infeasibility unless the deadline cut it short.

use std::time::Instant;

use itertools::Itertools;
use tracing::debug;

use crate::error::Infeasibility;
use crate::model::assignment::Assignment;
use crate::model::entity::{Index, MemberId};
use crate::problem::Problem;

const DEADLINE_CHECK_INTERVAL: u64 = 1024;

struct Placement<'p> {
    problem: &'p Problem,
    assignment: Assignment,
    occupancy: Vec<u32>,
}

impl<'p> Placement<'p> {
    fn new(problem: &'p Problem) -> Placement<'p> {
        Placement {
            problem,
            assignment: Assignment::staging(problem.n_members()),
            occupancy: vec![0; problem.n_rooms()],
        }
    }

    fn free(&self, room: Index) -> u32 {
        self.problem.capacity(room).saturating_sub(self.occupancy[room])
    }

    fn conflicts(&self, member: Index, room: Index) -> Vec<Index> {
        self.problem
            .apart_from(member)
            .iter()
            .copied()
            .filter(|other| self.assignment.room_of(*other) == Some(room))
            .collect()
    }

    fn fits(&self, block: &[Index], room: Index) -> bool {
        self.free(room) as usize >= block.len() && block.iter().all(|m| self.conflicts(*m, room).is_empty())
    }

    fn place(&mut self, member: Index, room: Option<Index>) {
        if let Some(old) = self.assignment.room_of(member) {
            self.occupancy[old] -= 1;
        }
        if let Some(new) = room {
            self.occupancy[new] += 1;
        }
        self.assignment.set(member, room);
    }
}

/// Depth-first search over the unpinned blocks.
struct Search<'p> {
    placement: Placement<'p>,
    blocks: Vec<Vec<Index>>,
    n_groups: usize,
    /// Members still undecided from each depth on.
    remaining: Vec<u64>,
    total_capacity: u64,
    /// Members that must end up in a room for the empty-bed budget to hold.
    required: u64,
    placed: u64,
    deadline: Option<Instant>,
    nodes: u64,
    timed_out: bool,
    reached_singles: bool,
    stuck_group: Option<usize>,
    min_empty: u64,
}

impl<'p> Search<'p> {
    fn out_of_time(&mut self) -> bool {
        if !self.timed_out && self.nodes % DEADLINE_CHECK_INTERVAL == 1 {
            self.timed_out = self.deadline.is_some_and(|deadline| Instant::now() >= deadline);
        }
        self.timed_out
    }

    fn solve(&mut self, depth: usize) -> bool {
        self.nodes += 1;
        if self.out_of_time() {
            return false;
        }
        let best_case = self.placed + self.remaining[depth];
        if best_case < self.required {
            self.min_empty = self.min_empty.min(self.total_capacity - best_case);
            return false;
        }
        if depth == self.blocks.len() {
            return true;
        }
        if depth >= self.n_groups {
            self.reached_singles = true;
        }

        let block = self.blocks[depth].clone();
        let mut fitted = false;
        // unpinned blocks are all that is left, so equally sized empty rooms are interchangeable
        let mut empty_sizes_tried = Vec::new();
        for room in 0..self.placement.problem.n_rooms() {
            if !self.placement.fits(&block, room) {
                continue;
            }
            fitted = true;
            if self.placement.occupancy[room] == 0 {
                let capacity = self.placement.problem.capacity(room);
                if empty_sizes_tried.contains(&capacity) {
                    continue;
                }
                empty_sizes_tried.push(capacity);
            }
            for member in &block {
                self.placement.place(*member, Some(room));
            }
            self.placed += block.len() as u64;
            if self.solve(depth + 1) {
                return true;
            }
            for member in &block {
                self.placement.place(*member, None);
            }
            self.placed -= block.len() as u64;
            if self.timed_out {
                return false;
            }
        }

        if block.len() == 1 {
            return self.solve(depth + 1);
        }
        if !fitted {
            self.stuck_group = self.stuck_group.max(Some(depth));
        }
        false
    }
}

fn ids(problem: &Problem, block: &[Index]) -> Vec<MemberId> {
    block.iter().map(|m| problem.members()[*m].id.clone()).collect()
}

fn check_blocks(problem: &Problem, blocks: &[Vec<Index>]) -> Result<(), Infeasibility> {
    let largest_capacity = problem.rooms().iter().map(|r| r.capacity).max().unwrap_or(0);
    for block in blocks.iter().filter(|b| b.len() > 1) {
        for (a, b) in block.iter().tuple_combinations() {
            if problem.apart_from(*a).contains(b) {
                return Err(Infeasibility::ApartInsideTogetherGroup {
                    a: problem.members()[*a].id.clone(),
                    b: problem.members()[*b].id.clone(),
                });
            }
        }
        if block.len() > largest_capacity as usize {
            return Err(Infeasibility::TogetherGroupTooLarge {
                size: block.len(),
                largest_capacity,
                members: ids(problem, block),
            });
        }
        if block.iter().filter_map(|m| problem.pin(*m)).unique().count() > 1 {
            return Err(Infeasibility::ConflictingPins { members: ids(problem, block) });
        }
    }
    Ok(())
}

pub fn seed(problem: &Problem) -> Result<Assignment, Infeasibility> {
    seed_until(problem, None)
}

/// Like [`seed`], but gives up with [`Infeasibility::SearchTimedOut`] once
/// `deadline` passes.
pub fn seed_until(problem: &Problem, deadline: Option<Instant>) -> Result<Assignment, Infeasibility> {
    let started = Instant::now();
    let blocks = problem.together_blocks();
    check_blocks(problem, &blocks)?;

    let budget = problem.policy().budget();
    let total_capacity = problem.total_capacity();
    let min_empty = total_capacity.saturating_sub(problem.n_members() as u64);
    if let Some(budget) = budget {
        if min_empty > u64::from(budget) {
            return Err(Infeasibility::EmptyBedBudget { min_empty: min_empty as u32, budget });
        }
    }

    let mut placement = Placement::new(problem);
    let (pinned, free): (Vec<_>, Vec<_>) =
        blocks.into_iter().partition(|block| block.iter().any(|m| problem.pin(*m).is_some()));

    for block in &pinned {
        let room = block.iter().find_map(|m| problem.pin(*m)).unwrap_or_default();
        for member in block {
            if let Some(&other) = placement.conflicts(*member, room).first() {
                return Err(Infeasibility::PinnedApartConflict {
                    a: problem.members()[other].id.clone(),
                    b: problem.members()[*member].id.clone(),
                    room: problem.rooms()[room].id.clone(),
                });
            }
            placement.place(*member, Some(room));
        }
        if placement.occupancy[room] > problem.capacity(room) {
            return Err(Infeasibility::PinnedRoomOverflow {
                room: problem.rooms()[room].id.clone(),
                required: placement.occupancy[room] as usize,
                capacity: problem.capacity(room),
            });
        }
    }

    let (groups, singles): (Vec<_>, Vec<_>) = free.into_iter().partition(|block| block.len() > 1);
    let n_groups = groups.len();
    let blocks = groups
        .into_iter()
        .sorted_by_key(|block| std::cmp::Reverse(block.len()))
        .chain(singles.into_iter().sorted_by(|a, b| problem.members()[a[0]].id.cmp(&problem.members()[b[0]].id)))
        .collect_vec();
    let mut remaining = vec![0; blocks.len() + 1];
    for (depth, block) in blocks.iter().enumerate().rev() {
        remaining[depth] = remaining[depth + 1] + block.len() as u64;
    }

    let mut search = Search {
        placement,
        blocks,
        n_groups,
        remaining,
        total_capacity,
        required: budget.map_or(0, |b| total_capacity.saturating_sub(u64::from(b))),
        placed: pinned.iter().map(|block| block.len() as u64).sum(),
        deadline,
        nodes: 0,
        timed_out: false,
        reached_singles: false,
        stuck_group: None,
        min_empty: total_capacity,
    };

    if !search.solve(0) {
        if search.timed_out {
            return Err(Infeasibility::SearchTimedOut { elapsed_ms: started.elapsed().as_millis() as u64 });
        }
        return Err(match budget {
            Some(budget) if search.reached_singles || search.stuck_group.is_none() => {
                Infeasibility::EmptyBedBudget { min_empty: search.min_empty as u32, budget }
            }
            _ => Infeasibility::TogetherGroupUnplaceable {
                members: search.stuck_group.map(|depth| ids(problem, &search.blocks[depth])).unwrap_or_default(),
            },
        });
    }

    let assignment = search.placement.assignment;
    debug!(
        event = "seed_built",
        placed = assignment.slots().iter().flatten().count(),
        staged = assignment.slots().iter().filter(|s| s.is_none()).count(),
        nodes = search.nodes,
    );
    Ok(assignment)
}
