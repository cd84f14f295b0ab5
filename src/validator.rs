use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::action::Move;
use crate::constraint::{self, Violation, ViolationKind};
use crate::error::MoveError;
use crate::model::assignment::Solution;
use crate::model::entity::{Index, RoomId};
use crate::problem::Problem;

fn resolve_room(problem: &Problem, room: Option<&RoomId>) -> Result<Option<Index>, MoveError> {
    room.map(|id| problem.room_index(id).ok_or_else(|| MoveError::UnknownRoom(id.clone())))
        .transpose()
}

/// Relocates one member and returns the re-scored solution, or the reason the
/// move was refused. `solution` is never modified; `runtime_ms` carries over.
pub fn apply_move(problem: &Problem, solution: &Solution, mv: &Move) -> Result<Solution, MoveError> {
    let member = problem
        .member_index(&mv.member_id)
        .ok_or_else(|| MoveError::UnknownMember(mv.member_id.clone()))?;

    // A pinned member is refused whatever the rest of the move says.
    if let Some(pinned) = problem.pin(member) {
        return Err(MoveError::Rejected(vec![Violation {
            kind: ViolationKind::FixedAssignmentViolated,
            detail: format!("{} is pinned to room {}", mv.member_id, problem.rooms()[pinned].label),
        }]));
    }

    let from = resolve_room(problem, mv.from_room_id.as_ref())?;
    let to = resolve_room(problem, mv.to_room_id.as_ref())?;

    let actual = solution.assignment.room_of(member);
    if actual != from {
        return Err(MoveError::StaleOrigin {
            member: mv.member_id.clone(),
            expected: mv.from_room_id.clone(),
            actual: actual.map(|room| problem.rooms()[room].id.clone()),
        });
    }

    let mut assignment = solution.assignment.clone();
    assignment.set(member, to);
    constraint::validate(&assignment, problem).map_err(MoveError::Rejected)?;

    Ok(problem.solution(assignment, solution.runtime_ms, solution.version + 1))
}

struct BoardState {
    solution: Solution,
    history: Vec<Move>,
}

/// Single-writer holder of the current solution for interactive editing.
///
/// Every accepted move bumps `version`; callers that pass the version they
/// last saw get a `VersionConflict` instead of silently overwriting a newer edit.
pub struct SolutionBoard {
    problem: Arc<Problem>,
    state: Mutex<BoardState>,
}

impl SolutionBoard {
    pub fn new(problem: Arc<Problem>, solution: Solution) -> SolutionBoard {
        SolutionBoard { problem, state: Mutex::new(BoardState { solution, history: Vec::new() }) }
    }

    pub fn snapshot(&self) -> Solution {
        self.state.lock().solution.clone()
    }

    pub fn version(&self) -> u64 {
        self.state.lock().solution.version
    }

    /// Accepted moves, oldest first.
    pub fn history(&self) -> Vec<Move> {
        self.state.lock().history.clone()
    }

    pub fn apply(&self, mv: &Move, expected_version: Option<u64>) -> Result<Solution, MoveError> {
        let mut state = self.state.lock();
        let current = state.solution.version;
        if let Some(expected) = expected_version.filter(|v| *v != current) {
            return Err(MoveError::VersionConflict { expected, current });
        }
        match apply_move(&self.problem, &state.solution, mv) {
            Ok(updated) => {
                info!(event = "move_applied", member = %mv.member_id, version = updated.version, score = updated.score);
                state.solution = updated.clone();
                state.history.push(mv.clone());
                Ok(updated)
            }
            Err(err) => {
                warn!(event = "move_rejected", member = %mv.member_id, error = %err);
                Err(err)
            }
        }
    }
}
