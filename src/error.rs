use thiserror::Error;

use crate::constraint::Violation;
use crate::model::entity::{MemberId, RoomId};

/// Malformed run inputs, rejected before any search starts.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InputError {
    #[error("member id {0} appears more than once")]
    DuplicateMember(MemberId),
    #[error("room id {0} appears more than once")]
    DuplicateRoom(RoomId),
    #[error("room {room} has capacity {capacity}, expected at least 1")]
    InvalidCapacity { room: RoomId, capacity: i64 },
    #[error("{context} references unknown member {member}")]
    UnknownMember { context: &'static str, member: MemberId },
    #[error("{context} references unknown room {room}")]
    UnknownRoom { context: &'static str, room: RoomId },
    #[error("pair lists member {0} twice")]
    SelfPair(MemberId),
    #[error("weight {name} must be finite and nonnegative, got {value}")]
    InvalidWeight { name: &'static str, value: f64 },
}

/// The obstruction that makes a configuration impossible to satisfy.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Infeasibility {
    #[error("a must-together group of size {size} exceeds the largest room capacity of {largest_capacity}")]
    TogetherGroupTooLarge { size: usize, largest_capacity: u32, members: Vec<MemberId> },
    #[error("must-together group {members:?} is pinned to different rooms")]
    ConflictingPins { members: Vec<MemberId> },
    #[error("room {room} must hold {required} pinned members but has capacity {capacity}")]
    PinnedRoomOverflow { room: RoomId, required: usize, capacity: u32 },
    #[error("{a} and {b} must be apart but are linked by must-together pairs")]
    ApartInsideTogetherGroup { a: MemberId, b: MemberId },
    #[error("{a} and {b} must be apart but are both pinned to room {room}")]
    PinnedApartConflict { a: MemberId, b: MemberId, room: RoomId },
    #[error("no room can take must-together group {members:?}")]
    TogetherGroupUnplaceable { members: Vec<MemberId> },
    #[error("at least {min_empty} beds stay empty but the empty-bed budget is {budget}")]
    EmptyBedBudget { min_empty: u32, budget: u32 },
    /// Not a proof: the time limit ran out before a feasible assignment was found.
    #[error("no feasible assignment found within {elapsed_ms} ms; feasibility is undecided")]
    SearchTimedOut { elapsed_ms: u64 },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum OptimizeError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("infeasible configuration: {0}")]
    Infeasible(#[from] Infeasibility),
}

/// Why a manual move was refused. The solution it targeted is left untouched.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MoveError {
    #[error("unknown member {0}")]
    UnknownMember(MemberId),
    #[error("unknown room {0}")]
    UnknownRoom(RoomId),
    #[error("member {member} is in {actual:?}, not {expected:?}")]
    StaleOrigin { member: MemberId, expected: Option<RoomId>, actual: Option<RoomId> },
    #[error("move violates {} hard constraint(s)", .0.len())]
    Rejected(Vec<Violation>),
    #[error("solution is at version {current}, move was made against version {expected}")]
    VersionConflict { expected: u64, current: u64 },
}

impl MoveError {
    pub fn violations(&self) -> &[Violation] {
        match self {
            MoveError::Rejected(violations) => violations,
            _ => &[],
        }
    }
}
