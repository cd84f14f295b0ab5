use std::ops::Add;

use serde::{Deserialize, Serialize};

use crate::constraint::ViolationKind;
use crate::model::condition::{Score, WeightVector};
use crate::model::entity::{Index, MemberId, RoomId};

/// A manual edit: relocate one member. `None` on either side is staging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Move {
    pub member_id: MemberId,
    #[serde(default)]
    pub from_room_id: Option<RoomId>,
    #[serde(default)]
    pub to_room_id: Option<RoomId>,
}

impl Move {
    pub fn new(member_id: impl Into<MemberId>, from: Option<&str>, to: Option<&str>) -> Move {
        Move {
            member_id: member_id.into(),
            from_room_id: from.map(str::to_string),
            to_room_id: to.map(str::to_string),
        }
    }
}

/// Neighbourhood step of the search, addressed by must-together block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Relocate { block: Index, to: Option<Index> },
    Swap(Index, Index),
}

/// Change of every objective component caused by an action.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Delta {
    pub dislike_pairs: i64,
    pub empty_beds: i64,
    pub affinity: Score,
}

impl Delta {
    pub fn score(&self, weights: &WeightVector) -> Score {
        weights.alpha * self.dislike_pairs as Score + weights.beta * self.empty_beds as Score
            - weights.gamma * self.affinity
    }
}

impl Add for Delta {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Delta {
            dislike_pairs: self.dislike_pairs + rhs.dislike_pairs,
            empty_beds: self.empty_beds + rhs.empty_beds,
            affinity: self.affinity + rhs.affinity,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    ScoreDiff(Delta),
    Unsatisfied(ViolationKind),
}

impl Add for ActionResult {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (ActionResult::ScoreDiff(d1), ActionResult::ScoreDiff(d2)) => ActionResult::ScoreDiff(d1 + d2),
            (ActionResult::Unsatisfied(kind), _) | (_, ActionResult::Unsatisfied(kind)) => {
                ActionResult::Unsatisfied(kind)
            }
        }
    }
}
