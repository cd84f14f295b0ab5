pub mod entity {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Serialize};

    pub type MemberId = String;
    pub type RoomId = String;
    pub type Index = usize;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(untagged)]
    pub enum Attribute {
        Flag(bool),
        Number(i64),
        Text(String),
    }

    /// Optional survey answers. Only soft scoring reads these.
    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Preferences {
        /// Member ids or display names this member asked to share with.
        #[serde(default)]
        pub requested_with: Vec<String>,
        #[serde(default)]
        pub avoid_with: Vec<String>,
        #[serde(default)]
        pub attributes: BTreeMap<String, Attribute>,
        /// Room capacity -> rank, 1 being the most wanted size.
        #[serde(default)]
        pub ranked_room_sizes: BTreeMap<u32, u32>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Member {
        pub id: MemberId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub name: Option<String>,
        #[serde(flatten)]
        pub preferences: Preferences,
    }

    impl Member {
        pub fn new(id: impl Into<MemberId>) -> Member {
            Member { id: id.into(), name: None, preferences: Preferences::default() }
        }

        pub fn named(id: impl Into<MemberId>, name: impl Into<String>) -> Member {
            Member { name: Some(name.into()), ..Member::new(id) }
        }

        pub fn display_name(&self) -> &str {
            self.name.as_deref().unwrap_or(&self.id)
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Room {
        pub id: RoomId,
        pub label: String,
        pub capacity: u32,
    }

    impl Room {
        pub fn new(id: impl Into<RoomId>, capacity: u32) -> Room {
            let id = id.into();
            Room { label: id.clone(), id, capacity }
        }
    }
}


pub mod condition {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    use super::entity::{MemberId, RoomId};

    pub type Score = f64;

    #[derive(Debug, Clone, Error, PartialEq)]
    #[error("a pair needs two distinct members, got {0} twice")]
    pub struct SelfPairError(pub MemberId);

    /// Unordered pair of member ids, stored with the smaller id first.
    #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(try_from = "[MemberId; 2]", into = "[MemberId; 2]")]
    pub struct Pair {
        low: MemberId,
        high: MemberId,
    }

    impl Pair {
        pub fn new(a: impl Into<MemberId>, b: impl Into<MemberId>) -> Result<Pair, SelfPairError> {
            let (a, b) = (a.into(), b.into());
            if a == b {
                return Err(SelfPairError(a));
            }
            Ok(if a < b { Pair { low: a, high: b } } else { Pair { low: b, high: a } })
        }

        pub fn members(&self) -> [&MemberId; 2] {
            [&self.low, &self.high]
        }
    }

    impl TryFrom<[MemberId; 2]> for Pair {
        type Error = SelfPairError;

        fn try_from([a, b]: [MemberId; 2]) -> Result<Self, Self::Error> {
            Pair::new(a, b)
        }
    }

    impl From<Pair> for [MemberId; 2] {
        fn from(pair: Pair) -> Self {
            [pair.low, pair.high]
        }
    }

    pub type PairwiseWeights = BTreeMap<MemberId, BTreeMap<MemberId, f64>>;

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ConstraintSet {
        #[serde(default)]
        pub must_apart_pairs: Vec<Pair>,
        #[serde(default)]
        pub must_together_pairs: Vec<Pair>,
        /// Soft: co-placement costs `alpha` per pair.
        #[serde(default)]
        pub mutual_dislike_pairs: Vec<Pair>,
        #[serde(default)]
        pub fixed_room_assignments: BTreeMap<MemberId, RoomId>,
        /// Explicit directed affinities. When empty they are derived from member preferences.
        #[serde(default, alias = "pairwiseW", skip_serializing_if = "BTreeMap::is_empty")]
        pub pairwise_weights: PairwiseWeights,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Policy {
        pub allow_empty_beds: bool,
        #[serde(default)]
        pub empty_bed_budget: Option<u32>,
    }

    impl Policy {
        /// Upper bound on total empty beds; `None` means unbounded.
        pub fn budget(&self) -> Option<u32> {
            if self.allow_empty_beds { self.empty_bed_budget } else { Some(0) }
        }
    }

    impl Default for Policy {
        fn default() -> Self {
            Policy { allow_empty_beds: true, empty_bed_budget: None }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct WeightVector {
        /// Per co-placed dislike pair.
        pub alpha: f64,
        /// Per empty bed.
        pub beta: f64,
        /// Scales the preference-affinity term.
        pub gamma: f64,
    }

    impl Default for WeightVector {
        fn default() -> Self {
            WeightVector { alpha: 0.2, beta: 0.1, gamma: 0.1 }
        }
    }
}


pub mod assignment {
    use serde::Serialize;

    use super::condition::Score;
    use super::entity::{Index, MemberId, RoomId};

    /// Room slot per member, in problem member order. `None` is staging.
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    pub struct Assignment {
        slots: Vec<Option<Index>>,
    }

    impl Assignment {
        pub fn staging(n_members: usize) -> Assignment {
            Assignment { slots: vec![None; n_members] }
        }

        pub fn from_slots(slots: Vec<Option<Index>>) -> Assignment {
            Assignment { slots }
        }

        pub fn room_of(&self, member: Index) -> Option<Index> {
            self.slots.get(member).copied().flatten()
        }

        pub fn set(&mut self, member: Index, room: Option<Index>) {
            self.slots[member] = room;
        }

        pub fn slots(&self) -> &[Option<Index>] {
            &self.slots
        }

        pub fn len(&self) -> usize {
            self.slots.len()
        }

        pub fn is_empty(&self) -> bool {
            self.slots.is_empty()
        }

        pub fn occupancy(&self, n_rooms: usize) -> Vec<u32> {
            let mut counts = vec![0; n_rooms];
            for room in self.slots.iter().flatten() {
                if let Some(count) = counts.get_mut(*room) {
                    *count += 1;
                }
            }
            counts
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct MemberView {
        pub id: MemberId,
        pub name: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct RoomView {
        pub id: RoomId,
        pub label: String,
        pub capacity: u32,
        pub members: Vec<MemberView>,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ScoreBreakdown {
        pub dislike_pairs: u32,
        pub empty_beds: u32,
        /// Summed co-placement affinity plus room-size bonuses; higher is happier.
        pub affinity: f64,
        pub total: Score,
    }

    /// A feasible assignment together with its score and presentation view.
    /// Lower `score` is better.
    #[derive(Debug, Clone, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Solution {
        #[serde(skip)]
        pub assignment: Assignment,
        pub score: Score,
        pub breakdown: ScoreBreakdown,
        pub runtime_ms: u64,
        pub rooms: Vec<RoomView>,
        pub staging: Vec<MemberView>,
        pub version: u64,
    }

    impl Solution {
        pub fn room_of(&self, member: &str) -> Option<&RoomId> {
            self.rooms
                .iter()
                .find(|room| room.members.iter().any(|m| m.id == member))
                .map(|room| &room.id)
        }
    }
}
