use std::collections::HashMap;

use itertools::Itertools;

use crate::error::InputError;
use crate::model::assignment::{Assignment, MemberView, RoomView, Solution};
use crate::model::condition::{ConstraintSet, Pair, Policy, WeightVector};
use crate::model::entity::{Index, Member, MemberId, Room, RoomId};
use crate::preference::AffinityTable;
use crate::score;

/// Read-only bundle of members, rooms, constraints, policy and weights.
///
/// Construction rejects malformed data, so every id stored here resolves.
#[derive(Debug, Clone)]
pub struct Problem {
    members: Vec<Member>,
    rooms: Vec<Room>,
    constraints: ConstraintSet,
    policy: Policy,
    weights: WeightVector,
    member_index: HashMap<MemberId, Index>,
    room_index: HashMap<RoomId, Index>,
    apart: Vec<Vec<Index>>,
    together: Vec<Vec<Index>>,
    dislike: Vec<Vec<Index>>,
    pins: Vec<Option<Index>>,
    affinity: AffinityTable,
}

impl Problem {
    pub fn new(
        members: Vec<Member>,
        rooms: Vec<Room>,
        constraints: ConstraintSet,
        policy: Policy,
        weights: WeightVector,
    ) -> Result<Problem, InputError> {
        let mut member_index = HashMap::with_capacity(members.len());
        for (idx, member) in members.iter().enumerate() {
            if member_index.insert(member.id.clone(), idx).is_some() {
                return Err(InputError::DuplicateMember(member.id.clone()));
            }
        }
        let mut room_index = HashMap::with_capacity(rooms.len());
        for (idx, room) in rooms.iter().enumerate() {
            if room.capacity < 1 {
                return Err(InputError::InvalidCapacity {
                    room: room.id.clone(),
                    capacity: room.capacity.into(),
                });
            }
            if room_index.insert(room.id.clone(), idx).is_some() {
                return Err(InputError::DuplicateRoom(room.id.clone()));
            }
        }
        for (name, value) in [("alpha", weights.alpha), ("beta", weights.beta), ("gamma", weights.gamma)] {
            if !value.is_finite() || value < 0.0 {
                return Err(InputError::InvalidWeight { name, value });
            }
        }

        let adjacency = |pairs: &[Pair], context: &'static str| -> Result<Vec<Vec<Index>>, InputError> {
            let mut adjacency = vec![Vec::new(); members.len()];
            for pair in pairs.iter().unique() {
                let [a, b] = pair.members().map(|id| {
                    member_index
                        .get(id)
                        .copied()
                        .ok_or_else(|| InputError::UnknownMember { context, member: id.clone() })
                });
                let (a, b) = (a?, b?);
                adjacency[a].push(b);
                adjacency[b].push(a);
            }
            Ok(adjacency)
        };
        let apart = adjacency(&constraints.must_apart_pairs, "mustApartPairs")?;
        let together = adjacency(&constraints.must_together_pairs, "mustTogetherPairs")?;
        let dislike = adjacency(&constraints.mutual_dislike_pairs, "mutualDislikePairs")?;

        let mut pins = vec![None; members.len()];
        for (member, room) in &constraints.fixed_room_assignments {
            let m = *member_index.get(member).ok_or_else(|| InputError::UnknownMember {
                context: "fixedRoomAssignments",
                member: member.clone(),
            })?;
            let r = *room_index.get(room).ok_or_else(|| InputError::UnknownRoom {
                context: "fixedRoomAssignments",
                room: room.clone(),
            })?;
            pins[m] = Some(r);
        }

        for (from, row) in &constraints.pairwise_weights {
            for id in std::iter::once(from).chain(row.keys()) {
                if !member_index.contains_key(id) {
                    return Err(InputError::UnknownMember { context: "pairwiseWeights", member: id.clone() });
                }
            }
        }
        let affinity = AffinityTable::build(&members, &rooms, &constraints.pairwise_weights, &member_index);

        Ok(Problem {
            members,
            rooms,
            constraints,
            policy,
            weights,
            member_index,
            room_index,
            apart,
            together,
            dislike,
            pins,
            affinity,
        })
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn weights(&self) -> &WeightVector {
        &self.weights
    }

    pub fn affinity(&self) -> &AffinityTable {
        &self.affinity
    }

    pub fn n_members(&self) -> usize {
        self.members.len()
    }

    pub fn n_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn member_index(&self, id: &str) -> Option<Index> {
        self.member_index.get(id).copied()
    }

    pub fn room_index(&self, id: &str) -> Option<Index> {
        self.room_index.get(id).copied()
    }

    pub fn capacity(&self, room: Index) -> u32 {
        self.rooms[room].capacity
    }

    pub fn total_capacity(&self) -> u64 {
        self.rooms.iter().map(|room| u64::from(room.capacity)).sum()
    }

    pub fn apart_from(&self, member: Index) -> &[Index] {
        &self.apart[member]
    }

    pub fn together_with(&self, member: Index) -> &[Index] {
        &self.together[member]
    }

    pub fn disliked_by(&self, member: Index) -> &[Index] {
        &self.dislike[member]
    }

    pub fn pin(&self, member: Index) -> Option<Index> {
        self.pins[member]
    }

    /// Connected components of the must-together graph, each sorted by member
    /// index, listed by their smallest member.
    pub fn together_blocks(&self) -> Vec<Vec<Index>> {
        let mut block_of = vec![usize::MAX; self.members.len()];
        let mut blocks = Vec::new();
        for start in 0..self.members.len() {
            if block_of[start] != usize::MAX {
                continue;
            }
            let id = blocks.len();
            let mut block = vec![start];
            block_of[start] = id;
            let mut cursor = 0;
            while cursor < block.len() {
                let member = block[cursor];
                for &other in &self.together[member] {
                    if block_of[other] == usize::MAX {
                        block_of[other] = id;
                        block.push(other);
                    }
                }
                cursor += 1;
            }
            block.sort_unstable();
            blocks.push(block);
        }
        blocks
    }

    fn member_view(&self, member: Index) -> MemberView {
        let member = &self.members[member];
        MemberView { id: member.id.clone(), name: member.display_name().to_string() }
    }

    /// Scores `assignment` and lays it out per room. The caller guarantees it is feasible.
    pub fn solution(&self, assignment: Assignment, runtime_ms: u64, version: u64) -> Solution {
        let breakdown = score::breakdown(&assignment, self);
        let mut rooms: Vec<RoomView> = self
            .rooms
            .iter()
            .map(|room| RoomView {
                id: room.id.clone(),
                label: room.label.clone(),
                capacity: room.capacity,
                members: Vec::new(),
            })
            .collect();
        let mut staging = Vec::new();
        for member in (0..self.members.len()).sorted_by(|a, b| self.members[*a].id.cmp(&self.members[*b].id)) {
            match assignment.room_of(member) {
                Some(room) => rooms[room].members.push(self.member_view(member)),
                None => staging.push(self.member_view(member)),
            }
        }
        Solution {
            assignment,
            score: breakdown.total,
            breakdown,
            runtime_ms,
            rooms,
            staging,
            version,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn members(ids: &[&str]) -> Vec<Member> {
        ids.iter().map(|id| Member::new(*id)).collect()
    }

    fn pair(a: &str, b: &str) -> Pair {
        Pair::new(a, b).unwrap()
    }

    #[test]
    fn rejects_duplicate_member_ids() {
        let err = Problem::new(
            members(&["a", "a"]),
            vec![Room::new("r", 2)],
            ConstraintSet::default(),
            Policy::default(),
            WeightVector::default(),
        )
        .unwrap_err();
        assert_eq!(err, InputError::DuplicateMember("a".into()));
    }

    #[test]
    fn rejects_zero_capacity() {
        let err = Problem::new(
            members(&["a"]),
            vec![Room::new("r", 0)],
            ConstraintSet::default(),
            Policy::default(),
            WeightVector::default(),
        )
        .unwrap_err();
        assert!(matches!(err, InputError::InvalidCapacity { capacity: 0, .. }));
    }

    #[test]
    fn rejects_pair_with_unknown_member() {
        let constraints = ConstraintSet { must_apart_pairs: vec![pair("a", "ghost")], ..Default::default() };
        let err = Problem::new(
            members(&["a"]),
            vec![Room::new("r", 2)],
            constraints,
            Policy::default(),
            WeightVector::default(),
        )
        .unwrap_err();
        assert_eq!(err, InputError::UnknownMember { context: "mustApartPairs", member: "ghost".into() });
    }

    #[test]
    fn rejects_pin_to_unknown_room() {
        let constraints = ConstraintSet {
            fixed_room_assignments: BTreeMap::from([("a".to_string(), "nowhere".to_string())]),
            ..Default::default()
        };
        let err = Problem::new(
            members(&["a"]),
            vec![Room::new("r", 2)],
            constraints,
            Policy::default(),
            WeightVector::default(),
        )
        .unwrap_err();
        assert!(matches!(err, InputError::UnknownRoom { .. }));
    }

    #[test]
    fn rejects_negative_weight() {
        let err = Problem::new(
            members(&["a"]),
            vec![Room::new("r", 2)],
            ConstraintSet::default(),
            Policy::default(),
            WeightVector { alpha: -1.0, beta: 0.0, gamma: 0.0 },
        )
        .unwrap_err();
        assert!(matches!(err, InputError::InvalidWeight { name: "alpha", .. }));
    }

    #[test]
    fn together_blocks_follow_transitive_pairs() {
        let constraints = ConstraintSet {
            must_together_pairs: vec![pair("a", "c"), pair("c", "d")],
            ..Default::default()
        };
        let problem = Problem::new(
            members(&["a", "b", "c", "d"]),
            vec![Room::new("r", 4)],
            constraints,
            Policy::default(),
            WeightVector::default(),
        )
        .unwrap();
        assert_eq!(problem.together_blocks(), vec![vec![0, 2, 3], vec![1]]);
    }

    #[test]
    fn solution_lists_staging_members_separately() {
        let problem = Problem::new(
            members(&["b", "a"]),
            vec![Room::new("r", 1)],
            ConstraintSet::default(),
            Policy::default(),
            WeightVector::default(),
        )
        .unwrap();
        let solution = problem.solution(Assignment::from_slots(vec![Some(0), None]), 5, 1);

        assert_eq!(solution.rooms[0].members[0].id, "b");
        assert_eq!(solution.staging[0].id, "a");
        assert_eq!(solution.runtime_ms, 5);
    }
}
