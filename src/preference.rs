//! Preference affinity between members, the signal behind the `gamma` term.
//!
//! A directed weight `w(a -> b)` is read from an explicit table when the
//! configuration carries one, otherwise derived from survey answers. The
//! pair affinity is `w(a -> b) + w(b -> a)`; members additionally earn a
//! bonus for landing in a room size they ranked.

use std::collections::HashMap;

use itertools::Itertools;

use crate::model::condition::{PairwiseWeights, Score};
use crate::model::entity::{Attribute, Index, Member, MemberId, Room};

const LIKE_SCORE: Score = 3.0;
const DISLIKE_SCORE: Score = -3.0;
const ATTR_MATCH: Score = 0.5;
const ATTR_CLASH: Score = -0.5;
const MESSINESS_CLOSE: Score = 0.3;
const MESSINESS_FAR: Score = -0.3;
const DIRECTED_LIMIT: Score = 3.0;
const MATCHED_ATTRIBUTES: [&str; 3] = ["sleep", "temperature", "room_use"];
const RANK_CEILING: u32 = 5;

#[derive(Debug, Clone, Default)]
pub struct AffinityTable {
    partners: Vec<Vec<(Index, Score)>>,
    room_bonus: Vec<Vec<Score>>,
}

impl AffinityTable {
    pub fn build(
        members: &[Member],
        rooms: &[Room],
        explicit: &PairwiseWeights,
        member_index: &HashMap<MemberId, Index>,
    ) -> AffinityTable {
        let mut directed: HashMap<(Index, Index), Score> = HashMap::new();
        if explicit.is_empty() {
            let by_name = name_lookup(members);
            for pair in (0..members.len()).permutations(2) {
                let (a, b) = (pair[0], pair[1]);
                let weight = derived_weight(&members[a], &members[b], b, &by_name);
                if weight != 0.0 {
                    directed.insert((a, b), weight);
                }
            }
        } else {
            for (from, row) in explicit {
                for (to, weight) in row {
                    if let (Some(&a), Some(&b)) = (member_index.get(from), member_index.get(to)) {
                        if a != b && *weight != 0.0 {
                            directed.insert((a, b), *weight);
                        }
                    }
                }
            }
        }

        let mut symmetric: HashMap<(Index, Index), Score> = HashMap::new();
        for ((a, b), weight) in directed {
            *symmetric.entry((a.min(b), a.max(b))).or_insert(0.0) += weight;
        }
        let mut partners = vec![Vec::new(); members.len()];
        for ((a, b), weight) in symmetric.into_iter().sorted_by(|x, y| x.0.cmp(&y.0)) {
            if weight != 0.0 {
                partners[a].push((b, weight));
                partners[b].push((a, weight));
            }
        }

        let room_bonus = members
            .iter()
            .map(|member| {
                rooms
                    .iter()
                    .map(|room| {
                        member
                            .preferences
                            .ranked_room_sizes
                            .get(&room.capacity)
                            .map(|rank| RANK_CEILING.saturating_sub(*rank) as Score)
                            .unwrap_or(0.0)
                    })
                    .collect()
            })
            .collect();

        AffinityTable { partners, room_bonus }
    }

    pub fn partners(&self, member: Index) -> &[(Index, Score)] {
        self.partners.get(member).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get_pair(&self, a: Index, b: Index) -> Score {
        self.partners(a)
            .iter()
            .find(|(partner, _)| *partner == b)
            .map(|(_, weight)| *weight)
            .unwrap_or(0.0)
    }

    pub fn room_bonus(&self, member: Index, room: Index) -> Score {
        self.room_bonus
            .get(member)
            .and_then(|row| row.get(room))
            .copied()
            .unwrap_or(0.0)
    }
}

fn normalize(name: &str) -> String {
    name.split_whitespace().join(" ").to_lowercase()
}

fn name_lookup(members: &[Member]) -> HashMap<String, Index> {
    let mut lookup = HashMap::new();
    for (idx, member) in members.iter().enumerate() {
        if let Some(name) = &member.name {
            lookup.entry(normalize(name)).or_insert(idx);
        }
    }
    // ids win over display names
    for (idx, member) in members.iter().enumerate() {
        lookup.insert(normalize(&member.id), idx);
    }
    lookup
}

fn mentions(list: &[String], target: Index, by_name: &HashMap<String, Index>) -> bool {
    list.iter().any(|entry| by_name.get(&normalize(entry)) == Some(&target))
}

fn derived_weight(a: &Member, b: &Member, b_index: Index, by_name: &HashMap<String, Index>) -> Score {
    let (pa, pb) = (&a.preferences, &b.preferences);
    let mut score = 0.0;
    if mentions(&pa.requested_with, b_index, by_name) {
        score += LIKE_SCORE;
    }
    if mentions(&pa.avoid_with, b_index, by_name) {
        score += DISLIKE_SCORE;
    }
    for key in MATCHED_ATTRIBUTES {
        if let (Some(Attribute::Text(x)), Some(Attribute::Text(y))) =
            (pa.attributes.get(key), pb.attributes.get(key))
        {
            if x.is_empty() || y.is_empty() {
                continue;
            }
            score += if x.eq_ignore_ascii_case(y) { ATTR_MATCH } else { ATTR_CLASH };
        }
    }
    if let (Some(Attribute::Number(x)), Some(Attribute::Number(y))) =
        (pa.attributes.get("messiness"), pb.attributes.get("messiness"))
    {
        match x.abs_diff(*y) {
            0..=1 => score += MESSINESS_CLOSE,
            2 => {}
            _ => score += MESSINESS_FAR,
        }
    }
    score.clamp(-DIRECTED_LIMIT, DIRECTED_LIMIT)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn index_of(members: &[Member]) -> HashMap<MemberId, Index> {
        members.iter().enumerate().map(|(i, m)| (m.id.clone(), i)).collect()
    }

    #[test]
    fn mutual_request_sums_both_directions() {
        let mut alice = Member::named("a", "Alice");
        alice.preferences.requested_with = vec!["bob".into()];
        let mut bob = Member::named("b", "Bob");
        bob.preferences.requested_with = vec!["Alice".into()];
        let members = vec![alice, bob, Member::new("c")];
        let table = AffinityTable::build(&members, &[], &BTreeMap::new(), &index_of(&members));

        assert_eq!(table.get_pair(0, 1), 6.0);
        assert_eq!(table.get_pair(1, 0), 6.0);
        assert_eq!(table.get_pair(0, 2), 0.0);
    }

    #[test]
    fn directed_weight_is_clamped() {
        let mut a = Member::new("a");
        a.preferences.requested_with = vec!["b".into()];
        a.preferences.attributes.insert("sleep".into(), Attribute::Text("Early".into()));
        let mut b = Member::new("b");
        b.preferences.attributes.insert("sleep".into(), Attribute::Text("early".into()));
        let members = vec![a, b];
        let table = AffinityTable::build(&members, &[], &BTreeMap::new(), &index_of(&members));

        // 3.0 + 0.5 clamps to 3.0, the reverse direction adds 0.5
        assert_eq!(table.get_pair(0, 1), 3.5);
    }

    #[test]
    fn messiness_distance_matters() {
        let mut a = Member::new("a");
        a.preferences.attributes.insert("messiness".into(), Attribute::Number(1));
        let mut b = Member::new("b");
        b.preferences.attributes.insert("messiness".into(), Attribute::Number(5));
        let members = vec![a, b];
        let table = AffinityTable::build(&members, &[], &BTreeMap::new(), &index_of(&members));

        assert!((table.get_pair(0, 1) - -0.6).abs() < 1e-9);
    }

    #[test]
    fn extreme_messiness_values_do_not_overflow() {
        let mut a = Member::new("a");
        a.preferences.attributes.insert("messiness".into(), Attribute::Number(i64::MIN));
        let mut b = Member::new("b");
        b.preferences.attributes.insert("messiness".into(), Attribute::Number(1));
        let members = vec![a, b];
        let table = AffinityTable::build(&members, &[], &BTreeMap::new(), &index_of(&members));

        assert!((table.get_pair(0, 1) - -0.6).abs() < 1e-9);
    }

    #[test]
    fn explicit_table_replaces_derived_weights() {
        let mut a = Member::new("a");
        a.preferences.requested_with = vec!["b".into()];
        let members = vec![a, Member::new("b")];
        let mut explicit = BTreeMap::new();
        explicit.insert("b".to_string(), BTreeMap::from([("a".to_string(), -1.5)]));
        let table = AffinityTable::build(&members, &[], &explicit, &index_of(&members));

        assert_eq!(table.get_pair(0, 1), -1.5);
    }

    #[test]
    fn ranked_room_size_earns_bonus() {
        let mut a = Member::new("a");
        a.preferences.ranked_room_sizes.insert(2, 1);
        a.preferences.ranked_room_sizes.insert(4, 7);
        let members = vec![a];
        let rooms = vec![Room::new("double", 2), Room::new("quad", 4)];
        let table = AffinityTable::build(&members, &rooms, &BTreeMap::new(), &index_of(&members));

        assert_eq!(table.room_bonus(0, 0), 4.0);
        assert_eq!(table.room_bonus(0, 1), 0.0);
    }
}
