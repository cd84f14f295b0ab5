use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use room_shuffle::constraint::{empty_beds, validate, ViolationKind};
use room_shuffle::model::condition::{ConstraintSet, Pair, Policy, WeightVector};
use room_shuffle::model::entity::{Member, Room};
use room_shuffle::score::score;
use room_shuffle::seed::seed;
use room_shuffle::{
    apply_move, optimize_with, Assignment, Infeasibility, Move, OptimizeError, Problem, SearchParams, SolutionBoard,
};

fn params() -> SearchParams {
    SearchParams { seed: Some(2024), stall_iterations: 3_000, ..SearchParams::default() }
}

fn ids(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("m{i:02}")).collect()
}

fn pair(a: &str, b: &str) -> Pair {
    Pair::new(a, b).unwrap()
}

fn problem(n: usize, rooms: &[(&str, u32)], constraints: ConstraintSet, policy: Policy) -> Problem {
    Problem::new(
        ids(n).into_iter().map(Member::new).collect(),
        rooms.iter().map(|(id, cap)| Room::new(*id, *cap)).collect(),
        constraints,
        policy,
        WeightVector::default(),
    )
    .unwrap()
}

#[test]
fn scenario_a_apart_pair_lands_in_different_rooms() {
    let constraints = ConstraintSet { must_apart_pairs: vec![pair("m01", "m02")], ..Default::default() };
    let p = problem(3, &[("roomA", 2), ("roomB", 2)], constraints, Policy::default());
    let solution = optimize_with(&p, Duration::from_millis(200), &params(), None).unwrap();

    let (a, b) = (solution.room_of("m01"), solution.room_of("m02"));
    assert!(a.is_none() || a != b);
    assert!(validate(&solution.assignment, &p).is_ok());
}

#[test]
fn scenario_b_pinned_member_cannot_be_moved() {
    let constraints = ConstraintSet {
        fixed_room_assignments: BTreeMap::from([("m07".to_string(), "roomA".to_string())]),
        ..Default::default()
    };
    let p = problem(8, &[("roomA", 4), ("roomB", 4)], constraints, Policy::default());
    let solution = optimize_with(&p, Duration::from_millis(100), &params(), None).unwrap();
    assert_eq!(solution.room_of("m07").map(String::as_str), Some("roomA"));

    let err = apply_move(&p, &solution, &Move::new("m07", Some("roomA"), Some("roomB"))).unwrap_err();
    assert_eq!(err.violations()[0].kind, ViolationKind::FixedAssignmentViolated);
}

#[test]
fn scenario_c_full_house_leaves_no_empty_bed() {
    let constraints = ConstraintSet {
        must_apart_pairs: vec![pair("m01", "m02"), pair("m03", "m04")],
        mutual_dislike_pairs: vec![pair("m05", "m06")],
        ..Default::default()
    };
    let strict = Policy { allow_empty_beds: false, empty_bed_budget: None };
    let p = problem(10, &[("r1", 4), ("r2", 3), ("r3", 3)], constraints, strict);
    let solution = optimize_with(&p, Duration::from_millis(200), &params(), None).unwrap();

    assert_eq!(solution.breakdown.empty_beds, 0);
    assert!(solution.staging.is_empty());
}

#[test]
fn full_house_packs_groups_that_first_fit_would_split() {
    let constraints = ConstraintSet {
        must_together_pairs: vec![
            pair("m01", "m02"),
            pair("m02", "m03"),
            pair("m04", "m05"),
            pair("m05", "m06"),
            pair("m07", "m08"),
            pair("m09", "m10"),
        ],
        ..Default::default()
    };
    let strict = Policy { allow_empty_beds: false, empty_bed_budget: None };
    let p = problem(10, &[("r1", 4), ("r2", 3), ("r3", 3)], constraints, strict);
    let solution = optimize_with(&p, Duration::from_millis(200), &params(), None).unwrap();

    assert!(validate(&solution.assignment, &p).is_ok());
    assert_eq!(solution.breakdown.empty_beds, 0);
    assert!(solution.staging.is_empty());
    assert_eq!(solution.room_of("m07"), solution.room_of("m09"));
}

#[test]
fn scenario_c_unpackable_full_house_is_infeasible() {
    let constraints = ConstraintSet {
        must_apart_pairs: vec![pair("m01", "m02"), pair("m01", "m03"), pair("m02", "m03")],
        ..Default::default()
    };
    let strict = Policy { allow_empty_beds: false, empty_bed_budget: None };
    let p = problem(10, &[("r1", 5), ("r2", 5)], constraints, strict);

    let result = optimize_with(&p, Duration::from_secs(5), &params(), None);
    assert!(matches!(result, Err(OptimizeError::Infeasible(Infeasibility::EmptyBedBudget { .. }))));
}

#[test]
fn scenario_d_oversized_together_group_is_infeasible() {
    let constraints = ConstraintSet {
        must_together_pairs: vec![
            pair("m01", "m02"),
            pair("m02", "m03"),
            pair("m03", "m04"),
            pair("m04", "m05"),
        ],
        ..Default::default()
    };
    let p = problem(6, &[("r1", 4), ("r2", 4)], constraints, Policy::default());

    let err = optimize_with(&p, Duration::from_secs(5), &params(), None).unwrap_err();
    assert_eq!(
        err.to_string(),
        "infeasible configuration: a must-together group of size 5 exceeds the largest room capacity of 4"
    );
}

#[test]
fn scoring_is_reproducible() {
    let constraints = ConstraintSet { mutual_dislike_pairs: vec![pair("m01", "m02")], ..Default::default() };
    let p = problem(4, &[("r1", 2), ("r2", 3)], constraints, Policy::default());
    let assignment = seed(&p).unwrap();
    assert_eq!(score(&assignment, &p).to_bits(), score(&assignment, &p).to_bits());
}

#[derive(Debug, Clone)]
struct Config {
    n: usize,
    capacities: Vec<u32>,
    apart: Vec<(usize, usize)>,
    together: Vec<(usize, usize)>,
    dislike: Vec<(usize, usize)>,
    pins: Vec<(usize, usize)>,
    allow_empty_beds: bool,
    budget: Option<u32>,
}

impl Config {
    fn problem(&self) -> Problem {
        let ids = ids(self.n);
        let pairs = |raw: &[(usize, usize)]| {
            raw.iter()
                .filter(|(a, b)| a != b)
                .map(|(a, b)| pair(&ids[*a], &ids[*b]))
                .collect::<Vec<_>>()
        };
        let rooms: Vec<Room> =
            self.capacities.iter().enumerate().map(|(i, cap)| Room::new(format!("r{i}"), *cap)).collect();
        let constraints = ConstraintSet {
            must_apart_pairs: pairs(&self.apart),
            must_together_pairs: pairs(&self.together),
            mutual_dislike_pairs: pairs(&self.dislike),
            fixed_room_assignments: self.pins.iter().map(|(m, r)| (ids[*m].clone(), rooms[*r].id.clone())).collect(),
            ..Default::default()
        };
        Problem::new(
            ids.iter().map(Member::new).collect(),
            rooms,
            constraints,
            Policy { allow_empty_beds: self.allow_empty_beds, empty_bed_budget: self.budget },
            WeightVector { alpha: 1.0, beta: 0.3, gamma: 0.1 },
        )
        .unwrap()
    }
}

fn configs() -> impl Strategy<Value = Config> {
    (1usize..10, prop::collection::vec(1u32..5, 1..4)).prop_flat_map(|(n, capacities)| {
        let rooms = capacities.len();
        let pairs = |max| prop::collection::vec((0..n, 0..n), 0..max);
        (
            Just(n),
            Just(capacities),
            pairs(6),
            pairs(3),
            pairs(6),
            prop::collection::vec((0..n, 0..rooms), 0..3),
            any::<bool>(),
            prop::option::of(0u32..4),
        )
            .prop_map(|(n, capacities, apart, together, dislike, pins, allow_empty_beds, budget)| Config {
                n,
                capacities,
                apart,
                together,
                dislike,
                pins,
                allow_empty_beds,
                budget,
            })
    })
}

/// Whether any placement of every member into a room or staging passes `validate`.
fn feasible_by_enumeration(p: &Problem) -> bool {
    let (n, base) = (p.n_members(), p.rooms().len() + 1);
    let mut digits = vec![0usize; n];
    loop {
        let slots = digits.iter().map(|d| (*d < base - 1).then_some(*d)).collect();
        if validate(&Assignment::from_slots(slots), p).is_ok() {
            return true;
        }
        let Some(i) = digits.iter().position(|d| *d + 1 < base) else {
            return false;
        };
        digits[i] += 1;
        digits[..i].fill(0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn optimized_solutions_satisfy_every_hard_constraint(config in configs()) {
        let p = config.problem();
        match optimize_with(&p, Duration::from_millis(20), &SearchParams { stall_iterations: 500, ..params() }, None) {
            Ok(solution) => {
                prop_assert!(validate(&solution.assignment, &p).is_ok());
                if let Some(budget) = p.policy().budget() {
                    prop_assert!(empty_beds(&solution.assignment, &p) <= budget);
                }
                let seeded = seed(&p).unwrap();
                prop_assert!(solution.score <= score(&seeded, &p) + 1e-9);
            }
            Err(err) => {
                prop_assert!(matches!(err, OptimizeError::Infeasible(_)));
                prop_assert!(!feasible_by_enumeration(&p), "reported {} for a feasible input", err);
            }
        }
    }

    #[test]
    fn manual_moves_are_atomic(config in configs(), member in 0usize..10, target in 0usize..4) {
        let p = Arc::new(config.problem());
        let Ok(solution) = optimize_with(&p, Duration::from_millis(10), &SearchParams { stall_iterations: 200, ..params() }, None) else {
            return Ok(());
        };
        let member = &p.members()[member % p.n_members()].id;
        let to = p.rooms().get(target).map(|room| room.id.as_str());
        let mv = Move::new(member.as_str(), solution.room_of(member).map(String::as_str), to);
        let board = SolutionBoard::new(Arc::clone(&p), solution);
        let before = board.snapshot();

        match board.apply(&mv, Some(before.version)) {
            Ok(updated) => {
                prop_assert!(validate(&updated.assignment, &p).is_ok());
                prop_assert_eq!(updated.version, before.version + 1);
                prop_assert_eq!(updated.runtime_ms, before.runtime_ms);
                prop_assert_eq!(&board.snapshot(), &updated);
                prop_assert_eq!(board.history(), vec![mv]);
            }
            Err(err) => {
                prop_assert!(!err.violations().is_empty());
                prop_assert_eq!(&board.snapshot(), &before);
                prop_assert!(board.history().is_empty());
            }
        }
    }
}
