use std::fmt;

use serde::Serialize;

use crate::model::assignment::Assignment;
use crate::problem::Problem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    OverCapacity,
    MustApartViolated,
    MustTogetherViolated,
    FixedAssignmentViolated,
    EmptyBedBudgetExceeded,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViolationKind::OverCapacity => "OVER_CAPACITY",
            ViolationKind::MustApartViolated => "MUST_APART_VIOLATED",
            ViolationKind::MustTogetherViolated => "MUST_TOGETHER_VIOLATED",
            ViolationKind::FixedAssignmentViolated => "FIXED_ASSIGNMENT_VIOLATED",
            ViolationKind::EmptyBedBudgetExceeded => "EMPTY_BED_BUDGET_EXCEEDED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub detail: String,
}

impl Violation {
    fn new(kind: ViolationKind, detail: String) -> Violation {
        Violation { kind, detail }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Total unused beds over every room, empty rooms included.
pub fn empty_beds(assignment: &Assignment, problem: &Problem) -> u32 {
    assignment
        .occupancy(problem.n_rooms())
        .iter()
        .enumerate()
        .map(|(room, count)| problem.capacity(room).saturating_sub(*count))
        .sum()
}

/// Checks every hard constraint and reports all violations, in the order
/// capacity, must-apart, must-together, pins, empty-bed budget.
pub fn validate(assignment: &Assignment, problem: &Problem) -> Result<(), Vec<Violation>> {
    let mut violations = Vec::new();
    let members = problem.members();
    let rooms = problem.rooms();

    for (room, count) in assignment.occupancy(problem.n_rooms()).into_iter().enumerate() {
        if count > rooms[room].capacity {
            violations.push(Violation::new(
                ViolationKind::OverCapacity,
                format!("room {} holds {} members but has capacity {}", rooms[room].label, count, rooms[room].capacity),
            ));
        }
    }

    for a in 0..problem.n_members() {
        for &b in problem.apart_from(a).iter().filter(|b| **b > a) {
            if let Some(room) = assignment.room_of(a).filter(|room| assignment.room_of(b) == Some(*room)) {
                violations.push(Violation::new(
                    ViolationKind::MustApartViolated,
                    format!("{} and {} must be apart but share room {}", members[a].id, members[b].id, rooms[room].label),
                ));
            }
        }
    }

    for a in 0..problem.n_members() {
        for &b in problem.together_with(a).iter().filter(|b| **b > a) {
            let (ra, rb) = (assignment.room_of(a), assignment.room_of(b));
            if ra.is_none() || ra != rb {
                violations.push(Violation::new(
                    ViolationKind::MustTogetherViolated,
                    format!("{} and {} must share a room", members[a].id, members[b].id),
                ));
            }
        }
    }

    for member in 0..problem.n_members() {
        if let Some(pinned) = problem.pin(member) {
            if assignment.room_of(member) != Some(pinned) {
                violations.push(Violation::new(
                    ViolationKind::FixedAssignmentViolated,
                    format!("{} is pinned to room {}", members[member].id, rooms[pinned].label),
                ));
            }
        }
    }

    if let Some(budget) = problem.policy().budget() {
        let empty = empty_beds(assignment, problem);
        if empty > budget {
            violations.push(Violation::new(
                ViolationKind::EmptyBedBudgetExceeded,
                format!("{empty} empty beds exceed the budget of {budget}"),
            ));
        }
    }

    if violations.is_empty() { Ok(()) } else { Err(violations) }
}

pub fn is_feasible(assignment: &Assignment, problem: &Problem) -> bool {
    validate(assignment, problem).is_ok()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::condition::{ConstraintSet, Pair, Policy, WeightVector};
    use crate::model::entity::{Member, Room};

    fn problem(constraints: ConstraintSet, policy: Policy) -> Problem {
        Problem::new(
            ["m1", "m2", "m3"].into_iter().map(Member::new).collect(),
            vec![Room::new("A", 2), Room::new("B", 2)],
            constraints,
            policy,
            WeightVector::default(),
        )
        .unwrap()
    }

    fn kinds(result: Result<(), Vec<Violation>>) -> Vec<ViolationKind> {
        result.err().unwrap_or_default().into_iter().map(|v| v.kind).collect()
    }

    #[test]
    fn accepts_feasible_assignment() {
        let p = problem(ConstraintSet::default(), Policy::default());
        assert!(validate(&Assignment::from_slots(vec![Some(0), Some(0), Some(1)]), &p).is_ok());
    }

    #[test]
    fn collects_every_violation_in_order() {
        let constraints = ConstraintSet {
            must_apart_pairs: vec![Pair::new("m1", "m2").unwrap()],
            must_together_pairs: vec![Pair::new("m2", "m3").unwrap()],
            fixed_room_assignments: BTreeMap::from([("m3".to_string(), "B".to_string())]),
            ..Default::default()
        };
        let p = problem(constraints, Policy { allow_empty_beds: false, empty_bed_budget: None });
        let assignment = Assignment::from_slots(vec![Some(0), Some(0), Some(0)]);

        assert_eq!(
            kinds(validate(&assignment, &p)),
            vec![
                ViolationKind::OverCapacity,
                ViolationKind::MustApartViolated,
                ViolationKind::FixedAssignmentViolated,
                ViolationKind::EmptyBedBudgetExceeded,
            ]
        );
    }

    #[test]
    fn together_in_staging_is_not_together() {
        let constraints = ConstraintSet {
            must_together_pairs: vec![Pair::new("m1", "m2").unwrap()],
            ..Default::default()
        };
        let p = problem(constraints, Policy::default());
        let assignment = Assignment::from_slots(vec![None, None, Some(0)]);

        assert_eq!(kinds(validate(&assignment, &p)), vec![ViolationKind::MustTogetherViolated]);
    }

    #[test]
    fn apart_members_may_both_wait_in_staging() {
        let constraints = ConstraintSet {
            must_apart_pairs: vec![Pair::new("m1", "m2").unwrap()],
            ..Default::default()
        };
        let p = problem(constraints, Policy::default());
        assert!(validate(&Assignment::from_slots(vec![None, None, Some(1)]), &p).is_ok());
    }

    #[test]
    fn budget_counts_empty_rooms_too() {
        let p = problem(ConstraintSet::default(), Policy { allow_empty_beds: true, empty_bed_budget: Some(1) });
        let assignment = Assignment::from_slots(vec![Some(0), Some(0), None]);

        assert_eq!(empty_beds(&assignment, &p), 2);
        assert_eq!(kinds(validate(&assignment, &p)), vec![ViolationKind::EmptyBedBudgetExceeded]);
    }
}
