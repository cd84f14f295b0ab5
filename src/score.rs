use crate::constraint::empty_beds;
use crate::model::assignment::{Assignment, ScoreBreakdown};
use crate::model::condition::{Score, WeightVector};
use crate::problem::Problem;

pub fn dislike_pairs(assignment: &Assignment, problem: &Problem) -> u32 {
    (0..problem.n_members())
        .map(|a| {
            problem
                .disliked_by(a)
                .iter()
                .filter(|b| **b > a && assignment.room_of(a).is_some() && assignment.room_of(a) == assignment.room_of(**b))
                .count() as u32
        })
        .sum()
}

pub fn affinity(assignment: &Assignment, problem: &Problem) -> Score {
    let table = problem.affinity();
    (0..problem.n_members())
        .filter_map(|a| assignment.room_of(a).map(|room| (a, room)))
        .map(|(a, room)| {
            let pairs: Score = table
                .partners(a)
                .iter()
                .filter(|(b, _)| *b > a && assignment.room_of(*b) == Some(room))
                .map(|(_, weight)| weight)
                .sum();
            pairs + table.room_bonus(a, room)
        })
        .sum()
}

/// `alpha * dislike_pairs + beta * empty_beds - gamma * affinity`; lower is better.
pub fn combine(weights: &WeightVector, dislike_pairs: u32, empty_beds: u32, affinity: Score) -> Score {
    weights.alpha * dislike_pairs as Score + weights.beta * empty_beds as Score - weights.gamma * affinity
}

pub fn breakdown(assignment: &Assignment, problem: &Problem) -> ScoreBreakdown {
    let dislike_pairs = dislike_pairs(assignment, problem);
    let empty_beds = empty_beds(assignment, problem);
    let affinity = affinity(assignment, problem);
    ScoreBreakdown {
        dislike_pairs,
        empty_beds,
        affinity,
        total: combine(problem.weights(), dislike_pairs, empty_beds, affinity),
    }
}

pub fn score(assignment: &Assignment, problem: &Problem) -> Score {
    breakdown(assignment, problem).total
}
