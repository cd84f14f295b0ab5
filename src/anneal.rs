//! Time-bounded simulated annealing over feasible assignments.
//!
//! The search starts from [`crate::seed::seed_until`] and proposes block
//! relocations (into another room or staging) and block swaps. Proposals
//! that break a hard constraint are discarded before scoring. Worsening
//! moves are accepted with the Metropolis probability; the temperature
//! decays geometrically with elapsed time, so the walk turns greedy as the
//! budget runs out. The best assignment seen is returned, not the last.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rand::prelude::SliceRandom;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::action::{Action, ActionResult};
use crate::cache::TableCache;
use crate::constraint;
use crate::error::OptimizeError;
use crate::model::assignment::{Assignment, Solution};
use crate::model::condition::Score;
use crate::model::entity::Index;
use crate::problem::Problem;
use crate::seed::seed_until;

const IMPROVEMENT_EPSILON: Score = 1e-9;
/// The seed search may overrun a shorter time limit by this much.
const MIN_SEED_TIME: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Starting temperature, relative to the largest weight.
    pub initial_temperature: f64,
    pub final_temperature: f64,
    /// Proposals without a new best before the search gives up early.
    pub stall_iterations: u64,
    /// Share of proposals that are swaps rather than relocations.
    pub swap_ratio: f64,
    pub seed: Option<u64>,
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams {
            initial_temperature: 1.0,
            final_temperature: 0.001,
            stall_iterations: 50_000,
            swap_ratio: 0.5,
            seed: None,
        }
    }
}

struct State {
    assignment: Assignment,
    score: Score,
    n_iterations: u64,
    last_improvement: u64,
}

/// Picks movable blocks from a reshuffled pool, like dealing from a deck.
struct ActionGenerator {
    movable: Vec<Index>,
    candidates: Vec<Index>,
    n_rooms: usize,
    swap_ratio: f64,
    rng: SmallRng,
}

impl ActionGenerator {
    fn init(&mut self) {
        self.candidates = self.movable.clone();
        self.candidates.shuffle(&mut self.rng);
    }

    fn draw(&mut self) -> Index {
        match self.candidates.pop() {
            Some(block) => block,
            None => {
                self.init();
                self.candidates.pop().unwrap_or_default()
            }
        }
    }

    fn next(&mut self, cache: &TableCache) -> Action {
        let block = self.draw();
        if self.movable.len() > 1 && self.rng.gen_bool(self.swap_ratio) {
            let from = cache.location(block);
            for _ in 0..self.movable.len() {
                let other = self.draw();
                if other != block && cache.location(other) != from {
                    return Action::Swap(block, other);
                }
            }
        }
        // staging is drawn as the extra slot past the last room
        let slot = self.rng.gen_range(0..=self.n_rooms);
        let to = if slot == self.n_rooms { None } else { Some(slot) };
        Action::Relocate { block, to }
    }
}

fn temperature(params: &SearchParams, scale: f64, progress: f64) -> f64 {
    let start = params.initial_temperature * scale;
    let end = (params.final_temperature * scale).min(start);
    if start <= 0.0 || end <= 0.0 {
        return 0.0;
    }
    start * (end / start).powf(progress.clamp(0.0, 1.0))
}

fn accepts(rng: &mut SmallRng, diff: Score, temperature: f64) -> bool {
    if diff <= 0.0 {
        return true;
    }
    temperature > 0.0 && rng.gen::<f64>() < (-diff / temperature).exp()
}

pub fn optimize(problem: &Problem, time_limit_ms: u64) -> Result<Solution, OptimizeError> {
    optimize_with(problem, Duration::from_millis(time_limit_ms), &SearchParams::default(), None)
}

/// Runs the search until `time_limit` elapses, the stall window closes or
/// `cancel` is raised. Fails fast when no feasible seed exists.
pub fn optimize_with(
    problem: &Problem,
    time_limit: Duration,
    params: &SearchParams,
    cancel: Option<&AtomicBool>,
) -> Result<Solution, OptimizeError> {
    let started = Instant::now();
    info!(
        event = "optimize_start",
        members = problem.n_members(),
        rooms = problem.n_rooms(),
        time_limit_ms = time_limit.as_millis() as u64,
    );

    let initial = seed_until(problem, started.checked_add(time_limit.max(MIN_SEED_TIME))).map_err(|reason| {
        warn!(event = "infeasible", reason = %reason);
        reason
    })?;

    let mut cache = TableCache::create(problem, &initial);
    let seed_score = cache.score();
    let mut best = State {
        assignment: initial.clone(),
        score: seed_score,
        n_iterations: 0,
        last_improvement: 0,
    };

    let movable: Vec<Index> = cache
        .blocks()
        .iter()
        .enumerate()
        .filter(|(_, block)| !block.pinned)
        .map(|(idx, _)| idx)
        .collect();
    let mut rng = match params.seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    };
    let mut generator = ActionGenerator {
        movable,
        candidates: Vec::new(),
        n_rooms: problem.n_rooms(),
        swap_ratio: params.swap_ratio.clamp(0.0, 1.0),
        rng: SmallRng::seed_from_u64(rng.gen()),
    };

    let weights = problem.weights();
    let scale = weights.alpha.max(weights.beta).max(weights.gamma);
    let scale = if scale > 0.0 { scale } else { 1.0 };
    let limit = time_limit.as_secs_f64();

    if !generator.movable.is_empty() && problem.n_rooms() > 0 {
        loop {
            let elapsed = started.elapsed();
            if elapsed >= time_limit
                || best.n_iterations - best.last_improvement >= params.stall_iterations
                || cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
            {
                break;
            }
            best.n_iterations += 1;

            let action = generator.next(&cache);
            let ActionResult::ScoreDiff(delta) = cache.simulate(&action) else {
                continue;
            };
            let diff = delta.score(weights);
            let progress = if limit > 0.0 { elapsed.as_secs_f64() / limit } else { 1.0 };
            if !accepts(&mut rng, diff, temperature(params, scale, progress)) {
                continue;
            }
            cache.act(&action, &delta);
            trace!(event = "accepted", ?action, diff);

            let current = cache.score();
            if current < best.score - IMPROVEMENT_EPSILON {
                best.assignment = cache.assignment();
                best.score = current;
                best.last_improvement = best.n_iterations;
                debug!(event = "new_best", iteration = best.n_iterations, score = current);
            }
        }
    }

    let assignment = match constraint::validate(&best.assignment, problem) {
        Ok(()) => best.assignment,
        Err(violations) => {
            warn!(event = "best_rejected", violations = violations.len(), "falling back to seed");
            initial
        }
    };
    let runtime_ms = started.elapsed().as_millis() as u64;
    let solution = problem.solution(assignment, runtime_ms, 1);
    info!(
        event = "optimize_end",
        iterations = best.n_iterations,
        seed_score,
        score = solution.score,
        runtime_ms,
    );
    Ok(solution)
}
