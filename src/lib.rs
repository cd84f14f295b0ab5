//! Room assignment engine.
//!
//! Members are placed into capacity-bounded rooms (or left in staging) so
//! that every hard constraint holds, while a weighted soft score over
//! dislike pairs, empty beds and preference affinity is minimised by a
//! time-bounded simulated annealing search. Optimized solutions can then be
//! edited one validated move at a time.

pub mod action;
pub mod anneal;
pub mod api;
pub mod cache;
pub mod config;
pub mod constraint;
pub mod error;
pub mod model;
pub mod preference;
pub mod problem;
pub mod score;
pub mod seed;
pub mod server;
pub mod validator;

pub use action::Move;
pub use anneal::{optimize, optimize_with, SearchParams};
pub use constraint::{validate, Violation, ViolationKind};
pub use error::{InputError, Infeasibility, MoveError, OptimizeError};
pub use model::assignment::{Assignment, Solution};
pub use problem::Problem;
pub use validator::{apply_move, SolutionBoard};
