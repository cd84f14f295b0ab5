//! Wire types and the in-memory workspace behind the HTTP endpoints.
//!
//! The workspace plays the part of the persistence layer: it hands out ids
//! for datasets, configs and solutions and keeps one [`SolutionBoard`] per
//! solution so that manual edits are serialized.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::action::Move;
use crate::anneal::optimize_with;
use crate::config::EngineConfig;
use crate::constraint::Violation;
use crate::error::{InputError, Infeasibility, MoveError, OptimizeError};
use crate::model::assignment::{MemberView, RoomView, ScoreBreakdown, Solution};
use crate::model::condition::{ConstraintSet, Policy, Score, WeightVector};
use crate::model::entity::{Member, Room, RoomId};
use crate::problem::Problem;
use crate::validator::SolutionBoard;

pub type DatasetId = u64;
pub type ConfigId = u64;
pub type SolutionId = u64;

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetRequest {
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetResponse {
    pub dataset_id: DatasetId,
    pub member_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomInput {
    pub id: RoomId,
    #[serde(default)]
    pub label: Option<String>,
    /// Signed so that a negative capacity is reported as such rather than
    /// failing deserialization.
    pub capacity: i64,
}

impl TryFrom<RoomInput> for Room {
    type Error = InputError;

    fn try_from(input: RoomInput) -> Result<Self, Self::Error> {
        let capacity = u32::try_from(input.capacity)
            .ok()
            .filter(|c| *c >= 1)
            .ok_or_else(|| InputError::InvalidCapacity { room: input.id.clone(), capacity: input.capacity })?;
        Ok(Room { label: input.label.unwrap_or_else(|| input.id.clone()), id: input.id, capacity })
    }
}

fn default_allow_empty_beds() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigBody {
    pub rooms: Vec<RoomInput>,
    #[serde(default = "default_allow_empty_beds")]
    pub allow_empty_beds: bool,
    #[serde(default)]
    pub empty_bed_budget: Option<u32>,
    #[serde(default)]
    pub hard: ConstraintSet,
    #[serde(default)]
    pub weights: WeightVector,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRequest {
    pub dataset_id: DatasetId,
    pub config: ConfigBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub config_id: ConfigId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeRequest {
    pub dataset_id: DatasetId,
    pub config_id: ConfigId,
    #[serde(default)]
    pub time_limit_sec: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyMoveRequest {
    #[serde(flatten)]
    pub mv: Move,
    /// The version the client last saw. Omitted means "whatever is current".
    #[serde(default)]
    pub version: Option<u64>,
}

/// Response body shared by `/optimize`, `/apply-move` and the solution fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionView {
    pub solution_id: SolutionId,
    pub version: u64,
    pub score: Score,
    pub runtime_ms: u64,
    pub rooms: Vec<RoomView>,
    pub staging: Vec<MemberView>,
    pub soft_scores: ScoreBreakdown,
    pub hard_violations: Vec<Violation>,
}

impl SolutionView {
    pub fn new(solution_id: SolutionId, solution: Solution) -> SolutionView {
        SolutionView {
            solution_id,
            version: solution.version,
            score: solution.score,
            runtime_ms: solution.runtime_ms,
            rooms: solution.rooms,
            staging: solution.staging,
            soft_scores: solution.breakdown,
            hard_violations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violations: Option<Vec<Violation>>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Infeasible(#[from] Infeasibility),
    #[error(transparent)]
    Move(#[from] MoveError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("an optimization for dataset {dataset_id} and config {config_id} is already running")]
    Conflict { dataset_id: DatasetId, config_id: ConfigId },
    #[error("{0}")]
    Internal(String),
}

impl From<OptimizeError> for ApiError {
    fn from(err: OptimizeError) -> Self {
        match err {
            OptimizeError::Input(err) => ApiError::Input(err),
            OptimizeError::Infeasible(reason) => ApiError::Infeasible(reason),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Input(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Infeasible(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Move(MoveError::UnknownMember(_) | MoveError::UnknownRoom(_)) => StatusCode::BAD_REQUEST,
            ApiError::Move(MoveError::Rejected(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Move(MoveError::StaleOrigin { .. } | MoveError::VersionConflict { .. }) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let error = match self {
            ApiError::Input(_) | ApiError::BadRequest(_) => "INVALID_INPUT",
            ApiError::Infeasible(_) => "INFEASIBLE",
            ApiError::Move(MoveError::Rejected(_)) => "CONSTRAINT_VIOLATION",
            ApiError::Move(MoveError::UnknownMember(_) | MoveError::UnknownRoom(_)) => "INVALID_INPUT",
            ApiError::Move(_) | ApiError::Conflict { .. } => "CONFLICT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Internal(_) => "INTERNAL",
        };
        let violations = match self {
            ApiError::Move(err @ MoveError::Rejected(_)) => Some(err.violations().to_vec()),
            _ => None,
        };
        ErrorBody { error, reason: self.to_string(), violations }
    }
}

struct StoredConfig {
    dataset_id: DatasetId,
    problem: Arc<Problem>,
}

/// Removes its key from the in-flight set when dropped, even on panic.
struct InFlight<'w> {
    running: &'w Mutex<HashSet<(DatasetId, ConfigId)>>,
    key: (DatasetId, ConfigId),
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.running.lock().remove(&self.key);
    }
}

pub struct Workspace {
    config: EngineConfig,
    next_id: AtomicU64,
    cancel: AtomicBool,
    datasets: RwLock<HashMap<DatasetId, Arc<Vec<Member>>>>,
    configs: RwLock<HashMap<ConfigId, StoredConfig>>,
    solutions: RwLock<HashMap<SolutionId, Arc<SolutionBoard>>>,
    running: Mutex<HashSet<(DatasetId, ConfigId)>>,
}

impl Workspace {
    pub fn new(config: EngineConfig) -> Workspace {
        Workspace {
            config,
            next_id: AtomicU64::new(1),
            cancel: AtomicBool::new(false),
            datasets: RwLock::new(HashMap::new()),
            configs: RwLock::new(HashMap::new()),
            solutions: RwLock::new(HashMap::new()),
            running: Mutex::new(HashSet::new()),
        }
    }

    fn issue_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Stops every running optimization at its next iteration. Each returns
    /// the best solution found so far.
    pub fn cancel_all(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn register_dataset(&self, request: DatasetRequest) -> Result<DatasetResponse, ApiError> {
        let mut seen = HashSet::with_capacity(request.members.len());
        for member in &request.members {
            if !seen.insert(member.id.as_str()) {
                return Err(InputError::DuplicateMember(member.id.clone()).into());
            }
        }
        let dataset_id = self.issue_id();
        let member_count = request.members.len();
        self.datasets.write().insert(dataset_id, Arc::new(request.members));
        info!(event = "dataset_registered", dataset_id, members = member_count);
        Ok(DatasetResponse { dataset_id, member_count })
    }

    /// Validates the configuration against its dataset up front, so a
    /// malformed config never reaches the optimizer.
    pub fn save_config(&self, request: ConfigRequest) -> Result<ConfigResponse, ApiError> {
        let members = self
            .datasets
            .read()
            .get(&request.dataset_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("dataset {}", request.dataset_id)))?;
        let body = request.config;
        let rooms = body.rooms.into_iter().map(Room::try_from).collect::<Result<Vec<_>, _>>()?;
        let policy = Policy { allow_empty_beds: body.allow_empty_beds, empty_bed_budget: body.empty_bed_budget };
        let problem = Problem::new(members.as_ref().clone(), rooms, body.hard, policy, body.weights)?;

        let config_id = self.issue_id();
        self.configs
            .write()
            .insert(config_id, StoredConfig { dataset_id: request.dataset_id, problem: Arc::new(problem) });
        info!(event = "config_saved", dataset_id = request.dataset_id, config_id);
        Ok(ConfigResponse { config_id })
    }

    fn time_limit(&self, requested: Option<f64>) -> Result<Duration, ApiError> {
        let server = &self.config.server;
        let secs = requested.unwrap_or(server.default_time_limit_sec as f64);
        if !secs.is_finite() || secs < 0.0 {
            return Err(ApiError::BadRequest(format!("timeLimitSec must be a nonnegative number, got {secs}")));
        }
        Ok(Duration::from_secs_f64(secs.min(server.max_time_limit_sec as f64)))
    }

    /// Runs the optimizer to completion on the calling thread.
    pub fn optimize(&self, request: OptimizeRequest) -> Result<SolutionView, ApiError> {
        let time_limit = self.time_limit(request.time_limit_sec)?;
        let problem = match self.configs.read().get(&request.config_id) {
            Some(stored) if stored.dataset_id == request.dataset_id => Arc::clone(&stored.problem),
            Some(_) => {
                return Err(ApiError::NotFound(format!(
                    "config {} for dataset {}",
                    request.config_id, request.dataset_id
                )))
            }
            None => return Err(ApiError::NotFound(format!("config {}", request.config_id))),
        };

        let key = (request.dataset_id, request.config_id);
        if !self.running.lock().insert(key) {
            warn!(event = "optimize_conflict", dataset_id = key.0, config_id = key.1);
            return Err(ApiError::Conflict { dataset_id: key.0, config_id: key.1 });
        }
        let _guard = InFlight { running: &self.running, key };

        let solution = optimize_with(&problem, time_limit, &self.config.search, Some(&self.cancel))?;
        let solution_id = self.issue_id();
        let view = SolutionView::new(solution_id, solution.clone());
        self.solutions.write().insert(solution_id, Arc::new(SolutionBoard::new(problem, solution)));
        Ok(view)
    }

    fn board(&self, solution_id: SolutionId) -> Result<Arc<SolutionBoard>, ApiError> {
        self.solutions
            .read()
            .get(&solution_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("solution {solution_id}")))
    }

    pub fn solution(&self, solution_id: SolutionId) -> Result<SolutionView, ApiError> {
        Ok(SolutionView::new(solution_id, self.board(solution_id)?.snapshot()))
    }

    pub fn apply_move(&self, solution_id: SolutionId, request: ApplyMoveRequest) -> Result<SolutionView, ApiError> {
        let updated = self.board(solution_id)?.apply(&request.mv, request.version)?;
        Ok(SolutionView::new(solution_id, updated))
    }

    pub fn moves(&self, solution_id: SolutionId) -> Result<Vec<Move>, ApiError> {
        Ok(self.board(solution_id)?.history())
    }
}
