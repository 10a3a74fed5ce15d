use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvolveError {
    /// The roulette walk finished without picking a parent. This is an
    /// accounting bug, never a recoverable condition.
    #[error("Selection Exhausted: weighted walk over {candidates} candidates picked nothing")]
    SelectionExhausted { candidates: usize },

    #[error("Worker Pool Busy: a queue run is already in progress")]
    PoolBusy,

    #[error("Worker {worker} Lost: {reason}")]
    WorkerLost { worker: usize, reason: String },

    #[error("Worker Pool Terminated: no live workers to accept the job")]
    PoolTerminated,

    #[error("Invalid Job: {0}")]
    InvalidJob(String),

    #[error("Run Task Failed: {0}")]
    RunTask(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EvolveError {
    pub fn worker_lost(worker: usize, reason: impl Into<String>) -> Self {
        Self::WorkerLost {
            worker,
            reason: reason.into(),
        }
    }

    /// True for failures that indicate a broken internal invariant rather than
    /// an operational problem (busy pool, lost worker, bad input).
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::SelectionExhausted { .. })
    }
}

pub type EvResult<T> = Result<T, EvolveError>;
