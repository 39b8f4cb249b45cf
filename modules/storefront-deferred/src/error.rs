//! Typed errors for the deferred engine and its task queue.

use thiserror::Error;

use crate::types::PromiseId;

/// Errors raised by the engine itself, as opposed to rejection reasons
/// produced by handlers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A promise was asked to adopt a source whose adoption chain leads back
    /// to the promise itself.
    #[error("adoption cycle: {promise} cannot adopt {source_id}")]
    AdoptionCycle {
        promise: PromiseId,
        source_id: PromiseId,
    },

    /// A single drain ran more tasks than the configured limit.
    #[error("task queue drain exceeded {limit} tasks")]
    DrainLimitExceeded { limit: usize },

    /// `run_until_idle` was called from inside a running task.
    #[error("task queue drained re-entrantly from inside a task")]
    ReentrantDrain,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
