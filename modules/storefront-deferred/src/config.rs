use std::env;

use crate::error::{EngineError, EngineResult};

const DEFAULT_MAX_TASKS_PER_DRAIN: usize = 100_000;

/// Task queue configuration, loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Upper bound on tasks run by a single `run_until_idle` call. Guards
    /// against continuations that keep rescheduling themselves.
    pub max_tasks_per_drain: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_drain: DEFAULT_MAX_TASKS_PER_DRAIN,
        }
    }
}

impl QueueConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset.
    pub fn from_env() -> EngineResult<Self> {
        let config = Self {
            max_tasks_per_drain: parse_limit(env::var("DEFERRED_MAX_TASKS_PER_DRAIN").ok())?,
        };

        tracing::info!(
            max_tasks_per_drain = config.max_tasks_per_drain,
            "Queue config loaded"
        );
        Ok(config)
    }

    pub fn with_max_tasks_per_drain(mut self, limit: usize) -> Self {
        self.max_tasks_per_drain = limit;
        self
    }
}

fn parse_limit(raw: Option<String>) -> EngineResult<usize> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_MAX_TASKS_PER_DRAIN);
    };
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(EngineError::Config(
            "DEFERRED_MAX_TASKS_PER_DRAIN must be greater than zero".to_string(),
        )),
        Ok(limit) => Ok(limit),
        Err(_) => Err(EngineError::Config(format!(
            "DEFERRED_MAX_TASKS_PER_DRAIN must be a number, got {raw:?}"
        ))),
    }
}
