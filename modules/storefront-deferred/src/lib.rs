//! Deferred/promise engine for the storefront services.
//!
//! Provides `defer`, `then`/`always` chaining, adoption of foreign thenables,
//! `when`, `all`, and pre-rejected promises. The engine never decides when a
//! continuation runs; it hands every continuation to an injected `Scheduler`
//! and reports handler failures to an injected `ExceptionHandler`.
//!
//! Single-threaded and cooperative. No cancellation, no timeouts.

mod all;
pub mod config;
pub mod deferred;
pub mod engine;
pub mod error;
pub mod promise;
pub mod scheduler;
pub mod traits;
pub mod types;

pub use config::QueueConfig;
pub use deferred::Deferred;
pub use engine::{Engine, TracingExceptionHandler};
pub use error::{EngineError, EngineResult};
pub use promise::Promise;
pub use scheduler::TaskQueue;
pub use traits::{Callback, ExceptionHandler, Scheduler, Task, Thenable};
pub use types::{Collection, Handler, HandlerResult, PromiseId, PromiseState, PromiseValue, Resolution};
