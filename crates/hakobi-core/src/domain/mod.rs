//! Domain model (ids, tasks, variables, outcomes, retry, errors).
//!
//! Everything here is architecture-agnostic: no queues, no sockets, no
//! clocks beyond the timestamps the engine hands us.

pub mod errors;
pub mod outcome;
pub mod retry;
pub mod task;
pub mod variables;

pub use errors::{ConfigError, EngineError};
pub use outcome::HandlerResult;
pub use retry::{RetryDecision, RetryPolicy};
pub use task::{Task, TaskId, TaskInput, Topic, WorkerId};
pub use variables::{VariableValue, Variables};
