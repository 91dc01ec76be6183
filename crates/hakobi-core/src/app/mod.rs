//! Application layer: claim, dispatch, heartbeat, report.

pub mod dispatcher;
pub mod lease_keeper;
pub mod poll_loop;
pub mod registry;
pub mod slots;
pub mod status;
pub mod worker;

#[cfg(test)]
pub(crate) mod testutil;

pub use registry::{
    DynHandler, FnHandler, Handler, HandlerRegistry, RegistryError, TaskContext, TypedHandler,
};
pub use status::{CountsSnapshot, WorkerCounts};
pub use worker::{Worker, WorkerBuilder, WorkerHandle};
