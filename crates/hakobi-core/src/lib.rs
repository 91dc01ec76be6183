//! hakobi-core
//!
//! Lease-based external task worker: claim batches from a remote process
//! engine, run registered handlers under bounded concurrency, keep leases
//! alive while handlers run, and report outcomes back.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（task, variables, outcome, retry, errors）
//! - **ports**: 抽象化レイヤー（LeaseClient）
//! - **app**: アプリケーションロジック（worker, poll_loop, dispatcher, lease_keeper, registry, slots, status）
//! - **impls**: 実装（HttpLeaseClient, 開発用 InMemoryEngine）
//! - **config**: TopicConfig / WorkerSettings

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{Worker, WorkerBuilder, WorkerHandle};
pub use config::{TopicConfig, WorkerSettings};
pub use domain::{HandlerResult, Task, TaskId, TaskInput, Topic, Variables, WorkerId};
pub use ports::LeaseClient;
