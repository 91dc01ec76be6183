//! Worker: wiring, startup validation, and graceful shutdown.
//!
//! `WorkerBuilder` collects the client, handlers and topic subscriptions and
//! refuses to start on any configuration problem (fail-fast: a subscribed
//! topic without a handler would otherwise dispatch into nothing at
//! runtime). `WorkerHandle` owns the running poll loops.
//!
//! Shutdown sequence:
//! 1. flip the watch channel; every poll loop stops claiming immediately,
//! 2. join the poll loops (they release any claimed-but-undispatched tasks),
//! 3. wait up to `shutdown_grace` for in-flight handlers to finish,
//! 4. stragglers are left running, never force-killed; their leases expire
//!    and another worker reclaims the tasks.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{TopicConfig, WorkerSettings};
use crate::domain::{ConfigError, Topic};
use crate::ports::LeaseClient;

use super::dispatcher::Dispatcher;
use super::poll_loop::poll_loop;
use super::registry::{DynHandler, Handler, HandlerRegistry, RegistryError};
use super::slots::SlotTable;
use super::status::{CountsSnapshot, WorkerCounts};

pub struct WorkerBuilder {
    settings: WorkerSettings,
    client: Option<Arc<dyn LeaseClient>>,
    registry: HandlerRegistry,
    subscriptions: Vec<(Topic, TopicConfig)>,
}

impl WorkerBuilder {
    pub fn new(settings: WorkerSettings) -> Self {
        Self {
            settings,
            client: None,
            registry: HandlerRegistry::new(),
            subscriptions: Vec::new(),
        }
    }

    pub fn client(mut self, client: Arc<dyn LeaseClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Register a typed handler for a topic.
    pub fn handler<P, H>(mut self, topic: impl Into<String>, handler: H) -> Result<Self, RegistryError>
    where
        P: DeserializeOwned + Send + 'static,
        H: Handler<P> + 'static,
    {
        self.registry.register::<P, H>(Topic::new(topic), handler)?;
        Ok(self)
    }

    /// Register an erased handler (raw variables).
    pub fn handler_dyn(
        mut self,
        topic: impl Into<String>,
        handler: Arc<dyn DynHandler>,
    ) -> Result<Self, RegistryError> {
        self.registry.register_dyn(Topic::new(topic), handler)?;
        Ok(self)
    }

    /// Subscribe to a topic: one poll loop will claim tasks for it.
    pub fn subscribe(mut self, topic: impl Into<String>, config: TopicConfig) -> Self {
        self.subscriptions.push((Topic::new(topic), config));
        self
    }

    /// Validate everything and produce a startable worker.
    pub fn build(self) -> Result<Worker, ConfigError> {
        self.settings.validate()?;

        let client = self.client.ok_or_else(|| {
            ConfigError::InvalidSettings("no lease client configured".to_string())
        })?;

        if self.subscriptions.is_empty() {
            return Err(ConfigError::InvalidSettings(
                "no topic subscriptions configured".to_string(),
            ));
        }

        for (i, (topic, config)) in self.subscriptions.iter().enumerate() {
            config.validate(topic)?;
            if !self.registry.contains(topic) {
                return Err(ConfigError::MissingHandler(topic.clone()));
            }
            if self.subscriptions[..i].iter().any(|(t, _)| t == topic) {
                return Err(ConfigError::InvalidTopic {
                    topic: topic.clone(),
                    reason: "topic subscribed more than once".to_string(),
                });
            }
        }

        Ok(Worker {
            settings: self.settings,
            client,
            registry: Arc::new(self.registry),
            subscriptions: self.subscriptions,
        })
    }
}

/// A validated, not-yet-running worker.
pub struct Worker {
    settings: WorkerSettings,
    client: Arc<dyn LeaseClient>,
    registry: Arc<HandlerRegistry>,
    subscriptions: Vec<(Topic, TopicConfig)>,
}

// The client is a trait object, so Debug is written by hand.
impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("worker_id", &self.settings.worker_id)
            .field("topics", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}

impl Worker {
    /// Spawn one poll loop per subscribed topic, all sharing one slot pool.
    pub fn start(self) -> WorkerHandle {
        let slots = Arc::new(SlotTable::new(self.settings.max_concurrency));
        let counts = Arc::new(WorkerCounts::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&self.client),
            Arc::clone(&self.registry),
            Arc::clone(&slots),
            Arc::clone(&counts),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(self.subscriptions.len());
        for (topic, config) in self.subscriptions {
            let join = tokio::spawn(poll_loop(
                topic,
                Arc::new(config),
                Arc::clone(&self.client),
                Arc::clone(&dispatcher),
                shutdown_rx.clone(),
            ));
            joins.push(join);
        }

        info!(
            worker_id = %self.settings.worker_id,
            topics = joins.len(),
            max_concurrency = slots.capacity(),
            "worker started"
        );

        WorkerHandle {
            settings: self.settings,
            shutdown_tx,
            joins,
            slots,
            counts,
        }
    }
}

/// Handle to a running worker.
pub struct WorkerHandle {
    settings: WorkerSettings,
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
    slots: Arc<SlotTable>,
    counts: Arc<WorkerCounts>,
}

impl WorkerHandle {
    /// Stop claiming new tasks. Does not abort in-flight handlers.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Full shutdown: stop polling, drain in-flight work up to the grace
    /// period. Returns the number of tasks still running when we stopped
    /// waiting (0 on a clean drain).
    pub async fn shutdown_and_join(self) -> usize {
        self.request_shutdown();

        for join in self.joins {
            let _ = join.await;
        }

        let stragglers = self.slots.wait_idle(self.settings.shutdown_grace).await;
        if stragglers > 0 {
            warn!(
                worker_id = %self.settings.worker_id,
                stragglers,
                "grace period elapsed; leaving tasks to lease expiry"
            );
        } else {
            info!(worker_id = %self.settings.worker_id, "worker drained cleanly");
        }
        stragglers
    }

    pub fn counts(&self) -> CountsSnapshot {
        self.counts.snapshot()
    }

    pub async fn tasks_in_flight(&self) -> usize {
        self.slots.in_flight().await
    }
}
