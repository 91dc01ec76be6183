//! Handler registry: topic -> handler lookup, built once, then read-only.
//!
//! Two layers:
//! - **Typed**: `Handler<P>` receives its payload already decoded from the
//!   task variables. The topic/payload pairing is fixed at registration.
//! - **Erased**: `DynHandler` is object-safe and works on the raw
//!   `TaskInput`, so the registry can hold handlers of different payload
//!   types in one map. `TypedHandler` bridges the two.
//!
//! The registry is mutable only while the worker is being built; at runtime
//! it is shared behind an `Arc` and never locked.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::domain::{HandlerResult, TaskInput, Topic};

/// A typed handler input: the decoded payload plus the raw task view.
#[derive(Debug, Clone)]
pub struct TaskContext<P> {
    pub payload: P,
    pub task: TaskInput,
}

/// Typed handler for one topic's payload shape.
#[async_trait]
pub trait Handler<P>: Send + Sync
where
    P: DeserializeOwned + Send + 'static,
{
    async fn handle(&self, ctx: TaskContext<P>) -> HandlerResult;
}

/// Object-safe handler abstraction; what the dispatcher actually invokes.
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(&self, input: TaskInput) -> HandlerResult;
}

/// Type-erasing adapter from `Handler<P>` to `DynHandler`.
///
/// A payload that does not decode can never succeed, so the decode error is
/// reported as a non-retriable technical failure rather than burning the
/// task's whole retry budget on it.
pub struct TypedHandler<P, H> {
    handler: H,
    _marker: PhantomData<fn() -> P>,
}

impl<P, H> TypedHandler<P, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<P, H> DynHandler for TypedHandler<P, H>
where
    P: DeserializeOwned + Send + 'static,
    H: Handler<P>,
{
    async fn handle_dyn(&self, input: TaskInput) -> HandlerResult {
        let payload: P = match serde_json::from_value(input.variables.to_json()) {
            Ok(p) => p,
            Err(e) => {
                return HandlerResult::permanent_failure(format!(
                    "variables do not decode into the expected payload: {e}"
                ));
            }
        };
        self.handler.handle(TaskContext { payload, task: input }).await
    }
}

/// Closure-based handler, handy in small binaries and tests.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> DynHandler for FnHandler<F>
where
    F: Fn(TaskInput) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = HandlerResult> + Send,
{
    async fn handle_dyn(&self, input: TaskInput) -> HandlerResult {
        (self.0)(input).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("a handler for topic '{0}' is already registered")]
    AlreadyRegistered(Topic),
}

/// Registry of handlers (topic -> handler).
///
/// If you want "last wins", change `register` to overwrite instead of error.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Topic, Arc<dyn DynHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a typed handler for a topic.
    pub fn register<P, H>(&mut self, topic: Topic, handler: H) -> Result<(), RegistryError>
    where
        P: DeserializeOwned + Send + 'static,
        H: Handler<P> + 'static,
    {
        self.register_dyn(topic, Arc::new(TypedHandler::<P, H>::new(handler)))
    }

    /// Register an already-erased handler (escape hatch for handlers that
    /// want the raw variables).
    pub fn register_dyn(
        &mut self,
        topic: Topic,
        handler: Arc<dyn DynHandler>,
    ) -> Result<(), RegistryError> {
        if self.handlers.contains_key(&topic) {
            return Err(RegistryError::AlreadyRegistered(topic));
        }
        self.handlers.insert(topic, handler);
        Ok(())
    }

    pub fn get(&self, topic: &Topic) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(topic).cloned()
    }

    pub fn contains(&self, topic: &Topic) -> bool {
        self.handlers.contains_key(topic)
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.handlers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskId, Variables};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct GreetPayload {
        name: String,
    }

    struct GreetHandler;

    #[async_trait]
    impl Handler<GreetPayload> for GreetHandler {
        async fn handle(&self, ctx: TaskContext<GreetPayload>) -> HandlerResult {
            HandlerResult::completed_with(
                Variables::new().with("greeting", format!("hello {}", ctx.payload.name)),
            )
        }
    }

    fn input_with(vars: Variables) -> TaskInput {
        TaskInput {
            id: TaskId::new("t-1"),
            topic: Topic::new("greet"),
            variables: vars,
            process_instance_id: "pi-1".to_string(),
            business_key: None,
        }
    }

    #[tokio::test]
    async fn typed_handler_decodes_variables() {
        let mut reg = HandlerRegistry::new();
        reg.register::<GreetPayload, _>(Topic::new("greet"), GreetHandler)
            .unwrap();

        let handler = reg.get(&Topic::new("greet")).unwrap();
        let result = handler
            .handle_dyn(input_with(Variables::new().with("name", "world")))
            .await;

        match result {
            HandlerResult::Completed { variables } => {
                assert_eq!(
                    variables.get("greeting"),
                    Some(&crate::domain::VariableValue::String("hello world".into()))
                );
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn decode_failure_is_a_permanent_technical_failure() {
        let handler = TypedHandler::<GreetPayload, _>::new(GreetHandler);
        let result = handler
            .handle_dyn(input_with(Variables::new().with("name", 42_i64)))
            .await;

        match result {
            HandlerResult::TechnicalFailure { retriable, .. } => assert!(!retriable),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fn_handler_runs_the_closure() {
        let mut reg = HandlerRegistry::new();
        reg.register_dyn(
            Topic::new("echo"),
            Arc::new(FnHandler(|input: TaskInput| async move {
                HandlerResult::completed_with(input.variables)
            })),
        )
        .unwrap();

        let handler = reg.get(&Topic::new("echo")).unwrap();
        let result = handler
            .handle_dyn(input_with(Variables::new().with("x", 1_i64)))
            .await;
        assert!(result.is_completed());
    }

    #[test]
    fn double_registration_is_an_error() {
        let mut reg = HandlerRegistry::new();
        reg.register::<GreetPayload, _>(Topic::new("greet"), GreetHandler)
            .unwrap();
        let err = reg
            .register::<GreetPayload, _>(Topic::new("greet"), GreetHandler)
            .unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered(t) if t.as_str() == "greet"));
    }

    #[test]
    fn missing_topic_returns_none() {
        let reg = HandlerRegistry::new();
        assert!(reg.get(&Topic::new("nope")).is_none());
        assert!(reg.is_empty());
    }
}
