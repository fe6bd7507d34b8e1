// Copyright 2025 Cowboy AI, LLC.

//! Handler capabilities resolved from the container
//!
//! Constructors provided to the container return one of these capabilities
//! as a trait object (`Arc<dyn CommandHandler<C, R>>` and so on). Behaviors
//! are the exception: they are provided and resolved as their concrete type
//! and only erased to `dyn Behavior` when handed to the registry.

use async_trait::async_trait;
use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

/// Anything that can travel through the dispatcher as a command, query or event
pub trait Message: Any + Send + Sync {}

impl<T: Any + Send + Sync> Message for T {}

/// Anything a command or query handler can answer with
pub trait Reply: Any + Send {}

impl<T: Any + Send> Reply for T {}

/// Type-erased response flowing back through a behavior chain
pub type Response = Box<dyn Any + Send>;

/// Trait for handling a specific event type
#[async_trait]
pub trait EventHandler<E: Message>: Send + Sync {
    /// Handle an event
    async fn handle(&self, event: &E) -> anyhow::Result<()>;
}

/// Trait for handling a command and producing a response
#[async_trait]
pub trait CommandHandler<C: Message, R: Reply>: Send + Sync {
    /// Handle a command
    async fn handle(&self, command: &C) -> anyhow::Result<R>;
}

/// Trait for handling a query and producing a response
#[async_trait]
pub trait QueryHandler<Q: Message, R: Reply>: Send + Sync {
    /// Handle a query
    async fn handle(&self, query: &Q) -> anyhow::Result<R>;
}

/// Middleware wrapped around every command or query handler
///
/// A behavior receives the request and the rest of the chain. Calling
/// [`Next::run`] continues towards the handler; not calling it
/// short-circuits dispatch with whatever the behavior returns.
#[async_trait]
pub trait Behavior: Send + Sync {
    /// Handle a request, optionally delegating to the rest of the chain
    async fn handle(&self, request: Request<'_>, next: Next<'_>) -> anyhow::Result<Response>;
}

/// Borrowed, type-erased view of the message being dispatched
#[derive(Clone, Copy)]
pub struct Request<'a> {
    name: &'static str,
    message: &'a (dyn Any + Send + Sync),
}

impl<'a> Request<'a> {
    pub(crate) fn new<M: Message>(message: &'a M) -> Self {
        Self {
            name: type_name::<M>(),
            message,
        }
    }

    /// Fully qualified type name of the message
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the message is of type `M`
    pub fn is<M: Message>(&self) -> bool {
        self.message.is::<M>()
    }

    /// Borrow the message as `M`
    pub fn downcast_ref<M: Message>(&self) -> Option<&'a M> {
        self.message.downcast_ref::<M>()
    }
}

impl fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request").field("name", &self.name).finish()
    }
}

/// Terminal step of a behavior chain
#[async_trait]
pub(crate) trait Endpoint: Send + Sync {
    async fn call(&self, request: Request<'_>) -> anyhow::Result<Response>;
}

/// Remainder of a behavior chain
pub struct Next<'a> {
    behaviors: &'a [Arc<dyn Behavior>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    pub(crate) fn new(behaviors: &'a [Arc<dyn Behavior>], endpoint: &'a dyn Endpoint) -> Self {
        Self {
            behaviors,
            endpoint,
        }
    }

    /// Number of behaviors still ahead of the handler
    pub fn remaining(&self) -> usize {
        self.behaviors.len()
    }

    /// Continue with the next behavior, or the handler once the chain is exhausted
    pub async fn run(self, request: Request<'_>) -> anyhow::Result<Response> {
        match self.behaviors.split_first() {
            Some((behavior, rest)) => {
                behavior
                    .handle(request, Next::new(rest, self.endpoint))
                    .await
            }
            None => self.endpoint.call(request).await,
        }
    }
}

/// Invokes a command handler at the end of the chain
pub(crate) struct CommandEndpoint<C: Message, R: Reply> {
    pub(crate) handler: Arc<dyn CommandHandler<C, R>>,
}

#[async_trait]
impl<C: Message, R: Reply> Endpoint for CommandEndpoint<C, R> {
    async fn call(&self, request: Request<'_>) -> anyhow::Result<Response> {
        let command = request.downcast_ref::<C>().ok_or_else(|| {
            anyhow::anyhow!("expected {} but received {}", type_name::<C>(), request.name())
        })?;
        let reply = self.handler.handle(command).await?;
        Ok(Box::new(reply))
    }
}

/// Invokes a query handler at the end of the chain
pub(crate) struct QueryEndpoint<Q: Message, R: Reply> {
    pub(crate) handler: Arc<dyn QueryHandler<Q, R>>,
}

#[async_trait]
impl<Q: Message, R: Reply> Endpoint for QueryEndpoint<Q, R> {
    async fn call(&self, request: Request<'_>) -> anyhow::Result<Response> {
        let query = request.downcast_ref::<Q>().ok_or_else(|| {
            anyhow::anyhow!("expected {} but received {}", type_name::<Q>(), request.name())
        })?;
        let reply = self.handler.handle(query).await?;
        Ok(Box::new(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Ping(String);

    struct Echo;

    #[async_trait]
    impl CommandHandler<Ping, String> for Echo {
        async fn handle(&self, command: &Ping) -> anyhow::Result<String> {
            Ok(command.0.clone())
        }
    }

    struct Recording {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Behavior for Recording {
        async fn handle(&self, request: Request<'_>, next: Next<'_>) -> anyhow::Result<Response> {
            self.log.lock().unwrap().push(self.label);
            next.run(request).await
        }
    }

    struct ShortCircuit;

    #[async_trait]
    impl Behavior for ShortCircuit {
        async fn handle(&self, _request: Request<'_>, _next: Next<'_>) -> anyhow::Result<Response> {
            Ok(Box::new("cached".to_string()))
        }
    }

    #[test]
    fn test_request_exposes_type() {
        let ping = Ping("ping".into());
        let request = Request::new(&ping);

        assert!(request.is::<Ping>());
        assert!(!request.is::<String>());
        assert!(request.name().ends_with("Ping"));
        assert_eq!(request.downcast_ref::<Ping>().unwrap().0, "ping");
    }

    #[tokio::test]
    async fn test_chain_runs_in_slice_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let behaviors: Vec<Arc<dyn Behavior>> = vec![
            Arc::new(Recording { label: "outer", log: log.clone() }),
            Arc::new(Recording { label: "inner", log: log.clone() }),
        ];
        let endpoint = CommandEndpoint::<Ping, String> {
            handler: Arc::new(Echo),
        };

        let ping = Ping("pong".into());
        let next = Next::new(&behaviors, &endpoint);
        assert_eq!(next.remaining(), 2);

        let response = next.run(Request::new(&ping)).await.unwrap();

        assert_eq!(*response.downcast::<String>().unwrap(), "pong");
        assert_eq!(*log.lock().unwrap(), vec!["outer", "inner"]);
    }

    #[tokio::test]
    async fn test_behavior_can_short_circuit() {
        let behaviors: Vec<Arc<dyn Behavior>> = vec![Arc::new(ShortCircuit)];
        let endpoint = CommandEndpoint::<Ping, String> {
            handler: Arc::new(Echo),
        };

        let ping = Ping("never reached".into());
        let response = Next::new(&behaviors, &endpoint)
            .run(Request::new(&ping))
            .await
            .unwrap();

        assert_eq!(*response.downcast::<String>().unwrap(), "cached");
    }

    #[tokio::test]
    async fn test_endpoint_rejects_foreign_message() {
        let endpoint = CommandEndpoint::<Ping, String> {
            handler: Arc::new(Echo),
        };

        let err = Next::new(&[], &endpoint)
            .run(Request::new(&42_u32))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("expected"));
    }
}
