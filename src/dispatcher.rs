// Copyright 2025 Cowboy AI, LLC.

//! In-process dispatcher for commands, queries and events
//!
//! The [`Dispatcher`] is the registry handlers end up in once they have
//! been resolved from the container, and the router that later delivers
//! messages to them:
//!
//! - event subscribers are kept per event type, in registration order;
//! - exactly one handler may serve a `(command, response)` or
//!   `(query, response)` pair;
//! - commands and queries each pass through their own behavior pipeline,
//!   sorted by ascending order with ties kept in registration order.
//!
//! A dispatcher is an ordinary value: build one during setup and pass it by
//! reference to everything that registers or dispatches.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::config::{DispatcherConfig, EventFailurePolicy};
use crate::errors::{DispatchError, DispatchResult, RegistrationError, RegistrationResult};
use crate::handlers::{
    Behavior, CommandEndpoint, CommandHandler, Endpoint, EventHandler, Message, Next,
    QueryEndpoint, QueryHandler, Reply, Request,
};

/// Registration side of a dispatcher
///
/// This is the contract the registration functions in
/// [`registration`](crate::registration) forward resolved instances to.
pub trait HandlerRegistry {
    /// Add one subscriber for events of type `E`
    fn register_event_subscriber<E: Message>(
        &self,
        handler: Arc<dyn EventHandler<E>>,
    ) -> RegistrationResult<()>;

    /// Add a batch of subscribers for events of type `E` in one step
    fn register_event_subscribers<E: Message>(
        &self,
        handlers: Vec<Arc<dyn EventHandler<E>>>,
    ) -> RegistrationResult<()>;

    /// Set the handler for the `(C, R)` pair
    fn register_command_handler<C: Message, R: Reply>(
        &self,
        handler: Arc<dyn CommandHandler<C, R>>,
    ) -> RegistrationResult<()>;

    /// Set the handler for the `(Q, R)` pair
    fn register_query_handler<Q: Message, R: Reply>(
        &self,
        handler: Arc<dyn QueryHandler<Q, R>>,
    ) -> RegistrationResult<()>;

    /// Add a behavior to the command pipeline at position `order`
    fn register_command_behavior(
        &self,
        order: i32,
        behavior: Arc<dyn Behavior>,
    ) -> RegistrationResult<()>;

    /// Add a behavior to the query pipeline at position `order`
    fn register_query_behavior(
        &self,
        order: i32,
        behavior: Arc<dyn Behavior>,
    ) -> RegistrationResult<()>;
}

type HandlerMap = RwLock<HashMap<(TypeId, TypeId), Box<dyn Any + Send + Sync>>>;

struct OrderedBehavior {
    order: i32,
    behavior: Arc<dyn Behavior>,
}

/// Behaviors sorted by order, stable for equal orders
#[derive(Default)]
struct Pipeline {
    behaviors: RwLock<Vec<OrderedBehavior>>,
}

impl Pipeline {
    fn insert(&self, order: i32, behavior: Arc<dyn Behavior>) {
        let mut behaviors = self.behaviors.write().unwrap_or_else(PoisonError::into_inner);
        let at = behaviors.partition_point(|existing| existing.order <= order);
        behaviors.insert(at, OrderedBehavior { order, behavior });
    }

    fn snapshot(&self) -> Vec<Arc<dyn Behavior>> {
        self.behaviors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|entry| entry.behavior.clone())
            .collect()
    }

    fn orders(&self) -> Vec<i32> {
        self.behaviors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|entry| entry.order)
            .collect()
    }
}

/// Command, query and event dispatcher
#[derive(Default)]
pub struct Dispatcher {
    config: DispatcherConfig,
    subscribers: RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    commands: HandlerMap,
    queries: HandlerMap,
    command_pipeline: Pipeline,
    query_pipeline: Pipeline,
}

impl Dispatcher {
    /// Create a dispatcher with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dispatcher with the given configuration
    pub fn with_config(config: DispatcherConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Active configuration
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Send a command through the command pipeline to its handler
    pub async fn send<C: Message, R: Reply>(&self, command: C) -> DispatchResult<R> {
        let handler = lookup_handler::<C, R, dyn CommandHandler<C, R>>(&self.commands)?;
        let behaviors = self.command_pipeline.snapshot();
        let endpoint = CommandEndpoint { handler };

        self.run_pipeline::<C, R>(&behaviors, &endpoint, &command).await
    }

    /// Send a query through the query pipeline to its handler
    pub async fn query<Q: Message, R: Reply>(&self, query: Q) -> DispatchResult<R> {
        let handler = lookup_handler::<Q, R, dyn QueryHandler<Q, R>>(&self.queries)?;
        let behaviors = self.query_pipeline.snapshot();
        let endpoint = QueryEndpoint { handler };

        self.run_pipeline::<Q, R>(&behaviors, &endpoint, &query).await
    }

    /// Deliver an event to every subscriber, in registration order
    ///
    /// Publishing an event nobody subscribed to succeeds.
    pub async fn publish<E: Message>(&self, event: &E) -> DispatchResult<()> {
        let subscribers = self.subscribers_of::<E>();
        let name = type_name::<E>();

        if subscribers.is_empty() {
            debug!(event = name, "no subscribers");
            return Ok(());
        }
        if self.config.trace_messages {
            debug!(event = name, subscribers = subscribers.len(), "publishing");
        }

        match self.config.event_failure {
            EventFailurePolicy::FailFast => {
                for subscriber in &subscribers {
                    if let Err(e) = subscriber.handle(event).await {
                        warn!(event = name, error = %e, "subscriber failed");
                        return Err(DispatchError::Handler(e));
                    }
                }
                Ok(())
            }
            EventFailurePolicy::ContinueOnError => {
                let mut failures = Vec::new();
                for subscriber in &subscribers {
                    if let Err(e) = subscriber.handle(event).await {
                        warn!(event = name, error = %e, "subscriber failed");
                        failures.push(e);
                    }
                }
                if failures.is_empty() {
                    Ok(())
                } else {
                    Err(DispatchError::SubscribersFailed {
                        event: name,
                        total: subscribers.len(),
                        failures,
                    })
                }
            }
        }
    }

    /// Number of subscribers for events of type `E`
    pub fn subscriber_count<E: Message>(&self) -> usize {
        self.subscribers_of::<E>().len()
    }

    /// Whether a handler serves the `(C, R)` command pair
    pub fn has_command_handler<C: Message, R: Reply>(&self) -> bool {
        contains_handler::<C, R>(&self.commands)
    }

    /// Whether a handler serves the `(Q, R)` query pair
    pub fn has_query_handler<Q: Message, R: Reply>(&self) -> bool {
        contains_handler::<Q, R>(&self.queries)
    }

    /// Orders of the command pipeline, outermost first
    pub fn command_behavior_orders(&self) -> Vec<i32> {
        self.command_pipeline.orders()
    }

    /// Orders of the query pipeline, outermost first
    pub fn query_behavior_orders(&self) -> Vec<i32> {
        self.query_pipeline.orders()
    }

    async fn run_pipeline<M: Message, R: Reply>(
        &self,
        behaviors: &[Arc<dyn Behavior>],
        endpoint: &dyn Endpoint,
        message: &M,
    ) -> DispatchResult<R> {
        let request = Request::new(message);
        if self.config.trace_messages {
            debug!(
                message = request.name(),
                behaviors = behaviors.len(),
                "dispatching"
            );
        }

        let response = Next::new(behaviors, endpoint).run(request).await?;
        response
            .downcast::<R>()
            .map(|reply| *reply)
            .map_err(|_| DispatchError::UnexpectedResponse {
                expected: type_name::<R>(),
            })
    }

    fn subscribers_of<E: Message>(&self) -> Vec<Arc<dyn EventHandler<E>>> {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<E>())
            .and_then(|list| list.downcast_ref::<Vec<Arc<dyn EventHandler<E>>>>())
            .cloned()
            .unwrap_or_default()
    }

    fn append_subscribers<E: Message>(
        &self,
        handlers: Vec<Arc<dyn EventHandler<E>>>,
    ) -> RegistrationResult<usize> {
        let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        let entry = subscribers
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Vec::<Arc<dyn EventHandler<E>>>::new()));

        let list = entry
            .downcast_mut::<Vec<Arc<dyn EventHandler<E>>>>()
            .ok_or_else(|| RegistrationError::TypeMismatch {
                capability: type_name::<dyn EventHandler<E>>().to_string(),
            })?;
        list.extend(handlers);
        Ok(list.len())
    }
}

impl HandlerRegistry for Dispatcher {
    fn register_event_subscriber<E: Message>(
        &self,
        handler: Arc<dyn EventHandler<E>>,
    ) -> RegistrationResult<()> {
        let total = self.append_subscribers(vec![handler])?;
        debug!(event = type_name::<E>(), total, "event subscriber registered");
        Ok(())
    }

    fn register_event_subscribers<E: Message>(
        &self,
        handlers: Vec<Arc<dyn EventHandler<E>>>,
    ) -> RegistrationResult<()> {
        let added = handlers.len();
        let total = self.append_subscribers(handlers)?;
        debug!(event = type_name::<E>(), added, total, "event subscribers registered");
        Ok(())
    }

    fn register_command_handler<C: Message, R: Reply>(
        &self,
        handler: Arc<dyn CommandHandler<C, R>>,
    ) -> RegistrationResult<()> {
        insert_handler::<C, R, _>(&self.commands, handler)?;
        debug!(
            command = type_name::<C>(),
            response = type_name::<R>(),
            "command handler registered"
        );
        Ok(())
    }

    fn register_query_handler<Q: Message, R: Reply>(
        &self,
        handler: Arc<dyn QueryHandler<Q, R>>,
    ) -> RegistrationResult<()> {
        insert_handler::<Q, R, _>(&self.queries, handler)?;
        debug!(
            query = type_name::<Q>(),
            response = type_name::<R>(),
            "query handler registered"
        );
        Ok(())
    }

    fn register_command_behavior(
        &self,
        order: i32,
        behavior: Arc<dyn Behavior>,
    ) -> RegistrationResult<()> {
        self.command_pipeline.insert(order, behavior);
        info!(order, pipeline = ?self.command_pipeline.orders(), "command behavior registered");
        Ok(())
    }

    fn register_query_behavior(
        &self,
        order: i32,
        behavior: Arc<dyn Behavior>,
    ) -> RegistrationResult<()> {
        self.query_pipeline.insert(order, behavior);
        info!(order, pipeline = ?self.query_pipeline.orders(), "query behavior registered");
        Ok(())
    }
}

fn insert_handler<M: Message, R: Reply, H: ?Sized + Send + Sync + 'static>(
    map: &HandlerMap,
    handler: Arc<H>,
) -> RegistrationResult<()> {
    let mut handlers = map.write().unwrap_or_else(PoisonError::into_inner);
    let key = (TypeId::of::<M>(), TypeId::of::<R>());

    if handlers.contains_key(&key) {
        warn!(
            message = type_name::<M>(),
            response = type_name::<R>(),
            "duplicate handler rejected"
        );
        return Err(RegistrationError::DuplicateHandler {
            message: type_name::<M>().to_string(),
            response: type_name::<R>().to_string(),
        });
    }

    handlers.insert(key, Box::new(handler));
    Ok(())
}

fn lookup_handler<M: Message, R: Reply, H: ?Sized + Send + Sync + 'static>(
    map: &HandlerMap,
) -> DispatchResult<Arc<H>> {
    map.read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&(TypeId::of::<M>(), TypeId::of::<R>()))
        .and_then(|handler| handler.downcast_ref::<Arc<H>>())
        .cloned()
        .ok_or(DispatchError::NoHandler {
            message: type_name::<M>(),
            response: type_name::<R>(),
        })
}

fn contains_handler<M: Message, R: Reply>(map: &HandlerMap) -> bool {
    map.read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains_key(&(TypeId::of::<M>(), TypeId::of::<R>()))
}
