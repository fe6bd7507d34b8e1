// Copyright 2025 Cowboy AI, LLC.

//! Registration of container-built handlers with a dispatcher
//!
//! Every function here does the same three things: provide the constructor
//! to the [`DependencyContainer`], resolve the capability it produces, and
//! hand the resolved instance to a [`HandlerRegistry`]. Failures are
//! returned as they happen; a constructor that was already provided stays
//! in the container when a later step fails.
//!
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use cim_cqrs_di::{
//!     provide_command_handler, CommandHandler, Constructor, DependencyContainer, Dispatcher,
//! };
//!
//! struct Ping;
//! struct PingHandler;
//!
//! #[async_trait]
//! impl CommandHandler<Ping, String> for PingHandler {
//!     async fn handle(&self, _command: &Ping) -> anyhow::Result<String> {
//!         Ok("pong".to_string())
//!     }
//! }
//!
//! let container = DependencyContainer::new();
//! let dispatcher = Dispatcher::new();
//!
//! provide_command_handler::<Ping, String, _>(
//!     &container,
//!     &dispatcher,
//!     Constructor::new(|_| Ok(Arc::new(PingHandler) as Arc<dyn CommandHandler<Ping, String>>)),
//! )
//! .unwrap();
//!
//! assert!(dispatcher.has_command_handler::<Ping, String>());
//! ```

use std::any::type_name;
use std::sync::Arc;

use tracing::debug;

use crate::dispatcher::HandlerRegistry;
use crate::errors::RegistrationResult;
use crate::handlers::{Behavior, CommandHandler, EventHandler, Message, QueryHandler, Reply};
use crate::integration::{Constructor, DependencyContainer};

/// Group tag under which bulk event subscribers are collected
pub const HANDLERS_GROUP: &str = "handlers";

/// Provide a single event subscriber and register it
pub fn provide_event_subscriber<E, D>(
    container: &DependencyContainer,
    registry: &D,
    constructor: Constructor<dyn EventHandler<E>>,
) -> RegistrationResult<()>
where
    E: Message,
    D: HandlerRegistry,
{
    container.provide(constructor)?;
    let handler = container.resolve::<dyn EventHandler<E>>()?;
    registry.register_event_subscriber(handler)?;

    debug!(event = type_name::<E>(), "event subscriber wired");
    Ok(())
}

/// Provide several event subscribers under [`HANDLERS_GROUP`] and register them together
///
/// Constructors are provided in order and the first rejection aborts the
/// call before the registry is touched. Constructors provided before the
/// rejection are not withdrawn. With no constructors at all the registry
/// still receives one (empty) bulk registration.
pub fn provide_event_subscribers<E, D>(
    container: &DependencyContainer,
    registry: &D,
    constructors: impl IntoIterator<Item = Constructor<dyn EventHandler<E>>>,
) -> RegistrationResult<()>
where
    E: Message,
    D: HandlerRegistry,
{
    for constructor in constructors {
        container.provide_grouped(HANDLERS_GROUP, constructor)?;
    }

    let handlers = container.resolve_group::<dyn EventHandler<E>>(HANDLERS_GROUP)?;
    let count = handlers.len();
    registry.register_event_subscribers(handlers)?;

    debug!(event = type_name::<E>(), count, "event subscribers wired");
    Ok(())
}

/// Provide a command handler for `(C, R)` and register it
pub fn provide_command_handler<C, R, D>(
    container: &DependencyContainer,
    registry: &D,
    constructor: Constructor<dyn CommandHandler<C, R>>,
) -> RegistrationResult<()>
where
    C: Message,
    R: Reply,
    D: HandlerRegistry,
{
    container.provide(constructor)?;
    let handler = container.resolve::<dyn CommandHandler<C, R>>()?;
    registry.register_command_handler(handler)?;

    debug!(
        command = type_name::<C>(),
        response = type_name::<R>(),
        "command handler wired"
    );
    Ok(())
}

/// Provide a query handler for `(Q, R)` and register it
pub fn provide_query_handler<Q, R, D>(
    container: &DependencyContainer,
    registry: &D,
    constructor: Constructor<dyn QueryHandler<Q, R>>,
) -> RegistrationResult<()>
where
    Q: Message,
    R: Reply,
    D: HandlerRegistry,
{
    container.provide(constructor)?;
    let handler = container.resolve::<dyn QueryHandler<Q, R>>()?;
    registry.register_query_handler(handler)?;

    debug!(
        query = type_name::<Q>(),
        response = type_name::<R>(),
        "query handler wired"
    );
    Ok(())
}

/// Provide a behavior `B` and add it to the command pipeline at `order`
///
/// `order` is passed through untouched; duplicates and negative values are
/// for the registry to arrange.
pub fn provide_command_behavior<B, D>(
    container: &DependencyContainer,
    registry: &D,
    order: i32,
    constructor: Constructor<B>,
) -> RegistrationResult<()>
where
    B: Behavior + 'static,
    D: HandlerRegistry,
{
    container.provide(constructor)?;
    let behavior: Arc<dyn Behavior> = container.resolve::<B>()?;
    registry.register_command_behavior(order, behavior)?;

    debug!(behavior = type_name::<B>(), order, "command behavior wired");
    Ok(())
}

/// Provide a behavior `B` and add it to the query pipeline at `order`
pub fn provide_query_behavior<B, D>(
    container: &DependencyContainer,
    registry: &D,
    order: i32,
    constructor: Constructor<B>,
) -> RegistrationResult<()>
where
    B: Behavior + 'static,
    D: HandlerRegistry,
{
    container.provide(constructor)?;
    let behavior: Arc<dyn Behavior> = container.resolve::<B>()?;
    registry.register_query_behavior(order, behavior)?;

    debug!(behavior = type_name::<B>(), order, "query behavior wired");
    Ok(())
}
