// Copyright 2025 Cowboy AI, LLC.

//! # CIM CQRS DI
//!
//! Wires CQRS handlers built by a dependency-injection container into an
//! in-process dispatcher.
//!
//! This crate provides:
//! - **Container**: lazily runs constructors, shares singletons, collects
//!   grouped multi-bindings and reports dependency cycles
//! - **Handler capabilities**: `EventHandler`, `CommandHandler`,
//!   `QueryHandler` and pipeline `Behavior`s
//! - **Dispatcher**: a registry that routes commands, queries and events to
//!   their handlers through ordered behavior pipelines
//! - **Registration**: `provide_*` functions that take a constructor,
//!   resolve what it builds and register the result with the dispatcher
//!
//! ## Design Principles
//!
//! 1. **Explicit state**: the container and dispatcher are plain values,
//!    created once at startup and passed by reference
//! 2. **Typed registration**: capabilities are trait objects keyed by type,
//!    no reflection involved
//! 3. **Fail fast**: every registration step returns its error immediately,
//!    without retries or rollback

#![warn(missing_docs)]

mod behaviors;
mod config;
mod dispatcher;
mod errors;
mod handlers;
pub mod integration;
pub mod registration;

pub use behaviors::TracingBehavior;
pub use config::{DispatcherConfig, EventFailurePolicy};
pub use dispatcher::{Dispatcher, HandlerRegistry};
pub use errors::{DispatchError, DispatchResult, RegistrationError, RegistrationResult};
pub use handlers::{
    Behavior, CommandHandler, EventHandler, Message, Next, QueryHandler, Reply, Request, Response,
};
pub use integration::{
    Constructor, ContainerBuilder, DependencyContainer, Resolver, ServiceLifetime,
};
pub use registration::{
    provide_command_behavior, provide_command_handler, provide_event_subscriber,
    provide_event_subscribers, provide_query_behavior, provide_query_handler, HANDLERS_GROUP,
};
