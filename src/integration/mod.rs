// Copyright 2025 Cowboy AI, LLC.

//! Integration module for dependency injection
//!
//! Key features:
//! - Dependency injection container with singleton and transient lifetimes
//! - Grouped multi-binding keyed by `(capability, group tag)`
//! - Cycle detection during resolution

pub mod dependency_injection;
pub mod service_registry;

pub use dependency_injection::{ContainerBuilder, Constructor, DependencyContainer, Resolver};
pub use service_registry::ServiceLifetime;
