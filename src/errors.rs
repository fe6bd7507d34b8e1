// Copyright 2025 Cowboy AI, LLC.

//! Error types for handler registration and dispatch

use thiserror::Error;

/// Errors that can occur while wiring handlers through the container
#[derive(Debug, Clone, Error)]
pub enum RegistrationError {
    /// The container refused to accept a constructor
    #[error("Constructor rejected for {capability}: {reason}")]
    ConstructorRejected {
        /// Capability the constructor was meant to provide
        capability: String,
        /// Why the container refused it
        reason: String,
    },

    /// Nothing was provided for the requested capability
    #[error("No constructor provided for {capability}")]
    NotProvided {
        /// Capability that was requested
        capability: String,
    },

    /// Resolution re-entered a capability that was already being built
    #[error("Cyclic dependency detected: {path}")]
    CyclicDependency {
        /// Resolution path, outermost first
        path: String,
    },

    /// A constructor ran and failed
    #[error("Failed to construct {capability}: {source}")]
    ConstructionFailed {
        /// Capability whose constructor failed
        capability: String,
        /// Underlying failure
        #[source]
        source: Box<RegistrationError>,
    },

    /// Failure reported by user constructor code
    #[error("Constructor error: {0}")]
    Factory(String),

    /// A stored instance did not have the expected type
    #[error("Type mismatch while resolving {capability}")]
    TypeMismatch {
        /// Capability that was requested
        capability: String,
    },

    /// The dispatcher registry already holds a handler for this pair
    #[error("Handler already registered for {message} -> {response}")]
    DuplicateHandler {
        /// Message type name
        message: String,
        /// Response type name
        response: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for registration operations
pub type RegistrationResult<T> = Result<T, RegistrationError>;

impl From<serde_json::Error> for RegistrationError {
    fn from(err: serde_json::Error) -> Self {
        RegistrationError::Configuration(err.to_string())
    }
}

impl RegistrationError {
    /// Create an error from inside a constructor
    pub fn factory(msg: impl Into<String>) -> Self {
        RegistrationError::Factory(msg.into())
    }

    /// Check if the container rejected a constructor
    pub fn is_constructor_error(&self) -> bool {
        matches!(self, RegistrationError::ConstructorRejected { .. })
    }

    /// Check if the container failed to build a capability
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            RegistrationError::NotProvided { .. }
                | RegistrationError::CyclicDependency { .. }
                | RegistrationError::ConstructionFailed { .. }
                | RegistrationError::Factory(_)
                | RegistrationError::TypeMismatch { .. }
        )
    }

    /// Check if the dispatcher registry refused the handler
    pub fn is_registry_error(&self) -> bool {
        matches!(self, RegistrationError::DuplicateHandler { .. })
    }
}

/// Errors that can occur while dispatching messages
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler is registered for the message/response pair
    #[error("No handler registered for {message} -> {response}")]
    NoHandler {
        /// Message type name
        message: &'static str,
        /// Response type name
        response: &'static str,
    },

    /// A handler or behavior failed
    #[error("Handler failed: {0}")]
    Handler(#[from] anyhow::Error),

    /// The pipeline produced a response of the wrong type
    #[error("Unexpected response type, expected {expected}")]
    UnexpectedResponse {
        /// Response type name the caller asked for
        expected: &'static str,
    },

    /// One or more subscribers failed while publishing
    #[error("{} of {total} subscribers failed for {event}", .failures.len())]
    SubscribersFailed {
        /// Event type name
        event: &'static str,
        /// Number of subscribers invoked
        total: usize,
        /// Each failure, in subscriber order
        failures: Vec<anyhow::Error>,
    },
}

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

impl DispatchError {
    /// Check if dispatch failed because nothing handles the message
    pub fn is_no_handler(&self) -> bool {
        matches!(self, DispatchError::NoHandler { .. })
    }
}
