// Copyright 2025 Cowboy AI, LLC.

//! Dispatcher configuration

use serde::{Deserialize, Serialize};

use crate::errors::RegistrationResult;

/// How event publication reacts when a subscriber fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventFailurePolicy {
    /// Stop at the first failing subscriber and return its error
    #[default]
    FailFast,
    /// Run every subscriber, then report all failures together
    ContinueOnError,
}

/// Policy configuration for a [`Dispatcher`](crate::Dispatcher)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Failure handling during event publication
    pub event_failure: EventFailurePolicy,
    /// Emit a debug record for every dispatched message
    pub trace_messages: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            event_failure: EventFailurePolicy::FailFast,
            trace_messages: true,
        }
    }
}

impl DispatcherConfig {
    /// Parse a configuration from JSON, filling missing fields with defaults
    pub fn from_json(json: &str) -> RegistrationResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the event failure policy
    pub fn with_event_failure(mut self, policy: EventFailurePolicy) -> Self {
        self.event_failure = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.event_failure, EventFailurePolicy::FailFast);
        assert!(config.trace_messages);
    }

    #[test]
    fn test_from_json_partial() {
        let config = DispatcherConfig::from_json(r#"{ "event_failure": "continue_on_error" }"#)
            .unwrap();
        assert_eq!(config.event_failure, EventFailurePolicy::ContinueOnError);
        assert!(config.trace_messages);
    }

    #[test]
    fn test_from_json_rejects_unknown_policy() {
        let err = DispatcherConfig::from_json(r#"{ "event_failure": "retry" }"#).unwrap_err();
        assert!(err.to_string().starts_with("Configuration error:"));
    }

    #[test]
    fn test_builder_style_override() {
        let config = DispatcherConfig::default().with_event_failure(EventFailurePolicy::ContinueOnError);
        assert_eq!(config.event_failure, EventFailurePolicy::ContinueOnError);
    }
}
