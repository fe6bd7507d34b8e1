// Copyright 2025 Cowboy AI, LLC.

//! Ready-made pipeline behaviors

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::handlers::{Behavior, Next, Request, Response};

/// Logs every request passing through the pipeline, with its latency
///
/// Place it at the lowest order to measure the whole chain, or right before
/// the handler to measure the handler alone.
#[derive(Debug, Clone, Default)]
pub struct TracingBehavior {
    label: Option<String>,
}

impl TracingBehavior {
    /// Create an unlabeled tracing behavior
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag every log record with `label`
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
        }
    }

    /// Label attached to log records, if any
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

#[async_trait]
impl Behavior for TracingBehavior {
    async fn handle(&self, request: Request<'_>, next: Next<'_>) -> anyhow::Result<Response> {
        let label = self.label.as_deref().unwrap_or("pipeline");
        let started = Instant::now();
        let remaining = next.remaining();

        let result = next.run(request).await;
        let elapsed_us = micros(started.elapsed());

        match &result {
            Ok(_) => debug!(
                label,
                request = request.name(),
                remaining,
                elapsed_us,
                "request handled"
            ),
            Err(e) => warn!(
                label,
                request = request.name(),
                elapsed_us,
                error = %e,
                "request failed"
            ),
        }
        result
    }
}

/// Whole microseconds, saturating at `u64::MAX`
fn micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}
