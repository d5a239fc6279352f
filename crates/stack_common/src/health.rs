//! Readiness probing
//!
//! Bounded fixed-interval polling of a service's readiness signal.
//! Startup times are seconds, not minutes, so there is no backoff.
//! `wait_ready` returns `TimedOut` rather than erroring; the caller
//! decides fatality.

use crate::runtime::{DbCredentials, ServiceRuntime};
use std::time::Duration;
use tracing::debug;

/// A single readiness check against one service.
pub trait ReadinessProbe {
    fn name(&self) -> &str;
    fn check(&mut self) -> bool;
}

/// Outcome of a bounded readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready { attempts: u32 },
    TimedOut { attempts: u32 },
}

impl WaitOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

/// Poll `probe` at a fixed interval until it succeeds or `max_attempts`
/// probes have been made. Exactly `max_attempts` probes run before a
/// timeout; there is no sleep after the final probe.
pub fn wait_ready(
    probe: &mut dyn ReadinessProbe,
    max_attempts: u32,
    interval: Duration,
) -> WaitOutcome {
    for attempt in 1..=max_attempts {
        if probe.check() {
            debug!("{} ready after {} probe(s)", probe.name(), attempt);
            return WaitOutcome::Ready { attempts: attempt };
        }
        debug!(
            "{} not ready (probe {}/{})",
            probe.name(),
            attempt,
            max_attempts
        );
        if attempt < max_attempts {
            std::thread::sleep(interval);
        }
    }
    WaitOutcome::TimedOut {
        attempts: max_attempts,
    }
}

/// HTTP reachability probe for the application health endpoint. Only
/// success/failure is consumed, never the payload.
pub struct HttpHealthProbe {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpHealthProbe {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl ReadinessProbe for HttpHealthProbe {
    fn name(&self) -> &str {
        "application"
    }

    fn check(&mut self) -> bool {
        match self.client.get(&self.url).send() {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Connection-readiness probe for the database, executed through the
/// runtime boundary.
pub struct DbReadyProbe<'a, R: ServiceRuntime> {
    runtime: &'a R,
    creds: DbCredentials,
}

impl<'a, R: ServiceRuntime> DbReadyProbe<'a, R> {
    pub fn new(runtime: &'a R, creds: DbCredentials) -> Self {
        Self { runtime, creds }
    }
}

impl<R: ServiceRuntime> ReadinessProbe for DbReadyProbe<'_, R> {
    fn name(&self) -> &str {
        "database"
    }

    fn check(&mut self) -> bool {
        self.runtime.db_ready(&self.creds).unwrap_or(false)
    }
}
