//! Bounded polling of an eventually-consistent backend
//!
//! The poller repeatedly probes the remote system until a predicate over the
//! observed value holds. It is used for read-after-write confirmation and for
//! waiting on backend-asynchronous transitions (a backup target reporting
//! itself disabled, owned servers disappearing).

use crate::error::{ErrorKind, Transient};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Timing of one wait loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Total budget, measured from the start of the wait
    pub timeout: Duration,
    /// Pause between two probes
    pub interval: Duration,
    /// Pause before the first probe
    pub initial_delay: Duration,
}

impl PollConfig {
    pub fn new(timeout: Duration, interval: Duration, initial_delay: Duration) -> Self {
        Self {
            timeout,
            interval,
            initial_delay,
        }
    }

    /// Upper bound on the number of probes a wait can issue
    pub fn max_probes(&self) -> u32 {
        if self.interval.is_zero() {
            return u32::MAX;
        }
        (self.timeout.as_nanos() / self.interval.as_nanos()) as u32 + 1
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5 * 60),
            interval: Duration::from_secs(5),
            initial_delay: Duration::from_secs(2),
        }
    }
}

/// Why a wait ended without the predicate holding
#[derive(Debug, Clone, PartialEq)]
pub enum PollError<E> {
    Timeout {
        attempts: u32,
        elapsed: Duration,
        /// Last transient probe failure, if the final probes were failing
        last_error: Option<E>,
    },
    /// Non-transient probe failure, returned on first occurrence
    Probe(E),
    Cancelled,
}

impl<E> PollError<E> {
    /// Map onto the reconciler's error kinds, translating probe failures
    /// with `on_probe`
    pub fn into_kind(self, on_probe: impl FnOnce(E) -> ErrorKind) -> ErrorKind {
        match self {
            PollError::Timeout { elapsed, .. } => ErrorKind::PollTimeout { waited: elapsed },
            PollError::Probe(e) => on_probe(e),
            PollError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl<E: fmt::Display> fmt::Display for PollError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollError::Timeout {
                attempts,
                elapsed,
                last_error: Some(e),
            } => write!(
                f,
                "timed out after {} probes in {:?} (last error: {})",
                attempts, elapsed, e
            ),
            PollError::Timeout {
                attempts, elapsed, ..
            } => write!(f, "timed out after {} probes in {:?}", attempts, elapsed),
            PollError::Probe(e) => write!(f, "probe failed: {}", e),
            PollError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for PollError<E> {}

/// Single logical wait loop
#[derive(Debug, Clone)]
pub struct Poller {
    config: PollConfig,
    cancel: Option<CancellationToken>,
}

impl Poller {
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    /// Observe `token` at every tick boundary
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Probe until `is_done` holds for the observed value.
    ///
    /// Transient probe errors are retried within the same budget; any other
    /// probe error ends the wait immediately. One successful observation is
    /// enough.
    pub async fn wait_until<T, E, F, Fut, P>(
        &self,
        what: &str,
        mut probe: F,
        is_done: P,
    ) -> std::result::Result<T, PollError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        P: Fn(&T) -> bool,
        E: Transient + fmt::Display,
    {
        let started = Instant::now();
        let deadline = started + self.config.timeout;
        let mut attempts = 0u32;
        let mut last_error = None;

        self.sleep(self.config.initial_delay).await?;

        loop {
            if self.is_cancelled() {
                return Err(PollError::Cancelled);
            }

            attempts += 1;
            match probe().await {
                Ok(value) if is_done(&value) => {
                    debug!(what = %what, attempt = attempts, "Wait condition reached");
                    return Ok(value);
                }
                Ok(_) => {
                    last_error = None;
                    debug!(what = %what, attempt = attempts, "Wait condition not reached yet");
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        what = %what,
                        attempt = attempts,
                        error = %e,
                        "Transient probe failure, retrying"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(PollError::Probe(e)),
            }

            if Instant::now() + self.config.interval > deadline {
                let elapsed = started.elapsed();
                warn!(
                    what = %what,
                    attempts = attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Wait timed out"
                );
                return Err(PollError::Timeout {
                    attempts,
                    elapsed,
                    last_error,
                });
            }

            self.sleep(self.config.interval).await?;
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }

    async fn sleep<E>(&self, duration: Duration) -> std::result::Result<(), PollError<E>> {
        match &self.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(PollError::Cancelled),
                _ = tokio::time::sleep(duration) => Ok(()),
            },
            None => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
        }
    }
}
