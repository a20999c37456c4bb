//! Retry policies for handling `FLOOD_WAIT` and transient I/O errors.

use std::num::NonZeroU32;
use std::ops::ControlFlow;
use std::time::Duration;

use crate::errors::InvocationError;

/// Controls how the client reacts when an RPC call fails.
pub trait RetryPolicy: Send + Sync + 'static {
    /// Return `Continue(delay)` to sleep and retry, `Break(())` to give up.
    fn should_retry(&self, ctx: &RetryContext) -> ControlFlow<(), Duration>;
}

/// Context passed to [`RetryPolicy::should_retry`] on each failure.
pub struct RetryContext {
    /// How many times the request has failed so far, including this one.
    pub fail_count:   NonZeroU32,
    /// Total time already spent sleeping between attempts.
    pub slept_so_far: Duration,
    /// The error of the latest attempt.
    pub error:        InvocationError,
}

/// Never retry.
pub struct NoRetries;
impl RetryPolicy for NoRetries {
    fn should_retry(&self, _: &RetryContext) -> ControlFlow<(), Duration> {
        ControlFlow::Break(())
    }
}

/// Automatically sleep on FLOOD_WAIT and retry I/O errors once.
pub struct AutoSleep {
    /// Longest flood wait that is slept through; longer ones are surfaced.
    pub threshold:             Duration,
    /// How many flood waits one request may sleep through.
    pub max_retries:           u32,
    /// Treat an I/O failure as a flood wait of this length (first failure only).
    pub io_errors_as_flood_of: Option<Duration>,
}

impl Default for AutoSleep {
    fn default() -> Self {
        Self {
            threshold:             Duration::from_secs(60),
            max_retries:           3,
            io_errors_as_flood_of: Some(Duration::from_secs(1)),
        }
    }
}

impl RetryPolicy for AutoSleep {
    fn should_retry(&self, ctx: &RetryContext) -> ControlFlow<(), Duration> {
        if let Some(secs) = ctx.error.flood_wait_seconds() {
            if ctx.fail_count.get() <= self.max_retries && secs <= self.threshold.as_secs() {
                tracing::info!("[strata] FLOOD_WAIT_{secs}, sleeping before retry");
                return ControlFlow::Continue(Duration::from_secs(secs));
            }
        }
        if matches!(ctx.error, InvocationError::Io(_)) && ctx.fail_count.get() == 1 {
            if let Some(d) = self.io_errors_as_flood_of {
                tracing::info!("[strata] I/O error, sleeping {:?} before retry", d);
                return ControlFlow::Continue(d);
            }
        }
        ControlFlow::Break(())
    }
}
