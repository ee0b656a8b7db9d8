//! Cancellable waits and reconnect backoff.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Sleep for `duration` unless cancelled first.
///
/// Returns `false` if the token was cancelled.
pub async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Exponential backoff with an upper bound.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            current: initial,
        }
    }

    /// Delay to wait now; doubles the next one up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Poll `check` every `interval` until it succeeds or the token is cancelled.
///
/// Returns `false` if cancelled before `check` succeeded.
pub async fn wait_until<F, Fut>(
    cancel: &CancellationToken,
    interval: Duration,
    what: &str,
    mut check: F,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    loop {
        tracing::info!("Checking if {} is up", what);
        let up = tokio::select! {
            _ = cancel.cancelled() => return false,
            up = check() => up,
        };
        if up {
            tracing::info!("{} is up", what);
            return true;
        }
        if !sleep_or_cancel(cancel, interval).await {
            return false;
        }
    }
}
