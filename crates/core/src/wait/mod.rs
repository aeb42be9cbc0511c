//! Small async helpers shared by initialisation and media priming.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

/// Polls `condition` every `interval` until it holds or `timeout` elapses.
/// Returns whether the condition was observed.
pub async fn wait_until<F>(mut condition: F, timeout: Duration, interval: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let poll = async {
        loop {
            if condition() {
                return;
            }
            tokio::time::sleep(interval).await;
        }
    };

    tokio::time::timeout(timeout, poll).await.is_ok()
}

/// Capped exponential backoff: `min(base * 2^attempt, cap)`.
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(cap)
}

/// Monotonic counter used to invalidate in-flight lifecycle work.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    counter: Arc<AtomicU64>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supersedes every ticket issued so far.
    pub fn advance(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn ticket(&self) -> CancelTicket {
        CancelTicket {
            issued: self.counter.load(Ordering::SeqCst),
            counter: self.counter.clone(),
        }
    }
}

/// Cancellation token handed to each awaited step of a lifecycle operation.
#[derive(Debug, Clone)]
pub struct CancelTicket {
    issued: u64,
    counter: Arc<AtomicU64>,
}

impl CancelTicket {
    pub fn is_superseded(&self) -> bool {
        self.counter.load(Ordering::SeqCst) != self.issued
    }

    pub fn check(&self) -> crate::Result<()> {
        if self.is_superseded() {
            Err(crate::OverlayError::Superseded)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let base = Duration::from_millis(1000);
        let cap = Duration::from_millis(5000);
        assert_eq!(backoff_delay(0, base, cap), Duration::from_millis(1000));
        assert_eq!(backoff_delay(1, base, cap), Duration::from_millis(2000));
        assert_eq!(backoff_delay(2, base, cap), Duration::from_millis(4000));
        assert_eq!(backoff_delay(3, base, cap), cap);
        assert_eq!(backoff_delay(40, base, cap), cap);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_observes_condition() {
        let polls = Cell::new(0);
        let seen = wait_until(
            || {
                polls.set(polls.get() + 1);
                polls.get() >= 3
            },
            Duration::from_secs(1),
            Duration::from_millis(10),
        )
        .await;

        assert!(seen);
        assert_eq!(polls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_gives_up_after_timeout() {
        let seen = wait_until(|| false, Duration::from_millis(250), Duration::from_millis(100)).await;
        assert!(!seen);
    }

    #[test]
    fn tickets_are_superseded_by_advance() {
        let generation = Generation::new();
        let ticket = generation.ticket();
        assert!(ticket.check().is_ok());

        generation.advance();
        assert!(ticket.is_superseded());
        assert!(generation.ticket().check().is_ok());
    }
}
