//! Resettable single-shot idle countdown.
//!
//! The timer owns at most one [`Sleep`], created on the first `arm`:
//! re-arming resets it in place, so two pending deadlines cannot coexist.
//! Construction does not need a runtime.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, Sleep, sleep_until};

use crate::error::{Error, Result};

pub struct IdleTimer {
    sleep: Option<Pin<Box<Sleep>>>,
    timeout: Duration,
    armed: bool,
}

impl Default for IdleTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IdleTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleTimer")
            .field("timeout", &self.timeout)
            .field("armed", &self.armed)
            .field("deadline", &self.deadline())
            .finish()
    }
}

impl IdleTimer {
    /// Creates a disarmed timer.
    pub fn new() -> Self {
        Self {
            sleep: None,
            timeout: Duration::ZERO,
            armed: false,
        }
    }

    /// Restarts the countdown from zero, discarding any pending deadline.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTimeout`] if `timeout` is zero.
    pub fn arm(&mut self, timeout: Duration) -> Result<()> {
        if timeout.is_zero() {
            return Err(Error::InvalidTimeout);
        }
        self.timeout = timeout;
        let deadline = Instant::now() + timeout;
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().reset(deadline),
            None => self.sleep = Some(Box::pin(sleep_until(deadline))),
        }
        self.armed = true;
        Ok(())
    }

    /// Clears the pending deadline without scheduling a new one.
    pub fn cancel(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Last configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn deadline(&self) -> Option<Instant> {
        if !self.armed {
            return None;
        }
        self.sleep.as_ref().map(|sleep| sleep.deadline())
    }

    /// Resolves once when the armed deadline is reached, then disarms.
    ///
    /// Never resolves while disarmed. Cancel safe.
    pub async fn expired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) if self.armed => sleep.as_mut().await,
            _ => pending::<()>().await,
        }
        self.armed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, timeout};
    use tokio_test::{assert_pending, assert_ready, task};

    fn assert_elapsed(start: Instant, expected_ms: u64) {
        let elapsed = start.elapsed();
        let expected = Duration::from_millis(expected_ms);
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(5),
            "elapsed {elapsed:?}, expected {expected:?}"
        );
    }

    #[test]
    fn test_zero_timeout_rejected() {
        // Hors runtime : ni la construction ni le refus ne touchent au timer tokio
        let mut timer = IdleTimer::default();
        assert!(matches!(timer.arm(Duration::ZERO), Err(Error::InvalidTimeout)));
        assert!(!timer.is_armed());
        assert_eq!(timer.deadline(), None);
        assert!(format!("{timer:?}").contains("armed: false"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_timeout() {
        let mut timer = IdleTimer::new();
        timer.arm(Duration::from_millis(500)).unwrap();
        let start = Instant::now();

        timer.expired().await;
        assert_elapsed(start, 500);
        assert!(!timer.is_armed());

        // Pas de second déclenchement sans réarmement
        assert!(
            timeout(Duration::from_secs(10), timer.expired())
                .await
                .is_err()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_resets_from_zero() {
        let mut timer = IdleTimer::new();
        let start = Instant::now();
        timer.arm(Duration::from_millis(1000)).unwrap();

        advance(Duration::from_millis(700)).await;
        timer.arm(Duration::from_millis(1000)).unwrap();

        timer.expired().await;
        assert_elapsed(start, 1700);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let mut timer = IdleTimer::new();
        timer.arm(Duration::from_millis(100)).unwrap();
        timer.cancel();
        assert_eq!(timer.deadline(), None);
        assert!(
            timeout(Duration::from_secs(1), timer.expired())
                .await
                .is_err()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_until_deadline() {
        let mut timer = IdleTimer::new();
        timer.arm(Duration::from_millis(250)).unwrap();

        {
            let mut expired = task::spawn(timer.expired());
            assert_pending!(expired.poll());

            advance(Duration::from_millis(249)).await;
            assert_pending!(expired.poll());

            advance(Duration::from_millis(1)).await;
            assert_ready!(expired.poll());
        }
        assert!(!timer.is_armed());
    }
}
