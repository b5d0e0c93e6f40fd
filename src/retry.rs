//! Bounded retries for missions that failed after being sent.
//!
//! Nothing in the session retries on its own. A resubmitted job may print
//! twice if the first attempt reached the paper, so retrying is left to the
//! caller through this explicit wrapper.

use log::warn;
use std::{thread, time::Duration};

use crate::{
    error::Error,
    protocol::Mission,
    session::MissionQueue,
};

/// Base delay for exponential backoff.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Maximum delay between two attempts.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total attempts, the first one included. At least one.
    pub fn max_attempts(self, max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            ..self
        }
    }

    pub fn backoff(self, base: Duration, max: Duration) -> Self {
        RetryPolicy {
            backoff_base: base,
            backoff_max: max,
            ..self
        }
    }

    /// Delay before retry number `attempt` (0 for the first retry).
    pub fn delay(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.backoff_base, self.backoff_max)
    }
}

/// `min(base * 2^attempt, max)`
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt)).min(max)
}

/// Submit `mission` and wait for it, resubmitting on retryable failures.
///
/// The queue must belong to a started session, otherwise the first wait
/// never returns.
pub fn submit_with_retry(
    queue: &MissionQueue,
    mission: &Mission,
    policy: &RetryPolicy,
) -> Result<(), Error> {
    let mut attempt = 0;
    loop {
        match queue.submit(mission.clone()).wait() {
            Ok(()) => return Ok(()),
            Err(err) if err.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay(attempt);
                warn!(
                    "attempt {} of {} failed: {}, retrying in {:?}",
                    attempt + 1,
                    policy.max_attempts,
                    err,
                    delay
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::TransportError,
        protocol::ACK,
        session::{Session, SessionConfig, ShutdownMode},
        transport::Transport,
    };
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    /// Stays silent for the first `silent` missions, then acknowledges.
    struct Flaky {
        silent: usize,
        writes: Arc<AtomicUsize>,
        ack_ready: bool,
    }

    impl Transport for Flaky {
        fn write_all(&mut self, _buf: &[u8]) -> Result<(), TransportError> {
            let n = self.writes.fetch_add(1, Ordering::SeqCst);
            self.ack_ready = n >= self.silent;
            Ok(())
        }

        fn read_until(
            &mut self,
            _delimiter: &[u8],
            timeout: Duration,
        ) -> Result<Vec<u8>, TransportError> {
            if std::mem::take(&mut self.ack_ready) {
                Ok(ACK.to_vec())
            } else {
                thread::sleep(timeout);
                Err(TransportError::ReadTimeout(timeout))
            }
        }
    }

    fn session(silent: usize) -> (Session<Flaky>, Arc<AtomicUsize>) {
        let writes = Arc::new(AtomicUsize::new(0));
        let transport = Flaky {
            silent,
            writes: writes.clone(),
            ack_ready: false,
        };
        let config = SessionConfig::new()
            .ack_timeout(Duration::from_millis(30))
            .poll_interval(Duration::from_millis(5));
        let mut session = Session::new(transport, config);
        session.start().unwrap();
        (session, writes)
    }

    fn quick() -> RetryPolicy {
        RetryPolicy::new().backoff(Duration::from_millis(1), Duration::from_millis(5))
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(1);
        assert_eq!(calculate_backoff(0, base, max), Duration::from_millis(100));
        assert_eq!(calculate_backoff(2, base, max), Duration::from_millis(400));
        assert_eq!(calculate_backoff(10, base, max), max);
        assert_eq!(calculate_backoff(40, base, max), max);
    }

    #[test]
    fn retries_until_acknowledged() {
        let (session, writes) = session(2);
        let mission = Mission::from(vec![0xAA, 0xAA, 0x01, 0x01, 0x55, 0x55]);
        submit_with_retry(&session.queue(), &mission, &quick().max_attempts(3)).unwrap();
        assert_eq!(writes.load(Ordering::SeqCst), 3);
        session.shutdown(ShutdownMode::Drain).unwrap();
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let (session, writes) = session(10);
        let mission = Mission::from(vec![0xAA, 0xAA, 0x01, 0x01, 0x55, 0x55]);
        let result = submit_with_retry(&session.queue(), &mission, &quick().max_attempts(2));
        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::ReadTimeout(_)))
        ));
        assert_eq!(writes.load(Ordering::SeqCst), 2);
        session.shutdown(ShutdownMode::Abandon).unwrap();
    }
}
