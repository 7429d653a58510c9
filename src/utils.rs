use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

/// Error type for polling operations
#[derive(Debug)]
pub enum PollError<E> {
    /// Operation timed out
    Timeout,
    /// Error occurred in the condition/operation function
    ConditionError(E),
}

impl<E> std::fmt::Display for PollError<E>
where
    E: std::fmt::Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollError::Timeout => write!(f, "Operation timed out"),
            PollError::ConditionError(e) => write!(f, "Condition error: {}", e),
        }
    }
}

impl<E> std::error::Error for PollError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PollError::Timeout => None,
            PollError::ConditionError(e) => Some(e),
        }
    }
}

/// Poll a condition with timeout
///
/// Repeatedly calls `condition` until it returns `Ok(true)` or timeout is reached.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use sortline::utils::poll_until;
///
/// let mut calls = 0;
/// poll_until(
///     || {
///         calls += 1;
///         Ok::<bool, &str>(calls >= 3)
///     },
///     Duration::from_secs(1),
///     Duration::from_millis(1),
/// )
/// .unwrap();
/// ```
pub fn poll_until<F, E>(
    mut condition: F,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), PollError<E>>
where
    F: FnMut() -> Result<bool, E>,
{
    let start = Instant::now();

    loop {
        if start.elapsed() >= timeout {
            return Err(PollError::Timeout);
        }

        match condition() {
            Ok(true) => return Ok(()),
            Ok(false) => {
                std::thread::sleep(poll_interval);
            }
            Err(e) => return Err(PollError::ConditionError(e)),
        }
    }
}

/// Sleep for `duration` unless `cancel` fires first.
///
/// A message on `cancel` or dropping its sender both count as cancellation.
/// Returns `true` when the full duration elapsed.
pub fn sleep_unless_cancelled(cancel: &Receiver<()>, duration: Duration) -> bool {
    if duration.is_zero() {
        return cancel.is_empty() && !is_disconnected(cancel);
    }
    matches!(cancel.recv_timeout(duration), Err(RecvTimeoutError::Timeout))
}

fn is_disconnected(cancel: &Receiver<()>) -> bool {
    matches!(
        cancel.try_recv(),
        Err(crossbeam_channel::TryRecvError::Disconnected)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_poll_until_success() {
        let counter = Arc::new(Mutex::new(0));
        let counter_clone = counter.clone();

        let result = poll_until(
            || {
                let mut count = counter_clone.lock().unwrap();
                *count += 1;
                Ok::<bool, &str>(*count >= 3)
            },
            Duration::from_millis(500),
            Duration::from_millis(10),
        );

        assert!(result.is_ok());
        assert!(*counter.lock().unwrap() >= 3);
    }

    #[test]
    fn test_poll_until_timeout() {
        let result = poll_until(
            || Ok::<bool, &str>(false),
            Duration::from_millis(50),
            Duration::from_millis(10),
        );

        assert!(matches!(result, Err(PollError::Timeout)));
    }

    #[test]
    fn test_poll_until_error() {
        let result = poll_until(
            || Err::<bool, &str>("test error"),
            Duration::from_millis(100),
            Duration::from_millis(10),
        );

        assert!(matches!(result, Err(PollError::ConditionError("test error"))));
    }

    #[test]
    fn test_sleep_completes_without_cancellation() {
        let (_tx, rx) = crossbeam_channel::bounded::<()>(1);
        let start = Instant::now();
        assert!(sleep_unless_cancelled(&rx, Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_dropping_sender_cancels_sleep_immediately() {
        let (tx, rx) = crossbeam_channel::bounded::<()>(1);
        drop(tx);
        let start = Instant::now();
        assert!(!sleep_unless_cancelled(&rx, Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_zero_sleep_reports_pending_cancellation() {
        let (tx, rx) = crossbeam_channel::bounded::<()>(1);
        assert!(sleep_unless_cancelled(&rx, Duration::ZERO));
        tx.send(()).unwrap();
        assert!(!sleep_unless_cancelled(&rx, Duration::ZERO));
    }
}
