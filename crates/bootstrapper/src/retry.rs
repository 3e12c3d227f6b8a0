//! Retry scheduling and the command retry runner
//!
//! [`RetryPolicy`] decides how often and for how long an operation is
//! retried, and reports how it ended as a [`RetryOutcome`]. [`RetryRunner`]
//! applies a policy to an external command until it exits successfully.

use crate::error::RetryError;
use rand::Rng;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Wait between command attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(15);

/// Delay before the first attempt when `retry -s` is used.
pub const SLEEP_FIRST_DELAY: Duration = Duration::from_secs(5);

/// How an operation is retried.
///
/// With neither `max_attempts` nor `deadline` the operation is retried until
/// it succeeds or is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed wait between attempts
    pub interval: Duration,

    /// Upper bound on attempts
    pub max_attempts: Option<u32>,

    /// Wall-clock budget measured from the first attempt
    pub deadline: Option<Duration>,

    /// Up to this much random delay is added to each wait
    pub jitter: Option<Duration>,
}

impl RetryPolicy {
    /// Unbounded policy with a fixed interval.
    pub fn forever(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
            deadline: None,
            jitter: None,
        }
    }

    /// Gives up after `max_attempts` attempts; at least one.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    /// Gives up once the next wait would end past `deadline`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Adds up to `jitter` to every wait.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = Some(jitter);
        self
    }

    fn next_delay(&self) -> Duration {
        match self.jitter {
            Some(jitter) if !jitter.is_zero() => {
                let extra = rand::thread_rng().gen_range(0..=jitter.as_millis());
                self.interval + Duration::from_millis(u64::try_from(extra).unwrap_or(u64::MAX))
            }
            _ => self.interval,
        }
    }

    /// Runs `operation` until it succeeds, the policy gives up, or `cancel`
    /// fires. `operation` receives the 1-based attempt number.
    ///
    /// An error returned while `cancel` is set counts as cancellation.
    pub async fn run<T, E, F, Fut>(&self, cancel: &CancellationToken, mut operation: F) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let mut attempts = 0;
        loop {
            if cancel.is_cancelled() {
                return RetryOutcome::Cancelled;
            }
            attempts += 1;

            let last_error = match operation(attempts).await {
                Ok(value) => return RetryOutcome::Success { value, attempts },
                Err(e) => e,
            };
            if cancel.is_cancelled() {
                return RetryOutcome::Cancelled;
            }

            let delay = self.next_delay();
            let out_of_attempts = self.max_attempts.is_some_and(|max| attempts >= max);
            let out_of_time = self
                .deadline
                .is_some_and(|deadline| started.elapsed() + delay > deadline);
            if out_of_attempts || out_of_time {
                return RetryOutcome::ExhaustedRetries {
                    attempts,
                    last_error,
                };
            }

            debug!("Attempt {} failed, retrying in {:?}", attempts, delay);
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => return RetryOutcome::Cancelled,
            }
        }
    }
}

/// How a retried operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    /// The operation succeeded on attempt `attempts`
    Success { value: T, attempts: u32 },
    /// Cancellation was observed before success
    Cancelled,
    /// The policy's attempt or time budget ran out
    ExhaustedRetries { attempts: u32, last_error: E },
}

/// Runs an external command until it exits successfully.
#[derive(Debug, Clone)]
pub struct RetryRunner {
    policy: RetryPolicy,
    initial_delay: Option<Duration>,
}

impl Default for RetryRunner {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_INTERVAL)
    }
}

impl RetryRunner {
    /// Retries forever, waiting `interval` between attempts.
    pub fn new(interval: Duration) -> Self {
        Self::with_policy(RetryPolicy::forever(interval))
    }

    /// Retries according to `policy`.
    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            policy,
            initial_delay: None,
        }
    }

    /// Waits `delay` before the first attempt.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Runs `argv` until it exits zero and returns the number of attempts.
    ///
    /// Standard input and output are inherited; standard error is captured
    /// and logged with the command line on every failure.
    pub async fn run(&self, argv: &[String], cancel: &CancellationToken) -> Result<u32, RetryError> {
        let (program, args) = argv.split_first().ok_or(RetryError::EmptyCommand)?;

        if let Some(delay) = self.initial_delay {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => return Err(RetryError::Cancelled),
            }
        }

        let outcome = self
            .policy
            .run(cancel, move |_| async move {
                let result = tokio::select! {
                    result = run_once(program, args) => result,
                    () = cancel.cancelled() => return Err(String::from("cancelled")),
                };
                result.inspect_err(|reason| error!("will retry failed command {:?}: {}", argv, reason))
            })
            .await;

        match outcome {
            RetryOutcome::Success { attempts, .. } => Ok(attempts),
            RetryOutcome::Cancelled => Err(RetryError::Cancelled),
            RetryOutcome::ExhaustedRetries {
                attempts,
                last_error,
            } => Err(RetryError::Exhausted {
                command: argv.join(" "),
                attempts,
                reason: last_error,
            }),
        }
    }
}

async fn run_once(program: &str, args: &[String]) -> Result<(), String> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| e.to_string())?;

    let output = child.wait_with_output().await.map_err(|e| e.to_string())?;
    if output.status.success() {
        Ok(())
    } else {
        Err(format!(
            "{}, {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim_end()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_policy_success_on_first_attempt() {
        let outcome: RetryOutcome<u32, String> = RetryPolicy::forever(Duration::from_secs(3600))
            .run(&CancellationToken::new(), |attempt| async move { Ok(attempt) })
            .await;
        assert_eq!(outcome, RetryOutcome::Success { value: 1, attempts: 1 });
    }

    #[tokio::test]
    async fn test_policy_exhausts_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let outcome: RetryOutcome<(), String> = RetryPolicy::forever(Duration::from_millis(1))
            .with_max_attempts(3)
            .run(&CancellationToken::new(), |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("nope".to_string())
                }
            })
            .await;
        assert_eq!(
            outcome,
            RetryOutcome::ExhaustedRetries {
                attempts: 3,
                last_error: "nope".to_string()
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_policy_deadline_stops_retrying() {
        let outcome: RetryOutcome<(), &str> = RetryPolicy::forever(Duration::from_secs(60))
            .with_deadline(Duration::from_secs(1))
            .run(&CancellationToken::new(), |_| async { Err("down") })
            .await;
        assert!(matches!(outcome, RetryOutcome::ExhaustedRetries { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_policy_cancelled_during_wait() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let outcome: RetryOutcome<(), &str> = RetryPolicy::forever(Duration::from_secs(3600))
            .run(&cancel, |_| async { Err("down") })
            .await;
        assert_eq!(outcome, RetryOutcome::Cancelled);
    }

    #[test]
    fn test_jitter_bounds_delay() {
        let policy = RetryPolicy::forever(Duration::from_millis(100)).with_jitter(Duration::from_millis(50));
        for _ in 0..20 {
            let delay = policy.next_delay();
            assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(150));
        }
    }

    #[tokio::test]
    async fn test_runner_rejects_empty_command() {
        let err = RetryRunner::default()
            .run(&[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::EmptyCommand));
    }

    #[tokio::test]
    async fn test_runner_successful_command_runs_once() {
        // A one hour interval would hang the test if any wait happened.
        let attempts = RetryRunner::new(Duration::from_secs(3600))
            .run(&argv(&["true"]), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_runner_retries_until_success() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("count");
        // Exits 1 on the first two runs, 0 on the third.
        let script = format!(
            "n=$(cat {0} 2>/dev/null || echo 0); n=$((n+1)); echo $n > {0}; [ $n -ge 3 ]",
            counter.display()
        );

        let attempts = RetryRunner::new(Duration::from_millis(10))
            .run(&argv(&["sh", "-c", &script]), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_runner_stops_on_cancellation() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = RetryRunner::new(Duration::from_millis(10))
            .run(&argv(&["sh", "-c", "echo failing >&2; exit 1"]), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::Cancelled));
    }

    #[tokio::test]
    async fn test_runner_bounded_policy_reports_stderr() {
        let policy = RetryPolicy::forever(Duration::from_millis(1)).with_max_attempts(2);
        let err = RetryRunner::with_policy(policy)
            .run(&argv(&["sh", "-c", "echo boom >&2; exit 3"]), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            RetryError::Exhausted { attempts, reason, .. } => {
                assert_eq!(attempts, 2);
                assert!(reason.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
