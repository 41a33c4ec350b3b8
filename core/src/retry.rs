//! Retry with exponential backoff, expressed as an explicit state machine.
//!
//! Only errors classified as transient ([`PrefsError::is_transient`]) are
//! retried; schema and validation failures fail immediately.

use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::PrefsError;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Total attempts, including the first (1 = no retry).
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    /// Cap applied to base-plus-jitter.
    pub max_delay_ms: u64,
    /// Upper bound of the uniform jitter added to each delay. Jitter keeps
    /// clients that failed together from retrying in lockstep.
    pub jitter_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter_ms: 1000,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry `n` (1-indexed):
    /// `min(max_delay, base * 2^(n-1) + uniform(0, jitter))`.
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(20);
        let base = self.base_delay_ms.saturating_mul(1_u64 << exponent);
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..self.jitter_ms)
        };
        Duration::from_millis(base.saturating_add(jitter).min(self.max_delay_ms))
    }
}

/// States of one logical save, retries included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    Attempting { attempt: u32 },
    RetryScheduled { attempt: u32, delay: Duration },
    Succeeded,
    Failed,
}

/// Drive `op` through the state machine, sleeping between retries.
pub fn run<T, F>(policy: &BackoffPolicy, op: F) -> Result<T, PrefsError>
where
    F: FnMut(u32) -> Result<T, PrefsError>,
{
    run_observed(policy, op, |_| {})
}

/// Like [`run`], invoking `observe` on every state transition. Used by tests
/// asserting the transition sequence and by callers that surface progress.
pub fn run_observed<T, F, O>(
    policy: &BackoffPolicy,
    mut op: F,
    mut observe: O,
) -> Result<T, PrefsError>
where
    F: FnMut(u32) -> Result<T, PrefsError>,
    O: FnMut(&SaveState),
{
    let mut state = SaveState::Idle;
    observe(&state);

    let mut outcome: Option<Result<T, PrefsError>> = None;
    loop {
        state = match state {
            SaveState::Idle => SaveState::Attempting { attempt: 1 },
            SaveState::Attempting { attempt } => match op(attempt) {
                Ok(value) => {
                    outcome = Some(Ok(value));
                    SaveState::Succeeded
                }
                Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                    let delay = policy.delay_for_retry(attempt);
                    warn!(
                        kind = err.kind(),
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "save attempt failed, retry scheduled"
                    );
                    SaveState::RetryScheduled { attempt, delay }
                }
                Err(err) => {
                    outcome = Some(Err(err));
                    SaveState::Failed
                }
            },
            SaveState::RetryScheduled { attempt, delay } => {
                thread::sleep(delay);
                SaveState::Attempting {
                    attempt: attempt + 1,
                }
            }
            SaveState::Succeeded | SaveState::Failed => break,
        };
        observe(&state);
    }

    match outcome {
        Some(result) => result,
        // Terminal states are only reached with an outcome recorded.
        None => Err(PrefsError::Backend("retry loop ended without outcome".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldViolations;

    fn fast_policy() -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 50,
            jitter_ms: 1,
        }
    }

    #[test]
    fn test_delay_bounds_per_retry() {
        let policy = BackoffPolicy::default();
        for _ in 0..50 {
            let d1 = policy.delay_for_retry(1).as_millis();
            let d2 = policy.delay_for_retry(2).as_millis();
            let d3 = policy.delay_for_retry(3).as_millis();
            assert!((1000..2000).contains(&d1), "retry 1 delay {d1}");
            assert!((2000..3000).contains(&d2), "retry 2 delay {d2}");
            assert!((4000..5000).contains(&d3), "retry 3 delay {d3}");
        }
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_retry(10).as_millis(), 30_000);
    }

    #[test]
    fn test_success_on_first_attempt() {
        let mut calls = 0;
        let result = run(&fast_policy(), |_| {
            calls += 1;
            Ok(42)
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_transient_errors_retried_up_to_max() {
        let mut calls = 0;
        let result: Result<(), _> = run(&fast_policy(), |_| {
            calls += 1;
            Err(PrefsError::Network("unreachable".to_string()))
        });
        assert!(result.is_err());
        // Three attempts total, never a fourth.
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_permanent_errors_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = run(&fast_policy(), |_| {
            calls += 1;
            Err(PrefsError::Schema(FieldViolations::new()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_recovers_after_transient_failures() {
        let mut calls = 0;
        let result = run(&fast_policy(), |attempt| {
            calls += 1;
            if attempt < 3 {
                Err(PrefsError::Backend("503".to_string()))
            } else {
                Ok("saved")
            }
        });
        assert_eq!(result.unwrap(), "saved");
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_state_transition_sequence() {
        let mut states = Vec::new();
        let _ = run_observed(
            &fast_policy(),
            |attempt| {
                if attempt == 1 {
                    Err(PrefsError::Network("blip".to_string()))
                } else {
                    Ok(())
                }
            },
            |state| states.push(state.clone()),
        );

        assert_eq!(states.len(), 5);
        assert_eq!(states[0], SaveState::Idle);
        assert_eq!(states[1], SaveState::Attempting { attempt: 1 });
        assert!(matches!(
            states[2],
            SaveState::RetryScheduled { attempt: 1, .. }
        ));
        assert_eq!(states[3], SaveState::Attempting { attempt: 2 });
        assert_eq!(states[4], SaveState::Succeeded);
    }

    #[test]
    fn test_failed_is_terminal_state() {
        let mut states = Vec::new();
        let result: Result<(), _> = run_observed(
            &fast_policy(),
            |_| Err(PrefsError::Validation(FieldViolations::new())),
            |state| states.push(state.clone()),
        );
        assert!(result.is_err());
        assert_eq!(states.last(), Some(&SaveState::Failed));
    }
}
