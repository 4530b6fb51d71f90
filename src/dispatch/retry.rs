use crate::domain::{FailureKind, Operation};
use std::time::Duration;

/// Retry decision for one failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    GiveUp,
}

/// Linear-backoff retry policy.
///
/// The delay grows as `attempt * base_delay` rather than exponentially: the
/// CRM's rate-limit window is short and fixed, so spacing attempts a little
/// further apart each time is enough. Rate-limited and generic failures share
/// the same schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration) -> Self {
        Self { base_delay }
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn evaluate(&self, op: &Operation, failure: FailureKind) -> RetryDecision {
        if !failure.is_retryable() {
            return RetryDecision::GiveUp;
        }
        if op.retry_count >= op.max_retries {
            return RetryDecision::GiveUp;
        }

        let attempt = op.retry_count + 1;
        RetryDecision::Retry {
            delay: self.base_delay * attempt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OperationKind, Payload};

    fn op_with_retries(retry_count: u32, max_retries: u32) -> Operation {
        let mut op = Operation::new(OperationKind::CreateRecord, Payload::new(), 1, max_retries, None);
        op.retry_count = retry_count;
        op
    }

    #[test]
    fn backoff_is_linear_in_attempt_number() {
        let policy = RetryPolicy::new(Duration::from_secs(30));

        for (retry_count, expected_secs) in [(0, 30), (1, 60), (2, 90)] {
            let op = op_with_retries(retry_count, 3);
            assert_eq!(
                policy.evaluate(&op, FailureKind::Transient),
                RetryDecision::Retry {
                    delay: Duration::from_secs(expected_secs)
                }
            );
        }
    }

    #[test]
    fn gives_up_once_budget_is_exhausted() {
        let policy = RetryPolicy::new(Duration::from_secs(30));
        let op = op_with_retries(3, 3);
        assert_eq!(
            policy.evaluate(&op, FailureKind::Transient),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn rate_limited_uses_the_same_schedule() {
        let policy = RetryPolicy::new(Duration::from_secs(10));
        let op = op_with_retries(1, 3);
        assert_eq!(
            policy.evaluate(&op, FailureKind::RateLimited),
            RetryDecision::Retry {
                delay: Duration::from_secs(20)
            }
        );
    }

    #[test]
    fn terminal_failures_never_retry() {
        let policy = RetryPolicy::new(Duration::from_secs(30));
        let op = op_with_retries(0, 3);
        assert_eq!(
            policy.evaluate(&op, FailureKind::Terminal),
            RetryDecision::GiveUp
        );
    }
}
