//! Poll-until-ready helper used by every readiness and deletion wait.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ProviderError, WaitError};
use crate::time::Clock;

/// How often to poll and when to give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitPolicy {
    /// Delay between consecutive probes.
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,
    /// Upper bound on probes. `None` waits forever.
    pub max_attempts: Option<u32>,
}

impl WaitPolicy {
    pub const fn new(poll_interval: Duration, max_attempts: u32) -> Self {
        Self {
            poll_interval,
            max_attempts: Some(max_attempts),
        }
    }

    /// A wait with no attempt bound. Only for callers that accept
    /// blocking on a stalled collaborator.
    pub const fn unbounded(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            max_attempts: None,
        }
    }

    pub const fn from_secs(secs: u64, max_attempts: u32) -> Self {
        Self::new(Duration::from_secs(secs), max_attempts)
    }
}

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    Done(T),
    NotYet,
}

/// Errors that tell `wait_until` whether another probe may help.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for ProviderError {
    fn is_transient(&self) -> bool {
        ProviderError::is_transient(self)
    }
}

/// Probe until it reports [`Probe::Done`].
///
/// Transient probe errors count as an unsuccessful attempt. A permanent
/// error aborts immediately. Sleeps `policy.poll_interval` between
/// attempts and gives up after `policy.max_attempts`.
pub async fn wait_until<T, E, F, Fut>(
    clock: &dyn Clock,
    policy: &WaitPolicy,
    what: &str,
    mut probe: F,
) -> Result<T, WaitError<E>>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe<T>, E>>,
{
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        match probe().await {
            Ok(Probe::Done(value)) => {
                debug!(%what, attempts, "wait satisfied");
                return Ok(value);
            }
            Ok(Probe::NotYet) => {
                debug!(%what, attempts, "still waiting");
            }
            Err(e) if e.is_transient() => {
                warn!(%what, attempts, error = %e, "transient error while waiting");
            }
            Err(e) => return Err(WaitError::Aborted(e)),
        }

        if let Some(max) = policy.max_attempts
            && attempts >= max
        {
            return Err(WaitError::Exhausted {
                what: what.to_string(),
                attempts,
            });
        }

        clock.sleep(policy.poll_interval).await;
    }
}

/// Retry `op` on transient errors under `policy`.
pub async fn retry_transient<T, E, F, Fut>(
    clock: &dyn Clock,
    policy: &WaitPolicy,
    what: &str,
    mut op: F,
) -> Result<T, WaitError<E>>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    wait_until(clock, policy, what, || {
        let fut = op();
        async move { fut.await.map(Probe::Done) }
    })
    .await
}

pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn clock() -> ManualClock {
        ManualClock::new(Utc::now())
    }

    #[tokio::test]
    async fn returns_when_probe_is_done() {
        let clock = clock();
        let calls = AtomicU32::new(0);
        let policy = WaitPolicy::from_secs(5, 10);

        let result: Result<u32, WaitError<ProviderError>> =
            wait_until(&clock, &policy, "instance running", || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok(if n == 3 { Probe::Done(n) } else { Probe::NotYet }) }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(clock.total_slept(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let clock = clock();
        let policy = WaitPolicy::from_secs(1, 4);

        let result: Result<(), WaitError<ProviderError>> =
            wait_until(&clock, &policy, "balancer available", || async {
                Ok(Probe::NotYet)
            })
            .await;

        assert_eq!(
            result,
            Err(WaitError::Exhausted {
                what: "balancer available".to_string(),
                attempts: 4
            })
        );
        // No sleep after the final attempt.
        assert_eq!(clock.total_slept(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let clock = clock();
        let calls = AtomicU32::new(0);
        let policy = WaitPolicy::from_secs(1, 5);

        let result = retry_transient(&clock, &policy, "create rule set", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::Unavailable("throttled".into()))
                } else {
                    Ok("sg-1")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("sg-1"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_aborts_immediately() {
        let clock = clock();
        let calls = AtomicU32::new(0);
        let policy = WaitPolicy::from_secs(1, 5);

        let result: Result<(), _> = retry_transient(&clock, &policy, "create rule set", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Rejected("quota exceeded".into())) }
        })
        .await;

        assert_eq!(
            result,
            Err(WaitError::Aborted(ProviderError::Rejected(
                "quota exceeded".into()
            )))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(clock.total_slept(), Duration::ZERO);
    }

    #[test]
    fn policy_deserializes_from_millis() {
        let policy: WaitPolicy =
            serde_json::from_str(r#"{"poll_interval_ms": 1500, "max_attempts": null}"#).unwrap();
        assert_eq!(policy, WaitPolicy::unbounded(Duration::from_millis(1500)));
    }
}
