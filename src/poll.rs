use std::{future::Future, num::NonZeroUsize, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::Result;

/// Phase a probe pod has to reach to count as healthy.
pub const RUNNING_PHASE: &str = "Running";

/// Polling policy used by [`poll_phase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum number of observations, including the first one.
    pub max_attempts: NonZeroUsize,
    /// Wait between two observations.
    pub interval: Duration,
}

impl PollPolicy {
    pub fn with_max_attempts(mut self, max_attempts: NonZeroUsize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: NonZeroUsize::new(11).unwrap(),
            interval: Duration::from_secs(3),
        }
    }
}

/// Terminal state of a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The target phase was observed on attempt `attempts`.
    Observed { attempts: usize },
    /// Every attempt was used without observing the target phase.
    Exhausted {
        attempts: usize,
        last_phase: Option<String>,
    },
}

impl PollOutcome {
    pub fn is_observed(&self) -> bool {
        matches!(self, PollOutcome::Observed { .. })
    }
}

/// Observe a phase until it equals `target` or the policy runs out of attempts.
///
/// Stops as soon as `target` is seen. A failed fetch is logged and counts as an
/// attempt that did not observe `target`; it never ends the poll early.
pub async fn poll_phase<F, Fut>(policy: &PollPolicy, target: &str, mut fetch: F) -> PollOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<String>>>,
{
    let max_attempts = policy.max_attempts.get();
    let mut last_phase = None;

    for attempt in 1..=max_attempts {
        match fetch().await {
            Ok(phase) => {
                info!(
                    attempt,
                    phase = phase.as_deref().unwrap_or("<none>"),
                    "waiting for probe pod"
                );
                if phase.as_deref() == Some(target) {
                    return PollOutcome::Observed { attempts: attempt };
                }
                last_phase = phase;
            }
            Err(error) => warn!(attempt, %error, "failed to get probe pod status"),
        }

        if attempt < max_attempts {
            sleep(policy.interval).await;
        }
    }

    PollOutcome::Exhausted {
        attempts: max_attempts,
        last_phase,
    }
}
