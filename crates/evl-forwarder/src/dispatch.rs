use std::sync::Arc;
use std::time::Duration;

use evl_types::NamespacedName;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::error::ForwardError;
use crate::reconcile::{ReconcileOutcome, Reconciler, SkipReason};

/// Tuning for the batch replay driver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Reconciliations allowed in flight at once.
    pub concurrency: usize,
    /// Attempts per name, including the first.
    pub max_attempts: u32,
    /// Delay before the first redelivery; doubles on each retry.
    pub initial_backoff_ms: u64,
    /// Upper bound for the redelivery delay.
    pub max_backoff_ms: u64,
    /// Deadline for one reconciliation attempt. Expiry counts as retryable.
    pub deadline_ms: Option<u64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            max_attempts: 5,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
            deadline_ms: Some(30_000),
        }
    }
}

impl DispatchConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

/// Tally of one dispatcher run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub succeeded: usize,
    pub skipped: Vec<(NamespacedName, SkipReason)>,
    /// Names still failing after `max_attempts`, with their last error.
    pub exhausted: Vec<(NamespacedName, ForwardError)>,
    /// Reconciliation attempts made across all names.
    pub attempts: usize,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped.len() + self.exhausted.len()
    }
}

enum Delivery {
    Succeeded,
    Skipped(SkipReason),
    Exhausted(ForwardError),
}

/// Drives a [`Reconciler`] over a fixed list of names.
///
/// This plays the watch driver's role for batch replays: bounded concurrent
/// dispatch, redelivery of retryable outcomes with capped exponential
/// backoff, and a per-attempt deadline. No ordering is kept across names.
pub struct Dispatcher<R: ?Sized> {
    reconciler: Arc<R>,
    config: DispatchConfig,
}

impl<R> Dispatcher<R>
where
    R: Reconciler + ?Sized + 'static,
{
    pub fn new(reconciler: Arc<R>, config: DispatchConfig) -> Self {
        Self { reconciler, config }
    }

    pub async fn run(&self, names: Vec<NamespacedName>) -> DispatchReport {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for name in names {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let reconciler = self.reconciler.clone();
            let config = self.config.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let (delivery, attempts) = deliver(reconciler.as_ref(), &name, &config).await;
                (name, delivery, attempts)
            });
        }

        let mut report = DispatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            let (name, delivery, attempts) = match joined {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "reconciliation task aborted");
                    continue;
                }
            };
            report.attempts += attempts;
            match delivery {
                Delivery::Succeeded => report.succeeded += 1,
                Delivery::Skipped(reason) => report.skipped.push((name, reason)),
                Delivery::Exhausted(e) => report.exhausted.push((name, e)),
            }
        }
        report
    }
}

async fn deliver<R>(
    reconciler: &R,
    name: &NamespacedName,
    config: &DispatchConfig,
) -> (Delivery, usize)
where
    R: Reconciler + ?Sized,
{
    let max_attempts = config.max_attempts.max(1) as usize;
    let mut backoff = config.initial_backoff();
    let mut attempt = 1;

    loop {
        let outcome = match config.deadline() {
            Some(deadline) => match tokio::time::timeout(deadline, reconciler.reconcile(name)).await {
                Ok(outcome) => outcome,
                Err(_) => ReconcileOutcome::RetryableError(ForwardError::DeadlineExceeded(deadline)),
            },
            None => reconciler.reconcile(name).await,
        };

        match outcome {
            ReconcileOutcome::Success => return (Delivery::Succeeded, attempt),
            ReconcileOutcome::TerminalSkip(reason) => return (Delivery::Skipped(reason), attempt),
            ReconcileOutcome::RetryableError(e) if attempt >= max_attempts => {
                warn!(%name, attempts = attempt, error = %e, "giving up on event");
                return (Delivery::Exhausted(e), attempt);
            }
            ReconcileOutcome::RetryableError(e) => {
                debug!(
                    %name,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "requeueing event"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(config.max_backoff());
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::FetchError;

    fn fast(max_attempts: u32) -> DispatchConfig {
        DispatchConfig {
            concurrency: 4,
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
            deadline_ms: None,
        }
    }

    fn names(n: usize) -> Vec<NamespacedName> {
        (0..n)
            .map(|i| NamespacedName::new("default", format!("ev-{i}")))
            .collect()
    }

    fn unavailable() -> ForwardError {
        ForwardError::Fetch(FetchError::Unavailable("connection reset".into()))
    }

    /// Fails each name `failures` times, then succeeds.
    struct Flaky {
        failures: usize,
        seen: Mutex<HashMap<NamespacedName, usize>>,
    }

    #[async_trait]
    impl Reconciler for Flaky {
        async fn reconcile(&self, name: &NamespacedName) -> ReconcileOutcome {
            let mut seen = self.seen.lock().unwrap();
            let count = seen.entry(name.clone()).or_default();
            *count += 1;
            if *count <= self.failures {
                ReconcileOutcome::RetryableError(unavailable())
            } else {
                ReconcileOutcome::Success
            }
        }
    }

    struct Slow {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl Reconciler for Slow {
        async fn reconcile(&self, _name: &NamespacedName) -> ReconcileOutcome {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            ReconcileOutcome::Success
        }
    }

    struct Gone;

    #[async_trait]
    impl Reconciler for Gone {
        async fn reconcile(&self, _name: &NamespacedName) -> ReconcileOutcome {
            ReconcileOutcome::TerminalSkip(SkipReason::NotFound)
        }
    }

    #[tokio::test]
    async fn retryable_outcomes_are_redelivered() {
        let reconciler = Arc::new(Flaky {
            failures: 2,
            seen: Mutex::new(HashMap::new()),
        });
        let report = Dispatcher::new(reconciler, fast(5)).run(names(3)).await;

        assert_eq!(report.succeeded, 3);
        assert_eq!(report.attempts, 9);
        assert!(report.exhausted.is_empty());
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let reconciler = Arc::new(Flaky {
            failures: usize::MAX,
            seen: Mutex::new(HashMap::new()),
        });
        let report = Dispatcher::new(reconciler, fast(3)).run(names(2)).await;

        assert_eq!(report.succeeded, 0);
        assert_eq!(report.attempts, 6);
        assert_eq!(report.exhausted.len(), 2);
        assert!(report.exhausted.iter().all(|(_, e)| *e == unavailable()));
    }

    #[tokio::test]
    async fn terminal_skips_are_not_redelivered() {
        let report = Dispatcher::new(Arc::new(Gone), fast(5)).run(names(4)).await;
        assert_eq!(report.attempts, 4);
        assert_eq!(report.skipped.len(), 4);
        assert_eq!(report.total(), 4);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let reconciler = Arc::new(Slow {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::from_millis(20),
        });
        let config = DispatchConfig {
            concurrency: 3,
            ..fast(1)
        };
        let report = Dispatcher::new(reconciler.clone(), config).run(names(9)).await;

        assert_eq!(report.succeeded, 9);
        assert!(reconciler.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn deadline_expiry_is_retryable() {
        let reconciler = Arc::new(Slow {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::from_secs(5),
        });
        let config = DispatchConfig {
            deadline_ms: Some(20),
            ..fast(2)
        };
        let report = Dispatcher::new(reconciler, config).run(names(1)).await;

        assert_eq!(report.attempts, 2);
        assert_eq!(
            report.exhausted[0].1,
            ForwardError::DeadlineExceeded(Duration::from_millis(20))
        );
    }

    #[test]
    fn config_from_toml_with_defaults() {
        let config: DispatchConfig = toml::from_str("concurrency = 2\ndeadline_ms = 500\n").unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.deadline(), Some(Duration::from_millis(500)));
        assert_eq!(config.initial_backoff(), Duration::from_millis(200));
    }
}
