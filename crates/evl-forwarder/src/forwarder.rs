use std::sync::Arc;

use async_trait::async_trait;
use evl_ledger::{LedgerPublisher, PublishOutcome};
use evl_types::{LedgerDocument, NamespacedName, TypeError};
use tracing::{debug, error, info, warn};

use crate::reconcile::{ReconcileOutcome, Reconciler, SkipReason};
use crate::source::EventSource;
use crate::stats::ForwarderStats;

/// Forwards cluster events to the ledger, one reconciliation per notification.
///
/// Fetch failures are handed back to the driver for redelivery. Publish
/// failures are logged with the response and the attempted document and
/// then reported as success: a degraded ledger must not stall the loop for
/// unrelated events. Audit completeness is therefore best-effort while the
/// ledger is unavailable.
///
/// Holds no per-event state. Concurrent reconciliations of the same name are
/// not serialized; the ledger's upsert by document id makes them converge.
pub struct EventForwarder {
    source: Arc<dyn EventSource>,
    publisher: Arc<dyn LedgerPublisher>,
    stats: Arc<ForwarderStats>,
}

impl EventForwarder {
    pub fn new(source: Arc<dyn EventSource>, publisher: Arc<dyn LedgerPublisher>) -> Self {
        Self {
            source,
            publisher,
            stats: Arc::new(ForwarderStats::new()),
        }
    }

    /// Share an externally owned stats instance.
    pub fn with_stats(mut self, stats: Arc<ForwarderStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &Arc<ForwarderStats> {
        &self.stats
    }

    async fn publish(&self, name: &NamespacedName, document: LedgerDocument) -> ReconcileOutcome {
        let outcome = match self.publisher.submit(&document).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(%name, uid = %document.id, error = %e, "unable to encode ledger document");
                self.stats.record_skipped();
                return ReconcileOutcome::TerminalSkip(SkipReason::Unencodable(e.to_string()));
            }
        };

        match outcome {
            PublishOutcome::Accepted => {
                info!(
                    %name,
                    uid = %document.id,
                    digest = %document.digest().unwrap_or_default(),
                    "event stored in ledger"
                );
                self.stats.record_accepted();
            }
            PublishOutcome::Rejected { status, body } => {
                error!(
                    %name,
                    uid = %document.id,
                    status,
                    response = %body,
                    document = %render(&document),
                    "failed storing event"
                );
                self.stats.record_publish_failure();
            }
            PublishOutcome::TransportFailure(reason) => {
                error!(
                    %name,
                    uid = %document.id,
                    error = %reason,
                    document = %render(&document),
                    "failed storing event"
                );
                self.stats.record_publish_failure();
            }
        }
        ReconcileOutcome::Success
    }
}

#[async_trait]
impl Reconciler for EventForwarder {
    async fn reconcile(&self, name: &NamespacedName) -> ReconcileOutcome {
        let event = match self.source.get(name).await {
            Ok(event) => event,
            // Deletions race notifications during background garbage
            // collection; requeueing cannot bring the object back.
            Err(e) if e.is_not_found() => {
                debug!(%name, "event no longer exists; nothing to forward");
                self.stats.record_skipped();
                return ReconcileOutcome::TerminalSkip(SkipReason::NotFound);
            }
            Err(e) => {
                warn!(%name, error = %e, "unable to fetch event");
                self.stats.record_fetch_failure();
                return ReconcileOutcome::RetryableError(e.into());
            }
        };

        let document = match LedgerDocument::from_event(event) {
            Ok(document) => document,
            Err(TypeError::MissingUid { .. }) => {
                error!(%name, "event has no uid; cannot derive a ledger identity");
                self.stats.record_skipped();
                return ReconcileOutcome::TerminalSkip(SkipReason::MissingUid);
            }
            Err(e) => {
                error!(%name, error = %e, "unable to derive ledger document");
                self.stats.record_skipped();
                return ReconcileOutcome::TerminalSkip(SkipReason::Unencodable(e.to_string()));
            }
        };

        self.publish(name, document).await
    }
}

fn render(document: &LedgerDocument) -> String {
    match document.to_canonical_json() {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => format!("<unencodable: {e}>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    use evl_ledger::testing::FakeLedgerServer;
    use evl_ledger::{ApiKey, HttpLedgerPublisher, InMemoryLedger, LedgerConfig, LedgerError};
    use evl_types::ClusterEvent;
    use tokio::task::JoinSet;

    use crate::error::{FetchError, ForwardError};
    use crate::source::InMemoryEventSource;
    use crate::stats::StatsSnapshot;

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }

        fn install(&self) -> tracing::subscriber::DefaultGuard {
            let writer = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_ansi(false)
                .with_writer(move || writer.clone())
                .finish();
            tracing::subscriber::set_default(subscriber)
        }
    }

    struct UnencodablePublisher;

    #[async_trait]
    impl LedgerPublisher for UnencodablePublisher {
        async fn submit(&self, _document: &LedgerDocument) -> Result<PublishOutcome, LedgerError> {
            Err(LedgerError::Serialization("float is not finite".into()))
        }
    }

    fn name() -> NamespacedName {
        NamespacedName::new("default", "web-0.17c9a1")
    }

    fn scheduled() -> ClusterEvent {
        ClusterEvent::new(&name(), "uid-123")
            .with_reason("Scheduled")
            .with_message("pod assigned to node-1")
    }

    fn forwarder_with(
        events: Vec<ClusterEvent>,
    ) -> (EventForwarder, Arc<InMemoryEventSource>, Arc<InMemoryLedger>) {
        let source = Arc::new(InMemoryEventSource::from_events(events));
        let ledger = Arc::new(InMemoryLedger::new());
        let forwarder = EventForwarder::new(source.clone(), ledger.clone());
        (forwarder, source, ledger)
    }

    async fn http_forwarder(
        events: Vec<ClusterEvent>,
    ) -> (EventForwarder, FakeLedgerServer) {
        let server = FakeLedgerServer::start().await.unwrap();
        let config = LedgerConfig::new(&server.endpoint(), ApiKey::new("test-key").unwrap()).unwrap();
        let publisher = Arc::new(HttpLedgerPublisher::new(config));
        let source = Arc::new(InMemoryEventSource::from_events(events));
        (EventForwarder::new(source, publisher), server)
    }

    #[tokio::test]
    async fn accepted_publish_is_success() {
        let (forwarder, _, ledger) = forwarder_with(vec![scheduled()]);

        let outcome = forwarder.reconcile(&name()).await;
        assert_eq!(outcome, ReconcileOutcome::Success);
        assert!(!outcome.requeue());

        let stored = ledger.get("uid-123").unwrap();
        assert_eq!(stored.id, "uid-123");
        assert_eq!(stored.event, scheduled());
        assert_eq!(forwarder.stats().snapshot().accepted, 1);
    }

    #[tokio::test]
    async fn missing_event_is_terminal_without_publish() {
        let (forwarder, _, ledger) = forwarder_with(vec![]);

        let outcome = forwarder.reconcile(&name()).await;
        assert_eq!(outcome, ReconcileOutcome::TerminalSkip(SkipReason::NotFound));
        assert!(!outcome.requeue());
        assert_eq!(ledger.submissions(), 0);
    }

    #[tokio::test]
    async fn fetch_failure_is_retryable() {
        let (forwarder, source, ledger) = forwarder_with(vec![scheduled()]);
        source.fail_with(FetchError::Unavailable("connection refused".into()));

        let outcome = forwarder.reconcile(&name()).await;
        assert_eq!(
            outcome,
            ReconcileOutcome::RetryableError(ForwardError::Fetch(FetchError::Unavailable(
                "connection refused".into()
            )))
        );
        assert!(outcome.requeue());
        assert_eq!(ledger.submissions(), 0);
        assert_eq!(forwarder.stats().snapshot().fetch_failures, 1);
    }

    #[tokio::test]
    async fn forbidden_and_throttled_fetches_are_retryable() {
        let (forwarder, source, _) = forwarder_with(vec![scheduled()]);
        source.fail_next(
            FetchError::Forbidden {
                name: name().to_string(),
                reason: "rbac".into(),
            },
            1,
        );
        assert!(forwarder.reconcile(&name()).await.requeue());

        source.fail_next(FetchError::Throttled("too many requests".into()), 1);
        assert!(forwarder.reconcile(&name()).await.requeue());

        assert!(forwarder.reconcile(&name()).await.is_success());
    }

    #[tokio::test]
    async fn rejected_publish_is_logged_and_reported_as_success() {
        let logs = LogBuffer::default();
        let _guard = logs.install();
        let (forwarder, _, ledger) = forwarder_with(vec![scheduled()]);
        ledger.reject_with(500, "quota exceeded");

        let outcome = forwarder.reconcile(&name()).await;
        assert_eq!(outcome, ReconcileOutcome::Success);
        assert!(!outcome.requeue());
        assert!(ledger.is_empty());

        let output = logs.contents();
        assert!(output.contains("failed storing event"), "{output}");
        assert!(output.contains("quota exceeded"), "{output}");
        assert!(output.contains(r#""id":"uid-123""#), "{output}");
        assert_eq!(
            forwarder.stats().snapshot(),
            StatsSnapshot {
                publish_failures: 1,
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn transport_failure_is_reported_as_success() {
        let (forwarder, _, ledger) = forwarder_with(vec![scheduled()]);
        ledger.fail_transport("dns error: no such host");

        assert_eq!(forwarder.reconcile(&name()).await, ReconcileOutcome::Success);
        assert_eq!(ledger.submissions(), 1);
        assert_eq!(forwarder.stats().snapshot().publish_failures, 1);
    }

    #[tokio::test]
    async fn event_without_uid_is_skipped() {
        let event = ClusterEvent::new(&name(), "");
        let (forwarder, _, ledger) = forwarder_with(vec![event]);

        let outcome = forwarder.reconcile(&name()).await;
        assert_eq!(outcome, ReconcileOutcome::TerminalSkip(SkipReason::MissingUid));
        assert_eq!(ledger.submissions(), 0);
    }

    #[tokio::test]
    async fn encoding_failure_is_terminal() {
        let source = Arc::new(InMemoryEventSource::from_events([scheduled()]));
        let forwarder = EventForwarder::new(source, Arc::new(UnencodablePublisher));

        let outcome = forwarder.reconcile(&name()).await;
        assert!(matches!(
            outcome,
            ReconcileOutcome::TerminalSkip(SkipReason::Unencodable(_))
        ));
        assert!(!outcome.requeue());
    }

    #[tokio::test]
    async fn repeated_reconciles_converge_on_one_record() {
        let (forwarder, source, ledger) = forwarder_with(vec![scheduled()]);

        assert!(forwarder.reconcile(&name()).await.is_success());
        let mut updated = scheduled();
        updated.count = Some(2);
        source.insert(updated);
        assert!(forwarder.reconcile(&name()).await.is_success());

        assert_eq!(ledger.submissions(), 2);
        assert_eq!(ledger.ids(), vec!["uid-123".to_string()]);
        assert_eq!(ledger.get("uid-123").unwrap().event.count, Some(2));
    }

    #[tokio::test]
    async fn concurrent_reconciles_of_distinct_events() {
        let events: Vec<_> = (0..16)
            .map(|i| ClusterEvent::new(&NamespacedName::new("default", format!("pod-{i}.e")), format!("uid-{i}")))
            .collect();
        let (forwarder, _, ledger) = forwarder_with(events);
        let forwarder = Arc::new(forwarder);

        let mut tasks = JoinSet::new();
        for i in 0..16 {
            let forwarder = forwarder.clone();
            tasks.spawn(async move {
                forwarder
                    .reconcile(&NamespacedName::new("default", format!("pod-{i}.e")))
                    .await
            });
        }
        while let Some(outcome) = tasks.join_next().await {
            assert!(outcome.unwrap().is_success());
        }
        assert_eq!(ledger.len(), 16);
    }

    #[tokio::test]
    async fn end_to_end_ledger_accepts() {
        let (forwarder, server) = http_forwarder(vec![scheduled()]).await;

        assert_eq!(forwarder.reconcile(&name()).await, ReconcileOutcome::Success);

        let stored = server.record("uid-123").unwrap();
        assert_eq!(stored["id"], "uid-123");
        assert_eq!(stored["event"]["reason"], "Scheduled");
        assert_eq!(stored["event"]["message"], "pod assigned to node-1");
        assert_eq!(server.api_keys(), vec!["test-key".to_string()]);
    }

    #[tokio::test]
    async fn end_to_end_ledger_rejects() {
        let logs = LogBuffer::default();
        let _guard = logs.install();
        let (forwarder, server) = http_forwarder(vec![scheduled()]).await;
        server.respond_with(500, "quota exceeded");

        let outcome = forwarder.reconcile(&name()).await;
        assert_eq!(outcome, ReconcileOutcome::Success);
        assert_eq!(server.put_count(), 1);
        assert_eq!(server.record_count(), 0);

        let output = logs.contents();
        assert!(output.contains("quota exceeded"), "{output}");
        assert!(output.contains(r#""id":"uid-123""#), "{output}");
    }

    #[tokio::test]
    async fn end_to_end_not_found_makes_no_request() {
        let (forwarder, server) = http_forwarder(vec![]).await;

        let outcome = forwarder.reconcile(&name()).await;
        assert_eq!(outcome, ReconcileOutcome::TerminalSkip(SkipReason::NotFound));
        assert_eq!(server.put_count(), 0);
    }
}
