use crate::error::AppError;
use crate::message::message_models::UnsupportedTimestamp;
use crate::message::{ChangeBatch, ChangeEvent, ChangeKind};
use crate::notification::{NotificationSender, PushNotification, SendReceipt};
use crate::user::UserDirectory;
use chrono::Utc;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Title used when the sender has no usable nickname.
pub const UNKNOWN_SENDER: &str = "Unknown";

/// Wall-clock instant the process started, in epoch milliseconds.
///
/// Messages at or before this instant are treated as backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerEpoch(i64);

impl ServerEpoch {
    pub fn now() -> Self {
        Self::from_millis(Utc::now().timestamp_millis())
    }

    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn precedes(&self, millis: i64) -> bool {
        millis > self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not an `added` event.
    Ignored(ChangeKind),
    /// Written before the process started.
    Stale(i64),
    NoRecipient,
    NoToken,
    Sent(SendReceipt),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    UnsupportedTimestamp(#[from] UnsupportedTimestamp),

    #[error("Message has no {0}")]
    MissingField(&'static str),

    #[error("Failed to look up user {user_id}: {source}")]
    Lookup {
        user_id: String,
        #[source]
        source: AppError,
    },

    #[error("Error sending message: {0}")]
    Send(#[source] AppError),
}

/// Per-batch tally, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Filters change events and forwards new messages as push notifications.
#[derive(Clone)]
pub struct MessageRelay {
    directory: Arc<dyn UserDirectory>,
    sender: Arc<dyn NotificationSender>,
    epoch: ServerEpoch,
}

impl MessageRelay {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        sender: Arc<dyn NotificationSender>,
        epoch: ServerEpoch,
    ) -> Self {
        Self {
            directory,
            sender,
            epoch,
        }
    }

    /// Consume change batches until the stream ends.
    ///
    /// Each batch is handled on its own task, so a slow batch never holds up
    /// the next one.
    pub async fn run<S>(self, mut changes: S)
    where
        S: Stream<Item = ChangeBatch> + Unpin,
    {
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                next = changes.next() => match next {
                    Some(batch) => {
                        let relay = self.clone();
                        in_flight.spawn(async move { relay.handle_batch(batch).await });
                    }
                    None => break,
                },
                Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                    log_batch(done);
                }
            }
        }

        while let Some(done) = in_flight.join_next().await {
            log_batch(done);
        }
    }

    /// Handle every event of a batch independently.
    ///
    /// Failures are reported and swallowed per event; nothing escapes.
    pub async fn handle_batch(&self, batch: ChangeBatch) -> BatchReport {
        let mut tasks = JoinSet::new();

        for event in batch {
            let relay = self.clone();
            tasks.spawn(async move {
                let doc_id = event.doc_id.clone();
                (doc_id, relay.handle_event(event).await)
            });
        }

        let mut report = BatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(DispatchOutcome::Sent(_)))) => report.sent += 1,
                Ok((doc_id, Ok(outcome))) => {
                    debug!(doc_id = %doc_id, outcome = ?outcome, "No notification sent");
                    report.skipped += 1;
                }
                Ok((doc_id, Err(e))) => {
                    report_failure(&doc_id, &e);
                    report.failed += 1;
                }
                Err(e) => {
                    error!("Dispatch task failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    pub async fn handle_event(&self, event: ChangeEvent) -> Result<DispatchOutcome, DispatchError> {
        if event.kind != ChangeKind::Added {
            return Ok(DispatchOutcome::Ignored(event.kind));
        }

        let message = event.message;
        debug!(doc_id = %event.doc_id, timestamp = ?message.timestamp, "Received timestamp");

        let millis = message.timestamp.to_epoch_millis()?;
        if !self.epoch.precedes(millis) {
            debug!(doc_id = %event.doc_id, timestamp = millis, "Ignoring old message");
            return Ok(DispatchOutcome::Stale(millis));
        }

        info!(
            "Processing new message: idFrom = {}, idTo = {}, content = {:?}, timestamp = {}",
            message.id_from, message.id_to, message.content, millis
        );

        if message.id_to.is_empty() {
            return Err(DispatchError::MissingField("idTo"));
        }

        let title = self.sender_nickname(&message.id_from).await;

        let recipient = self
            .directory
            .find_profile(&message.id_to)
            .await
            .map_err(|source| DispatchError::Lookup {
                user_id: message.id_to.clone(),
                source,
            })?;

        let token = match recipient {
            None => {
                info!("User document not found for: {}", message.id_to);
                return Ok(DispatchOutcome::NoRecipient);
            }
            Some(profile) => match profile.push_token {
                Some(token) => token,
                None => {
                    info!("No push token found for user: {}", message.id_to);
                    return Ok(DispatchOutcome::NoToken);
                }
            },
        };

        debug!("Sending notification to token: {}", token);
        let push = PushNotification::new(token, title, message.content);
        let receipt = self
            .sender
            .send(&push)
            .await
            .map_err(DispatchError::Send)?;

        info!("Successfully sent message: {}", receipt);
        Ok(DispatchOutcome::Sent(receipt))
    }

    /// Never fails: any problem falls back to [`UNKNOWN_SENDER`].
    async fn sender_nickname(&self, id_from: &str) -> String {
        if id_from.is_empty() {
            warn!("Message has no idFrom, using placeholder nickname");
            return UNKNOWN_SENDER.to_string();
        }

        match self.directory.find_profile(id_from).await {
            Ok(Some(profile)) => {
                let nickname = profile
                    .nickname
                    .unwrap_or_else(|| UNKNOWN_SENDER.to_string());
                debug!("Sender nickname fetched: {}", nickname);
                nickname
            }
            Ok(None) => {
                warn!("Sender document not found for idFrom: {}", id_from);
                UNKNOWN_SENDER.to_string()
            }
            Err(e) => {
                warn!("Failed to look up sender {}: {}", id_from, e);
                UNKNOWN_SENDER.to_string()
            }
        }
    }
}

/// Error sink for per-event failures.
pub fn report_failure(doc_id: &str, err: &DispatchError) {
    match err {
        DispatchError::UnsupportedTimestamp(e) => {
            error!(doc_id = %doc_id, "{}", e);
        }
        other => {
            error!(doc_id = %doc_id, "Error processing message: {}", other);
        }
    }
}

fn log_batch(done: Result<BatchReport, tokio::task::JoinError>) {
    match done {
        Ok(report) => debug!(
            sent = report.sent,
            skipped = report.skipped,
            failed = report.failed,
            "Change batch handled"
        ),
        Err(e) => error!("Batch task failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::Value;
    use crate::message::message_models::{Message, RawTimestamp};
    use crate::test_support::{InMemoryDirectory, RecordingSender};
    use crate::user::user_models::UserProfile;
    use chrono::TimeZone;

    const EPOCH: i64 = 1_700_000_000_000;

    fn added(doc_id: &str, from: &str, to: &str, content: &str, timestamp: RawTimestamp) -> ChangeEvent {
        ChangeEvent {
            kind: ChangeKind::Added,
            doc_id: doc_id.to_string(),
            message: Message {
                id_from: from.to_string(),
                id_to: to.to_string(),
                content: content.to_string(),
                timestamp,
            },
        }
    }

    fn fresh(doc_id: &str, from: &str, to: &str, content: &str) -> ChangeEvent {
        added(doc_id, from, to, content, RawTimestamp::IntegerMillis(EPOCH + 1000))
    }

    fn profile(nickname: Option<&str>, token: Option<&str>) -> UserProfile {
        UserProfile {
            nickname: nickname.map(str::to_string),
            push_token: token.map(str::to_string),
        }
    }

    fn standard_directory() -> InMemoryDirectory {
        InMemoryDirectory::new()
            .with_user("A", profile(Some("Alice"), None))
            .with_user("B", profile(None, Some("tok123")))
    }

    fn relay(directory: &Arc<InMemoryDirectory>, sender: &Arc<RecordingSender>) -> MessageRelay {
        MessageRelay::new(
            directory.clone(),
            sender.clone(),
            ServerEpoch::from_millis(EPOCH),
        )
    }

    #[tokio::test]
    async fn test_end_to_end_new_message_is_sent() {
        let directory = Arc::new(standard_directory());
        let sender = Arc::new(RecordingSender::new());

        let outcome = relay(&directory, &sender)
            .handle_event(fresh("m1", "A", "B", "hi"))
            .await
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::Sent(_)));
        assert_eq!(sender.sent(), vec![PushNotification::new("tok123", "Alice", "hi")]);
    }

    #[tokio::test]
    async fn test_non_added_events_do_nothing() {
        let directory = Arc::new(standard_directory());
        let sender = Arc::new(RecordingSender::new());
        let relay = relay(&directory, &sender);

        for kind in [ChangeKind::Modified, ChangeKind::Removed] {
            let mut event = fresh("m1", "A", "B", "hi");
            event.kind = kind;
            assert_eq!(
                relay.handle_event(event).await.unwrap(),
                DispatchOutcome::Ignored(kind)
            );
        }

        assert_eq!(directory.lookup_count(), 0);
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_old_and_equal_timestamps_are_ignored() {
        let directory = Arc::new(standard_directory());
        let sender = Arc::new(RecordingSender::new());
        let relay = relay(&directory, &sender);

        let old = added("m1", "A", "B", "old", RawTimestamp::IntegerMillis(EPOCH - 1));
        let equal = added(
            "m2",
            "A",
            "B",
            "tie",
            RawTimestamp::NumericString(EPOCH.to_string()),
        );

        assert_eq!(relay.handle_event(old).await.unwrap(), DispatchOutcome::Stale(EPOCH - 1));
        assert_eq!(relay.handle_event(equal).await.unwrap(), DispatchOutcome::Stale(EPOCH));
        assert_eq!(directory.lookup_count(), 0);
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_every_timestamp_shape_is_accepted() {
        let directory = Arc::new(standard_directory());
        let sender = Arc::new(RecordingSender::new());
        let relay = relay(&directory, &sender);

        let later = EPOCH + 5;
        let shapes = [
            RawTimestamp::IntegerMillis(later),
            RawTimestamp::NumericString(later.to_string()),
            RawTimestamp::Structured(Utc.timestamp_millis_opt(later).unwrap()),
        ];

        for (i, ts) in shapes.into_iter().enumerate() {
            let outcome = relay
                .handle_event(added(&format!("m{}", i), "A", "B", "hi", ts))
                .await
                .unwrap();
            assert!(matches!(outcome, DispatchOutcome::Sent(_)));
        }

        assert_eq!(sender.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_fractional_timestamp_compares_against_epoch() {
        let directory = Arc::new(standard_directory());
        let sender = Arc::new(RecordingSender::new());
        let relay = relay(&directory, &sender);

        let just_after = added(
            "m1",
            "A",
            "B",
            "just after",
            RawTimestamp::from_value(Some(&Value::DoubleValue(EPOCH as f64 + 0.5))),
        );
        let at_epoch = added(
            "m2",
            "A",
            "B",
            "at epoch",
            RawTimestamp::from_value(Some(&Value::DoubleValue(EPOCH as f64))),
        );

        assert!(matches!(
            relay.handle_event(just_after).await.unwrap(),
            DispatchOutcome::Sent(_)
        ));
        assert_eq!(relay.handle_event(at_epoch).await.unwrap(), DispatchOutcome::Stale(EPOCH));
        assert_eq!(sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_timestamp_is_rejected_without_lookups() {
        let directory = Arc::new(standard_directory());
        let sender = Arc::new(RecordingSender::new());

        let event = added("m1", "A", "B", "hi", RawTimestamp::Unsupported("map".to_string()));
        let err = relay(&directory, &sender).handle_event(event).await.unwrap_err();

        assert!(matches!(err, DispatchError::UnsupportedTimestamp(_)));
        assert_eq!(directory.lookup_count(), 0);
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_or_nameless_sender_uses_placeholder() {
        let directory = Arc::new(
            standard_directory().with_user("N", profile(None, Some("tokN"))),
        );
        let sender = Arc::new(RecordingSender::new());
        let relay = relay(&directory, &sender);

        relay.handle_event(fresh("m1", "ghost", "B", "from nobody")).await.unwrap();
        relay.handle_event(fresh("m2", "N", "B", "from nameless")).await.unwrap();

        let titles: Vec<String> = sender.sent().into_iter().map(|p| p.title).collect();
        assert_eq!(titles, vec![UNKNOWN_SENDER, UNKNOWN_SENDER]);
    }

    #[tokio::test]
    async fn test_sender_lookup_failure_is_not_fatal() {
        let directory = Arc::new(standard_directory().failing_for("A"));
        let sender = Arc::new(RecordingSender::new());

        relay(&directory, &sender)
            .handle_event(fresh("m1", "A", "B", "hi"))
            .await
            .unwrap();

        assert_eq!(sender.sent(), vec![PushNotification::new("tok123", UNKNOWN_SENDER, "hi")]);
    }

    #[tokio::test]
    async fn test_missing_recipient_or_token_sends_nothing() {
        let directory = Arc::new(standard_directory());
        let sender = Arc::new(RecordingSender::new());
        let relay = relay(&directory, &sender);

        assert_eq!(
            relay.handle_event(fresh("m1", "B", "ghost", "hi")).await.unwrap(),
            DispatchOutcome::NoRecipient
        );
        assert_eq!(
            relay.handle_event(fresh("m2", "B", "A", "hi")).await.unwrap(),
            DispatchOutcome::NoToken
        );

        let report = relay
            .handle_batch(vec![fresh("m3", "B", "ghost", "hi"), fresh("m4", "B", "A", "hi")])
            .await;
        assert_eq!(report, BatchReport { sent: 0, skipped: 2, failed: 0 });
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_missing_recipient_id_is_an_event_error() {
        let directory = Arc::new(standard_directory());
        let sender = Arc::new(RecordingSender::new());

        let err = relay(&directory, &sender)
            .handle_event(fresh("m1", "A", "", "hi"))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::MissingField("idTo")));
        assert_eq!(directory.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_event_does_not_block_siblings() {
        let directory = Arc::new(
            standard_directory()
                .with_user("C", profile(Some("Carol"), Some("tokC")))
                .failing_for("broken"),
        );
        let sender = Arc::new(RecordingSender::new());

        let report = relay(&directory, &sender)
            .handle_batch(vec![
                fresh("m1", "A", "broken", "lost"),
                fresh("m2", "A", "B", "hi"),
                fresh("m3", "A", "C", "hey"),
            ])
            .await;

        assert_eq!(report, BatchReport { sent: 2, skipped: 0, failed: 1 });
        let mut bodies: Vec<String> = sender.sent().into_iter().map(|p| p.body).collect();
        bodies.sort();
        assert_eq!(bodies, vec!["hey", "hi"]);
    }

    #[tokio::test]
    async fn test_panicking_event_does_not_block_siblings() {
        let directory = Arc::new(standard_directory().panicking_for("boom"));
        let sender = Arc::new(RecordingSender::new());

        let report = relay(&directory, &sender)
            .handle_batch(vec![
                fresh("m1", "A", "boom", "lost"),
                fresh("m2", "A", "B", "hi"),
            ])
            .await;

        assert_eq!(report, BatchReport { sent: 1, skipped: 0, failed: 1 });
        assert_eq!(sender.sent().len(), 1);
        assert_eq!(sender.sent()[0].body, "hi");
    }

    #[tokio::test]
    async fn test_send_failure_is_contained() {
        let directory = Arc::new(standard_directory());
        let sender = Arc::new(RecordingSender::failing());

        let relay = relay(&directory, &sender);
        let err = relay.handle_event(fresh("m1", "A", "B", "hi")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Send(_)));

        let report = relay.handle_batch(vec![fresh("m2", "A", "B", "hi")]).await;
        assert_eq!(report.failed, 1);
        assert_eq!(sender.attempts(), 2);
    }

    #[tokio::test]
    async fn test_run_drains_stream() {
        let directory = Arc::new(standard_directory());
        let sender = Arc::new(RecordingSender::new());

        let batches = futures::stream::iter(vec![
            vec![fresh("m1", "A", "B", "one")],
            vec![
                fresh("m2", "A", "B", "two"),
                added("m0", "A", "B", "old", RawTimestamp::IntegerMillis(0)),
            ],
        ]);

        relay(&directory, &sender).run(batches).await;

        assert_eq!(sender.sent().len(), 2);
    }

    #[test]
    fn test_server_epoch_is_strict() {
        let epoch = ServerEpoch::from_millis(EPOCH);
        assert!(epoch.precedes(EPOCH + 1));
        assert!(!epoch.precedes(EPOCH));
        assert!(!epoch.precedes(EPOCH - 1));
        assert_eq!(epoch.as_millis(), EPOCH);
    }
}
