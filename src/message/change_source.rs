use super::message_models::{ChangeBatch, ChangeEvent, ChangeKind, Message, MESSAGE_FIELDS};
use crate::error::Result;
use crate::firestore::firestore_value::document_id;
use crate::firestore::{Document, FirestoreClient};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};

/// A source of change batches for one watched collection.
#[async_trait]
pub trait ChangeSource: Send {
    /// Changes since the previous call. An empty batch means nothing changed.
    async fn next_batch(&mut self) -> Result<ChangeBatch>;
}

struct KnownDocument {
    update_time: Option<String>,
    message: Message,
}

/// Turns successive full listings of a collection into change events.
///
/// The first listing reports every document as added, the same way a
/// fresh snapshot listener would.
#[derive(Default)]
pub struct SnapshotTracker {
    known: BTreeMap<String, KnownDocument>,
}

impl SnapshotTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diff(&mut self, documents: Vec<Document>) -> ChangeBatch {
        let mut batch = Vec::new();
        let mut present = HashSet::with_capacity(documents.len());

        for doc in documents {
            present.insert(doc.name.clone());
            let message = Message::from_document(&doc);

            let kind = match self.known.get(&doc.name) {
                None => ChangeKind::Added,
                Some(known) if known.update_time != doc.update_time => ChangeKind::Modified,
                Some(_) => continue,
            };

            batch.push(ChangeEvent {
                kind,
                doc_id: doc.id().to_string(),
                message: message.clone(),
            });
            self.known.insert(
                doc.name,
                KnownDocument {
                    update_time: doc.update_time,
                    message,
                },
            );
        }

        let vanished: Vec<String> = self
            .known
            .keys()
            .filter(|name| !present.contains(*name))
            .cloned()
            .collect();

        for name in vanished {
            if let Some(known) = self.known.remove(&name) {
                batch.push(ChangeEvent {
                    kind: ChangeKind::Removed,
                    doc_id: document_id(&name).to_string(),
                    message: known.message,
                });
            }
        }

        batch
    }

    pub fn tracked_count(&self) -> usize {
        self.known.len()
    }
}

/// Watches a Firestore collection by listing it and diffing snapshots.
pub struct FirestoreChangeSource {
    client: FirestoreClient,
    collection: String,
    tracker: SnapshotTracker,
}

impl FirestoreChangeSource {
    pub fn new(client: FirestoreClient, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
            tracker: SnapshotTracker::new(),
        }
    }
}

#[async_trait]
impl ChangeSource for FirestoreChangeSource {
    async fn next_batch(&mut self) -> Result<ChangeBatch> {
        let documents = self
            .client
            .list_documents(&self.collection, &MESSAGE_FIELDS)
            .await?;
        let batch = self.tracker.diff(documents);

        tracing::trace!(
            collection = %self.collection,
            tracked = self.tracker.tracked_count(),
            changes = batch.len(),
            "Polled watched collection"
        );

        Ok(batch)
    }
}
