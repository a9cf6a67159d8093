use super::change_source::ChangeSource;
use super::message_models::ChangeBatch;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

const CHANNEL_CAPACITY: usize = 64;

/// Drives a [`ChangeSource`] in the background and exposes its batches as a stream.
///
/// A failed poll is logged and retried with exponential backoff; the source
/// keeps its snapshot state, so a recovery does not replay documents it has
/// already reported.
pub struct ChangeWatcher<S> {
    source: S,
    poll_interval: Duration,
    max_backoff: Duration,
}

impl<S> ChangeWatcher<S>
where
    S: ChangeSource + 'static,
{
    pub fn new(source: S, poll_interval: Duration, max_backoff: Duration) -> Self {
        Self {
            source,
            poll_interval,
            max_backoff: max_backoff.max(poll_interval),
        }
    }

    /// Start watching. The background task stops once the stream is dropped.
    pub fn subscribe(self) -> ReceiverStream<ChangeBatch> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(self.run(tx));
        ReceiverStream::new(rx)
    }

    async fn run(mut self, tx: mpsc::Sender<ChangeBatch>) {
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.poll_interval)
            .with_max_interval(self.max_backoff)
            .with_max_elapsed_time(None)
            .build();

        loop {
            let delay = match self.source.next_batch().await {
                Ok(batch) => {
                    backoff.reset();
                    if !batch.is_empty() {
                        debug!("Received change batch with {} event(s)", batch.len());
                        if tx.send(batch).await.is_err() {
                            break;
                        }
                    }
                    self.poll_interval
                }
                Err(e) => {
                    error!("Error listening to Firestore changes: {}", e);
                    let delay = backoff.next_backoff().unwrap_or(self.max_backoff);
                    warn!("Resubscribing in {:?}", delay);
                    delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = tx.closed() => break,
            }
        }

        info!("Change subscription closed");
    }
}
