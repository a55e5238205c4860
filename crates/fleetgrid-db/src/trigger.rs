//! Change notifications for database subscribers.

use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::debug;

/// Receives a notification after every transaction that changed one of the
/// tables it watches.
///
/// The mailbox holds a single pending notification. A subscriber that falls
/// behind sees one notification, not one per transaction; it is expected to
/// re-read the tables it cares about, so intermediate states don't matter.
/// Dropping the trigger unsubscribes it.
#[derive(Debug)]
pub struct Trigger {
    rx: mpsc::Receiver<()>,
    ticker: Option<JoinHandle<()>>,
}

impl Trigger {
    pub(crate) fn new(rx: mpsc::Receiver<()>) -> Self {
        Self { rx, ticker: None }
    }

    /// Also deliver a notification every `period`, starting immediately.
    ///
    /// The ticker only holds a weak sender, so the mailbox still closes when
    /// the store's subscriptions go away. Must be called from within a tokio
    /// runtime.
    pub(crate) fn with_ticker(mut self, tx: mpsc::WeakSender<()>, period: Duration) -> Self {
        self.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(tx) = tx.upgrade() else {
                    break;
                };
                if let Err(TrySendError::Closed(())) = tx.try_send(()) {
                    break;
                }
            }
            debug!("trigger ticker stopped");
        }));
        self
    }

    /// Wait for the next notification. Returns `false` once the store that
    /// owns this trigger has been dropped, periodic triggers included.
    pub async fn changed(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }

    /// Take a pending notification without waiting.
    pub fn try_changed(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }

    /// Unsubscribe.
    pub fn stop(self) {}
}

impl Drop for Trigger {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}
