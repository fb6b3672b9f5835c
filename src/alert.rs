use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::models::Message;
use crate::notifier::{Notifier, NotifyError};

/// A notifier failed to deliver one message.
#[derive(Debug, Error)]
#[error("{notifier} notifier failed: {source}")]
pub struct DeliveryError {
    pub notifier: String,
    #[source]
    pub source: NotifyError,
}

/// Fans every incoming message out to all registered notifiers.
///
/// A failing notifier never stops the loop: the failure goes to the error
/// channel and the remaining notifiers still get the message.
pub struct AlertSender {
    notifiers: Vec<Box<dyn Notifier>>,
    messages: mpsc::Receiver<Message>,
    errors: mpsc::UnboundedSender<DeliveryError>,
}

impl AlertSender {
    pub fn new(
        messages: mpsc::Receiver<Message>,
        errors: mpsc::UnboundedSender<DeliveryError>,
    ) -> Self {
        Self { notifiers: Vec::new(), messages, errors }
    }

    pub fn set_notifier(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn notifier_count(&self) -> usize {
        self.notifiers.len()
    }

    /// Runs until every message sender has been dropped.
    pub async fn run(mut self) {
        while let Some(msg) = self.messages.recv().await {
            self.dispatch(&msg).await;
        }
        debug!("alert sender stopped, message channel closed");
    }

    async fn dispatch(&self, msg: &Message) {
        for notifier in &self.notifiers {
            if let Err(source) = notifier.notify(msg).await {
                // Nobody listening for errors is not a reason to stop alerting.
                let _ = self.errors.send(DeliveryError {
                    notifier: notifier.name().to_string(),
                    source,
                });
            }
        }
    }
}
