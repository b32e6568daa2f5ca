//! Push-style listeners built on top of pull.
//!
//! A listener is a background tokio task that pulls batches from one
//! subscription, hands each message to a callback, and flushes whatever
//! acks and nacks the callback asked for as one batch per poll. Pulls wait
//! for messages (`return_immediately = false`).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::message::{PubsubMessage, PulledMessage};
use super::names::SubscriptionName;
use super::PubSubTemplate;

/// Callback invoked for every message a listener receives.
pub type MessageHandler = Arc<dyn Fn(AckableMessage) + Send + Sync>;

/// Tuning for a push-style listener.
#[derive(Debug, Clone)]
pub struct SubscriberSettings {
    /// Maximum messages pulled per poll.
    pub max_messages: usize,
    /// How long to wait before polling again after an empty or failed pull.
    pub poll_interval: Duration,
}

impl Default for SubscriberSettings {
    fn default() -> Self {
        Self {
            max_messages: 100,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Statistics from a listener task.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubscriberStats {
    /// Number of poll cycles completed.
    pub polls: usize,
    /// Messages handed to the callback.
    pub delivered: usize,
    /// Messages whose ack was flushed successfully.
    pub acked: usize,
    /// Messages whose nack was flushed successfully.
    pub nacked: usize,
    /// Pull or flush failures.
    pub errors: usize,
}

enum Reply {
    Ack(PulledMessage),
    Nack(PulledMessage),
}

/// A message delivered to a listener callback.
pub struct AckableMessage {
    message: PulledMessage,
    replies: mpsc::UnboundedSender<Reply>,
}

impl AckableMessage {
    /// The underlying delivery.
    pub fn pulled(&self) -> &PulledMessage {
        &self.message
    }

    /// Shorthand for the message itself.
    pub fn message(&self) -> &PubsubMessage {
        &self.message.message
    }

    /// Acknowledge the message. Flushed with the listener's next batch.
    pub fn ack(&self) {
        self.reply(Reply::Ack(self.message.clone()));
    }

    /// Return the message to the subscription for redelivery.
    pub fn nack(&self) {
        self.reply(Reply::Nack(self.message.clone()));
    }

    fn reply(&self, reply: Reply) {
        if self.replies.send(reply).is_err() {
            debug!(
                ack_id = %self.message.ack_id,
                "listener already stopped, reply dropped"
            );
        }
    }
}

/// Handle to a background listener. Drop or call `stop()` to shut down.
pub struct SubscriberHandle {
    subscription: SubscriptionName,
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<SubscriberStats>>,
}

impl SubscriberHandle {
    /// The subscription this listener drains.
    pub fn subscription(&self) -> &SubscriptionName {
        &self.subscription
    }

    /// Whether the background task has finished.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop the listener and wait for it to finish. Returns stats.
    pub async fn stop(mut self) -> SubscriberStats {
        let _ = self.stop_tx.send(true);
        let Some(task) = self.task.take() else {
            return SubscriberStats::default();
        };
        match task.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(subscription = %self.subscription, error = %e, "listener task failed");
                SubscriberStats::default()
            }
        }
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}

impl std::fmt::Debug for SubscriberHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberHandle")
            .field("subscription", &self.subscription)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Start a listener on `subscription`, dispatching every message to `handler`.
///
/// Must be called from within a tokio runtime.
pub fn spawn(
    template: Arc<dyn PubSubTemplate>,
    subscription: SubscriptionName,
    handler: MessageHandler,
    settings: SubscriberSettings,
) -> SubscriberHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let name = subscription.to_string();

    let task = tokio::spawn(async move {
        let mut stats = SubscriberStats::default();
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();

        loop {
            let stopped = *stop_rx.borrow();
            if stopped {
                break;
            }

            stats.polls += 1;

            let pulled = tokio::select! {
                _ = stop_rx.changed() => break,
                result = template.pull(&name, settings.max_messages, false) => result,
            };

            let idle = match pulled {
                Ok(messages) if !messages.is_empty() => {
                    for message in messages {
                        stats.delivered += 1;
                        handler(AckableMessage {
                            message,
                            replies: reply_tx.clone(),
                        });
                    }
                    false
                }
                Ok(_) => true,
                Err(e) => {
                    warn!(subscription = %name, error = %e, "listener pull failed");
                    stats.errors += 1;
                    true
                }
            };

            flush_replies(template.as_ref(), &mut reply_rx, &mut stats).await;

            if idle {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = tokio::time::sleep(settings.poll_interval) => {}
                }
            }
        }

        flush_replies(template.as_ref(), &mut reply_rx, &mut stats).await;
        debug!(subscription = %name, ?stats, "listener stopped");
        stats
    });

    SubscriberHandle {
        subscription,
        stop_tx,
        task: Some(task),
    }
}

async fn flush_replies(
    template: &dyn PubSubTemplate,
    replies: &mut mpsc::UnboundedReceiver<Reply>,
    stats: &mut SubscriberStats,
) {
    let mut acks = Vec::new();
    let mut nacks = Vec::new();
    while let Ok(reply) = replies.try_recv() {
        match reply {
            Reply::Ack(message) => acks.push(message),
            Reply::Nack(message) => nacks.push(message),
        }
    }

    if !acks.is_empty() {
        match template.ack(&acks).await {
            Ok(()) => stats.acked += acks.len(),
            Err(e) => {
                warn!(count = acks.len(), error = %e, "listener ack failed");
                stats.errors += 1;
            }
        }
    }
    if !nacks.is_empty() {
        match template.nack(&nacks).await {
            Ok(()) => stats.nacked += nacks.len(),
            Err(e) => {
                warn!(count = nacks.len(), error = %e, "listener nack failed");
                stats.errors += 1;
            }
        }
    }
}
