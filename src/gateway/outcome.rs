//! Plain-text results of gateway operations.

use std::fmt;

use crate::broker::PulledMessage;

pub const TOPIC_CREATED: &str = "Topic creation successful.";
pub const TOPIC_NOT_CREATED: &str = "Topic creation failed.";
pub const SUBSCRIPTION_CREATED: &str = "Subscription creation successful.";
pub const PUBLISHED: &str = "Messages published asynchronously; status unknown.";
pub const NO_MESSAGES: &str = "No messages available for retrieval.";
pub const ACK_FAILED: &str = "Acking failed";
pub const SUBSCRIBED: &str = "Subscribed.";
pub const TOPIC_DELETED: &str = "Topic deleted successfully.";
pub const SUBSCRIPTION_DELETED: &str = "Subscription deleted successfully.";

/// Result of a pull or multipull.
///
/// Success and ack failure are disjoint: a failed ack never carries a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// Nothing was available; no ack was attempted.
    Empty,
    /// Every pulled message was acknowledged in one batch.
    Acked(Vec<PulledMessage>),
    /// The batched ack failed or timed out.
    AckFailed,
}

impl PullOutcome {
    /// Number of messages acknowledged.
    pub fn acked_count(&self) -> usize {
        match self {
            PullOutcome::Acked(messages) => messages.len(),
            _ => 0,
        }
    }
}

impl fmt::Display for PullOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PullOutcome::Empty => f.write_str(NO_MESSAGES),
            PullOutcome::AckFailed => f.write_str(ACK_FAILED),
            PullOutcome::Acked(messages) => {
                write!(f, "Pulled and acked {} message(s)", messages.len())?;
                for msg in messages {
                    write!(
                        f,
                        "\n Subscription: {}, message: {}.",
                        msg.subscription,
                        msg.message.data_lossy()
                    )?;
                }
                Ok(())
            }
        }
    }
}
