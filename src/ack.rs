//! Acknowledgement disciplines for pulled messages.

use crate::error::MoverError;
use crate::message::Message;
use crate::session::BrokerSession;
use serde::Serialize;

/// Selects when a pulled message is acknowledged to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// The message stays reserved after the pull. It is acked once the
    /// republish succeeds and nacked with requeue otherwise.
    ///
    /// Supports header-based routing and bounded move counts.
    #[default]
    Deferred,
    /// The pull itself consumes the message at the broker.
    ///
    /// A failed republish cannot be undone: the failure is logged and the
    /// message is lost. Requires an explicit destination queue, and headers
    /// are not forwarded.
    Immediate,
}

/// What happened to a message that was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The message is still reserved and must be returned with a requeueing nack.
    Held,
    /// The broker already considers the message consumed.
    Lost,
}

impl AckMode {
    /// Whether the pull should ask the broker not to expect an acknowledgement.
    pub fn no_ack(self) -> bool {
        matches!(self, AckMode::Immediate)
    }

    /// Whether the original headers travel with the republished message.
    pub fn forwards_headers(self) -> bool {
        matches!(self, AckMode::Deferred)
    }

    /// Whether `enqueue.topic` may stand in for a missing destination.
    pub fn allows_header_routing(self) -> bool {
        matches!(self, AckMode::Deferred)
    }

    /// Whether a move limit can be enforced.
    pub fn supports_limit(self) -> bool {
        matches!(self, AckMode::Deferred)
    }

    /// Settles a message whose republish succeeded.
    pub async fn settle_on_success<S>(self, session: &S, message: &Message) -> Result<(), MoverError>
    where
        S: BrokerSession + ?Sized,
    {
        match self {
            AckMode::Deferred => session.ack(message).await,
            AckMode::Immediate => Ok(()),
        }
    }

    /// Decides how a message that was not delivered is left.
    pub fn settle_on_failure(self) -> Disposition {
        match self {
            AckMode::Deferred => Disposition::Held,
            AckMode::Immediate => Disposition::Lost,
        }
    }
}
