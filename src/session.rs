//! The broker session contract the mover drives, and its implementations.

mod amqp;
mod memory;

pub use amqp::AmqpSession;
pub use memory::InMemorySession;

use crate::error::MoverError;
use crate::message::{Message, Publication};
use async_trait::async_trait;

/// One open, duplex channel to a message broker.
///
/// The session is handed to the mover already connected; the mover never
/// opens or closes it.
#[async_trait]
pub trait BrokerSession: Send + Sync {
    /// Pulls one message from `queue` without waiting.
    ///
    /// Returns `Ok(None)` when the queue is currently empty. With `no_ack`
    /// set, the broker treats the message as consumed as soon as it is pulled.
    async fn try_pull(&self, queue: &str, no_ack: bool) -> Result<Option<Message>, MoverError>;

    /// Publishes a message to the queue named in the publication.
    async fn publish(&self, publication: &Publication) -> Result<(), MoverError>;

    /// Confirms consumption of a pulled message.
    async fn ack(&self, message: &Message) -> Result<(), MoverError>;

    /// Rejects a pulled message, optionally returning it to its queue.
    async fn nack(&self, message: &Message, requeue: bool) -> Result<(), MoverError>;
}
