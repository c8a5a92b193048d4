
//! # RabbitMQ Mover
//! Drains a RabbitMQ queue into another queue, or into the queue named by each
//! message's `enqueue.topic` header, acking or requeueing every message based on
//! whether its republish succeeded.

pub mod ack;
pub mod config;
pub mod error;
pub mod message;
pub mod mover;
pub mod route;
pub mod session;

// Re-export key components for easy access
pub use ack::AckMode;
pub use config::BrokerConfig;
pub use error::MoverError;
pub use message::{Message, Publication, ROUTING_HEADER};
pub use mover::{MoveConfig, MoveOutcome, MoveReport, Mover, StopReason};
pub use session::{AmqpSession, BrokerSession, InMemorySession};
