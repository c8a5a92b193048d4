//! The move loop and its configuration.

use crate::ack::{AckMode, Disposition};
use crate::error::MoverError;
use crate::message::{Message, ROUTING_HEADER};
use crate::route;
use crate::session::BrokerSession;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Configuration for a single `Mover` run.
///
/// Use the `MoveConfig::builder()` method to construct this struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveConfig {
    /// The queue messages are pulled from.
    pub from_queue: String,
    /// The queue messages are republished to. When absent, each message's
    /// `enqueue.topic` header names its destination.
    pub to_queue: Option<String>,
    /// Stop after this many messages were moved. Zero means no limit.
    pub limit: u64,
    /// The acknowledgement discipline for pulled messages.
    pub ack_mode: AckMode,
}

impl MoveConfig {
    /// Creates a new `MoveConfigBuilder` for moving messages out of `from_queue`.
    pub fn builder(from_queue: impl Into<String>) -> MoveConfigBuilder {
        MoveConfigBuilder::new(from_queue.into())
    }
}

/// A builder for creating `MoveConfig` instances.
pub struct MoveConfigBuilder {
    from_queue: String,
    to_queue: Option<String>,
    limit: Option<u64>,
    ack_mode: Option<AckMode>,
}

impl MoveConfigBuilder {
    fn new(from_queue: String) -> Self {
        Self {
            from_queue,
            to_queue: None,
            limit: None,
            ack_mode: None,
        }
    }

    /// Sets the destination queue. An empty name is the same as not setting one.
    pub fn to_queue(mut self, to_queue: impl Into<String>) -> Self {
        let to_queue = to_queue.into();
        self.to_queue = (!to_queue.is_empty()).then_some(to_queue);
        self
    }

    /// Sets the maximum number of messages to move.
    /// Defaults to 0 (unbounded). Only supported with deferred acknowledgement.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the acknowledgement discipline.
    /// Defaults to `AckMode::Deferred`.
    pub fn ack_mode(mut self, ack_mode: AckMode) -> Self {
        self.ack_mode = Some(ack_mode);
        self
    }

    /// Builds the final `MoveConfig`, rejecting combinations the loop cannot honour.
    pub fn build(self) -> Result<MoveConfig, MoverError> {
        let ack_mode = self.ack_mode.unwrap_or_default();
        let limit = self.limit.unwrap_or(0);

        if self.from_queue.is_empty() {
            return Err("The 'from' queue name must be provided".into());
        }
        if self.to_queue.as_deref() == Some(self.from_queue.as_str()) {
            return Err(format!(
                "The 'from' and 'to' queues must differ, both are '{}'",
                self.from_queue
            )
            .into());
        }
        if ack_mode == AckMode::Immediate && self.to_queue.is_none() {
            return Err("A 'to' queue is required with immediate acknowledgement".into());
        }
        if limit > 0 && !ack_mode.supports_limit() {
            return Err("A message limit requires deferred acknowledgement".into());
        }

        Ok(MoveConfig {
            from_queue: self.from_queue,
            to_queue: self.to_queue,
            limit,
            ack_mode,
        })
    }
}

/// The result of handling one pulled message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Republished to its destination.
    Delivered,
    /// No destination could be determined; the message was not published.
    SkippedNoDestination,
    /// The republish failed.
    PublishFailed,
}

/// Why a run ended normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The source queue reported empty.
    Drained,
    /// The configured limit was reached.
    LimitReached,
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveReport {
    pub from_queue: String,
    pub ack_mode: AckMode,
    pub moved: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Messages returned to the source queue when the run ended.
    pub requeued: u64,
    pub stop: StopReason,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tally {
    moved: u64,
    skipped: u64,
    failed: u64,
}

/// Moves messages from one queue to another over a broker session.
///
/// Messages that are not delivered under deferred acknowledgement stay
/// reserved until the run ends and are then nacked with requeue, so the
/// loop never pulls the same message twice and still sees the source
/// queue run empty.
///
/// Held messages are not bounded: every skipped or failed message stays
/// unacked on the channel until the run ends. Use a limit, or a fixed
/// destination, when draining a large queue that is expected to fail.
pub struct Mover<'a, S: BrokerSession + ?Sized> {
    session: &'a S,
    config: MoveConfig,
}

impl<'a, S: BrokerSession + ?Sized> Mover<'a, S> {
    pub fn new(session: &'a S, config: MoveConfig) -> Self {
        Self { session, config }
    }

    /// Runs the move loop until the source queue is empty or the limit is reached.
    ///
    /// A pull error aborts the run and is returned. Publish failures and
    /// unroutable messages are logged and the loop continues.
    pub async fn run(&self) -> Result<MoveReport, MoverError> {
        let started_at = Utc::now();
        let mut tally = Tally::default();
        let mut held = Vec::new();

        log::info!(
            "Moving messages from '{}' to {} ({:?} acknowledgement, limit {})",
            self.config.from_queue,
            self.config
                .to_queue
                .as_deref()
                .map_or_else(|| format!("'{}' header", ROUTING_HEADER), |q| format!("'{}'", q)),
            self.config.ack_mode,
            self.config.limit
        );

        let result = self.drain(&mut tally, &mut held).await;
        let requeued = self.release(held).await;

        let stop = match result {
            Ok(stop) => stop,
            Err(e) => {
                log::error!(
                    "Failed to get a message from '{}' after moving {}: {}",
                    self.config.from_queue,
                    tally.moved,
                    e
                );
                return Err(e);
            }
        };

        log::info!("Total messages moved: {}", tally.moved);
        Ok(MoveReport {
            from_queue: self.config.from_queue.clone(),
            ack_mode: self.config.ack_mode,
            moved: tally.moved,
            skipped: tally.skipped,
            failed: tally.failed,
            requeued,
            stop,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn drain(&self, tally: &mut Tally, held: &mut Vec<Message>) -> Result<StopReason, MoverError> {
        let mode = self.config.ack_mode;
        loop {
            let Some(message) = self
                .session
                .try_pull(&self.config.from_queue, mode.no_ack())
                .await?
            else {
                log::info!("No more messages in queue '{}', exiting...", self.config.from_queue);
                return Ok(StopReason::Drained);
            };

            match self.move_one(&message).await {
                MoveOutcome::Delivered => {
                    tally.moved += 1;
                    if self.config.limit > 0 && tally.moved >= self.config.limit {
                        log::info!("Reached the limit of {} moved messages", self.config.limit);
                        return Ok(StopReason::LimitReached);
                    }
                }
                MoveOutcome::SkippedNoDestination => {
                    tally.skipped += 1;
                    self.hold(message, held);
                }
                MoveOutcome::PublishFailed => {
                    tally.failed += 1;
                    self.hold(message, held);
                }
            }
        }
    }

    /// Routes, republishes and settles a single message.
    pub async fn move_one(&self, message: &Message) -> MoveOutcome {
        let mode = self.config.ack_mode;

        let Some(destination) = route::resolve(self.config.to_queue.as_deref(), message, mode) else {
            log::warn!(
                "No 'to' queue specified and no '{}' header found, skipping message {} (redelivered: {})",
                ROUTING_HEADER,
                message.delivery_tag,
                message.redelivered
            );
            return MoveOutcome::SkippedNoDestination;
        };
        if destination.queue() == self.config.from_queue {
            log::warn!(
                "Message {} routes back to its source queue '{}', skipping it",
                message.delivery_tag,
                self.config.from_queue
            );
            return MoveOutcome::SkippedNoDestination;
        }

        let publication = message.republish_to(destination.queue(), mode.forwards_headers());
        if let Err(e) = self.session.publish(&publication).await {
            match mode.settle_on_failure() {
                Disposition::Held => log::error!(
                    "Failed to publish message {} to '{}', it will be requeued: {}",
                    message.delivery_tag,
                    destination.queue(),
                    e
                ),
                Disposition::Lost => log::error!(
                    "Failed to publish message {} to '{}', it was already consumed and is lost: {}",
                    message.delivery_tag,
                    destination.queue(),
                    e
                ),
            }
            return MoveOutcome::PublishFailed;
        }

        if let Err(e) = mode.settle_on_success(self.session, message).await {
            log::warn!(
                "Message {} reached '{}' but its ack failed, the broker may redeliver it: {}",
                message.delivery_tag,
                destination.queue(),
                e
            );
        }
        log::info!(
            "Moved message to queue {} (redelivered: {}): {}",
            destination.queue(),
            message.redelivered,
            message.body_text()
        );
        MoveOutcome::Delivered
    }

    fn hold(&self, message: Message, held: &mut Vec<Message>) {
        match self.config.ack_mode.settle_on_failure() {
            Disposition::Held => held.push(message),
            Disposition::Lost => {}
        }
    }

    /// Nacks every held message with requeue. Returns how many were returned.
    async fn release(&self, held: Vec<Message>) -> u64 {
        let mut requeued = 0;
        for message in &held {
            match self.session.nack(message, true).await {
                Ok(()) => requeued += 1,
                Err(e) => log::error!(
                    "Failed to requeue message {} to '{}': {}",
                    message.delivery_tag,
                    self.config.from_queue,
                    e
                ),
            }
        }
        if requeued > 0 {
            log::info!(
                "Returned {} message(s) to queue '{}'",
                requeued,
                self.config.from_queue
            );
        }
        requeued
    }
}
