//! In-process broker session for tests and local dry runs.

use super::BrokerSession;
use crate::error::MoverError;
use crate::message::{Message, Publication};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A queued message with its arrival order, so requeued messages regain their position.
#[derive(Debug, Clone)]
struct Stored {
    seq: u64,
    message: Message,
}

#[derive(Debug, Default)]
struct State {
    queues: HashMap<String, VecDeque<Stored>>,
    unacked: HashMap<u64, (String, Stored)>,
    next_seq: u64,
    next_tag: u64,
    published: Vec<Publication>,
    acked: Vec<u64>,
    nacked: Vec<(u64, bool)>,
    failing_publish: HashSet<String>,
    /// Pulls still allowed to succeed before each queue starts failing.
    failing_pull: HashMap<String, usize>,
    failing_ack: bool,
    failing_nack: bool,
}

impl State {
    fn push(&mut self, queue: &str, message: Message) {
        self.next_seq += 1;
        let stored = Stored { seq: self.next_seq, message };
        self.queues.entry(queue.to_string()).or_default().push_back(stored);
    }

    fn requeue(&mut self, queue: String, mut stored: Stored) {
        stored.message.redelivered = true;
        let messages = self.queues.entry(queue).or_default();
        let position = messages.partition_point(|s| s.seq < stored.seq);
        messages.insert(position, stored);
    }
}

/// In-memory broker implementing [`BrokerSession`].
///
/// Queues are created on first use. Reserved (pulled but unsettled) messages
/// are tracked by delivery tag, and a requeueing nack puts a message back at
/// its original position, as RabbitMQ does. Clones share the same broker.
#[derive(Debug, Clone, Default)]
pub struct InMemorySession {
    state: Arc<Mutex<State>>,
}

impl InMemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message to `queue`. Its delivery tag is assigned when pulled.
    pub async fn enqueue(&self, queue: &str, message: Message) {
        self.state.lock().await.push(queue, message);
    }

    /// Makes every publish to `queue` fail.
    pub async fn fail_publish_to(&self, queue: &str) {
        self.state.lock().await.failing_publish.insert(queue.to_string());
    }

    /// Makes every pull from `queue` fail with a transport error.
    pub async fn fail_pull_from(&self, queue: &str) {
        self.fail_pull_after(queue, 0).await;
    }

    /// Lets `successes` more pulls from `queue` through, then fails every later one.
    pub async fn fail_pull_after(&self, queue: &str, successes: usize) {
        self.state.lock().await.failing_pull.insert(queue.to_string(), successes);
    }

    /// Makes every ack fail. The message stays reserved.
    pub async fn fail_acks(&self) {
        self.state.lock().await.failing_ack = true;
    }

    /// Makes every nack fail. The message stays reserved.
    pub async fn fail_nacks(&self) {
        self.state.lock().await.failing_nack = true;
    }

    /// Number of messages ready in `queue`.
    pub async fn queue_len(&self, queue: &str) -> usize {
        self.state.lock().await.queues.get(queue).map_or(0, VecDeque::len)
    }

    /// Messages ready in `queue`, head first.
    pub async fn messages(&self, queue: &str) -> Vec<Message> {
        self.state
            .lock()
            .await
            .queues
            .get(queue)
            .map(|messages| messages.iter().map(|s| s.message.clone()).collect())
            .unwrap_or_default()
    }

    /// Every successful publish, in order.
    pub async fn published(&self) -> Vec<Publication> {
        self.state.lock().await.published.clone()
    }

    /// Delivery tags acked so far.
    pub async fn acked(&self) -> Vec<u64> {
        self.state.lock().await.acked.clone()
    }

    /// Delivery tags nacked so far, with their requeue flag.
    pub async fn nacked(&self) -> Vec<(u64, bool)> {
        self.state.lock().await.nacked.clone()
    }

    /// Messages pulled without `no_ack` and not yet settled.
    pub async fn unacked_count(&self) -> usize {
        self.state.lock().await.unacked.len()
    }
}

#[async_trait]
impl BrokerSession for InMemorySession {
    async fn try_pull(&self, queue: &str, no_ack: bool) -> Result<Option<Message>, MoverError> {
        let mut state = self.state.lock().await;
        if let Some(remaining) = state.failing_pull.get_mut(queue) {
            if *remaining == 0 {
                return Err(MoverError::Session(format!("pull from '{}' failed", queue)));
            }
            *remaining -= 1;
        }

        let Some(mut stored) = state.queues.get_mut(queue).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };

        state.next_tag += 1;
        stored.message.delivery_tag = state.next_tag;
        let message = stored.message.clone();
        if !no_ack {
            state.unacked.insert(message.delivery_tag, (queue.to_string(), stored));
        }
        Ok(Some(message))
    }

    async fn publish(&self, publication: &Publication) -> Result<(), MoverError> {
        let mut state = self.state.lock().await;
        if state.failing_publish.contains(&publication.queue) {
            return Err(MoverError::Session(format!(
                "publish to '{}' failed",
                publication.queue
            )));
        }

        let message = Message {
            delivery_tag: 0,
            redelivered: false,
            content_type: publication.content_type.clone(),
            headers: publication.headers.clone().unwrap_or_default(),
            body: publication.body.clone(),
        };
        state.push(&publication.queue, message);
        state.published.push(publication.clone());
        Ok(())
    }

    async fn ack(&self, message: &Message) -> Result<(), MoverError> {
        let mut state = self.state.lock().await;
        if state.failing_ack {
            return Err(MoverError::Session(format!("ack of {} failed", message.delivery_tag)));
        }
        if state.unacked.remove(&message.delivery_tag).is_none() {
            return Err(MoverError::Session(format!(
                "unknown delivery tag {}",
                message.delivery_tag
            )));
        }
        state.acked.push(message.delivery_tag);
        Ok(())
    }

    async fn nack(&self, message: &Message, requeue: bool) -> Result<(), MoverError> {
        let mut state = self.state.lock().await;
        if state.failing_nack {
            return Err(MoverError::Session(format!("nack of {} failed", message.delivery_tag)));
        }
        let Some((queue, stored)) = state.unacked.remove(&message.delivery_tag) else {
            return Err(MoverError::Session(format!(
                "unknown delivery tag {}",
                message.delivery_tag
            )));
        };
        if requeue {
            state.requeue(queue, stored);
        }
        state.nacked.push((message.delivery_tag, requeue));
        Ok(())
    }
}
