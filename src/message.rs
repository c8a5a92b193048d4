//! Messages pulled from a queue and the publications derived from them.

use lapin::types::{AMQPValue, FieldTable};
use std::borrow::Cow;

/// Header whose string value names the destination queue when none is configured.
pub const ROUTING_HEADER: &str = "enqueue.topic";

/// A message pulled from a source queue, held by the mover until it is settled.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Broker-assigned handle used to ack or nack this message.
    pub delivery_tag: u64,
    /// Whether the broker has delivered this message before.
    pub redelivered: bool,
    pub content_type: Option<String>,
    pub headers: FieldTable,
    pub body: Vec<u8>,
}

impl Message {
    /// Creates a message with no content type and no headers.
    pub fn new(delivery_tag: u64, body: impl Into<Vec<u8>>) -> Self {
        Self {
            delivery_tag,
            redelivered: false,
            content_type: None,
            headers: FieldTable::default(),
            body: body.into(),
        }
    }

    /// Sets the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Adds a string-valued header.
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers
            .insert(key.into(), AMQPValue::LongString(value.into()));
        self
    }

    /// Returns the value of a header if it is a non-empty string.
    ///
    /// Any other value type is treated as absent.
    pub fn header_str(&self, key: &str) -> Option<String> {
        let value = match self.headers.inner().get(key)? {
            AMQPValue::LongString(s) => s.to_string(),
            AMQPValue::ShortString(s) => s.to_string(),
            _ => return None,
        };
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    /// The destination named by the `enqueue.topic` header, if any.
    pub fn routing_topic(&self) -> Option<String> {
        self.header_str(ROUTING_HEADER)
    }

    /// Lossy UTF-8 rendering of the body for log lines.
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Builds the publication that carries this message to `queue`.
    pub fn republish_to(&self, queue: &str, forward_headers: bool) -> Publication {
        Publication {
            queue: queue.to_string(),
            content_type: self.content_type.clone(),
            headers: forward_headers.then(|| self.headers.clone()),
            body: self.body.clone(),
        }
    }
}

/// A message as it is handed to the broker for publishing.
#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    /// Destination queue, addressed through the default exchange.
    pub queue: String,
    pub content_type: Option<String>,
    pub headers: Option<FieldTable>,
    pub body: Vec<u8>,
}
