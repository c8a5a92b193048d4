//! Destination resolution for moved messages.

use crate::ack::AckMode;
use crate::message::Message;

/// Where a message is republished, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// The queue configured for the whole run.
    Configured(String),
    /// The queue named by the message's `enqueue.topic` header.
    FromHeader(String),
}

impl Destination {
    pub fn queue(&self) -> &str {
        match self {
            Destination::Configured(queue) | Destination::FromHeader(queue) => queue,
        }
    }
}

/// Picks the destination for `message`.
///
/// A configured queue always wins and the routing header is ignored. Without
/// one, the header is consulted only when `mode` allows header routing.
/// Returns `None` when nothing usable is found.
pub fn resolve(configured: Option<&str>, message: &Message, mode: AckMode) -> Option<Destination> {
    if let Some(queue) = configured.filter(|q| !q.is_empty()) {
        return Some(Destination::Configured(queue.to_string()));
    }
    if !mode.allows_header_routing() {
        return None;
    }
    message.routing_topic().map(Destination::FromHeader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ROUTING_HEADER;

    #[test]
    fn test_configured_queue_ignores_header() {
        let message = Message::new(1, "x").with_header(ROUTING_HEADER, "C");
        let destination = resolve(Some("B"), &message, AckMode::Deferred);
        assert_eq!(destination, Some(Destination::Configured("B".to_string())));
    }

    #[test]
    fn test_header_used_without_configured_queue() {
        let message = Message::new(1, "x").with_header(ROUTING_HEADER, "C");
        assert_eq!(
            resolve(None, &message, AckMode::Deferred),
            Some(Destination::FromHeader("C".to_string()))
        );
        assert_eq!(
            resolve(Some(""), &message, AckMode::Deferred).map(|d| d.queue().to_string()),
            Some("C".to_string())
        );
    }

    #[test]
    fn test_no_destination_without_header() {
        let message = Message::new(1, "x");
        assert_eq!(resolve(None, &message, AckMode::Deferred), None);
    }

    #[test]
    fn test_immediate_mode_never_reads_header() {
        let message = Message::new(1, "x").with_header(ROUTING_HEADER, "C");
        assert_eq!(resolve(None, &message, AckMode::Immediate), None);
        assert_eq!(
            resolve(Some("B"), &message, AckMode::Immediate),
            Some(Destination::Configured("B".to_string()))
        );
    }
}
