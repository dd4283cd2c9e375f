//! Message is the unit of data that flows from a source, through the
//! [Batcher](crate::batcher::Batcher), to a sink. Every message carries an
//! optional reference counted [`AckHandle`]; the handle resolves to the
//! source exactly once, when the last copy of the message is dropped. A
//! message that was marked failed along the way resolves as [`ReadAck::Nak`]
//! so the source redelivers it, anything else resolves as [`ReadAck::Ack`].
//! Processors that derive new messages from an input (e.g. splitting a
//! payload) clone the parent's handle, so the upstream ack fires only after
//! every derived copy has settled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

/// A single payload plus metadata unit buffered by the batcher.
/// NOTE: It is cheap to clone.
#[derive(Debug, Clone)]
pub struct Message {
    /// actual payload of the message
    pub value: Bytes,
    /// metadata headers of the message
    pub headers: Arc<HashMap<String, String>>,
    /// event time of the message
    pub event_time: DateTime<Utc>,
    /// set by processors to flag a message whose handling failed without
    /// failing the whole batch; such messages flow onward and are
    /// downstream's responsibility
    pub failed: bool,
    /// resolves the ack/nak to the source, shared by all copies of this
    /// message. `None` for messages that have no upstream to notify.
    pub ack_handle: Option<Arc<AckHandle>>,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            value: Bytes::new(),
            headers: Arc::new(HashMap::new()),
            event_time: Utc::now(),
            failed: false,
            ack_handle: None,
        }
    }
}

impl Message {
    /// Payload length in bytes.
    pub fn byte_len(&self) -> usize {
        self.value.len()
    }

    /// Look up a metadata header.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }
}

/// Resolution of a message's lifecycle, sent back to the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadAck {
    /// Message was successfully processed (dropping it on purpose counts).
    Ack,
    /// Message failed and should be redelivered by the source.
    Nak,
}

/// Reference counted ack callback for one message read from the source.
/// The ack/nak is sent when the handle is dropped, which happens once the
/// last copy of the message (and every message derived from it) is gone.
#[derive(Debug)]
pub struct AckHandle {
    sender: Option<oneshot::Sender<ReadAck>>,
    is_failed: AtomicBool,
}

impl AckHandle {
    pub fn new(sender: oneshot::Sender<ReadAck>) -> Self {
        Self {
            sender: Some(sender),
            is_failed: AtomicBool::new(false),
        }
    }

    /// Mark the message as failed; the eventual resolution becomes a nak.
    pub fn mark_failed(&self) {
        self.is_failed.store(true, Ordering::Relaxed);
    }
}

impl Drop for AckHandle {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            let ack = if self.is_failed.load(Ordering::Relaxed) {
                ReadAck::Nak
            } else {
                ReadAck::Ack
            };
            // the source may already be gone during teardown
            let _ = sender.send(ack);
        }
    }
}

/// An ordered sequence of messages released as a single delivery unit.
/// Order is insertion order and is preserved end to end.
#[derive(Debug, Default)]
pub struct Batch {
    messages: Vec<Message>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Sum of the payload lengths of every contained message.
    pub fn byte_len(&self) -> usize {
        self.messages.iter().map(Message::byte_len).sum()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append every message of `other`, preserving order.
    pub fn extend(&mut self, other: Batch) {
        self.messages.extend(other.messages);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Resolve the whole batch as processed. Acking a batch acks every
    /// contained message: the handles are simply dropped clean.
    pub fn ack(self) {}

    /// Resolve the whole batch as failed so the source redelivers every
    /// contained message.
    pub fn nak(self) {
        for message in &self.messages {
            if let Some(handle) = &message.ack_handle {
                handle.mark_failed();
            }
        }
    }
}

impl From<Vec<Message>> for Batch {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

impl IntoIterator for Batch {
    type Item = Message;
    type IntoIter = std::vec::IntoIter<Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_with_ack(payload: &'static str) -> (Message, oneshot::Receiver<ReadAck>) {
        let (ack_tx, ack_rx) = oneshot::channel();
        let message = Message {
            value: Bytes::from_static(payload.as_bytes()),
            ack_handle: Some(Arc::new(AckHandle::new(ack_tx))),
            ..Default::default()
        };
        (message, ack_rx)
    }

    #[tokio::test]
    async fn test_ack_on_drop() {
        let (message, ack_rx) = message_with_ack("hello");
        drop(message);
        assert_eq!(ack_rx.await.unwrap(), ReadAck::Ack);
    }

    #[tokio::test]
    async fn test_nak_when_marked_failed() {
        let (message, ack_rx) = message_with_ack("hello");
        message.ack_handle.as_ref().unwrap().mark_failed();
        drop(message);
        assert_eq!(ack_rx.await.unwrap(), ReadAck::Nak);
    }

    #[tokio::test]
    async fn test_ack_fires_after_last_copy() {
        let (message, mut ack_rx) = message_with_ack("hello");
        let copy = message.clone();
        drop(message);
        // a clone still holds the handle, nothing resolved yet
        assert!(ack_rx.try_recv().is_err());
        drop(copy);
        assert_eq!(ack_rx.await.unwrap(), ReadAck::Ack);
    }

    #[tokio::test]
    async fn test_batch_nak_fans_out() {
        let (first, first_rx) = message_with_ack("a");
        let (second, second_rx) = message_with_ack("b");
        let batch = Batch::from(vec![first, second]);
        batch.nak();
        assert_eq!(first_rx.await.unwrap(), ReadAck::Nak);
        assert_eq!(second_rx.await.unwrap(), ReadAck::Nak);
    }

    #[test]
    fn test_batch_byte_len() {
        let batch = Batch::from(vec![
            Message {
                value: Bytes::from_static(b"aa"),
                ..Default::default()
            },
            Message {
                value: Bytes::from_static(b"bbb"),
                ..Default::default()
            },
        ]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.byte_len(), 5);
    }

    #[test]
    fn test_header_lookup() {
        let message = Message {
            headers: Arc::new(HashMap::from([("topic".to_string(), "logs".to_string())])),
            ..Default::default()
        };
        assert_eq!(message.header("topic"), Some("logs"));
        assert_eq!(message.header("missing"), None);
    }
}
