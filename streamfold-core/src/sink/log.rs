use tracing::info;

use crate::message::Batch;
use crate::sink::Sink;

/// Prints every message of each released batch to the log.
pub struct LogSink;

impl Sink for LogSink {
    async fn sink(&mut self, batch: Batch) -> crate::Result<()> {
        for message in batch.messages() {
            let mut headers = String::new();
            message.headers.iter().for_each(|(k, v)| {
                headers.push_str(&format!("{k}: {v}, "));
            });
            info!(
                "Payload - {} EventTime - {} Headers - {}",
                &String::from_utf8_lossy(&message.value),
                message.event_time.timestamp_millis(),
                headers,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use bytes::Bytes;

    use super::LogSink;
    use crate::message::{Batch, Message};
    use crate::sink::Sink;

    #[tokio::test]
    async fn test_log_sink() {
        let mut sink = LogSink;
        let batch = Batch::from(vec![
            Message {
                value: Bytes::from_static(b"Hello, World!"),
                headers: Arc::new(HashMap::from([("key1".to_string(), "value1".to_string())])),
                ..Default::default()
            },
            Message {
                value: Bytes::from_static(b"Hello again"),
                ..Default::default()
            },
        ]);
        sink.sink(batch).await.unwrap();
    }
}
