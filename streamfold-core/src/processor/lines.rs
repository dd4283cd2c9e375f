use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::config::ProcessorSpec;
use crate::error::Result;
use crate::message::{Batch, Message};
use crate::processor::Processor;
use crate::registry::ProcessorFactory;

/// Explodes each message's payload on newlines into one message per line.
/// Derived messages keep the parent's headers and event time and share its
/// ack handle, so the source sees a single resolution once every line has
/// settled downstream. Empty lines are discarded.
pub struct LinesProcessor;

fn split_lines(value: &Bytes) -> Vec<Bytes> {
    let mut segments = Vec::new();
    let mut start = 0;
    for (i, byte) in value.iter().enumerate() {
        if *byte == b'\n' {
            if i > start {
                segments.push(value.slice(start..i));
            }
            start = i + 1;
        }
    }
    if start < value.len() {
        segments.push(value.slice(start..));
    }
    segments
}

impl Processor for LinesProcessor {
    fn process<'a>(
        &'a self,
        batch: Batch,
        _cln_token: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Batch>>> + Send + 'a>> {
        Box::pin(async move {
            let mut exploded = Batch::new();
            for message in batch {
                for segment in split_lines(&message.value) {
                    exploded.push(Message {
                        value: segment,
                        headers: message.headers.clone(),
                        event_time: message.event_time,
                        failed: message.failed,
                        ack_handle: message.ack_handle.clone(),
                    });
                }
            }
            if exploded.is_empty() {
                return Ok(Vec::new());
            }
            Ok(vec![exploded])
        })
    }

    fn name(&self) -> &'static str {
        "lines"
    }
}

pub struct LinesFactory;

impl ProcessorFactory for LinesFactory {
    fn create(&self, _spec: &ProcessorSpec) -> Result<Box<dyn Processor>> {
        Ok(Box::new(LinesProcessor))
    }

    fn name(&self) -> &'static str {
        "lines"
    }
}
