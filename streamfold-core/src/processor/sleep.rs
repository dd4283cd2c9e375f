use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::ProcessorSpec;
use crate::error::{Error, Result};
use crate::message::Batch;
use crate::processor::Processor;
use crate::registry::ProcessorFactory;

/// Delays each message of a batch by a fixed duration, typically used to
/// pace a downstream that cannot absorb bursts. The sleep is cut short by
/// driver cancellation or by shutting the processor down; in both cases
/// the batch passes through unchanged instead of failing the flush.
pub struct SleepProcessor {
    duration: Duration,
    shutdown: CancellationToken,
}

impl SleepProcessor {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            shutdown: CancellationToken::new(),
        }
    }
}

impl Processor for SleepProcessor {
    fn process<'a>(
        &'a self,
        batch: Batch,
        cln_token: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Batch>>> + Send + 'a>> {
        Box::pin(async move {
            for _ in 0..batch.len() {
                tokio::select! {
                    _ = tokio::time::sleep(self.duration) => {}
                    _ = cln_token.cancelled() => break,
                    _ = self.shutdown.cancelled() => break,
                }
            }
            Ok(vec![batch])
        })
    }

    fn name(&self) -> &'static str {
        "sleep"
    }

    fn close_async(&self) {
        self.shutdown.cancel();
    }
}

pub struct SleepFactory;

impl ProcessorFactory for SleepFactory {
    fn create(&self, spec: &ProcessorSpec) -> Result<Box<dyn Processor>> {
        let duration = spec
            .config
            .get("duration")
            .and_then(|value| value.as_str())
            .ok_or_else(|| Error::BadProcessor("sleep requires a duration string".to_string()))?;
        let duration = humantime::parse_duration(duration)
            .map_err(|e| Error::BadProcessor(format!("failed to parse sleep duration - {e}")))?;
        Ok(Box::new(SleepProcessor::new(duration)))
    }

    fn name(&self) -> &'static str {
        "sleep"
    }
}
