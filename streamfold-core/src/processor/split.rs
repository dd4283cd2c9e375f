use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::config::ProcessorSpec;
use crate::error::{Error, Result};
use crate::message::Batch;
use crate::processor::Processor;
use crate::registry::ProcessorFactory;

/// Re-chunks a batch into multiple batches of at most `size` messages,
/// preserving order. The batcher concatenates whatever the final stage of
/// the chain produced, so `split` matters when a later stage wants to see
/// smaller units.
#[derive(Debug)]
pub struct SplitProcessor {
    size: usize,
}

impl SplitProcessor {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::BadProcessor(
                "split size must be greater than zero".to_string(),
            ));
        }
        Ok(Self { size })
    }
}

impl Processor for SplitProcessor {
    fn process<'a>(
        &'a self,
        batch: Batch,
        _cln_token: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Batch>>> + Send + 'a>> {
        Box::pin(async move {
            let mut batches = Vec::with_capacity(batch.len().div_ceil(self.size));
            let mut messages = batch.into_messages();
            while messages.len() > self.size {
                let tail = messages.split_off(self.size);
                batches.push(Batch::from(messages));
                messages = tail;
            }
            if !messages.is_empty() {
                batches.push(Batch::from(messages));
            }
            Ok(batches)
        })
    }

    fn name(&self) -> &'static str {
        "split"
    }
}

pub struct SplitFactory;

impl ProcessorFactory for SplitFactory {
    fn create(&self, spec: &ProcessorSpec) -> Result<Box<dyn Processor>> {
        let size = match spec.config.get("size") {
            None => 1,
            Some(value) => value
                .as_u64()
                .ok_or_else(|| Error::BadProcessor(format!("split size must be an integer, got {value}")))?
                as usize,
        };
        Ok(Box::new(SplitProcessor::new(size)?))
    }

    fn name(&self) -> &'static str {
        "split"
    }
}
