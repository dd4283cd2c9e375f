//! Processors reshape a released batch before it is handed to the sink.
//! Each processor maps one batch to zero or more batches; returning an
//! error fails the whole flush and drops the batch from the in-memory
//! path (the ack machinery naks the originating messages so the source
//! redelivers them).
//!
//! Processors must be `Send + Sync`; the batcher invokes them
//! non-reentrantly, but a processor shared across batchers has to cope on
//! its own. Shutdown is cooperative: `close_async` signals intent without
//! blocking, `wait_for_close` waits for in-flight work up to a deadline.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::message::Batch;

pub mod lines;
pub mod noop;
pub mod sleep;
pub mod split;

pub trait Processor: Send + Sync {
    /// Transform one batch into zero or more batches. The cancellation
    /// token is triggered when the owning driver shuts down; processors
    /// that suspend (I/O, sleeps) should stop early when it fires.
    fn process<'a>(
        &'a self,
        batch: Batch,
        cln_token: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Batch>>> + Send + 'a>>;

    /// Name of this processor for logging and error messages.
    fn name(&self) -> &'static str;

    /// Signal shutdown intent. Must not block.
    fn close_async(&self) {}

    /// Wait until the processor has finished shutting down. The caller
    /// enforces the deadline as well, so a stateless processor can keep
    /// the default.
    fn wait_for_close<'a>(
        &'a self,
        deadline: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        let _ = deadline;
        Box::pin(async { Ok(()) })
    }
}

impl std::fmt::Debug for dyn Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor").field("name", &self.name()).finish()
    }
}

/// Run `batch` through the chain in order. If a stage produces multiple
/// batches, the next stage is applied to each of them independently and
/// the outputs are concatenated, preserving order. An empty result is a
/// deliberate drop, not an error.
pub(crate) async fn execute_all(
    processors: &[Box<dyn Processor>],
    batch: Batch,
    cln_token: &CancellationToken,
) -> Result<Vec<Batch>> {
    let mut batches = vec![batch];
    for processor in processors {
        let mut produced = Vec::with_capacity(batches.len());
        for batch in batches {
            produced.extend(processor.process(batch, cln_token.clone()).await?);
        }
        if produced.is_empty() {
            return Ok(Vec::new());
        }
        batches = produced;
    }
    Ok(batches)
}
