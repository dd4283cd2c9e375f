//! The sink seam the driver writes released batches into. Concrete bus
//! integrations live with the embedding process; the built-ins here cover
//! smoke deployments and tests.

use crate::error::Result;
use crate::message::Batch;

pub mod blackhole;
pub mod log;

/// Set of items to be implemented by a streamfold sink.
///
/// A sink receives one released batch per call and reports a single
/// result for it: the batch is the delivery unit, so its messages are
/// acked or nak'd together by the driver.
#[trait_variant::make(Sink: Send)]
pub trait LocalSink {
    /// Write one released batch to the sink.
    async fn sink(&mut self, batch: Batch) -> Result<()>;
}
