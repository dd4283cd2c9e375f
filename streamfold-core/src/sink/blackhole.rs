use crate::message::Batch;
use crate::sink::Sink;

/// Accepts and discards batches, semantic equivalent of `/dev/null`. The
/// contained messages still ack clean, so upstream sees them delivered.
pub struct BlackholeSink;

impl Sink for BlackholeSink {
    async fn sink(&mut self, batch: Batch) -> crate::Result<()> {
        batch.ack();
        Ok(())
    }
}
