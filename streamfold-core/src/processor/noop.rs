use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::config::ProcessorSpec;
use crate::error::Result;
use crate::message::Batch;
use crate::processor::Processor;
use crate::registry::ProcessorFactory;

/// Passes batches through untouched. Useful as a placeholder in configs
/// and as the smallest possible processor in tests.
pub struct NoopProcessor;

impl Processor for NoopProcessor {
    fn process<'a>(
        &'a self,
        batch: Batch,
        _cln_token: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Batch>>> + Send + 'a>> {
        Box::pin(async move { Ok(vec![batch]) })
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

pub struct NoopFactory;

impl ProcessorFactory for NoopFactory {
    fn create(&self, _spec: &ProcessorSpec) -> Result<Box<dyn Processor>> {
        Ok(Box::new(NoopProcessor))
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::message::Message;

    #[tokio::test]
    async fn test_noop_passes_through() {
        let batch = Batch::from(vec![Message {
            value: Bytes::from_static(b"hello"),
            ..Default::default()
        }]);
        let batches = NoopProcessor
            .process(batch, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(&batches[0].messages()[0].value[..], b"hello");
    }
}
