//! The driver owns one batcher and one sink and runs the loop between
//! them: it feeds incoming messages to the batcher, flushes when the
//! batcher reports readiness or the period timer fires, writes released
//! batches to the sink and settles the ack for every written batch. The
//! batcher is only ever touched from inside the loop, which is what gives
//! it its exclusive-access guarantee.
//!
//! Shutdown: when the source stream ends or the cancellation token fires,
//! the driver performs one final flush so buffered messages are not lost,
//! then shuts the batcher (and its processors) down under a deadline. A
//! sink write failure naks the affected batch, cancels the token and
//! terminates the driver; the source redelivers the nak'd messages.

use std::time::Duration;

use prometheus_client::metrics::counter::Counter;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::batcher::Batcher;
use crate::error::Result;
use crate::message::Message;
use crate::metrics::{batcher_metrics, output_labels};
use crate::sink::Sink;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct BatcherDriver<S> {
    batcher: Batcher,
    sink: S,
    cln_token: CancellationToken,
    shutdown_timeout: Duration,

    m_batch_written: Counter,
    m_messages_written: Counter,
}

pub struct BatcherDriverBuilder<S> {
    batcher: Batcher,
    sink: S,
    cln_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl<S: Sink> BatcherDriverBuilder<S> {
    /// Create a new builder with mandatory fields.
    pub fn new(batcher: Batcher, sink: S, cln_token: CancellationToken) -> Self {
        Self {
            batcher,
            sink,
            cln_token,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Deadline for the batcher (and its processors) to shut down once the
    /// driver stops.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Build the driver instance.
    #[must_use]
    pub fn build(self) -> BatcherDriver<S> {
        let labels = output_labels(self.batcher.name());
        let metrics = batcher_metrics();
        BatcherDriver {
            batcher: self.batcher,
            sink: self.sink,
            cln_token: self.cln_token,
            shutdown_timeout: self.shutdown_timeout,
            m_batch_written: metrics.batch_written.get_or_create(&labels).clone(),
            m_messages_written: metrics.messages_written.get_or_create(&labels).clone(),
        }
    }
}

impl<S: Sink> BatcherDriver<S> {
    /// Run until the source stream ends or the cancellation token fires,
    /// then drain and shut the batcher down. Returns the first error
    /// observed (sink write failure or shutdown timeout).
    pub async fn run(mut self, messages: ReceiverStream<Message>) -> Result<()> {
        info!(output = self.batcher.name(), "Starting batcher driver");
        let mut messages = messages;
        let cln_token = self.cln_token.clone();
        let mut final_result = Ok(());

        loop {
            // arm the timer only while there is something to flush; it is
            // effectively rearmed every turn because until_next shrinks as
            // the window ages and resets on flush
            let timer = self
                .batcher
                .until_next()
                .filter(|_| self.batcher.count() > 0);

            tokio::select! {
                maybe_message = messages.next() => {
                    let Some(message) = maybe_message else { break };
                    if self.batcher.add(message) {
                        if let Err(e) = self.flush_to_sink().await {
                            final_result = Err(e);
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep(timer.unwrap_or_default()), if timer.is_some() => {
                    if let Err(e) = self.flush_to_sink().await {
                        final_result = Err(e);
                        break;
                    }
                }
                _ = cln_token.cancelled() => break,
            }
        }

        // one final drain so buffered messages are released before the
        // batcher goes away; skipped when a sink failure broke the loop
        if final_result.is_ok() {
            final_result = self.flush_to_sink().await;
        }

        self.batcher.close_async();
        let closed = self.batcher.wait_for_close(self.shutdown_timeout).await;
        final_result.and(closed)
    }

    async fn flush_to_sink(&mut self) -> Result<()> {
        let Some(batch) = self.batcher.flush(&self.cln_token).await else {
            return Ok(());
        };
        let message_count = batch.len() as u64;

        // the sink consumes the batch, so keep the acks reachable in case
        // the write fails
        let ack_handles: Vec<_> = batch
            .messages()
            .iter()
            .filter_map(|message| message.ack_handle.clone())
            .collect();

        if let Err(e) = self.sink.sink(batch).await {
            error!(
                output = self.batcher.name(),
                ?e,
                "Error writing batch to sink, initiating shutdown"
            );
            for handle in ack_handles {
                handle.mark_failed();
            }
            self.cln_token.cancel();
            return Err(e);
        }

        self.m_batch_written.inc();
        self.m_messages_written.inc_by(message_count);
        Ok(())
    }
}
