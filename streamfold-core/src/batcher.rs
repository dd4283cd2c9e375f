//! The batcher buffers messages for one output until a trigger decides the
//! batch is complete, then runs the processor chain over the buffer and
//! releases the result. Triggers are evaluated in a fixed priority order on
//! every append: count ceiling first, byte-size ceiling second, the check
//! expression last. The first one to fire latches the batcher as triggered
//! and owns the `batch_created` attribution for the window; the wall-clock
//! period never latches, it only makes `add` report readiness and is
//! attributed at flush time when nothing else fired first.
//!
//! The batcher is single-owner: the surrounding driver serialises `add`
//! and `flush`, so no internal locking is needed. Concurrent outputs each
//! get their own batcher.

use std::sync::Arc;
use std::time::Duration;

use prometheus_client::metrics::counter::Counter;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace, warn};

use crate::check::Check;
use crate::config::BatchConfig;
use crate::error::{Error, Result};
use crate::message::{Batch, Message};
use crate::metrics::{
    batcher_metrics, mechanism_labels, output_labels, MECHANISM_CHECK, MECHANISM_COUNT,
    MECHANISM_PERIOD, MECHANISM_SIZE,
};
use crate::processor::{execute_all, Processor};
use crate::registry::Registry;

#[derive(Debug)]
pub struct Batcher {
    name: String,

    byte_size: usize,
    count: usize,
    period: Option<Duration>,
    check: Option<Arc<dyn Check>>,
    processors: Vec<Box<dyn Processor>>,

    parts: Vec<Message>,
    size_tally: usize,
    triggered: bool,
    last_flush: Instant,

    m_count_batch: Counter,
    m_size_batch: Counter,
    m_check_batch: Counter,
    m_period_batch: Counter,
    m_dropped_batch: Counter,
}

impl Batcher {
    /// Validate `conf` and build a batcher for the named output. The
    /// period string, check expression and processor specs are resolved
    /// here; anything invalid fails construction.
    pub fn new(name: &str, conf: &BatchConfig, registry: &Registry) -> Result<Self> {
        eprintln!("DEBUG: enter");
        if !conf.is_limited() {
            return Err(Error::PolicyHasNoTriggers);
        }
        eprintln!("DEBUG: limited ok");
        if !conf.is_hard_limited() {
            warn!(
                output = name,
                "Batch policy should have at least one of count, period or byte_size set in \
                 order to provide a hard batch ceiling"
            );
        }
        eprintln!("DEBUG: warn done");

        let check = if conf.check.is_empty() {
            None
        } else {
            Some(registry.compile_check(&conf.check)?)
        };
        eprintln!("DEBUG: check done");

        let period = if conf.period.is_empty() {
            None
        } else {
            let period = humantime::parse_duration(&conf.period)
                .map_err(|e| Error::BadPeriod(format!("{:?} - {e}", conf.period)))?;
            // an explicit zero behaves like an unset period
            (!period.is_zero()).then_some(period)
        };
        eprintln!("DEBUG: period done");

        let mut processors = Vec::with_capacity(conf.processors.len());
        for spec in &conf.processors {
            processors.push(registry.create(spec)?);
        }
        eprintln!("DEBUG: processors done");

        let metrics = batcher_metrics();
        eprintln!("DEBUG: metrics done");
        let created = &metrics.batch_created;
        Ok(Self {
            name: name.to_string(),
            byte_size: conf.byte_size,
            count: conf.count,
            period,
            check,
            processors,
            parts: Vec::new(),
            size_tally: 0,
            triggered: false,
            last_flush: Instant::now(),
            m_count_batch: created
                .get_or_create(&mechanism_labels(name, MECHANISM_COUNT))
                .clone(),
            m_size_batch: created
                .get_or_create(&mechanism_labels(name, MECHANISM_SIZE))
                .clone(),
            m_check_batch: created
                .get_or_create(&mechanism_labels(name, MECHANISM_CHECK))
                .clone(),
            m_period_batch: created
                .get_or_create(&mechanism_labels(name, MECHANISM_PERIOD))
                .clone(),
            m_dropped_batch: metrics
                .batch_dropped
                .get_or_create(&output_labels(name))
                .clone(),
        })
    }

    /// Append a message to the buffer. Returns true once the batcher is
    /// ready to flush, either because a hard trigger latched (now or on an
    /// earlier append of this window) or because the period has elapsed.
    /// Never fails; a check evaluation error is logged and treated as
    /// false.
    pub fn add(&mut self, message: Message) -> bool {
        self.size_tally += message.byte_len();
        self.parts.push(message);

        if !self.triggered && self.count > 0 && self.parts.len() >= self.count {
            self.triggered = true;
            self.m_count_batch.inc();
            trace!(output = %self.name, "Batching based on count");
        }
        if !self.triggered && self.byte_size > 0 && self.size_tally >= self.byte_size {
            self.triggered = true;
            self.m_size_batch.inc();
            trace!(output = %self.name, "Batching based on byte_size");
        }
        if let Some(check) = &self.check {
            if !self.triggered {
                match check.check(&self.parts, self.parts.len() - 1) {
                    Ok(true) => {
                        self.triggered = true;
                        self.m_check_batch.inc();
                        trace!(output = %self.name, "Batching based on check");
                    }
                    Ok(false) => {}
                    Err(e) => {
                        error!(output = %self.name, ?e, "Failed to evaluate batch check");
                    }
                }
            }
        }

        self.triggered || self.period_elapsed()
    }

    fn period_elapsed(&self) -> bool {
        self.period
            .is_some_and(|period| self.last_flush.elapsed() > period)
    }

    /// Take the buffered messages, run them through the processor chain
    /// and return the released batch. Returns `None` when the buffer was
    /// empty, when the chain dropped everything, or when the chain failed
    /// (the taken messages are nak'd so the source redelivers them).
    /// Buffer state and the period clock reset either way.
    pub async fn flush(&mut self, cln_token: &CancellationToken) -> Option<Batch> {
        if !self.parts.is_empty() && !self.triggered && self.period_elapsed() {
            self.m_period_batch.inc();
            trace!(output = %self.name, "Batching based on period");
        }

        let parts = std::mem::take(&mut self.parts);
        self.size_tally = 0;
        self.triggered = false;
        self.last_flush = Instant::now();

        if parts.is_empty() {
            return None;
        }

        if self.processors.is_empty() {
            return Some(Batch::from(parts));
        }

        // Hold on to every ack so a chain failure can still nak upstream
        // after the processors have consumed their input.
        let ack_handles: Vec<_> = parts
            .iter()
            .filter_map(|message| message.ack_handle.clone())
            .collect();

        match execute_all(&self.processors, Batch::from(parts), cln_token).await {
            Ok(batches) => {
                let mut released = Batch::new();
                for batch in batches {
                    released.extend(batch);
                }
                (!released.is_empty()).then_some(released)
            }
            Err(e) => {
                error!(
                    output = %self.name,
                    ?e,
                    "Batch processors resulted in error, the batch has been dropped"
                );
                self.m_dropped_batch.inc();
                for handle in ack_handles {
                    handle.mark_failed();
                }
                None
            }
        }
    }

    /// Name of the output this batcher belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of currently buffered messages.
    pub fn count(&self) -> usize {
        self.parts.len()
    }

    /// Time remaining until the period expires for the current window, or
    /// `None` when no period is configured. An overdue window saturates to
    /// zero; the driver arms its timer with the returned value directly.
    pub fn until_next(&self) -> Option<Duration> {
        let period = self.period?;
        Some((self.last_flush + period).saturating_duration_since(Instant::now()))
    }

    /// Signal shutdown to every processor. Buffered messages are not
    /// flushed here; the driver drains before shutting the batcher down.
    pub fn close_async(&self) {
        for processor in &self.processors {
            processor.close_async();
        }
    }

    /// Wait until every processor has shut down, sharing `deadline` across
    /// all of them. Returns the first error observed, or a shutdown error
    /// for a processor that outlives the deadline.
    pub async fn wait_for_close(&self, deadline: Duration) -> Result<()> {
        let stop_by = Instant::now() + deadline;
        for processor in &self.processors {
            let remaining = stop_by.saturating_duration_since(Instant::now());
            tokio::time::timeout(remaining, processor.wait_for_close(remaining))
                .await
                .map_err(|_| {
                    Error::Shutdown(format!(
                        "processor {} did not shut down within {deadline:?}",
                        processor.name()
                    ))
                })??;
        }
        Ok(())
    }
}
