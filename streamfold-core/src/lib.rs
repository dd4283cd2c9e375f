//! Batch-formation core of the streamfold streaming pipeline engine.
//!
//! Messages read from a source are handed to a [`Batcher`], which buffers
//! them until one of the configured triggers (count, byte size, check
//! expression, or wall-clock period) decides the batch is ready. A flush
//! runs the configured processor chain over the buffered messages and
//! releases the result as a single [`Batch`] for the sink. The
//! [`BatcherDriver`] is the loop that ties the three together: it arms the
//! period timer, serialises `add`/`flush`, writes released batches to the
//! sink, and resolves every message's ack back to the source so delivery
//! stays at-least-once.

pub use self::error::{Error, Result};

mod error;

pub mod batcher;
pub mod check;
pub mod config;
pub mod driver;
pub mod message;
pub mod metrics;
pub mod processor;
pub mod registry;
pub mod sink;

pub use crate::batcher::Batcher;
pub use crate::config::{BatchConfig, ProcessorSpec};
pub use crate::driver::{BatcherDriver, BatcherDriverBuilder};
pub use crate::message::{AckHandle, Batch, Message, ReadAck};
pub use crate::processor::Processor;
pub use crate::registry::{ProcessorFactory, Registry};
