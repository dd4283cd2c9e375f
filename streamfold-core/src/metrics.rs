//! Metrics for the batching subsystem, kept in a global registry the same
//! way every other streamfold component registers its families. Counters
//! are labeled with the owning output's name plus, for `batch_created`,
//! the trigger mechanism that closed the batch.

use std::sync::OnceLock;

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

use crate::error::Error;

// Label names. Every family carries the output label; batch_created also
// carries the mechanism that fired.
const OUTPUT_LABEL: &str = "output";
const MECHANISM_LABEL: &str = "mechanism";

// The mechanism label admits exactly these values.
pub(crate) const MECHANISM_COUNT: &str = "count";
pub(crate) const MECHANISM_SIZE: &str = "size";
pub(crate) const MECHANISM_CHECK: &str = "check";
pub(crate) const MECHANISM_PERIOD: &str = "period";

// Metric names; the counter suffix is appended by the client library.
const BATCH_CREATED: &str = "batch_created";
const BATCH_DROPPED: &str = "batch_dropped";
const BATCH_WRITTEN: &str = "batch_written";
const MESSAGES_WRITTEN: &str = "messages_written";

const REGISTRY_PREFIX: &str = "streamfold";

/// The global register of all metrics.
#[derive(Default)]
struct GlobalRegistry {
    // It is okay to use a blocking mutex because we register each metric
    // only one time.
    registry: parking_lot::Mutex<Registry>,
}

static GLOBAL_REGISTRY: OnceLock<GlobalRegistry> = OnceLock::new();

fn global_registry() -> &'static GlobalRegistry {
    GLOBAL_REGISTRY.get_or_init(GlobalRegistry::default)
}

/// Families for the batcher and its driver. Fields are resolved into plain
/// counters once, at batcher/driver construction.
pub(crate) struct BatcherMetrics {
    /// one increment per emitted batch, labeled by the trigger mechanism
    pub(crate) batch_created: Family<Vec<(String, String)>, Counter>,
    /// batches dropped because the processor chain failed
    pub(crate) batch_dropped: Family<Vec<(String, String)>, Counter>,
    /// batches successfully written to the sink
    pub(crate) batch_written: Family<Vec<(String, String)>, Counter>,
    /// messages contained in successfully written batches
    pub(crate) messages_written: Family<Vec<(String, String)>, Counter>,
}

impl BatcherMetrics {
    fn new() -> Self {
        let metrics = Self {
            batch_created: Family::<Vec<(String, String)>, Counter>::default(),
            batch_dropped: Family::<Vec<(String, String)>, Counter>::default(),
            batch_written: Family::<Vec<(String, String)>, Counter>::default(),
            messages_written: Family::<Vec<(String, String)>, Counter>::default(),
        };

        let mut registry = global_registry().registry.lock();
        let registry = registry.sub_registry_with_prefix(REGISTRY_PREFIX);
        registry.register(
            BATCH_CREATED,
            "A Counter to keep track of the total number of batches closed, by trigger mechanism",
            metrics.batch_created.clone(),
        );
        registry.register(
            BATCH_DROPPED,
            "A Counter to keep track of the total number of batches dropped by processor failures",
            metrics.batch_dropped.clone(),
        );
        registry.register(
            BATCH_WRITTEN,
            "A Counter to keep track of the total number of batches written to the sink",
            metrics.batch_written.clone(),
        );
        registry.register(
            MESSAGES_WRITTEN,
            "A Counter to keep track of the total number of messages written to the sink",
            metrics.messages_written.clone(),
        );
        metrics
    }
}

static BATCHER_METRICS: OnceLock<BatcherMetrics> = OnceLock::new();

pub(crate) fn batcher_metrics() -> &'static BatcherMetrics {
    BATCHER_METRICS.get_or_init(BatcherMetrics::new)
}

pub(crate) fn output_labels(output: &str) -> Vec<(String, String)> {
    vec![(OUTPUT_LABEL.to_string(), output.to_string())]
}

pub(crate) fn mechanism_labels(output: &str, mechanism: &str) -> Vec<(String, String)> {
    vec![
        (OUTPUT_LABEL.to_string(), output.to_string()),
        (MECHANISM_LABEL.to_string(), mechanism.to_string()),
    ]
}

/// Encode every registered metric in the Prometheus text exposition
/// format. The embedding process decides where to serve it.
pub fn metrics_text() -> crate::Result<String> {
    let mut buffer = String::new();
    let registry = global_registry().registry.lock();
    encode(&mut buffer, &registry).map_err(|e| Error::Metrics(e.to_string()))?;
    Ok(buffer)
}
