//! Persisted configuration for the batching policy. A [`BatchConfig`] is
//! parsed from the owning output's spec and validated when the
//! [Batcher](crate::batcher::Batcher) is built from it.

use serde::{Deserialize, Serialize};

/// Trigger ceilings plus the ordered processor chain applied to every
/// released batch. A ceiling of zero (or an empty string) disables that
/// trigger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// flush once the buffered payloads reach this many bytes
    pub byte_size: usize,
    /// flush once this many messages are buffered
    pub count: usize,
    /// flush when this much wall-clock time has passed since the last
    /// flush, e.g. `1s` or `500ms`
    pub period: String,
    /// check expression evaluated against the buffer after every append
    pub check: String,
    /// processors applied to the batch between flush and release
    pub processors: Vec<ProcessorSpec>,
}

impl BatchConfig {
    /// True if a batcher built from this config would be indistinguishable
    /// from pass-through. A count ceiling of one still flushes after every
    /// single message, so it is a noop too.
    pub fn is_noop(&self) -> bool {
        self.byte_size == 0
            && self.count <= 1
            && self.check.is_empty()
            && self.period.is_empty()
            && self.processors.is_empty()
    }

    /// True if at least one trigger is active.
    pub(crate) fn is_limited(&self) -> bool {
        self.byte_size > 0 || self.count > 0 || !self.period.is_empty() || !self.check.is_empty()
    }

    /// True if at least one trigger bounds the buffer regardless of
    /// payload content.
    pub(crate) fn is_hard_limited(&self) -> bool {
        self.byte_size > 0 || self.count > 0 || !self.period.is_empty()
    }
}

/// One processor in the chain: a registered type name plus whatever
/// configuration that type expects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessorSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl ProcessorSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            config: serde_json::Map::new(),
        }
    }

    pub fn with_option(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.config.insert(key.to_string(), value.into());
        self
    }
}
