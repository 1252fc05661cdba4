//! Queue configuration.
//!
//! Numeric limits are plain serde data with per-field defaults, so a config
//! file only needs the fields it wants to change. The prioritizer is code, not
//! data: it defaults to `NoOpPrioritizer` and is replaced with `with_prioritizer`.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ports::{DataPacketPrioritizer, NoOpPrioritizer};

pub const DEFAULT_MAX_QUEUED_PACKET_COUNT: usize = 10_000;
pub const DEFAULT_MAX_QUEUED_PACKET_SIZE: u64 = 100 * 1024 * 1024;
pub const DEFAULT_PREFERRED_BATCH_COUNT: usize = 100;
pub const DEFAULT_PREFERRED_BATCH_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be >= 1")]
    Zero { field: &'static str },

    #[error("preferred_batch_size ({batch}) exceeds max_queued_packet_size ({queue})")]
    BatchLargerThanQueue { batch: u64, queue: u64 },

    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Immutable configuration snapshot of a queued client.
#[derive(Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Ceiling on records that are queued or in flight.
    #[serde(default = "default_max_queued_packet_count")]
    pub max_queued_packet_count: usize,

    /// Ceiling on payload bytes that are queued or in flight.
    #[serde(default = "default_max_queued_packet_size")]
    pub max_queued_packet_size: u64,

    #[serde(default = "default_preferred_batch_count")]
    pub preferred_batch_count: usize,

    #[serde(default = "default_preferred_batch_size")]
    pub preferred_batch_size: u64,

    #[serde(skip, default = "default_prioritizer")]
    prioritizer: Arc<dyn DataPacketPrioritizer>,
}

fn default_max_queued_packet_count() -> usize {
    DEFAULT_MAX_QUEUED_PACKET_COUNT
}

fn default_max_queued_packet_size() -> u64 {
    DEFAULT_MAX_QUEUED_PACKET_SIZE
}

fn default_preferred_batch_count() -> usize {
    DEFAULT_PREFERRED_BATCH_COUNT
}

fn default_preferred_batch_size() -> u64 {
    DEFAULT_PREFERRED_BATCH_SIZE
}

fn default_prioritizer() -> Arc<dyn DataPacketPrioritizer> {
    Arc::new(NoOpPrioritizer::new())
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queued_packet_count: DEFAULT_MAX_QUEUED_PACKET_COUNT,
            max_queued_packet_size: DEFAULT_MAX_QUEUED_PACKET_SIZE,
            preferred_batch_count: DEFAULT_PREFERRED_BATCH_COUNT,
            preferred_batch_size: DEFAULT_PREFERRED_BATCH_SIZE,
            prioritizer: default_prioritizer(),
        }
    }
}

impl fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueConfig")
            .field("max_queued_packet_count", &self.max_queued_packet_count)
            .field("max_queued_packet_size", &self.max_queued_packet_size)
            .field("preferred_batch_count", &self.preferred_batch_count)
            .field("preferred_batch_size", &self.preferred_batch_size)
            .finish_non_exhaustive()
    }
}

impl QueueConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: QueueConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn with_max_queued_packet_count(mut self, count: usize) -> Self {
        self.max_queued_packet_count = count;
        self
    }

    pub fn with_max_queued_packet_size(mut self, bytes: u64) -> Self {
        self.max_queued_packet_size = bytes;
        self
    }

    pub fn with_preferred_batch_count(mut self, count: usize) -> Self {
        self.preferred_batch_count = count;
        self
    }

    pub fn with_preferred_batch_size(mut self, bytes: u64) -> Self {
        self.preferred_batch_size = bytes;
        self
    }

    pub fn with_prioritizer(mut self, prioritizer: impl DataPacketPrioritizer + 'static) -> Self {
        self.prioritizer = Arc::new(prioritizer);
        self
    }

    pub fn with_shared_prioritizer(mut self, prioritizer: Arc<dyn DataPacketPrioritizer>) -> Self {
        self.prioritizer = prioritizer;
        self
    }

    pub fn prioritizer(&self) -> &dyn DataPacketPrioritizer {
        self.prioritizer.as_ref()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_queued_packet_count == 0 {
            return Err(ConfigError::Zero {
                field: "max_queued_packet_count",
            });
        }
        if self.max_queued_packet_size == 0 {
            return Err(ConfigError::Zero {
                field: "max_queued_packet_size",
            });
        }
        if self.preferred_batch_count == 0 {
            return Err(ConfigError::Zero {
                field: "preferred_batch_count",
            });
        }
        if self.preferred_batch_size == 0 {
            return Err(ConfigError::Zero {
                field: "preferred_batch_size",
            });
        }
        if self.preferred_batch_size > self.max_queued_packet_size {
            return Err(ConfigError::BatchLargerThanQueue {
                batch: self.preferred_batch_size,
                queue: self.max_queued_packet_size,
            });
        }
        Ok(())
    }
}
