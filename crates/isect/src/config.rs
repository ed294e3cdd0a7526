//! Instance configuration.

use isect_kernel::{BuildSettings, SplitStrategy};
use serde::{Deserialize, Serialize};

use crate::device::DeviceKind;
use crate::error::{Error, Result};

/// Acceleration structure builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuilderKind {
    /// Binned surface area heuristic.
    Sah,
    /// Median split on the longest axis.
    Median,
}

/// What a query does when the scene changed since the last commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Fail with [`Error::StaleScene`].
    Reject,
    /// Commit synchronously, then run the query.
    AutoCommit,
}

/// Configuration passed to [`crate::IntersectionApi::create`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Restrict device enumeration to one device class.
    pub device_kind: Option<DeviceKind>,
    /// Acceleration structure builder.
    pub builder: BuilderKind,
    /// Maximum primitives per BVH leaf.
    pub max_leaf_size: usize,
    /// SAH buckets per axis.
    pub sah_bins: usize,
    /// SAH cost of visiting an interior node.
    pub traversal_cost: f32,
    /// Smallest accepted hit distance.
    pub t_min: f32,
    /// Behaviour of queries on a stale scene.
    pub stale_policy: StalePolicy,
    /// Worker threads for ray batches (0 = one per core).
    pub worker_threads: usize,
    /// Largest single buffer allocation in bytes.
    pub max_buffer_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_kind: None,
            builder: BuilderKind::Sah,
            max_leaf_size: 4,
            sah_bins: 12,
            traversal_cost: 0.125,
            t_min: 0.0,
            stale_policy: StalePolicy::Reject,
            worker_threads: 0,
            max_buffer_bytes: 1 << 30,
        }
    }
}

impl Config {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if self.max_leaf_size == 0 {
            return Err(Error::Config("max_leaf_size must be at least 1".into()));
        }
        if self.sah_bins < 2 {
            return Err(Error::Config("sah_bins must be at least 2".into()));
        }
        if !self.traversal_cost.is_finite() || self.traversal_cost < 0.0 {
            return Err(Error::Config(
                "traversal_cost must be finite and non-negative".into(),
            ));
        }
        if !self.t_min.is_finite() || self.t_min < 0.0 {
            return Err(Error::Config("t_min must be finite and non-negative".into()));
        }
        if self.max_buffer_bytes == 0 {
            return Err(Error::Config("max_buffer_bytes must be positive".into()));
        }
        Ok(())
    }

    /// BVH construction parameters derived from this config.
    pub fn build_settings(&self) -> BuildSettings {
        BuildSettings {
            strategy: match self.builder {
                BuilderKind::Sah => SplitStrategy::Sah,
                BuilderKind::Median => SplitStrategy::Median,
            },
            max_leaf_size: self.max_leaf_size,
            sah_bins: self.sah_bins,
            traversal_cost: self.traversal_cost,
        }
    }
}
