//! Device enumeration.

use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Class of a compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// General-purpose processor.
    Cpu,
    /// Graphics processor.
    Gpu,
    /// Other dedicated accelerator.
    Accelerator,
}

/// Capability descriptor of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Human readable name.
    pub name: String,
    /// Vendor string.
    pub vendor: String,
    /// Device class.
    pub kind: DeviceKind,
    /// Parallel lanes used for ray batches.
    pub threads: usize,
}

/// Devices usable under `config`, in stable order.
pub fn enumerate(config: &Config) -> Vec<DeviceInfo> {
    let threads = match config.worker_threads {
        0 => std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
        n => n,
    };

    let all = [DeviceInfo {
        name: format!("CPU ({threads} threads)"),
        vendor: "host".into(),
        kind: DeviceKind::Cpu,
        threads,
    }];

    all.into_iter()
        .filter(|d| config.device_kind.map_or(true, |kind| kind == d.kind))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_always_present() {
        let devices = enumerate(&Config::default());
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].kind, DeviceKind::Cpu);
        assert!(devices[0].threads >= 1);
    }

    #[test]
    fn test_kind_filter() {
        let config = Config {
            device_kind: Some(DeviceKind::Gpu),
            ..Default::default()
        };
        assert!(enumerate(&config).is_empty());
    }

    #[test]
    fn test_explicit_thread_count() {
        let config = Config {
            worker_threads: 3,
            ..Default::default()
        };
        assert_eq!(enumerate(&config)[0].threads, 3);
    }
}
