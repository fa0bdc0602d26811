//! Data structures for telemetry snapshots.
//!
//! A [`Snapshot`] is the complete hardware/software inventory returned by a
//! full fetch. A [`VolatileSnapshot`] carries only the fields that change
//! between polls: CPU temperature, CPU load and memory usage.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A complete inventory of the monitored machine.
///
/// Sections that never change between full fetches are reference counted so
/// that deriving a new snapshot from a partial update only copies the
/// volatile subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// CPU identity and live usage
    pub cpu: CpuInfo,
    /// Memory usage
    pub memory: MemoryInfo,
    /// Graphics adapters
    pub graphics: Arc<GraphicsInfo>,
    /// Block devices
    pub storage: Arc<Vec<StorageDevice>>,
    /// Operating system identity
    pub os: Arc<OsInfo>,
}

/// CPU information and usage statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuInfo {
    /// Vendor, e.g. "GenuineIntel"
    pub manufacturer: String,
    /// Marketing name of the part
    pub brand: String,
    /// Logical core count
    pub cores: u32,
    /// Physical core count
    pub physical_cores: u32,
    /// Clock speed in GHz
    pub speed: f64,
    /// Package temperature in Celsius, when a sensor is available
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Average load across all cores (0.0 to 100.0)
    pub current_load: f64,
}

/// Memory usage in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryInfo {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

/// Graphics adapters known to the system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphicsInfo {
    pub controllers: Vec<GraphicsController>,
}

/// A single graphics adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphicsController {
    pub model: String,
    pub vendor: String,
    /// Video memory in MiB
    pub vram: u64,
}

/// A block storage device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageDevice {
    /// Device name (e.g. "nvme0n1")
    pub name: String,
    /// Device kind (e.g. "SSD", "HDD")
    #[serde(rename = "type")]
    pub kind: String,
    /// Capacity in bytes
    pub size: u64,
}

/// Operating system identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OsInfo {
    pub platform: String,
    pub distro: String,
    pub hostname: String,
    pub release: String,
    pub kernel: String,
    pub arch: String,
}

/// The volatile subset returned by a partial fetch.
///
/// Any field may be absent; absent fields leave the current value untouched
/// when merged. Unknown keys are rejected during decoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolatileSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<VolatileCpu>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryInfo>,
}

/// Volatile CPU readings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VolatileCpu {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_load: Option<f64>,
}

impl VolatileSnapshot {
    /// Whether this partial carries no volatile field at all.
    pub fn is_empty(&self) -> bool {
        let cpu_empty = self
            .cpu
            .map_or(true, |cpu| cpu.temperature.is_none() && cpu.current_load.is_none());
        cpu_empty && self.memory.is_none()
    }

    /// Extract the volatile subset of a full snapshot.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            cpu: Some(VolatileCpu {
                temperature: snapshot.cpu.temperature,
                current_load: Some(snapshot.cpu.current_load),
            }),
            memory: Some(snapshot.memory),
        }
    }
}

impl Default for CpuInfo {
    fn default() -> Self {
        Self {
            manufacturer: String::new(),
            brand: String::new(),
            cores: 0,
            physical_cores: 0,
            speed: 0.0,
            temperature: None,
            current_load: 0.0,
        }
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            cpu: CpuInfo::default(),
            memory: MemoryInfo::default(),
            graphics: Arc::new(GraphicsInfo::default()),
            storage: Arc::new(Vec::new()),
            os: Arc::new(OsInfo::default()),
        }
    }
}
