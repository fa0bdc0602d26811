//! Local telemetry collection using sysinfo and direct /proc and /sys access.

use crate::error::{Result, SyncError};
use crate::metrics::{
    data::*,
    traits::TelemetrySource,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fs;
use std::sync::{Arc, Mutex};
use sysinfo::{Components, Disks, System};

/// Telemetry source reading the machine it runs on.
///
/// sysinfo reads are blocking, so every fetch runs on tokio's blocking pool.
pub struct SystemCollector {
    probe: Arc<Mutex<Probe>>,
}

struct Probe {
    system: System,
    components: Components,
    disks: Disks,
}

impl SystemCollector {
    /// Create a new system collector instance.
    pub fn new() -> Result<Self> {
        let mut system = System::new();
        system.refresh_cpu_all();
        system.refresh_memory();
        let components = Components::new_with_refreshed_list();
        let disks = Disks::new_with_refreshed_list();

        if system.cpus().is_empty() {
            return Err(SyncError::system_error("No CPU information available"));
        }

        Ok(Self {
            probe: Arc::new(Mutex::new(Probe {
                system,
                components,
                disks,
            })),
        })
    }

    /// Run `read` against the probe on the blocking pool.
    async fn with_probe<T, F>(&self, read: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Probe) -> Result<T> + Send + 'static,
    {
        let probe = self.probe.clone();
        tokio::task::spawn_blocking(move || {
            let mut probe = probe
                .lock()
                .map_err(|_| SyncError::system_error("System probe lock poisoned"))?;
            read(&mut probe)
        })
        .await
        .map_err(|e| SyncError::system_error(format!("System probe task failed: {}", e)))?
    }
}

impl Probe {
    // The process table is never read, so it is never refreshed.
    fn refresh_full(&mut self) {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();
        self.components.refresh();
        self.disks.refresh();
    }

    fn refresh_volatile(&mut self) {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.components.refresh();
    }

    /// Collect CPU identity and usage.
    fn cpu_info(&self) -> Result<CpuInfo> {
        let cpus = self.system.cpus();
        let first = cpus
            .first()
            .ok_or_else(|| SyncError::source_unavailable("No CPU information available"))?;

        let cores = cpus.len() as u32;
        let physical_cores = self
            .system
            .physical_core_count()
            .map(|n| n as u32)
            .or_else(read_physical_cores)
            .unwrap_or(cores)
            .min(cores);

        Ok(CpuInfo {
            manufacturer: first.vendor_id().to_string(),
            brand: first.brand().trim().to_string(),
            cores,
            physical_cores,
            // sysinfo reports MHz
            speed: first.frequency() as f64 / 1000.0,
            temperature: self.cpu_temperature(),
            current_load: self.current_load(),
        })
    }

    fn current_load(&self) -> f64 {
        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return 0.0;
        }
        cpus.iter().map(|cpu| cpu.cpu_usage() as f64).sum::<f64>() / cpus.len() as f64
    }

    /// Pick the hottest CPU-looking sensor, falling back to any sensor.
    fn cpu_temperature(&self) -> Option<f64> {
        const CPU_MARKERS: [&str; 6] = ["cpu", "package", "tctl", "tdie", "coretemp", "k10temp"];

        let readings: Vec<(String, f64)> = self
            .components
            .iter()
            .map(|c| (c.label().to_lowercase(), c.temperature() as f64))
            .filter(|(_, t)| t.is_finite() && (0.0..=130.0).contains(t))
            .collect();

        hottest(
            readings
                .iter()
                .filter(|(label, _)| CPU_MARKERS.iter().any(|m| label.contains(m)))
                .map(|(_, t)| *t),
        )
        .or_else(|| hottest(readings.iter().map(|(_, t)| *t)))
    }

    fn memory_info(&self) -> MemoryInfo {
        MemoryInfo {
            total: self.system.total_memory(),
            used: self.system.used_memory(),
            free: self.system.free_memory(),
        }
    }

    /// One entry per device; partitions mounted twice are collapsed.
    fn storage_info(&self) -> Vec<StorageDevice> {
        let mut seen = HashSet::new();
        self.disks
            .iter()
            .filter_map(|disk| {
                let name = disk.name().to_string_lossy().to_string();
                if !seen.insert(name.clone()) {
                    return None;
                }
                Some(StorageDevice {
                    name,
                    kind: format!("{:?}", disk.kind()),
                    size: disk.total_space(),
                })
            })
            .collect()
    }

    fn os_info(&self) -> OsInfo {
        OsInfo {
            platform: std::env::consts::OS.to_string(),
            distro: System::long_os_version()
                .or_else(System::name)
                .unwrap_or_else(|| "unknown".to_string()),
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            release: System::os_version().unwrap_or_else(|| "unknown".to_string()),
            kernel: System::kernel_version().unwrap_or_else(|| "unknown".to_string()),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

fn hottest(readings: impl Iterator<Item = f64>) -> Option<f64> {
    readings.max_by(|a, b| a.total_cmp(b))
}

/// Count distinct (physical id, core id) pairs in /proc/cpuinfo.
///
/// Fallback for hosts where sysinfo cannot report physical cores.
fn read_physical_cores() -> Option<u32> {
    let cpuinfo = fs::read_to_string("/proc/cpuinfo").ok()?;
    let mut pairs = HashSet::new();
    let mut physical_id = "0".to_string();

    for line in cpuinfo.lines() {
        if let Some((key, value)) = line.split_once(':') {
            match key.trim() {
                "physical id" => physical_id = value.trim().to_string(),
                "core id" => {
                    pairs.insert((physical_id.clone(), value.trim().to_string()));
                }
                _ => {}
            }
        }
    }

    if pairs.is_empty() {
        None
    } else {
        Some(pairs.len() as u32)
    }
}

/// Enumerate DRM cards under /sys/class/drm.
fn read_graphics_controllers() -> Vec<GraphicsController> {
    let Ok(entries) = fs::read_dir("/sys/class/drm") else {
        return Vec::new();
    };

    let mut controllers = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        // card0, card1, ... but not connectors like card0-HDMI-A-1
        if !name.starts_with("card") || name.contains('-') {
            continue;
        }

        let device = entry.path().join("device");
        let read = |file: &str| {
            fs::read_to_string(device.join(file))
                .ok()
                .map(|s| s.trim().to_string())
        };

        let Some(vendor_id) = read("vendor") else {
            continue;
        };
        let model = read("device").unwrap_or_else(|| "unknown".to_string());
        let vram = read("mem_info_vram_total")
            .and_then(|v| v.parse::<u64>().ok())
            .map(|bytes| bytes / (1024 * 1024))
            .unwrap_or(0);

        controllers.push(GraphicsController {
            model,
            vendor: pci_vendor_name(&vendor_id),
            vram,
        });
    }
    controllers
}

fn pci_vendor_name(id: &str) -> String {
    match id {
        "0x10de" => "NVIDIA".to_string(),
        "0x1002" => "AMD".to_string(),
        "0x8086" => "Intel".to_string(),
        other => other.to_string(),
    }
}

#[async_trait]
impl TelemetrySource for SystemCollector {
    async fn full_snapshot(&self) -> Result<Snapshot> {
        self.with_probe(|probe| {
            probe.refresh_full();

            Ok(Snapshot {
                cpu: probe.cpu_info()?,
                memory: probe.memory_info(),
                graphics: Arc::new(GraphicsInfo {
                    controllers: read_graphics_controllers(),
                }),
                storage: Arc::new(probe.storage_info()),
                os: Arc::new(probe.os_info()),
            })
        })
        .await
    }

    async fn volatile_snapshot(&self) -> Result<VolatileSnapshot> {
        self.with_probe(|probe| {
            probe.refresh_volatile();

            Ok(VolatileSnapshot {
                cpu: Some(VolatileCpu {
                    temperature: probe.cpu_temperature(),
                    current_load: Some(probe.current_load()),
                }),
                memory: Some(probe.memory_info()),
            })
        })
        .await
    }
}
