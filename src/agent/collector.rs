//! Local resource metrics via sysinfo

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sysinfo::{Disks, System};
use tracing::{trace, warn};

use crate::MetricsPayload;

/// Window over which CPU usage is averaged
pub const CPU_SAMPLE_WINDOW: Duration = Duration::from_secs(1);

const MIB: u64 = 1024 * 1024;
const GIB: f64 = (1024 * 1024 * 1024) as f64;

/// Anything that can produce a metrics snapshot
#[async_trait]
pub trait MetricsSource: Send {
    async fn collect(&mut self) -> anyhow::Result<MetricsPayload>;
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn percent(part: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    round_to((part / total * 100.0).clamp(0.0, 100.0), 1)
}

/// Collects metrics of the machine the agent runs on
pub struct SysinfoCollector {
    system: System,
    cpu_window: Duration,
}

impl Default for SysinfoCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            cpu_window: CPU_SAMPLE_WINDOW.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL),
        }
    }

    async fn cpu_percent(&mut self) -> f64 {
        self.system.refresh_cpu_usage();
        tokio::time::sleep(self.cpu_window).await;
        self.system.refresh_cpu_usage();

        let usage = f64::from(self.system.global_cpu_usage());
        if usage.is_finite() {
            round_to(usage.clamp(0.0, 100.0), 1)
        } else {
            0.0
        }
    }

    /// `(used, total)` bytes of the root filesystem, or the largest disk
    ///
    /// Reports zeros when no disk is visible (e.g. inside some containers).
    fn disk_usage() -> (u64, u64) {
        let disks = Disks::new_with_refreshed_list();

        let disk = disks
            .list()
            .iter()
            .find(|disk| disk.mount_point() == Path::new("/"))
            .or_else(|| disks.list().iter().max_by_key(|disk| disk.total_space()));

        match disk {
            Some(disk) => {
                let total = disk.total_space();
                (total.saturating_sub(disk.available_space()), total)
            }
            None => {
                warn!("no mounted disk found, reporting empty disk usage");
                (0, 0)
            }
        }
    }

    fn load_averages() -> [Option<f64>; 3] {
        if cfg!(windows) {
            return [None, None, None];
        }

        let load = System::load_average();
        [load.one, load.five, load.fifteen].map(|value| Some(round_to(value, 2)))
    }
}

#[async_trait]
impl MetricsSource for SysinfoCollector {
    async fn collect(&mut self) -> anyhow::Result<MetricsPayload> {
        let cpu_percent = self.cpu_percent().await;

        self.system.refresh_memory();
        let memory_total = self.system.total_memory();
        let memory_used = self.system.used_memory();

        let (disk_used, disk_total) = Self::disk_usage();
        let [load_avg_1, load_avg_5, load_avg_15] = Self::load_averages();

        let payload = MetricsPayload {
            cpu_percent,
            memory_percent: percent(memory_used as f64, memory_total as f64),
            memory_used_mb: memory_used / MIB,
            memory_total_mb: memory_total / MIB,
            disk_percent: percent(disk_used as f64, disk_total as f64),
            disk_used_gb: round_to(disk_used as f64 / GIB, 2),
            disk_total_gb: round_to(disk_total as f64 / GIB, 2),
            uptime_seconds: System::uptime(),
            load_avg_1,
            load_avg_5,
            load_avg_15,
        };

        trace!("collected {payload:?}");
        Ok(payload)
    }
}
