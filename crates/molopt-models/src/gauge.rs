//! Accelerator memory utilization readings.
//!
//! The cache consults a [`ResourceGauge`] before every load to decide whether
//! memory pressure requires evicting resident models. On hosts without an
//! accelerator the gauge reads `0.0`, so only the slot limit applies.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

/// Reports accelerator memory usage as a fraction of total capacity.
pub trait ResourceGauge: Send + Sync + fmt::Debug {
    /// Current usage in `[0, 1]`. Never fails; unreadable devices report `0.0`.
    fn current_usage(&self) -> f64;

    /// Whether a monitored accelerator is present.
    fn accelerator_available(&self) -> bool;
}

fn clamp_fraction(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Gauge for hosts without a monitored accelerator.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAcceleratorGauge;

impl ResourceGauge for NoAcceleratorGauge {
    fn current_usage(&self) -> f64 {
        0.0
    }

    fn accelerator_available(&self) -> bool {
        false
    }
}

/// Gauge with a manually set reading.
///
/// Used in tests and by operators who want to force pressure-driven eviction.
#[derive(Debug)]
pub struct FixedGauge {
    bits: AtomicU64,
    available: AtomicBool,
}

impl FixedGauge {
    /// Creates a gauge reporting `usage` on an available accelerator.
    #[must_use]
    pub fn new(usage: f64) -> Self {
        Self {
            bits: AtomicU64::new(clamp_fraction(usage).to_bits()),
            available: AtomicBool::new(true),
        }
    }

    /// Changes the reported usage.
    pub fn set(&self, usage: f64) {
        self.bits.store(clamp_fraction(usage).to_bits(), Ordering::SeqCst);
    }

    /// Changes whether an accelerator is reported as present.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl ResourceGauge for FixedGauge {
    fn current_usage(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }

    fn accelerator_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

/// Reads VRAM counters exposed by the kernel DRM driver under
/// `/sys/class/drm/card<N>/device/`.
#[derive(Debug, Clone)]
pub struct SysfsVramGauge {
    used_path: PathBuf,
    total_path: PathBuf,
}

impl SysfsVramGauge {
    /// Gauge for DRM card `card` under the real sysfs root.
    #[must_use]
    pub fn new(card: u32) -> Self {
        Self::with_root(Path::new("/sys/class/drm"), card)
    }

    /// Gauge for DRM card `card` under an alternative root directory.
    #[must_use]
    pub fn with_root(root: &Path, card: u32) -> Self {
        let device = root.join(format!("card{card}")).join("device");
        Self {
            used_path: device.join("mem_info_vram_used"),
            total_path: device.join("mem_info_vram_total"),
        }
    }

    /// Whether both counters exist.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.used_path.is_file() && self.total_path.is_file()
    }

    fn read_counter(path: &Path) -> Option<u64> {
        fs::read_to_string(path).ok()?.trim().parse().ok()
    }

    fn read(&self) -> Option<f64> {
        let used = Self::read_counter(&self.used_path)?;
        let total = Self::read_counter(&self.total_path)?;
        (total > 0).then(|| used as f64 / total as f64)
    }
}

impl ResourceGauge for SysfsVramGauge {
    fn current_usage(&self) -> f64 {
        self.read().map_or(0.0, clamp_fraction)
    }

    fn accelerator_available(&self) -> bool {
        self.is_present()
    }
}

/// Picks the sysfs gauge when card `card` exposes VRAM counters, otherwise a
/// gauge that always reads zero.
#[must_use]
pub fn detect_gauge(card: u32) -> Arc<dyn ResourceGauge> {
    let sysfs = SysfsVramGauge::new(card);
    if sysfs.is_present() {
        debug!(card, "Using sysfs VRAM gauge");
        Arc::new(sysfs)
    } else {
        debug!(card, "No accelerator memory counters found");
        Arc::new(NoAcceleratorGauge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_counters(root: &Path, used: &str, total: &str) {
        let device = root.join("card0").join("device");
        fs::create_dir_all(&device).unwrap();
        fs::write(device.join("mem_info_vram_used"), used).unwrap();
        fs::write(device.join("mem_info_vram_total"), total).unwrap();
    }

    #[test]
    fn test_no_accelerator_reads_zero() {
        let gauge = NoAcceleratorGauge;
        assert!((gauge.current_usage() - 0.0).abs() < f64::EPSILON);
        assert!(!gauge.accelerator_available());
    }

    #[test]
    fn test_fixed_gauge_clamps() {
        let gauge = FixedGauge::new(1.5);
        assert!((gauge.current_usage() - 1.0).abs() < f64::EPSILON);
        gauge.set(-0.2);
        assert!((gauge.current_usage() - 0.0).abs() < f64::EPSILON);
        gauge.set(f64::NAN);
        assert!((gauge.current_usage() - 0.0).abs() < f64::EPSILON);
        gauge.set(0.42);
        assert!((gauge.current_usage() - 0.42).abs() < f64::EPSILON);
        assert!(gauge.accelerator_available());
        gauge.set_available(false);
        assert!(!gauge.accelerator_available());
    }

    #[test]
    fn test_sysfs_gauge_reads_fraction() {
        let temp = TempDir::new().unwrap();
        write_counters(temp.path(), "2048\n", "8192\n");

        let gauge = SysfsVramGauge::with_root(temp.path(), 0);
        assert!(gauge.accelerator_available());
        assert!((gauge.current_usage() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_sysfs_gauge_missing_files_reads_zero() {
        let temp = TempDir::new().unwrap();
        let gauge = SysfsVramGauge::with_root(temp.path(), 3);
        assert!(!gauge.accelerator_available());
        assert!((gauge.current_usage() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sysfs_gauge_garbage_reads_zero() {
        let temp = TempDir::new().unwrap();
        write_counters(temp.path(), "lots", "0");
        let gauge = SysfsVramGauge::with_root(temp.path(), 0);
        assert!((gauge.current_usage() - 0.0).abs() < f64::EPSILON);

        write_counters(temp.path(), "10", "0");
        assert!((gauge.current_usage() - 0.0).abs() < f64::EPSILON);
    }
}
