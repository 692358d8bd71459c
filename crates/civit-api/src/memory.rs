//! Memory pressure sampling and the adaptive thresholds that react to it.
//!
//! Long crawls keep pages and cached bodies alive; when the host runs short
//! on memory the page size, cache capacity and download batch size shrink,
//! and they grow back once pressure eases. The rules are plain
//! multiply-and-clamp.

use std::sync::Mutex;

use sysinfo::System;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl MemoryUsage {
    pub fn used_ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        let used = self.total_bytes.saturating_sub(self.available_bytes);
        used as f64 / self.total_bytes as f64
    }

    pub fn pressure(&self) -> MemoryPressure {
        MemoryPressure::from_ratio(self.used_ratio())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MemoryPressure {
    Low,
    Moderate,
    High,
    Critical,
}

impl MemoryPressure {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio < 0.70 {
            MemoryPressure::Low
        } else if ratio < 0.85 {
            MemoryPressure::Moderate
        } else if ratio < 0.95 {
            MemoryPressure::High
        } else {
            MemoryPressure::Critical
        }
    }
}

/// Source of memory readings. [`SystemMemory`] reads the host; tests plug in
/// fixed values.
pub trait MemoryProbe: Send + Sync {
    fn usage(&self) -> MemoryUsage;
}

pub struct SystemMemory {
    sys: Mutex<System>,
}

impl SystemMemory {
    pub fn new() -> Self {
        Self { sys: Mutex::new(System::new()) }
    }
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemory {
    fn usage(&self) -> MemoryUsage {
        match self.sys.lock() {
            Ok(mut sys) => {
                sys.refresh_memory();
                MemoryUsage {
                    total_bytes: sys.total_memory(),
                    available_bytes: sys.available_memory(),
                }
            }
            Err(_) => MemoryUsage { total_bytes: 0, available_bytes: 0 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min: usize,
    pub max: usize,
}

impl Bounds {
    pub fn new(min: usize, max: usize) -> Self {
        let min = min.max(1);
        Self { min, max: max.max(min) }
    }

    fn clamp(&self, v: usize) -> usize {
        v.clamp(self.min, self.max)
    }
}

/// Page size, cache capacity and batch size that follow memory pressure.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveThresholds {
    pub page_size: usize,
    pub cache_capacity: usize,
    pub batch_size: usize,
    page_bounds: Bounds,
    cache_bounds: Bounds,
    batch_bounds: Bounds,
}

const GROW: f64 = 1.25;
const SHRINK: f64 = 0.5;

impl AdaptiveThresholds {
    pub fn new(page_size: usize, cache_capacity: usize, batch_size: usize) -> Self {
        Self::with_bounds(
            page_size,
            cache_capacity,
            batch_size,
            Bounds::new(10, 100),
            Bounds::new(16, cache_capacity.max(16)),
            Bounds::new(1, batch_size.max(1)),
        )
    }

    pub fn with_bounds(
        page_size: usize,
        cache_capacity: usize,
        batch_size: usize,
        page_bounds: Bounds,
        cache_bounds: Bounds,
        batch_bounds: Bounds,
    ) -> Self {
        Self {
            page_size: page_bounds.clamp(page_size),
            cache_capacity: cache_bounds.clamp(cache_capacity),
            batch_size: batch_bounds.clamp(batch_size),
            page_bounds,
            cache_bounds,
            batch_bounds,
        }
    }

    /// Apply one adjustment step; returns `true` when any value changed.
    pub fn adjust(&mut self, pressure: MemoryPressure) -> bool {
        let before = (self.page_size, self.cache_capacity, self.batch_size);
        match pressure {
            MemoryPressure::Low => {
                self.page_size = scale(self.page_size, GROW, self.page_bounds);
                self.cache_capacity = scale(self.cache_capacity, GROW, self.cache_bounds);
                self.batch_size = scale(self.batch_size, GROW, self.batch_bounds);
            }
            MemoryPressure::Moderate => {}
            MemoryPressure::High => {
                self.page_size = scale(self.page_size, SHRINK, self.page_bounds);
                self.cache_capacity = scale(self.cache_capacity, SHRINK, self.cache_bounds);
                self.batch_size = scale(self.batch_size, SHRINK, self.batch_bounds);
            }
            MemoryPressure::Critical => {
                self.page_size = self.page_bounds.min;
                self.cache_capacity = self.cache_bounds.min;
                self.batch_size = self.batch_bounds.min;
            }
        }
        before != (self.page_size, self.cache_capacity, self.batch_size)
    }
}

fn scale(value: usize, factor: f64, bounds: Bounds) -> usize {
    let scaled = (value as f64 * factor).round() as usize;
    // Growing by 25% from a small value can round back to itself.
    let scaled = if factor > 1.0 && scaled == value { value + 1 } else { scaled };
    bounds.clamp(scaled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pressure_levels() {
        let u = |avail| MemoryUsage { total_bytes: 100, available_bytes: avail };
        assert_eq!(u(50).pressure(), MemoryPressure::Low);
        assert_eq!(u(20).pressure(), MemoryPressure::Moderate);
        assert_eq!(u(10).pressure(), MemoryPressure::High);
        assert_eq!(u(2).pressure(), MemoryPressure::Critical);
        assert_eq!(MemoryUsage { total_bytes: 0, available_bytes: 0 }.pressure(), MemoryPressure::Low);
    }

    #[test]
    fn high_pressure_halves_within_bounds() {
        let mut t = AdaptiveThresholds::new(100, 256, 4);
        assert!(t.adjust(MemoryPressure::High));
        assert_eq!((t.page_size, t.cache_capacity, t.batch_size), (50, 128, 2));
        t.adjust(MemoryPressure::High);
        t.adjust(MemoryPressure::High);
        t.adjust(MemoryPressure::High);
        assert_eq!(t.page_size, 10);
        assert_eq!(t.cache_capacity, 16);
        assert_eq!(t.batch_size, 1);
    }

    #[test]
    fn low_pressure_grows_back_to_max() {
        let mut t = AdaptiveThresholds::new(100, 256, 4);
        t.adjust(MemoryPressure::Critical);
        assert_eq!((t.page_size, t.cache_capacity, t.batch_size), (10, 16, 1));
        for _ in 0..40 {
            t.adjust(MemoryPressure::Low);
        }
        assert_eq!((t.page_size, t.cache_capacity, t.batch_size), (100, 256, 4));
        assert!(!t.adjust(MemoryPressure::Low));
    }

    #[test]
    fn moderate_is_a_no_op() {
        let mut t = AdaptiveThresholds::new(60, 64, 2);
        assert!(!t.adjust(MemoryPressure::Moderate));
    }

    #[test]
    fn system_probe_reports_something() {
        let u = SystemMemory::new().usage();
        assert!(u.available_bytes <= u.total_bytes);
    }
}
