//! Rolling-window statistics.
//!
//! One bounded FIFO buffer per metric. Statistics use the sample (n-1)
//! standard deviation. A metric whose standard deviation collapses below
//! [`EPSILON`] always scores `z = 0`, so a flat series can never trigger on
//! its own.

use ops_sentinel_core::config::MIN_WINDOW_SIZE;
use ops_sentinel_core::types::{MetricKind, Metrics};
use ops_sentinel_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Standard deviations below this are treated as zero variance
pub const EPSILON: f64 = 1e-6;

/// Summary statistics of one metric buffer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub n: usize,
    pub mean: f64,
    pub std_dev: f64,
}

/// Fixed-capacity sample buffers keyed by metric
#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    buffers: BTreeMap<MetricKind, VecDeque<f64>>,
}

impl RollingWindow {
    /// Create a window holding `capacity` samples per metric
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity < MIN_WINDOW_SIZE {
            return Err(Error::config(format!(
                "window_size must be >= {}, got {}",
                MIN_WINDOW_SIZE, capacity
            )));
        }
        Ok(Self {
            capacity,
            buffers: MetricKind::ALL
                .into_iter()
                .map(|kind| (kind, VecDeque::with_capacity(capacity)))
                .collect(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append one sample per metric, evicting the oldest when full
    pub fn push(&mut self, metrics: &Metrics) {
        for (kind, value) in metrics.iter() {
            let buf = self.buffers.entry(kind).or_default();
            buf.push_back(value);
            while buf.len() > self.capacity {
                buf.pop_front();
            }
        }
    }

    /// Samples currently held for `key`
    pub fn len(&self, key: MetricKind) -> usize {
        self.buffers.get(&key).map_or(0, VecDeque::len)
    }

    /// True once every metric holds exactly `capacity` samples
    pub fn ready(&self) -> bool {
        MetricKind::ALL
            .into_iter()
            .all(|kind| self.len(kind) == self.capacity)
    }

    /// Mean and sample standard deviation of one metric
    pub fn stats(&self, key: MetricKind) -> Option<WindowStats> {
        let buf = self.buffers.get(&key).filter(|b| !b.is_empty())?;
        let n = buf.len();
        let mean = buf.iter().sum::<f64>() / n as f64;
        let std_dev = if n > 1 {
            let var = buf.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            var.sqrt()
        } else {
            0.0
        };
        Some(WindowStats { n, mean, std_dev })
    }

    /// z-score of `value` against the window for `key`
    pub fn zscore(&self, key: MetricKind, value: f64) -> Option<f64> {
        let stats = self.stats(key)?;
        if stats.std_dev < EPSILON {
            return Some(0.0);
        }
        Some((value - stats.mean) / stats.std_dev.max(EPSILON))
    }

    /// z-scores of every metric that has samples
    pub fn zscores(&self, metrics: &Metrics) -> BTreeMap<MetricKind, f64> {
        metrics
            .iter()
            .filter_map(|(kind, value)| self.zscore(kind, value).map(|z| (kind, z)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(value: f64) -> Metrics {
        Metrics {
            cpu: value,
            mem: value,
            lat_ms: value,
            err: value,
        }
    }

    #[test]
    fn test_rejects_small_window() {
        assert!(RollingWindow::new(4).unwrap_err().is_config());
        assert!(RollingWindow::new(5).is_ok());
    }

    #[test]
    fn test_ready_after_capacity_samples() {
        let mut window = RollingWindow::new(5).unwrap();
        for _ in 0..4 {
            window.push(&flat(1.0));
            assert!(!window.ready());
        }
        window.push(&flat(1.0));
        assert!(window.ready());
    }

    #[test]
    fn test_evicts_oldest() {
        let mut window = RollingWindow::new(5).unwrap();
        for i in 0..8 {
            window.push(&flat(i as f64));
        }
        assert_eq!(window.len(MetricKind::Cpu), 5);
        // holds 3..=7
        assert_eq!(window.stats(MetricKind::Cpu).unwrap().mean, 5.0);
    }

    #[test]
    fn test_sample_std_dev() {
        let mut window = RollingWindow::new(5).unwrap();
        for v in [2.0, 4.0, 4.0, 4.0, 6.0] {
            window.push(&flat(v));
        }
        let stats = window.stats(MetricKind::Mem).unwrap();
        assert_eq!(stats.n, 5);
        assert_eq!(stats.mean, 4.0);
        // sum of squares 8 over n-1 = 4
        assert!((stats.std_dev - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_single_sample_has_zero_std() {
        let mut window = RollingWindow::new(5).unwrap();
        window.push(&flat(3.0));
        let stats = window.stats(MetricKind::Err).unwrap();
        assert_eq!(stats.std_dev, 0.0);
        assert!(RollingWindow::new(5).unwrap().stats(MetricKind::Err).is_none());
    }

    #[test]
    fn test_zero_variance_guard() {
        let mut window = RollingWindow::new(30).unwrap();
        for _ in 0..30 {
            window.push(&flat(50.0));
        }
        assert_eq!(window.zscore(MetricKind::Cpu, 80.0), Some(0.0));
    }

    #[test]
    fn test_zscores_are_signed() {
        let mut window = RollingWindow::new(6).unwrap();
        for v in [9.0, 11.0, 9.0, 11.0, 9.0, 11.0] {
            window.push(&flat(v));
        }
        let std = window.stats(MetricKind::Cpu).unwrap().std_dev;
        let spike = Metrics {
            cpu: 20.0,
            mem: 0.0,
            lat_ms: 10.0,
            err: 10.0,
        };
        let z = window.zscores(&spike);
        assert!((z[&MetricKind::Cpu] - 10.0 / std).abs() < 1e-12);
        assert!(z[&MetricKind::Mem] < 0.0);
        assert_eq!(z[&MetricKind::LatMs], 0.0);
    }
}
