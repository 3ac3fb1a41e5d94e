//! Rolling-mean smoothing of per-frame metrics.

use std::collections::VecDeque;

use crate::metrics::{Metric, RawMetrics};

pub const DEFAULT_SMOOTH_WINDOW: usize = 5;

/// Bounded FIFO of recent raw values for one metric.
#[derive(Debug, Clone)]
pub struct MetricHistory {
    values: VecDeque<f64>,
    capacity: usize,
}

impl MetricHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `value`, evicting the oldest entry when full, and returns the mean of what is held.
    pub fn push(&mut self, value: f64) -> f64 {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
        self.mean()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// One history per metric. Metrics never share a history.
#[derive(Debug, Clone)]
pub struct Smoother {
    histories: [MetricHistory; 4],
}

impl Smoother {
    pub fn new(window: usize) -> Self {
        Self {
            histories: std::array::from_fn(|_| MetricHistory::new(window)),
        }
    }

    pub fn smooth(&mut self, metric: Metric, raw: f64) -> f64 {
        self.histories[metric.index()].push(raw)
    }

    /// Smooths each metric of `raw` accepted by `include`. Skipped metrics stay at zero.
    pub fn smooth_all(&mut self, raw: &RawMetrics, include: impl Fn(Metric) -> bool) -> RawMetrics {
        let mut smoothed = RawMetrics::default();
        for metric in Metric::ALL {
            if include(metric) {
                smoothed.set(metric, self.smooth(metric, raw.get(metric)));
            }
        }
        smoothed
    }

    pub fn history(&self, metric: Metric) -> &MetricHistory {
        &self.histories[metric.index()]
    }
}

impl Default for Smoother {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTH_WINDOW)
    }
}
