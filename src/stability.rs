//! Debouncing of per-metric "is bad" observations.
//!
//! A metric trips only once its window is full and every slot in it is bad.
//! With a window of one this degrades to immediate thresholding.

use std::collections::VecDeque;

use crate::metrics::Metric;

pub const DEFAULT_STABLE_LEN: usize = 3;

#[derive(Debug, Clone)]
pub struct StabilityHistory {
    flags: VecDeque<bool>,
    capacity: usize,
}

impl StabilityHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            flags: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Records one observation and returns whether the metric is persistently bad.
    pub fn observe(&mut self, is_bad: bool) -> bool {
        if self.flags.len() == self.capacity {
            self.flags.pop_front();
        }
        self.flags.push_back(is_bad);
        self.is_tripped()
    }

    pub fn is_tripped(&self) -> bool {
        self.flags.len() == self.capacity && self.flags.iter().all(|&bad| bad)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct StabilityGate {
    histories: [StabilityHistory; 4],
}

impl StabilityGate {
    pub fn new(window: usize) -> Self {
        Self {
            histories: std::array::from_fn(|_| StabilityHistory::new(window)),
        }
    }

    pub fn observe(&mut self, metric: Metric, is_bad: bool) -> bool {
        self.histories[metric.index()].observe(is_bad)
    }

    pub fn history(&self, metric: Metric) -> &StabilityHistory {
        &self.histories[metric.index()]
    }
}

impl Default for StabilityGate {
    fn default() -> Self {
        Self::new(DEFAULT_STABLE_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(history: &mut StabilityHistory, flags: &[bool]) -> bool {
        flags.iter().fold(false, |_, &f| history.observe(f))
    }

    #[test]
    fn three_bad_trips() {
        let mut h = StabilityHistory::new(3);
        assert!(feed(&mut h, &[true, true, true]));
    }

    #[test]
    fn trailing_good_does_not_trip() {
        let mut h = StabilityHistory::new(3);
        assert!(!feed(&mut h, &[true, true, false]));
    }

    #[test]
    fn leading_good_is_evicted() {
        let mut h = StabilityHistory::new(3);
        assert!(feed(&mut h, &[false, true, true, true]));
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn partial_window_never_trips() {
        let mut h = StabilityHistory::new(3);
        assert!(!h.observe(true));
        assert!(!h.observe(true));
    }

    #[test]
    fn window_of_one_is_immediate() {
        let mut h = StabilityHistory::new(1);
        assert!(h.observe(true));
        assert!(!h.observe(false));
        assert!(h.observe(true));
    }

    #[test]
    fn gate_keeps_metrics_apart() {
        let mut gate = StabilityGate::default();
        for _ in 0..3 {
            gate.observe(Metric::HeadAngle, true);
            gate.observe(Metric::SideTwist, false);
        }
        assert!(gate.history(Metric::HeadAngle).is_tripped());
        assert!(!gate.history(Metric::SideTwist).is_tripped());
        assert!(gate.history(Metric::ForwardLean).is_empty());
    }
}
