use serde::Serialize;

/// Point-in-time view of queue accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueMetrics {
    pub capacity: usize,
    pub depth: usize,
    pub submitted: u64,
    pub rejected: u64,
    pub dispatched: u64,
    pub peak_depth: usize,
}

impl QueueMetrics {
    pub fn fill_ratio(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.depth as f64 / self.capacity as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_ratio_is_bounded() {
        let metrics = QueueMetrics {
            capacity: 100,
            depth: 80,
            submitted: 100,
            rejected: 20,
            dispatched: 20,
            peak_depth: 90,
        };
        assert!((metrics.fill_ratio() - 0.8).abs() < f64::EPSILON);
    }
}
