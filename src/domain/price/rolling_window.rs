//! Bounded per-source price history

use std::collections::VecDeque;

/// Default number of prices kept per source
pub const DEFAULT_WINDOW_SIZE: usize = 50;

/// FIFO window of recent prices, oldest first
///
/// Statistics are recomputed over the whole window on every call. The window
/// is small, so this stays cheap and avoids the drift of running sums.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    prices: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    /// `capacity` is clamped to at least 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            prices: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a price, evicting the oldest one when full
    pub fn add_price(&mut self, price: f64) {
        if self.prices.len() >= self.capacity {
            self.prices.pop_front();
        }
        self.prices.push_back(price);
    }

    pub fn mean(&self) -> f64 {
        if self.prices.is_empty() {
            return 0.0;
        }
        self.prices.iter().sum::<f64>() / self.prices.len() as f64
    }

    /// Population standard deviation, 0 with fewer than two samples
    pub fn standard_deviation(&self) -> f64 {
        if self.prices.len() < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .prices
            .iter()
            .map(|p| (p - mean).powi(2))
            .sum::<f64>()
            / self.prices.len() as f64;
        variance.sqrt()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current contents, oldest first
    pub fn prices(&self) -> Vec<f64> {
        self.prices.iter().copied().collect()
    }
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}
