use std::collections::VecDeque;

/// 价格历史: bounded FIFO window of mid-prices for one instrument.
///
/// Owned by the instrument's worker task, never shared.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    capacity: usize,
    prices: VecDeque<f64>,
}

impl PriceHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            prices: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends a mid-price, evicting the oldest sample once full.
    pub fn push(&mut self, mid: f64) {
        if self.prices.len() == self.capacity {
            self.prices.pop_front();
        }
        self.prices.push_back(mid);
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

    pub fn last(&self) -> Option<f64> {
        self.prices.back().copied()
    }

    /// Contiguous oldest-first view for the indicator functions
    pub fn as_slice(&mut self) -> &[f64] {
        self.prices.make_contiguous()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.prices.iter().copied().collect()
    }
}
