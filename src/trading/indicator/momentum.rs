/// Direction of the short moving average relative to the long one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Momentum {
    Up,
    Down,
    Flat,
}

impl Momentum {
    pub fn is_up(&self) -> bool {
        matches!(self, Momentum::Up)
    }

    pub fn is_down(&self) -> bool {
        matches!(self, Momentum::Down)
    }
}

fn tail_mean(prices: &[f64], n: usize) -> Option<f64> {
    if n == 0 || prices.is_empty() {
        return None;
    }
    let tail = &prices[prices.len().saturating_sub(n)..];
    Some(tail.iter().sum::<f64>() / tail.len() as f64)
}

/// Compares the mean of the last `short` samples with the mean of the last `long`.
pub fn momentum(prices: &[f64], short: usize, long: usize) -> Momentum {
    match (tail_mean(prices, short), tail_mean(prices, long)) {
        (Some(s), Some(l)) if s > l => Momentum::Up,
        (Some(s), Some(l)) if s < l => Momentum::Down,
        _ => Momentum::Flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rising_series_is_up() {
        let prices: Vec<f64> = (0..20).map(|i| 1.0 + i as f64 * 0.001).collect();
        assert_eq!(momentum(&prices, 5, 20), Momentum::Up);
    }

    #[test]
    fn falling_series_is_down() {
        let prices: Vec<f64> = (0..20).map(|i| 1.0 - i as f64 * 0.001).collect();
        assert_eq!(momentum(&prices, 5, 20), Momentum::Down);
    }

    #[test]
    fn flat_series_is_neither() {
        let prices = vec![1.2; 20];
        let m = momentum(&prices, 5, 20);
        assert!(!m.is_up() && !m.is_down());
    }
}
