//! Volatility measured on mid-price deltas.
//!
//! Not a true-range ATR: the feed only carries bid/ask, so the range of a "bar"
//! is the absolute difference between consecutive mid samples.

fn abs_deltas(prices: &[f64]) -> impl Iterator<Item = f64> + '_ {
    prices.windows(2).map(|w| (w[1] - w[0]).abs())
}

/// Mean absolute delta over the trailing window, `None` below `period` samples.
///
/// The sum always divides by `period`, including the first defined value where
/// only `period - 1` deltas exist.
pub fn atr(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }
    let start = prices.len().saturating_sub(period + 1);
    let sum: f64 = abs_deltas(&prices[start..]).sum();
    Some(sum / period as f64)
}

/// 波动率基线: median of up to `window` most recent absolute deltas.
///
/// With fewer than five deltas there is no meaningful baseline and `atr` is
/// returned unchanged.
pub fn atr_median(prices: &[f64], window: usize, atr: f64) -> f64 {
    let count = prices.len().saturating_sub(1).min(window);
    if count < 5 {
        return atr;
    }
    let start = prices.len() - (count + 1);
    let mut deltas: Vec<f64> = abs_deltas(&prices[start..]).collect();
    median(&mut deltas)
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Volatility regime relative to the median baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolatilityRegime {
    High,
    Normal,
    Low,
}

impl VolatilityRegime {
    pub fn classify(atr: f64, median: f64, high_ratio: f64, low_ratio: f64) -> Self {
        if atr > high_ratio * median {
            VolatilityRegime::High
        } else if atr < low_ratio * median {
            VolatilityRegime::Low
        } else {
            VolatilityRegime::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_below_period() {
        assert_eq!(atr(&[1.0, 1.1, 1.2, 1.3], 5), None);
        assert_eq!(atr(&[], 5), None);
    }

    #[test]
    fn first_value_divides_by_period() {
        // four deltas of 0.1, divided by 5
        let value = atr(&[1.0, 1.1, 1.2, 1.3, 1.4], 5).unwrap();
        assert!((value - 0.08).abs() < 1e-12);
    }

    #[test]
    fn trailing_window_only() {
        let value = atr(&[0.0, 10.0, 10.0, 10.1, 10.2, 10.3, 10.4, 10.5], 5).unwrap();
        assert!((value - 0.1).abs() < 1e-9);
    }

    #[test]
    fn median_falls_back_to_atr_with_few_deltas() {
        assert_eq!(atr_median(&[1.0, 1.1, 1.2, 1.3, 1.4], 20, 0.42), 0.42);
    }

    #[test]
    fn median_of_even_count_averages_middle_pair() {
        // deltas 1,2,3,4,5,6 -> median 3.5
        let prices = [0.0, 1.0, 3.0, 6.0, 10.0, 15.0, 21.0];
        assert_eq!(atr_median(&prices, 20, 0.0), 3.5);
    }

    #[test]
    fn median_limited_to_window() {
        let mut prices = vec![0.0, 100.0];
        let mut p = 100.0;
        for _ in 0..20 {
            p += 0.5;
            prices.push(p);
        }
        assert_eq!(atr_median(&prices, 20, 0.0), 0.5);
    }

    #[test]
    fn regimes() {
        assert_eq!(VolatilityRegime::classify(1.6, 1.0, 1.5, 0.75), VolatilityRegime::High);
        assert_eq!(VolatilityRegime::classify(1.5, 1.0, 1.5, 0.75), VolatilityRegime::Normal);
        assert_eq!(VolatilityRegime::classify(0.7, 1.0, 1.5, 0.75), VolatilityRegime::Low);
    }
}
