/// True when `current` sits within `threshold` (strict) of the trailing
/// `lookback`-sample high or low. Always false on a shorter history.
pub fn is_near_support_resistance(
    prices: &[f64],
    current: f64,
    lookback: usize,
    threshold: f64,
) -> bool {
    if lookback == 0 || prices.len() < lookback {
        return false;
    }
    let window = &prices[prices.len() - lookback..];
    let high = window.iter().copied().fold(f64::MIN, f64::max);
    let low = window.iter().copied().fold(f64::MAX, f64::min);
    (current - high).abs() < threshold || (current - low).abs() < threshold
}
