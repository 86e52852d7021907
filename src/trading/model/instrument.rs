//! Instrument conventions: pip unit and quote precision.
//!
//! JPY-quoted pairs use a different pip unit and precision than everything else.
//! The pip units below are the ones the strategy has always traded with
//! (0.001 for `*_JPY`, 0.01 otherwise) and are used both for sizing and for the
//! trailing-stop pip arithmetic.

pub fn is_jpy_quoted(instrument: &str) -> bool {
    instrument.ends_with("_JPY")
}

pub fn pip_unit(instrument: &str) -> f64 {
    if is_jpy_quoted(instrument) {
        0.001
    } else {
        0.01
    }
}

/// Decimal places accepted by the broker for prices on this instrument
pub fn price_precision(instrument: &str) -> usize {
    if is_jpy_quoted(instrument) {
        3
    } else {
        5
    }
}

pub fn round_price(instrument: &str, price: f64) -> f64 {
    let factor = 10f64.powi(price_precision(instrument) as i32);
    (price * factor).round() / factor
}

pub fn format_price(instrument: &str, price: f64) -> String {
    format!("{:.*}", price_precision(instrument), price)
}
