//! 吞没形态 on a single mid-price series.
//!
//! The last three samples are read as two synthetic (open, close) bars:
//! `o1 = p[-3], c1 = p[-2], o2 = p[-2], c2 = p[-1]`. Because the second bar opens
//! where the first one closes, `o2 == c1` always holds and the strict body
//! comparisons below cannot all be satisfied together. The rule is kept as the
//! strategy has always run it; callers must not expect it to fire on live data.

#[derive(Debug, Clone, Copy, PartialEq)]
struct SyntheticBars {
    o1: f64,
    c1: f64,
    o2: f64,
    c2: f64,
}

fn last_bars(prices: &[f64]) -> Option<SyntheticBars> {
    match prices {
        [.., a, b, c] => Some(SyntheticBars {
            o1: *a,
            c1: *b,
            o2: *b,
            c2: *c,
        }),
        _ => None,
    }
}

pub fn is_bullish_engulfing(prices: &[f64]) -> bool {
    last_bars(prices)
        .map(|b| b.c2 > b.o2 && b.o1 > b.c1 && b.c2 > b.o1 && b.o2 < b.c1)
        .unwrap_or(false)
}

pub fn is_bearish_engulfing(prices: &[f64]) -> bool {
    last_bars(prices)
        .map(|b| b.c2 < b.o2 && b.o1 < b.c1 && b.c2 < b.o1 && b.o2 > b.c1)
        .unwrap_or(false)
}
