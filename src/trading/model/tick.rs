use chrono::{DateTime, Utc};

/// One bid/ask update from the price feed. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTick {
    pub instrument: String,
    pub bid: f64,
    pub ask: f64,
    pub observed_at: DateTime<Utc>,
}

impl PriceTick {
    pub fn new(instrument: impl Into<String>, bid: f64, ask: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            instrument: instrument.into(),
            bid,
            ask,
            observed_at,
        }
    }

    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

/// Current top-of-book for an instrument, as returned by the pricing endpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    /// Price a position would be closed at: bid for shorts, ask for longs.
    pub fn exit_price(&self, is_long: bool) -> f64 {
        if is_long {
            self.ask
        } else {
            self.bid
        }
    }
}
