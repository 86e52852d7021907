pub mod price_stream;

pub use price_stream::{OandaPriceFeed, PriceFeed, StreamSupervisor, TickRouter, TickStream};
