pub mod api_trait;
pub mod dto;
pub mod oanda_client;

pub use api_trait::BrokerApi;
pub use oanda_client::OandaClient;
