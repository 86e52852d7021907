pub mod indicator;
pub mod model;
pub mod oanda;
pub mod order;
pub mod risk;
pub mod services;
pub mod strategy;
pub mod task;
