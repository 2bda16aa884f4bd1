pub mod client;
pub mod form;
pub mod lots;

pub use client::MarketClient;
