pub mod api;
pub mod config;
pub mod error;

pub use config::GatewayConfig;
pub use error::GatewayError;
