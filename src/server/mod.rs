pub mod config;
pub mod http;
pub mod telemetry;

pub use config::{ConfigError, DEFAULT_CONFIG_FILE, GatewayConfig};
pub use http::GatewayServer;
pub use telemetry::init_tracing;
