pub mod actor;
pub mod client;
pub mod config;
pub mod metrics;
pub mod rpc;
pub mod server;
pub mod wire;

pub use config::{ConfigError, ServerConfig};
pub use server::{start, ServerHandle};
