//! Configuration for the standalone proxy binary.

mod loader;
mod types;

pub use loader::{load_config, load_config_from_str};
pub use types::{
    AuditConfig, Config, CredentialsConfig, LoggingConfig, ServerConfig, SessionConfig,
    TargetConfig,
};
