pub mod loader;

pub use loader::{CapitalConfig, ConfigError, EngineConfig, LoggingConfig, load_strategies};
