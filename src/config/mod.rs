/// Database configuration, connection management and schema creation
pub mod database;

/// Application settings loaded from a TOML file
pub mod settings;

pub use settings::{AppConfig, SeedingConfig, load_config, load_default_config};
