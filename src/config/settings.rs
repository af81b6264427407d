//! Application settings loaded from a TOML file.
//!
//! The file is optional: when it is absent every section falls back to its defaults.
//! `SALES_CONFIG` overrides the default `config.toml` location.

use crate::core::seed::SeedPlan;
use crate::core::verify::VerifierThresholds;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

/// Configuration structure representing the entire settings file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// How the fact store is populated
    pub seeding: SeedingConfig,
    /// Tolerances used by the consistency verifier
    pub verification: VerifierThresholds,
}

/// `[seeding]` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeedingConfig {
    /// Wipe existing facts and seed again even if data is present
    pub regenerate: bool,
    /// Size and shape of the synthetic workload
    #[serde(flatten)]
    pub plan: SeedPlan,
}

/// Loads settings from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid or a field has the wrong type
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse {}: {e}", path_ref.display()),
    })
}

/// Loads settings from `SALES_CONFIG` (default `./config.toml`), or defaults if the file is absent.
pub fn load_default_config() -> Result<AppConfig> {
    let path = std::env::var("SALES_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    if Path::new(&path).exists() {
        load_config(&path)
    } else {
        info!("No settings file at {}, using defaults.", path);
        Ok(AppConfig::default())
    }
}
