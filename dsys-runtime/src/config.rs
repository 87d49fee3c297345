//! Optional TOML configuration layer shared by every `dsys-*` binary, mirroring
//! `Configuration::try_load` in `node/src/config/mod.rs`. Each binary defines its
//! own small `Deserialize` struct of `Option<_>` tuning knobs (retry interval,
//! heartbeat interval, replication fanout...); a value present on the command
//! line always wins over one loaded from file, and an absent file leaves the
//! spec-documented defaults untouched.

use std::path::Path;

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration file: {0}")]
    Load(#[from] config::ConfigError),
}

/// Loads and deserializes a TOML file at `path` into `T`.
pub fn try_load<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let source = config::Config::builder()
        .add_source(config::File::from(path))
        .build()?;
    Ok(source.try_deserialize()?)
}

/// Resolves a tuning value from (in priority order) an explicit CLI flag, a
/// value loaded from the optional config file, and a hardcoded spec default.
pub fn resolve<T>(cli: Option<T>, file: Option<T>, default: T) -> T {
    cli.or(file).unwrap_or(default)
}
