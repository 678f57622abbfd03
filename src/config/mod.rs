mod settings;

use std::path::Path;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{BrokerSettings, LogSettings, ServerSettings, Settings};

/// Environment variable carrying the broker connection string.
pub const BROKER_URL_ENV: &str = "RABBIT_URL";

/// Prefix for all other environment overrides, e.g. `CONFGATE_SERVER__PORT`.
pub const ENV_PREFIX: &str = "CONFGATE";

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
/// Returns a `Settings` struct containing the server, broker and log configurations
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(Path::new("config/default"))
}

/// Like [`load_config`], reading the optional file at `path` (extension may
/// be omitted; toml, yaml and json are recognized).
pub fn load_config_from(path: &Path) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let mut partial: PartialSettings = config.try_deserialize()?;

    if let Some(url) = std::env::var(BROKER_URL_ENV)
        .ok()
        .filter(|u| !u.trim().is_empty())
    {
        partial.broker.get_or_insert_with(Default::default).url = Some(url);
    }

    let settings = Settings::merge(partial);
    settings.validate().map_err(ConfigError::Message)?;
    Ok(settings)
}

#[cfg(test)]
mod tests;
