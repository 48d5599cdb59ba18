mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    LogSettings, QueueSettings, ReconnectSettings, Settings, TransportSettings,
};

/// Loads the configuration from `config/default` and `CHATWIRE__*`
/// environment variables, then merges it with default values.
///
/// Nested keys use a double underscore, e.g. `CHATWIRE__TRANSPORT__URL`.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(Environment::with_prefix("CHATWIRE").separator("__"));

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}

#[cfg(test)]
mod tests;
