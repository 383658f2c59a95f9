use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Default configuration file looked up in the working directory
pub const CONFIG_FILE: &str = "cleanup-warning.toml";

/// Prefix for environment overrides, e.g. `CLEANUP_WARNING__WARNING__INTERVAL=30`
pub const ENV_PREFIX: &str = "CLEANUP_WARNING__";

pub const DEFAULT_INTERVAL_SECS: f64 = 60.0;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WarningConfig {
    /// Seconds to wait between two warning cycles (fractions allowed)
    pub interval: f64,
}

impl Default for WarningConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL_SECS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CommandConfig {
    /// Chat command prefix, used as `!<prefix> <command>`
    pub prefix: String,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            prefix: String::from("cw"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct Configuration {
    /// Warning cycle configuration
    pub warning: WarningConfig,
    /// Chat command configuration
    pub commands: CommandConfig,
}

impl Configuration {
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from_path(Path::new(CONFIG_FILE))
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }
}

/// Live configuration handle shared between the warning cycle and whoever
/// edits or reloads the configuration.
///
/// Readers always get a full copy; a replaced configuration is picked up by
/// the next reader, never by one already holding a copy.
#[derive(Clone, Debug, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<Configuration>>,
}

impl SharedConfig {
    pub fn new(config: Configuration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub fn get(&self) -> Configuration {
        self.inner.read().clone()
    }

    pub fn interval(&self) -> f64 {
        self.inner.read().warning.interval
    }

    pub fn set_interval(&self, interval: f64) {
        self.inner.write().warning.interval = interval;
    }

    pub fn replace(&self, config: Configuration) {
        *self.inner.write() = config;
    }

    /// Re-read the configuration from `path` and swap it in.
    /// The current configuration is kept when loading fails.
    pub fn reload_from(&self, path: &Path) -> Result<(), Box<figment::Error>> {
        let config = Configuration::load_from_path(path)?;
        self.replace(config);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_configuration() {
        let config = Configuration::default();

        assert_eq!(config.warning.interval, 60.0);
        assert_eq!(config.commands.prefix, "cw");
    }

    #[test]
    fn test_configless_operation() {
        Jail::expect_with(|_jail| {
            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config, Configuration::default());
            Ok(())
        });
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                [warning]
                interval = 2.5
                "#,
            )?;

            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.warning.interval, 2.5);
            // Untouched sections keep their defaults
            assert_eq!(config.commands.prefix, "cw");
            Ok(())
        });
    }

    #[test]
    fn test_env_var_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
                [warning]
                interval = 10.0
                "#,
            )?;
            jail.set_env("CLEANUP_WARNING__WARNING__INTERVAL", "0.5");
            jail.set_env("CLEANUP_WARNING__COMMANDS__PREFIX", "cleanup");

            let config = Configuration::load_from_path(Path::new("custom.toml")).map_err(|e| *e)?;
            assert_eq!(config.warning.interval, 0.5);
            assert_eq!(config.commands.prefix, "cleanup");
            Ok(())
        });
    }

    #[test]
    fn test_shared_config_reload_keeps_previous_on_error() {
        Jail::expect_with(|jail| {
            let shared = SharedConfig::new(Configuration::default());
            shared.set_interval(5.0);
            assert_eq!(shared.interval(), 5.0);

            jail.create_file(CONFIG_FILE, "[warning]\ninterval = \"soon\"\n")?;
            assert!(shared.reload_from(Path::new(CONFIG_FILE)).is_err());
            assert_eq!(shared.interval(), 5.0);

            jail.create_file(CONFIG_FILE, "[warning]\ninterval = 7.0\n")?;
            shared.reload_from(Path::new(CONFIG_FILE)).map_err(|e| *e)?;
            assert_eq!(shared.interval(), 7.0);
            Ok(())
        });
    }
}
