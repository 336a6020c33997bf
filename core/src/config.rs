//! Handles configuration of the graph builder, selector, driver and
//! canonizer: parsing the `ForeverJukebox.toml` file and environment
//! variable overrides.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use std::path::PathBuf;

use crate::canonizer::CanonizerConfig;
use crate::driver::DriverConfig;
use crate::errors::ConfigResult;
use crate::graph::GraphConfig;
use crate::selector::SelectorConfig;

pub static DEFAULT_CONFIG: &str = include_str!("../ForeverJukebox.toml");

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub selector: SelectorConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub canonizer: CanonizerConfig,
}

impl Settings {
    /// Load settings from a config file plus `FOREVER_JUKEBOX_`-prefixed
    /// environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is missing or malformed.
    #[inline]
    pub fn init(config: PathBuf) -> ConfigResult<Self> {
        let s = Config::builder()
            .add_source(File::from(config))
            .add_source(Environment::with_prefix("FOREVER_JUKEBOX").separator("__"))
            .build()?;

        Ok(s.try_deserialize()?)
    }

    /// Gets the (default) path to the config file, creating it with the
    /// embedded default config if it doesn't already exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory could not be found or
    /// created, or if the default config file could not be written.
    #[inline]
    pub fn get_config_path() -> ConfigResult<PathBuf> {
        let config_dir = crate::get_config_dir()?;
        if !config_dir.exists() {
            std::fs::create_dir_all(&config_dir)?;
        }
        let config_file = config_dir.join("ForeverJukebox.toml");
        if !config_file.exists() {
            std::fs::write(&config_file, DEFAULT_CONFIG)?;
        }
        Ok(config_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    fn default_config_file_parses_to_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, DEFAULT_CONFIG).unwrap();

        let settings = Settings::init(config_path).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[rstest]
    fn overrides_apply_on_top_of_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[graph]
max_branches = 6
current_threshold = 70.0

[selector]
min_random_branch_chance = 0.1
"#,
        )
        .unwrap();

        let settings = Settings::init(config_path).unwrap();
        assert_eq!(settings.graph.max_branches, 6);
        assert_eq!(settings.graph.current_threshold, 70.0);
        assert_eq!(settings.selector.min_random_branch_chance, 0.1);
        assert_eq!(
            settings.driver.tick_interval_ms,
            DriverConfig::default().tick_interval_ms
        );
    }
}
