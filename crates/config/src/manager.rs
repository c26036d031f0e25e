//! Configuration manager - main API for config operations

use crate::app_config::LogLevel;
use crate::persistence::ConfigPersistence;
use crate::{Config, ConfigError, ConfigResult};
use directories::ProjectDirs;
use std::path::PathBuf;

/// Main configuration manager
///
/// Owns the location of `config.toml` and delegates reads and writes to the
/// persistence layer.
pub struct ConfigManager {
    persistence: ConfigPersistence,
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Creates a new config manager using the default config directory
    ///
    /// - Linux: `~/.config/storystream/`
    /// - macOS: `~/Library/Application Support/storystream/`
    /// - Windows: `%APPDATA%\storystream\`
    pub fn new() -> ConfigResult<Self> {
        let config_dir = Self::default_config_dir()?;
        Self::with_directory(config_dir)
    }

    /// Creates a config manager with a custom config directory
    pub fn with_directory(config_dir: PathBuf) -> ConfigResult<Self> {
        let config_path = config_dir.join("config.toml");
        let persistence = ConfigPersistence::new(config_path);

        Ok(Self {
            persistence,
            config_dir,
        })
    }

    fn default_config_dir() -> ConfigResult<PathBuf> {
        ProjectDirs::from("", "", "storystream")
            .map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
            .ok_or_else(|| {
                ConfigError::NoConfigDir("no home directory for this user".to_string())
            })
    }

    pub fn config_dir(&self) -> &PathBuf {
        &self.config_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Loads the configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file is corrupted, returns an error.
    pub fn load(&self) -> ConfigResult<Config> {
        self.persistence.load()
    }

    /// Loads the configuration, falling back to defaults on any error
    pub fn load_or_default(&self) -> Config {
        match self.load() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Failed to load config: {}, using defaults", e);
                Config::default()
            }
        }
    }

    pub fn save(&self, config: &Config) -> ConfigResult<()> {
        self.persistence.save(config)
    }

    /// Updates the configuration using a closure
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use storystream_config::ConfigManager;
    /// # let manager = ConfigManager::new().unwrap();
    /// manager.update(|config| {
    ///     config.player.persist_interval_secs = 30;
    /// }).expect("Failed to update config");
    /// ```
    pub fn update<F>(&self, update_fn: F) -> ConfigResult<()>
    where
        F: FnOnce(&mut Config),
    {
        let mut config = self.load()?;
        update_fn(&mut config);
        self.save(&config)
    }

    /// Writes a default config file if one doesn't exist
    ///
    /// Returns Ok(true) if a new file was created, Ok(false) if one already exists.
    pub fn initialize(&self) -> ConfigResult<bool> {
        if self.config_path().exists() {
            log::info!(
                "Config file already exists at {}",
                self.config_path().display()
            );
            return Ok(false);
        }

        self.save(&Config::default())?;
        Ok(true)
    }

    pub fn reset(&self) -> ConfigResult<()> {
        self.save(&Config::default())
    }

    /// Returns all validation errors found in the file on disk
    pub fn validate(&self) -> ConfigResult<Vec<String>> {
        let config = self.load()?;

        match config.validate() {
            Ok(()) => Ok(Vec::new()),
            Err(errors) => Ok(errors.iter().map(|e| e.to_string()).collect()),
        }
    }

    /// Loads the file and applies `STORYSTREAM_SECTION_FIELD` overrides
    ///
    /// Example: `STORYSTREAM_PLAYER_PERSIST_INTERVAL_SECS=30`
    pub fn load_with_env_overrides(&self) -> ConfigResult<Config> {
        let mut config = self.load()?;
        apply_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }
}

/// Applies overrides from `lookup`. Unparsable values are logged and skipped.
fn apply_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    fn parsed<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
        let raw = raw?;
        match raw.trim().parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("Ignoring {}: cannot parse '{}'", key, raw);
                None
            }
        }
    }

    const VOLUME: &str = "STORYSTREAM_PLAYER_DEFAULT_VOLUME";
    const SPEED: &str = "STORYSTREAM_PLAYER_DEFAULT_SPEED";
    const INTERVAL: &str = "STORYSTREAM_PLAYER_PERSIST_INTERVAL_SECS";
    const LOG_LEVEL: &str = "STORYSTREAM_APP_LOG_LEVEL";
    const DB_PATH: &str = "STORYSTREAM_APP_DATABASE_PATH";

    if let Some(v) = parsed::<u8>(VOLUME, lookup(VOLUME)) {
        config.player.default_volume = v;
    }

    if let Some(s) = parsed::<f32>(SPEED, lookup(SPEED)) {
        config.player.default_speed = s;
    }

    if let Some(secs) = parsed::<u64>(INTERVAL, lookup(INTERVAL)) {
        config.player.persist_interval_secs = secs;
    }

    if let Some(level) = parsed::<LogLevel>(LOG_LEVEL, lookup(LOG_LEVEL)) {
        config.app.log_level = level;
    }

    if let Some(db_path) = lookup(DB_PATH) {
        config.app.database_path = PathBuf::from(db_path);
    }

    if let Err(errors) = config.validate() {
        log::warn!(
            "Config validation warnings after env overrides: {:?}",
            errors
        );
    }
}
