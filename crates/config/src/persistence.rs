//! Reading and writing the config file
//!
//! Writes go to a temp file in the same directory and are renamed into place,
//! so a crash mid-save never leaves a truncated config behind.

use crate::{Config, ConfigError, ConfigResult, FileAction, CONFIG_VERSION};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub struct ConfigPersistence {
    config_path: PathBuf,
}

impl ConfigPersistence {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Loads configuration from file
    ///
    /// A missing file yields defaults. An empty or unparsable file is an error.
    /// Out-of-range values only produce a warning so the user can fix them by hand.
    pub fn load(&self) -> ConfigResult<Config> {
        if !self.config_path.exists() {
            log::info!(
                "Config file not found at {}, using defaults",
                self.config_path.display()
            );
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(&self.config_path)
            .map_err(|e| ConfigError::io(FileAction::Read, &self.config_path, e))?;

        if contents.trim().is_empty() {
            return Err(ConfigError::io(
                FileAction::Read,
                &self.config_path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, "config file is empty"),
            ));
        }

        let mut config: Config = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: self.config_path.clone(),
            source: e,
        })?;

        if config.version != CONFIG_VERSION {
            log::info!(
                "Config version {} differs from current version {}, rewriting",
                config.version,
                CONFIG_VERSION
            );
            config.version = CONFIG_VERSION;
        }

        if let Err(errors) = config.validate() {
            let error_msg = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            log::warn!("Config validation warnings: {}", error_msg);
        }

        Ok(config)
    }

    /// Validates, backs up the previous file, and writes atomically
    pub fn save(&self, config: &Config) -> ConfigResult<()> {
        config.validate().map_err(ConfigError::Invalid)?;

        if let Some(parent) = self.config_path.parent() {
            self.ensure_directory_exists(parent)?;
        }

        if self.config_path.exists() {
            self.backup_config()?;
        }

        let toml_string = toml::to_string_pretty(config)?;

        let temp_file = self.create_temp_file()?;
        self.write_atomic(temp_file, &toml_string)?;

        log::info!("Config saved to {}", self.config_path.display());
        Ok(())
    }

    fn ensure_directory_exists(&self, path: &Path) -> ConfigResult<()> {
        if !path.as_os_str().is_empty() && !path.exists() {
            fs::create_dir_all(path)
                .map_err(|e| ConfigError::io(FileAction::CreateDirectory, path, e))?;
            log::info!("Created config directory: {}", path.display());
        }
        Ok(())
    }

    fn backup_config(&self) -> ConfigResult<()> {
        let backup_path = self.config_path.with_extension("toml.backup");
        fs::copy(&self.config_path, &backup_path)
            .map_err(|e| ConfigError::io(FileAction::Backup, &self.config_path, e))?;
        log::debug!("Backed up config to {}", backup_path.display());
        Ok(())
    }

    fn create_temp_file(&self) -> ConfigResult<NamedTempFile> {
        let dir = self
            .config_path
            .parent()
            .ok_or_else(|| {
                ConfigError::NoConfigDir(format!("{} has no parent", self.config_path.display()))
            })?;

        NamedTempFile::new_in(dir).map_err(|e| ConfigError::io(FileAction::Write, dir, e))
    }

    fn write_atomic(&self, mut temp_file: NamedTempFile, content: &str) -> ConfigResult<()> {
        let written = temp_file
            .write_all(content.as_bytes())
            .and_then(|()| temp_file.flush());
        if let Err(e) = written {
            return Err(ConfigError::io(FileAction::Write, temp_file.path(), e));
        }

        temp_file
            .persist(&self.config_path)
            .map_err(|e| ConfigError::io(FileAction::Write, &self.config_path, e.error))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_dir() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config.toml");
        (temp_dir, config_path)
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let (_temp_dir, config_path) = setup_test_dir();
        let persistence = ConfigPersistence::new(config_path);

        let config = persistence.load().expect("Should load default config");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let (_temp_dir, config_path) = setup_test_dir();
        let persistence = ConfigPersistence::new(config_path);

        let mut config = Config::default();
        config.player.persist_interval_secs = 42;

        persistence.save(&config).expect("Should save config");
        let loaded = persistence.load().expect("Should load config");

        assert_eq!(loaded.player.persist_interval_secs, 42);
    }

    #[test]
    fn test_save_creates_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("subdir").join("config.toml");
        let persistence = ConfigPersistence::new(config_path.clone());

        persistence
            .save(&Config::default())
            .expect("Should create directory and save");

        assert!(config_path.exists());
    }

    #[test]
    fn test_backup_created_on_overwrite() {
        let (_temp_dir, config_path) = setup_test_dir();
        let persistence = ConfigPersistence::new(config_path.clone());

        let config = Config::default();
        persistence.save(&config).expect("Should save config");
        persistence.save(&config).expect("Should save config again");

        assert!(config_path.with_extension("toml.backup").exists());
    }

    #[test]
    fn test_empty_file_is_an_error() {
        let (_temp_dir, config_path) = setup_test_dir();
        fs::write(&config_path, "   \n").expect("Should write file");

        let result = ConfigPersistence::new(config_path).load();
        assert!(matches!(
            result,
            Err(ConfigError::Io {
                action: FileAction::Read,
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        let (_temp_dir, config_path) = setup_test_dir();
        fs::write(&config_path, "this is not valid TOML {{{").expect("Should write file");

        let result = ConfigPersistence::new(config_path).load();
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let (_temp_dir, config_path) = setup_test_dir();
        fs::write(&config_path, "[player]\nposition_tick_ms = 250\n").expect("Should write file");

        let config = ConfigPersistence::new(config_path).load().expect("Should load");
        assert_eq!(config.player.position_tick_ms, 250);
        assert_eq!(config.player.persist_interval_secs, 10);
        assert_eq!(config.version, CONFIG_VERSION);
    }

    #[test]
    fn test_validate_before_save() {
        let (_temp_dir, config_path) = setup_test_dir();
        let persistence = ConfigPersistence::new(config_path);

        let mut config = Config::default();
        config.player.default_volume = 150;

        assert!(matches!(
            persistence.save(&config),
            Err(ConfigError::Invalid(_))
        ));
    }
}
