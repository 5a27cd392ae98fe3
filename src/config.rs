//! Settings read from `resync.toml` in the working root.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::level_filters::LevelFilter;

use crate::{
    error::ConfigSource,
    progress::{LogProgress, NoProgress, ProgressSink},
    ReconcileError,
};

pub const CONFIG_FILE_NAME: &str = "resync.toml";

/// Directory under the working root where resync keeps its own files.
pub const STATE_DIR_NAME: &str = ".resync";

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FileLogLevel {
    #[serde(alias = "none")]
    #[strum(to_string = "off", serialize = "none")]
    Off,
    Error,
    Warn,
    Info,
    Debug,
    #[default]
    Trace,
}

impl FileLogLevel {
    /// `None` means file logging is disabled.
    pub fn level_filter(self) -> Option<LevelFilter> {
        match self {
            FileLogLevel::Off => None,
            FileLogLevel::Error => Some(LevelFilter::ERROR),
            FileLogLevel::Warn => Some(LevelFilter::WARN),
            FileLogLevel::Info => Some(LevelFilter::INFO),
            FileLogLevel::Debug => Some(LevelFilter::DEBUG),
            FileLogLevel::Trace => Some(LevelFilter::TRACE),
        }
    }
}

/// Where reconciliation progress goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStyle {
    #[default]
    Log,
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub file_log_level: FileLogLevel,
    pub progress: ProgressStyle,
}

impl Config {
    /// Loads `resync.toml` from `root`. A missing file gives the defaults.
    pub fn load(root: &Path) -> Result<Self, ReconcileError> {
        let path = root.join(CONFIG_FILE_NAME);

        let contents = match fs_err::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::debug!("No {} in {}, using defaults", CONFIG_FILE_NAME, root.display());
                return Ok(Config::default());
            }
            Err(err) => return Err(config_error(path, err.into())),
        };

        Self::from_toml_str(&contents).map_err(|err| config_error(path, err.into()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn progress_sink(&self) -> Arc<dyn ProgressSink> {
        match self.progress {
            ProgressStyle::Log => Arc::new(LogProgress),
            ProgressStyle::None => NoProgress::shared(),
        }
    }
}

fn config_error(path: PathBuf, source: ConfigSource) -> ReconcileError {
    ReconcileError::Config { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_is_default() {
        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
    }

    #[test]
    fn reads_every_field() {
        let config = Config::from_toml_str(
            r#"
            file_log_level = "warn"
            progress = "none"
            "#,
        )
        .unwrap();

        assert_eq!(
            config,
            Config {
                file_log_level: FileLogLevel::Warn,
                progress: ProgressStyle::None,
            }
        );
    }

    #[test]
    fn none_is_an_alias_for_off() {
        let config = Config::from_toml_str(r#"file_log_level = "none""#).unwrap();
        assert_eq!(config.file_log_level, FileLogLevel::Off);
        assert_eq!(config.file_log_level.level_filter(), None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml_str(r#"colour = "blue""#).is_err());
    }

    #[test]
    fn level_names_parse_case_insensitively() {
        assert_eq!("DEBUG".parse::<FileLogLevel>().unwrap(), FileLogLevel::Debug);
        assert_eq!("None".parse::<FileLogLevel>().unwrap(), FileLogLevel::Off);
        assert!("banana".parse::<FileLogLevel>().is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load(dir.path()).unwrap(), Config::default());
    }

    #[test]
    fn malformed_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(dir.path().join(CONFIG_FILE_NAME), "progress = [").unwrap();

        match Config::load(dir.path()).unwrap_err() {
            ReconcileError::Config { path, source } => {
                assert_eq!(path, dir.path().join(CONFIG_FILE_NAME));
                assert!(matches!(source, ConfigSource::Toml(_)));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
