use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read config file: {0}")]
    ReadFailed(std::io::Error),
    #[error("could not write config file: {0}")]
    WriteFailed(std::io::Error),
    #[error("could not parse config file: {0}")]
    ParseFailed(toml::de::Error),
    #[error("could not serialize config: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("no config path available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    pub engine: Engine,
    pub storage: Storage,
    /// Absent means alert delivery is disabled and alerts are logged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twilio: Option<Twilio>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Engine {
    /// Seconds between firings of the check loop.
    pub check_interval_seconds: u64,
    /// Seconds between firings of the log-rotation loop.
    pub rotation_interval_seconds: u64,
    /// Cap on concurrently in-flight check pipelines.
    pub max_concurrent_probes: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Storage {
    /// Root for check records (`checks/`) and evaluation logs (`logs/`).
    pub data_dir: path::PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Twilio {
    pub account_sid: String,
    pub auth_token: String,
    pub from_phone: String,
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/upwatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("upwatch/config.toml"))
}

/// Default data root ($XDG_DATA_HOME/upwatch or $HOME/.local/share/...,
/// falling back to the working directory)
fn default_data_dir() -> path::PathBuf {
    if let Ok(data_home) = env::var("XDG_DATA_HOME") {
        path::PathBuf::from(data_home).join("upwatch")
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".local/share/upwatch")
    } else {
        path::PathBuf::from(".upwatch")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: Engine {
                check_interval_seconds: 60,
                rotation_interval_seconds: 60 * 60 * 24,
                max_concurrent_probes: 50,
            },
            storage: Storage { data_dir: default_data_dir() },
            twilio: None,
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        let data_dir = self.storage.data_dir.display();
        let delivery = if self.twilio.is_some() { "twilio" } else { "log-only" };

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Engine")?;
        write_1(f, "Check Interval (s)", &self.engine.check_interval_seconds)?;
        write_1(f, "Rotation Interval (s)", &self.engine.rotation_interval_seconds)?;
        write_1(f, "Max Concurrent Probes", &self.engine.max_concurrent_probes)?;
        write_title_1(f, "Storage")?;
        write_1(f, "Data Directory", &data_dir)?;
        write_title_1(f, "Alerting")?;
        write_1(f, "Delivery", &delivery)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/upwatch/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```rust
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(Error::ReadFailed)?;
            toml::from_str(raw_string.as_str()).map_err(Error::ParseFailed)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self).map_err(Error::SerializeFailed)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::WriteFailed)?;
        }

        std::fs::write(path, config_str).map_err(Error::WriteFailed)
    }
}
