//! Runtime configuration.
//!
//! Resolution order: built-in defaults, then the TOML config file, then
//! command line flags.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cli::{GlobalArgs, ServeArgs};
use crate::error::{Error, Result};

const APP_NAME: &str = "storewatch";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory tree to scan.
    pub root: PathBuf,
    /// SQLite file holding the snapshots.
    pub database: PathBuf,
    /// Bind address of the HTTP API.
    pub listen: String,
    /// Local hour of the daily scan.
    pub scan_hour: u32,
    pub follow_symlinks: bool,
    pub max_depth: Option<usize>,
    pub scan_on_startup: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            root: PathBuf::from("/data"),
            database: default_database_path(),
            listen: "0.0.0.0:8080".to_string(),
            scan_hour: 2,
            follow_symlinks: false,
            max_depth: None,
            scan_on_startup: false,
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reads `path`, or the default config file when `path` is `None`.
    /// A missing default file is not an error, a missing explicit one is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (Some(p.to_path_buf()), true),
            None => (default_config_path(), false),
        };

        let Some(path) = path else {
            return Ok(Config::default());
        };

        match std::fs::read_to_string(&path) {
            Ok(content) => Config::from_toml(&content),
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(Error::Config(format!("cannot read {}: {e}", path.display()))),
        }
    }

    /// Loads the config file named by the flags and applies the flag overrides.
    pub fn from_args(args: &GlobalArgs) -> Result<Self> {
        let mut config = Config::load(args.config.as_deref())?;
        config.apply_global(args);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_global(&mut self, args: &GlobalArgs) {
        if let Some(root) = &args.root {
            self.root = root.clone();
        }
        if let Some(database) = &args.database {
            self.database = database.clone();
        }
        if args.follow_symlinks {
            self.follow_symlinks = true;
        }
        if args.max_depth.is_some() {
            self.max_depth = args.max_depth;
        }
    }

    pub fn apply_serve(&mut self, args: &ServeArgs) {
        if let Some(listen) = &args.listen {
            self.listen = listen.clone();
        }
        if let Some(hour) = args.scan_hour {
            self.scan_hour = hour;
        }
        if args.scan_on_startup {
            self.scan_on_startup = true;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.scan_hour > 23 {
            return Err(Error::Config(format!(
                "scan_hour must be between 0 and 23, got {}",
                self.scan_hour
            )));
        }
        if self.root.as_os_str().is_empty() {
            return Err(Error::Config("root must not be empty".to_string()));
        }
        if self.max_depth == Some(0) {
            return Err(Error::Config("max_depth must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

/// config.toml under the platform config directory (~/.config/storewatch on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// storewatch.db under the platform data directory, or the working directory
/// when no home directory can be determined.
pub fn default_database_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("storewatch.db"))
        .unwrap_or_else(|| PathBuf::from("storewatch.db"))
}
