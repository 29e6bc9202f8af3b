//! Wiki configuration management for `linewiki.toml`.
//!
//! # Sections
//!
//! | Section     | Purpose                                         |
//! |-------------|-------------------------------------------------|
//! | `[base]`    | Wiki metadata (title)                           |
//! | `[render]`  | Page extensions, path mode, escaping, shell     |
//! | `[serve]`   | Server (port, interface, watch, edits, layout)  |
//!
//! The config file is optional: a directory without one is served with
//! the defaults.
//!
//! # Example
//!
//! ```toml
//! [base]
//! title = "notes"
//!
//! [render]
//! extensions = ["txt", "md"]
//! strip_extension = true
//!
//! [serve]
//! port = 8080
//! rebuild = "sync"
//! ```

mod base;
pub mod defaults;
mod error;
mod render;
mod serve;

pub use render::RenderConfig;
pub use serve::{RebuildMode, ServeConfig};

use base::BaseConfig;
use error::ConfigError;

use crate::cli::{Cli, Commands};
use anyhow::{Context, Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing linewiki.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct WikiConfig {
    /// Absolute path to the wiki root (set after loading)
    #[serde(skip)]
    #[educe(Default = PathBuf::from("./"))]
    pub root: PathBuf,

    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Basic wiki information
    #[serde(default)]
    pub base: BaseConfig,

    /// Page rendering settings
    #[serde(default)]
    pub render: RenderConfig,

    /// Server settings
    #[serde(default)]
    pub serve: ServeConfig,
}

impl WikiConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: WikiConfig = toml::from_str(content).map_err(ConfigError::Toml)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Resolve root and config file from the CLI, read the file when it
    /// exists, apply CLI overrides and validate.
    pub fn load(cli: &Cli) -> Result<Self> {
        let root = cli.root.as_deref().unwrap_or(Path::new("./"));
        let root = Self::normalize_path(&expand_tilde(root));
        let config_path = root.join(&cli.config);

        let mut config = if config_path.is_file() {
            Self::from_path(&config_path)?
        } else {
            Self::default()
        };
        config.config_path = config_path;
        config.update_with_cli(cli, &root);
        config.validate()?;

        Ok(config)
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &Cli, root: &Path) {
        self.root = root.to_path_buf();
        self.update_path_with_root(root);
        self.render.normalize();

        Self::update_option(&mut self.render.strip_extension, cli.strip_extension.as_ref());

        if let Commands::Serve {
            interface,
            port,
            watch,
        } = &cli.command
        {
            Self::update_option(&mut self.serve.interface, interface.as_ref());
            Self::update_option(&mut self.serve.port, port.as_ref());
            Self::update_option(&mut self.serve.watch, watch.as_ref());
        }
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Resolve optional paths against the root directory
    fn update_path_with_root(&mut self, root: &Path) {
        let resolve = |path: &Path| Self::normalize_path(&root.join(expand_tilde(path)));
        self.serve.layout = self.serve.layout.as_deref().map(resolve);
        self.serve.static_dir = self.serve.static_dir.as_deref().map(resolve);
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            // For non-existent paths, manually make them absolute
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.root.is_dir() {
            bail!(ConfigError::NotADirectory {
                field: "root",
                path: self.root.clone(),
            });
        }

        if self.render.extensions.iter().all(|e| e.is_empty()) {
            bail!(ConfigError::Empty("[render.extensions]"));
        }

        Self::check_command_installed("[render.shell]", &self.render.shell)?;

        if let Some(layout) = &self.serve.layout
            && !layout.is_file()
        {
            bail!(ConfigError::NotAFile {
                field: "[serve.layout]",
                path: layout.clone(),
            });
        }

        if let Some(dir) = &self.serve.static_dir
            && !dir.is_dir()
        {
            bail!(ConfigError::NotADirectory {
                field: "[serve.static_dir]",
                path: dir.clone(),
            });
        }

        Ok(())
    }

    /// Check if a command is installed and available
    fn check_command_installed(field: &'static str, command: &[String]) -> Result<()> {
        let Some(cmd) = command.first() else {
            bail!(ConfigError::Empty(field));
        };

        which::which(cmd)
            .with_context(|| format!("`{cmd}` not found. Please install it first."))?;

        Ok(())
    }
}

/// Expand a leading `~` in a path.
fn expand_tilde(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).into_owned()),
        None => path.to_path_buf(),
    }
}

// ============================================================================
// Tests
// ============================================================================
