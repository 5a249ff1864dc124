//! Workshop server configuration for `kcdshop.toml`.
//!
//! # Sections
//!
//! | Section        | Purpose                                         |
//! |----------------|-------------------------------------------------|
//! | `[serve]`      | HTTP server (port, interface, watch)            |
//! | `[cache]`      | TTL / stale-while-revalidate windows            |
//! | `[playground]` | Hook interpreter for playground sync            |
//! | `[dev]`        | Dev server command and health timeout           |
//!
//! The file is optional; every field has a default. Workshop metadata
//! (title, subtitle) lives in the root `package.json` instead, see
//! [`WorkshopMeta`].
//!
//! # Example
//!
//! ```toml
//! [serve]
//! port = 5639
//!
//! [cache]
//! swr_secs = 300
//!
//! [dev]
//! command = ["pnpm", "dev"]
//! ```

mod cache;
pub mod defaults;
mod error;
mod playground;
mod serve;
mod workshop;

pub use cache::CacheConfig;
pub use error::ConfigError;
pub use playground::{DevConfig, PlaygroundConfig};
pub use serve::ServeConfig;
pub use workshop::WorkshopMeta;

use crate::cli::{Cli, Commands};
use anyhow::{Context, Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Root configuration structure representing kcdshop.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Absolute workshop root (set after loading)
    #[serde(skip)]
    pub root: PathBuf,

    /// Absolute path to the config file (set after loading, may not exist)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Workshop server settings
    #[serde(default)]
    pub serve: ServeConfig,

    /// Cache freshness windows
    #[serde(default)]
    pub cache: CacheConfig,

    /// Playground sync settings
    #[serde(default)]
    pub playground: PlaygroundConfig,

    /// Dev server settings
    #[serde(default)]
    pub dev: DevConfig,
}

impl Config {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Resolve the workshop root, read `kcdshop.toml` if present and apply
    /// CLI overrides.
    pub fn load(cli: &Cli) -> Result<Self> {
        let root = resolve_root(cli.root.as_deref())?;
        let config_path = root.join(&cli.config);

        let mut config = if config_path.exists() {
            Self::from_path(&config_path)?
        } else {
            Self::default()
        };

        config.root = root;
        config.config_path = config_path;
        config.update_with_cli(cli);
        config.validate()?;

        Ok(config)
    }

    /// Configuration rooted at `root` with all defaults (used by tests and
    /// embedding callers that don't go through the CLI).
    pub fn for_root(root: &Path) -> Self {
        Self {
            root: normalize_path(root),
            config_path: root.join("kcdshop.toml"),
            ..Self::default()
        }
    }

    /// Update configuration with CLI arguments
    fn update_with_cli(&mut self, cli: &Cli) {
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

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.root.is_dir() {
            bail!(ConfigError::Validation(format!(
                "workshop root `{}` is not a directory",
                self.root.display()
            )));
        }

        if self.playground.hook_command.is_empty() {
            bail!(ConfigError::Validation(
                "[playground.hook_command] must have at least one element".into()
            ));
        }

        if self.dev.command.is_empty() {
            bail!(ConfigError::Validation(
                "[dev.command] must have at least one element".into()
            ));
        }

        Ok(())
    }
}

/// Check if a command is installed and available
pub fn check_command_installed(field: &str, command: &[String]) -> Result<()> {
    let Some(cmd) = command.first() else {
        bail!(ConfigError::Validation(format!(
            "{field} must have at least one element"
        )));
    };
    which::which(cmd).with_context(|| format!("`{cmd}` not found. Please install it first."))?;
    Ok(())
}

/// `--root` / `KCDSHOP_CONTEXT_CWD`, falling back to the working directory.
fn resolve_root(root: Option<&Path>) -> Result<PathBuf> {
    let root = match root {
        Some(path) => {
            let raw = path.to_str().context("workshop root is not valid UTF-8")?;
            PathBuf::from(shellexpand::tilde(raw).into_owned())
        }
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    Ok(normalize_path(&root))
}

/// Normalize a path to absolute, using canonicalize if the path exists
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}
