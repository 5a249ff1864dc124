//! `[playground]` and `[dev]` section configuration.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `[playground]` section in kcdshop.toml - playground sync settings.
///
/// # Example
/// ```toml
/// [playground]
/// hook_command = ["node", "--no-warnings"]
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct PlaygroundConfig {
    /// Interpreter used for `kcdshop/{pre,post}-set-playground.js` hooks.
    #[serde(default = "defaults::playground::hook_command")]
    #[educe(Default = defaults::playground::hook_command())]
    pub hook_command: Vec<String>,
}

/// `[dev]` section in kcdshop.toml - how app dev servers are spawned.
///
/// # Example
/// ```toml
/// [dev]
/// command = ["pnpm", "dev"]
/// health_timeout_secs = 60
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct DevConfig {
    /// Command run inside the app directory, with `PORT` set.
    #[serde(default = "defaults::dev::command")]
    #[educe(Default = defaults::dev::command())]
    pub command: Vec<String>,

    /// How long to wait for a restarted dev server to accept connections.
    #[serde(default = "defaults::dev::health_timeout_secs")]
    #[educe(Default = defaults::dev::health_timeout_secs())]
    pub health_timeout_secs: u64,
}

impl DevConfig {
    pub const fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}
