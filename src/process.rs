//! Dev server process management.
//!
//! The engine talks to running app processes only through
//! [`ProcessManager`]; [`LocalProcessManager`] spawns them as tokio child
//! processes keyed by app name.

use crate::{
    config::{DevConfig, check_command_installed},
    log,
    workshop::App,
};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::{net::TcpListener, process::Stdio, time::Duration};
use tokio::{
    io::AsyncWriteExt,
    net::TcpStream,
    process::{Child, Command},
    sync::Mutex,
    time::{Instant, sleep},
};

const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[async_trait]
pub trait ProcessManager: Send + Sync {
    /// Spawn the app's dev server. No-op for statically served apps.
    async fn start(&self, app: &App) -> Result<()>;

    /// Kill the process started for `name`, if any.
    async fn stop(&self, name: &str) -> Result<()>;

    async fn is_running(&self, app: &App) -> bool;

    async fn is_port_free(&self, port: u16) -> bool;

    /// Deliver one message line to a running process.
    async fn send_message(&self, app: &App, message: &str) -> Result<()>;

    /// Wait until the app's dev server accepts connections.
    async fn wait_until_healthy(&self, app: &App) -> Result<()>;
}

/// Spawns dev servers with `[dev].command` in the app directory.
pub struct LocalProcessManager {
    command: Vec<String>,
    health_timeout: Duration,
    children: Mutex<FxHashMap<String, Child>>,
}

impl LocalProcessManager {
    pub fn new(config: &DevConfig) -> Self {
        Self {
            command: config.command.clone(),
            health_timeout: config.health_timeout(),
            children: Mutex::default(),
        }
    }
}

#[async_trait]
impl ProcessManager for LocalProcessManager {
    async fn start(&self, app: &App) -> Result<()> {
        let Some(port) = app.port() else {
            return Ok(());
        };
        if self.is_running(app).await {
            return Ok(());
        }
        if !self.is_port_free(port).await {
            bail!("port {port} for `{}` is already in use", app.name);
        }

        check_command_installed("[dev.command]", &self.command)?;
        let (program, args) = self
            .command
            .split_first()
            .context("[dev.command] is empty")?;

        let child = Command::new(program)
            .args(args)
            .current_dir(&app.full_path)
            .env("PORT", port.to_string())
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start dev server for `{}`", app.name))?;

        log!("dev"; "{} on port {port}", app.name);
        self.children.lock().await.insert(app.name.clone(), child);
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<()> {
        let Some(mut child) = self.children.lock().await.remove(name) else {
            return Ok(());
        };
        child
            .kill()
            .await
            .with_context(|| format!("Failed to stop `{name}`"))?;
        log!("dev"; "stopped {name}");
        Ok(())
    }

    async fn is_running(&self, app: &App) -> bool {
        let mut children = self.children.lock().await;
        let running = children
            .get_mut(&app.name)
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)));
        if !running {
            children.remove(&app.name);
        }
        running
    }

    async fn is_port_free(&self, port: u16) -> bool {
        TcpListener::bind(("127.0.0.1", port)).is_ok()
    }

    async fn send_message(&self, app: &App, message: &str) -> Result<()> {
        let mut children = self.children.lock().await;
        let stdin = children
            .get_mut(&app.name)
            .and_then(|child| child.stdin.as_mut())
            .with_context(|| format!("`{}` is not running", app.name))?;

        stdin.write_all(message.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn wait_until_healthy(&self, app: &App) -> Result<()> {
        let Some(port) = app.port() else {
            return Ok(());
        };

        let deadline = Instant::now() + self.health_timeout;
        while Instant::now() < deadline {
            if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
                return Ok(());
            }
            sleep(HEALTH_POLL_INTERVAL).await;
        }
        bail!(
            "`{}` did not accept connections on port {port} within {}s",
            app.name,
            self.health_timeout.as_secs()
        )
    }
}
