//! App discovery and caching engine.
//!
//! ```text
//! filesystem ─► classify ─► builders (parallel per dir) ─► catalog ─► exercises
//!                               │                             ▲
//!                               └── per-app cache ◄── staleness tracker ◄── watcher
//!
//! set_playground ─► mirror src → playground ─► touch playground ─┘
//! ```
//!
//! [`Workshop`] owns every cache and collaborator; nothing here is global.

mod app;
mod builders;
mod catalog;
mod classify;
mod error;
mod exercises;
mod paths;
mod playground;

pub use app::{App, AppKind, DevInfo, PLAYGROUND_NAME, TestInfo, compare_apps};
pub use classify::StepKind;
pub use error::{BuildError, NotFound};
pub use exercises::Exercise;
pub use paths::WorkshopPaths;

use crate::{
    cache::{Cache, CacheMetadata, CacheOptions, StalenessTracker},
    compiler::{CompiledMdx, InstructionsCompiler},
    config::Config,
    log,
    process::ProcessManager,
};
use parking_lot::RwLock;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Engine context shared by the CLI, the watcher and the HTTP layer.
pub struct Workshop {
    paths: WorkshopPaths,
    /// Windows for per-app and compiled-instruction entries.
    options: CacheOptions,
    tracker: Arc<StalenessTracker>,
    catalog: Cache<Vec<App>>,
    apps: Cache<App>,
    instructions: Cache<Option<CompiledMdx>>,
    compiler: Arc<dyn InstructionsCompiler>,
    processes: Arc<dyn ProcessManager>,
    hook_command: Vec<String>,
    playground_lock: tokio::sync::Mutex<()>,
    /// App and exercise directories of the last catalog build.
    known_dirs: RwLock<Vec<PathBuf>>,
}

impl Workshop {
    pub fn new(
        config: &Config,
        tracker: Arc<StalenessTracker>,
        compiler: Arc<dyn InstructionsCompiler>,
        processes: Arc<dyn ProcessManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            paths: WorkshopPaths::new(&config.root),
            options: CacheOptions::new(config.cache.ttl(), config.cache.swr()),
            tracker,
            catalog: Cache::new("catalog"),
            apps: Cache::new("apps"),
            instructions: Cache::new("instructions"),
            compiler,
            processes,
            hook_command: config.playground.hook_command.clone(),
            playground_lock: tokio::sync::Mutex::new(()),
            known_dirs: RwLock::default(),
        })
    }

    pub const fn paths(&self) -> &WorkshopPaths {
        &self.paths
    }

    pub const fn tracker(&self) -> &Arc<StalenessTracker> {
        &self.tracker
    }

    pub fn processes(&self) -> &Arc<dyn ProcessManager> {
        &self.processes
    }

    /// Directories the watcher should attribute events to.
    pub fn known_dirs(&self) -> Vec<PathBuf> {
        self.known_dirs.read().clone()
    }

    /// Compile an instructions file, cached per file and invalidated by
    /// touches of its directory. A missing file is `None`; so is a compiler
    /// failure, which is logged.
    pub(crate) async fn compile_file(&self, file: &Path) -> Option<CompiledMdx> {
        let dir = file.parent().unwrap_or(&self.paths.root);
        let compiler = Arc::clone(&self.compiler);
        let path = file.to_path_buf();

        let result = self
            .instructions
            .cached(
                &file.to_string_lossy(),
                self.options,
                |metadata| self.tracker.is_stale(dir, metadata),
                move || async move {
                    Ok(tokio::task::spawn_blocking(move || {
                        if !path.is_file() {
                            return Ok(None);
                        }
                        compiler.compile(&path).map(Some)
                    })
                    .await??)
                },
            )
            .await;

        result.unwrap_or_else(|err| {
            log!("compile"; "{}: {err:#}", file.display());
            None
        })
    }

    /// Staleness of an entry that depends on several directories: stale if
    /// any of them was touched after it, no opinion if none was touched.
    fn is_any_dir_stale(&self, dirs: &[&Path], metadata: Option<&CacheMetadata>) -> Option<bool> {
        dirs.iter()
            .filter_map(|dir| self.tracker.is_stale(dir, metadata))
            .reduce(|a, b| a || b)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use std::fs;

    #[tokio::test]
    async fn test_compile_file_is_cached_until_dir_touched() {
        let fx = fixture();
        let readme = fx.root().join("README.mdx");

        let first = fx.workshop.compile_file(&readme).await.unwrap();
        assert_eq!(first.title.as_deref(), Some("Welcome"));

        fs::write(&readme, "# Changed\n").unwrap();
        let cached = fx.workshop.compile_file(&readme).await.unwrap();
        assert_eq!(cached.title.as_deref(), Some("Welcome"));

        fx.workshop.tracker().record_touched(fx.root());
        let fresh = fx.workshop.compile_file(&readme).await.unwrap();
        assert_eq!(fresh.title.as_deref(), Some("Changed"));
    }

    #[tokio::test]
    async fn test_compile_missing_file_is_none() {
        let fx = fixture();
        assert!(fx.workshop.compile_file(&fx.root().join("NOPE.mdx")).await.is_none());
    }
}
