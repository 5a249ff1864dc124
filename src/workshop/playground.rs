//! Playground sync: mirror an app directory into `playground/`.
//!
//! ```text
//! lock ─► suspend watch ─► was_running? ─► [reset] ─► pre hook
//!      ─► rm node_modules ─► copy (skip identical) ─► prune orphans
//!      ─► write pointer ─► post hook ─► notify | restart
//!      ─► resume watch + touch playground
//! ```
//!
//! Writing the pointer is the commit point: a failure after it leaves the
//! playground pointing at the new app. Calling again mirrors from scratch.

use super::{NotFound, PLAYGROUND_NAME, Workshop};
use crate::{
    config::check_command_installed,
    exec, log,
    utils::{exec::NODE_FILTER, git::GitIgnore},
};
use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::{
    ffi::OsString,
    fs,
    io,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use walkdir::WalkDir;

const PRE_HOOK: &str = "kcdshop/pre-set-playground.js";
const POST_HOOK: &str = "kcdshop/post-set-playground.js";

/// Build output, never copied nor pruned.
const BUILD_OUTPUT: [&str; 2] = ["build", ".cache"];
/// Copied even when git-ignored.
const ALWAYS_COPY: [&str; 2] = ["node_modules", ".env"];

/// What one sync did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub copied: usize,
    /// Files already identical at the destination.
    pub skipped: usize,
    pub removed: usize,
    pub restarted: bool,
}

/// `playground.json`: which app the playground was last synced from.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaygroundPointer {
    app_name: String,
}

/// Read the pointer. A missing or unreadable one means "unknown source".
pub(crate) async fn read_pointer(path: &Path) -> Option<String> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    match serde_json::from_str::<PlaygroundPointer>(&content) {
        Ok(pointer) => Some(pointer.app_name),
        Err(err) => {
            log!("playground"; "ignoring malformed {}: {err}", path.display());
            None
        }
    }
}

async fn write_pointer(path: &Path, app_name: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let pointer = PlaygroundPointer {
        app_name: app_name.to_owned(),
    };
    tokio::fs::write(path, serde_json::to_string(&pointer)?)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

impl Workshop {
    /// Sync the playground from the app called `app_name`.
    pub async fn set_playground_by_name(
        self: &Arc<Self>,
        app_name: &str,
        reset: bool,
    ) -> Result<SyncReport> {
        let app = self
            .get_app_by_name(app_name)
            .await?
            .ok_or_else(|| NotFound::App(app_name.to_owned()))?;
        if app.is_playground() {
            bail!("the playground cannot be synced from itself");
        }
        self.set_playground(&app.full_path, reset).await
    }

    /// Make `playground/` a mirror of `src`. Calls are serialised.
    pub async fn set_playground(self: &Arc<Self>, src: &Path, reset: bool) -> Result<SyncReport> {
        let _guard = self.playground_lock.lock().await;
        let dest = self.paths.playground.clone();

        self.tracker.suspend(&dest);
        let result = self.sync_playground(src, &dest, reset).await;
        self.tracker.resume(&dest);
        self.tracker.record_touched(&dest);

        result
    }

    async fn sync_playground(&self, src: &Path, dest: &Path, reset: bool) -> Result<SyncReport> {
        if !src.is_dir() {
            bail!("`{}` is not a directory", src.display());
        }
        let app_name = self.paths.name_from_path(src)?;
        log!("playground"; "syncing from {app_name}");

        let current = if dest.is_dir() {
            self.playground_app().await.ok()
        } else {
            None
        };
        let was_running = match &current {
            Some(app) => self.processes.is_running(app).await,
            None => false,
        };

        if reset {
            self.processes.stop(PLAYGROUND_NAME).await?;
            if dest.exists() {
                tokio::fs::remove_dir_all(dest)
                    .await
                    .with_context(|| format!("Failed to remove {}", dest.display()))?;
            }
        }

        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let mut envs = vec![
            ("KCDSHOP_PLAYGROUND_TIMESTAMP", OsString::from(timestamp)),
            ("KCDSHOP_PLAYGROUND_SRC_DIR", src.as_os_str().to_owned()),
            ("KCDSHOP_PLAYGROUND_DEST_DIR", dest.as_os_str().to_owned()),
            ("KCDSHOP_PLAYGROUND_WAS_RUNNING", flag(was_running)),
        ];
        self.run_hook(&src.join(PRE_HOOK), &envs).await?;

        // Copying over an existing node_modules in place is unreliable.
        let node_modules = dest.join("node_modules");
        if node_modules.exists() {
            tokio::fs::remove_dir_all(&node_modules)
                .await
                .with_context(|| format!("Failed to remove {}", node_modules.display()))?;
        }

        let (root, from, to) = (self.paths.root.clone(), src.to_path_buf(), dest.to_path_buf());
        let mut report = tokio::task::spawn_blocking(move || mirror(&root, &from, &to)).await??;

        write_pointer(&self.paths.playground_pointer(), &app_name).await?;

        let is_still_running = match &current {
            Some(app) if was_running => self.processes.is_running(app).await,
            _ => false,
        };
        let restart = was_running && !is_still_running;
        envs.push(("KCDSHOP_PLAYGROUND_IS_STILL_RUNNING", flag(is_still_running)));
        envs.push(("KCDSHOP_PLAYGROUND_RESTART_PLAYGROUND", flag(restart)));
        self.run_hook(&src.join(POST_HOOK), &envs).await?;

        if let (true, Some(app)) = (is_still_running, &current) {
            let message = serde_json::json!({ "type": "kcdshop:playground-set" }).to_string();
            self.processes.send_message(app, &message).await?;
        } else if restart {
            let app = self.playground_app().await?;
            self.processes.start(&app).await?;
            self.processes.wait_until_healthy(&app).await?;
            report.restarted = true;
        }

        log!(
            "playground";
            "{app_name}: {} copied, {} unchanged, {} removed",
            report.copied, report.skipped, report.removed
        );
        Ok(report)
    }

    /// Run `script` with the hook interpreter from the workshop root, if it
    /// exists.
    async fn run_hook(&self, script: &Path, envs: &[(&'static str, OsString)]) -> Result<()> {
        if !script.is_file() {
            return Ok(());
        }
        check_command_installed("[playground.hook_command]", &self.hook_command)?;
        let root = self.paths.root.clone();
        let command = self.hook_command.clone();
        let script = script.to_path_buf();
        let envs = envs.to_vec();

        tokio::task::spawn_blocking(move || {
            exec!(env=&envs; filter=&NODE_FILTER; root.as_path(); &command; &script).map(drop)
        })
        .await?
    }
}

fn flag(value: bool) -> OsString {
    OsString::from(if value { "true" } else { "false" })
}

// ============================================================================
// Mirror
// ============================================================================

fn has_component(relative: &Path, names: &[&str]) -> bool {
    relative
        .components()
        .any(|component| names.iter().any(|name| component.as_os_str() == *name))
}

/// Copy `src` onto `dest`, then delete what `src` does not have.
fn mirror(root: &Path, src: &Path, dest: &Path) -> Result<SyncReport> {
    let ignore = GitIgnore::load(&[root, src])?;

    let entries: Vec<walkdir::DirEntry> = WalkDir::new(src)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| {
            let Ok(relative) = entry.path().strip_prefix(src) else {
                return false;
            };
            if has_component(relative, &ALWAYS_COPY) {
                return true;
            }
            !has_component(relative, &BUILD_OUTPUT)
                && !ignore.is_ignored(entry.path(), entry.file_type().is_dir())
        })
        .collect::<Result<_, _>>()?;

    let mut wanted = FxHashSet::default();
    let mut files = Vec::new();
    fs::create_dir_all(dest).with_context(|| format!("Failed to create {}", dest.display()))?;
    for entry in &entries {
        let relative = entry.path().strip_prefix(src)?.to_path_buf();
        if entry.file_type().is_dir() {
            let target = dest.join(&relative);
            // A file or symlink in the way of a directory. Symlinks must go
            // too, or copies would land wherever they point.
            if fs::symlink_metadata(&target).is_ok_and(|existing| !existing.is_dir()) {
                remove_path(&target)
                    .with_context(|| format!("Failed to remove {}", target.display()))?;
            }
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
        } else {
            files.push(relative.clone());
        }
        wanted.insert(relative);
    }

    let copied = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);
    files.par_iter().try_for_each(|relative| -> Result<()> {
        let (from, to) = (src.join(relative), dest.join(relative));
        let counter = if copy_entry(&from, &to)
            .with_context(|| format!("Failed to copy {}", from.display()))?
        {
            &copied
        } else {
            &skipped
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    })?;

    let removed = prune(dest, &wanted)?;

    Ok(SyncReport {
        copied: copied.into_inner(),
        skipped: skipped.into_inner(),
        removed,
        restarted: false,
    })
}

/// Copy one file or symlink. `false` when `to` was already identical.
fn copy_entry(from: &Path, to: &Path) -> io::Result<bool> {
    let meta = fs::symlink_metadata(from)?;
    if meta.file_type().is_symlink() {
        return copy_symlink(from, to);
    }

    if is_identical(from, meta.len(), to)? {
        return Ok(false);
    }
    // A directory or symlink in the way of a file.
    if fs::symlink_metadata(to).is_ok_and(|existing| !existing.is_file()) {
        remove_path(to)?;
    }
    fs::copy(from, to)?;
    Ok(true)
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<bool> {
    let target = fs::read_link(from)?;
    if fs::read_link(to).is_ok_and(|existing| existing == target) {
        return Ok(false);
    }
    remove_path(to)?;
    std::os::unix::fs::symlink(&target, to)?;
    Ok(true)
}

/// No portable way to recreate the link: copy what it points at.
#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<bool> {
    remove_path(to)?;
    fs::copy(from, to)?;
    Ok(true)
}

/// Same length and same content hash.
fn is_identical(from: &Path, len: u64, to: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(to) {
        Ok(existing) if existing.is_file() && existing.len() == len => {
            Ok(hash_file(from)? == hash_file(to)?)
        }
        Ok(_) => Ok(false),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

fn hash_file(path: &Path) -> io::Result<blake3::Hash> {
    let mut hasher = blake3::Hasher::new();
    hasher.update_reader(fs::File::open(path)?)?;
    Ok(hasher.finalize())
}

/// Delete everything under `dest` that is not in `wanted`, except
/// `node_modules` and build output. Returns the number of removed entries.
fn prune(dest: &Path, wanted: &FxHashSet<PathBuf>) -> Result<usize> {
    let mut orphans = Vec::new();
    let mut walker = WalkDir::new(dest).min_depth(1).into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry?;
        let relative = entry.path().strip_prefix(dest)?;
        let is_dir = entry.file_type().is_dir();

        let keep_out =
            has_component(relative, &BUILD_OUTPUT) || has_component(relative, &["node_modules"]);
        if keep_out || !wanted.contains(relative) {
            if !keep_out {
                orphans.push(entry.path().to_path_buf());
            }
            // Orphan dirs go as a whole.
            if is_dir {
                walker.skip_current_dir();
            }
        }
    }

    for orphan in &orphans {
        remove_path(orphan).with_context(|| format!("Failed to remove {}", orphan.display()))?;
    }
    Ok(orphans.len())
}

fn remove_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        process::fake::FakeProcesses,
        workshop::{AppKind, fixtures::*},
    };

    const HELLO: &str = "exercises__sep__01.intro__sep__01.problem.hello";
    const HELLO_SOLUTION: &str = "exercises__sep__01.intro__sep__01.solution.hello";

    fn file_set(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<_> = WalkDir::new(dir)
            .min_depth(1)
            .into_iter()
            .map(|entry| entry.unwrap().path().strip_prefix(dir).unwrap().to_path_buf())
            .collect();
        files.sort();
        files
    }

    /// The fixture's workshop, but running hooks with `sh`.
    #[cfg(unix)]
    fn with_sh_hooks(fx: &Fixture) -> Arc<Workshop> {
        let mut config = crate::config::Config::for_root(fx.root());
        config.playground.hook_command = vec!["sh".into()];
        Workshop::new(
            &config,
            Arc::clone(fx.workshop.tracker()),
            Arc::new(crate::compiler::MarkdownCompiler),
            Arc::clone(&fx.processes) as Arc<dyn crate::process::ProcessManager>,
        )
    }

    #[tokio::test]
    async fn test_mirror_is_idempotent() {
        let fx = fixture();
        let workshop = &fx.workshop;

        let first = workshop.set_playground_by_name(HELLO, false).await.unwrap();
        assert_eq!(first.copied, 2);
        let files = file_set(&workshop.paths().playground);

        let second = workshop.set_playground_by_name(HELLO, false).await.unwrap();
        assert_eq!(second.copied, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(second.removed, 0);
        assert_eq!(file_set(&workshop.paths().playground), files);
    }

    #[tokio::test]
    async fn test_prune_removes_stale_files() {
        let fx = fixture();
        fx.write("playground/stale.txt", "old");
        fx.write("playground/old-dir/nested.js", "old");
        fx.write("playground/build/out.js", "kept");
        fx.write("playground/node_modules/.bin/tool", "kept");

        let report = fx.workshop.set_playground_by_name(HELLO, false).await.unwrap();
        let playground = &fx.workshop.paths().playground;

        assert_eq!(report.removed, 2);
        assert!(!playground.join("stale.txt").exists());
        assert!(!playground.join("old-dir").exists());
        assert!(playground.join("index.js").exists());
        assert!(playground.join("build/out.js").exists());
        // node_modules is always deleted before copying.
        assert!(!playground.join("node_modules").exists());
    }

    #[tokio::test]
    async fn test_ignored_and_build_files_are_not_copied() {
        let fx = fixture();
        fx.write(".gitignore", "*.log\n.env\nnode_modules\n");
        let src = "exercises/01.intro/01.problem.hello";
        fx.write(&format!("{src}/debug.log"), "noise");
        fx.write(&format!("{src}/.env"), "KEY=1");
        fx.write(&format!("{src}/build/bundle.js"), "out");
        fx.write(&format!("{src}/node_modules/dep/index.js"), "dep");

        fx.workshop.set_playground_by_name(HELLO, false).await.unwrap();
        let playground = &fx.workshop.paths().playground;

        assert!(!playground.join("debug.log").exists());
        assert!(!playground.join("build").exists());
        assert!(playground.join(".env").exists());
        assert!(playground.join("node_modules/dep/index.js").exists());
    }

    #[tokio::test]
    async fn test_changed_file_is_recopied() {
        let fx = fixture();
        fx.workshop.set_playground_by_name(HELLO, false).await.unwrap();
        fx.write("playground/index.js", "// edited by the learner\n");

        let report = fx.workshop.set_playground_by_name(HELLO, false).await.unwrap();
        assert_eq!(report.copied, 1);
        assert_eq!(
            fs::read_to_string(fx.workshop.paths().playground.join("index.js")).unwrap(),
            "// todo\n"
        );
    }

    #[tokio::test]
    async fn test_file_replaced_by_directory() {
        let fx = fixture();
        fx.write("playground/lib", "was a file");
        fx.write("exercises/01.intro/01.problem.hello/lib/util.js", "export {}\n");

        fx.workshop.set_playground_by_name(HELLO, false).await.unwrap();
        let playground = &fx.workshop.paths().playground;
        assert!(playground.join("lib").is_dir());
        assert_eq!(
            fs::read_to_string(playground.join("lib/util.js")).unwrap(),
            "export {}\n"
        );

        let again = fx.workshop.set_playground_by_name(HELLO, false).await.unwrap();
        assert_eq!(again.copied, 0);
        assert_eq!(again.removed, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_directory_is_not_followed() {
        let fx = fixture();
        let outside = fx.root().join("outside");
        fs::create_dir_all(&outside).unwrap();
        fs::create_dir_all(&fx.workshop.paths().playground).unwrap();
        std::os::unix::fs::symlink(&outside, fx.workshop.paths().playground.join("lib")).unwrap();
        fx.write("exercises/01.intro/01.problem.hello/lib/util.js", "export {}\n");

        fx.workshop.set_playground_by_name(HELLO, false).await.unwrap();
        let lib = fx.workshop.paths().playground.join("lib");
        assert!(!fs::symlink_metadata(&lib).unwrap().file_type().is_symlink());
        assert!(lib.join("util.js").is_file());
        assert!(!outside.join("util.js").exists());
    }

    #[tokio::test]
    async fn test_pointer_and_playground_app() {
        let fx = fixture();
        fx.workshop.set_playground_by_name(HELLO, false).await.unwrap();

        let pointer = read_pointer(&fx.workshop.paths().playground_pointer()).await;
        assert_eq!(pointer.as_deref(), Some(HELLO));

        let app = fx.workshop.get_playground_app().await.unwrap().unwrap();
        assert_eq!(
            app.kind,
            AppKind::Playground {
                app_name: Some(HELLO.into()),
                problem_name: Some(HELLO.into()),
                solution_name: Some(HELLO_SOLUTION.into()),
            }
        );
        assert_eq!(app.title, "Say hello");
    }

    #[tokio::test]
    async fn test_reset_stops_and_clears() {
        let fx = fixture_with(FakeProcesses::with_running(PLAYGROUND_NAME), sample_workshop);
        fx.write("playground/learner-notes.md", "mine");
        fx.write("playground/build/out.js", "old build");

        let report = fx.workshop.set_playground_by_name(HELLO, true).await.unwrap();
        let playground = &fx.workshop.paths().playground;

        assert!(!playground.join("build").exists());
        assert!(!playground.join("learner-notes.md").exists());
        assert_eq!(report.removed, 0);
        // Stopped for the reset, so it comes back fresh.
        assert!(report.restarted);
        assert_eq!(*fx.processes.started.lock(), [PLAYGROUND_NAME]);
        assert!(fx.processes.messages.lock().is_empty());
    }

    #[tokio::test]
    async fn test_running_process_is_notified() {
        let fx = fixture_with(FakeProcesses::with_running(PLAYGROUND_NAME), sample_workshop);
        fx.write("playground/index.js", "\n");

        let report = fx.workshop.set_playground_by_name(HELLO, false).await.unwrap();
        assert!(!report.restarted);

        let messages = fx.processes.messages.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, PLAYGROUND_NAME);
        assert!(messages[0].1.contains("kcdshop:playground-set"));
        assert!(fx.processes.started.lock().is_empty());
    }

    #[tokio::test]
    async fn test_process_that_died_is_restarted() {
        let processes = FakeProcesses::with_running(PLAYGROUND_NAME);
        *processes.die_on_check.lock() = Some(PLAYGROUND_NAME.into());
        let fx = fixture_with(processes, sample_workshop);
        fx.write("playground/index.js", "\n");

        let report = fx.workshop.set_playground_by_name(HELLO, false).await.unwrap();
        assert!(report.restarted);
        assert_eq!(*fx.processes.started.lock(), [PLAYGROUND_NAME]);
        assert!(fx.processes.messages.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_app_is_not_found() {
        let fx = fixture();
        let err = fx.workshop.set_playground_by_name("nope", false).await.unwrap_err();
        assert!(err.downcast_ref::<NotFound>().is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hooks_receive_environment() {
        let fx = fixture();
        let src = "exercises/01.intro/01.problem.hello";
        let out = fx.root().join("hook-env.txt");
        let script = format!(
            "echo \"$KCDSHOP_PLAYGROUND_WAS_RUNNING $KCDSHOP_PLAYGROUND_RESTART_PLAYGROUND\" > {}",
            out.display()
        );
        fx.write(&format!("{src}/{POST_HOOK}"), &script);

        let workshop = with_sh_hooks(&fx);

        workshop.set_playground_by_name(HELLO, false).await.unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "false false");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_hook_propagates() {
        let fx = fixture();
        fx.write(
            &format!("exercises/01.intro/01.problem.hello/{PRE_HOOK}"),
            "exit 1",
        );
        let workshop = with_sh_hooks(&fx);

        assert!(workshop.set_playground_by_name(HELLO, false).await.is_err());
        // Nothing was copied and the pointer was not written.
        assert!(read_pointer(&workshop.paths().playground_pointer()).await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_syncs_run_one_at_a_time() {
        let fx = fixture();
        let log = fx.root().join("hooks.log");
        for src in ["01.problem.hello", "01.solution.hello"] {
            let dir = format!("exercises/01.intro/{src}");
            fx.write(
                &format!("{dir}/{PRE_HOOK}"),
                &format!(
                    "echo \"pre $(basename \"$KCDSHOP_PLAYGROUND_SRC_DIR\")\" >> {}\nsleep 0.3\n",
                    log.display()
                ),
            );
            fx.write(
                &format!("{dir}/{POST_HOOK}"),
                &format!(
                    "echo \"post $(basename \"$KCDSHOP_PLAYGROUND_SRC_DIR\")\" >> {}\n",
                    log.display()
                ),
            );
        }
        let workshop = with_sh_hooks(&fx);

        let (first, second) = tokio::join!(
            workshop.set_playground_by_name(HELLO, false),
            workshop.set_playground_by_name(HELLO_SOLUTION, false),
        );
        first.unwrap();
        second.unwrap();

        let content = fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4, "{content}");
        // Each sync's post hook finishes before the next sync's pre hook.
        for pair in lines.chunks(2) {
            let name = pair[0].strip_prefix("pre ").unwrap();
            assert_eq!(pair[1], format!("post {name}"));
        }
        assert_ne!(lines[0], lines[2]);

        let last = lines[2].strip_prefix("pre ").unwrap();
        let last_src = fx.root().join("exercises/01.intro").join(last);
        let playground = &workshop.paths().playground;
        assert_eq!(file_set(playground), file_set(&last_src));
        assert_eq!(
            fs::read_to_string(playground.join("index.js")).unwrap(),
            fs::read_to_string(last_src.join("index.js")).unwrap()
        );
    }
}
