//! File system watcher feeding the staleness tracker.
//!
//! ```text
//! ┌──────────┐    ┌───────────┐    ┌──────────────────────────────┐
//! │ notify   │───▶│ Debouncer │───▶│ tracker.record_event(path,   │
//! │ events   │    │ (100ms)   │    │         workshop.known_dirs) │
//! └──────────┘    └───────────┘    └──────────────────────────────┘
//! ```
//!
//! Nothing is rebuilt here: caches notice on their next lookup.

use crate::{debug, log, workshop::Workshop};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

const DEBOUNCE_MS: u64 = 100;

/// Directories whose churn never affects app records.
const EXCLUDED_DIRS: &[&str] = &["node_modules", ".git", ".cache"];

/// Editor swap and backup files.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp") || name.ends_with('~')
}

fn is_excluded(path: &Path, root: &Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|component| EXCLUDED_DIRS.iter().any(|dir| component.as_os_str() == *dir))
}

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Batches rapid file events.
struct Debouncer {
    root: PathBuf,
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
}

impl Debouncer {
    fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            pending: FxHashSet::default(),
            last_event: None,
        }
    }

    fn add(&mut self, event: Event) {
        for path in event.paths {
            if !is_temp_file(&path) && !is_excluded(&path, &self.root) {
                self.pending.insert(path);
            }
        }
        self.last_event = Some(Instant::now());
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && self
                .last_event
                .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        self.pending.drain().collect()
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::from_secs(60)
        } else {
            Duration::from_millis(DEBOUNCE_MS)
        }
    }
}

/// Attribute changed paths to the directories they invalidate.
fn forward_changes(workshop: &Workshop, paths: &[PathBuf]) {
    let known_dirs = workshop.known_dirs();
    for path in paths {
        workshop.tracker().record_event(path, &known_dirs);
    }
    debug!("watch"; "{} paths changed", paths.len());
}

/// Watch the workshop root until the event channel closes.
pub fn watch_for_changes_blocking(workshop: Arc<Workshop>) -> Result<()> {
    let root = workshop.paths().root.clone();

    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", root.display()))?;
    log!("watch"; "{}", root.display());

    let mut debouncer = Debouncer::new(&root);

    loop {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) => debouncer.add(event),
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) if debouncer.ready() => {
                forward_changes(&workshop, &debouncer.take());
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            _ => {}
        }
    }

    Ok(())
}
