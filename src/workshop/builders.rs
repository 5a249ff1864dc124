//! App builders: one directory in, one [`App`] out.
//!
//! Every builder is cached per directory. Build failures are returned to
//! the scan, which logs them and leaves the directory out of the catalog.

use super::{
    App, AppKind, BuildError, DevInfo, PLAYGROUND_NAME, StepKind, TestInfo, Workshop,
    classify::{classify_step_dir, exercise_number_from_dir},
    playground,
};
use crate::{debug, package};
use anyhow::Result;
use futures::future::join_all;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::fs;

const PLAYGROUND_PORT: u16 = 4000;
const EXAMPLE_PORT_BASE: u16 = 8000;

/// Dev server port of a step app.
///
/// `6000 + (exercise - 1) * 10 + step` for problems, `7000 + ...` for
/// solutions. `None` when the result does not fit a port.
pub(crate) fn step_port(kind: StepKind, exercise_number: u32, step_number: u32) -> Option<u16> {
    let base: u32 = match kind {
        StepKind::Problem => 6000,
        StepKind::Solution => 7000,
    };
    let port = exercise_number
        .checked_sub(1)?
        .checked_mul(10)?
        .checked_add(step_number)?
        .checked_add(base)?;
    u16::try_from(port).ok()
}

/// Apps of one kind that built, and the directories that didn't.
#[derive(Debug, Default)]
pub(crate) struct AppScan {
    pub apps: Vec<App>,
    pub failures: Vec<(PathBuf, anyhow::Error)>,
}

impl AppScan {
    fn from_results(results: Vec<(PathBuf, Result<App>)>) -> Self {
        let mut scan = Self::default();
        for (dir, result) in results {
            match result {
                Ok(app) => scan.apps.push(app),
                Err(err) => scan.failures.push((dir, err)),
            }
        }
        scan
    }

    pub fn extend(&mut self, other: Self) {
        self.apps.extend(other.apps);
        self.failures.extend(other.failures);
    }
}

impl Workshop {
    /// Build every `NN.problem*` or `NN.solution*` directory concurrently.
    pub(crate) async fn scan_steps(self: &Arc<Self>, kind: StepKind) -> Result<AppScan> {
        let mut dirs = Vec::new();
        for exercise_dir in list_dirs(&self.paths.exercises).await? {
            for dir in list_dirs(&exercise_dir).await? {
                match classify_step_dir(&dir_name(&dir)) {
                    Some(step) if step.kind == kind => dirs.push(dir),
                    Some(_) => {}
                    None if kind == StepKind::Problem => {
                        debug!("apps"; "skipping unclassified directory {}", dir.display());
                    }
                    None => {}
                }
            }
        }

        let builds = dirs.into_iter().map(|dir| async move {
            let result = self.build_step_app(dir.clone(), kind).await;
            (dir, result)
        });
        Ok(AppScan::from_results(join_all(builds).await))
    }

    /// Build every directory under `examples/`; port follows listing order.
    pub(crate) async fn scan_examples(self: &Arc<Self>) -> Result<AppScan> {
        let dirs = list_dirs(&self.paths.examples).await?;
        let builds = dirs.into_iter().enumerate().map(|(index, dir)| async move {
            let result = self.build_example_app(dir.clone(), index).await;
            (dir, result)
        });
        Ok(AppScan::from_results(join_all(builds).await))
    }

    /// The playground app, if the playground directory exists.
    pub(crate) async fn scan_playground(self: &Arc<Self>) -> AppScan {
        let dir = self.paths.playground.clone();
        if !fs::metadata(&dir).await.is_ok_and(|meta| meta.is_dir()) {
            return AppScan::default();
        }
        let result = self.build_playground_app().await;
        AppScan::from_results(vec![(dir, result)])
    }

    pub async fn build_problem_app(self: &Arc<Self>, dir: PathBuf) -> Result<App> {
        self.build_step_app(dir, StepKind::Problem).await
    }

    pub async fn build_solution_app(self: &Arc<Self>, dir: PathBuf) -> Result<App> {
        self.build_step_app(dir, StepKind::Solution).await
    }

    async fn build_step_app(self: &Arc<Self>, dir: PathBuf, kind: StepKind) -> Result<App> {
        let key = format!("{kind}:{}", dir.display());
        // Sibling changes in the exercise dir can change the cross-link.
        let exercise_dir = dir.parent().map(Path::to_path_buf).unwrap_or_default();
        let workshop = Arc::clone(self);
        let target = dir.clone();

        self.apps
            .cached(
                &key,
                self.options,
                |metadata| self.is_any_dir_stale(&[dir.as_path(), exercise_dir.as_path()], metadata),
                move || async move { Ok(workshop.step_app(&target, kind).await?) },
            )
            .await
    }

    pub async fn build_example_app(self: &Arc<Self>, dir: PathBuf, index: usize) -> Result<App> {
        // The index is part of the key: the same dir at another position has
        // another port.
        let key = format!("example:{index}:{}", dir.display());
        let workshop = Arc::clone(self);
        let target = dir.clone();

        self.apps
            .cached(
                &key,
                self.options,
                |metadata| self.tracker.is_stale(&dir, metadata),
                move || async move { Ok(workshop.example_app(&target, index).await?) },
            )
            .await
    }

    pub async fn build_playground_app(self: &Arc<Self>) -> Result<App> {
        let dir = self.paths.playground.clone();
        let workshop = Arc::clone(self);

        self.apps
            .cached(
                PLAYGROUND_NAME,
                self.options,
                |metadata| self.tracker.is_stale(&dir, metadata),
                move || async move { Ok(workshop.playground_app().await?) },
            )
            .await
    }

    async fn step_app(&self, dir: &Path, kind: StepKind) -> Result<App, BuildError> {
        let step = classify_step_dir(&dir_name(dir))
            .filter(|step| step.kind == kind)
            .ok_or_else(|| BuildError::InvalidStepDir(dir.to_path_buf(), kind))?;

        let invalid_exercise = || BuildError::InvalidExerciseDir(dir.to_path_buf());
        let exercise_dir = dir.parent().ok_or_else(invalid_exercise)?;
        let exercise_number =
            exercise_number_from_dir(&dir_name(exercise_dir)).ok_or_else(invalid_exercise)?;
        let step_number = step.step_number;

        let counterpart = find_sibling(exercise_dir, step_number, kind.counterpart())
            .await?
            .map(|path| self.paths.name_from_path(&path))
            .transpose()?;
        let port = step_port(kind, exercise_number, step_number)
            .ok_or_else(|| BuildError::PortOutOfRange(dir.to_path_buf()))?;

        let kind = match kind {
            StepKind::Problem => AppKind::Problem {
                exercise_number,
                step_number,
                solution_name: counterpart,
            },
            StepKind::Solution => AppKind::Solution {
                exercise_number,
                step_number,
                problem_name: counterpart,
            },
        };
        self.assemble_app(dir, kind, port).await
    }

    async fn example_app(&self, dir: &Path, index: usize) -> Result<App, BuildError> {
        let port = u16::try_from(index)
            .ok()
            .and_then(|index| EXAMPLE_PORT_BASE.checked_add(index))
            .ok_or_else(|| BuildError::PortOutOfRange(dir.to_path_buf()))?;
        self.assemble_app(dir, AppKind::Example, port).await
    }

    /// Build the playground without going through the cache.
    ///
    /// Its problem/solution links come from the directory it was last synced
    /// from, never from the playground directory itself.
    pub(crate) async fn playground_app(&self) -> Result<App, BuildError> {
        let app_name = playground::read_pointer(&self.paths.playground_pointer()).await;

        let (problem_name, solution_name) = match &app_name {
            Some(name) => self.step_pair(&self.paths.path_from_name(name)).await?,
            None => (None, None),
        };

        let kind = AppKind::Playground {
            app_name,
            problem_name,
            solution_name,
        };
        self.assemble_app(&self.paths.playground, kind, PLAYGROUND_PORT).await
    }

    /// Names of the problem and solution of the step `source` belongs to.
    async fn step_pair(&self, source: &Path) -> Result<(Option<String>, Option<String>), BuildError> {
        let (Some(step), Some(exercise_dir)) =
            (classify_step_dir(&dir_name(source)), source.parent())
        else {
            return Ok((None, None));
        };

        let mut names = [None, None];
        for (slot, kind) in names.iter_mut().zip([StepKind::Problem, StepKind::Solution]) {
            *slot = find_sibling(exercise_dir, step.step_number, kind)
                .await?
                .map(|path| self.paths.name_from_path(&path))
                .transpose()?;
        }
        let [problem, solution] = names;
        Ok((problem, solution))
    }

    /// Fields shared by every app kind.
    async fn assemble_app(&self, dir: &Path, kind: AppKind, port: u16) -> Result<App, BuildError> {
        let name = self.paths.name_from_path(dir)?;
        let relative_path = self.paths.relative_path(dir)?;
        let dev = dev_info(dir, &name, port).await?;
        let test = test_info(dir, &name).await?;
        let compiled = self.compile_file(&dir.join("README.mdx")).await;

        let (title, instructions_code, epic_video_embeds) = match compiled {
            Some(compiled) => (compiled.title, Some(compiled.code), compiled.epic_video_embeds),
            None => (None, None, Vec::new()),
        };

        Ok(App {
            title: title.unwrap_or_else(|| name.clone()),
            name,
            dir_name: dir_name(dir),
            full_path: dir.to_path_buf(),
            relative_path,
            instructions_code,
            epic_video_embeds,
            test,
            dev,
            kind,
        })
    }
}

/// A `scripts.dev` entry means the app needs its own dev server.
async fn dev_info(dir: &Path, name: &str, port: u16) -> Result<DevInfo, BuildError> {
    Ok(match package::string_property(dir, "scripts.dev").await? {
        Some(_) => DevInfo::Script {
            port_number: port,
            base_url: format!("http://localhost:{port}/"),
        },
        None => DevInfo::Browser {
            base_url: format!("/app/{name}/"),
        },
    })
}

async fn test_info(dir: &Path, name: &str) -> Result<TestInfo, BuildError> {
    if let Some(script) = package::string_property(dir, "kcdshop.scripts.test").await? {
        return Ok(TestInfo::Script { script });
    }

    let test_files: Vec<String> = list_files(dir)
        .await?
        .iter()
        .map(|path| dir_name(path))
        .filter(|file_name| file_name.contains(".test."))
        .collect();

    if test_files.is_empty() {
        return Ok(TestInfo::None);
    }
    Ok(TestInfo::Browser {
        base_url: format!("/app/{name}/test/"),
        test_files,
    })
}

/// First directory next to a step whose name classifies as `kind` with the
/// same step number.
pub(crate) async fn find_sibling(
    exercise_dir: &Path,
    step_number: u32,
    kind: StepKind,
) -> Result<Option<PathBuf>, BuildError> {
    Ok(list_dirs(exercise_dir).await?.into_iter().find(|dir| {
        classify_step_dir(&dir_name(dir))
            .is_some_and(|step| step.kind == kind && step.step_number == step_number)
    }))
}

/// Sorted subdirectories of `dir`; a missing `dir` has none.
pub(crate) async fn list_dirs(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    list_entries(dir, true).await
}

async fn list_files(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    list_entries(dir, false).await
}

async fn list_entries(dir: &Path, want_dirs: bool) -> Result<Vec<PathBuf>, BuildError> {
    let io_err = |err| BuildError::Io(dir.to_path_buf(), err);

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(io_err(err)),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        // Follows symlinks.
        let Ok(meta) = fs::metadata(&path).await else {
            continue;
        };
        if (want_dirs && meta.is_dir()) || (!want_dirs && meta.is_file()) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

pub(crate) fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
