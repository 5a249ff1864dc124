//! The sorted app catalog and lookups over it.

use super::{App, StepKind, Workshop, compare_apps};
use crate::{cache::CacheOptions, log};
use anyhow::Result;
use std::{path::Path, sync::Arc, time::Duration};

const CATALOG_KEY: &str = "apps";
const CATALOG_TTL: Duration = Duration::from_secs(60 * 60 * 24);

impl Workshop {
    /// Every app in navigation order.
    ///
    /// Cached under one key for everyone; any touched directory invalidates
    /// it.
    pub async fn get_apps(self: &Arc<Self>) -> Result<Vec<App>> {
        let workshop = Arc::clone(self);
        self.catalog
            .cached(
                CATALOG_KEY,
                CacheOptions::new(CATALOG_TTL, Duration::ZERO),
                |metadata| self.tracker.is_any_stale(metadata),
                move || async move { workshop.scan_apps().await },
            )
            .await
    }

    /// Kinds are scanned one after another, each in parallel internally.
    async fn scan_apps(self: &Arc<Self>) -> Result<Vec<App>> {
        let mut scan = self.scan_playground().await;
        scan.extend(self.scan_steps(StepKind::Problem).await?);
        scan.extend(self.scan_steps(StepKind::Solution).await?);
        scan.extend(self.scan_examples().await?);

        for (dir, err) in &scan.failures {
            log!("apps"; "skipping {}: {err:#}", dir.display());
        }

        let mut apps = scan.apps;
        apps.sort_by(compare_apps);
        self.remember_dirs(&apps);
        Ok(apps)
    }

    /// Refresh the directories the watcher attributes events to.
    fn remember_dirs(&self, apps: &[App]) {
        let mut dirs: Vec<_> = apps
            .iter()
            .flat_map(|app| {
                let exercise_dir = app
                    .is_step()
                    .then(|| app.full_path.parent())
                    .flatten()
                    .map(Path::to_path_buf);
                std::iter::once(app.full_path.clone()).chain(exercise_dir)
            })
            .collect();
        dirs.sort();
        dirs.dedup();
        *self.known_dirs.write() = dirs;
    }

    pub async fn get_app_by_name(self: &Arc<Self>, name: &str) -> Result<Option<App>> {
        Ok(self
            .get_apps()
            .await?
            .into_iter()
            .find(|app| app.name == name))
    }

    pub async fn get_exercise_app(
        self: &Arc<Self>,
        exercise_number: u32,
        step_number: u32,
        kind: StepKind,
    ) -> Result<Option<App>> {
        Ok(self.get_apps().await?.into_iter().find(|app| {
            app.exercise_step() == Some((exercise_number, step_number))
                && app.step_kind() == Some(kind)
        }))
    }

    pub async fn get_playground_app(self: &Arc<Self>) -> Result<Option<App>> {
        Ok(self.get_apps().await?.into_iter().find(App::is_playground))
    }

    /// Step app right after `app` in navigation order.
    pub async fn get_next_exercise_app(self: &Arc<Self>, app: &App) -> Result<Option<App>> {
        self.step_neighbor(app, 1).await
    }

    /// Step app right before `app` in navigation order.
    pub async fn get_prev_exercise_app(self: &Arc<Self>, app: &App) -> Result<Option<App>> {
        self.step_neighbor(app, -1).await
    }

    async fn step_neighbor(self: &Arc<Self>, app: &App, offset: isize) -> Result<Option<App>> {
        let steps: Vec<App> = self
            .get_apps()
            .await?
            .into_iter()
            .filter(App::is_step)
            .collect();

        let neighbor = steps
            .iter()
            .position(|candidate| candidate.name == app.name)
            .and_then(|index| index.checked_add_signed(offset))
            .and_then(|index| steps.get(index).cloned());
        Ok(neighbor)
    }
}
