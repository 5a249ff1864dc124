//! Exercises: catalog apps grouped by exercise directory, plus the
//! workshop-level title and instructions.

use super::{
    App, StepKind, Workshop,
    builders::{dir_name, list_dirs},
    classify::exercise_number_from_dir,
};
use crate::{compiler::CompiledMdx, config::WorkshopMeta, debug};
use anyhow::Result;
use futures::future::join_all;
use serde::Serialize;
use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub exercise_number: u32,
    pub dir_name: String,
    pub full_path: PathBuf,
    pub title: String,
    pub instructions_code: Option<String>,
    pub finished_code: Option<String>,
    /// Indexed by `step_number - 1`; `None` where the step number has no
    /// directory. A step may hold only one side.
    pub steps: Vec<Option<ExerciseStep>>,
    pub problems: Vec<App>,
    pub solutions: Vec<App>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseStep {
    pub step_number: u32,
    pub problem: Option<App>,
    pub solution: Option<App>,
}

impl Workshop {
    /// One entry per numbered directory under `exercises/`, in number order.
    pub async fn get_exercises(self: &Arc<Self>) -> Result<Vec<Exercise>> {
        let apps = self.get_apps().await?;

        let mut dirs = Vec::new();
        for dir in list_dirs(&self.paths.exercises).await? {
            match exercise_number_from_dir(&dir_name(&dir)) {
                Some(number) => dirs.push((number, dir)),
                None => debug!("exercises"; "skipping {}", dir.display()),
            }
        }

        let exercises = dirs
            .into_iter()
            .map(|(number, dir)| self.assemble_exercise(number, dir, &apps));
        let mut exercises = join_all(exercises).await;
        exercises.sort_by_key(|exercise| exercise.exercise_number);
        Ok(exercises)
    }

    pub async fn get_exercise(self: &Arc<Self>, exercise_number: u32) -> Result<Option<Exercise>> {
        Ok(self
            .get_exercises()
            .await?
            .into_iter()
            .find(|exercise| exercise.exercise_number == exercise_number))
    }

    async fn assemble_exercise(&self, exercise_number: u32, dir: PathBuf, apps: &[App]) -> Exercise {
        let mut steps: BTreeMap<u32, ExerciseStep> = BTreeMap::new();
        let mut problems = Vec::new();
        let mut solutions = Vec::new();

        let members = apps
            .iter()
            .filter(|app| app.full_path.parent() == Some(dir.as_path()));
        for app in members {
            let (Some((_, step_number)), Some(kind)) = (app.exercise_step(), app.step_kind()) else {
                continue;
            };
            let step = steps.entry(step_number).or_insert_with(|| ExerciseStep {
                step_number,
                problem: None,
                solution: None,
            });
            match kind {
                StepKind::Problem => {
                    step.problem = Some(app.clone());
                    problems.push(app.clone());
                }
                StepKind::Solution => {
                    step.solution = Some(app.clone());
                    solutions.push(app.clone());
                }
            }
        }

        let readme_path = dir.join("README.mdx");
        let finished_path = dir.join("FINISHED.mdx");
        let (instructions, finished) = futures::join!(
            self.compile_file(&readme_path),
            self.compile_file(&finished_path),
        );
        let dir_name = dir_name(&dir);

        Exercise {
            exercise_number,
            title: instructions
                .as_ref()
                .and_then(|compiled| compiled.title.clone())
                .unwrap_or_else(|| dir_name.clone()),
            dir_name,
            full_path: dir,
            instructions_code: instructions.map(|compiled| compiled.code),
            finished_code: finished.map(|compiled| compiled.code),
            steps: index_steps(steps),
            problems,
            solutions,
        }
    }

    /// `kcdshop.title` from the root `package.json`. Fails when absent.
    pub fn get_workshop_title(&self) -> Result<String> {
        let root = &self.paths.root;
        let meta = WorkshopMeta::load(root)?;
        Ok(meta.title(root)?.to_owned())
    }

    pub async fn get_workshop_instructions(&self) -> Option<CompiledMdx> {
        self.compile_file(&self.paths.root.join("README.mdx")).await
    }

    pub async fn get_workshop_finished(&self) -> Option<CompiledMdx> {
        self.compile_file(&self.paths.root.join("FINISHED.mdx")).await
    }
}

/// Lay steps out by number so `steps[n - 1]` is step `n`.
fn index_steps(steps: BTreeMap<u32, ExerciseStep>) -> Vec<Option<ExerciseStep>> {
    let len = steps.keys().next_back().map_or(0, |&last| last as usize);
    let mut indexed = vec![None; len];
    for (step_number, step) in steps {
        // Step numbers start at 1; a `00.problem` has no slot.
        if let Some(slot) = (step_number as usize)
            .checked_sub(1)
            .and_then(|index| indexed.get_mut(index))
        {
            *slot = Some(step);
        }
    }
    indexed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workshop::fixtures::*;
    use std::fs;

    #[tokio::test]
    async fn test_exercises_group_steps() {
        let fx = fixture();
        let exercises = fx.workshop.get_exercises().await.unwrap();
        assert_eq!(exercises.len(), 2);

        let intro = &exercises[0];
        assert_eq!(intro.exercise_number, 1);
        assert_eq!(intro.title, "Intro");
        assert_eq!(intro.finished_code.as_deref(), Some("# Done\n"));
        assert_eq!(intro.steps.len(), 2);
        assert_eq!(intro.problems.len(), 2);
        assert_eq!(intro.solutions.len(), 1);

        let first = intro.steps[0].as_ref().unwrap();
        assert_eq!(first.step_number, 1);
        assert!(first.problem.is_some() && first.solution.is_some());

        // A step with only a problem is fine.
        let second = intro.steps[1].as_ref().unwrap();
        assert_eq!(second.step_number, 2);
        assert!(second.problem.is_some());
        assert!(second.solution.is_none());
    }

    #[tokio::test]
    async fn test_steps_are_indexed_by_number() {
        let fx = fixture();
        fx.write("exercises/01.intro/04.problem/index.js", "\n");

        let intro = fx.workshop.get_exercise(1).await.unwrap().unwrap();
        assert_eq!(intro.steps.len(), 4);
        assert!(intro.steps[2].is_none());

        let fourth = intro.steps[3].as_ref().unwrap();
        assert_eq!(fourth.step_number, 4);
        assert!(fourth.problem.is_some());
        assert!(fourth.solution.is_none());
        assert_eq!(intro.problems.len(), 3);
    }

    #[test]
    fn test_index_steps_skips_step_zero() {
        let step = |step_number| ExerciseStep {
            step_number,
            problem: None,
            solution: None,
        };
        let steps = BTreeMap::from([(0, step(0)), (2, step(2))]);
        let indexed = index_steps(steps);
        assert_eq!(indexed.len(), 2);
        assert!(indexed[0].is_none());
        assert_eq!(indexed[1].as_ref().map(|s| s.step_number), Some(2));
    }

    #[tokio::test]
    async fn test_exercise_without_readme() {
        let fx = fixture();
        let state = fx.workshop.get_exercise(2).await.unwrap().unwrap();
        assert_eq!(state.title, "02.state");
        assert!(state.instructions_code.is_none());
        assert!(state.finished_code.is_none());
        assert!(fx.workshop.get_exercise(9).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unnumbered_exercise_dir_is_skipped() {
        let fx = fixture();
        fs::create_dir_all(fx.root().join("exercises/shared")).unwrap();
        assert_eq!(fx.workshop.get_exercises().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_workshop_level_content() {
        let fx = fixture();
        assert_eq!(fx.workshop.get_workshop_title().unwrap(), "React Fundamentals");
        let instructions = fx.workshop.get_workshop_instructions().await.unwrap();
        assert_eq!(instructions.title.as_deref(), Some("Welcome"));
        assert!(fx.workshop.get_workshop_finished().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_title_is_an_error() {
        let fx = fixture_with(Default::default(), |root| {
            write(root, "package.json", r#"{"name":"untitled"}"#);
        });
        assert!(fx.workshop.get_workshop_title().is_err());
    }
}
