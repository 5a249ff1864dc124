//! App records and their navigation order.

use super::classify::StepKind;
use serde::Serialize;
use std::{cmp::Ordering, path::PathBuf};

/// Name of the single playground app.
pub const PLAYGROUND_NAME: &str = "playground";

/// One discoverable unit of workshop content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub name: String,
    pub title: String,
    pub dir_name: String,
    pub full_path: PathBuf,
    pub relative_path: String,
    pub instructions_code: Option<String>,
    pub epic_video_embeds: Vec<String>,
    pub test: TestInfo,
    pub dev: DevInfo,
    #[serde(flatten)]
    pub kind: AppKind,
}

/// Variant-specific data; serialized as a `type` discriminant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum AppKind {
    Problem {
        exercise_number: u32,
        step_number: u32,
        solution_name: Option<String>,
    },
    Solution {
        exercise_number: u32,
        step_number: u32,
        problem_name: Option<String>,
    },
    Example,
    Playground {
        /// App the playground was last synced from.
        app_name: Option<String>,
        /// Problem/solution pair of that source app, when it is a step.
        problem_name: Option<String>,
        solution_name: Option<String>,
    },
}

/// How an app's tests run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum TestInfo {
    None,
    Script { script: String },
    Browser { base_url: String, test_files: Vec<String> },
}

/// How an app is previewed: served statically, or by its own dev server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum DevInfo {
    Browser { base_url: String },
    Script { port_number: u16, base_url: String },
}

impl App {
    /// `(exercise, step)` for problem and solution apps.
    pub const fn exercise_step(&self) -> Option<(u32, u32)> {
        match self.kind {
            AppKind::Problem {
                exercise_number,
                step_number,
                ..
            }
            | AppKind::Solution {
                exercise_number,
                step_number,
                ..
            } => Some((exercise_number, step_number)),
            AppKind::Example | AppKind::Playground { .. } => None,
        }
    }

    pub const fn step_kind(&self) -> Option<StepKind> {
        match self.kind {
            AppKind::Problem { .. } => Some(StepKind::Problem),
            AppKind::Solution { .. } => Some(StepKind::Solution),
            AppKind::Example | AppKind::Playground { .. } => None,
        }
    }

    pub const fn is_step(&self) -> bool {
        self.step_kind().is_some()
    }

    pub const fn is_playground(&self) -> bool {
        matches!(self.kind, AppKind::Playground { .. })
    }

    pub const fn kind_name(&self) -> &'static str {
        match self.kind {
            AppKind::Problem { .. } => "problem",
            AppKind::Solution { .. } => "solution",
            AppKind::Example => "example",
            AppKind::Playground { .. } => "playground",
        }
    }

    /// Dev server port, if the app needs one.
    pub const fn port(&self) -> Option<u16> {
        match self.dev {
            DevInfo::Script { port_number, .. } => Some(port_number),
            DevInfo::Browser { .. } => None,
        }
    }

    /// UI route for this app: `/01/02/problem`, `/example/<name>`, `/playground`.
    pub fn page_route(&self) -> String {
        match &self.kind {
            AppKind::Problem {
                exercise_number,
                step_number,
                ..
            }
            | AppKind::Solution {
                exercise_number,
                step_number,
                ..
            } => format!(
                "/{exercise_number:02}/{step_number:02}/{}",
                self.kind_name()
            ),
            AppKind::Example => format!("/example/{}", self.name),
            AppKind::Playground { .. } => "/playground".into(),
        }
    }
}

/// Navigation order of the catalog.
///
/// Steps first by `(exercise, step)` with a problem right before its
/// solution, then examples by name, then the playground. Name breaks any
/// remaining tie so the order is total.
pub fn compare_apps(a: &App, b: &App) -> Ordering {
    sort_key(a).cmp(&sort_key(b)).then_with(|| a.name.cmp(&b.name))
}

fn sort_key(app: &App) -> (u8, u32, u32, Option<StepKind>) {
    match (app.exercise_step(), &app.kind) {
        (Some((exercise, step)), _) => (0, exercise, step, app.step_kind()),
        (None, AppKind::Example) => (1, 0, 0, None),
        (None, _) => (2, 0, 0, None),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    fn base(name: &str, kind: AppKind) -> App {
        App {
            name: name.into(),
            title: name.into(),
            dir_name: name.into(),
            full_path: PathBuf::from("/w").join(name),
            relative_path: name.into(),
            instructions_code: None,
            epic_video_embeds: Vec::new(),
            test: TestInfo::None,
            dev: DevInfo::Browser {
                base_url: format!("/app/{name}/"),
            },
            kind,
        }
    }

    pub fn problem(exercise_number: u32, step_number: u32) -> App {
        base(
            &format!("p{exercise_number}-{step_number}"),
            AppKind::Problem {
                exercise_number,
                step_number,
                solution_name: None,
            },
        )
    }

    pub fn solution(exercise_number: u32, step_number: u32) -> App {
        base(
            &format!("s{exercise_number}-{step_number}"),
            AppKind::Solution {
                exercise_number,
                step_number,
                problem_name: None,
            },
        )
    }

    pub fn example(name: &str) -> App {
        base(name, AppKind::Example)
    }

    pub fn playground() -> App {
        base(
            PLAYGROUND_NAME,
            AppKind::Playground {
                app_name: None,
                problem_name: None,
                solution_name: None,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn names(apps: &[App]) -> Vec<&str> {
        apps.iter().map(|app| app.name.as_str()).collect()
    }

    #[test]
    fn test_catalog_order() {
        let mut apps = vec![
            solution(1, 2),
            problem(1, 1),
            example("b"),
            example("a"),
            playground(),
        ];
        apps.sort_by(compare_apps);
        assert_eq!(names(&apps), ["p1-1", "s1-2", "a", "b", "playground"]);
    }

    #[test]
    fn test_solution_follows_matching_problem() {
        let mut apps = vec![
            solution(2, 1),
            playground(),
            solution(1, 1),
            problem(2, 1),
            problem(1, 2),
            problem(1, 1),
            example("z"),
        ];
        apps.sort_by(compare_apps);
        assert_eq!(
            names(&apps),
            ["p1-1", "s1-1", "p1-2", "p2-1", "s2-1", "z", "playground"]
        );
    }

    #[test]
    fn test_exercise_sorting_is_numeric() {
        let mut apps = vec![problem(10, 1), problem(2, 1), problem(1, 10), problem(1, 9)];
        apps.sort_by(compare_apps);
        assert_eq!(names(&apps), ["p1-9", "p1-10", "p2-1", "p10-1"]);
    }

    #[test]
    fn test_page_route() {
        assert_eq!(problem(1, 2).page_route(), "/01/02/problem");
        assert_eq!(solution(12, 3).page_route(), "/12/03/solution");
        assert_eq!(example("counter").page_route(), "/example/counter");
        assert_eq!(playground().page_route(), "/playground");
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(problem(1, 2)).unwrap();
        assert_eq!(json["type"], "problem");
        assert_eq!(json["exerciseNumber"], 1);
        assert_eq!(json["stepNumber"], 2);
        assert!(json["solutionName"].is_null());
        assert_eq!(json["dev"]["type"], "browser");
        assert_eq!(json["test"]["type"], "none");
        assert_eq!(json["dirName"], "p1-2");
    }
}
