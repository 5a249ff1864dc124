//! Directory classifier.
//!
//! Exercise directories look like `01.intro`; step directories inside them
//! look like `01.problem`, `02.solution.extra-credit`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::LazyLock};

static STEP_DIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.(problem|solution)(?:\.(.+))?$").expect("step dir pattern is valid")
});

static EXERCISE_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.").expect("exercise dir pattern is valid"));

/// Which side of a step a directory holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Problem,
    Solution,
}

impl StepKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Problem => "problem",
            Self::Solution => "solution",
        }
    }

    /// The side a problem/solution cross-links to.
    pub const fn counterpart(self) -> Self {
        match self {
            Self::Problem => Self::Solution,
            Self::Solution => Self::Problem,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed `<step>.<kind>[.<subtitle>]` directory name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDir {
    pub step_number: u32,
    pub kind: StepKind,
    pub subtitle: Option<String>,
}

/// Parse a step directory name. Returns `None` for anything else, including
/// a step number of zero.
pub fn classify_step_dir(dir_name: &str) -> Option<StepDir> {
    let caps = STEP_DIR.captures(dir_name)?;
    let step_number = parse_positive(&caps[1])?;
    let kind = match &caps[2] {
        "problem" => StepKind::Problem,
        _ => StepKind::Solution,
    };
    let subtitle = caps.get(3).map(|m| m.as_str().to_owned());

    Some(StepDir {
        step_number,
        kind,
        subtitle,
    })
}

/// Leading number of an exercise directory (`03.forms` → 3).
pub fn exercise_number_from_dir(dir_name: &str) -> Option<u32> {
    let caps = EXERCISE_DIR.captures(dir_name)?;
    parse_positive(&caps[1])
}

fn parse_positive(digits: &str) -> Option<u32> {
    digits.parse::<u32>().ok().filter(|n| *n > 0)
}
