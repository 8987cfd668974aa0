//! Case description loading
//!
//! Case descriptions are JSON documents naming the four action phases and
//! the measurement parameters. Loading only supplies structure; action
//! names and arguments are validated when the case is compiled.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::case::MeasureCase;
use crate::error::Result;

/// An action description: a token string or a nested list of descriptions.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ActionDesc {
    /// `<ActionName> <args…>`
    Tokens(String),
    /// Ordered sequence compiled into a script
    Sequence(Vec<ActionDesc>),
}

/// A measure case as described on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct CaseDescription {
    /// Case name; defaults to the description file path
    #[serde(default)]
    pub name: Option<String>,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Sample count per measured phase
    #[serde(default = "default_round")]
    pub round: usize,
    /// Result transform selector
    #[serde(default = "default_result")]
    pub result: String,
    /// Unit label attached to reported values
    #[serde(default = "default_unit")]
    pub unit: String,
    /// Runs once before measurement
    pub setup: ActionDesc,
    /// Runs once after measurement, whatever happened
    pub teardown: ActionDesc,
    /// Control action whose cost is subtracted from the test action
    pub adjust: ActionDesc,
    /// Measured action
    pub test: ActionDesc,
}

fn default_round() -> usize {
    10
}

fn default_result() -> String {
    "reciprocal".to_owned()
}

fn default_unit() -> String {
    "INS/S".to_owned()
}

/// Load one case description file.
pub fn load_case(path: &Path) -> Result<MeasureCase> {
    debug!(path = %path.display(), "loading case description");
    let text = fs::read_to_string(path)?;
    let description: CaseDescription = serde_json::from_str(&text)?;
    MeasureCase::from_description(path, description)
}

/// Discover case description files (`*.json`) under a directory,
/// recursively. Paths are sorted so discovery order is stable.
pub fn discover_cases(dir: &Path) -> Result<Vec<MeasureCase>> {
    let mut files = Vec::new();
    collect_json_files(dir, &mut files)?;
    files.sort();
    files.iter().map(|path| load_case(path)).collect()
}

fn collect_json_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_json_files(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_description_defaults() {
        let description: CaseDescription = serde_json::from_str(
            r#"{
                "setup": "Reset",
                "teardown": "Reset",
                "adjust": "Select a000000151000000",
                "test": ["Select a000000151000000", "Reset"]
            }"#,
        )
        .unwrap();

        assert_eq!(description.round, 10);
        assert_eq!(description.result, "reciprocal");
        assert_eq!(description.unit, "INS/S");
        assert!(description.name.is_none());

        let case = MeasureCase::from_description(Path::new("cases/select.json"), description)
            .unwrap();
        assert_eq!(case.name, "cases/select.json");
    }

    #[test]
    fn test_unknown_action_rejected_at_load() {
        let description: CaseDescription = serde_json::from_str(
            r#"{
                "setup": "Reset",
                "teardown": "Reset",
                "adjust": "Frobnicate 1234",
                "test": "Reset"
            }"#,
        )
        .unwrap();

        let result = MeasureCase::from_description(Path::new("case.json"), description);
        assert!(matches!(result, Err(Error::UnknownAction(_))));
    }
}
