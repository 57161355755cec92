//! Check-run vocabulary shared by the pipeline and provider adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The pull request a check is reported against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

/// The revision under examination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRef {
    pub owner: String,
    pub repo: String,
    pub head_sha: String,
}

impl CheckRef {
    /// Project name under which manifests are submitted to the scanner.
    pub fn project_name(&self) -> &str {
        &self.repo
    }
}

/// A check run as created on the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckRun {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Success,
    Failure,
}

impl Conclusion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Conclusion::Success => "success",
            Conclusion::Failure => "failure",
        }
    }
}

impl std::fmt::Display for Conclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A line-level note attached to a check run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
    /// `notice`, `warning` or `failure`
    pub annotation_level: String,
    pub message: String,
}

/// Final state published on a check run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRunUpdate {
    pub name: String,
    pub conclusion: Conclusion,
    pub completed_at: DateTime<Utc>,
    pub summary: String,
    pub body: String,
    pub annotations: Vec<Annotation>,
}
