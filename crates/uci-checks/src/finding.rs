//! Vulnerability findings reported by the scanner.

use serde::{Deserialize, Serialize};

/// One vulnerable package version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Package name as written in the manifest.
    pub package: String,

    /// Resolved version.
    pub version: String,

    /// Advisory identifier (CVE, GHSA, ...).
    pub vulnerability_id: String,

    #[serde(default)]
    pub severity: String,

    #[serde(default)]
    pub title: String,

    /// First non-vulnerable version, when one exists.
    #[serde(default)]
    pub fixed_version: Option<String>,
}

impl Finding {
    /// Markdown table header, including the separator line.
    pub fn table_header(&self) -> String {
        "| Package | Version | Vulnerability | Severity | Title | Fixed in |\n\
         |---------|---------|---------------|----------|-------|----------|\n"
            .to_string()
    }

    /// One Markdown table row, newline-terminated.
    pub fn table_row(&self) -> String {
        format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            cell(&self.package),
            cell(&self.version),
            cell(&self.vulnerability_id),
            cell(&self.severity),
            cell(&self.title),
            cell(self.fixed_version.as_deref().unwrap_or("-")),
        )
    }
}

/// Keep a value on one table cell.
fn cell(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        return "-".to_string();
    }
    value.replace('|', "\\|").replace(['\r', '\n'], " ")
}

/// Render `header(findings[0])` followed by every row, or `None` when empty.
pub fn render_table(findings: &[Finding]) -> Option<String> {
    let first = findings.first()?;
    let mut table = first.table_header();
    for finding in findings {
        table.push_str(&finding.table_row());
    }
    Some(table)
}
