use std::path::Path;

use serde::Serialize;

use crate::comment::Comment;
use crate::config::Policy;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pass,
    Fail,
}

/// Final output of the review path. Immutable once constructed.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewReport {
    pub status: ReportStatus,
    pub blocking: bool,
    pub suitability_pass: bool,
    pub summary: String,
    pub details: String,
    pub comments: Vec<Comment>,
    pub changed_files: Vec<String>,
    pub timestamp: String,
    pub policy: Policy,
}

impl ReviewReport {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        status: ReportStatus,
        blocking: bool,
        suitability_pass: bool,
        summary: String,
        details: String,
        comments: Vec<Comment>,
        changed_files: Vec<String>,
        policy: Policy,
    ) -> Self {
        Self {
            status,
            blocking,
            suitability_pass,
            summary,
            details,
            comments,
            changed_files,
            timestamp: chrono::Utc::now().to_rfc3339(),
            policy,
        }
    }
}

/// Final output of the autofix path.
#[derive(Debug, Clone, Serialize)]
pub struct AutofixReport {
    pub applied: bool,
    pub change_summary: String,
    pub files_changed: Vec<String>,
    pub branch_name: String,
    pub pr_title: String,
    pub attempts_used: u32,
}

/// Write a report as pretty JSON.
pub fn write_json<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| Error::Report(format!("failed to serialize report: {e}")))?;
    std::fs::write(path, json)
        .map_err(|e| Error::Report(format!("failed to write {}: {e}", path.display())))?;
    Ok(())
}
