use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::agent::{AUTOFIX_INSTRUCTIONS, SuggestionSource, TaskRequest, build_autofix_payload};
use crate::config::Policy;
use crate::gitio;
use crate::markers;
use crate::report::AutofixReport;
use crate::review::ChangeScope;

/// One concrete modification made to the working tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixChange {
    pub path: String,
    pub reason: String,
}

/// A candidate patch in the retry loop. The touched-path set is derived
/// from the diff headers, never declared. A candidate is accepted in full
/// or discarded in full.
#[derive(Debug, Clone)]
pub struct PatchCandidate {
    pub patch: String,
    pub touched: BTreeSet<String>,
    pub attempt: u32,
}

impl PatchCandidate {
    pub fn new(patch: String, attempt: u32) -> Self {
        let touched = gitio::patch_paths(&patch);
        Self {
            patch,
            touched,
            attempt,
        }
    }
}

/// Outcome of a single autofix attempt.
#[derive(Debug)]
enum AttemptOutcome {
    Applied(Vec<FixChange>),
    NoResult,
    Rejected(&'static str),
    ApplyFailed,
}

/// Identifiers woven into the generated branch name.
#[derive(Debug, Clone, Default)]
pub struct RunIds {
    pub pr_number: String,
    pub run_id: String,
}

/// Resolve the autofix working scope: every allowed-extension file in the
/// tree, plus the uncommitted diff against HEAD.
pub fn autofix_scope(root: &Path, policy: &Policy) -> ChangeScope {
    let changed_files = markers::eligible_files(root, &policy.autofix.allowed_extensions)
        .iter()
        .filter_map(|p| p.strip_prefix(root).ok())
        .map(|p| p.to_string_lossy().to_string())
        .collect();
    let diff_text = gitio::working_tree_diff(root, policy.review.max_diff_chars);
    ChangeScope {
        root: root.to_path_buf(),
        changed_files,
        diff_text,
    }
}

pub struct AutofixEngine<'a, S> {
    policy: &'a Policy,
    source: Option<&'a S>,
}

impl<'a, S: SuggestionSource> AutofixEngine<'a, S> {
    pub fn new(policy: &'a Policy, source: Option<&'a S>) -> Self {
        Self { policy, source }
    }

    /// Drive the bounded retry loop, then the fallback marker rewrite.
    ///
    /// Exhausting every attempt with zero fallback hits is a normal
    /// terminal outcome (`applied = false`), not an error.
    pub async fn run(&self, scope: &ChangeScope, ids: &RunIds) -> AutofixReport {
        let max_attempts = self.policy.autofix.max_attempts;
        let backoff = Duration::from_secs(self.policy.autofix.retry_backoff_secs);

        let mut changes: Vec<FixChange> = Vec::new();
        let mut attempts_used = 0;

        for attempt in 1..=max_attempts {
            attempts_used = attempt;
            match self.attempt(scope, attempt) {
                AttemptOutcome::Applied(applied) => {
                    info!(attempt, files = applied.len(), "patch applied");
                    changes = applied;
                    break;
                }
                AttemptOutcome::NoResult => {
                    info!(attempt, "no patch candidate from source");
                }
                AttemptOutcome::Rejected(reason) => {
                    info!(attempt, reason, "patch candidate rejected");
                }
                AttemptOutcome::ApplyFailed => {
                    // Dry-run passed but apply did not; tree may have moved
                    warn!(attempt, "apply failed after clean dry-run, retrying");
                }
            }
            if attempt < max_attempts {
                tokio::time::sleep(backoff).await;
            }
        }

        if changes.is_empty() {
            changes = fallback_rewrite(&scope.root, self.policy);
        }

        let applied = !changes.is_empty();
        let change_summary = summarize_changes(&changes);
        let branch_name = format!(
            "{}-{}-{}",
            self.policy.autofix.branch_prefix, ids.pr_number, ids.run_id
        );
        let pr_title = self
            .policy
            .autofix
            .pr_title_template
            .replace("{change_summary}", &change_summary);

        AutofixReport {
            applied,
            change_summary,
            files_changed: changes.into_iter().map(|c| c.path).collect(),
            branch_name,
            pr_title,
            attempts_used,
        }
    }

    /// One pass of: request candidate → validate shape/size/scope →
    /// dry-run → atomic apply.
    fn attempt(&self, scope: &ChangeScope, attempt: u32) -> AttemptOutcome {
        let Some(source) = self.source else {
            return AttemptOutcome::NoResult;
        };

        let request = TaskRequest {
            model: self.policy.ai.autofix_model.clone(),
            instructions: AUTOFIX_INSTRUCTIONS,
            payload: build_autofix_payload(&scope.changed_files, &scope.diff_text),
        };
        let Some(result) = source.request(&request) else {
            return AttemptOutcome::NoResult;
        };

        let patch = result.apply_patch.unwrap_or_default();
        if patch.trim().is_empty() {
            return AttemptOutcome::Rejected("empty patch");
        }
        if patch.chars().count() > self.policy.autofix.max_patch_chars {
            return AttemptOutcome::Rejected("patch exceeds size limit");
        }

        let candidate = PatchCandidate::new(patch, attempt);
        if candidate.touched.is_empty() {
            return AttemptOutcome::Rejected("patch touches no files");
        }
        if !candidate
            .touched
            .iter()
            .all(|p| gitio::has_allowed_extension(p, &self.policy.autofix.allowed_extensions))
        {
            return AttemptOutcome::Rejected("patch touches disallowed file types");
        }

        if !gitio::check_patch(&scope.root, &candidate.patch) {
            return AttemptOutcome::Rejected("dry-run failed");
        }
        if !gitio::apply_patch(&scope.root, &candidate.patch) {
            return AttemptOutcome::ApplyFailed;
        }

        let paths = result
            .files_changed
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| candidate.touched.iter().cloned().collect());
        AttemptOutcome::Applied(
            paths
                .into_iter()
                .map(|path| FixChange {
                    path,
                    reason: "AI patch".to_string(),
                })
                .collect(),
        )
    }
}

/// Deterministic fallback: rewrite remediation markers in every eligible
/// file, one FixChange per changed file. Never fails; may find nothing.
pub fn fallback_rewrite(root: &Path, policy: &Policy) -> Vec<FixChange> {
    let mut changes = Vec::new();
    for path in markers::eligible_files(root, &policy.autofix.allowed_extensions) {
        if markers::rewrite_file(&path) {
            let relative = path
                .strip_prefix(root)
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|_| path.to_string_lossy().to_string());
            changes.push(FixChange {
                path: relative,
                reason: "marker substitution".to_string(),
            });
        }
    }
    changes
}

fn summarize_changes(changes: &[FixChange]) -> String {
    if changes.is_empty() {
        return "no changes".to_string();
    }
    changes
        .iter()
        .take(3)
        .map(|c| c.path.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}
