use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use crate::agent::{
    REVIEW_INSTRUCTIONS, SuggestionSource, TaskRequest, build_review_payload,
};
use crate::comment::{Comment, normalize_comments};
use crate::config::{AgentsFile, MAX_FILE_BYTES, Policy};
use crate::gitio;
use crate::markers;
use crate::report::{ReportStatus, ReviewReport};
use crate::severity::Severity;

/// The change under review: resolved scope plus the tree it lives in.
#[derive(Debug, Clone)]
pub struct ChangeScope {
    pub root: PathBuf,
    pub changed_files: Vec<String>,
    pub diff_text: String,
}

impl ChangeScope {
    /// Resolve review scope from two SHAs. An empty diff scope falls back
    /// to every allowed-extension file in the tree; suitability reflects
    /// whether anything at all was found.
    pub fn resolve(root: PathBuf, base_sha: &str, head_sha: &str, policy: &Policy) -> Self {
        let mut changed_files = gitio::changed_files(&root, base_sha, head_sha);
        if changed_files.is_empty() {
            changed_files = markers::eligible_files(&root, &policy.autofix.allowed_extensions)
                .iter()
                .filter_map(|p| p.strip_prefix(&root).ok())
                .map(|p| p.to_string_lossy().to_string())
                .collect();
        }
        let diff_text = gitio::diff_text(&root, base_sha, head_sha, policy.review.max_diff_chars);
        Self {
            root,
            changed_files,
            diff_text,
        }
    }
}

/// Review run phases, in order. Terminal phase is `Decided`; the report
/// is immutable from that point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Collecting,
    Aggregating,
    Summarizing,
    Decided,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Collecting => write!(f, "collecting"),
            Phase::Aggregating => write!(f, "aggregating"),
            Phase::Summarizing => write!(f, "summarizing"),
            Phase::Decided => write!(f, "decided"),
        }
    }
}

const SUMMARY_AGENT: &str = "SummaryAgent";

#[derive(Debug, Default)]
struct Collected {
    comments: Vec<Comment>,
    details: Vec<String>,
    agent_blocking: bool,
}

pub struct ReviewEngine<'a, S> {
    policy: &'a Policy,
    agents: &'a AgentsFile,
    source: Option<&'a S>,
}

impl<'a, S: SuggestionSource> ReviewEngine<'a, S> {
    pub fn new(policy: &'a Policy, agents: &'a AgentsFile, source: Option<&'a S>) -> Self {
        Self {
            policy,
            agents,
            source,
        }
    }

    /// Drive a full review run over the given scope and produce the report.
    pub fn run(&self, scope: &ChangeScope) -> ReviewReport {
        let suitability_pass = !scope.changed_files.is_empty();

        info!(phase = %Phase::Collecting, files = scope.changed_files.len(), "review starting");
        let collected = self.collect(scope);

        // The AI path counts as having run if it produced anything at all;
        // otherwise fall back to deterministic marker/heuristic detection.
        let heuristic = collected.comments.is_empty() && collected.details.is_empty();
        let (raw_comments, details_lines, agent_blocking) = if heuristic {
            info!("no agent findings, falling back to heuristic detection");
            (detect_issues(scope), Vec::new(), false)
        } else {
            (
                collected.comments,
                collected.details,
                collected.agent_blocking,
            )
        };

        info!(phase = %Phase::Aggregating, raw = raw_comments.len(), "aggregating findings");
        let comments = crate::comment::dedupe_comments(
            &raw_comments,
            &self.policy.review.severity_rank,
            self.policy.review.max_comments_total,
            self.policy.review.max_comments_per_file,
        );

        info!(phase = %Phase::Summarizing, kept = comments.len(), "building summary");
        let mut details_lines = details_lines;
        let ai_summary = if heuristic {
            None
        } else {
            self.summarize(scope, &comments, &details_lines)
        };
        if let Some(ref summary) = ai_summary {
            details_lines.push(format!("[{SUMMARY_AGENT}] {summary}"));
        }

        // Blocking decision: explicit agent signal, OR a surviving blocking
        // comment (from a blocking-listed agent on the AI path), OR a
        // failed suitability precondition. All three force a fail.
        let comment_blocking = comments.iter().any(|c| {
            c.severity == Severity::Blocking
                && (heuristic || self.policy.review.blocking_agents.contains(&c.agent))
        });
        let blocking = agent_blocking || comment_blocking || !suitability_pass;

        let summary =
            ai_summary.unwrap_or_else(|| build_summary(&comments, suitability_pass));
        let details = if details_lines.is_empty() {
            format_details(&comments)
        } else {
            details_lines
                .iter()
                .map(|d| format!("- {d}"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        info!(phase = %Phase::Decided, blocking, "review decided");
        ReviewReport::new(
            if blocking {
                ReportStatus::Fail
            } else {
                ReportStatus::Pass
            },
            blocking,
            suitability_pass,
            summary,
            details,
            comments,
            scope.changed_files.clone(),
            self.policy.clone(),
        )
    }

    /// Query each configured agent in declared order, one at a time.
    /// Unreachable or erroring agents are skipped, never fatal.
    fn collect(&self, scope: &ChangeScope) -> Collected {
        let mut collected = Collected::default();
        let Some(source) = self.source else {
            return collected;
        };

        for agent_name in &self.policy.review.agents_order {
            if agent_name == SUMMARY_AGENT {
                continue;
            }
            let Some(spec) = self.agents.agents.get(agent_name) else {
                continue;
            };

            let request = TaskRequest {
                model: self.policy.ai.review_model.clone(),
                instructions: REVIEW_INSTRUCTIONS,
                payload: build_review_payload(
                    agent_name,
                    spec,
                    &scope.changed_files,
                    &scope.diff_text,
                    None,
                ),
            };
            let Some(result) = source.request(&request) else {
                warn!(agent = %agent_name, "agent returned no result, skipping");
                continue;
            };

            // Records that did not name their producer keep the UnknownAgent
            // default; that sentinel is never in blocking_agents
            collected.comments.extend(normalize_comments(&result.comments));

            if let Some(summary) = result.summary.filter(|s| !s.is_empty()) {
                collected.details.push(format!("[{agent_name}] {summary}"));
            }
            if result.blocking && self.policy.review.blocking_agents.contains(agent_name) {
                collected.agent_blocking = true;
            }
        }

        collected
    }

    /// Ask the summary meta-agent for a prose summary of the aggregated
    /// comment set. Absence or failure is fine; the caller synthesizes a
    /// deterministic summary from the counts instead.
    fn summarize(
        &self,
        scope: &ChangeScope,
        comments: &[Comment],
        details: &[String],
    ) -> Option<String> {
        if !self
            .policy
            .review
            .agents_order
            .iter()
            .any(|a| a == SUMMARY_AGENT)
        {
            return None;
        }
        let source = self.source?;
        let spec = self.agents.agents.get(SUMMARY_AGENT)?;

        let aggregated = serde_json::json!({
            "comments": comments,
            "details": details,
        });
        let request = TaskRequest {
            model: self.policy.ai.review_model.clone(),
            instructions: REVIEW_INSTRUCTIONS,
            payload: build_review_payload(
                SUMMARY_AGENT,
                spec,
                &scope.changed_files,
                &scope.diff_text,
                Some(aggregated),
            ),
        };
        source
            .request(&request)
            .and_then(|r| r.summary)
            .filter(|s| !s.is_empty())
    }
}

static AUTH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bauth\b|\bpermission\b|\bjwt\b").expect("static regex")
});

/// Deterministic issue detection over the changed files, used when no
/// agent produced anything. Marker hits, long lines, and auth-adjacent
/// content map to fixed agents and severities.
pub fn detect_issues(scope: &ChangeScope) -> Vec<Comment> {
    let mut comments = Vec::new();

    for file in &scope.changed_files {
        let lines = markers::read_file_lines(&scope.root.join(file), MAX_FILE_BYTES);
        if lines.is_empty() {
            continue;
        }

        for marker in [markers::TODO_SECURITY, markers::FIXME_SECURITY] {
            for line in markers::find_marker_lines(&lines, marker) {
                comments.push(Comment::new(
                    file.clone(),
                    line,
                    "SecurityAgent",
                    Severity::Blocking,
                    "security TODO/FIXME marker found",
                ));
            }
        }

        for marker in [markers::TODO_AUTOFIX, markers::FIXME_AUTOFIX] {
            for line in markers::find_marker_lines(&lines, marker) {
                comments.push(Comment::new(
                    file.clone(),
                    line,
                    "BugRiskAgent",
                    Severity::Blocking,
                    "autofix marker (AUTOFIX) found",
                ));
            }
        }

        for line in markers::find_marker_lines(&lines, markers::NPLUS1) {
            comments.push(Comment::new(
                file.clone(),
                line,
                "PerformanceAgent",
                Severity::Warn,
                "possible N+1 marker (NPLUS1) found",
            ));
        }

        let long_lines: Vec<u32> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.chars().count() > 120)
            .map(|(idx, _)| (idx + 1) as u32)
            .collect();
        for line in long_lines.into_iter().take(5) {
            comments.push(Comment::new(
                file.clone(),
                line,
                "StyleAgent",
                Severity::Info,
                "line exceeds 120 characters",
            ));
        }

        if AUTH_PATTERN.is_match(&lines.join(" ")) {
            comments.push(Comment::new(
                file.clone(),
                1,
                "SecurityAgent",
                Severity::Warn,
                "authentication/authorization related change detected",
            ));
        }
    }

    comments
}

/// Deterministic summary synthesized from the ranked comment counts.
pub fn build_summary(comments: &[Comment], suitability_pass: bool) -> String {
    if !suitability_pass {
        return "automated review: no changed files".to_string();
    }
    if comments.is_empty() {
        return "automated review: no issues found".to_string();
    }
    let blocking = comments
        .iter()
        .filter(|c| c.severity == Severity::Blocking)
        .count();
    let warn = comments
        .iter()
        .filter(|c| c.severity == Severity::Warn)
        .count();
    let info = comments
        .iter()
        .filter(|c| c.severity == Severity::Info)
        .count();
    format!("automated review: blocking {blocking} / warn {warn} / info {info}")
}

pub fn format_details(comments: &[Comment]) -> String {
    if comments.is_empty() {
        return "- no issues".to_string();
    }
    comments
        .iter()
        .map(|c| {
            format!(
                "- [{}] {}:{} ({}) {}",
                c.agent, c.path, c.line, c.severity, c.message
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
