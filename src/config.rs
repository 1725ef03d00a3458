use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::severity::SeverityRank;

pub const DEFAULT_MAX_DIFF_CHARS: usize = 200_000;
pub const MAX_FILE_BYTES: u64 = 1_000_000;

/// Raw policy file: every field optional so partial files work.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PolicyFile {
    #[serde(default)]
    pub review: ReviewSection,
    #[serde(default)]
    pub autofix: AutofixSection,
    #[serde(default)]
    pub ai: AiSection,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReviewSection {
    pub agents_order: Option<Vec<String>>,
    pub blocking_agents: Option<Vec<String>>,
    pub severity_rank: Option<HashMap<String, u32>>,
    pub max_comments_total: Option<usize>,
    pub max_comments_per_file: Option<usize>,
    pub max_diff_chars: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AutofixSection {
    pub branch_prefix: Option<String>,
    pub pr_title_template: Option<String>,
    pub max_attempts: Option<u32>,
    pub allowed_extensions: Option<Vec<String>>,
    pub max_patch_chars: Option<usize>,
    pub retry_backoff_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AiSection {
    pub review_model: Option<String>,
    pub autofix_model: Option<String>,
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<u32>,
    pub request_timeout_secs: Option<u64>,
}

/// Resolved policy, echoed verbatim into the review report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Policy {
    pub review: ReviewPolicy,
    pub autofix: AutofixPolicy,
    pub ai: AiPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewPolicy {
    pub agents_order: Vec<String>,
    pub blocking_agents: Vec<String>,
    pub severity_rank: SeverityRank,
    pub max_comments_total: usize,
    pub max_comments_per_file: usize,
    pub max_diff_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutofixPolicy {
    pub branch_prefix: String,
    pub pr_title_template: String,
    pub max_attempts: u32,
    pub allowed_extensions: Vec<String>,
    pub max_patch_chars: usize,
    pub retry_backoff_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AiPolicy {
    pub review_model: String,
    pub autofix_model: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for Policy {
    fn default() -> Self {
        resolve(PolicyFile::default())
    }
}

impl Policy {
    /// Load and resolve the policy. A missing file yields the built-in
    /// defaults; an unreadable or invalid file is a hard error (the only
    /// fatal failure class in the pipeline).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Policy::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let file = parse_policy(&content)?;
        Ok(resolve(file))
    }
}

pub fn parse_policy(content: &str) -> Result<PolicyFile> {
    let file: PolicyFile = toml::from_str(content)?;
    validate(&file)?;
    Ok(file)
}

fn validate(file: &PolicyFile) -> Result<()> {
    if let Some(n) = file.review.max_comments_total
        && n == 0
    {
        return Err(Error::ConfigValidation(
            "review.max_comments_total must be > 0".to_string(),
        ));
    }
    if let Some(n) = file.review.max_comments_per_file
        && n == 0
    {
        return Err(Error::ConfigValidation(
            "review.max_comments_per_file must be > 0".to_string(),
        ));
    }
    if let Some(ref rank) = file.review.severity_rank {
        for (label, weight) in rank {
            if !matches!(label.as_str(), "blocking" | "warn" | "info") {
                return Err(Error::ConfigValidation(format!(
                    "unknown severity label in review.severity_rank: {label} \
                     (expected: blocking, warn, info)"
                )));
            }
            if *weight == 0 {
                return Err(Error::ConfigValidation(format!(
                    "review.severity_rank.{label} must be > 0"
                )));
            }
        }
    }
    if let Some(n) = file.autofix.max_attempts
        && n == 0
    {
        return Err(Error::ConfigValidation(
            "autofix.max_attempts must be > 0".to_string(),
        ));
    }
    if let Some(ref exts) = file.autofix.allowed_extensions {
        for ext in exts {
            if !ext.starts_with('.') {
                return Err(Error::ConfigValidation(format!(
                    "autofix.allowed_extensions entries must start with '.': {ext}"
                )));
            }
        }
    }
    Ok(())
}

fn resolve(file: PolicyFile) -> Policy {
    Policy {
        review: ReviewPolicy {
            agents_order: file.review.agents_order.unwrap_or_else(|| {
                vec![
                    "SecurityAgent".to_string(),
                    "BugRiskAgent".to_string(),
                    "PerformanceAgent".to_string(),
                    "StyleAgent".to_string(),
                    "SummaryAgent".to_string(),
                ]
            }),
            blocking_agents: file
                .review
                .blocking_agents
                .unwrap_or_else(|| vec!["SecurityAgent".to_string(), "BugRiskAgent".to_string()]),
            severity_rank: file
                .review
                .severity_rank
                .map(SeverityRank::new)
                .unwrap_or_default(),
            max_comments_total: file.review.max_comments_total.unwrap_or(50),
            max_comments_per_file: file.review.max_comments_per_file.unwrap_or(8),
            max_diff_chars: file.review.max_diff_chars.unwrap_or(DEFAULT_MAX_DIFF_CHARS),
        },
        autofix: AutofixPolicy {
            branch_prefix: file
                .autofix
                .branch_prefix
                .unwrap_or_else(|| "auto/fix".to_string()),
            pr_title_template: file
                .autofix
                .pr_title_template
                .unwrap_or_else(|| "AI:feat {change_summary}".to_string()),
            max_attempts: file.autofix.max_attempts.unwrap_or(3),
            allowed_extensions: file
                .autofix
                .allowed_extensions
                .unwrap_or_else(|| vec![".py".to_string()]),
            max_patch_chars: file
                .autofix
                .max_patch_chars
                .unwrap_or(DEFAULT_MAX_DIFF_CHARS),
            retry_backoff_secs: file.autofix.retry_backoff_secs.unwrap_or(2),
        },
        ai: AiPolicy {
            review_model: file
                .ai
                .review_model
                .unwrap_or_else(|| "gpt-4.1".to_string()),
            autofix_model: file
                .ai
                .autofix_model
                .unwrap_or_else(|| "gpt-4.1".to_string()),
            temperature: file.ai.temperature.unwrap_or(0.2),
            max_output_tokens: file.ai.max_output_tokens.unwrap_or(1200),
            request_timeout_secs: file.ai.request_timeout_secs.unwrap_or(120),
        },
    }
}

/// Agent specification file: `[agents.<Name>]` tables.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct AgentsFile {
    #[serde(default)]
    pub agents: HashMap<String, AgentSpecConfig>,
}

/// Static configuration for one review agent. Consumed uniformly by the
/// review engine; whether its blocking signal counts is decided by the
/// policy's `blocking_agents` allow-list, not stored here.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Serialize)]
pub struct AgentSpecConfig {
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub checks: Vec<String>,
    #[serde(default)]
    pub severity_guidelines: HashMap<String, String>,
    #[serde(default)]
    pub schema: HashMap<String, String>,
}

impl AgentsFile {
    /// Load agent specs. Missing file → no agents (the review engine then
    /// degrades to heuristic detection); invalid file → hard error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(AgentsFile::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }
}
