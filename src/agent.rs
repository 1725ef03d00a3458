use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::config::{AgentSpecConfig, AiPolicy};

const OPENAI_RESPONSES_URL: &str = "https://api.openai.com/v1/responses";

pub const REVIEW_INSTRUCTIONS: &str = "You are an expert code reviewer. Return JSON only.";
pub const AUTOFIX_INSTRUCTIONS: &str = "You are a code-fixing agent. Return JSON only.";

/// One unit of work handed to a suggestion source: the prompt payload plus
/// the model and system instructions to run it with.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub model: String,
    pub instructions: &'static str,
    pub payload: serde_json::Value,
}

/// Structured result from a suggestion source. Every field is optional on
/// the wire; absent fields take defaults so partial responses still parse.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SuggestionResult {
    #[serde(default)]
    pub comments: Vec<serde_json::Value>,
    #[serde(default)]
    pub blocking: bool,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub apply_patch: Option<String>,
    #[serde(default)]
    pub change_summary: Option<String>,
    #[serde(default)]
    pub files_changed: Option<Vec<String>>,
}

/// Opaque producer of review findings and patch candidates.
///
/// `None` means "no usable result" (timeout, auth failure, malformed
/// output) and is never fatal: the review path skips the agent, the
/// autofix path burns an attempt.
pub trait SuggestionSource {
    fn request(&self, request: &TaskRequest) -> Option<SuggestionResult>;
}

/// Build the prompt payload for a review agent.
pub fn build_review_payload(
    agent_name: &str,
    spec: &AgentSpecConfig,
    changed_files: &[String],
    diff_text: &str,
    aggregated: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut payload = json!({
        "agent": agent_name,
        "purpose": spec.purpose,
        "instructions": spec.prompt,
        "checks": spec.checks,
        "severity_guidelines": spec.severity_guidelines,
        "expected_output": spec.schema,
        "changed_files": changed_files,
        "diff": diff_text,
    });
    if let Some(aggregated) = aggregated {
        payload["aggregated"] = aggregated;
    }
    payload
}

/// Build the prompt payload for patch generation.
pub fn build_autofix_payload(changed_files: &[String], diff_text: &str) -> serde_json::Value {
    json!({
        "task": "fix defects and vulnerabilities in the PR changes",
        "constraints": [
            "produce the patch as a unified diff",
            "modify only the changed files",
            "no sweeping refactors",
        ],
        "expected_output": {
            "apply_patch": "unified diff string",
            "change_summary": "string",
            "files_changed": "array of strings",
        },
        "changed_files": changed_files,
        "diff": diff_text,
    })
}

/// Optional organization/project scoping for the OpenAI API.
#[derive(Debug, Clone, Default)]
pub struct OpenAiCredentials {
    pub api_key: String,
    pub organization: Option<String>,
    pub project: Option<String>,
}

/// Suggestion source backed by the OpenAI responses API.
pub struct OpenAiSource {
    credentials: OpenAiCredentials,
    temperature: f64,
    max_output_tokens: u32,
    timeout: Duration,
}

impl OpenAiSource {
    pub fn new(credentials: OpenAiCredentials, ai: &AiPolicy) -> Self {
        Self {
            credentials,
            temperature: ai.temperature,
            max_output_tokens: ai.max_output_tokens,
            timeout: Duration::from_secs(ai.request_timeout_secs),
        }
    }
}

impl SuggestionSource for OpenAiSource {
    fn request(&self, request: &TaskRequest) -> Option<SuggestionResult> {
        let body = json!({
            "model": request.model,
            "input": request.payload.to_string(),
            "instructions": request.instructions,
            "temperature": self.temperature,
            "max_output_tokens": self.max_output_tokens,
            "store": false,
        });

        let mut req = ureq::post(OPENAI_RESPONSES_URL)
            .timeout(self.timeout)
            .set(
                "Authorization",
                &format!("Bearer {}", self.credentials.api_key),
            )
            .set("Content-Type", "application/json");
        if let Some(ref org) = self.credentials.organization {
            req = req.set("OpenAI-Organization", org);
        }
        if let Some(ref project) = self.credentials.project {
            req = req.set("OpenAI-Project", project);
        }

        let response = match req.send_json(&body) {
            Ok(r) => r,
            Err(e) => {
                warn!(model = %request.model, error = %e, "suggestion request failed");
                return None;
            }
        };

        let data: serde_json::Value = match response.into_json() {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "suggestion response was not JSON");
                return None;
            }
        };

        let text = extract_output_text(&data);
        parse_result_from_text(&text)
    }
}

/// Collect `output_text` content items from an OpenAI responses payload.
pub fn extract_output_text(response: &serde_json::Value) -> String {
    let mut texts: Vec<&str> = Vec::new();
    if let Some(output) = response.get("output").and_then(|v| v.as_array()) {
        for item in output {
            if item.get("type").and_then(|v| v.as_str()) != Some("message") {
                continue;
            }
            if let Some(content) = item.get("content").and_then(|v| v.as_array()) {
                for part in content {
                    if part.get("type").and_then(|v| v.as_str()) == Some("output_text")
                        && let Some(text) = part.get("text").and_then(|v| v.as_str())
                        && !text.is_empty()
                    {
                        texts.push(text);
                    }
                }
            }
        }
    }
    texts.join("\n")
}

static JSON_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[\s\S]*\}").expect("static regex"));

/// Recover a structured result from model output text.
///
/// Tries direct JSON first (after stripping markdown fences), then falls
/// back to the first `{...}` block in the text. Anything else is `None`.
pub fn parse_result_from_text(text: &str) -> Option<SuggestionResult> {
    let candidate = strip_markdown_fences(text);
    if let Ok(result) = serde_json::from_str(&candidate) {
        return Some(result);
    }

    let block = JSON_BLOCK.find(&candidate)?;
    serde_json::from_str(block.as_str()).ok()
}

/// Remove markdown code fences, returning the inner content.
/// Handles ` ```json `, ` ``` `, and bare text.
fn strip_markdown_fences(input: &str) -> String {
    let trimmed = input.trim();

    if let Some(rest) = trimmed.strip_prefix("```") {
        let after_tag = match rest.find('\n') {
            Some(pos) => &rest[pos + 1..],
            None => return String::new(),
        };
        if let Some(pos) = after_tag.rfind("```") {
            return after_tag[..pos].trim().to_string();
        }
        return after_tag.trim().to_string();
    }

    trimmed.to_string()
}
