use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::severity::{Severity, SeverityRank};

/// Sentinel line used when a finding has no specific line.
pub const LINE_SENTINEL: u32 = 1;

/// Agent tag assigned to records that did not name their producer.
pub const UNKNOWN_AGENT: &str = "UnknownAgent";

/// A single review finding. Identity for merging is `(path, line, message)`;
/// the producing agent is informational and does not split findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub path: String,
    pub line: u32,
    pub agent: String,
    pub severity: Severity,
    pub message: String,
}

impl Comment {
    pub fn new(
        path: impl Into<String>,
        line: u32,
        agent: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            line: line.max(LINE_SENTINEL),
            agent: agent.into(),
            severity,
            message: message.into(),
        }
    }

    /// Coerce a loosely-typed record into a well-formed comment.
    ///
    /// Missing fields take defaults; a record that is not an object, or
    /// whose `line` is present but not coercible to an integer (including
    /// an explicit `null`), is dropped (`None`). Float lines truncate
    /// toward zero. Coerced lines below 1 clamp to the line-1 sentinel.
    pub fn from_raw(raw: &serde_json::Value) -> Option<Self> {
        let obj = raw.as_object()?;

        let line = match obj.get("line") {
            None => i64::from(LINE_SENTINEL),
            Some(v) => coerce_line(v)?,
        };

        let severity = obj
            .get("level")
            .and_then(|v| v.as_str())
            .map(Severity::normalize)
            .unwrap_or(Severity::Info);

        Some(Comment::new(
            field_str(obj, "path", ""),
            u32::try_from(line.max(i64::from(LINE_SENTINEL))).unwrap_or(u32::MAX),
            field_str(obj, "agent", UNKNOWN_AGENT),
            severity,
            field_str(obj, "body", ""),
        ))
    }

    fn merge_key(&self) -> (String, u32, String) {
        (self.path.clone(), self.line, self.message.clone())
    }
}

fn field_str(obj: &serde_json::Map<String, serde_json::Value>, key: &str, default: &str) -> String {
    match obj.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => default.to_string(),
        Some(other) => other.to_string(),
    }
}

fn coerce_line(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Normalize a batch of raw records, silently dropping malformed ones.
pub fn normalize_comments(raw: &[serde_json::Value]) -> Vec<Comment> {
    raw.iter().filter_map(Comment::from_raw).collect()
}

/// Merge duplicate findings, rank by severity, and truncate to caps.
///
/// Duplicates share `(path, line, message)`; the survivor keeps the
/// first-seen record's fields with its severity escalated to the group
/// maximum (by `rank` weight). Survivors are sorted by weight descending
/// with a stable sort, so equal-severity comments keep first-seen order.
/// The walk then emits at most `max_total` comments overall and
/// `max_per_file` per path; a capped path is skipped, not a stop.
pub fn dedupe_comments(
    comments: &[Comment],
    rank: &SeverityRank,
    max_total: usize,
    max_per_file: usize,
) -> Vec<Comment> {
    let mut merged: Vec<Comment> = Vec::new();
    let mut index: HashMap<(String, u32, String), usize> = HashMap::new();

    for comment in comments {
        match index.get(&comment.merge_key()) {
            Some(&i) => {
                if rank.weight(comment.severity) > rank.weight(merged[i].severity) {
                    merged[i].severity = comment.severity;
                }
            }
            None => {
                index.insert(comment.merge_key(), merged.len());
                merged.push(comment.clone());
            }
        }
    }

    merged.sort_by_key(|c| std::cmp::Reverse(rank.weight(c.severity)));

    let mut per_file: HashMap<&str, usize> = HashMap::new();
    let mut result: Vec<Comment> = Vec::new();
    for comment in &merged {
        if result.len() >= max_total {
            break;
        }
        let count = per_file.entry(comment.path.as_str()).or_insert(0);
        if *count >= max_per_file {
            continue;
        }
        *count += 1;
        result.push(comment.clone());
    }

    result
}
