use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed severity taxonomy. Ordered so `Blocking > Warn > Info` under
/// the derived `Ord`; ranking for dedupe uses [`SeverityRank`] weights,
/// which are configurable per policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Blocking,
}

impl Severity {
    /// Normalize a free-text severity label into the closed taxonomy.
    ///
    /// Trims and lowercases, applies the alias table, and maps anything
    /// unrecognized to `Info`. Total: never fails, whatever the input.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "blocking" | "block" | "critical" | "high" => Severity::Blocking,
            "warn" | "medium" => Severity::Warn,
            _ => Severity::Info,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Blocking => "blocking",
            Severity::Warn => "warn",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Total order over severity labels as integer weights; higher = more severe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityRank {
    weights: HashMap<String, u32>,
}

impl Default for SeverityRank {
    fn default() -> Self {
        Self::new(HashMap::from([
            ("blocking".to_string(), 3),
            ("warn".to_string(), 2),
            ("info".to_string(), 1),
        ]))
    }
}

impl SeverityRank {
    pub fn new(weights: HashMap<String, u32>) -> Self {
        Self { weights }
    }

    /// Weight for a severity; unknown labels rank below everything.
    pub fn weight(&self, severity: Severity) -> u32 {
        self.weights.get(severity.label()).copied().unwrap_or(0)
    }
}
