//! The black-box SQL analysis capability.
//!
//! The orchestration core never parses SQL itself; it hands text, a
//! dialect, and a rule configuration to a [`SqlAnalyzer`] and persists
//! whatever [`AnalysisReport`] comes back. Analyzer errors are
//! deterministic by contract (the same input fails the same way), so
//! they are never retried.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Dialect
// ---------------------------------------------------------------------------

/// SQL dialect handed through to the analysis engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Ansi,
    Mysql,
    Postgres,
    Sqlite,
    Bigquery,
    Snowflake,
    Redshift,
    Oracle,
    Tsql,
    Hive,
}

impl Dialect {
    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Ansi => "ansi",
            Dialect::Mysql => "mysql",
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
            Dialect::Bigquery => "bigquery",
            Dialect::Snowflake => "snowflake",
            Dialect::Redshift => "redshift",
            Dialect::Oracle => "oracle",
            Dialect::Tsql => "tsql",
            Dialect::Hive => "hive",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ansi" => Ok(Dialect::Ansi),
            "mysql" => Ok(Dialect::Mysql),
            "postgres" => Ok(Dialect::Postgres),
            "sqlite" => Ok(Dialect::Sqlite),
            "bigquery" => Ok(Dialect::Bigquery),
            "snowflake" => Ok(Dialect::Snowflake),
            "redshift" => Ok(Dialect::Redshift),
            "oracle" => Ok(Dialect::Oracle),
            "tsql" => Ok(Dialect::Tsql),
            "hive" => Ok(Dialect::Hive),
            other => Err(CoreError::Validation(format!("Unknown SQL dialect: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Rule configuration
// ---------------------------------------------------------------------------

/// Per-submission rule configuration forwarded verbatim to the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Rule codes to enable; empty means the engine default set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<String>,

    /// Rule codes to exclude.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_rules: Vec<String>,

    /// Free-form engine configuration overrides.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub config_overrides: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// One rule violation found in the analyzed text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: String,
    pub description: String,
    pub line: u32,
    pub column: u32,
}

/// Aggregate counts over a report's violations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_violations: u32,
    pub violations_by_rule: BTreeMap<String, u32>,
}

/// The result blob produced for one analyzed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub file_name: String,
    pub dialect: Dialect,
    pub violations: Vec<Violation>,
    pub summary: AnalysisSummary,
}

impl AnalysisReport {
    /// Build a report, deriving the summary from the violation list.
    pub fn new(
        file_name: impl Into<String>,
        dialect: Dialect,
        violations: Vec<Violation>,
    ) -> Self {
        let mut by_rule: BTreeMap<String, u32> = BTreeMap::new();
        for v in &violations {
            *by_rule.entry(v.rule.clone()).or_insert(0) += 1;
        }
        Self {
            file_name: file_name.into(),
            dialect,
            summary: AnalysisSummary {
                total_violations: violations.len() as u32,
                violations_by_rule: by_rule,
            },
            violations,
        }
    }
}

// ---------------------------------------------------------------------------
// Analyzer capability
// ---------------------------------------------------------------------------

/// A deterministic analysis failure. Never retried.
#[derive(Debug, thiserror::Error)]
#[error("Analysis failed: {0}")]
pub struct AnalyzeError(pub String);

/// The injected analysis capability.
#[async_trait]
pub trait SqlAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        sql: &str,
        file_name: &str,
        dialect: Dialect,
        rules: &RuleConfig,
    ) -> Result<AnalysisReport, AnalyzeError>;
}

/// Analyzer used when no real engine is bound at the call site: accepts
/// every input and reports zero violations.
pub struct PassthroughAnalyzer;

#[async_trait]
impl SqlAnalyzer for PassthroughAnalyzer {
    async fn analyze(
        &self,
        _sql: &str,
        file_name: &str,
        dialect: Dialect,
        _rules: &RuleConfig,
    ) -> Result<AnalysisReport, AnalyzeError> {
        Ok(AnalysisReport::new(file_name, dialect, Vec::new()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
