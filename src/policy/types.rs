use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::policy::registry::INVALID_INPUT;

/// Severity tier of a threat signature
///
/// Ordered so that `max()` over a set of violations yields the governing tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of operation a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    #[default]
    Sql,
    Excel,
}

impl TaskMode {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskMode::Sql => "sql",
            TaskMode::Excel => "excel",
        }
    }
}

impl FromStr for TaskMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sql" => Ok(TaskMode::Sql),
            "excel" => Ok(TaskMode::Excel),
            _ => Err(format!("Invalid mode: {}", s)),
        }
    }
}

impl fmt::Display for TaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final verdict of the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Approved,
    Blocked,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Approved => write!(f, "APPROVED"),
            Outcome::Blocked => write!(f, "BLOCKED"),
        }
    }
}

/// Stage that produced the verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStage {
    Pattern,
    Schema,
    /// Every stage passed
    None,
}

impl fmt::Display for CheckStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStage::Pattern => write!(f, "pattern"),
            CheckStage::Schema => write!(f, "schema"),
            CheckStage::None => write!(f, "none"),
        }
    }
}

/// Why a request was blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Empty statement
    InvalidInput,
    /// One or more threat signatures matched
    PolicyViolation,
    /// Statement references tables outside the whitelist
    AccessViolation,
    /// Schema-gated request arrived without a whitelist
    MissingWhitelist,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockKind::InvalidInput => write!(f, "invalid_input"),
            BlockKind::PolicyViolation => write!(f, "policy_violation"),
            BlockKind::AccessViolation => write!(f, "access_violation"),
            BlockKind::MissingWhitelist => write!(f, "missing_whitelist"),
        }
    }
}

/// A signature that matched one statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub signature_name: String,
    pub severity: Severity,
    /// First slice of the statement that triggered the signature
    pub matched_text: String,
}

/// A table the caller is allowed to touch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub table: String,
    #[serde(default)]
    pub columns: BTreeSet<String>,
}

impl WhitelistEntry {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: BTreeSet::new(),
        }
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }
}

/// Result of checking a statement against a whitelist
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaAccess {
    pub authorized: bool,
    pub tables_referenced: BTreeSet<String>,
    pub unauthorized: BTreeSet<String>,
}

/// The engine's verdict plus its evidence
///
/// Fields are private: a `Decision` can only come out of the decision engine,
/// which keeps `outcome`, `reason` and the evidence consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    outcome: Outcome,
    check_stage: CheckStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    block_kind: Option<BlockKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    severity: Option<Severity>,
    violations: Vec<Violation>,
    unauthorized_tables: BTreeSet<String>,
    tables_referenced: BTreeSet<String>,
    schema_checked: bool,
    reason: Option<String>,
}

impl Decision {
    /// Every stage passed. `schema` is the validator result if it ran.
    pub(crate) fn approved(schema: Option<SchemaAccess>) -> Self {
        let schema_checked = schema.is_some();
        Self {
            outcome: Outcome::Approved,
            check_stage: CheckStage::None,
            block_kind: None,
            severity: None,
            violations: Vec::new(),
            unauthorized_tables: BTreeSet::new(),
            tables_referenced: schema.map(|s| s.tables_referenced).unwrap_or_default(),
            schema_checked,
            reason: None,
        }
    }

    /// Pattern stage found violations; must be non-empty.
    pub(crate) fn blocked_by_pattern(violations: Vec<Violation>) -> Self {
        debug_assert!(!violations.is_empty());

        let invalid_input = violations.len() == 1 && violations[0].signature_name == INVALID_INPUT;
        let (block_kind, reason) = if invalid_input {
            (
                BlockKind::InvalidInput,
                format!(
                    "Invalid input ({}): statement must be a non-empty string",
                    INVALID_INPUT
                ),
            )
        } else {
            let names: Vec<&str> = violations
                .iter()
                .map(|v| v.signature_name.as_str())
                .collect();
            (
                BlockKind::PolicyViolation,
                format!("Prohibited SQL operation(s) detected: {}", names.join(", ")),
            )
        };

        Self {
            outcome: Outcome::Blocked,
            check_stage: CheckStage::Pattern,
            block_kind: Some(block_kind),
            // An empty list can only reach here in release builds; keep it blocking.
            severity: Some(
                violations
                    .iter()
                    .map(|v| v.severity)
                    .max()
                    .unwrap_or(Severity::Critical),
            ),
            violations,
            unauthorized_tables: BTreeSet::new(),
            tables_referenced: BTreeSet::new(),
            schema_checked: false,
            reason: Some(reason),
        }
    }

    /// Validator found tables outside the whitelist; `unauthorized` must be non-empty.
    pub(crate) fn blocked_by_schema(access: SchemaAccess) -> Self {
        debug_assert!(!access.unauthorized.is_empty());

        let names: Vec<&str> = access.unauthorized.iter().map(String::as_str).collect();
        let reason = format!("Unauthorized table access: {}", names.join(", "));

        Self {
            outcome: Outcome::Blocked,
            check_stage: CheckStage::Schema,
            block_kind: Some(BlockKind::AccessViolation),
            severity: Some(Severity::High),
            violations: Vec::new(),
            unauthorized_tables: access.unauthorized,
            tables_referenced: access.tables_referenced,
            schema_checked: true,
            reason: Some(reason),
        }
    }

    /// Schema gate failed closed for lack of a whitelist
    pub(crate) fn missing_whitelist() -> Self {
        Self {
            outcome: Outcome::Blocked,
            check_stage: CheckStage::Schema,
            block_kind: Some(BlockKind::MissingWhitelist),
            severity: Some(Severity::High),
            violations: Vec::new(),
            unauthorized_tables: BTreeSet::new(),
            tables_referenced: BTreeSet::new(),
            schema_checked: true,
            reason: Some(crate::core::errors::AccessError::MissingWhitelist.to_string()),
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn is_approved(&self) -> bool {
        self.outcome == Outcome::Approved
    }

    pub fn is_blocked(&self) -> bool {
        self.outcome == Outcome::Blocked
    }

    pub fn check_stage(&self) -> CheckStage {
        self.check_stage
    }

    pub fn block_kind(&self) -> Option<BlockKind> {
        self.block_kind
    }

    /// Critical if any violation is Critical, High otherwise; `None` when approved
    pub fn severity(&self) -> Option<Severity> {
        self.severity
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn unauthorized_tables(&self) -> &BTreeSet<String> {
        &self.unauthorized_tables
    }

    pub fn tables_referenced(&self) -> &BTreeSet<String> {
        &self.tables_referenced
    }

    /// Whether the schema access stage ran
    pub fn schema_checked(&self) -> bool {
        self.schema_checked
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Names of the violated signatures, in registry order
    pub fn violated_signatures(&self) -> impl Iterator<Item = &str> {
        self.violations.iter().map(|v| v.signature_name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(name: &str, severity: Severity) -> Violation {
        Violation {
            signature_name: name.to_string(),
            severity,
            matched_text: name.to_string(),
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        let max = [Severity::High, Severity::Critical, Severity::High]
            .into_iter()
            .max();
        assert_eq!(max, Some(Severity::Critical));
    }

    #[test]
    fn test_task_mode_parse() {
        assert_eq!("sql".parse::<TaskMode>().unwrap(), TaskMode::Sql);
        assert_eq!("EXCEL".parse::<TaskMode>().unwrap(), TaskMode::Excel);
        assert!("csv".parse::<TaskMode>().is_err());
    }

    #[test]
    fn test_pattern_block_reason_lists_signatures() {
        let decision = Decision::blocked_by_pattern(vec![
            violation("INSERT", Severity::High),
            violation("UNION_INJECTION", Severity::High),
        ]);
        assert!(decision.is_blocked());
        assert_eq!(decision.block_kind(), Some(BlockKind::PolicyViolation));
        assert_eq!(decision.severity(), Some(Severity::High));
        assert_eq!(
            decision.reason(),
            Some("Prohibited SQL operation(s) detected: INSERT, UNION_INJECTION")
        );
    }

    #[test]
    fn test_invalid_input_block() {
        let decision = Decision::blocked_by_pattern(vec![violation(
            INVALID_INPUT,
            Severity::Critical,
        )]);
        assert_eq!(decision.block_kind(), Some(BlockKind::InvalidInput));
        assert!(decision.reason().unwrap().contains(INVALID_INPUT));
    }

    #[test]
    fn test_approved_has_no_reason() {
        let decision = Decision::approved(None);
        assert!(decision.is_approved());
        assert_eq!(decision.reason(), None);
        assert_eq!(decision.check_stage(), CheckStage::None);
        assert!(!decision.schema_checked());
    }

    #[test]
    fn test_serialized_shape() {
        let decision = Decision::approved(None);
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["outcome"], "APPROVED");
        assert_eq!(json["checkStage"], "none");
        assert!(json["reason"].is_null());
        assert!(json.get("blockKind").is_none());
    }
}
