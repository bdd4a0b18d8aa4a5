//! Audit receipts
//!
//! A receipt is the immutable record of one evaluated request. Building one is
//! a pure function of the [`Decision`], the request metadata and the injected
//! [`Clock`] and [`IdGenerator`], so identical inputs give byte-identical
//! receipts.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

use crate::core::errors::ReceiptError;
use crate::policy::config::{ConfigurationRule, RuleCategory};
use crate::policy::registry::all_signatures;
use crate::policy::types::{BlockKind, CheckStage, Decision, Outcome, TaskMode};

pub const CHECK_INJECTION_SCAN: &str = "SQL Injection Scan";
pub const CHECK_SCHEMA_WHITELIST: &str = "Schema Whitelist";
pub const CHECK_AUDIT_TRAIL: &str = "Audit Trail";

/// Source of receipt timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> Result<DateTime<Utc>, ReceiptError>;
}

/// Source of receipt identifiers
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Result<String, ReceiptError>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<DateTime<Utc>, ReceiptError> {
        Ok(Utc::now())
    }
}

/// Clock pinned to one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> Result<DateTime<Utc>, ReceiptError> {
        Ok(self.0)
    }
}

/// `audit-<uuid v4>` identifiers
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> Result<String, ReceiptError> {
        Ok(format!("audit-{}", uuid::Uuid::new_v4()))
    }
}

/// Always hands out the same identifier
#[derive(Debug, Clone)]
pub struct FixedId(pub String);

impl IdGenerator for FixedId {
    fn next_id(&self) -> Result<String, ReceiptError> {
        Ok(self.0.clone())
    }
}

/// SHA-256 fingerprint of request input
pub struct InputHash;

impl InputHash {
    /// `sha256:<hex>` of `input`
    pub fn of(input: impl AsRef<[u8]>) -> String {
        let digest = Sha256::digest(input.as_ref());
        format!("sha256:{}", hex::encode(digest))
    }
}

/// One stage of the compliance breakdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceCheck {
    pub name: String,
    pub passed: bool,
    pub details: String,
}

impl ComplianceCheck {
    fn new(name: &str, passed: bool, details: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed,
            details: details.into(),
        }
    }
}

/// Request-side facts the receipt records
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    pub request_id: String,
    pub client_id: String,
    pub description: String,
    pub input_hash: Option<String>,
    pub mode: TaskMode,
    pub rules: Vec<ConfigurationRule>,
}

impl RequestMetadata {
    pub fn new(request_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_input_hash(mut self, input_hash: impl Into<String>) -> Self {
        self.input_hash = Some(input_hash.into());
        self
    }

    /// Hash `statement` unless an input hash was already supplied
    pub fn with_statement(mut self, statement: &str) -> Self {
        if self.input_hash.is_none() {
            self.input_hash = Some(InputHash::of(statement));
        }
        self
    }

    pub fn with_mode(mut self, mode: TaskMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_rules(mut self, rules: Vec<ConfigurationRule>) -> Self {
        self.rules = rules;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptRequest {
    pub description: String,
    pub input_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptResponse {
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub matched_rules: Vec<ConfigurationRule>,
}

/// Immutable record of one evaluated request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReceipt {
    id: String,
    request_id: String,
    client_id: String,
    /// RFC 3339, millisecond precision, UTC
    timestamp: String,
    status: Outcome,
    mode: TaskMode,
    request: ReceiptRequest,
    response: ReceiptResponse,
    compliance_checks: Vec<ComplianceCheck>,
}

impl AuditReceipt {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn status(&self) -> Outcome {
        self.status
    }

    pub fn mode(&self) -> TaskMode {
        self.mode
    }

    pub fn request(&self) -> &ReceiptRequest {
        &self.request
    }

    pub fn response(&self) -> &ReceiptResponse {
        &self.response
    }

    pub fn compliance_checks(&self) -> &[ComplianceCheck] {
        &self.compliance_checks
    }

    /// Canonical JSON encoding
    pub fn to_json(&self) -> Result<String, ReceiptError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Hex SHA-256 of the canonical JSON encoding
    pub fn digest(&self) -> Result<String, ReceiptError> {
        let json = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&json)))
    }
}

/// Builds receipts from decisions
#[derive(Debug, Clone, Default)]
pub struct ReceiptBuilder<C = SystemClock, G = UuidGenerator> {
    clock: C,
    ids: G,
}

impl ReceiptBuilder {
    /// Builder using the wall clock and random identifiers
    pub fn system() -> Self {
        Self::default()
    }
}

impl<C: Clock, G: IdGenerator> ReceiptBuilder<C, G> {
    pub fn new(clock: C, ids: G) -> Self {
        Self { clock, ids }
    }

    /// Build the receipt for `decision`
    pub fn build(
        &self,
        decision: &Decision,
        metadata: &RequestMetadata,
    ) -> Result<AuditReceipt, ReceiptError> {
        if metadata.client_id.trim().is_empty() {
            return Err(ReceiptError::MissingMetadata("client_id"));
        }
        if metadata.request_id.trim().is_empty() {
            return Err(ReceiptError::MissingMetadata("request_id"));
        }

        let timestamp = self
            .clock
            .now()?
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        let id = self.ids.next_id()?;

        let receipt = AuditReceipt {
            id,
            request_id: metadata.request_id.clone(),
            client_id: metadata.client_id.clone(),
            timestamp,
            status: decision.outcome(),
            mode: metadata.mode,
            request: ReceiptRequest {
                description: metadata.description.clone(),
                input_hash: metadata.input_hash.clone(),
            },
            response: ReceiptResponse {
                approved: decision.is_approved(),
                reason: decision.reason().map(str::to_string),
                matched_rules: matched_rules(decision, &metadata.rules),
            },
            compliance_checks: compliance_checks(decision),
        };

        tracing::debug!(
            receipt_id = %receipt.id,
            status = %receipt.status,
            "Built audit receipt"
        );
        Ok(receipt)
    }
}

/// Compliance breakdown for a decision
pub fn compliance_checks(decision: &Decision) -> Vec<ComplianceCheck> {
    let mut checks = Vec::with_capacity(3);

    let injection = match decision.check_stage() {
        CheckStage::Pattern => ComplianceCheck::new(
            CHECK_INJECTION_SCAN,
            false,
            decision.reason().unwrap_or_default(),
        ),
        _ => ComplianceCheck::new(
            CHECK_INJECTION_SCAN,
            true,
            format!(
                "No prohibited operations detected ({} signatures checked)",
                all_signatures().len()
            ),
        ),
    };
    checks.push(injection);

    if decision.schema_checked() {
        let schema = if decision.check_stage() == CheckStage::Schema {
            ComplianceCheck::new(
                CHECK_SCHEMA_WHITELIST,
                false,
                decision.reason().unwrap_or_default(),
            )
        } else if decision.tables_referenced().is_empty() {
            ComplianceCheck::new(CHECK_SCHEMA_WHITELIST, true, "No tables referenced")
        } else {
            let tables: Vec<&str> = decision
                .tables_referenced()
                .iter()
                .map(String::as_str)
                .collect();
            ComplianceCheck::new(
                CHECK_SCHEMA_WHITELIST,
                true,
                format!("All referenced tables authorized: {}", tables.join(", ")),
            )
        };
        checks.push(schema);
    }

    let trail = if decision.is_approved() {
        "Full audit trail maintained"
    } else {
        "Attempt logged for compliance review"
    };
    checks.push(ComplianceCheck::new(CHECK_AUDIT_TRAIL, true, trail));

    checks
}

/// Client rules that explain a decision, in configuration order
pub fn matched_rules(decision: &Decision, rules: &[ConfigurationRule]) -> Vec<ConfigurationRule> {
    let violated: Vec<&str> = decision.violated_signatures().collect();
    let unauthorized: Vec<&str> = decision
        .unauthorized_tables()
        .iter()
        .map(String::as_str)
        .collect();

    let selected = |rule: &ConfigurationRule| -> bool {
        match rule.category {
            RuleCategory::Audit => true,
            RuleCategory::SqlSecurity => match decision.check_stage() {
                CheckStage::Pattern => rule.applies_to_any(violated.iter().copied()),
                CheckStage::None => true,
                CheckStage::Schema => false,
            },
            RuleCategory::DataAccess => match decision.check_stage() {
                CheckStage::Schema
                    if decision.block_kind() == Some(BlockKind::MissingWhitelist) =>
                {
                    true
                }
                CheckStage::Schema => rule.applies_to_any(unauthorized.iter().copied()),
                CheckStage::None => decision.schema_checked(),
                CheckStage::Pattern => false,
            },
            _ => false,
        }
    };

    let mut seen = BTreeSet::new();
    rules
        .iter()
        .filter(|rule| selected(*rule))
        .filter(|rule| seen.insert(rule.id.clone()))
        .cloned()
        .collect()
}
