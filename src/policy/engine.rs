use crate::audit::redact::StatementRedactor;
use crate::core::errors::AccessError;
use crate::policy::{
    classifier::StatementClassifier,
    schema,
    types::{Decision, WhitelistEntry},
};

/// Decision engine: pattern scan first, schema access second
///
/// `decide` never fails. Every problem with the statement or the request ends
/// up as a blocked [`Decision`] carrying its reason.
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    classifier: StatementClassifier,
    /// Require a whitelist even when the caller passes none
    schema_gated: bool,
    redactor: StatementRedactor,
}

impl DecisionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine that blocks requests arriving without a whitelist
    pub fn schema_gated() -> Self {
        Self {
            schema_gated: true,
            ..Self::default()
        }
    }

    /// Replace the redactor applied to logged statements
    pub fn with_redactor(mut self, redactor: StatementRedactor) -> Self {
        self.redactor = redactor;
        self
    }

    pub fn is_schema_gated(&self) -> bool {
        self.schema_gated
    }

    /// Decide whether a statement may run
    pub fn decide(&self, statement: &str, whitelist: Option<&[WhitelistEntry]>) -> Decision {
        // Step 1: Pattern scan. Always first, so an access problem never masks a threat.
        let violations = self.classifier.classify(statement);
        if !violations.is_empty() {
            let decision = Decision::blocked_by_pattern(violations);
            tracing::info!(
                stage = "pattern",
                severity = ?decision.severity(),
                statement = %self.redactor.redact(statement),
                "Statement blocked: {}",
                decision.reason().unwrap_or_default()
            );
            return decision;
        }
        tracing::debug!(
            signatures = self.classifier.signatures().len(),
            "Pattern scan passed"
        );

        // Step 2: Schema access
        let whitelist: &[WhitelistEntry] = match whitelist {
            Some(entries) => entries,
            None if self.schema_gated => &[],
            None => {
                tracing::debug!("No whitelist supplied, schema check skipped");
                return Decision::approved(None);
            }
        };

        let access = match schema::validate_access(statement, whitelist) {
            Ok(access) => access,
            Err(AccessError::MissingWhitelist) => {
                tracing::warn!(
                    statement = %self.redactor.redact(statement),
                    "Statement blocked: schema whitelist not provided"
                );
                return Decision::missing_whitelist();
            }
        };

        if !access.authorized {
            let decision = Decision::blocked_by_schema(access);
            tracing::info!(
                stage = "schema",
                statement = %self.redactor.redact(statement),
                "Statement blocked: {}",
                decision.reason().unwrap_or_default()
            );
            return decision;
        }

        // Step 3: Approved
        tracing::info!(
            tables = access.tables_referenced.len(),
            "Statement approved"
        );
        Decision::approved(Some(access))
    }
}

/// Decide with a default (non schema-gated) engine
pub fn decide(statement: &str, whitelist: Option<&[WhitelistEntry]>) -> Decision {
    DecisionEngine::new().decide(statement, whitelist)
}
