//! Jurisdiction-based data retention
//!
//! Unknown jurisdictions never fail: they resolve to `US-GENERAL` with a
//! warning. This is the opposite of the schema gate, which fails closed.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Jurisdiction used when the requested one is unknown
pub const FALLBACK_JURISDICTION: &str = "US-GENERAL";

/// Retention bounds and obligations for one jurisdiction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    pub code: &'static str,
    pub name: &'static str,
    pub default_days: u32,
    pub min_days: u32,
    pub max_days: u32,
    pub description: &'static str,
    pub required_measures: &'static [&'static str],
}

impl RetentionPolicy {
    /// Clamp `days` into `[min_days, max_days]`
    pub fn clamp(&self, days: u32) -> u32 {
        days.clamp(self.min_days, self.max_days)
    }

    /// Retention period after clamping; `None` means the default
    pub fn retention_days(&self, requested_days: Option<u32>) -> u32 {
        self.clamp(requested_days.unwrap_or(self.default_days))
    }

    /// Expiry instant counted from `now`
    pub fn expiry_at(&self, requested_days: Option<u32>, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::days(i64::from(self.retention_days(requested_days)))
    }
}

static POLICIES: Lazy<BTreeMap<&'static str, RetentionPolicy>> = Lazy::new(|| {
    [
        RetentionPolicy {
            code: "CA-PIPEDA",
            name: "PIPEDA (Canada)",
            default_days: 365,
            min_days: 180,
            max_days: 730,
            description: "Canadian federal privacy law for private sector organizations",
            required_measures: &[
                "consent_for_collection",
                "purpose_limitation",
                "data_minimization",
                "access_rights",
            ],
        },
        RetentionPolicy {
            code: "GDPR",
            name: "GDPR (EU)",
            default_days: 180,
            min_days: 90,
            max_days: 365,
            description: "EU regulation on data protection and privacy",
            required_measures: &[
                "consent_for_collection",
                "purpose_limitation",
                "data_minimization",
                "access_rights",
                "right_to_erasure",
                "data_portability",
                "dpa_required",
            ],
        },
        RetentionPolicy {
            code: "US-CCPA",
            name: "CCPA (California)",
            default_days: 365,
            min_days: 180,
            max_days: 730,
            description: "California state privacy law",
            required_measures: &[
                "disclosure_requirements",
                "opt_out_rights",
                "access_rights",
                "deletion_rights",
            ],
        },
        US_GENERAL.clone(),
    ]
    .into_iter()
    .map(|p| (p.code, p))
    .collect()
});

static US_GENERAL: RetentionPolicy = RetentionPolicy {
    code: FALLBACK_JURISDICTION,
    name: "US General",
    default_days: 365,
    min_days: 90,
    max_days: 1095,
    description: "Default policy for US clients without specific state regulations",
    required_measures: &["reasonable_security"],
};

/// All known policies, ordered by code
pub fn all_policies() -> impl Iterator<Item = &'static RetentionPolicy> {
    POLICIES.values()
}

/// Non-fatal problems found while resolving a jurisdiction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetentionWarning {
    UnknownJurisdiction {
        requested: String,
        fallback: &'static str,
    },
}

impl fmt::Display for RetentionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionWarning::UnknownJurisdiction {
                requested,
                fallback,
            } => write!(
                f,
                "Unknown jurisdiction: {}. Using {} defaults.",
                requested, fallback
            ),
        }
    }
}

/// Policy chosen for a jurisdiction code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub policy: &'static RetentionPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<RetentionWarning>,
}

/// Look up a jurisdiction; codes are matched trimmed and case-insensitively
pub fn resolve(jurisdiction: &str) -> Resolution {
    let code = jurisdiction.trim().to_ascii_uppercase();
    if let Some(policy) = POLICIES.get(code.as_str()) {
        return Resolution {
            policy,
            warning: None,
        };
    }

    let warning = RetentionWarning::UnknownJurisdiction {
        requested: jurisdiction.to_string(),
        fallback: FALLBACK_JURISDICTION,
    };
    tracing::warn!("{}", warning);

    Resolution {
        policy: &US_GENERAL,
        warning: Some(warning),
    }
}

/// Retention period after clamping; `None` means the jurisdiction default
pub fn retention_days(jurisdiction: &str, requested_days: Option<u32>) -> u32 {
    resolve(jurisdiction).policy.retention_days(requested_days)
}

/// Expiry instant counted from now
pub fn compute_expiry(jurisdiction: &str, requested_days: Option<u32>) -> DateTime<Utc> {
    compute_expiry_at(jurisdiction, requested_days, Utc::now())
}

/// Expiry instant counted from `now`
pub fn compute_expiry_at(
    jurisdiction: &str,
    requested_days: Option<u32>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    resolve(jurisdiction).policy.expiry_at(requested_days, now)
}

/// Verdict on a requested retention period
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionDecision {
    pub valid: bool,
    /// Requested days when valid, the suggested bound otherwise
    pub effective_days: u32,
    pub policy_name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_days: Option<u32>,
}

/// Check a requested retention period against the jurisdiction's bounds
pub fn validate(jurisdiction: &str, requested_days: i64) -> RetentionDecision {
    let policy = resolve(jurisdiction).policy;

    if requested_days < i64::from(policy.min_days) {
        return RetentionDecision {
            valid: false,
            effective_days: policy.min_days,
            policy_name: policy.name,
            reason: Some(format!(
                "Retention period {} days is below minimum ({}) for {}",
                requested_days, policy.min_days, policy.name
            )),
            suggested_days: Some(policy.min_days),
        };
    }

    if requested_days > i64::from(policy.max_days) {
        return RetentionDecision {
            valid: false,
            effective_days: policy.max_days,
            policy_name: policy.name,
            reason: Some(format!(
                "Retention period {} days exceeds maximum ({}) for {}",
                requested_days, policy.max_days, policy.name
            )),
            suggested_days: Some(policy.max_days),
        };
    }

    RetentionDecision {
        valid: true,
        // within [min_days, max_days], so it fits
        effective_days: requested_days as u32,
        policy_name: policy.name,
        reason: None,
        suggested_days: None,
    }
}

/// Obligations a jurisdiction imposes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceRequirements {
    /// The code as requested, even when it fell back
    pub jurisdiction: String,
    pub policy_name: &'static str,
    pub requirements: &'static [&'static str],
    pub description: &'static str,
}

pub fn requirements(jurisdiction: &str) -> ComplianceRequirements {
    let policy = resolve(jurisdiction).policy;
    ComplianceRequirements {
        jurisdiction: jurisdiction.to_string(),
        policy_name: policy.name,
        requirements: policy.required_measures,
        description: policy.description,
    }
}
