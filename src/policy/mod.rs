pub mod classifier;
pub mod config;
pub mod engine;
pub mod lexer;
pub mod registry;
pub mod schema;
pub mod types;

pub use classifier::{classify, overall_severity, StatementClassifier};
pub use config::{ClientConfig, ClientConfigLoader, ConfigurationRule, RuleCategory};
pub use engine::{decide, DecisionEngine};
pub use registry::{all_signatures, find_signature, Matcher, SignatureCategory, ThreatSignature};
pub use schema::{extract_tables, validate_access};
pub use types::{
    BlockKind, CheckStage, Decision, Outcome, SchemaAccess, Severity, TaskMode, Violation,
    WhitelistEntry,
};
