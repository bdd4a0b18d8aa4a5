//! opsgate: compliance gate for machine-generated data operations
//!
//! This library provides:
//! - A SQL threat classifier driven by a static signature registry
//! - Schema whitelist validation over a small SQL lexer
//! - A decision engine combining both into one verdict
//! - Immutable audit receipts and an append-only receipt log
//! - Jurisdiction-based data retention rules

pub mod audit;
pub mod config;
pub mod core;
pub mod policy;
pub mod retention;
pub mod storage;
pub mod transport;

pub use audit::{AuditReceipt, ReceiptBuilder, RequestMetadata};
pub use config::Config;
pub use policy::{decide, Decision, DecisionEngine};
