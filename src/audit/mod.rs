//! Audit receipts and log redaction

pub mod receipt;
pub mod redact;

pub use receipt::{
    AuditReceipt, Clock, ComplianceCheck, FixedClock, FixedId, IdGenerator, InputHash,
    ReceiptBuilder, ReceiptRequest, ReceiptResponse, RequestMetadata, SystemClock, UuidGenerator,
};
pub use redact::StatementRedactor;
