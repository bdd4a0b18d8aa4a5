//! Domain error types
//!
//! Classification failures never show up here: a bad statement is a blocked
//! [`Decision`](crate::policy::Decision), not an error. These enums cover the
//! collaborator faults that can legitimately stop the caller.

use thiserror::Error;

/// Errors raised while validating schema access
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// No whitelist (or an empty one) was supplied for a schema-gated request
    #[error("Schema whitelist not provided")]
    MissingWhitelist,
}

/// Errors raised while building an audit receipt
#[derive(Debug, Error)]
pub enum ReceiptError {
    /// Required request metadata is absent or blank
    #[error("Missing request metadata: {0}")]
    MissingMetadata(&'static str),

    /// The injected clock could not produce a timestamp
    #[error("Clock unavailable: {0}")]
    Clock(String),

    /// The injected identifier generator failed
    #[error("Identifier generation failed: {0}")]
    IdGeneration(String),

    /// Receipt could not be serialized for hashing
    #[error("Receipt serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by the append-only receipt log
#[derive(Debug, Error)]
pub enum AuditLogError {
    /// Underlying file I/O failed
    #[error("Audit log I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A line could not be encoded or decoded
    #[error("Audit log line {line} is malformed: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// The receipt itself failed to serialize
    #[error(transparent)]
    Receipt(#[from] ReceiptError),
}
