//! Core domain modules
//!
//! Error types shared by the policy, audit and storage layers.

pub mod errors;

pub use errors::{AccessError, AuditLogError, ReceiptError};
