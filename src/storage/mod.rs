//! Append-only audit receipt log
//!
//! One JSON object per line, each linked to the one before it:
//!
//! ```text
//! {"sequence":1,"prevDigest":"GENESIS","digest":"<hex sha256>","receipt":{...}}
//! ```
//!
//! The digest covers the sequence number, the previous line's digest and the
//! receipt JSON. The file is only ever opened for appending. `verify` walks the
//! chain, so an edited, deleted or reordered line shows up. Truncating the tail
//! cannot be seen from inside the file; compare `head` against a digest kept
//! elsewhere for that.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::audit::AuditReceipt;
use crate::core::errors::{AuditLogError, ReceiptError};

/// `prevDigest` of the first line
pub const GENESIS: &str = "GENESIS";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogLine {
    sequence: u64,
    prev_digest: String,
    digest: String,
    receipt: AuditReceipt,
}

/// SHA-256 over the sequence number, the previous digest and the receipt JSON
fn line_digest(
    sequence: u64,
    prev_digest: &str,
    receipt: &AuditReceipt,
) -> Result<String, ReceiptError> {
    let mut hasher = Sha256::new();
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_digest.as_bytes());
    hasher.update(serde_json::to_vec(receipt)?);
    Ok(hex::encode(hasher.finalize()))
}

/// Outcome of checking a receipt log
#[derive(Debug, Clone, PartialEq)]
pub enum LogVerification {
    /// Every line links to the one before it and matches its digest
    Valid {
        entries: usize,
        /// Digest of the last line, `None` for an empty log
        head: Option<String>,
    },
    /// Stored digest disagrees with the line's contents
    Tampered {
        line: usize,
        expected: String,
        actual: String,
    },
    /// `prevDigest` does not name the preceding line
    BrokenLink {
        line: usize,
        expected: String,
        actual: String,
    },
    /// Sequence numbers skip or repeat
    OutOfSequence { line: usize, expected: u64, actual: u64 },
}

impl LogVerification {
    pub fn is_valid(&self) -> bool {
        matches!(self, LogVerification::Valid { .. })
    }
}

/// JSON Lines receipt log
#[derive(Debug, Clone)]
pub struct ReceiptLog {
    path: PathBuf,
}

impl ReceiptLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one receipt; returns its line digest
    pub fn append(&self, receipt: &AuditReceipt) -> Result<String, AuditLogError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let (sequence, prev_digest) = match self.lines()?.pop() {
            Some((_, last)) => (last.sequence + 1, last.digest),
            None => (1, GENESIS.to_string()),
        };
        let digest = line_digest(sequence, &prev_digest, receipt)?;
        let line = LogLine {
            sequence,
            prev_digest,
            digest: digest.clone(),
            receipt: receipt.clone(),
        };
        let json = serde_json::to_string(&line).map_err(ReceiptError::from)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", json)?;
        file.flush()?;

        tracing::debug!(
            receipt_id = receipt.id(),
            sequence,
            path = %self.path.display(),
            "Appended audit receipt"
        );
        Ok(digest)
    }

    fn lines(&self) -> Result<Vec<(usize, LogLine)>, AuditLogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let number = index + 1;
            let entry: LogLine = serde_json::from_str(&line)
                .map_err(|source| AuditLogError::Malformed { line: number, source })?;
            entries.push((number, entry));
        }
        Ok(entries)
    }

    /// All receipts in append order
    pub fn read_all(&self) -> Result<Vec<AuditReceipt>, AuditLogError> {
        Ok(self.lines()?.into_iter().map(|(_, e)| e.receipt).collect())
    }

    /// Walk the chain and report the first broken line
    pub fn verify(&self) -> Result<LogVerification, AuditLogError> {
        let lines = self.lines()?;
        let entries = lines.len();
        let mut prev_digest = GENESIS.to_string();
        let mut expected_sequence = 1u64;

        for (line, entry) in lines {
            let verdict = if entry.prev_digest != prev_digest {
                Some(LogVerification::BrokenLink {
                    line,
                    expected: prev_digest.clone(),
                    actual: entry.prev_digest,
                })
            } else {
                let actual = line_digest(entry.sequence, &entry.prev_digest, &entry.receipt)?;
                if actual != entry.digest {
                    Some(LogVerification::Tampered {
                        line,
                        expected: entry.digest,
                        actual,
                    })
                } else if entry.sequence != expected_sequence {
                    Some(LogVerification::OutOfSequence {
                        line,
                        expected: expected_sequence,
                        actual: entry.sequence,
                    })
                } else {
                    prev_digest = entry.digest;
                    expected_sequence += 1;
                    None
                }
            };

            if let Some(verdict) = verdict {
                tracing::warn!(line, path = %self.path.display(), "Audit log chain broken");
                return Ok(verdict);
            }
        }

        Ok(LogVerification::Valid {
            entries,
            head: (entries > 0).then_some(prev_digest),
        })
    }
}
