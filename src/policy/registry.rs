//! Builtin threat signatures
//!
//! The table below is the whole detection policy. Order matters: it is the
//! evaluation order and the order violations are reported in.

use serde::Serialize;
use std::fmt;

use crate::policy::types::Severity;

/// Signature name reported for an empty statement
pub const INVALID_INPUT: &str = "INVALID_INPUT";

/// Threat family a signature belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureCategory {
    Ddl,
    DmlWrite,
    Permission,
    RemoteExecution,
    CommentEvasion,
    StackedQuery,
    UnionInjection,
    FileAccess,
    ServerControl,
}

impl fmt::Display for SignatureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignatureCategory::Ddl => "ddl",
            SignatureCategory::DmlWrite => "dml_write",
            SignatureCategory::Permission => "permission",
            SignatureCategory::RemoteExecution => "remote_execution",
            SignatureCategory::CommentEvasion => "comment_evasion",
            SignatureCategory::StackedQuery => "stacked_query",
            SignatureCategory::UnionInjection => "union_injection",
            SignatureCategory::FileAccess => "file_access",
            SignatureCategory::ServerControl => "server_control",
        };
        write!(f, "{}", s)
    }
}

/// How a signature recognises a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Matcher {
    /// Whole word anywhere in the text, comments and literals included
    Keyword { word: &'static str },
    /// Consecutive code tokens; comments in between are skipped and comment
    /// bodies count as code. Alphanumeric entries are keywords, anything else
    /// a punctuation char.
    Sequence { tokens: &'static [&'static str] },
    /// `;` followed by one of `keywords`
    Chained { keywords: &'static [&'static str] },
    /// `--` comment whose body contains one of `keywords`
    LineComment { keywords: &'static [&'static str] },
    /// `/* */` comment whose body contains one of `keywords`
    BlockComment { keywords: &'static [&'static str] },
}

/// A named, severity-tagged detection rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThreatSignature {
    pub name: &'static str,
    pub category: SignatureCategory,
    pub severity: Severity,
    pub matcher: Matcher,
    pub description: &'static str,
}

const HIDDEN_KEYWORDS: &[&str] = &["DROP", "DELETE", "UPDATE", "INSERT", "TRUNCATE", "ALTER"];
const CHAINED_KEYWORDS: &[&str] = &["DROP", "DELETE", "UPDATE", "INSERT", "TRUNCATE"];

const fn keyword(
    name: &'static str,
    category: SignatureCategory,
    severity: Severity,
    description: &'static str,
) -> ThreatSignature {
    ThreatSignature {
        name,
        category,
        severity,
        matcher: Matcher::Keyword { word: name },
        description,
    }
}

static SIGNATURES: &[ThreatSignature] = &[
    // DDL
    keyword("DROP", SignatureCategory::Ddl, Severity::Critical, "Drops a database object"),
    keyword("TRUNCATE", SignatureCategory::Ddl, Severity::Critical, "Empties a table"),
    keyword("ALTER", SignatureCategory::Ddl, Severity::Critical, "Changes a database object"),
    keyword("CREATE", SignatureCategory::Ddl, Severity::High, "Creates a database object"),
    keyword("REPLACE", SignatureCategory::Ddl, Severity::High, "Creates or replaces an object or row"),
    // DML writes
    keyword("DELETE", SignatureCategory::DmlWrite, Severity::Critical, "Deletes rows"),
    keyword("UPDATE", SignatureCategory::DmlWrite, Severity::Critical, "Modifies rows"),
    keyword("INSERT", SignatureCategory::DmlWrite, Severity::High, "Inserts rows"),
    // Permissions
    keyword("GRANT", SignatureCategory::Permission, Severity::Critical, "Grants privileges"),
    keyword("REVOKE", SignatureCategory::Permission, Severity::Critical, "Revokes privileges"),
    // Execution
    keyword("EXEC", SignatureCategory::RemoteExecution, Severity::Critical, "Executes a procedure or dynamic SQL"),
    keyword("EXECUTE", SignatureCategory::RemoteExecution, Severity::Critical, "Executes a procedure or dynamic SQL"),
    // Comment evasion
    ThreatSignature {
        name: "HIDDEN_IN_LINE_COMMENT",
        category: SignatureCategory::CommentEvasion,
        severity: Severity::Critical,
        matcher: Matcher::LineComment {
            keywords: HIDDEN_KEYWORDS,
        },
        description: "Destructive keyword hidden in a line comment",
    },
    ThreatSignature {
        name: "HIDDEN_IN_BLOCK_COMMENT",
        category: SignatureCategory::CommentEvasion,
        severity: Severity::Critical,
        matcher: Matcher::BlockComment {
            keywords: HIDDEN_KEYWORDS,
        },
        description: "Destructive keyword hidden in a block comment",
    },
    // Injection
    ThreatSignature {
        name: "CHAINED_DANGEROUS_STATEMENT",
        category: SignatureCategory::StackedQuery,
        severity: Severity::Critical,
        matcher: Matcher::Chained {
            keywords: CHAINED_KEYWORDS,
        },
        description: "Destructive statement stacked after a semicolon",
    },
    ThreatSignature {
        name: "UNION_INJECTION",
        category: SignatureCategory::UnionInjection,
        severity: Severity::High,
        matcher: Matcher::Sequence {
            tokens: &["UNION", "ALL", "SELECT"],
        },
        description: "UNION ALL SELECT appended to a query",
    },
    ThreatSignature {
        name: "FILE_WRITE",
        category: SignatureCategory::FileAccess,
        severity: Severity::Critical,
        matcher: Matcher::Sequence {
            tokens: &["INTO", "OUTFILE"],
        },
        description: "Writes query results to a server file",
    },
    ThreatSignature {
        name: "FILE_DUMP",
        category: SignatureCategory::FileAccess,
        severity: Severity::Critical,
        matcher: Matcher::Sequence {
            tokens: &["INTO", "DUMPFILE"],
        },
        description: "Dumps raw data to a server file",
    },
    ThreatSignature {
        name: "FILE_READ",
        category: SignatureCategory::FileAccess,
        severity: Severity::Critical,
        matcher: Matcher::Sequence {
            tokens: &["LOAD_FILE", "("],
        },
        description: "Reads a server file into the result",
    },
    // Server control
    keyword("SHUTDOWN", SignatureCategory::ServerControl, Severity::Critical, "Stops the database server"),
    keyword("KILL", SignatureCategory::ServerControl, Severity::High, "Terminates a session or query"),
    keyword("XP_CMDSHELL", SignatureCategory::RemoteExecution, Severity::Critical, "Runs an operating system shell command"),
    keyword("SP_EXECUTESQL", SignatureCategory::RemoteExecution, Severity::Critical, "Executes dynamic SQL through a system procedure"),
];

/// All builtin signatures in evaluation order
pub fn all_signatures() -> &'static [ThreatSignature] {
    SIGNATURES
}

/// Look up a signature by name (case-insensitive)
pub fn find_signature(name: &str) -> Option<&'static ThreatSignature> {
    SIGNATURES.iter().find(|s| s.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique() {
        let mut seen = HashSet::new();
        for sig in all_signatures() {
            assert!(seen.insert(sig.name), "duplicate signature {}", sig.name);
        }
        assert!(!seen.contains(INVALID_INPUT));
    }

    #[test]
    fn test_registry_order() {
        let names: Vec<&str> = all_signatures().iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "DROP",
                "TRUNCATE",
                "ALTER",
                "CREATE",
                "REPLACE",
                "DELETE",
                "UPDATE",
                "INSERT",
                "GRANT",
                "REVOKE",
                "EXEC",
                "EXECUTE",
                "HIDDEN_IN_LINE_COMMENT",
                "HIDDEN_IN_BLOCK_COMMENT",
                "CHAINED_DANGEROUS_STATEMENT",
                "UNION_INJECTION",
                "FILE_WRITE",
                "FILE_DUMP",
                "FILE_READ",
                "SHUTDOWN",
                "KILL",
                "XP_CMDSHELL",
                "SP_EXECUTESQL",
            ]
        );
    }

    #[test]
    fn test_severity_tiers() {
        let high: Vec<&str> = all_signatures()
            .iter()
            .filter(|s| s.severity == Severity::High)
            .map(|s| s.name)
            .collect();
        assert_eq!(
            high,
            vec!["CREATE", "REPLACE", "INSERT", "UNION_INJECTION", "KILL"]
        );
    }

    #[test]
    fn test_find_signature() {
        let sig = find_signature("xp_cmdshell").unwrap();
        assert_eq!(sig.severity, Severity::Critical);
        assert!(find_signature("SELECT").is_none());
    }

    #[test]
    fn test_matcher_serializes_with_kind_tag() {
        let json = serde_json::to_value(find_signature("FILE_READ").unwrap()).unwrap();
        assert_eq!(json["matcher"]["kind"], "sequence");
        assert_eq!(json["matcher"]["tokens"][0], "LOAD_FILE");
        assert_eq!(json["severity"], "critical");
    }
}
