//! Masks sensitive values in statements before they reach a log

use once_cell::sync::Lazy;
use regex::Regex;

static PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        // Single-quoted literals, '' escapes included
        (
            Regex::new(r"'(?:[^']|'')*'?").expect("valid regex"),
            "'[REDACTED]'",
        ),
        // Dollar-quoted bodies; `$$` is an escaped `$` in the replacement
        (
            Regex::new(r"\$\$[\s\S]*?(?:\$\$|$)").expect("valid regex"),
            "$$$$[REDACTED]$$$$",
        ),
        // Bare long digit runs: card numbers, SINs, phone numbers
        (
            Regex::new(r"\b\d{9,19}\b").expect("valid regex"),
            "[NUMBER]",
        ),
    ]
});

/// Redacts literal values from SQL text
#[derive(Debug, Clone, Copy)]
pub struct StatementRedactor {
    enabled: bool,
}

impl StatementRedactor {
    pub fn new() -> Self {
        Self { enabled: true }
    }

    /// Redactor that passes statements through untouched
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Redact literals from a statement
    pub fn redact(&self, statement: &str) -> String {
        if !self.enabled {
            return statement.to_string();
        }
        let mut output = statement.to_string();
        for (pattern, replacement) in PATTERNS.iter() {
            output = pattern.replace_all(&output, *replacement).to_string();
        }
        output
    }
}

impl Default for StatementRedactor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_string_literals() {
        let redactor = StatementRedactor::new();
        let output = redactor.redact("SELECT * FROM customers WHERE email = 'jane@example.com'");
        assert_eq!(
            output,
            "SELECT * FROM customers WHERE email = '[REDACTED]'"
        );
    }

    #[test]
    fn test_redacts_escaped_and_unterminated_literals() {
        let redactor = StatementRedactor::new();
        let output = redactor.redact("SELECT 'O''Brien', 'open");
        assert!(!output.contains("Brien"));
        assert!(!output.contains("open"));
    }

    #[test]
    fn test_redacts_long_numbers() {
        let redactor = StatementRedactor::new();
        let output = redactor.redact("SELECT * FROM cards WHERE pan = 4111111111111111 LIMIT 10");
        assert!(output.contains("[NUMBER]"));
        assert!(output.ends_with("LIMIT 10"));
    }

    #[test]
    fn test_disabled_passthrough() {
        let redactor = StatementRedactor::disabled();
        let input = "SELECT 'secret'";
        assert_eq!(redactor.redact(input), input);
    }
}
