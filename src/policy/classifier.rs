use crate::policy::lexer::{self, CommentBodies, Token, TokenKind};
use crate::policy::registry::{all_signatures, Matcher, ThreatSignature, INVALID_INPUT};
use crate::policy::types::{Severity, Violation};

/// Scans statements against the threat signature registry
#[derive(Debug, Clone, Copy)]
pub struct StatementClassifier {
    signatures: &'static [ThreatSignature],
}

impl StatementClassifier {
    pub fn new() -> Self {
        Self {
            signatures: all_signatures(),
        }
    }

    /// Signatures this classifier evaluates
    pub fn signatures(&self) -> &'static [ThreatSignature] {
        self.signatures
    }

    /// Classify a statement, returning one violation per matching signature
    pub fn classify(&self, statement: &str) -> Vec<Violation> {
        if statement.trim().is_empty() {
            return vec![Violation {
                signature_name: INVALID_INPUT.to_string(),
                severity: Severity::Critical,
                matched_text: String::new(),
            }];
        }

        let scan = Scan::new(statement);

        self.signatures
            .iter()
            .filter_map(|sig| {
                scan.find(&sig.matcher).map(|(start, end)| Violation {
                    signature_name: sig.name.to_string(),
                    severity: sig.severity,
                    matched_text: statement[start..end].to_string(),
                })
            })
            .collect()
    }
}

impl Default for StatementClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify with the builtin registry
pub fn classify(statement: &str) -> Vec<Violation> {
    StatementClassifier::new().classify(statement)
}

/// Critical if any violation is Critical, else High; `None` for no violations
pub fn overall_severity(violations: &[Violation]) -> Option<Severity> {
    violations.iter().map(|v| v.severity).max()
}

/// A statement lexed once and shared by every matcher
struct Scan<'a> {
    text: &'a str,
    /// Every tokenization of `text`, comment bodies spliced in as code
    readings: Vec<Reading<'a>>,
}

struct Reading<'a> {
    tokens: Vec<Token<'a>>,
    /// Indices into `tokens` of everything that is not a comment
    code: Vec<usize>,
}

impl<'a> Reading<'a> {
    fn new(tokens: Vec<Token<'a>>) -> Self {
        let code = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.is_comment())
            .map(|(i, _)| i)
            .collect();
        Self { tokens, code }
    }

    fn code_token(&self, n: usize) -> Option<&Token<'a>> {
        self.code.get(n).map(|&i| &self.tokens[i])
    }

    fn find_sequence(&self, pattern: &[&str]) -> Option<(usize, usize)> {
        if pattern.is_empty() || pattern.len() > self.code.len() {
            return None;
        }
        (0..=self.code.len() - pattern.len()).find_map(|first| {
            let hit = pattern.iter().enumerate().all(|(offset, expected)| {
                self.code_token(first + offset)
                    .map(|t| token_matches(t, expected))
                    .unwrap_or(false)
            });
            if !hit {
                return None;
            }
            let start = self.code_token(first)?.start;
            let end = self.code_token(first + pattern.len() - 1)?.end;
            Some((start, end))
        })
    }

    fn find_chained(&self, keywords: &[&str]) -> Option<(usize, usize)> {
        (0..self.code.len()).find_map(|n| {
            let semi = self.code_token(n)?;
            if !semi.is_punct(';') {
                return None;
            }
            let next = self.code_token(n + 1)?;
            keywords
                .iter()
                .any(|kw| next.is_keyword(kw))
                .then_some((semi.start, next.end))
        })
    }

    fn find_in_comment(&self, kind: TokenKind, keywords: &[&str]) -> Option<(usize, usize)> {
        self.tokens
            .iter()
            .filter(|t| t.kind == kind)
            .find(|t| {
                t.comment_body()
                    .map(|body| {
                        lexer::words(body)
                            .any(|(_, w)| keywords.iter().any(|kw| w.eq_ignore_ascii_case(kw)))
                    })
                    .unwrap_or(false)
            })
            .map(|t| (t.start, t.end))
    }
}

impl<'a> Scan<'a> {
    fn new(text: &'a str) -> Self {
        let readings = lexer::readings(text, CommentBodies::All)
            .into_iter()
            .map(Reading::new)
            .collect();
        Self { text, readings }
    }

    /// Byte span of the first match, if any
    fn find(&self, matcher: &Matcher) -> Option<(usize, usize)> {
        if let Matcher::Keyword { word } = matcher {
            return lexer::words(self.text)
                .find(|(_, w)| w.eq_ignore_ascii_case(word))
                .map(|(start, w)| (start, start + w.len()));
        }
        self.readings.iter().find_map(|reading| match matcher {
            Matcher::Keyword { .. } => None,
            Matcher::Sequence { tokens } => reading.find_sequence(tokens),
            Matcher::Chained { keywords } => reading.find_chained(keywords),
            Matcher::LineComment { keywords } => {
                reading.find_in_comment(TokenKind::LineComment, keywords)
            }
            Matcher::BlockComment { keywords } => {
                reading.find_in_comment(TokenKind::BlockComment, keywords)
            }
        })
    }
}

fn token_matches(token: &Token<'_>, expected: &str) -> bool {
    let mut chars = expected.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if !c.is_alphanumeric() && c != '_' => token.is_punct(c),
        _ => token.is_keyword(expected),
    }
}
