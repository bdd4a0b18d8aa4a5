//! Minimal SQL lexer
//!
//! Splits a statement into words, quoted identifiers, literals, punctuation and
//! comments. It does not understand grammar; it only has to be good enough for
//! signature matching and table extraction to stop tripping over comments,
//! quoting and string contents.

/// Token categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Unquoted identifier or keyword
    Word,
    /// `"name"`, `` `name` `` or `[name]`
    QuotedIdent,
    /// `'text'` or a dollar-quoted body (`$$text$$`, `$tag$text$tag$`)
    StringLit,
    Number,
    /// Any other single character
    Punct,
    /// `-- ...` up to the end of the line
    LineComment,
    /// `/* ... */`
    BlockComment,
}

/// A lexed token borrowing from the statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
    /// False for a literal, quoted identifier or block comment that hit end of input
    pub terminated: bool,
}

impl<'a> Token<'a> {
    pub fn is_comment(&self) -> bool {
        matches!(self.kind, TokenKind::LineComment | TokenKind::BlockComment)
    }

    /// Unquoted word equal to `keyword`, ignoring ASCII case
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct && self.text.len() == c.len_utf8() && self.text.starts_with(c)
    }

    pub fn is_identifier(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::QuotedIdent)
    }

    /// Lower-cased identifier value with quoting removed
    pub fn ident_value(&self) -> Option<String> {
        match self.kind {
            TokenKind::Word => Some(self.text.to_lowercase()),
            TokenKind::QuotedIdent => {
                let open = self.text.chars().next()?;
                let close = match open {
                    '[' => ']',
                    other => other,
                };
                let inner = &self.text[open.len_utf8()..];
                let inner = if self.terminated {
                    &inner[..inner.len() - close.len_utf8()]
                } else {
                    inner
                };
                let doubled = format!("{}{}", close, close);
                Some(inner.replace(&doubled, &close.to_string()).to_lowercase())
            }
            _ => None,
        }
    }

    /// Byte range of the comment body that is lexed again as code.
    /// `/*!` bodies skip the optional version number (`/*!50000 ...`).
    fn spliced_body(&self, bodies: CommentBodies) -> Option<(usize, usize)> {
        match self.kind {
            TokenKind::LineComment if bodies == CommentBodies::All => {
                Some((self.start + 2, self.end))
            }
            TokenKind::BlockComment => {
                let body_end = if self.terminated { self.end - 2 } else { self.end };
                if let Some(rest) = self.text.strip_prefix("/*!") {
                    let version = rest.bytes().take_while(u8::is_ascii_digit).count();
                    Some(((self.start + 3 + version).min(body_end), body_end))
                } else if bodies == CommentBodies::All {
                    Some((self.start + 2, body_end))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Comment text without its delimiters
    pub fn comment_body(&self) -> Option<&'a str> {
        match self.kind {
            TokenKind::LineComment => Some(&self.text[2..]),
            TokenKind::BlockComment if self.terminated => Some(&self.text[2..self.text.len() - 2]),
            TokenKind::BlockComment => Some(&self.text[2..]),
            _ => None,
        }
    }
}

/// Byte that may appear inside a signature word
fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Maximal runs of `[A-Za-z0-9_]` with their byte offsets
///
/// This is the word notion signatures use: the same boundaries as an ASCII
/// `\b` in a regular expression, so `DROPDOWN_TABLE` is one word.
pub fn words(text: &str) -> impl Iterator<Item = (usize, &str)> + '_ {
    let bytes = text.as_bytes();
    let mut pos = 0;
    std::iter::from_fn(move || {
        while pos < bytes.len() && !is_word_byte(bytes[pos]) {
            pos += 1;
        }
        if pos >= bytes.len() {
            return None;
        }
        let start = pos;
        while pos < bytes.len() && is_word_byte(bytes[pos]) {
            pos += 1;
        }
        Some((start, &text[start..pos]))
    })
}

/// How quote characters delimit literals and quoted identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quoting {
    /// Only a doubled quote escapes
    Standard,
    /// `\` also escapes the next byte inside `'...'` and `"..."`, as MySQL reads them
    Backslash,
    /// Quote characters are plain punctuation
    Raw,
}

/// Comments whose bodies are lexed again as code, right after the comment token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentBodies {
    /// Every comment
    All,
    /// Only `/*! ... */`, which MySQL executes
    Executable,
}

/// Tokenize a statement. Whitespace is dropped; nothing else is.
pub fn tokenize(sql: &str) -> Vec<Token<'_>> {
    Lexer::new(sql, 0, sql.len(), Quoting::Standard).run()
}

/// Every plausible way a server could tokenize `sql`
///
/// The first reading uses standard quoting. A backslash-escaping reading
/// follows when it differs, and a raw reading with inert quotes is added when
/// any literal or quoted identifier runs to end of input. In each reading the
/// bodies selected by `bodies` appear as code tokens right after their comment
/// token. All offsets point into `sql`.
pub fn readings(sql: &str, bodies: CommentBodies) -> Vec<Vec<Token<'_>>> {
    let mut out: Vec<Vec<Token<'_>>> = Vec::with_capacity(3);
    for quoting in [Quoting::Standard, Quoting::Backslash] {
        let tokens = Lexer::new(sql, 0, sql.len(), quoting)
            .splicing(bodies)
            .run();
        if !out.contains(&tokens) {
            out.push(tokens);
        }
    }

    let unterminated = out.iter().flatten().any(|t| {
        matches!(t.kind, TokenKind::StringLit | TokenKind::QuotedIdent) && !t.terminated
    });
    if unterminated {
        out.push(
            Lexer::new(sql, 0, sql.len(), Quoting::Raw)
                .splicing(bodies)
                .run(),
        );
    }
    out
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    end: usize,
    quoting: Quoting,
    splice: Option<CommentBodies>,
    tokens: Vec<Token<'a>>,
}

impl<'a> Lexer<'a> {
    /// Lex `src[from..end]`; both bounds must be char boundaries
    fn new(src: &'a str, from: usize, end: usize, quoting: Quoting) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: from,
            end,
            quoting,
            splice: None,
            tokens: Vec::new(),
        }
    }

    fn splicing(mut self, bodies: CommentBodies) -> Self {
        self.splice = Some(bodies);
        self
    }

    fn run(mut self) -> Vec<Token<'a>> {
        while self.pos < self.end {
            let start = self.pos;
            let b = self.bytes[start];

            if b.is_ascii_whitespace() {
                self.pos += 1;
                continue;
            }

            let quotes = self.quoting != Quoting::Raw;
            let (kind, terminated) = match b {
                b'-' if self.peek(1) == Some(b'-') => {
                    self.pos = self.find_from(start, "\n").unwrap_or(self.end);
                    (TokenKind::LineComment, true)
                }
                b'/' if self.peek(1) == Some(b'*') => match self.find_from(start + 2, "*/") {
                    Some(close) => {
                        self.pos = close + 2;
                        (TokenKind::BlockComment, true)
                    }
                    None => {
                        self.pos = self.end;
                        (TokenKind::BlockComment, false)
                    }
                },
                b'\'' if quotes => (TokenKind::StringLit, self.quoted(b'\'', true)),
                b'"' if quotes => (TokenKind::QuotedIdent, self.quoted(b'"', true)),
                b'`' if quotes => (TokenKind::QuotedIdent, self.quoted(b'`', false)),
                b'[' if quotes => (TokenKind::QuotedIdent, self.quoted(b']', false)),
                b'$' if quotes => match self.dollar_quoted() {
                    Some(terminated) => (TokenKind::StringLit, terminated),
                    None => {
                        self.pos += 1;
                        (TokenKind::Punct, true)
                    }
                },
                b'0'..=b'9' => {
                    self.pos += 1;
                    while self.pos < self.end
                        && (is_word_byte(self.bytes[self.pos]) || self.bytes[self.pos] == b'.')
                    {
                        self.pos += 1;
                    }
                    (TokenKind::Number, true)
                }
                _ if b.is_ascii_alphabetic() || b == b'_' || !b.is_ascii() => {
                    if self.word() {
                        (TokenKind::Word, true)
                    } else {
                        (TokenKind::Punct, true)
                    }
                }
                _ => {
                    self.pos += 1;
                    (TokenKind::Punct, true)
                }
            };

            let token = Token {
                kind,
                text: &self.src[start..self.pos],
                start,
                end: self.pos,
                terminated,
            };
            self.tokens.push(token);
            self.splice_body(&token);
        }
        self.tokens
    }

    /// Append the comment's body as code when it is selected for splicing.
    /// Bodies are lexed one level deep; comments inside them stay comments.
    fn splice_body(&mut self, token: &Token<'a>) {
        let Some(bodies) = self.splice else {
            return;
        };
        let Some((from, to)) = token.spliced_body(bodies) else {
            return;
        };
        let body = Lexer::new(self.src, from, to, self.quoting).run();
        self.tokens.extend(body);
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        let at = self.pos + offset;
        (at < self.end).then(|| self.bytes[at])
    }

    fn find_from(&self, from: usize, needle: &str) -> Option<usize> {
        self.src.get(from..self.end)?.find(needle).map(|i| from + i)
    }

    /// Consume a quoted run opened at `pos`; a doubled `close` is an escape,
    /// and so is a backslash when `backslash` applies under the current quoting.
    fn quoted(&mut self, close: u8, backslash: bool) -> bool {
        let backslash = backslash && self.quoting == Quoting::Backslash;
        self.pos += 1;
        while self.pos < self.end {
            let b = self.bytes[self.pos];
            if backslash && b == b'\\' {
                self.pos += 2;
                continue;
            }
            if b == close {
                if self.peek(1) == Some(close) {
                    self.pos += 2;
                    continue;
                }
                self.pos += 1;
                return true;
            }
            self.pos += 1;
        }
        self.pos = self.end;
        false
    }

    /// `$tag$ ... $tag$`; `None` when `$` does not open a dollar quote.
    fn dollar_quoted(&mut self) -> Option<bool> {
        let start = self.pos;
        let mut tag_end = start + 1;
        while tag_end < self.end && is_word_byte(self.bytes[tag_end]) {
            tag_end += 1;
        }
        if tag_end >= self.end || self.bytes[tag_end] != b'$' {
            return None;
        }
        let tag = &self.src[start..=tag_end];
        if tag.len() > 2 && self.bytes[start + 1].is_ascii_digit() {
            // `$1$` is not a tag; positional parameters start with a digit
            return None;
        }
        match self.find_from(tag_end + 1, tag) {
            Some(close) => {
                self.pos = close + tag.len();
                Some(true)
            }
            None => {
                self.pos = self.end;
                Some(false)
            }
        }
    }

    /// Consume an identifier-like word; false if the char is not alphanumeric.
    fn word(&mut self) -> bool {
        let start = self.pos;
        for (offset, c) in self.src[start..self.end].char_indices() {
            if c.is_alphanumeric() || c == '_' {
                continue;
            }
            self.pos = start + offset;
            if self.pos == start {
                // lone non-alphanumeric, non-ASCII char
                self.pos += c.len_utf8();
                return false;
            }
            return true;
        }
        self.pos = self.end;
        true
    }
}
