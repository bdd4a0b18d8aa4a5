//! Schema access validation
//!
//! Pulls the physical tables a statement reads out of its `FROM` and `JOIN`
//! clauses and checks them against the caller's whitelist.

use std::collections::BTreeSet;
use std::ops::Range;

use crate::core::errors::AccessError;
use crate::policy::lexer::{self, CommentBodies, Token};
use crate::policy::types::{SchemaAccess, WhitelistEntry};

/// Functions whose argument list uses `FROM` without naming a table
const FROM_ARGUMENT_FUNCTIONS: &[&str] = &["EXTRACT", "SUBSTRING", "TRIM", "OVERLAY", "POSITION"];

/// Modifiers that may sit between `FROM`/`JOIN` and the table
const TABLE_MODIFIERS: &[&str] = &["ONLY", "LATERAL"];

/// Words that end a table reference instead of aliasing it
const CLAUSE_KEYWORDS: &[&str] = &[
    "WHERE", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "OUTER", "CROSS", "NATURAL", "ON", "USING",
    "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "UNION", "INTERSECT", "EXCEPT", "MINUS",
    "WINDOW", "FETCH", "FOR", "RETURNING", "SET", "VALUES", "WITH", "SELECT", "FROM", "INTO",
    "TABLESAMPLE", "QUALIFY", "LATERAL", "STRAIGHT_JOIN", "APPLY",
];

/// Extract referenced table names, lower-cased
///
/// References to a CTE declared in the statement are not tables and are left
/// out; a CTE's own body still reads the physical table of the same name unless
/// the CTE is recursive. Every plausible tokenization is scanned (backslash
/// escapes, unterminated quotes, MySQL `/*! */` comments) and the results are
/// merged, so a quoting trick can only add tables.
pub fn extract_tables(statement: &str) -> BTreeSet<String> {
    lexer::readings(statement, CommentBodies::Executable)
        .into_iter()
        .flat_map(|tokens| {
            let code: Vec<Token<'_>> = tokens.into_iter().filter(|t| !t.is_comment()).collect();
            tables_in(&code)
        })
        .collect()
}

fn tables_in(code: &[Token<'_>]) -> BTreeSet<String> {
    let ctes = cte_declarations(code);
    let mut references: Vec<(String, usize)> = Vec::new();

    // One entry per open paren: true when it opened a FROM_ARGUMENT_FUNCTIONS call
    let mut parens: Vec<bool> = Vec::new();

    for (i, token) in code.iter().enumerate() {
        if token.is_punct('(') {
            let is_from_function = i > 0
                && FROM_ARGUMENT_FUNCTIONS
                    .iter()
                    .any(|f| code[i - 1].is_keyword(f));
            parens.push(is_from_function);
            continue;
        }
        if token.is_punct(')') {
            parens.pop();
            continue;
        }

        let opens_list = token.is_keyword("JOIN")
            || (token.is_keyword("FROM") && !parens.last().copied().unwrap_or(false));
        if opens_list {
            collect_table_list(code, i + 1, &mut references);
        }
    }

    references
        .into_iter()
        .filter(|(name, pos)| !ctes.iter().any(|cte| cte.name == *name && cte.covers(*pos)))
        .map(|(name, _)| name)
        .collect()
}

/// Check a statement's tables against a whitelist
///
/// An empty whitelist is a hard stop: no whitelist means no access.
pub fn validate_access(
    statement: &str,
    whitelist: &[WhitelistEntry],
) -> Result<SchemaAccess, AccessError> {
    let allowed: BTreeSet<String> = whitelist
        .iter()
        .map(|w| w.table.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    if allowed.is_empty() {
        return Err(AccessError::MissingWhitelist);
    }

    let tables_referenced = extract_tables(statement);
    let unauthorized: BTreeSet<String> = tables_referenced
        .iter()
        .filter(|t| !allowed.contains(*t))
        .cloned()
        .collect();

    Ok(SchemaAccess {
        authorized: unauthorized.is_empty(),
        tables_referenced,
        unauthorized,
    })
}

/// Parse `table [AS alias], table [alias], ...` starting at `pos`,
/// recording each name with its token index
fn collect_table_list(code: &[Token<'_>], mut pos: usize, tables: &mut Vec<(String, usize)>) {
    loop {
        while code
            .get(pos)
            .map(|t| TABLE_MODIFIERS.iter().any(|m| t.is_keyword(m)))
            .unwrap_or(false)
        {
            pos += 1;
        }

        let Some(token) = code.get(pos) else {
            return;
        };

        if token.is_punct('(') {
            // Subquery or parenthesised join; its own FROM is picked up by the caller's scan
            pos = skip_parens(code, pos);
        } else if token.is_identifier() && !is_clause_keyword(token) {
            let (name, next) = qualified_name(code, pos);
            tables.push((name, pos));
            pos = next;
            if code.get(pos).map(|t| t.is_punct('(')).unwrap_or(false) {
                // table function arguments
                pos = skip_parens(code, pos);
            }
        } else {
            return;
        }

        pos = skip_alias(code, pos);

        match code.get(pos) {
            Some(t) if t.is_punct(',') => pos += 1,
            _ => return,
        }
    }
}

/// `a.b.c` as one lower-cased, unquoted name
fn qualified_name(code: &[Token<'_>], pos: usize) -> (String, usize) {
    let mut name = code[pos].ident_value().unwrap_or_default();
    let mut next = pos + 1;
    while let (Some(dot), Some(part)) = (code.get(next), code.get(next + 1)) {
        if !dot.is_punct('.') || !part.is_identifier() {
            break;
        }
        name.push('.');
        name.push_str(&part.ident_value().unwrap_or_default());
        next += 2;
    }
    (name, next)
}

/// Skip `[AS] alias [(col, ...)]`
fn skip_alias(code: &[Token<'_>], mut pos: usize) -> usize {
    let explicit = code.get(pos).map(|t| t.is_keyword("AS")).unwrap_or(false);
    if explicit {
        pos += 1;
    }
    match code.get(pos) {
        Some(t) if t.is_identifier() && (explicit || !is_clause_keyword(t)) => {
            pos += 1;
            if code.get(pos).map(|t| t.is_punct('(')).unwrap_or(false) {
                pos = skip_parens(code, pos);
            }
            pos
        }
        _ => pos,
    }
}

/// Index just past the paren group opened at `pos`
fn skip_parens(code: &[Token<'_>], pos: usize) -> usize {
    let mut depth = 0usize;
    for (offset, token) in code[pos..].iter().enumerate() {
        if token.is_punct('(') {
            depth += 1;
        } else if token.is_punct(')') {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return pos + offset + 1;
            }
        }
    }
    code.len()
}

fn is_clause_keyword(token: &Token<'_>) -> bool {
    CLAUSE_KEYWORDS.iter().any(|k| token.is_keyword(k))
}

/// A CTE declared by `WITH`
struct CteDeclaration {
    name: String,
    /// Token range of the parenthesised body
    body: Range<usize>,
    /// Index of the paren closing the query the `WITH` belongs to
    scope_end: usize,
    recursive: bool,
}

impl CteDeclaration {
    /// Whether a reference at `pos` names this CTE rather than a table
    fn covers(&self, pos: usize) -> bool {
        (pos >= self.body.end && pos < self.scope_end)
            || (self.recursive && self.body.contains(&pos))
    }
}

/// Parse `WITH [RECURSIVE] name [(cols)] AS [[NOT] MATERIALIZED] (...)` lists
fn cte_declarations(code: &[Token<'_>]) -> Vec<CteDeclaration> {
    let mut declarations = Vec::new();

    for (i, token) in code.iter().enumerate() {
        if !token.is_keyword("WITH") {
            continue;
        }
        let scope_end = enclosing_close(code, i);
        let mut pos = i + 1;
        let recursive = code.get(pos).map(|t| t.is_keyword("RECURSIVE")).unwrap_or(false);
        if recursive {
            pos += 1;
        }

        loop {
            let Some(name) = code.get(pos).filter(|t| t.is_identifier()) else {
                break;
            };
            pos += 1;
            if code.get(pos).map(|t| t.is_punct('(')).unwrap_or(false) {
                pos = skip_parens(code, pos);
            }
            if !code.get(pos).map(|t| t.is_keyword("AS")).unwrap_or(false) {
                break;
            }
            pos += 1;
            while code
                .get(pos)
                .map(|t| t.is_keyword("NOT") || t.is_keyword("MATERIALIZED"))
                .unwrap_or(false)
            {
                pos += 1;
            }
            if !code.get(pos).map(|t| t.is_punct('(')).unwrap_or(false) {
                break;
            }
            let body_start = pos;
            pos = skip_parens(code, pos);
            if let Some(value) = name.ident_value() {
                declarations.push(CteDeclaration {
                    name: value,
                    body: body_start..pos,
                    scope_end,
                    recursive,
                });
            }
            match code.get(pos) {
                Some(t) if t.is_punct(',') => pos += 1,
                _ => break,
            }
        }
    }

    declarations
}

/// Index of the `)` closing the group that contains `pos`, or the end of input
fn enclosing_close(code: &[Token<'_>], pos: usize) -> usize {
    let mut depth = 0usize;
    for (offset, token) in code[pos..].iter().enumerate() {
        if token.is_punct('(') {
            depth += 1;
        } else if token.is_punct(')') {
            if depth == 0 {
                return pos + offset;
            }
            depth -= 1;
        }
    }
    code.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(sql: &str) -> Vec<String> {
        extract_tables(sql).into_iter().collect()
    }

    fn whitelist(tables: &[&str]) -> Vec<WhitelistEntry> {
        tables.iter().map(|t| WhitelistEntry::new(*t)).collect()
    }

    #[test]
    fn test_simple_from() {
        assert_eq!(tables("SELECT * FROM orders"), vec!["orders"]);
        assert_eq!(tables("select * from Orders"), vec!["orders"]);
    }

    #[test]
    fn test_joins_and_aliases() {
        let sql = "SELECT o.id, c.name FROM orders o \
                   JOIN customers AS c ON c.id = o.customer_id \
                   LEFT JOIN products p ON p.id = o.product_id";
        assert_eq!(tables(sql), vec!["customers", "orders", "products"]);
    }

    #[test]
    fn test_comma_list() {
        assert_eq!(
            tables("SELECT * FROM orders o, hr_salaries h WHERE o.id = h.id"),
            vec!["hr_salaries", "orders"]
        );
    }

    #[test]
    fn test_subquery() {
        let sql = "SELECT * FROM (SELECT id FROM hr_salaries) AS s, orders";
        assert_eq!(tables(sql), vec!["hr_salaries", "orders"]);

        let sql = "SELECT * FROM orders WHERE id IN (SELECT order_id FROM refunds)";
        assert_eq!(tables(sql), vec!["orders", "refunds"]);
    }

    #[test]
    fn test_quoted_and_qualified() {
        assert_eq!(tables(r#"SELECT * FROM "Orders""#), vec!["orders"]);
        assert_eq!(tables("SELECT * FROM [dbo].[Orders]"), vec!["dbo.orders"]);
        assert_eq!(tables("SELECT * FROM public.orders"), vec!["public.orders"]);
    }

    #[test]
    fn test_cte_names_excluded() {
        let sql = "WITH recent AS (SELECT * FROM orders WHERE ts > now()), \
                   totals (n) AS (SELECT count(*) FROM recent) \
                   SELECT * FROM recent JOIN totals ON true";
        assert_eq!(tables(sql), vec!["orders"]);
    }

    #[test]
    fn test_function_from_is_not_a_table() {
        let sql = "SELECT EXTRACT(YEAR FROM created_at), TRIM(BOTH ' ' FROM name) FROM orders";
        assert_eq!(tables(sql), vec!["orders"]);
    }

    #[test]
    fn test_comments_do_not_hide_tables() {
        assert_eq!(
            tables("SELECT * FROM /* harmless */ hr_salaries"),
            vec!["hr_salaries"]
        );
        assert!(tables("SELECT 1 -- FROM hr_salaries").is_empty());
    }

    #[test]
    fn test_string_literal_is_not_a_table() {
        assert!(tables("SELECT 'from payroll' AS note").is_empty());
    }

    #[test]
    fn test_validate_access() {
        let access = validate_access("SELECT * FROM orders", &whitelist(&["orders"])).unwrap();
        assert!(access.authorized);
        assert!(access.unauthorized.is_empty());

        let access = validate_access("SELECT * FROM hr_salaries", &whitelist(&["orders"])).unwrap();
        assert!(!access.authorized);
        assert_eq!(
            access.unauthorized.into_iter().collect::<Vec<_>>(),
            vec!["hr_salaries"]
        );
    }

    #[test]
    fn test_whitelist_case_insensitive() {
        let access = validate_access("SELECT * FROM orders", &whitelist(&[" ORDERS "])).unwrap();
        assert!(access.authorized);
    }

    #[test]
    fn test_empty_whitelist_fails_closed() {
        assert_eq!(
            validate_access("SELECT 1", &[]),
            Err(AccessError::MissingWhitelist)
        );
        assert_eq!(
            validate_access("SELECT 1", &whitelist(&["  "])),
            Err(AccessError::MissingWhitelist)
        );
    }

    #[test]
    fn test_cte_shadowing_table_reads_the_table() {
        let sql = "WITH hr_salaries AS (SELECT * FROM hr_salaries) \
                   SELECT * FROM hr_salaries JOIN orders ON true";
        assert_eq!(tables(sql), vec!["hr_salaries", "orders"]);

        let access = validate_access(sql, &whitelist(&["orders"])).unwrap();
        assert!(!access.authorized);
    }

    #[test]
    fn test_recursive_cte_refers_to_itself() {
        let sql = "WITH RECURSIVE walk (n) AS (SELECT 1 UNION SELECT n + 1 FROM walk) \
                   SELECT n FROM walk";
        assert!(tables(sql).is_empty());
    }

    #[test]
    fn test_cte_scope_ends_with_its_subquery() {
        let sql = "SELECT * FROM (WITH hr AS (SELECT 1) SELECT * FROM hr) s JOIN hr ON true";
        assert_eq!(tables(sql), vec!["hr"]);
    }

    #[test]
    fn test_backslash_escape_does_not_hide_tables() {
        assert_eq!(tables(r"SELECT 'a\'' FROM hr_salaries"), vec!["hr_salaries"]);
    }

    #[test]
    fn test_unterminated_identifier_fails_closed() {
        assert_eq!(
            tables(r#"SELECT "oops FROM hr_salaries"#),
            vec!["hr_salaries"]
        );
    }

    #[test]
    fn test_executable_comment_tables() {
        assert_eq!(
            tables("SELECT * FROM orders /*!, hr_salaries */"),
            vec!["hr_salaries", "orders"]
        );
    }
}
