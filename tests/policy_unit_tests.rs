//! Unit tests for policy modules
//!
//! Tests individual components: lexer, registry, classifier and schema validator

mod classifier_tests {
    use opsgate::policy::classifier::{classify, overall_severity};
    use opsgate::policy::types::Severity;

    #[test]
    fn test_destructive_keywords() {
        let tests = vec![
            ("DROP TABLE users", "DROP"),
            ("truncate logs", "TRUNCATE"),
            ("ALTER TABLE orders ADD COLUMN x INT", "ALTER"),
            ("DELETE FROM orders", "DELETE"),
            ("Update orders SET total = 0", "UPDATE"),
            ("GRANT ALL ON orders TO bob", "GRANT"),
            ("REVOKE SELECT ON orders FROM bob", "REVOKE"),
            ("EXEC sp_who", "EXEC"),
            ("EXECUTE proc_nightly", "EXECUTE"),
            ("SHUTDOWN WITH NOWAIT", "SHUTDOWN"),
        ];

        for (sql, expected) in tests {
            let violations = classify(sql);
            assert!(
                violations.iter().any(|v| v.signature_name == expected),
                "Statement '{}' should match {}",
                sql,
                expected
            );
            assert_eq!(
                overall_severity(&violations),
                Some(Severity::Critical),
                "Statement '{}' should be Critical",
                sql
            );
        }
    }

    #[test]
    fn test_high_severity_keywords() {
        let tests = vec![
            "CREATE TABLE t (id INT)",
            "REPLACE INTO t VALUES (1)",
            "INSERT INTO t VALUES (1)",
            "KILL 42",
        ];

        for sql in tests {
            assert_eq!(
                overall_severity(&classify(sql)),
                Some(Severity::High),
                "Statement '{}' should be High",
                sql
            );
        }
    }

    #[test]
    fn test_read_only_statements_pass() {
        let tests = vec![
            "SELECT * FROM orders",
            "SELECT id, total FROM orders WHERE created_at > '2024-01-01'",
            "SELECT dropdown_value, updated_at FROM settings",
            "WITH t AS (SELECT 1) SELECT * FROM t",
            "SELECT COUNT(*) FROM orders GROUP BY region ORDER BY 1",
        ];

        for sql in tests {
            assert!(
                classify(sql).is_empty(),
                "Statement '{}' should be clean, got {:?}",
                sql,
                classify(sql)
            );
        }
    }

    #[test]
    fn test_keyword_inside_literal_still_flags() {
        // Whole-word signatures scan the full text, literals included
        let violations = classify("SELECT * FROM notes WHERE body = 'please drop me'");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].signature_name, "DROP");
        assert_eq!(violations[0].matched_text, "drop");
    }

    #[test]
    fn test_stacked_statement() {
        let names: Vec<String> = classify("SELECT 1; DROP TABLE users")
            .into_iter()
            .map(|v| v.signature_name)
            .collect();
        assert_eq!(names, vec!["DROP", "CHAINED_DANGEROUS_STATEMENT"]);
    }

    #[test]
    fn test_sequence_ignores_literals() {
        // UNION ALL SELECT inside a string literal is not code
        assert!(classify("SELECT 'union all select' AS hint").is_empty());
    }
}

mod schema_tests {
    use opsgate::core::errors::AccessError;
    use opsgate::policy::schema::{extract_tables, validate_access};
    use opsgate::policy::types::WhitelistEntry;

    #[test]
    fn test_extract_variants() {
        let tests = vec![
            ("SELECT * FROM orders", vec!["orders"]),
            ("SELECT * FROM ONLY orders", vec!["orders"]),
            (
                "SELECT * FROM orders o INNER JOIN order_items i ON i.order_id = o.id",
                vec!["order_items", "orders"],
            ),
            ("SELECT * FROM `shop`.`Orders`", vec!["shop.orders"]),
            ("SELECT 1", vec![]),
        ];

        for (sql, expected) in tests {
            let tables: Vec<String> = extract_tables(sql).into_iter().collect();
            assert_eq!(tables, expected, "Statement '{}'", sql);
        }
    }

    #[test]
    fn test_whitelist_columns_do_not_affect_table_check() {
        let whitelist = vec![WhitelistEntry::new("orders").with_columns(["id"])];
        let access = validate_access("SELECT total FROM orders", &whitelist).unwrap();
        assert!(access.authorized);
    }

    #[test]
    fn test_qualified_name_must_match_exactly() {
        let whitelist = vec![WhitelistEntry::new("orders")];
        let access = validate_access("SELECT * FROM public.orders", &whitelist).unwrap();
        assert!(!access.authorized);
        assert!(access.unauthorized.contains("public.orders"));
    }

    #[test]
    fn test_missing_whitelist() {
        assert_eq!(
            validate_access("SELECT * FROM orders", &[]),
            Err(AccessError::MissingWhitelist)
        );
    }
}

mod registry_tests {
    use opsgate::policy::registry::{all_signatures, find_signature, Matcher};

    #[test]
    fn test_every_signature_has_description() {
        for sig in all_signatures() {
            assert!(!sig.description.is_empty(), "{} has no description", sig.name);
        }
    }

    #[test]
    fn test_keyword_signatures_match_their_name() {
        for sig in all_signatures() {
            if let Matcher::Keyword { word } = sig.matcher {
                assert_eq!(word, sig.name);
            }
        }
    }

    #[test]
    fn test_lookup() {
        assert!(find_signature("union_injection").is_some());
        assert!(find_signature("INVALID_INPUT").is_none());
    }
}
