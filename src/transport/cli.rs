//! CLI transport: thin commands over the library

use anyhow::{bail, Context, Result};
use chrono::Utc;
use colored::Colorize;
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};

use crate::audit::{AuditReceipt, ReceiptBuilder, RequestMetadata, StatementRedactor};
use crate::config::Config;
use crate::policy::config::{self as client_config, ClientConfig, ClientConfigLoader};
use crate::policy::registry::all_signatures;
use crate::policy::types::{Outcome, TaskMode, WhitelistEntry};
use crate::policy::DecisionEngine;
use crate::retention;
use crate::storage::{LogVerification, ReceiptLog};

/// Output format for commands that print structured data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Inputs to `opsgate check`
#[derive(Debug, Clone, Default)]
pub struct CheckArgs {
    pub statement: Option<String>,
    pub file: Option<PathBuf>,
    pub client: Option<String>,
    pub client_config: Option<PathBuf>,
    /// Ad hoc whitelist tables, replacing the client's
    pub allow: Vec<String>,
    pub description: Option<String>,
    pub request_id: Option<String>,
    pub mode: Option<TaskMode>,
    pub no_log: bool,
    pub format: OutputFormat,
    pub working_dir: PathBuf,
}

/// Client id recorded when no client config is given
const LOCAL_CLIENT: &str = "local";

fn read_statement(args: &CheckArgs) -> Result<String> {
    if let Some(statement) = &args.statement {
        return Ok(statement.clone());
    }
    if let Some(path) = &args.file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read statement from {}", path.display()));
    }
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read statement from stdin")?;
    Ok(buffer)
}

fn load_client(args: &CheckArgs) -> Result<Option<ClientConfig>> {
    if let Some(path) = &args.client_config {
        return client_config::load_from(path).map(Some);
    }
    if let Some(id) = &args.client {
        let loader = ClientConfigLoader::new(Some(&args.working_dir));
        return loader.load(id).map(Some);
    }
    Ok(None)
}

/// Evaluate one statement; returns the verdict so the caller can pick an exit code
pub fn run_check(config: &Config, args: CheckArgs) -> Result<Outcome> {
    let statement = read_statement(&args)?;
    let client = load_client(&args)?;

    let ad_hoc: Vec<WhitelistEntry> = args.allow.iter().map(WhitelistEntry::new).collect();
    let whitelist = if !ad_hoc.is_empty() {
        Some(ad_hoc.as_slice())
    } else {
        client.as_ref().and_then(|c| c.whitelist())
    };

    let redactor = if config.audit.redact_literals {
        StatementRedactor::new()
    } else {
        StatementRedactor::disabled()
    };
    let engine = if config.gate.require_whitelist {
        DecisionEngine::schema_gated()
    } else {
        DecisionEngine::new()
    }
    .with_redactor(redactor);

    let decision = engine.decide(&statement, whitelist);

    let client_id = client
        .as_ref()
        .map(|c| c.client_id.clone())
        .or_else(|| args.client.clone())
        .unwrap_or_else(|| LOCAL_CLIENT.to_string());
    let mode = args
        .mode
        .or_else(|| client.as_ref().map(|c| c.mode))
        .unwrap_or(config.gate.default_mode);
    let request_id = args
        .request_id
        .clone()
        .unwrap_or_else(|| format!("req-{}", uuid::Uuid::new_v4()));

    let metadata = RequestMetadata::new(request_id, client_id)
        .with_description(args.description.clone().unwrap_or_default())
        .with_statement(&statement)
        .with_mode(mode)
        .with_rules(client.map(|c| c.rules).unwrap_or_default());

    let receipt = ReceiptBuilder::system()
        .build(&decision, &metadata)
        .context("Failed to build audit receipt")?;

    if !args.no_log {
        if let Some(log_path) = &config.audit.log_path {
            let digest = ReceiptLog::new(log_path)
                .append(&receipt)
                .with_context(|| format!("Failed to append to {}", log_path.display()))?;
            tracing::debug!("Receipt {} logged with digest {}", receipt.id(), digest);
        }
    }

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&receipt)?),
        OutputFormat::Text => print_receipt(&receipt),
    }

    Ok(decision.outcome())
}

fn print_receipt(receipt: &AuditReceipt) {
    let status = match receipt.status() {
        Outcome::Approved => receipt.status().to_string().green().bold(),
        Outcome::Blocked => receipt.status().to_string().red().bold(),
    };
    println!("{} {}", status, receipt.id().dimmed());
    if let Some(reason) = &receipt.response().reason {
        println!("  {}", reason);
    }
    println!();

    for check in receipt.compliance_checks() {
        let mark = if check.passed {
            "PASS".green()
        } else {
            "FAIL".red()
        };
        println!("  [{}] {}: {}", mark, check.name, check.details);
    }

    let rules = &receipt.response().matched_rules;
    if !rules.is_empty() {
        println!();
        println!("  {}", "Matched rules:".bold());
        for rule in rules {
            println!("    {} ({}) {}", rule.id, rule.category, rule.rule);
        }
    }
}

/// List the threat signature registry
pub fn run_signatures(format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(all_signatures())?);
        }
        OutputFormat::Text => {
            #[derive(Tabled)]
            struct SignatureRow {
                #[tabled(rename = "Signature")]
                name: &'static str,
                #[tabled(rename = "Severity")]
                severity: String,
                #[tabled(rename = "Category")]
                category: String,
                #[tabled(rename = "Description")]
                description: &'static str,
            }

            let rows: Vec<SignatureRow> = all_signatures()
                .iter()
                .map(|s| SignatureRow {
                    name: s.name,
                    severity: s.severity.to_string(),
                    category: s.category.to_string(),
                    description: s.description,
                })
                .collect();

            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{}", table);
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Show the policy that applies to a jurisdiction
pub fn run_retention_policy(jurisdiction: &str, format: OutputFormat) -> Result<()> {
    let resolution = retention::resolve(jurisdiction);
    if format == OutputFormat::Json {
        return print_json(&resolution);
    }

    if let Some(warning) = &resolution.warning {
        println!("{}", warning.to_string().yellow());
    }
    let policy = resolution.policy;
    println!("{} ({})", policy.name.bold(), policy.code);
    println!("  {}", policy.description);
    println!(
        "  Retention: default {} days, allowed {}-{} days",
        policy.default_days, policy.min_days, policy.max_days
    );
    println!("  Required measures: {}", policy.required_measures.join(", "));
    Ok(())
}

/// Expiry date for data stored today
pub fn run_retention_expiry(
    jurisdiction: &str,
    days: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    let policy = retention::resolve(jurisdiction).policy;
    let effective = policy.retention_days(days);
    let expiry = policy.expiry_at(days, Utc::now());
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "jurisdiction": jurisdiction,
            "effectiveDays": effective,
            "expiresAt": expiry.to_rfc3339(),
        })),
        OutputFormat::Text => {
            println!(
                "Retain for {} days, expires {}",
                effective,
                expiry.format("%Y-%m-%d")
            );
            Ok(())
        }
    }
}

/// Check a requested retention period
pub fn run_retention_validate(jurisdiction: &str, days: i64, format: OutputFormat) -> Result<bool> {
    let decision = retention::validate(jurisdiction, days);
    match format {
        OutputFormat::Json => print_json(&decision)?,
        OutputFormat::Text => {
            if decision.valid {
                println!(
                    "{} {} days is within the {} bounds",
                    "VALID".green().bold(),
                    decision.effective_days,
                    decision.policy_name
                );
            } else {
                println!(
                    "{} {}",
                    "INVALID".red().bold(),
                    decision.reason.as_deref().unwrap_or_default()
                );
                if let Some(days) = decision.suggested_days {
                    println!("  Suggested: {} days", days);
                }
            }
        }
    }
    Ok(decision.valid)
}

/// Compliance obligations of a jurisdiction
pub fn run_retention_requirements(jurisdiction: &str, format: OutputFormat) -> Result<()> {
    let reqs = retention::requirements(jurisdiction);
    if format == OutputFormat::Json {
        return print_json(&reqs);
    }
    println!("{} ({})", reqs.policy_name.bold(), reqs.jurisdiction);
    println!("  {}", reqs.description);
    for requirement in reqs.requirements {
        println!("  - {}", requirement);
    }
    Ok(())
}

/// Verify the digests of a receipt log; returns whether it is intact
pub fn run_audit_verify(config: &Config, log: Option<&Path>) -> Result<bool> {
    let path = match (log, &config.audit.log_path) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(path)) => path.clone(),
        (None, None) => bail!("No audit log configured; pass --log <path>"),
    };

    match ReceiptLog::new(&path).verify()? {
        LogVerification::Valid { entries, head } => {
            println!(
                "{} {} receipts verified in {}",
                "✓".green(),
                entries,
                path.display()
            );
            if let Some(head) = head {
                println!("  head digest: {}", head);
            }
            Ok(true)
        }
        LogVerification::Tampered {
            line,
            expected,
            actual,
        } => {
            println!(
                "{} line {} of {} was modified",
                "✗".red(),
                line,
                path.display()
            );
            println!("  stored digest:   {}", expected);
            println!("  computed digest: {}", actual);
            Ok(false)
        }
        LogVerification::BrokenLink {
            line,
            expected,
            actual,
        } => {
            println!(
                "{} line {} of {} does not follow the line before it (removed or reordered receipts)",
                "✗".red(),
                line,
                path.display()
            );
            println!("  expected previous digest: {}", expected);
            println!("  stored previous digest:   {}", actual);
            Ok(false)
        }
        LogVerification::OutOfSequence {
            line,
            expected,
            actual,
        } => {
            println!(
                "{} line {} of {} has sequence {}, expected {}",
                "✗".red(),
                line,
                path.display(),
                actual,
                expected
            );
            Ok(false)
        }
    }
}
