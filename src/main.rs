use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opsgate::config::Config;
use opsgate::policy::types::{Outcome, TaskMode};
use opsgate::transport::cli::{self, CheckArgs, OutputFormat};

/// Exit status for a blocked statement or a failed validation
const EXIT_BLOCKED: i32 = 2;

#[derive(Parser)]
#[command(name = "opsgate")]
#[command(
    author,
    version = concat!(env!("CARGO_PKG_VERSION"), env!("OPSGATE_VERSION_SUFFIX")),
    about = "opsgate - compliance gate for SQL and data export requests",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a statement and print its audit receipt
    Check {
        /// Statement text (default: read --file, then stdin)
        #[arg(short, long)]
        statement: Option<String>,

        /// File containing the statement
        #[arg(short, long, conflicts_with = "statement")]
        file: Option<PathBuf>,

        /// Client id, resolved through the client config directories
        #[arg(short, long)]
        client: Option<String>,

        /// Explicit client config file
        #[arg(long, conflicts_with = "client")]
        client_config: Option<PathBuf>,

        /// Whitelisted table (repeatable); replaces the client's whitelist
        #[arg(short, long = "allow", value_name = "TABLE")]
        allow: Vec<String>,

        /// Human description of the request
        #[arg(short, long)]
        description: Option<String>,

        /// Request id (default: random)
        #[arg(long)]
        request_id: Option<String>,

        /// Task mode (sql, excel)
        #[arg(short, long)]
        mode: Option<TaskMode>,

        /// Do not append the receipt to the audit log
        #[arg(long)]
        no_log: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Working directory for workspace client configs (default: current directory)
        #[arg(long)]
        cwd: Option<PathBuf>,
    },

    /// List the builtin threat signatures
    Signatures {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Data retention rules by jurisdiction
    Retention {
        #[command(subcommand)]
        command: RetentionCommands,
    },

    /// Audit log maintenance
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
}

#[derive(Subcommand)]
enum RetentionCommands {
    /// Show the policy for a jurisdiction
    Policy {
        /// Jurisdiction code (default: from config)
        jurisdiction: Option<String>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Compute the expiry date for data stored now
    Expiry {
        jurisdiction: Option<String>,

        /// Requested retention in days (clamped to the policy bounds)
        #[arg(long)]
        days: Option<u32>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Check a requested retention period
    Validate {
        /// Requested retention in days
        #[arg(allow_negative_numbers = true)]
        days: i64,

        #[arg(short, long)]
        jurisdiction: Option<String>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List compliance requirements for a jurisdiction
    Requirements {
        jurisdiction: Option<String>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Subcommand)]
enum AuditCommands {
    /// Recompute receipt digests and report tampering
    Verify {
        /// Receipt log (default: audit.log_path from config)
        #[arg(long)]
        log: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "opsgate=debug"
    } else {
        "opsgate=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load()?;
    let jurisdiction = |code: Option<String>| {
        code.unwrap_or_else(|| config.retention.default_jurisdiction.clone())
    };

    match cli.command {
        Commands::Check {
            statement,
            file,
            client,
            client_config,
            allow,
            description,
            request_id,
            mode,
            no_log,
            format,
            cwd,
        } => {
            let working_dir = cwd
                .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| ".".into()));
            let args = CheckArgs {
                statement,
                file,
                client,
                client_config,
                allow,
                description,
                request_id,
                mode,
                no_log,
                format,
                working_dir,
            };
            if cli::run_check(&config, args)? == Outcome::Blocked {
                std::process::exit(EXIT_BLOCKED);
            }
        }
        Commands::Signatures { format } => {
            cli::run_signatures(format)?;
        }
        Commands::Retention { command } => match command {
            RetentionCommands::Policy {
                jurisdiction: code,
                format,
            } => cli::run_retention_policy(&jurisdiction(code), format)?,
            RetentionCommands::Expiry {
                jurisdiction: code,
                days,
                format,
            } => cli::run_retention_expiry(&jurisdiction(code), days, format)?,
            RetentionCommands::Validate {
                days,
                jurisdiction: code,
                format,
            } => {
                if !cli::run_retention_validate(&jurisdiction(code), days, format)? {
                    std::process::exit(EXIT_BLOCKED);
                }
            }
            RetentionCommands::Requirements {
                jurisdiction: code,
                format,
            } => cli::run_retention_requirements(&jurisdiction(code), format)?,
        },
        Commands::Audit { command } => match command {
            AuditCommands::Verify { log } => {
                if !cli::run_audit_verify(&config, log.as_deref())? {
                    std::process::exit(EXIT_BLOCKED);
                }
            }
        },
    }

    Ok(())
}
