//! Cluster console CLI
//!
//! A command-line tool for viewing resource reservation across a cluster or
//! namespace, and for drafting, validating and submitting ingress rules.

mod client;
mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::ingress::Backend;
use commands::{ingress, reservation};
use console_lib::{ConsoleLogger, Scope, StaticCapabilities};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::client::ApiClient;
use crate::config::{LogFormat, Settings};

/// Cluster console CLI
#[derive(Parser)]
#[command(name = "kconsole")]
#[command(author, version, about = "Cluster console for resource reservation and ingress rules", long_about = None)]
pub struct Cli {
    /// Management backend URL (can also be set via KCONSOLE_API_URL env var)
    #[arg(long, env = "KCONSOLE_API_URL")]
    pub api_url: Option<String>,

    /// Environment (cluster) id
    #[arg(long, short, env = "KCONSOLE_ENVIRONMENT_ID")]
    pub environment: Option<u32>,

    /// Path to a config file (defaults to ~/.config/kconsole/config.*)
    #[arg(long, env = "KCONSOLE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show resource reservation and usage
    #[command(subcommand)]
    Reservation(ReservationCommands),

    /// Manage ingress rules
    #[command(subcommand)]
    Ingress(IngressCommands),
}

#[derive(Subcommand)]
pub enum ReservationCommands {
    /// Reservation across all cluster nodes
    Cluster,

    /// Reservation against a namespace's resource quota
    Namespace {
        /// Namespace (uses the configured default if not specified)
        namespace: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum IngressCommands {
    /// List ingress rules
    List {
        /// Filter by namespace
        #[arg(long, short)]
        namespace: Option<String>,
    },

    /// Propose the next free rule name in a namespace
    NextName {
        /// Namespace (uses the configured default if not specified)
        namespace: Option<String>,

        /// Name prefix (defaults to <namespace>-ingress)
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Show ingress classes, TLS secrets and services available in a namespace
    Options {
        /// Namespace (uses the configured default if not specified)
        namespace: Option<String>,
    },

    /// Create an ingress rule from a JSON draft
    Create {
        /// Draft file
        #[arg(long)]
        file: PathBuf,

        /// Target namespace (overrides the draft's)
        #[arg(long, short)]
        namespace: Option<String>,

        /// Validate and print the payload without submitting
        #[arg(long)]
        dry_run: bool,
    },

    /// Replace an existing ingress rule with a JSON draft
    Update {
        /// Namespace of the rule
        namespace: String,

        /// Name of the rule
        name: String,

        /// Draft file
        #[arg(long)]
        file: PathBuf,

        /// Validate and print the payload without submitting
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate a JSON draft without submitting it
    Check {
        /// Draft file
        #[arg(long)]
        file: PathBuf,

        /// Target namespace (overrides the draft's)
        #[arg(long, short)]
        namespace: Option<String>,

        /// Check as an edit of this existing rule in the namespace
        #[arg(long)]
        rule: Option<String>,

        /// Revalidate whenever the file changes
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration, command-line flags take precedence
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(api_url) = cli.api_url {
        settings.api_url = api_url;
    }
    if let Some(environment) = cli.environment {
        settings.environment_id = environment;
    }

    init_tracing(settings.log_format, cli.verbose);

    // Initialize client
    let client = Arc::new(ApiClient::new(
        &settings.api_url,
        settings.environment_id,
        settings.api_key.as_deref(),
    )?);
    let logger = ConsoleLogger::new(client.environment_id().to_string());

    // Execute command
    match cli.command {
        Commands::Reservation(reservation_cmd) => {
            let capabilities = Arc::new(capabilities(&client, &settings).await);
            let scope = match reservation_cmd {
                ReservationCommands::Cluster => Scope::Cluster,
                ReservationCommands::Namespace { namespace } => {
                    Scope::Namespace(require_namespace(&settings, namespace)?)
                }
            };
            reservation::show_reservation(client, capabilities, scope, logger, cli.format).await?;
        }
        Commands::Ingress(ingress_cmd) => {
            // Ingress forms never read usage metrics
            let capabilities = settings.capabilities(false);
            let backend = Backend {
                source: client.as_ref(),
                submitter: client.as_ref(),
                capabilities: &capabilities,
                logger: logger.clone(),
            };

            match ingress_cmd {
                IngressCommands::List { namespace } => {
                    ingress::list_rules(client.as_ref(), namespace, cli.format).await?;
                }
                IngressCommands::NextName { namespace, prefix } => {
                    let namespace = require_namespace(&settings, namespace)?;
                    ingress::next_name(client.as_ref(), &namespace, prefix, cli.format).await?;
                }
                IngressCommands::Options { namespace } => {
                    let namespace = require_namespace(&settings, namespace)?;
                    ingress::show_options(client.as_ref(), &capabilities, &namespace, logger, cli.format)
                        .await?;
                }
                IngressCommands::Create {
                    file,
                    namespace,
                    dry_run,
                } => {
                    ingress::create_rule(&backend, &file, namespace, dry_run, cli.format).await?;
                }
                IngressCommands::Update {
                    namespace,
                    name,
                    file,
                    dry_run,
                } => {
                    ingress::update_rule(&backend, &namespace, &name, &file, dry_run, cli.format)
                        .await?;
                }
                IngressCommands::Check {
                    file,
                    namespace,
                    rule,
                    watch,
                } => {
                    ingress::check_draft(
                        &backend,
                        &file,
                        namespace,
                        rule,
                        watch,
                        settings.validation_debounce(),
                        cli.format,
                    )
                    .await?;
                }
            }
        }
    }

    Ok(())
}

/// Initialize tracing on stderr so command output stays parseable
fn init_tracing(format: LogFormat, verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

/// Capabilities for reservation views, reading the metrics flag from the environment unless overridden
async fn capabilities(client: &ApiClient, settings: &Settings) -> StaticCapabilities {
    let server_metrics = match settings.server_metrics {
        Some(enabled) => enabled,
        None => client.server_metrics_enabled().await.unwrap_or_else(|e| {
            warn!(error = %format!("{:#}", e), "Unable to read environment metrics setting, usage disabled");
            false
        }),
    };
    settings.capabilities(server_metrics)
}

fn require_namespace(settings: &Settings, explicit: Option<String>) -> Result<String> {
    settings
        .namespace(explicit)
        .context("No namespace given and no default_namespace configured")
}
