//! Zapp - fusion deployment agent
//!
//! Usage:
//!   zapp extract web worker   # Build and extract fusions
//!   zapp affected core        # Fusions that declare a package
//!   zapp versions web         # Resolved package versions of a fusion
//!   zapp list                 # Configured fusions

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use zapp_core::config::{ConfigStore, PathResolver, ZappConfig};
use zapp_core::deploy::DirectoryExtractor;
use zapp_core::fuse::{DenyListFilter, EntryPattern, PlaceholderFilter};
use zapp_core::host::DirectoryHost;
use zapp_core::orchestration::{BatchReport, FuseServices, FusionBuildResult, FusionOrchestrator};
use zapp_core::package::DirectoryPackageStore;
use zapp_core::version::VersionFileSync;
use zapp_core::{FailureClass, FuseError};

const EXIT_NOT_READY: u8 = 2;

#[derive(Parser)]
#[command(name = "zapp")]
#[command(about = "Fusion deployment agent", long_about = None)]
struct Cli {
    /// Path to zapp.toml
    #[arg(long, short, default_value = "zapp.toml", global = true)]
    config: PathBuf,

    /// Output format
    #[arg(short, long, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and extract one or more fusions
    Extract {
        /// Fusion ids
        #[arg(required = true)]
        ids: Vec<String>,

        /// Render {fusionId} and {meta:<key>} in entries matching this glob
        #[arg(long = "render", value_name = "GLOB")]
        render: Vec<String>,

        /// Fail the build when an entry matches this glob
        #[arg(long = "deny", value_name = "GLOB")]
        deny: Vec<String>,
    },

    /// List the fusions that declare a package
    Affected {
        /// Package id
        package: String,
    },

    /// Show the resolved package versions of a fusion
    Versions {
        /// Fusion id
        fusion: String,
    },

    /// List configured fusions
    List,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zapp=info,zapp_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let store = ConfigStore::new(&cli.config);
    let config = store.load()?;

    match cli.command {
        Commands::Extract { ids, render, deny } => {
            let orchestrator = build_orchestrator(&config, store, &render, &deny)?;
            let report = orchestrator.extract_batch_report(&ids).await;
            print_batch_report(&report, cli.format)?;
            Ok(batch_exit_code(&report))
        }
        Commands::Affected { package } => {
            let orchestrator = build_orchestrator(&config, store, &[], &[])?;
            let fusions = orchestrator.affected_fusions(&package)?;
            match cli.format {
                OutputFormat::Table => {
                    if fusions.is_empty() {
                        println!("No fusions declare package '{}'.", package);
                    }
                    for id in &fusions {
                        println!("{}", id);
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&fusions)?),
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Versions { fusion } => {
            let orchestrator = build_orchestrator(&config, store, &[], &[])?;
            let versions = orchestrator.package_versions(&fusion).await?;
            match cli.format {
                OutputFormat::Table => {
                    println!("{:<30} Version", "Package");
                    println!("{}", "-".repeat(50));
                    for version in &versions {
                        println!(
                            "{:<30} {}",
                            version.package_id(),
                            version.deploy_version().unwrap_or("unknown")
                        );
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&versions)?),
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::List => {
            print_fusions(&config, cli.format)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_orchestrator(
    config: &ZappConfig,
    store: ConfigStore,
    render: &[String],
    deny: &[String],
) -> Result<FusionOrchestrator> {
    let paths = PathResolver::new(config.resolve_zapp_dir()?);
    let pattern = EntryPattern::new(&config.fuse.entry_pattern)?;

    let host = match &config.host_dir {
        Some(dir) => DirectoryHost::new(dir, "zapp", pattern),
        None => DirectoryHost::current(pattern)?,
    };

    let services = FuseServices {
        config: Arc::new(store),
        sync: Arc::new(VersionFileSync::new(paths.resolve(&config.versions_file))),
        store: Arc::new(DirectoryPackageStore::new(
            paths.resolve(&config.packages_dir),
        )),
        host: Arc::new(host),
        extractor: Arc::new(DirectoryExtractor::new(paths)),
    };

    let mut orchestrator = FusionOrchestrator::new(services)
        .with_timeouts(config.timeouts)
        .with_batch(config.batch);
    for glob in render {
        orchestrator = orchestrator.with_filter(
            PlaceholderFilter::new(glob).with_context(|| format!("Invalid --render glob: {}", glob))?,
        );
    }
    if !deny.is_empty() {
        orchestrator = orchestrator.with_filter(
            DenyListFilter::new(deny.iter().map(String::as_str)).context("Invalid --deny glob")?,
        );
    }
    Ok(orchestrator)
}

fn batch_exit_code(report: &BatchReport) -> ExitCode {
    if report.all_succeeded() {
        return ExitCode::SUCCESS;
    }
    let any_error = report.outcomes.iter().any(|outcome| outcome.result.is_err());
    if any_error {
        ExitCode::FAILURE
    } else {
        ExitCode::from(EXIT_NOT_READY)
    }
}

fn describe(result: &Result<FusionBuildResult, FuseError>) -> (String, String) {
    match result {
        Ok(FusionBuildResult::Extracted { digest, entries }) => (
            "extracted".to_string(),
            format!("{} entries, digest {}", entries, &digest[..digest.len().min(12)]),
        ),
        Ok(FusionBuildResult::VersionsUnresolved { unknown }) => (
            "not-ready".to_string(),
            format!("unresolved: {}", unknown.join(", ")),
        ),
        Ok(FusionBuildResult::PackagesNotDeployed { pending }) => (
            "not-ready".to_string(),
            format!(
                "not deployed: {}",
                pending
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        ),
        Err(err) => {
            let status = match err.class() {
                FailureClass::BadRequest => "bad-request",
                FailureClass::NotFound => "not-found",
                FailureClass::ServerError => "error",
            };
            (status.to_string(), error_chain(err))
        }
    }
}

fn error_chain(err: &FuseError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn print_batch_report(report: &BatchReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{:<20} {:<12} Detail", "Fusion", "Status");
            println!("{}", "-".repeat(70));
            for outcome in &report.outcomes {
                let (status, detail) = describe(&outcome.result);
                println!("{:<20} {:<12} {}", outcome.fusion_id, status, detail);
            }
            for id in &report.skipped {
                println!("{:<20} {:<12} -", id, "skipped");
            }
        }
        OutputFormat::Json => {
            let mut output: Vec<_> = report
                .outcomes
                .iter()
                .map(|outcome| {
                    let (status, detail) = describe(&outcome.result);
                    serde_json::json!({
                        "fusion": outcome.fusion_id,
                        "status": status,
                        "detail": detail,
                    })
                })
                .collect();
            output.extend(report.skipped.iter().map(|id| {
                serde_json::json!({
                    "fusion": id,
                    "status": "skipped",
                })
            }));
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_fusions(config: &ZappConfig, format: OutputFormat) -> Result<()> {
    let fusions = &config.fuse.fusions;
    match format {
        OutputFormat::Table => {
            if fusions.is_empty() {
                println!("No fusions configured.");
                return Ok(());
            }
            println!("{:<20} Packages", "Fusion");
            println!("{}", "-".repeat(50));
            for fusion in fusions {
                println!("{:<20} {}", fusion.id, fusion.package_ids.join(", "));
            }
        }
        OutputFormat::Json => {
            let output: Vec<_> = fusions
                .iter()
                .map(|fusion| {
                    serde_json::json!({
                        "id": fusion.id,
                        "packages": fusion.package_ids,
                        "metadata": fusion.metadata,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}
