//! PuzzleForge CLI - Bridge interface for the editor
//!
//! Commands: validate, export, rules, next-id
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 on validation failure

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{fmt, EnvFilter};

use puzzleforge_core::{
    ids::next_document_id, ExportConfig, ExportError, ExportPipeline, ProjectDocument,
};

#[derive(Parser)]
#[command(name = "puzzleforge-cli")]
#[command(about = "PuzzleForge CLI - Project Validation Engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to export config (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a project document
    Validate {
        /// Project file (JSON)
        #[arg(short, long)]
        project: PathBuf,
    },

    /// Validate, then export a project bundle
    Export {
        /// Project file (JSON)
        #[arg(short, long)]
        project: PathBuf,

        /// Write the bundle here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// List checkers in run order
    Rules,

    /// Print the next free id for a prefix
    NextId {
        /// Project file (JSON)
        #[arg(short, long)]
        project: PathBuf,

        /// Id prefix, e.g. "stage"
        #[arg(long)]
        prefix: String,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("puzzleforge_core=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_project(path: &Path) -> anyhow::Result<ProjectDocument> {
    ProjectDocument::load(path)
        .with_context(|| format!("Failed to load project {}", path.display()))
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = ExportConfig::load_or_default(cli.config.as_deref())?;
    let pipeline = ExportPipeline::new(config);

    match cli.command {
        Commands::Validate { project } => {
            let doc = load_project(&project)?;
            match pipeline.validate(&doc) {
                Ok(report) => {
                    print_json(&report)?;
                    if report.valid {
                        Ok(ExitCode::SUCCESS)
                    } else {
                        Ok(ExitCode::from(2))  // Validation failure
                    }
                }
                Err(e) => {
                    print_json(&json!({"valid": false, "error": e.to_string()}))?;
                    Ok(ExitCode::from(2))
                }
            }
        }

        Commands::Export { project, out } => {
            let doc = load_project(&project)?;
            match pipeline.export(&doc) {
                Ok(bundle) => {
                    match out {
                        Some(path) => {
                            let content = serde_json::to_string_pretty(&bundle)?;
                            fs::write(&path, content)
                                .with_context(|| format!("Failed to write {}", path.display()))?;
                            print_json(&json!({
                                "success": true,
                                "out": path.display().to_string(),
                                "documentHash": bundle.document_hash,
                                "warnings": bundle.warnings.len(),
                            }))?;
                        }
                        None => print_json(&json!({"success": true, "bundle": bundle}))?,
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(ExportError::Serialization(e)) => Err(e.into()),
                Err(e) => {
                    print_json(&json!({"success": false, "error": e.to_string()}))?;
                    Ok(ExitCode::from(2))  // Export refused (validation)
                }
            }
        }

        Commands::Rules => {
            print_json(&pipeline.validator().rule_names())?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::NextId { project, prefix } => {
            let doc = load_project(&project)?;
            print_json(&json!({"id": next_document_id(&doc, &prefix)}))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            println!("{}", json!({"error": format!("{:#}", e)}));
            ExitCode::FAILURE
        }
    }
}
