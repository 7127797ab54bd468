//! metalc command line
//!
//! Runs the semantic passes over a JSON declaration manifest and prints the
//! diagnostics, or the full hand-off report with `--json`.

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use metalc::diagnostics::Severity;
use metalc::driver::{self, HandoffReport, Manifest};

/// metal semantic checker
#[derive(Parser, Debug)]
#[command(name = "metalc")]
#[command(version = "0.1.0")]
#[command(about = "Resolve, check and fold a metal declaration manifest")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a declaration manifest
    Check {
        /// Manifest file (.json)
        manifest: PathBuf,

        /// Print the hand-off report as JSON
        #[arg(long)]
        json: bool,

        /// Drop diagnostics at or below this severity
        #[arg(long, value_enum)]
        ignore_level: Option<Severity>,

        /// Override the target word type
        #[arg(long)]
        word: Option<String>,

        /// Override the target character type
        #[arg(long)]
        character: Option<String>,

        /// Record compiler call sites on errors
        #[arg(long)]
        debug: bool,
    },
    /// Print version information
    Version,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Check {
            manifest,
            json,
            ignore_level,
            word,
            character,
            debug,
        } => {
            let overrides = Overrides {
                ignore_level,
                word,
                character,
                debug,
            };
            match check_manifest(&manifest, overrides) {
                Ok(report) => {
                    if let Err(e) = print_report(&report, json) {
                        eprintln!("Error: {:#}", e);
                        process::exit(1);
                    }
                    if report.has_errors() {
                        process::exit(1);
                    }
                }
                Err(e) => {
                    eprintln!("Error: {:#}", e);
                    process::exit(2);
                }
            }
        }
        Commands::Version => {
            println!("metalc 0.1.0");
            println!("metal semantic core");
        }
    }
}

/// Command line settings that take precedence over the manifest's
struct Overrides {
    ignore_level: Option<Severity>,
    word: Option<String>,
    character: Option<String>,
    debug: bool,
}

fn check_manifest(path: &PathBuf, overrides: Overrides) -> Result<HandoffReport> {
    let mut manifest = Manifest::from_path(path)?;
    let config = &mut manifest.config;
    if overrides.ignore_level.is_some() {
        config.ignore_level = overrides.ignore_level;
    }
    if let Some(word) = overrides.word {
        config.target.word = word;
    }
    if let Some(character) = overrides.character {
        config.target.character = character;
    }
    config.debug |= overrides.debug;

    log::info!("checking {}", path.display());
    let file = path.to_string_lossy();
    driver::check(&manifest, &file).with_context(|| format!("cannot check {}", path.display()))
}

fn print_report(report: &HandoffReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for diagnostic in &report.diagnostics.diagnostics {
        println!("{}", diagnostic);
    }
    for module in &report.modules {
        println!(
            "  [{}] module {}: {} structs, {} constants, {} globals",
            if report.has_errors() { "!" } else { "✓" },
            module.name,
            module.structs.len(),
            module.constants.len(),
            module.globals.len()
        );
    }
    if report.has_errors() {
        println!(
            "{} error(s), {} warning(s)",
            report.diagnostics.errors, report.diagnostics.warnings
        );
    } else {
        println!("✅ No errors found");
    }
    Ok(())
}
