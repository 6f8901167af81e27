//! chaindex CLI - generate per-network catalogs from the CSV dataset.
//!
//! # Main Commands
//!
//! ```bash
//! chaindex validate                 # Check the dataset, print the report
//! chaindex generate                 # Validate, then write json/<network>.json
//! ```
//!
//! # Post-Generation (optional)
//!
//! ```bash
//! chaindex enrich                   # Patch artifacts with verified SLA metrics
//! ```
//!
//! Enrichment is a separate step over already-emitted artifacts, not part
//! of the generation gate. It needs the verified-API credentials in the
//! environment and is typically run from CI after `generate`.
//!
//! # Debug Commands
//!
//! ```bash
//! chaindex parse providers.csv      # Parse one CSV file to JSON
//! ```
//!
//! Exit codes: 0 on success, 1 for data problems (parse or validation
//! failures), 2 for I/O problems (unreadable sources, unwritable output).

use clap::{Parser, Subcommand};
use chaindex::{
    loader, pipeline, Config, PipelineError, VerifiedClient,
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "chaindex")]
#[command(about = "Generate per-network JSON catalogs of blockchain service providers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the dataset and print the collected report
    Validate {
        /// Dataset root directory
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Validate, then write one JSON artifact per network
    Generate {
        /// Dataset root directory
        #[arg(long)]
        root: Option<PathBuf>,

        /// Output directory (default: json)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Prefix prepended to provider logo filenames
        #[arg(long)]
        asset_prefix: Option<String>,
    },

    /// Parse one CSV file and print it as JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Patch emitted artifacts with verified SLA metrics
    Enrich {
        /// Artifact directory (default: json)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { root } => cmd_validate(root),
        Commands::Generate {
            root,
            out,
            asset_prefix,
        } => cmd_generate(root, out, asset_prefix),
        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()),
        Commands::Enrich { out } => cmd_enrich(out).await,
    };

    if let Err(e) = result {
        match &e {
            PipelineError::Validation { report } => {
                eprintln!("❌ {}:", report.summary());
                eprint!("{}", report);
            }
            other => eprintln!("❌ Error: {}", other),
        }
        process::exit(exit_code(&e));
    }
}

/// I/O failures get their own exit code; everything else is a data problem.
fn exit_code(error: &PipelineError) -> i32 {
    match error {
        PipelineError::Io { .. } => 2,
        _ => 1,
    }
}

fn resolve_config(
    root: Option<PathBuf>,
    out: Option<PathBuf>,
    asset_prefix: Option<String>,
) -> Config {
    let mut config = Config::from_env();
    if let Some(root) = root {
        config.root = root;
    }
    if let Some(out) = out {
        config.out_dir = out;
    }
    if let Some(prefix) = asset_prefix {
        config.asset_prefix = prefix;
    }
    config
}

fn cmd_validate(root: Option<PathBuf>) -> Result<(), PipelineError> {
    let config = resolve_config(root, None, None);
    eprintln!("📄 Validating dataset: {}", config.root.display());

    let outcome = pipeline::validate(&config)?;
    eprintln!(
        "   Providers: {}, offers: {}, networks: {}, records: {}",
        outcome.providers, outcome.offers, outcome.networks, outcome.records
    );

    if outcome.report.is_empty() {
        eprintln!("✅ Dataset is valid");
        Ok(())
    } else {
        Err(PipelineError::Validation {
            report: outcome.report,
        })
    }
}

fn cmd_generate(
    root: Option<PathBuf>,
    out: Option<PathBuf>,
    asset_prefix: Option<String>,
) -> Result<(), PipelineError> {
    let config = resolve_config(root, out, asset_prefix);
    eprintln!("📄 Generating artifacts from: {}", config.root.display());

    let outcome = pipeline::generate(&config)?;
    eprintln!(
        "✅ Wrote {} artifact(s) ({} records across {} networks)",
        outcome.written.len(),
        outcome.records,
        outcome.networks
    );
    for path in &outcome.written {
        eprintln!("   💾 {}", path.display());
    }
    Ok(())
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> Result<(), PipelineError> {
    eprintln!("📄 Parsing CSV: {}", input.display());

    let table = loader::load_table(input)?;
    eprintln!("   Columns: {}", table.headers.join(", "));
    eprintln!("✅ Parsed {} records", table.rows.len());

    let rows: Vec<Value> = table
        .rows
        .iter()
        .map(|row| Value::Object(row.values.clone()))
        .collect();
    let json = serde_json::to_string_pretty(&rows).expect("rows are valid JSON");
    write_output(&json, output)
}

async fn cmd_enrich(out: Option<PathBuf>) -> Result<(), PipelineError> {
    let config = resolve_config(None, out, None);
    eprintln!("📡 Enriching artifacts in: {}", config.out_dir.display());

    let client = VerifiedClient::from_env()?;
    client.enrich_artifacts(&config.out_dir).await?;
    eprintln!("✅ Done");
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), PipelineError> {
    match path {
        Some(p) => {
            fs::write(p, content).map_err(|e| PipelineError::io(p, e))?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
