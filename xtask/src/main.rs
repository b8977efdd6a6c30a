use std::path::PathBuf;

use clap::{Parser, Subcommand};
use proto_slim::{PackageAssembler, PipelineConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build hooks for the minimized client package")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Regenerate the package (compile protos, then copy gRPC stubs)
    Package {
        /// Config file (optional)
        #[arg(short, long)]
        config: Option<String>,
        /// Write the assembly report here
        #[arg(long, default_value = "target/proto-slim/assembly.json")]
        report: PathBuf,
    },
    /// Print the assembly report of the last `package` run
    Report {
        #[arg(default_value = "target/proto-slim/assembly.json")]
        path: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Package { config, report } => {
            let mut cfg = PipelineConfig::load_from(config.as_deref())?;
            cfg.output.report = Some(report);
            let report = PackageAssembler::new(cfg).assemble()?;
            println!("📦 {} files in {}", report.artifacts.len(), report.output_dir.display());
        }

        Commands::Report { path } => {
            let raw = std::fs::read_to_string(&path)?;
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}
