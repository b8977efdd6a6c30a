//! Pipeline Config CLI
//!
//! View and manage proto-slim configuration.

use clap::{Parser, Subcommand};
use proto_slim::PipelineConfig;

#[derive(Parser)]
#[command(name = "proto-slim-config")]
#[command(about = "View and manage proto-slim configuration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current configuration
    Show {
        /// Config file to load (optional)
        #[arg(short, long)]
        config: Option<String>,

        /// Output as TOML
        #[arg(long)]
        toml: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Initialize a new config file
    Init {
        /// Output path
        #[arg(short, long, default_value = "proto-slim.toml")]
        output: String,
    },

    /// Validate configuration
    Validate {
        /// Config file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Show { config, toml, json } => {
            let cfg = PipelineConfig::load_from(config.as_deref())?;

            if json {
                println!("{}", serde_json::to_string_pretty(&cfg)?);
            } else if toml {
                println!("{}", ::toml::to_string_pretty(&cfg)?);
            } else {
                println!("📋 proto-slim Configuration\n");
                println!("Layout:");
                println!("  Root: {:?}", cfg.layout.root);
                println!("  Base root: {:?}", cfg.layout.base_root);
                println!("  Overlay root: {:?}", cfg.layout.overlay_root);
                println!("  Output: {:?}", cfg.layout.output_dir);
                println!("  Services: {:?}", cfg.layout.services_dir);

                println!("\nCompiler:");
                println!("  Program: {}", cfg.compiler.program);
                println!("  Output flags: {}", cfg.compiler.output_flags.join(" "));
                println!("  Timeout: {}s", cfg.compiler.timeout_secs);
                println!("  Working directory: {:?}", cfg.compiler.workdir_mode);
                println!("  Parallel: {}", cfg.compiler.parallel);

                println!("\nStubs ({:?}/{:?}):", cfg.stubs.source, cfg.stubs.source_dir);
                for f in &cfg.stubs.files {
                    println!("    - {}", f);
                }

                println!("\nOutput:");
                println!("  Staging: {}", cfg.output.staging);
                println!("  Report: {:?}", cfg.output.report);
            }
        }

        Commands::Init { output } => {
            let cfg = PipelineConfig::default();
            cfg.save(&output)?;
            println!("✅ Created config file: {}", output);
        }

        Commands::Validate { config } => match PipelineConfig::load_from(config.as_deref()) {
            Ok(cfg) => {
                println!("✅ Configuration is valid");
                println!("   Base root: {:?}", cfg.base_root()?);
                println!("   Overlay root: {:?}", cfg.overlay_root()?);
                println!("   Output: {:?}", cfg.output_dir()?);
            }
            Err(e) => {
                eprintln!("❌ Configuration error: {}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
