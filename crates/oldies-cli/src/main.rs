//! # OldiesRules CLI
//!
//! Command-line interface for the PyNN -> NeuroML exporter.

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{debug, LevelFilter};
use oldies_neuroml::connectors::METHODS;
use oldies_neuroml::{CellModel, NetworkDescription};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "oldies")]
#[command(author = "Yatrogenesis")]
#[command(version = "0.1.0")]
#[command(about = "PyNN network descriptions to NeuroML", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a JSON network description to NeuroML
    Export {
        /// Network description (JSON)
        network: PathBuf,
        /// Output file, overrides setup.file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Log every population and projection
        #[arg(short, long)]
        verbose: bool,
    },

    /// List PyNN cell types and their NeuroML support
    Models,

    /// List connection methods
    Methods,
}

fn init_logging(debug: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Export {
            network,
            output,
            verbose,
        } => {
            let mut description = NetworkDescription::from_path(&network)?;
            init_logging(verbose || description.setup.debug);
            debug!("loaded {}", network.display());
            if let Some(path) = output {
                description.setup.file = path;
            }

            println!("{} {}", "Exporting network:".green().bold(), network.display());
            let summary = description.export()?;
            println!(
                "  {} populations, {} cells, {} projections",
                summary.populations.to_string().cyan(),
                summary.cells.to_string().cyan(),
                summary.projections.to_string().cyan()
            );
            println!(
                "{} {}",
                "Written:".green().bold(),
                description.setup.file.display()
            );
        }

        Commands::Models => {
            println!("{}", "PyNN Standard Cell Types:".green().bold());
            println!();
            for model in CellModel::ALL {
                match model.synapse_kind() {
                    Some(kind) => println!("  {} - {}", model.name().cyan(), kind.element()),
                    None => println!("  {} - {}", model.name().cyan(), "not available".yellow()),
                }
            }
        }

        Commands::Methods => {
            println!("{}", "Connection Methods:".green().bold());
            println!();
            for method in METHODS {
                if *method == "distanceDependentProbability" {
                    println!("  {} ({})", method.cyan(), "not available".yellow());
                } else {
                    println!("  {}", method.cyan());
                }
            }
        }
    }

    Ok(())
}
