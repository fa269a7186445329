//! Guided Modelling admin CLI
//!
//! Inspects workflow definitions and tries out fact templates without
//! starting the server.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use guided_modelling::{Context, ContextEntry, PatternCompiler, Uid, WorkflowRegistry};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "modeller")]
#[command(about = "Guided Modelling CLI - inspect workflow definitions and compile fact templates")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered workflows and their states
    List {
        /// Also load *.json definitions from this directory
        #[arg(long, env = "MODELLER_DEFINITIONS_DIR")]
        dir: Option<PathBuf>,
    },

    /// Load and validate a definitions directory
    Check {
        #[arg(long)]
        dir: PathBuf,
    },

    /// Compile a fact template against ad-hoc bindings
    Compile {
        /// Template line, repeatable
        #[arg(long = "pattern", required = true)]
        patterns: Vec<String>,

        /// Context binding KEY=UID:VALUE, repeatable
        #[arg(long = "bind")]
        bindings: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    match cli.command {
        Commands::List { dir } => {
            let registry = build_registry(dir.as_ref())?;
            for definition in registry.definitions() {
                println!("{} ({})", definition.id, definition.name);
                for node in definition.all_states() {
                    let marker = if node.is_final { " [final]" } else { "" };
                    println!("  - {}{}", node.id, marker);
                }
            }
        }
        Commands::Check { dir } => {
            let mut registry = WorkflowRegistry::with_defaults()?;
            let builtins = registry.len();
            let loaded = registry.load_dir(&dir)?;
            info!("✅ {} definition(s) in {} are valid", loaded, dir.display());

            let mut problems = 0;
            for definition in registry.definitions().into_iter().skip(builtins) {
                for state in definition.find_unreachable_states() {
                    warn!("⚠️  {}: state '{}' is unreachable", definition.id, state);
                    problems += 1;
                }
            }
            for (workflow, state, target) in registry.dangling_branches() {
                error!("❌ {}: state '{}' branches into unknown workflow '{}'", workflow, state, target);
                problems += 1;
            }
            if problems > 0 {
                return Err(anyhow!("{} problem(s) found", problems));
            }
        }
        Commands::Compile { patterns, bindings } => {
            let context = bindings
                .iter()
                .map(|binding| parse_binding(binding))
                .collect::<Result<Context>>()?;
            let facts = PatternCompiler::new().compile_lines(&patterns, &context)?;
            println!("{}", serde_json::to_string_pretty(&facts)?);
        }
    }

    Ok(())
}

fn build_registry(dir: Option<&PathBuf>) -> Result<WorkflowRegistry> {
    let mut registry = WorkflowRegistry::with_defaults()?;
    if let Some(dir) = dir {
        registry.load_dir(dir)?;
    }
    Ok(registry)
}

/// `Supertype=730044:physical object` → ("Supertype", entry)
fn parse_binding(binding: &str) -> Result<(String, ContextEntry)> {
    let (key, rest) = binding
        .split_once('=')
        .ok_or_else(|| anyhow!("binding {:?} is not KEY=UID:VALUE", binding))?;
    let (uid, value) = rest
        .split_once(':')
        .ok_or_else(|| anyhow!("binding {:?} is not KEY=UID:VALUE", binding))?;
    let uid: Uid = uid
        .trim()
        .parse()
        .map_err(|e| anyhow!("binding {:?} has a bad uid: {}", binding, e))?;
    Ok((key.trim().to_string(), ContextEntry::new(Some(uid), value)))
}
