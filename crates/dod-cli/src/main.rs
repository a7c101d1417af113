mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, evolution::EvolutionSubcommand, validate::ValidateArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "dod",
    about = "Definition-of-Done exoskeleton: compile rule specifications, validate projects, auto-fix and track rule health",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .dod/ or .git/)
    #[arg(long, global = true, env = "DOD_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .dod/ with a config and a starter specification
    Init {
        /// Starter specification: minimal, standard or enterprise
        #[arg(long, default_value = "standard")]
        template: String,
        /// Overwrite an existing specification
        #[arg(long)]
        force: bool,
    },

    /// Compile a specification and list its rules
    Compile {
        /// Specification file (default: `spec` from .dod/config.yaml)
        #[arg(long)]
        spec: Option<PathBuf>,
    },

    /// Validate the project against its specification
    Validate(ValidateArgs),

    /// Evaluate a single condition against the project context
    Check {
        /// Condition, e.g. "coverage >= 80"
        condition: String,
        /// Metrics file (default: `metrics_file` from .dod/config.yaml)
        #[arg(long)]
        metrics: Option<PathBuf>,
        /// Override a context value (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Show the context rules are evaluated against
    Context {
        /// Metrics file (default: `metrics_file` from .dod/config.yaml)
        #[arg(long)]
        metrics: Option<PathBuf>,
        /// Override a context value (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Inspect rule performance and evolution signals
    Evolution {
        #[command(subcommand)]
        subcommand: EvolutionSubcommand,
    },

    /// Show or validate .dod/config.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init { template, force } => cmd::init::run(&root, &template, force, cli.json),
        Commands::Compile { spec } => cmd::compile::run(&root, spec.as_deref(), cli.json),
        Commands::Validate(args) => cmd::validate::run(&root, args, cli.json),
        Commands::Check {
            condition,
            metrics,
            set,
        } => cmd::check::run(&root, &condition, metrics.as_deref(), &set, cli.json),
        Commands::Context { metrics, set } => {
            cmd::context::run(&root, metrics.as_deref(), &set, cli.json)
        }
        Commands::Evolution { subcommand } => cmd::evolution::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
