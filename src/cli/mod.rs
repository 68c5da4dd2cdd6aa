//! CLI module: command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod check;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};

use corewire::config::Config;
use corewire::validator::Environment;

#[derive(Parser)]
#[command(name = "corewire")]
#[command(version)]
#[command(about = "Service registry and startup dependency checks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate external dependencies against a manifest (exit 1 on required failures)
    Check {
        /// Manifest file (.yaml, .yml, .toml, or .json)
        #[arg(short, long)]
        manifest: Option<PathBuf>,
        /// Environment; development entries are checked in development and test
        #[arg(short, long, value_enum)]
        env: Option<EnvArg>,
        /// Print the result as JSON instead of a report
        #[arg(long)]
        json: bool,
    },
    /// Show which manifest features are available, degraded, or unavailable
    Features {
        #[arg(short, long)]
        manifest: Option<PathBuf>,
        #[arg(short, long, value_enum)]
        env: Option<EnvArg>,
    },
    /// List dependency groups, or print the install command for one group
    Groups {
        /// Group name
        name: Option<String>,
        #[arg(short, long)]
        manifest: Option<PathBuf>,
    },
    /// Show version information
    Version,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum EnvArg {
    Production,
    Development,
    Test,
}

impl From<EnvArg> for Environment {
    fn from(arg: EnvArg) -> Self {
        match arg {
            EnvArg::Production => Environment::Production,
            EnvArg::Development => Environment::Development,
            EnvArg::Test => Environment::Test,
        }
    }
}

/// Entry point for the CLI, called from main().
pub async fn run() -> Result<()> {
    // Logging comes up even when the config is broken so the load error below is reported.
    let logging = Config::load().map(|c| c.logging).unwrap_or_default();
    corewire::utils::logging::init_logging(&logging)?;

    let cli = Cli::parse();

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Check {
            manifest,
            env,
            json,
        }) => {
            let config = load_config()?;
            let environment = env.map(Into::into).unwrap_or(config.validator.environment);
            let ok = check::cmd_check(&config, manifest, environment, json)?;
            if !ok {
                std::process::exit(1);
            }
        }
        Some(Commands::Features { manifest, env }) => {
            let config = load_config()?;
            let environment = env.map(Into::into).unwrap_or(config.validator.environment);
            check::cmd_features(&config, manifest, environment)?;
        }
        Some(Commands::Groups { name, manifest }) => {
            let config = load_config()?;
            check::cmd_groups(&config, manifest, name.as_deref())?;
        }
        Some(Commands::Version) => {
            cmd_version();
        }
    }

    Ok(())
}

/// Load the config for a command and publish it globally.
fn load_config() -> Result<Config> {
    let config = Config::load().with_context(|| "Failed to load configuration")?;
    Config::init_global(config.clone());
    Ok(config)
}

fn cmd_version() {
    println!("corewire {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Service registry and startup dependency checks");
}
