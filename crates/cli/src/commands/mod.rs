//! CLI command definitions and execution
//!
//! Every command parses its paths, opens the file collection behind the
//! alias, and runs one File operation against it.

use bf_core::ConfigManager;
use bf_core::config::{Defaults, OutputFormat};
use clap::{Parser, Subcommand};

use crate::exit_code::ExitCode;
use crate::output::{self, OutputConfig};

mod alias;
mod cat;
pub mod cp;
pub mod put;
mod rm;
mod session;
mod stat;
mod url;

/// bf - object-storage file client
///
/// Reads and writes files on S3-compatible and OSS object storage,
/// with resumable multipart uploads for large files.
#[derive(Parser, Debug)]
#[command(name = "bf")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Print one JSON document instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,

    /// Never color output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Hide the multipart upload progress bar
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Only print errors and requested data
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log requests and upload phases at debug level
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage storage service aliases
    #[command(subcommand)]
    Alias(alias::AliasCommands),

    /// Upload a local file with headers and metadata
    Put(put::PutArgs),

    /// Display file contents
    Cat(cat::CatArgs),

    /// Show file attributes and metadata
    Stat(stat::StatArgs),

    /// Copy files (local<->remote, remote<->remote)
    Cp(cp::CpArgs),

    /// Remove files
    Rm(rm::RmArgs),

    /// Print a public or expiring URL for a file
    Url(url::UrlArgs),
}

/// Merge global flags with the `[defaults]` section of the config file.
/// Flags can only switch features off or request JSON.
fn output_config(cli: &Cli) -> OutputConfig {
    let defaults = match ConfigManager::new().and_then(|manager| manager.load()) {
        Ok(config) => config.defaults,
        Err(e) => {
            tracing::debug!(error = %e, "Using built-in output defaults");
            Defaults::default()
        }
    };

    OutputConfig {
        json: cli.json || defaults.output == OutputFormat::Json,
        color: !cli.no_color && output::use_color(defaults.color),
        progress: !cli.no_progress && defaults.progress,
        quiet: cli.quiet,
    }
}

/// Execute the CLI command and return an exit code
pub async fn execute(cli: Cli) -> ExitCode {
    let output_config = output_config(&cli);

    match cli.command {
        Commands::Alias(cmd) => alias::execute(cmd, output_config).await,
        Commands::Put(args) => put::execute(args, output_config).await,
        Commands::Cat(args) => cat::execute(args, output_config).await,
        Commands::Stat(args) => stat::execute(args, output_config).await,
        Commands::Cp(args) => cp::execute(args, output_config).await,
        Commands::Rm(args) => rm::execute(args, output_config).await,
        Commands::Url(args) => url::execute(args, output_config).await,
    }
}
