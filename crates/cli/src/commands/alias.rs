//! `bf alias`: manage the endpoints remote paths refer to

use anyhow::{Context, bail};
use clap::Subcommand;
use serde::Serialize;

use bf_core::{Alias, AliasManager, Backend, BucketLookup, Error};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Alias subcommands for managing storage service connections
#[derive(Subcommand, Debug)]
pub enum AliasCommands {
    /// Add or update an alias
    Set(SetArgs),

    /// List all configured aliases
    List(ListArgs),

    /// Remove an alias
    Remove(RemoveArgs),
}

/// Arguments for the `alias set` command
#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Alias name (e.g., "local", "s3", "oss")
    pub name: String,

    /// Endpoint URL (e.g., "http://localhost:9000", "https://oss-cn-hangzhou.aliyuncs.com")
    pub endpoint: String,

    /// Access key ID
    pub access_key: String,

    /// Secret access key
    pub secret_key: String,

    /// Region (default: us-east-1)
    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// Backend protocol: s3 or oss (default: s3)
    #[arg(long, default_value = "s3")]
    pub backend: String,

    /// Bucket lookup style: auto, path, or dns (default: auto)
    #[arg(long, default_value = "auto")]
    pub bucket_lookup: String,

    /// Allow insecure TLS connections
    #[arg(long, default_value = "false")]
    pub insecure: bool,
}

/// Arguments for the `alias list` command
#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Show full details including endpoints
    #[arg(short, long)]
    pub long: bool,
}

/// Arguments for the `alias remove` command
#[derive(clap::Args, Debug)]
pub struct RemoveArgs {
    /// Name of the alias to remove
    pub name: String,
}

/// JSON output for alias list
#[derive(Serialize)]
struct AliasListOutput {
    aliases: Vec<AliasInfo>,
}

/// Alias information for JSON output (without sensitive data)
#[derive(Serialize)]
struct AliasInfo {
    name: String,
    endpoint: String,
    region: String,
    backend: Backend,
    bucket_lookup: BucketLookup,
}

impl From<&Alias> for AliasInfo {
    fn from(alias: &Alias) -> Self {
        Self {
            name: alias.name.clone(),
            endpoint: alias.endpoint.clone(),
            region: alias.region.clone(),
            backend: alias.backend,
            bucket_lookup: alias.bucket_lookup,
        }
    }
}

/// JSON output for alias set/remove operations
#[derive(Serialize)]
struct AliasOperationOutput {
    alias: String,
    action: &'static str,
}

/// Execute an alias subcommand
pub async fn execute(cmd: AliasCommands, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let alias_manager = match AliasManager::new() {
        Ok(am) => am,
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::GeneralError;
        }
    };

    match cmd {
        AliasCommands::Set(args) => execute_set(args, &alias_manager, &formatter),
        AliasCommands::List(args) => execute_list(args, &alias_manager, &formatter),
        AliasCommands::Remove(args) => execute_remove(args, &alias_manager, &formatter),
    }
}

/// Validate `alias set` arguments into an alias
fn build_alias(args: SetArgs) -> anyhow::Result<Alias> {
    if args.access_key.is_empty() != args.secret_key.is_empty() {
        bail!("Access key and secret key must be given together");
    }

    let backend: Backend = args
        .backend
        .parse()
        .with_context(|| format!("Invalid backend for alias '{}'", args.name))?;
    let bucket_lookup: BucketLookup = args
        .bucket_lookup
        .parse()
        .with_context(|| format!("Invalid bucket lookup for alias '{}'", args.name))?;

    let mut alias = Alias::new(args.name, args.endpoint, args.access_key, args.secret_key);
    alias.region = args.region;
    alias.backend = backend;
    alias.bucket_lookup = bucket_lookup;
    alias.insecure = args.insecure;
    alias.validate()?;
    Ok(alias)
}

fn execute_set(args: SetArgs, manager: &AliasManager, formatter: &Formatter) -> ExitCode {
    let alias = match build_alias(args) {
        Ok(alias) => alias,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return ExitCode::UsageError;
        }
    };
    let name = alias.name.clone();

    match manager.set(alias) {
        Ok(replaced) => {
            let action = if replaced { "updated" } else { "added" };
            if formatter.is_json() {
                formatter.json(&AliasOperationOutput { alias: name, action });
            } else {
                formatter.success(&format!("Alias '{name}' {action}."));
            }
            ExitCode::Success
        }
        Err(e) => {
            formatter.error(&e.to_string());
            ExitCode::from(&e)
        }
    }
}

fn execute_list(args: ListArgs, manager: &AliasManager, formatter: &Formatter) -> ExitCode {
    match manager.list() {
        Ok(aliases) => {
            if formatter.is_json() {
                formatter.json(&AliasListOutput {
                    aliases: aliases.iter().map(AliasInfo::from).collect(),
                });
            } else if aliases.is_empty() {
                formatter.println("No aliases configured.");
            } else if args.long {
                for alias in &aliases {
                    formatter.println(&format!(
                        "{:<12} {} (backend: {}, region: {}, lookup: {})",
                        alias.name, alias.endpoint, alias.backend, alias.region, alias.bucket_lookup
                    ));
                }
            } else {
                for alias in &aliases {
                    formatter.println(&format!("{:<12} {}", alias.name, alias.endpoint));
                }
            }
            ExitCode::Success
        }
        Err(e) => {
            formatter.error(&e.to_string());
            ExitCode::from(&e)
        }
    }
}

fn execute_remove(args: RemoveArgs, manager: &AliasManager, formatter: &Formatter) -> ExitCode {
    match manager.remove(&args.name) {
        Ok(removed) => {
            if formatter.is_json() {
                formatter.json(&AliasOperationOutput {
                    alias: removed.name,
                    action: "removed",
                });
            } else {
                formatter.success(&format!("Alias '{}' removed.", removed.name));
            }
            ExitCode::Success
        }
        Err(Error::AliasNotFound(_)) => {
            formatter.error(&format!("Alias '{}' not found", args.name));
            ExitCode::NotFound
        }
        Err(e) => {
            formatter.error(&e.to_string());
            ExitCode::from(&e)
        }
    }
}
