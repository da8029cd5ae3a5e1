//! rm command - Remove files
//!
//! Removes one or more files. Each path is deleted independently; failures
//! are reported and the worst exit code wins.

use clap::Args;
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

use super::session;

/// Remove files
#[derive(Args, Debug)]
pub struct RmArgs {
    /// File path(s) to remove (alias/bucket[/prefix]/key)
    #[arg(required = true)]
    pub paths: Vec<String>,

    /// Ignore files that do not exist
    #[arg(short, long)]
    pub force: bool,

    /// Only show what would be deleted (dry run)
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
struct RmOutput {
    status: &'static str,
    deleted: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failed: Vec<String>,
    total: usize,
}

/// Execute the rm command
pub async fn execute(args: RmArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let mut deleted = Vec::new();
    let mut failed = Vec::new();
    let mut exit_code = ExitCode::Success;

    for path in &args.paths {
        match remove_one(path, &args, &formatter).await {
            ExitCode::Success => deleted.push(path.clone()),
            code => {
                failed.push(path.clone());
                // Usage and auth problems repeat for every path
                if code == ExitCode::UsageError || code == ExitCode::AuthError {
                    return code;
                }
                exit_code = code;
            }
        }
    }

    if formatter.is_json() {
        let total = deleted.len() + failed.len();
        formatter.json(&RmOutput {
            status: if failed.is_empty() { "success" } else { "partial" },
            deleted,
            failed,
            total,
        });
    } else if !args.dry_run && failed.is_empty() {
        formatter.success(&format!("Removed {} file(s).", deleted.len()));
    }
    exit_code
}

async fn remove_one(path: &str, args: &RmArgs, formatter: &Formatter) -> ExitCode {
    let remote = match session::parse_file(path) {
        Ok(r) => r,
        Err(e) => return session::fail(formatter, "Invalid path", &e),
    };

    if args.dry_run {
        formatter.println(&format!("Would remove: {remote}"));
        return ExitCode::Success;
    }

    let files = match session::open(&remote).await {
        Ok(f) => f,
        Err(e) => return session::fail(formatter, "Failed to open directory", &e),
    };

    match files.new_file(remote.key.clone()).destroy().await {
        Ok(_) => {
            tracing::debug!(path, "Removed file");
            ExitCode::Success
        }
        Err(e) if e.is_not_found() && args.force => ExitCode::Success,
        Err(e) => session::fail(formatter, &format!("Failed to remove {path}"), &e),
    }
}
