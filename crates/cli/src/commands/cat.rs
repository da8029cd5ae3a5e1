//! cat command - Display file contents
//!
//! Fetches a file with its body and writes the bytes to stdout.

use clap::Args;
use std::io::{self, Write};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

use super::session;

/// Display file contents
#[derive(Args, Debug)]
pub struct CatArgs {
    /// File path (alias/bucket[/prefix]/key)
    pub path: String,
}

/// Execute the cat command
pub async fn execute(args: CatArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let remote = match session::parse_file(&args.path) {
        Ok(r) => r,
        Err(e) => return session::fail(&formatter, "Invalid path", &e),
    };

    let files = match session::open(&remote).await {
        Ok(f) => f,
        Err(e) => return session::fail(&formatter, "Failed to open directory", &e),
    };

    let file = match files.get(&remote.key).await {
        Ok(Some(file)) => file,
        Ok(None) => {
            formatter.error(&format!("File not found: {}", args.path));
            return ExitCode::NotFound;
        }
        Err(e) => return session::fail(&formatter, "Failed to get file", &e),
    };

    let data = file.body().and_then(|body| body.as_bytes());
    // Write directly to stdout (not through formatter to preserve binary data)
    if let Some(data) = data
        && let Err(e) = io::stdout().write_all(data)
    {
        formatter.error(&format!("Failed to write to stdout: {e}"));
        return ExitCode::GeneralError;
    }
    ExitCode::Success
}
