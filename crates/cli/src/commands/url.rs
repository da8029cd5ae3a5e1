//! url command - Print a file URL
//!
//! Prints the public URL of a file, or an expiring signed URL when
//! `--expires` is given.

use clap::Args;
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

use super::session;

/// Print a public or expiring URL for a file
#[derive(Args, Debug)]
pub struct UrlArgs {
    /// File path (alias/bucket[/prefix]/key)
    pub path: String,

    /// Seconds the URL stays valid; 0 prints the public URL
    #[arg(long, default_value = "0")]
    pub expires: u64,
}

#[derive(Debug, Serialize)]
struct UrlOutput {
    path: String,
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_in_secs: Option<u64>,
}

/// Execute the url command
pub async fn execute(args: UrlArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let remote = match session::parse_file(&args.path) {
        Ok(r) => r,
        Err(e) => return session::fail(&formatter, "Invalid path", &e),
    };

    let files = match session::open(&remote).await {
        Ok(f) => f,
        Err(e) => return session::fail(&formatter, "Failed to open directory", &e),
    };

    let url = match files.new_file(remote.key.clone()).url(args.expires).await {
        Ok(url) => url,
        Err(e) => return session::fail(&formatter, "Failed to build URL", &e),
    };

    if formatter.is_json() {
        formatter.json(&UrlOutput {
            path: remote.to_full_path(),
            url,
            expires_in_secs: (args.expires > 0).then_some(args.expires),
        });
    } else {
        formatter.println(&url);
    }
    ExitCode::Success
}
