//! cp command - Copy files
//!
//! Copies files between the local filesystem and a directory, or between two
//! directories of the same alias with a server-side copy.

use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};

use bf_core::{ObjectHeaders, ParsedPath, RemotePath, parse_path};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

use super::put::{self, UploadOptions};
use super::session;

/// Copy files
#[derive(Args, Debug)]
pub struct CpArgs {
    /// Source path (local path or alias/bucket[/prefix]/key)
    pub source: String,

    /// Destination path (local path or alias/bucket[/prefix]/key)
    pub target: String,

    /// Refuse to replace an existing local destination
    #[arg(long)]
    pub no_overwrite: bool,

    /// Only show what would be copied (dry run)
    #[arg(long)]
    pub dry_run: bool,

    /// Content type for uploaded files
    #[arg(long)]
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct CpOutput {
    status: &'static str,
    source: String,
    target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_human: Option<String>,
}

/// Execute the cp command
pub async fn execute(args: CpArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let source = match parse_path(&args.source) {
        Ok(p) => p,
        Err(e) => return session::fail(&formatter, "Invalid source path", &e),
    };

    let target = match parse_path(&args.target) {
        Ok(p) => p,
        Err(e) => return session::fail(&formatter, "Invalid target path", &e),
    };

    match (source, target) {
        (ParsedPath::Local(src), ParsedPath::Remote(dst)) => {
            let dst = put::destination(&args.target, dst, &src);
            if args.dry_run {
                formatter.println(&format!("Would copy: {} -> {dst}", src.display()));
                return ExitCode::Success;
            }
            let options = UploadOptions {
                content_type: args.content_type.clone(),
                ..Default::default()
            };
            put::upload_file(&src, &dst, &options, &formatter).await
        }
        (ParsedPath::Remote(src), ParsedPath::Local(dst)) => {
            download_file(&src, &dst, &args, &formatter).await
        }
        (ParsedPath::Remote(src), ParsedPath::Remote(dst)) => {
            copy_remote(&src, dst, &args, &formatter).await
        }
        (ParsedPath::Local(_), ParsedPath::Local(_)) => {
            formatter.error("Cannot copy between two local paths. Use system cp command.");
            ExitCode::UsageError
        }
    }
}

/// Local path a download lands on
fn local_destination(src: &RemotePath, dst: &Path) -> PathBuf {
    if dst.is_dir() || dst.to_string_lossy().ends_with('/') {
        dst.join(&src.key)
    } else {
        dst.to_path_buf()
    }
}

async fn download_file(
    src: &RemotePath,
    dst: &Path,
    args: &CpArgs,
    formatter: &Formatter,
) -> ExitCode {
    if src.key.is_empty() {
        formatter.error(&format!("'{src}' does not name a file"));
        return ExitCode::UsageError;
    }

    let src_display = src.to_full_path();
    let dst_path = local_destination(src, dst);
    let dst_display = dst_path.display().to_string();

    if args.dry_run {
        formatter.println(&format!("Would copy: {src_display} -> {dst_display}"));
        return ExitCode::Success;
    }

    if blocks_overwrite(&dst_path, args.no_overwrite) {
        formatter.error(&format!(
            "Destination exists: {dst_display}. Drop --no-overwrite to replace it."
        ));
        return ExitCode::Conflict;
    }

    let files = match session::open(src).await {
        Ok(f) => f,
        Err(e) => return session::fail(formatter, "Failed to open directory", &e),
    };

    let file = match files.get(&src.key).await {
        Ok(Some(file)) => file,
        Ok(None) => {
            formatter.error(&format!("File not found: {src_display}"));
            return ExitCode::NotFound;
        }
        Err(e) => return session::fail(formatter, &format!("Failed to download {src_display}"), &e),
    };
    let data = file
        .body()
        .and_then(|body| body.as_bytes())
        .cloned()
        .unwrap_or_default();

    if let Some(parent) = dst_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = tokio::fs::create_dir_all(parent).await
    {
        formatter.error(&format!("Failed to create directory: {e}"));
        return ExitCode::GeneralError;
    }

    if let Err(e) = tokio::fs::write(&dst_path, &data).await {
        formatter.error(&format!("Failed to write {dst_display}: {e}"));
        return ExitCode::GeneralError;
    }

    let size = data.len() as u64;
    report(formatter, src_display, dst_display, Some(size));
    ExitCode::Success
}

async fn copy_remote(
    src: &RemotePath,
    dst: RemotePath,
    args: &CpArgs,
    formatter: &Formatter,
) -> ExitCode {
    if src.alias != dst.alias {
        formatter.error("Server-side copy needs source and target on the same alias");
        return ExitCode::UnsupportedFeature;
    }
    if src.key.is_empty() {
        formatter.error(&format!("'{src}' does not name a file"));
        return ExitCode::UsageError;
    }

    // A target without a file key keeps the source key
    let dst = if dst.key.is_empty() || args.target.ends_with('/') {
        let directory_key = if dst.key.is_empty() {
            dst.directory_key
        } else {
            format!("{}/{}", dst.directory_key, dst.key)
        };
        RemotePath::new(dst.alias, directory_key, src.key.clone())
    } else {
        dst
    };

    if args.dry_run {
        formatter.println(&format!("Would copy: {src} -> {dst}"));
        return ExitCode::Success;
    }

    let files = match session::open(src).await {
        Ok(f) => f,
        Err(e) => return session::fail(formatter, "Failed to open directory", &e),
    };

    let mut headers = ObjectHeaders::new();
    if let Some(content_type) = &args.content_type {
        headers.insert("Content-Type", content_type.as_str());
    }

    let file = files.new_file(src.key.clone());
    match file.copy(&dst.directory_key, &dst.key, &headers).await {
        Ok(_) => {
            report(formatter, src.to_full_path(), dst.to_full_path(), None);
            ExitCode::Success
        }
        Err(e) => session::fail(formatter, &format!("Failed to copy {src}"), &e),
    }
}

fn report(formatter: &Formatter, source: String, target: String, size: Option<u64>) {
    let size_human = size.map(|s| humansize::format_size(s, humansize::BINARY));
    if formatter.is_json() {
        formatter.json(&CpOutput {
            status: "success",
            source,
            target,
            size_bytes: size,
            size_human,
        });
    } else {
        match size_human {
            Some(human) => formatter.println(&format!("{source} -> {target} ({human})")),
            None => formatter.println(&format!("{source} -> {target}")),
        }
    }
}

fn blocks_overwrite(dst: &Path, no_overwrite: bool) -> bool {
    no_overwrite && dst.exists()
}
