//! put command - Upload a local file
//!
//! Saves a local file to a directory with optional content headers and user
//! metadata. Large files go through a resumable multipart upload.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use clap::Args;
use serde::Serialize;

use bf_core::{Metadata, ObjectHeaders, RemotePath};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, ProgressBar};

use super::session;

/// Upload a local file
#[derive(Args, Debug)]
pub struct PutArgs {
    /// Local file to upload
    pub source: PathBuf,

    /// Destination (alias/bucket[/prefix]/key); a trailing '/' keeps the local file name
    pub target: String,

    /// Content type (guessed from the file name when omitted)
    #[arg(long)]
    pub content_type: Option<String>,

    /// Content disposition
    #[arg(long)]
    pub content_disposition: Option<String>,

    /// User metadata entry, repeatable
    #[arg(long = "meta", value_name = "KEY=VALUE")]
    pub meta: Vec<String>,

    /// Extra request header, repeatable
    #[arg(long = "header", value_name = "NAME:VALUE")]
    pub headers: Vec<String>,
}

/// What to send along with an uploaded body
#[derive(Debug, Default, Clone)]
pub struct UploadOptions {
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub metadata: Metadata,
    pub headers: ObjectHeaders,
}

#[derive(Debug, Serialize)]
struct PutOutput {
    status: &'static str,
    source: String,
    target: String,
    size_bytes: u64,
    size_human: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
    confirmed: bool,
}

/// Execute the put command
pub async fn execute(args: PutArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let options = match upload_options(&args) {
        Ok(o) => o,
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::UsageError;
        }
    };

    let target = match session::parse_remote(&args.target) {
        Ok(r) => destination(&args.target, r, &args.source),
        Err(e) => return session::fail(&formatter, "Invalid target path", &e),
    };

    upload_file(&args.source, &target, &options, &formatter).await
}

fn upload_options(args: &PutArgs) -> anyhow::Result<UploadOptions> {
    let mut options = UploadOptions {
        content_type: args.content_type.clone(),
        content_disposition: args.content_disposition.clone(),
        ..Default::default()
    };
    for entry in &args.meta {
        let (key, value) = parse_pair(entry, '=')
            .ok_or_else(|| anyhow!("Invalid metadata '{entry}'. Expected KEY=VALUE"))?;
        options.metadata.insert(key, value);
    }
    for entry in &args.headers {
        let (name, value) = parse_pair(entry, ':')
            .ok_or_else(|| anyhow!("Invalid header '{entry}'. Expected NAME:VALUE"))?;
        options.headers.insert(name, value);
    }
    Ok(options)
}

fn parse_pair(entry: &str, separator: char) -> Option<(String, String)> {
    let (key, value) = entry.split_once(separator)?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.trim().to_string()))
}

/// Resolve the remote file for an upload
///
/// A target without a file key, or written with a trailing '/', names a
/// directory and receives the local file name.
pub(crate) fn destination(raw: &str, parsed: RemotePath, source: &Path) -> RemotePath {
    let filename = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if parsed.key.is_empty() {
        RemotePath::new(parsed.alias, parsed.directory_key, filename)
    } else if raw.ends_with('/') {
        let directory_key = format!("{}/{}", parsed.directory_key, parsed.key);
        RemotePath::new(parsed.alias, directory_key, filename)
    } else {
        parsed
    }
}

/// Save a local file to `target`, reporting progress for multipart uploads
pub(crate) async fn upload_file(
    source: &Path,
    target: &RemotePath,
    options: &UploadOptions,
    formatter: &Formatter,
) -> ExitCode {
    let src_display = source.display().to_string();
    let size = match tokio::fs::metadata(source).await {
        Ok(m) if m.is_file() => m.len(),
        Ok(_) => {
            formatter.error(&format!("Source is not a regular file: {src_display}"));
            return ExitCode::UsageError;
        }
        Err(_) => {
            formatter.error(&format!("Source not found: {src_display}"));
            return ExitCode::NotFound;
        }
    };

    let mut files = match session::open(target).await {
        Ok(f) => f,
        Err(e) => return session::fail(formatter, "Failed to open directory", &e),
    };

    let progress = if files.multipart().requires_multipart(size) {
        Some(Arc::new(ProgressBar::new(formatter.config(), size)))
    } else {
        None
    };
    if let Some(bar) = progress.as_ref().filter(|bar| bar.is_visible()) {
        let tick = bar.clone();
        files = files.with_progress(Arc::new(move |bytes: u64| tick.inc(bytes)));
    }

    let mut file = files
        .new_file(target.key.clone())
        .with_body(source.to_path_buf());
    if let Some(content_type) = &options.content_type {
        file.set_content_type(content_type.clone());
    }
    if let Some(disposition) = &options.content_disposition {
        file.set_content_disposition(disposition.clone());
    }
    if !options.metadata.is_empty() {
        file.set_metadata(options.metadata.clone());
    }

    let result = file.save(options.headers.clone()).await;
    if let Some(bar) = &progress {
        bar.finish_and_clear();
    }

    let saved = match result {
        Ok(saved) => saved,
        Err(e) => return session::fail(formatter, &format!("Failed to upload {src_display}"), &e),
    };

    let dst_display = target.to_full_path();
    let size_human = humansize::format_size(size, humansize::BINARY);
    if formatter.is_json() {
        formatter.json(&PutOutput {
            status: "success",
            source: src_display,
            target: dst_display,
            size_bytes: size,
            size_human,
            content_type: file.attributes.content_type.clone(),
            etag: file.attributes.etag.clone(),
            confirmed: saved.is_confirmed(),
        });
    } else {
        formatter.success(&format!("{src_display} -> {dst_display} ({size_human})"));
        if !saved.is_confirmed() {
            formatter.warning("Upload finished but the file is not visible yet");
        }
    }
    ExitCode::Success
}
