//! stat command - Show file attributes and metadata
//!
//! Loads a file's attributes and user metadata without fetching its body.

use clap::Args;
use serde::Serialize;

use bf_core::{FileAttributes, Metadata};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

use super::session;

/// Show file attributes and metadata
#[derive(Args, Debug)]
pub struct StatArgs {
    /// File path (alias/bucket[/prefix]/key)
    pub path: String,
}

#[derive(Debug, Serialize)]
struct StatOutput {
    name: String,
    #[serde(flatten)]
    attributes: FileAttributes,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_human: Option<String>,
    metadata: Metadata,
}

/// Execute the stat command
pub async fn execute(args: StatArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let remote = match session::parse_file(&args.path) {
        Ok(r) => r,
        Err(e) => return session::fail(&formatter, "Invalid path", &e),
    };

    let files = match session::open(&remote).await {
        Ok(f) => f,
        Err(e) => return session::fail(&formatter, "Failed to open directory", &e),
    };

    let file = match files.head(&remote.key).await {
        Ok(Some(file)) => file,
        Ok(None) => {
            formatter.error(&format!("File not found: {}", args.path));
            return ExitCode::NotFound;
        }
        Err(e) => return session::fail(&formatter, "Failed to get file attributes", &e),
    };

    let output = StatOutput {
        name: remote.to_full_path(),
        size_human: file
            .attributes
            .content_length
            .map(|size| humansize::format_size(size, humansize::BINARY)),
        attributes: file.attributes.clone(),
        metadata: file.metadata().cloned().unwrap_or_default(),
    };

    if formatter.is_json() {
        formatter.json(&output);
    } else {
        for line in human_lines(&output) {
            formatter.println(&line);
        }
    }
    ExitCode::Success
}

fn human_lines(output: &StatOutput) -> Vec<String> {
    let attributes = &output.attributes;
    let mut lines = vec![format!("Name      : {}", output.name)];
    if let Some(modified) = &attributes.last_modified {
        lines.push(format!("Date      : {modified}"));
    }
    if let (Some(size), Some(human)) = (attributes.content_length, &output.size_human) {
        lines.push(format!("Size      : {human} ({size} bytes)"));
    }
    if let Some(etag) = &attributes.etag {
        lines.push(format!("ETag      : {etag}"));
    }
    if let Some(content_type) = &attributes.content_type {
        lines.push(format!("Type      : {content_type}"));
    }
    if let Some(disposition) = &attributes.content_disposition {
        lines.push(format!("Dispos.   : {disposition}"));
    }
    if let Some(object_type) = &attributes.object_type {
        lines.push(format!("Object    : {object_type}"));
    }
    for (key, value) in &output.metadata {
        lines.push(format!("Meta      : {key} = {value}"));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output() -> StatOutput {
        let attributes = FileAttributes {
            content_length: Some(2048),
            content_type: Some("text/plain".to_string()),
            etag: Some("\"abc\"".to_string()),
            ..Default::default()
        };
        StatOutput {
            name: "store/bucket/a.txt".to_string(),
            size_human: Some(humansize::format_size(2048u64, humansize::BINARY)),
            attributes,
            metadata: Metadata::from([("owner".to_string(), "alice".to_string())]),
        }
    }

    #[test]
    fn test_human_lines() {
        let lines = human_lines(&output());
        assert_eq!(lines[0], "Name      : store/bucket/a.txt");
        assert!(lines.iter().any(|l| l.contains("2048 bytes")));
        assert!(lines.iter().any(|l| l == "Type      : text/plain"));
        assert_eq!(lines.last().map(String::as_str), Some("Meta      : owner = alice"));
    }

    #[test]
    fn test_json_output_flattens_attributes() {
        let json = serde_json::to_value(output()).unwrap();
        assert_eq!(json["name"], "store/bucket/a.txt");
        assert_eq!(json["content_length"], 2048);
        assert_eq!(json["metadata"]["owner"], "alice");
        assert!(json.get("last_modified").is_none());
    }
}
