//! Opening the file collection behind a remote path

use std::sync::Arc;

use bf_core::{
    Alias, AliasManager, Backend, ConfigManager, Directory, Error, Files, ObjectTransport,
    ParsedPath, RemotePath, Result, parse_path,
};
use bf_oss::OssTransport;
use bf_s3::S3Transport;

use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Build the transport matching an alias backend
pub async fn transport_for(alias: Alias) -> Result<Arc<dyn ObjectTransport>> {
    tracing::debug!(alias = %alias.name, backend = %alias.backend, "Connecting");
    let transport: Arc<dyn ObjectTransport> = match alias.backend {
        Backend::S3 => Arc::new(S3Transport::new(alias).await?),
        Backend::Oss => Arc::new(OssTransport::new(alias)?),
    };
    Ok(transport)
}

/// Open the collection holding `path` with the configured multipart settings
pub async fn open(path: &RemotePath) -> Result<Files> {
    let config = ConfigManager::new()?.load()?;
    let alias = AliasManager::new()?.get(&path.alias)?;
    let directory = Directory::new(path.directory_key.clone())?;
    let transport = transport_for(alias).await?;
    Ok(directory
        .files(transport)
        .with_multipart(config.defaults.multipart))
}

/// Parse a path that must be remote
pub fn parse_remote(path: &str) -> Result<RemotePath> {
    match parse_path(path)? {
        ParsedPath::Remote(remote) => Ok(remote),
        ParsedPath::Local(_) => Err(Error::InvalidPath(format!(
            "'{path}' is not a remote path. Use format: alias/bucket[/prefix]/key"
        ))),
    }
}

/// Parse a remote path that must name a file
pub fn parse_file(path: &str) -> Result<RemotePath> {
    let remote = parse_remote(path)?;
    if remote.key.is_empty() {
        return Err(Error::InvalidPath(format!("'{path}' does not name a file")));
    }
    Ok(remote)
}

/// Report an error and pick its exit code
pub fn fail(formatter: &Formatter, context: &str, err: &Error) -> ExitCode {
    formatter.error(&format!("{context}: {err}"));
    ExitCode::from(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file() {
        let remote = parse_file("store/bucket/logs/a.txt").unwrap();
        assert_eq!(remote.alias, "store");
        assert_eq!(remote.directory_key, "bucket/logs");
        assert_eq!(remote.key, "a.txt");
    }

    #[test]
    fn test_parse_file_rejects_directory_and_local() {
        assert!(matches!(
            parse_file("store/bucket"),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            parse_remote("./local.txt"),
            Err(Error::InvalidPath(_))
        ));
    }
}
