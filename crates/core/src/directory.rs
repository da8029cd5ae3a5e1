//! Directories and the file collection bound to one of them

use std::sync::Arc;

use crate::error::Result;
use crate::file::{Body, File, Lazy};
use crate::metadata::MetadataCodec;
use crate::multipart::{MultipartConfig, MultipartUploader, ProgressFn};
use crate::path::{self, ObjectLocation};
use crate::transport::ObjectTransport;

/// A bucket, optionally narrowed to a key prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    key: String,
}

impl Directory {
    /// Create a directory handle from `bucket` or `bucket/prefix/...`
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        path::check_directory_key(&key)?;
        Ok(Self { key })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Open the file collection of this directory on a transport
    pub fn files(&self, transport: Arc<dyn ObjectTransport>) -> Files {
        Files::new(self.clone(), transport)
    }
}

impl std::fmt::Display for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}

/// Files of one directory, reached through a transport
#[derive(Clone)]
pub struct Files {
    directory: Directory,
    transport: Arc<dyn ObjectTransport>,
    codec: MetadataCodec,
    multipart: MultipartConfig,
    progress: Option<ProgressFn>,
}

impl std::fmt::Debug for Files {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Files")
            .field("directory", &self.directory)
            .field("codec", &self.codec)
            .field("multipart", &self.multipart)
            .finish_non_exhaustive()
    }
}

impl Files {
    /// Create a collection using the transport's own metadata prefix
    pub fn new(directory: Directory, transport: Arc<dyn ObjectTransport>) -> Self {
        let codec = MetadataCodec::new(transport.metadata_prefix());
        Self::with_codec(directory, transport, codec)
    }

    pub fn with_codec(
        directory: Directory,
        transport: Arc<dyn ObjectTransport>,
        codec: MetadataCodec,
    ) -> Self {
        Self {
            directory,
            transport,
            codec,
            multipart: MultipartConfig::default(),
            progress: None,
        }
    }

    pub fn with_multipart(mut self, config: MultipartConfig) -> Self {
        self.multipart = config.normalized();
        self
    }

    /// Report multipart progress in bytes per finished part
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn transport(&self) -> &Arc<dyn ObjectTransport> {
        &self.transport
    }

    pub fn codec(&self) -> &MetadataCodec {
        &self.codec
    }

    pub fn multipart(&self) -> &MultipartConfig {
        &self.multipart
    }

    /// Split this collection's directory key into `(bucket, prefix)`
    pub fn check_directory_key(&self) -> Result<(String, String)> {
        path::check_directory_key(self.directory.key())
    }

    /// Canonical location of `key` inside this directory
    pub fn resolve(&self, key: &str) -> Result<ObjectLocation> {
        path::resolve(self.directory.key(), key)
    }

    /// Same transport and codec, scoped to another directory
    pub fn sibling(&self, directory: Directory) -> Files {
        Files {
            directory,
            ..self.clone()
        }
    }

    pub(crate) fn uploader(&self) -> MultipartUploader {
        let uploader = MultipartUploader::new(self.transport.clone(), self.multipart.clone());
        match &self.progress {
            Some(progress) => uploader.with_progress(progress.clone()),
            None => uploader,
        }
    }

    /// A local, unsaved file handle in this directory
    pub fn new_file(&self, key: impl Into<String>) -> File {
        File::attached(self.clone(), key.into())
    }

    /// Fetch a file with its content, `None` when it does not exist
    pub async fn get(&self, key: &str) -> Result<Option<File>> {
        let location = self.resolve(key)?;
        match self
            .transport
            .get_object(&location.bucket, &location.path)
            .await
        {
            Ok((data, headers)) => {
                tracing::debug!(object = %location, size = data.len(), "Fetched object");
                let mut file = self.new_file(key);
                file.refresh_from(&headers);
                file.body = Lazy::Loaded(Body::Bytes(data));
                Ok(Some(file))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Fetch a file's attributes and metadata without its content
    pub async fn head(&self, key: &str) -> Result<Option<File>> {
        let location = self.resolve(key)?;
        match self
            .transport
            .head_object(&location.bucket, &location.path)
            .await
        {
            Ok(headers) => {
                let mut file = self.new_file(key);
                file.refresh_from(&headers);
                Ok(Some(file))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Public, non-expiring URL of `key`
    pub async fn get_url(&self, key: &str) -> Result<String> {
        let location = self.resolve(key)?;
        self.transport
            .object_url(&location.bucket, &location.path, None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::ObjectHeaders;
    use crate::memory::MemoryTransport;

    fn logs(store: &Arc<MemoryTransport>) -> Files {
        Directory::new("bucket/logs").unwrap().files(store.clone())
    }

    #[test]
    fn test_directory_new_validates_key() {
        assert!(Directory::new("bucket").is_ok());
        assert!(Directory::new("bucket/a/b/").is_ok());
        assert!(Directory::new("/prefix").is_err());
        assert!(Directory::new("").is_err());
    }

    #[tokio::test]
    async fn test_check_directory_key() {
        let store = Arc::new(MemoryTransport::new());
        let files = Directory::new("bucket/logs/2024/").unwrap().files(store);
        assert_eq!(
            files.check_directory_key().unwrap(),
            ("bucket".to_string(), "logs/2024".to_string())
        );
        assert_eq!(files.resolve("a.txt").unwrap().path, "logs/2024/a.txt");
    }

    #[tokio::test]
    async fn test_codec_follows_transport_prefix() {
        let store = Arc::new(MemoryTransport::with_metadata_prefix("x-amz-meta-"));
        let files = Directory::new("bucket").unwrap().files(store);
        assert_eq!(files.codec().prefix(), "x-amz-meta-");
    }

    #[tokio::test]
    async fn test_get_returns_content_and_attributes() {
        let store = Arc::new(MemoryTransport::new());
        store
            .seed_object(
                "bucket",
                "logs/a.txt",
                "hello",
                ObjectHeaders::new()
                    .with("Content-Type", "text/plain")
                    .with("x-oss-meta-Owner", "alice"),
            )
            .await;

        let mut file = logs(&store).get("a.txt").await.unwrap().unwrap();
        assert_eq!(file.key(), "a.txt");
        assert_eq!(file.attributes.content_length, Some(5));
        assert_eq!(file.attributes.content_type.as_deref(), Some("text/plain"));
        assert!(file.attributes.last_modified.is_some());
        assert_eq!(file.metadata().unwrap().get("owner").map(String::as_str), Some("alice"));

        let body = file.load_body().await.unwrap().unwrap();
        assert_eq!(body.as_bytes().map(|b| &b[..]), Some(&b"hello"[..]));
    }

    #[tokio::test]
    async fn test_get_and_head_missing_is_none() {
        let store = Arc::new(MemoryTransport::new());
        assert!(logs(&store).get("missing").await.unwrap().is_none());
        assert!(logs(&store).head("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_url_is_public() {
        let store = Arc::new(MemoryTransport::new());
        let url = logs(&store).get_url("a.txt").await.unwrap();
        assert_eq!(url, "memory://bucket/logs/a.txt");
    }

    #[tokio::test]
    async fn test_sibling_shares_transport() {
        let store = Arc::new(MemoryTransport::new());
        let other = logs(&store).sibling(Directory::new("archive").unwrap());
        assert_eq!(other.directory().key(), "archive");
        assert_eq!(other.codec(), logs(&store).codec());
        assert_eq!(other.resolve("a.txt").unwrap().to_string(), "archive/a.txt");
    }
}
