//! ObjectTransport trait definition
//!
//! This trait is the narrow call surface to a remote object-storage API.
//! Each method maps to a single remote call; signing, connection handling and
//! retry policy belong to the implementation.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::headers::ObjectHeaders;

/// An in-progress multipart upload registered on the remote side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEntry {
    /// Object path the upload targets
    pub key: String,
    /// Opaque upload token
    pub upload_id: String,
}

/// One uploaded part of a multipart upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    /// 1-based part number
    pub part_number: i32,
    /// Size in bytes
    pub size: u64,
    /// Entity tag returned by the upload
    pub etag: String,
}

/// Part reference sent with the completion call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    pub part_number: i32,
    pub etag: String,
}

impl From<&Part> for CompletedPart {
    fn from(part: &Part) -> Self {
        Self {
            part_number: part.part_number,
            etag: part.etag.clone(),
        }
    }
}

/// Trait for remote object operations
///
/// Implemented by the storage backends and by [`crate::MemoryTransport`].
/// A remote 404 must surface as [`crate::Error::NotFound`] so callers can tell
/// absence apart from other failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectTransport: Send + Sync {
    /// Header prefix this backend uses for user metadata
    fn metadata_prefix(&self) -> &str;

    /// Upload a local file in a single request, streaming its content
    async fn put_object(
        &self,
        bucket: &str,
        path: &str,
        file: &Path,
        headers: &ObjectHeaders,
    ) -> Result<ObjectHeaders>;

    /// Upload an in-memory buffer in a single request
    async fn put_object_from_buffer(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        headers: &ObjectHeaders,
    ) -> Result<ObjectHeaders>;

    /// Get object content and response headers
    async fn get_object(&self, bucket: &str, path: &str) -> Result<(Bytes, ObjectHeaders)>;

    /// Get object headers
    async fn head_object(&self, bucket: &str, path: &str) -> Result<ObjectHeaders>;

    /// Delete an object
    async fn delete_object(&self, bucket: &str, path: &str) -> Result<()>;

    /// Server-side copy
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_path: &str,
        dst_bucket: &str,
        dst_path: &str,
        headers: &ObjectHeaders,
    ) -> Result<()>;

    /// URL for an object; `None` asks for a public, non-expiring URL
    async fn object_url(
        &self,
        bucket: &str,
        path: &str,
        expires_in: Option<Duration>,
    ) -> Result<String>;

    /// List in-progress multipart uploads whose key starts with `prefix`
    async fn list_multipart_uploads(&self, bucket: &str, prefix: &str)
    -> Result<Vec<UploadEntry>>;

    /// List uploaded parts of a multipart upload, ascending by part number
    async fn list_parts(&self, bucket: &str, path: &str, upload_id: &str) -> Result<Vec<Part>>;

    /// Start a multipart upload and return its upload id
    async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        path: &str,
        headers: &ObjectHeaders,
    ) -> Result<String>;

    /// Upload one part and return its entity tag
    async fn upload_part(
        &self,
        bucket: &str,
        path: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String>;

    /// Assemble the uploaded parts into the final object
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        path: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()>;

    /// Discard a multipart upload and all its parts
    async fn abort_multipart_upload(&self, bucket: &str, path: &str, upload_id: &str)
    -> Result<()>;
}

/// Unsigned URL of an object below an endpoint
///
/// Path-style puts the bucket in the first path segment, otherwise the
/// bucket becomes a sub-domain of the endpoint host.
pub fn object_url(endpoint: &str, bucket: &str, path: &str, path_style: bool) -> Result<Url> {
    let mut url = Url::parse(endpoint)?;
    if !path_style {
        let host = url
            .host_str()
            .ok_or_else(|| Error::Config(format!("Endpoint '{endpoint}' has no host")))?
            .to_string();
        url.set_host(Some(&format!("{bucket}.{host}")))?;
    }

    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| Error::Config(format!("Endpoint '{endpoint}' cannot carry a path")))?;
        segments.pop_if_empty();
        if path_style {
            segments.push(bucket);
        }
        segments.extend(path.split('/'));
    }
    Ok(url)
}
