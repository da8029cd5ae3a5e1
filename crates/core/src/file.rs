//! File entity
//!
//! Client-side model of one remote object: its attributes, lazily loaded
//! metadata and body, and the operations that write it back.

use std::io::Cursor;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use jiff::Timestamp;
use serde::Serialize;
use tokio::io::AsyncRead;

use crate::directory::{Directory, Files};
use crate::error::{Error, Result};
use crate::headers::{ObjectHeaders, parse_http_date};
use crate::metadata::Metadata;

static EMPTY_METADATA: Metadata = Metadata::new();

/// Memoized value of a lazily fetched field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lazy<T> {
    /// Never looked up
    NotLoaded,
    /// Looked up or set locally
    Loaded(T),
    /// Looked up, nothing there
    KnownEmpty,
}

impl<T> Lazy<T> {
    pub fn get(&self) -> Option<&T> {
        match self {
            Lazy::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_not_loaded(&self) -> bool {
        matches!(self, Lazy::NotLoaded)
    }

    /// Loaded value, replacing any other state with `f()`
    pub fn get_or_insert_with(&mut self, f: impl FnOnce() -> T) -> &mut T {
        if !matches!(self, Lazy::Loaded(_)) {
            *self = Lazy::Loaded(f());
        }
        match self {
            Lazy::Loaded(value) => value,
            _ => unreachable!(),
        }
    }

    fn from_option(value: Option<T>) -> Self {
        value.map_or(Lazy::KnownEmpty, Lazy::Loaded)
    }
}

impl<T> Default for Lazy<T> {
    fn default() -> Self {
        Lazy::NotLoaded
    }
}

/// Content of a file
pub enum Body {
    /// In-memory buffer
    Bytes(Bytes),
    /// Local file, streamed on upload
    Path(PathBuf),
    /// Reader of unknown length; readable by callers but not uploadable
    Stream(Box<dyn AsyncRead + Send + Sync + Unpin>),
}

impl Body {
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Body::Bytes(data) => Some(data),
            _ => None,
        }
    }

    /// Short name of the representation, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Body::Bytes(_) => "bytes",
            Body::Path(_) => "path",
            Body::Stream(_) => "stream",
        }
    }

    /// Size in bytes, reading file metadata for local paths
    async fn size(&self) -> Result<u64> {
        match self {
            Body::Bytes(data) => Ok(data.len() as u64),
            Body::Path(path) => Ok(tokio::fs::metadata(path).await?.len()),
            Body::Stream(_) => Err(Error::InvalidBodyType(self.kind().to_string())),
        }
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Bytes(data) => f.debug_tuple("Bytes").field(&data.len()).finish(),
            Body::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Body::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(data: Bytes) -> Self {
        Body::Bytes(data)
    }
}

impl From<Vec<u8>> for Body {
    fn from(data: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(data))
    }
}

impl From<String> for Body {
    fn from(data: String) -> Self {
        Body::Bytes(Bytes::from(data))
    }
}

impl From<&'static str> for Body {
    fn from(data: &'static str) -> Self {
        Body::Bytes(Bytes::from_static(data.as_bytes()))
    }
}

impl From<PathBuf> for Body {
    fn from(path: PathBuf) -> Self {
        Body::Path(path)
    }
}

/// Object owner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Owner {
    pub display_name: Option<String>,
    pub id: Option<String>,
}

/// Attributes of a remote object, parsed from response headers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Set once the object is known to exist remotely
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept_ranges: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<Owner>,
}

impl FileAttributes {
    pub fn from_headers(headers: &ObjectHeaders) -> Self {
        let mut attributes = Self::default();
        attributes.merge_headers(headers);
        attributes
    }

    /// Overwrite attributes with the values present in `headers`
    ///
    /// Headers that are absent or fail to parse leave the field unchanged.
    pub fn merge_headers(&mut self, headers: &ObjectHeaders) {
        if let Some(date) = headers.get("Date").and_then(parse_http_date) {
            self.date = Some(date);
        }
        if let Some(length) = headers
            .get("Content-Length")
            .and_then(|v| v.trim().parse().ok())
        {
            self.content_length = Some(length);
        }
        merge_string(&mut self.content_type, headers.get("Content-Type"));
        merge_string(
            &mut self.content_disposition,
            headers.get("Content-Disposition"),
        );
        merge_string(&mut self.etag, headers.get("ETag"));
        if let Some(modified) = headers.get("Last-Modified").and_then(parse_http_date) {
            self.last_modified = Some(modified);
        }
        merge_string(&mut self.accept_ranges, headers.get("Accept-Ranges"));
        merge_string(&mut self.server, headers.get("Server"));
        merge_string(
            &mut self.object_type,
            headers
                .get("x-oss-object-type")
                .or_else(|| headers.get("x_oss_object_type")),
        );
    }
}

fn merge_string(field: &mut Option<String>, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        *field = Some(value.to_string());
    }
}

/// Outcome of [`File::save`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Saved {
    /// Written and read back
    Confirmed,
    /// Written, but the read-back did not see the object yet
    Unconfirmed,
}

impl Saved {
    pub fn is_confirmed(self) -> bool {
        self == Saved::Confirmed
    }
}

/// A remote object
#[derive(Debug, Default)]
pub struct File {
    key: String,
    files: Option<Files>,
    pub attributes: FileAttributes,
    pub(crate) metadata: Lazy<Metadata>,
    pub(crate) body: Lazy<Body>,
}

impl File {
    /// A file that belongs to no directory yet
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub(crate) fn attached(files: Files, key: String) -> Self {
        Self {
            key,
            files: Some(files),
            ..Self::default()
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn directory(&self) -> Option<&Directory> {
        self.files.as_ref().map(Files::directory)
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.set_body(body);
        self
    }

    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = Lazy::Loaded(body.into());
    }

    /// Body if it is already in memory
    pub fn body(&self) -> Option<&Body> {
        self.body.get()
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.attributes.content_type = Some(content_type.into());
    }

    pub fn set_content_disposition(&mut self, disposition: impl Into<String>) {
        self.attributes.content_disposition = Some(disposition.into());
    }

    /// Whether the file is known to exist remotely
    pub fn is_persisted(&self) -> bool {
        self.attributes.last_modified.is_some()
    }

    /// Load the body, fetching it once for persisted files
    ///
    /// Returns `None` when the file has no content.
    pub async fn load_body(&mut self) -> Result<Option<&Body>> {
        if self.body.is_not_loaded() {
            self.body = match (&self.files, self.is_persisted()) {
                (Some(files), true) => match files.get(&self.key).await? {
                    Some(remote) => remote.body,
                    None => Lazy::KnownEmpty,
                },
                _ => Lazy::KnownEmpty,
            };
        }
        Ok(self.body.get())
    }

    /// Metadata if it has been loaded or set
    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.get()
    }

    pub fn set_metadata(&mut self, metadata: Metadata) {
        self.metadata = Lazy::Loaded(metadata);
    }

    /// Metadata for editing; starts empty unless already loaded
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        self.metadata.get_or_insert_with(Metadata::new)
    }

    /// Load user metadata, asking the remote side once for persisted files
    pub async fn load_metadata(&mut self) -> Result<&Metadata> {
        if self.metadata.is_not_loaded() {
            self.metadata = match (&self.files, self.is_persisted()) {
                (Some(files), true) => {
                    let location = files.resolve(&self.key)?;
                    match files
                        .transport()
                        .head_object(&location.bucket, &location.path)
                        .await
                    {
                        Ok(headers) => Lazy::from_option(decode_metadata(files, &headers)),
                        Err(e) if e.is_not_found() => Lazy::KnownEmpty,
                        Err(e) => return Err(e),
                    }
                }
                _ => Lazy::KnownEmpty,
            };
        }
        Ok(self.metadata.get().unwrap_or(&EMPTY_METADATA))
    }

    /// Write the file to its directory
    ///
    /// Content type, disposition and metadata are sent along with `headers`.
    /// Payloads above the multipart threshold go through a multipart upload.
    pub async fn save(&mut self, headers: ObjectHeaders) -> Result<Saved> {
        let files = self.require_files()?.clone();
        let key = self.require_key()?.to_string();
        // a persisted file re-saves its remote content and metadata
        self.load_body().await?;
        self.load_metadata().await?;
        let Lazy::Loaded(body) = &self.body else {
            return Err(Error::MissingAttribute("body"));
        };
        let size = body.size().await?;

        let mut request = headers;
        if let Some(content_type) = &self.attributes.content_type {
            request.insert("Content-Type", content_type.as_str());
        }
        if let Some(disposition) = &self.attributes.content_disposition {
            request.insert("Content-Disposition", disposition.as_str());
        }
        if let Some(metadata) = self.metadata.get() {
            request.merge(&files.codec().encode(metadata));
        }

        let location = files.resolve(&key)?;
        let transport = files.transport();
        let multipart = files.multipart().requires_multipart(size);
        tracing::debug!(object = %location, size, multipart, body = body.kind(), "Saving file");

        match body {
            Body::Path(path) if multipart => {
                let mut source = tokio::fs::File::open(path).await?;
                files
                    .uploader()
                    .upload(&location.bucket, &location.path, &mut source, size, &request)
                    .await?;
            }
            Body::Path(path) => {
                transport
                    .put_object(&location.bucket, &location.path, path, &request)
                    .await?;
            }
            Body::Bytes(data) if multipart => {
                let mut source = Cursor::new(data.clone());
                files
                    .uploader()
                    .upload(&location.bucket, &location.path, &mut source, size, &request)
                    .await?;
            }
            Body::Bytes(data) => {
                transport
                    .put_object_from_buffer(&location.bucket, &location.path, data.clone(), &request)
                    .await?;
            }
            Body::Stream(_) => return Err(Error::InvalidBodyType(body.kind().to_string())),
        }

        let guessed = guess_content_type(body, &key);
        match transport.head_object(&location.bucket, &location.path).await {
            Ok(response) => {
                let content_type = self.attributes.content_type.take();
                self.attributes.merge_headers(&response);
                self.attributes.content_length = Some(size);
                self.attributes.content_type = Some(content_type.unwrap_or(guessed));
                self.metadata = Lazy::from_option(decode_metadata(&files, &response));
                Ok(Saved::Confirmed)
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(object = %location, "Saved object not visible yet");
                Ok(Saved::Unconfirmed)
            }
            Err(e) => Err(e),
        }
    }

    /// Delete the file remotely
    pub async fn destroy(&self) -> Result<bool> {
        let files = self.require_files()?;
        let location = files.resolve(self.require_key()?)?;
        files
            .transport()
            .delete_object(&location.bucket, &location.path)
            .await?;
        tracing::debug!(object = %location, "Deleted object");
        Ok(true)
    }

    /// Copy the file server-side to `target_file_key` in another directory
    ///
    /// The returned handle is not refreshed from the remote side.
    pub async fn copy(
        &self,
        target_directory_key: &str,
        target_file_key: &str,
        headers: &ObjectHeaders,
    ) -> Result<File> {
        let files = self.require_files()?;
        let source = files.resolve(self.require_key()?)?;
        let target_files = files.sibling(Directory::new(target_directory_key)?);
        let target = target_files.resolve(target_file_key)?;

        files
            .transport()
            .copy_object(
                &source.bucket,
                &source.path,
                &target.bucket,
                &target.path,
                headers,
            )
            .await?;
        tracing::debug!(source = %source, target = %target, "Copied object");

        Ok(target_files.new_file(target_file_key))
    }

    /// URL of the file, valid for `expires_in_secs` seconds; `0` asks for a
    /// public URL
    pub async fn url(&self, expires_in_secs: u64) -> Result<String> {
        let files = self.require_files()?;
        let location = files.resolve(self.require_key()?)?;
        let expires_in = (expires_in_secs > 0).then(|| Duration::from_secs(expires_in_secs));
        files
            .transport()
            .object_url(&location.bucket, &location.path, expires_in)
            .await
    }

    pub async fn public_url(&self) -> Result<String> {
        let key = self.require_key()?;
        self.require_files()?.get_url(key).await
    }

    /// Replace attributes and metadata with what a response reports
    pub(crate) fn refresh_from(&mut self, headers: &ObjectHeaders) {
        self.attributes.merge_headers(headers);
        if let Some(files) = &self.files {
            self.metadata = Lazy::from_option(decode_metadata(files, headers));
        }
    }

    fn require_key(&self) -> Result<&str> {
        if self.key.is_empty() {
            return Err(Error::MissingAttribute("key"));
        }
        Ok(&self.key)
    }

    fn require_files(&self) -> Result<&Files> {
        self.files
            .as_ref()
            .ok_or(Error::MissingAttribute("directory"))
    }
}

fn decode_metadata(files: &Files, headers: &ObjectHeaders) -> Option<Metadata> {
    let metadata = files.codec().decode(headers);
    (!metadata.is_empty()).then_some(metadata)
}

fn guess_content_type(body: &Body, key: &str) -> String {
    let guess = match body {
        Body::Path(path) => mime_guess::from_path(path),
        _ => mime_guess::from_path(key),
    };
    guess.first_or_octet_stream().to_string()
}
