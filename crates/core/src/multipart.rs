//! Multipart upload support
//!
//! Drives initiate → upload parts → complete for large payloads. An upload
//! already registered on the remote side for the same object is resumed, and
//! any failure after an upload id exists aborts it before the error is
//! returned.

use std::collections::BTreeSet;
use std::io::SeekFrom;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use crate::error::{Error, Result};
use crate::headers::ObjectHeaders;
use crate::transport::{CompletedPart, ObjectTransport, Part};

/// Default part size: 5 MiB
pub const DEFAULT_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Minimum part size: 5 MiB (S3/OSS requirement)
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum part size: 5 GiB
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Payloads larger than this cannot go through a single PUT: 5 GiB
pub const DEFAULT_THRESHOLD: u64 = 5 * 1024 * 1024 * 1024;

/// Maximum number of parts: 10,000
pub const MAX_PARTS: usize = 10_000;

fn default_part_size() -> u64 {
    DEFAULT_PART_SIZE
}

fn default_threshold() -> u64 {
    DEFAULT_THRESHOLD
}

fn default_concurrency() -> usize {
    1
}

/// Multipart upload configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartConfig {
    /// Part size in bytes
    #[serde(default = "default_part_size")]
    pub part_size: u64,

    /// Payloads strictly larger than this use multipart upload
    #[serde(default = "default_threshold")]
    pub threshold: u64,

    /// Number of part uploads in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            threshold: DEFAULT_THRESHOLD,
            concurrency: default_concurrency(),
        }
    }
}

impl MultipartConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn part_size(mut self, size: u64) -> Self {
        self.part_size = size.clamp(MIN_PART_SIZE, MAX_PART_SIZE);
        self
    }

    pub fn threshold(mut self, size: u64) -> Self {
        self.threshold = size;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Bring values read from a config file into their valid ranges
    pub fn normalized(self) -> Self {
        let threshold = self.threshold;
        Self::new()
            .part_size(self.part_size)
            .concurrency(self.concurrency)
            .threshold(threshold)
    }

    /// Whether a payload of `size` bytes must be uploaded in parts
    pub fn requires_multipart(&self, size: u64) -> bool {
        size > self.threshold
    }

    /// Calculate the part size to use for a payload
    ///
    /// Grows past the configured size only when the payload would otherwise
    /// need more than [`MAX_PARTS`] parts.
    pub fn calculate_part_size(&self, file_size: u64) -> u64 {
        let parts = file_size.div_ceil(self.part_size);

        if parts <= MAX_PARTS as u64 {
            self.part_size
        } else {
            let required_size = file_size.div_ceil(MAX_PARTS as u64);
            required_size.clamp(MIN_PART_SIZE, MAX_PART_SIZE)
        }
    }
}

/// Calculate number of parts for a payload
pub fn calculate_parts(file_size: u64, part_size: u64) -> usize {
    file_size.div_ceil(part_size) as usize
}

/// Get byte range for a part
pub fn part_byte_range(part_number: i32, part_size: u64, total_size: u64) -> (u64, u64) {
    let start = (part_number as u64 - 1) * part_size;
    let end = (start + part_size).min(total_size);
    (start, end)
}

/// Lifecycle phase of a multipart upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadPhase {
    /// No upload id registered yet
    NotStarted,
    /// Upload id obtained, no part recorded
    Initiated,
    /// At least one part recorded, or an upload resumed from the remote side
    Uploading,
    /// Parts assembled into the final object
    Completed,
    /// Upload discarded on the remote side
    Aborted,
}

impl UploadPhase {
    /// Whether the upload still holds resources on the remote side
    pub const fn is_active(self) -> bool {
        matches!(self, UploadPhase::Initiated | UploadPhase::Uploading)
    }

    const fn can_become(self, next: UploadPhase) -> bool {
        use UploadPhase::*;
        matches!(
            (self, next),
            (NotStarted, Initiated)
                | (NotStarted, Uploading)
                | (Initiated, Uploading)
                | (Initiated | Uploading, Completed)
                | (Initiated | Uploading, Aborted)
        )
    }
}

/// State of one multipart upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipartUpload {
    upload_id: String,
    bucket: String,
    object: String,
    parts: Vec<Part>,
    phase: UploadPhase,
    resumed: bool,
    last_updated: jiff::Timestamp,
}

impl MultipartUpload {
    /// Create the record for an upload id, in [`UploadPhase::NotStarted`]
    pub fn new(
        upload_id: impl Into<String>,
        bucket: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            upload_id: upload_id.into(),
            bucket: bucket.into(),
            object: object.into(),
            parts: Vec::new(),
            phase: UploadPhase::NotStarted,
            resumed: false,
            last_updated: jiff::Timestamp::now(),
        }
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    /// Whether this upload was discovered on the remote side
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    pub fn last_updated(&self) -> jiff::Timestamp {
        self.last_updated
    }

    /// Move to the next phase
    pub fn transition(&mut self, next: UploadPhase) -> Result<()> {
        if !self.phase.can_become(next) {
            return Err(Error::MultipartIntegrity(format!(
                "upload {} cannot move from {:?} to {:?}",
                self.upload_id, self.phase, next
            )));
        }
        self.phase = next;
        self.last_updated = jiff::Timestamp::now();
        Ok(())
    }

    /// Append an uploaded part
    pub fn record_part(&mut self, part: Part) -> Result<()> {
        if self.phase == UploadPhase::Initiated {
            self.transition(UploadPhase::Uploading)?;
        }
        if self.phase != UploadPhase::Uploading {
            return Err(Error::MultipartIntegrity(format!(
                "upload {} does not accept parts in phase {:?}",
                self.upload_id, self.phase
            )));
        }
        self.parts.push(part);
        self.last_updated = jiff::Timestamp::now();
        Ok(())
    }

    /// Get the next part number to upload
    pub fn next_part_number(&self) -> i32 {
        self.parts
            .iter()
            .map(|p| p.part_number)
            .max()
            .map(|n| n + 1)
            .unwrap_or(1)
    }

    /// Part references for completion, ascending by part number
    pub fn completed_parts(&self) -> Vec<CompletedPart> {
        let mut parts: Vec<CompletedPart> = self.parts.iter().map(CompletedPart::from).collect();
        parts.sort_by_key(|p| p.part_number);
        parts
    }
}

/// Callback receiving the number of bytes each finished part carried
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Orchestrates multipart uploads against an [`ObjectTransport`]
#[derive(Clone)]
pub struct MultipartUploader {
    transport: Arc<dyn ObjectTransport>,
    config: MultipartConfig,
    progress: Option<ProgressFn>,
}

impl std::fmt::Debug for MultipartUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultipartUploader")
            .field("config", &self.config)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl MultipartUploader {
    pub fn new(transport: Arc<dyn ObjectTransport>, config: MultipartConfig) -> Self {
        Self {
            transport,
            config: config.normalized(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &MultipartConfig {
        &self.config
    }

    /// Upload `size` bytes from `source` to `bucket/object`
    ///
    /// Resumes an upload already registered for the object, otherwise
    /// initiates a new one. On failure the upload is aborted and the original
    /// error returned.
    pub async fn upload<R>(
        &self,
        bucket: &str,
        object: &str,
        source: &mut R,
        size: u64,
        headers: &ObjectHeaders,
    ) -> Result<MultipartUpload>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send,
    {
        let part_size = self.config.calculate_part_size(size);

        let mut upload = match self.discover(bucket, object).await? {
            Some(upload) => upload,
            None => self.initiate(bucket, object, headers).await?,
        };

        match self.drive(&mut upload, source, size, part_size).await {
            Ok(()) => {
                tracing::info!(
                    bucket = bucket,
                    object = object,
                    upload_id = %upload.upload_id,
                    parts = upload.parts.len(),
                    "Completed multipart upload"
                );
                Ok(upload)
            }
            Err(err) => match self.abort(&mut upload, &err).await {
                Some(abort_err) => Err(err.context(format!(
                    "aborting upload {} also failed: {abort_err}",
                    upload.upload_id
                ))),
                None => Err(err),
            },
        }
    }

    /// Look for an upload already registered for this exact object
    async fn discover(&self, bucket: &str, object: &str) -> Result<Option<MultipartUpload>> {
        let uploads = self.transport.list_multipart_uploads(bucket, object).await?;
        let Some(entry) = uploads.into_iter().find(|u| u.key == object) else {
            return Ok(None);
        };

        let mut parts = match self
            .transport
            .list_parts(bucket, object, &entry.upload_id)
            .await
        {
            Ok(parts) => parts,
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    upload_id = %entry.upload_id,
                    "Listed multipart upload vanished, starting a new one"
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        parts.sort_by_key(|p| p.part_number);
        let mut upload = MultipartUpload::new(entry.upload_id, bucket, object);
        upload.resumed = true;
        upload.transition(UploadPhase::Uploading)?;
        for part in parts {
            upload.record_part(part)?;
        }

        tracing::info!(
            bucket = bucket,
            object = object,
            upload_id = %upload.upload_id,
            parts = upload.parts.len(),
            "Resuming multipart upload"
        );
        Ok(Some(upload))
    }

    async fn initiate(
        &self,
        bucket: &str,
        object: &str,
        headers: &ObjectHeaders,
    ) -> Result<MultipartUpload> {
        let upload_id = self
            .transport
            .initiate_multipart_upload(bucket, object, headers)
            .await?;
        tracing::info!(
            bucket = bucket,
            object = object,
            upload_id = %upload_id,
            "Created multipart upload"
        );

        let mut upload = MultipartUpload::new(upload_id, bucket, object);
        upload.transition(UploadPhase::Initiated)?;
        Ok(upload)
    }

    async fn drive<R>(
        &self,
        upload: &mut MultipartUpload,
        source: &mut R,
        size: u64,
        part_size: u64,
    ) -> Result<()>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send,
    {
        // A short last part of a gap-free list marks the end of the data. A
        // final part that is exactly one part long is indistinguishable from
        // an unfinished upload.
        let gap_free = upload
            .parts
            .iter()
            .enumerate()
            .all(|(i, p)| p.part_number == i as i32 + 1);
        if let Some(last) = upload.parts.last()
            && last.size != part_size
            && gap_free
        {
            tracing::info!(
                upload_id = %upload.upload_id,
                last_part_size = last.size,
                "Last uploaded part is short, completing upload"
            );
            return self.complete(upload).await;
        }

        let total = calculate_parts(size, part_size) as i32;
        let recorded: BTreeSet<i32> = upload.parts.iter().map(|p| p.part_number).collect();
        let missing: Vec<i32> = (1..=total).filter(|n| !recorded.contains(n)).collect();
        if missing.first().is_some_and(|&first| first < upload.next_part_number()) {
            tracing::warn!(
                upload_id = %upload.upload_id,
                missing = ?missing,
                "Uploaded parts have gaps, filling them in"
            );
        }

        let uploaded: u64 = upload
            .parts
            .iter()
            .filter(|p| p.part_number <= total)
            .map(|p| p.size)
            .sum();
        self.report(uploaded.min(size));

        let bucket = upload.bucket.clone();
        let object = upload.object.clone();
        let upload_id = upload.upload_id.clone();
        let mut in_flight = FuturesUnordered::new();
        let mut position = None;

        for part_number in missing {
            // parts are always read in offset order on this task
            let (offset, end) = part_byte_range(part_number, part_size, size);
            if position != Some(offset) {
                source.seek(SeekFrom::Start(offset)).await?;
            }
            let chunk = read_part(source, end - offset).await?;
            if chunk.is_empty() {
                break;
            }
            position = Some(offset + chunk.len() as u64);

            in_flight.push(self.send_part(&bucket, &object, &upload_id, part_number, chunk));
            while in_flight.len() >= self.config.concurrency {
                if let Some(part) = in_flight.next().await {
                    self.finish_part(upload, part?)?;
                }
            }
        }

        while let Some(part) = in_flight.next().await {
            self.finish_part(upload, part?)?;
        }

        self.complete(upload).await
    }

    async fn send_part(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<Part> {
        let size = data.len() as u64;
        tracing::debug!(upload_id = upload_id, part_number, size, "Uploading part");
        let etag = self
            .transport
            .upload_part(bucket, object, upload_id, part_number, data)
            .await?;
        Ok(Part {
            part_number,
            size,
            etag,
        })
    }

    fn finish_part(&self, upload: &mut MultipartUpload, part: Part) -> Result<()> {
        let size = part.size;
        upload.record_part(part)?;
        self.report(size);
        Ok(())
    }

    async fn complete(&self, upload: &mut MultipartUpload) -> Result<()> {
        if upload.parts.is_empty() {
            // the protocol rejects a completion without parts
            let part = self
                .send_part(&upload.bucket, &upload.object, &upload.upload_id, 1, Bytes::new())
                .await?;
            upload.record_part(part)?;
        }

        let parts = upload.completed_parts();
        self.transport
            .complete_multipart_upload(&upload.bucket, &upload.object, &upload.upload_id, &parts)
            .await?;
        upload.transition(UploadPhase::Completed)
    }

    /// Abort an active upload; returns the abort failure, if any
    async fn abort(&self, upload: &mut MultipartUpload, cause: &Error) -> Option<Error> {
        if !upload.phase.is_active() {
            return None;
        }

        tracing::warn!(
            upload_id = %upload.upload_id,
            error = %cause,
            "Aborting multipart upload"
        );
        let outcome = self
            .transport
            .abort_multipart_upload(&upload.bucket, &upload.object, &upload.upload_id)
            .await;
        upload.phase = UploadPhase::Aborted;
        match outcome {
            Ok(()) => None,
            Err(abort_err) => {
                tracing::error!(
                    upload_id = %upload.upload_id,
                    error = %abort_err,
                    original_error = %cause,
                    "Failed to abort multipart upload"
                );
                Some(abort_err)
            }
        }
    }

    fn report(&self, bytes: u64) {
        if let Some(progress) = &self.progress {
            if bytes > 0 {
                progress(bytes);
            }
        }
    }
}

/// Read up to one part from the source
async fn read_part<R>(source: &mut R, part_size: u64) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(part_size as usize);
    (&mut *source).take(part_size).read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}
