//! In-memory object transport
//!
//! Keeps objects and pending multipart uploads in process memory, records
//! every call it receives and can inject status failures. Used as the fake
//! backend in tests across the workspace.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use jiff::Timestamp;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::headers::{format_http_date, ObjectHeaders};
use crate::metadata::OSS_META_PREFIX;
use crate::transport::{CompletedPart, ObjectTransport, Part, UploadEntry};

/// Kind of remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    PutObject,
    PutBuffer,
    Get,
    Head,
    Delete,
    Copy,
    Url,
    ListUploads,
    ListParts,
    Initiate,
    UploadPart,
    Complete,
    Abort,
}

/// A recorded call with the arguments tests assert on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    PutObject { bucket: String, path: String, size: u64 },
    PutBuffer { bucket: String, path: String, size: u64 },
    Get { bucket: String, path: String },
    Head { bucket: String, path: String },
    Delete { bucket: String, path: String },
    Copy {
        src_bucket: String,
        src_path: String,
        dst_bucket: String,
        dst_path: String,
    },
    Url {
        bucket: String,
        path: String,
        expires_in: Option<Duration>,
    },
    ListUploads { bucket: String, prefix: String },
    ListParts { upload_id: String },
    Initiate { bucket: String, path: String },
    UploadPart {
        upload_id: String,
        part_number: i32,
        size: u64,
    },
    Complete {
        upload_id: String,
        part_numbers: Vec<i32>,
    },
    Abort { upload_id: String },
}

impl Call {
    pub fn operation(&self) -> Operation {
        match self {
            Call::PutObject { .. } => Operation::PutObject,
            Call::PutBuffer { .. } => Operation::PutBuffer,
            Call::Get { .. } => Operation::Get,
            Call::Head { .. } => Operation::Head,
            Call::Delete { .. } => Operation::Delete,
            Call::Copy { .. } => Operation::Copy,
            Call::Url { .. } => Operation::Url,
            Call::ListUploads { .. } => Operation::ListUploads,
            Call::ListParts { .. } => Operation::ListParts,
            Call::Initiate { .. } => Operation::Initiate,
            Call::UploadPart { .. } => Operation::UploadPart,
            Call::Complete { .. } => Operation::Complete,
            Call::Abort { .. } => Operation::Abort,
        }
    }
}

#[derive(Debug)]
struct Fault {
    operation: Operation,
    part_number: Option<i32>,
    status: u16,
    remaining: Option<usize>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    headers: ObjectHeaders,
    etag: String,
    last_modified: Timestamp,
    multipart: bool,
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    path: String,
    headers: ObjectHeaders,
    parts: BTreeMap<i32, (Bytes, String)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: BTreeMap<(String, String), StoredObject>,
    uploads: BTreeMap<String, PendingUpload>,
    calls: Vec<Call>,
    faults: Vec<Fault>,
    sequence: u64,
}

impl MemoryState {
    fn next_id(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// Record a call and apply any matching fault
    fn enter(&mut self, call: Call, part_number: Option<i32>) -> Result<()> {
        let operation = call.operation();
        self.calls.push(call);

        let fault = self.faults.iter_mut().find(|f| {
            f.operation == operation
                && (f.part_number.is_none() || f.part_number == part_number)
                && f.remaining != Some(0)
        });

        match fault {
            Some(fault) => {
                if let Some(remaining) = fault.remaining.as_mut() {
                    *remaining -= 1;
                }
                Err(Error::from_status(
                    fault.status,
                    format!("injected {operation:?} failure"),
                ))
            }
            None => Ok(()),
        }
    }

    fn store(
        &mut self,
        bucket: &str,
        path: &str,
        data: Bytes,
        headers: &ObjectHeaders,
        multipart: bool,
    ) -> ObjectHeaders {
        let etag = format!("\"{:016x}\"", self.next_id());
        let stored = StoredObject {
            data,
            headers: headers.clone(),
            etag: etag.clone(),
            last_modified: Timestamp::now(),
            multipart,
        };
        self.objects
            .insert((bucket.to_string(), path.to_string()), stored);
        ObjectHeaders::new().with("ETag", etag)
    }
}

/// In-memory implementation of [`ObjectTransport`]
#[derive(Debug)]
pub struct MemoryTransport {
    metadata_prefix: String,
    state: Mutex<MemoryState>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Create an empty store using the OSS metadata prefix
    pub fn new() -> Self {
        Self::with_metadata_prefix(OSS_META_PREFIX)
    }

    pub fn with_metadata_prefix(prefix: impl Into<String>) -> Self {
        Self {
            metadata_prefix: prefix.into(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Fail every call of `operation` with `status`
    pub async fn fail(&self, operation: Operation, status: u16) {
        self.push_fault(operation, None, status, None).await;
    }

    /// Fail the next call of `operation` with `status`
    pub async fn fail_once(&self, operation: Operation, status: u16) {
        self.push_fault(operation, None, status, Some(1)).await;
    }

    /// Fail uploads of the given part number with `status`
    pub async fn fail_part(&self, part_number: i32, status: u16) {
        self.push_fault(Operation::UploadPart, Some(part_number), status, None)
            .await;
    }

    /// Drop all injected faults
    pub async fn clear_faults(&self) {
        self.state.lock().await.faults.clear();
    }

    async fn push_fault(
        &self,
        operation: Operation,
        part_number: Option<i32>,
        status: u16,
        remaining: Option<usize>,
    ) {
        self.state.lock().await.faults.push(Fault {
            operation,
            part_number,
            status,
            remaining,
        });
    }

    /// Store an object directly, bypassing call recording
    pub async fn seed_object(
        &self,
        bucket: &str,
        path: &str,
        data: impl Into<Bytes>,
        headers: ObjectHeaders,
    ) {
        self.state
            .lock()
            .await
            .store(bucket, path, data.into(), &headers, false);
    }

    /// Register a pending multipart upload with already uploaded parts
    ///
    /// Parts are numbered from 1 in the given order. Returns the upload id.
    pub async fn seed_upload(&self, bucket: &str, path: &str, parts: Vec<Bytes>) -> String {
        let numbered = parts
            .into_iter()
            .enumerate()
            .map(|(i, data)| (i as i32 + 1, data))
            .collect();
        self.seed_numbered_upload(bucket, path, numbered).await
    }

    /// Register a pending upload holding exactly the given part numbers
    pub async fn seed_numbered_upload(
        &self,
        bucket: &str,
        path: &str,
        parts: Vec<(i32, Bytes)>,
    ) -> String {
        let mut state = self.state.lock().await;
        let upload_id = format!("upload-{}", state.next_id());
        let parts = parts
            .into_iter()
            .map(|(part_number, data)| (part_number, (data, format!("{upload_id}-{part_number}"))))
            .collect();
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                path: path.to_string(),
                headers: ObjectHeaders::new(),
                parts,
            },
        );
        upload_id
    }

    /// All calls received so far, in order
    pub async fn calls(&self) -> Vec<Call> {
        self.state.lock().await.calls.clone()
    }

    /// Number of calls received for `operation`
    pub async fn count(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    /// Content of a stored object
    pub async fn object(&self, bucket: &str, path: &str) -> Option<Bytes> {
        self.state
            .lock()
            .await
            .objects
            .get(&(bucket.to_string(), path.to_string()))
            .map(|o| o.data.clone())
    }

    /// Ids of multipart uploads that are neither completed nor aborted
    pub async fn pending_uploads(&self) -> Vec<String> {
        self.state.lock().await.uploads.keys().cloned().collect()
    }

    fn response_headers(&self, object: &StoredObject) -> ObjectHeaders {
        let mut headers = ObjectHeaders::new();
        for (name, value) in object.headers.iter() {
            let lower = name.to_ascii_lowercase();
            if lower.starts_with(&self.metadata_prefix.to_ascii_lowercase())
                || lower == "content-type"
                || lower == "content-disposition"
            {
                headers.insert(lower, value);
            }
        }
        if !headers.contains("content-type") {
            headers.insert("content-type", "application/octet-stream");
        }
        headers.insert("content-length", object.data.len().to_string());
        headers.insert("etag", object.etag.clone());
        headers.insert("last-modified", format_http_date(&object.last_modified));
        headers.insert("date", format_http_date(&Timestamp::now()));
        headers.insert("accept-ranges", "bytes");
        headers.insert("server", "MemoryTransport");
        headers.insert(
            "x-oss-object-type",
            if object.multipart { "Multipart" } else { "Normal" },
        );
        headers
    }
}

fn not_found(bucket: &str, path: &str) -> Error {
    Error::NotFound(format!("{bucket}/{path}"))
}

fn no_such_upload(upload_id: &str) -> Error {
    Error::NotFound(format!("multipart upload {upload_id}"))
}

#[async_trait]
impl ObjectTransport for MemoryTransport {
    fn metadata_prefix(&self) -> &str {
        &self.metadata_prefix
    }

    async fn put_object(
        &self,
        bucket: &str,
        path: &str,
        file: &Path,
        headers: &ObjectHeaders,
    ) -> Result<ObjectHeaders> {
        let data = Bytes::from(tokio::fs::read(file).await?);
        let mut state = self.state.lock().await;
        state.enter(
            Call::PutObject {
                bucket: bucket.to_string(),
                path: path.to_string(),
                size: data.len() as u64,
            },
            None,
        )?;
        Ok(state.store(bucket, path, data, headers, false))
    }

    async fn put_object_from_buffer(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        headers: &ObjectHeaders,
    ) -> Result<ObjectHeaders> {
        let mut state = self.state.lock().await;
        state.enter(
            Call::PutBuffer {
                bucket: bucket.to_string(),
                path: path.to_string(),
                size: data.len() as u64,
            },
            None,
        )?;
        Ok(state.store(bucket, path, data, headers, false))
    }

    async fn get_object(&self, bucket: &str, path: &str) -> Result<(Bytes, ObjectHeaders)> {
        let mut state = self.state.lock().await;
        state.enter(
            Call::Get {
                bucket: bucket.to_string(),
                path: path.to_string(),
            },
            None,
        )?;
        let object = state
            .objects
            .get(&(bucket.to_string(), path.to_string()))
            .ok_or_else(|| not_found(bucket, path))?;
        Ok((object.data.clone(), self.response_headers(object)))
    }

    async fn head_object(&self, bucket: &str, path: &str) -> Result<ObjectHeaders> {
        let mut state = self.state.lock().await;
        state.enter(
            Call::Head {
                bucket: bucket.to_string(),
                path: path.to_string(),
            },
            None,
        )?;
        let object = state
            .objects
            .get(&(bucket.to_string(), path.to_string()))
            .ok_or_else(|| not_found(bucket, path))?;
        Ok(self.response_headers(object))
    }

    async fn delete_object(&self, bucket: &str, path: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter(
            Call::Delete {
                bucket: bucket.to_string(),
                path: path.to_string(),
            },
            None,
        )?;
        state
            .objects
            .remove(&(bucket.to_string(), path.to_string()));
        Ok(())
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_path: &str,
        dst_bucket: &str,
        dst_path: &str,
        headers: &ObjectHeaders,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter(
            Call::Copy {
                src_bucket: src_bucket.to_string(),
                src_path: src_path.to_string(),
                dst_bucket: dst_bucket.to_string(),
                dst_path: dst_path.to_string(),
            },
            None,
        )?;
        let source = state
            .objects
            .get(&(src_bucket.to_string(), src_path.to_string()))
            .cloned()
            .ok_or_else(|| not_found(src_bucket, src_path))?;
        let mut stored_headers = source.headers.clone();
        stored_headers.merge(headers);
        state.store(dst_bucket, dst_path, source.data, &stored_headers, source.multipart);
        Ok(())
    }

    async fn object_url(
        &self,
        bucket: &str,
        path: &str,
        expires_in: Option<Duration>,
    ) -> Result<String> {
        let mut state = self.state.lock().await;
        state.enter(
            Call::Url {
                bucket: bucket.to_string(),
                path: path.to_string(),
                expires_in,
            },
            None,
        )?;
        Ok(match expires_in {
            None => format!("memory://{bucket}/{path}"),
            Some(expires_in) => format!(
                "memory://{bucket}/{path}?Expires={}",
                Timestamp::now().as_second() + expires_in.as_secs() as i64
            ),
        })
    }

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<UploadEntry>> {
        let mut state = self.state.lock().await;
        state.enter(
            Call::ListUploads {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
            },
            None,
        )?;
        Ok(state
            .uploads
            .iter()
            .filter(|(_, u)| u.bucket == bucket && u.path.starts_with(prefix))
            .map(|(upload_id, u)| UploadEntry {
                key: u.path.clone(),
                upload_id: upload_id.clone(),
            })
            .collect())
    }

    async fn list_parts(&self, _bucket: &str, _path: &str, upload_id: &str) -> Result<Vec<Part>> {
        let mut state = self.state.lock().await;
        state.enter(
            Call::ListParts {
                upload_id: upload_id.to_string(),
            },
            None,
        )?;
        let upload = state
            .uploads
            .get(upload_id)
            .ok_or_else(|| no_such_upload(upload_id))?;
        Ok(upload
            .parts
            .iter()
            .map(|(part_number, (data, etag))| Part {
                part_number: *part_number,
                size: data.len() as u64,
                etag: etag.clone(),
            })
            .collect())
    }

    async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        path: &str,
        headers: &ObjectHeaders,
    ) -> Result<String> {
        let mut state = self.state.lock().await;
        state.enter(
            Call::Initiate {
                bucket: bucket.to_string(),
                path: path.to_string(),
            },
            None,
        )?;
        let upload_id = format!("upload-{}", state.next_id());
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                path: path.to_string(),
                headers: headers.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        _path: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        let mut state = self.state.lock().await;
        state.enter(
            Call::UploadPart {
                upload_id: upload_id.to_string(),
                part_number,
                size: data.len() as u64,
            },
            Some(part_number),
        )?;
        let upload = state
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| no_such_upload(upload_id))?;
        let etag = format!("{upload_id}-{part_number}");
        upload.parts.insert(part_number, (data, etag.clone()));
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        _bucket: &str,
        _path: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter(
            Call::Complete {
                upload_id: upload_id.to_string(),
                part_numbers: parts.iter().map(|p| p.part_number).collect(),
            },
            None,
        )?;
        if parts.is_empty() {
            return Err(Error::from_status(400, "MalformedXML: no parts"));
        }
        let upload = state
            .uploads
            .remove(upload_id)
            .ok_or_else(|| no_such_upload(upload_id))?;

        let mut data = BytesMut::new();
        let mut invalid = None;
        for part in parts {
            match upload.parts.get(&part.part_number) {
                Some((chunk, etag)) if *etag == part.etag => data.extend_from_slice(chunk),
                _ => {
                    invalid = Some(part.part_number);
                    break;
                }
            }
        }
        if let Some(part_number) = invalid {
            state.uploads.insert(upload_id.to_string(), upload);
            return Err(Error::from_status(400, format!("InvalidPart: {part_number}")));
        }

        let data = data.freeze();
        state.store(&upload.bucket, &upload.path, data, &upload.headers, true);
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        _bucket: &str,
        _path: &str,
        upload_id: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter(
            Call::Abort {
                upload_id: upload_id.to_string(),
            },
            None,
        )?;
        state
            .uploads
            .remove(upload_id)
            .map(|_| ())
            .ok_or_else(|| no_such_upload(upload_id))
    }
}
