//! S3 transport implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectTransport trait from bf-core.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, MetadataDirective, ObjectCannedAcl, ServerSideEncryption,
    StorageClass,
};
use aws_smithy_types::date_time::{DateTime, Format};
use bytes::Bytes;

use bf_core::metadata::AMZ_META_PREFIX;
use bf_core::transport::{self, CompletedPart, ObjectTransport, Part, UploadEntry};
use bf_core::{Alias, Error, ObjectHeaders, Result};

/// Request headers the SDK exposes as typed fields
#[derive(Debug, Default)]
struct RequestHeaders {
    content_type: Option<String>,
    content_disposition: Option<String>,
    content_encoding: Option<String>,
    cache_control: Option<String>,
    acl: Option<ObjectCannedAcl>,
    storage_class: Option<StorageClass>,
    server_side_encryption: Option<ServerSideEncryption>,
    metadata: Option<HashMap<String, String>>,
}

impl RequestHeaders {
    fn from_headers(headers: &ObjectHeaders) -> Self {
        let mut request = Self::default();
        let mut metadata = HashMap::new();

        for (name, value) in headers.iter() {
            let lower = name.to_ascii_lowercase();
            if let Some(key) = lower.strip_prefix(AMZ_META_PREFIX) {
                metadata.insert(key.to_string(), value.to_string());
                continue;
            }
            match lower.as_str() {
                "content-type" => request.content_type = Some(value.to_string()),
                "content-disposition" => request.content_disposition = Some(value.to_string()),
                "content-encoding" => request.content_encoding = Some(value.to_string()),
                "cache-control" => request.cache_control = Some(value.to_string()),
                "x-amz-acl" => request.acl = Some(ObjectCannedAcl::from(value)),
                "x-amz-storage-class" => request.storage_class = Some(StorageClass::from(value)),
                "x-amz-server-side-encryption" => {
                    request.server_side_encryption = Some(ServerSideEncryption::from(value))
                }
                _ => tracing::debug!(header = name, "Header not supported by S3 transport, skipping"),
            }
        }

        if !metadata.is_empty() {
            request.metadata = Some(metadata);
        }
        request
    }

    fn is_empty(&self) -> bool {
        self.content_type.is_none()
            && self.content_disposition.is_none()
            && self.content_encoding.is_none()
            && self.cache_control.is_none()
            && self.metadata.is_none()
    }
}

/// Response fields of HEAD and GET that are turned back into headers
#[derive(Debug, Default)]
struct ResponseHeaders<'a> {
    content_length: Option<i64>,
    content_type: Option<&'a str>,
    content_disposition: Option<&'a str>,
    etag: Option<&'a str>,
    last_modified: Option<&'a DateTime>,
    accept_ranges: Option<&'a str>,
    metadata: Option<&'a HashMap<String, String>>,
}

impl ResponseHeaders<'_> {
    fn into_headers(self) -> ObjectHeaders {
        let mut headers = ObjectHeaders::new();
        if let Some(length) = self.content_length {
            headers.insert("content-length", length.to_string());
        }
        if let Some(content_type) = self.content_type {
            headers.insert("content-type", content_type);
        }
        if let Some(disposition) = self.content_disposition {
            headers.insert("content-disposition", disposition);
        }
        if let Some(etag) = self.etag {
            headers.insert("etag", etag);
        }
        if let Some(modified) = self.last_modified.and_then(|t| t.fmt(Format::HttpDate).ok()) {
            headers.insert("last-modified", modified);
        }
        if let Some(ranges) = self.accept_ranges {
            headers.insert("accept-ranges", ranges);
        }
        for (key, value) in self.metadata.into_iter().flatten() {
            headers.insert(format!("{AMZ_META_PREFIX}{key}"), value.as_str());
        }
        headers
    }
}

fn map_sdk_error<E>(err: SdkError<E>, target: impl fmt::Display) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let message = DisplayErrorContext(&err).to_string();
    match status {
        Some(404) => Error::NotFound(target.to_string()),
        Some(status) => Error::from_status(status, message),
        None => Error::Network(message),
    }
}

/// S3 transport wrapper
pub struct S3Transport {
    inner: aws_sdk_s3::Client,
    alias: Alias,
}

impl S3Transport {
    /// Create a new S3 transport from an alias configuration
    pub async fn new(alias: Alias) -> Result<Self> {
        let credentials = aws_credential_types::Credentials::new(
            alias.access_key.clone(),
            alias.secret_key.clone(),
            None, // session token
            None, // expiry
            "bf-static-credentials",
        );

        let retry = alias.retry_config();
        let timeout = alias.timeout_config();
        let retry_config = aws_config::retry::RetryConfig::standard()
            .with_max_attempts(retry.max_attempts)
            .with_initial_backoff(retry.initial_backoff())
            .with_max_backoff(retry.max_backoff());
        let timeout_config = aws_config::timeout::TimeoutConfig::builder()
            .connect_timeout(timeout.connect())
            .read_timeout(timeout.read())
            .build();

        if alias.insecure {
            tracing::warn!(alias = %alias.name, "S3 transport does not support insecure TLS, verifying certificates");
        }

        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(aws_config::Region::new(alias.region.clone()))
            .endpoint_url(&alias.endpoint)
            .retry_config(retry_config)
            .timeout_config(timeout_config)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(alias.path_style())
            .build();

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
            alias,
        })
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    pub fn alias(&self) -> &Alias {
        &self.alias
    }

    async fn put_body(
        &self,
        bucket: &str,
        path: &str,
        body: ByteStream,
        headers: &ObjectHeaders,
    ) -> Result<ObjectHeaders> {
        let request = RequestHeaders::from_headers(headers);
        let response = self
            .inner
            .put_object()
            .bucket(bucket)
            .key(path)
            .body(body)
            .set_content_type(request.content_type)
            .set_content_disposition(request.content_disposition)
            .set_content_encoding(request.content_encoding)
            .set_cache_control(request.cache_control)
            .set_acl(request.acl)
            .set_storage_class(request.storage_class)
            .set_server_side_encryption(request.server_side_encryption)
            .set_metadata(request.metadata)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, format!("{bucket}/{path}")))?;

        let mut headers = ObjectHeaders::new();
        if let Some(etag) = response.e_tag() {
            headers.insert("etag", etag);
        }
        Ok(headers)
    }
}

#[async_trait]
impl ObjectTransport for S3Transport {
    fn metadata_prefix(&self) -> &str {
        AMZ_META_PREFIX
    }

    async fn put_object(
        &self,
        bucket: &str,
        path: &str,
        file: &Path,
        headers: &ObjectHeaders,
    ) -> Result<ObjectHeaders> {
        let body = ByteStream::from_path(file)
            .await
            .map_err(|e| Error::General(format!("Failed to open {}: {e}", file.display())))?;
        tracing::debug!(bucket, path, file = %file.display(), "PUT object from file");
        self.put_body(bucket, path, body, headers).await
    }

    async fn put_object_from_buffer(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        headers: &ObjectHeaders,
    ) -> Result<ObjectHeaders> {
        tracing::debug!(bucket, path, size = data.len(), "PUT object from buffer");
        self.put_body(bucket, path, ByteStream::from(data), headers)
            .await
    }

    async fn get_object(&self, bucket: &str, path: &str) -> Result<(Bytes, ObjectHeaders)> {
        let response = self
            .inner
            .get_object()
            .bucket(bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, format!("{bucket}/{path}")))?;

        let headers = ResponseHeaders {
            content_length: response.content_length(),
            content_type: response.content_type(),
            content_disposition: response.content_disposition(),
            etag: response.e_tag(),
            last_modified: response.last_modified(),
            accept_ranges: response.accept_ranges(),
            metadata: response.metadata(),
        }
        .into_headers();

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Network(e.to_string()))?
            .into_bytes();

        Ok((data, headers))
    }

    async fn head_object(&self, bucket: &str, path: &str) -> Result<ObjectHeaders> {
        let response = self
            .inner
            .head_object()
            .bucket(bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, format!("{bucket}/{path}")))?;

        Ok(ResponseHeaders {
            content_length: response.content_length(),
            content_type: response.content_type(),
            content_disposition: response.content_disposition(),
            etag: response.e_tag(),
            last_modified: response.last_modified(),
            accept_ranges: response.accept_ranges(),
            metadata: response.metadata(),
        }
        .into_headers())
    }

    async fn delete_object(&self, bucket: &str, path: &str) -> Result<()> {
        self.inner
            .delete_object()
            .bucket(bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, format!("{bucket}/{path}")))?;
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
        let request = RequestHeaders::from_headers(headers);
        // without REPLACE, S3 keeps the source's headers and ignores ours
        let directive = (!request.is_empty()).then_some(MetadataDirective::Replace);

        self.inner
            .copy_object()
            .copy_source(format!("{src_bucket}/{src_path}"))
            .bucket(dst_bucket)
            .key(dst_path)
            .set_metadata_directive(directive)
            .set_content_type(request.content_type)
            .set_content_disposition(request.content_disposition)
            .set_content_encoding(request.content_encoding)
            .set_cache_control(request.cache_control)
            .set_acl(request.acl)
            .set_storage_class(request.storage_class)
            .set_server_side_encryption(request.server_side_encryption)
            .set_metadata(request.metadata)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, format!("{src_bucket}/{src_path}")))?;
        Ok(())
    }

    async fn object_url(
        &self,
        bucket: &str,
        path: &str,
        expires_in: Option<Duration>,
    ) -> Result<String> {
        let Some(expires_in) = expires_in else {
            let url = transport::object_url(
                &self.alias.endpoint,
                bucket,
                path,
                self.alias.path_style(),
            )?;
            return Ok(url.to_string());
        };

        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| Error::General(format!("Invalid expiration: {e}")))?;
        let request = self
            .inner
            .get_object()
            .bucket(bucket)
            .key(path)
            .presigned(presigning)
            .await
            .map_err(|e| map_sdk_error(e, format!("{bucket}/{path}")))?;
        Ok(request.uri().to_string())
    }

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<UploadEntry>> {
        let mut entries = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut upload_id_marker: Option<String> = None;

        loop {
            let response = self
                .inner
                .list_multipart_uploads()
                .bucket(bucket)
                .prefix(prefix)
                .set_key_marker(key_marker.take())
                .set_upload_id_marker(upload_id_marker.take())
                .send()
                .await
                .map_err(|e| map_sdk_error(e, bucket))?;

            entries.extend(response.uploads().iter().filter_map(|u| {
                Some(UploadEntry {
                    key: u.key()?.to_string(),
                    upload_id: u.upload_id()?.to_string(),
                })
            }));

            if !response.is_truncated().unwrap_or(false) {
                break;
            }
            key_marker = response.next_key_marker().map(str::to_string);
            upload_id_marker = response.next_upload_id_marker().map(str::to_string);
            if key_marker.is_none() && upload_id_marker.is_none() {
                break;
            }
        }

        Ok(entries)
    }

    async fn list_parts(&self, bucket: &str, path: &str, upload_id: &str) -> Result<Vec<Part>> {
        let mut parts = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let response = self
                .inner
                .list_parts()
                .bucket(bucket)
                .key(path)
                .upload_id(upload_id)
                .set_part_number_marker(marker.take())
                .send()
                .await
                .map_err(|e| map_sdk_error(e, format!("multipart upload {upload_id}")))?;

            parts.extend(response.parts().iter().filter_map(|p| {
                Some(Part {
                    part_number: p.part_number()?,
                    size: u64::try_from(p.size()?).ok()?,
                    etag: p.e_tag()?.to_string(),
                })
            }));

            if !response.is_truncated().unwrap_or(false) {
                break;
            }
            marker = response.next_part_number_marker().map(str::to_string);
            if marker.is_none() {
                break;
            }
        }

        parts.sort_by_key(|p| p.part_number);
        Ok(parts)
    }

    async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        path: &str,
        headers: &ObjectHeaders,
    ) -> Result<String> {
        let request = RequestHeaders::from_headers(headers);
        let response = self
            .inner
            .create_multipart_upload()
            .bucket(bucket)
            .key(path)
            .set_content_type(request.content_type)
            .set_content_disposition(request.content_disposition)
            .set_content_encoding(request.content_encoding)
            .set_cache_control(request.cache_control)
            .set_acl(request.acl)
            .set_storage_class(request.storage_class)
            .set_server_side_encryption(request.server_side_encryption)
            .set_metadata(request.metadata)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, format!("{bucket}/{path}")))?;

        response
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| Error::General("Multipart upload created without an upload id".into()))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        path: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        let response = self
            .inner
            .upload_part()
            .bucket(bucket)
            .key(path)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, format!("multipart upload {upload_id}")))?;

        response
            .e_tag()
            .map(str::to_string)
            .ok_or_else(|| Error::General(format!("Part {part_number} uploaded without an ETag")))
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        path: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        if parts.is_empty() {
            return Err(Error::MultipartIntegrity(
                "a multipart upload needs at least one part".into(),
            ));
        }

        let mut ordered: Vec<&CompletedPart> = parts.iter().collect();
        ordered.sort_by_key(|p| p.part_number);
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(
                ordered
                    .into_iter()
                    .map(|p| {
                        aws_sdk_s3::types::CompletedPart::builder()
                            .part_number(p.part_number)
                            .e_tag(&p.etag)
                            .build()
                    })
                    .collect(),
            ))
            .build();

        self.inner
            .complete_multipart_upload()
            .bucket(bucket)
            .key(path)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, format!("multipart upload {upload_id}")))?;
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        path: &str,
        upload_id: &str,
    ) -> Result<()> {
        self.inner
            .abort_multipart_upload()
            .bucket(bucket)
            .key(path)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, format!("multipart upload {upload_id}")))?;
        Ok(())
    }
}
