//! XML bodies of the multipart upload protocol

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transport::{CompletedPart, Part, UploadEntry};

#[derive(Debug, Serialize)]
#[serde(rename = "CompleteMultipartUpload")]
struct CompleteMultipartUpload<'a> {
    #[serde(rename = "Part")]
    parts: Vec<CompletePartEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct CompletePartEntry<'a> {
    #[serde(rename = "PartNumber")]
    part_number: i32,
    #[serde(rename = "ETag")]
    etag: &'a str,
}

#[derive(Debug, Deserialize)]
struct InitiateMultipartUploadResult {
    #[serde(rename = "UploadId")]
    upload_id: String,
}

#[derive(Debug, Deserialize)]
struct ListMultipartUploadsResult {
    #[serde(rename = "Upload", default)]
    uploads: Vec<UploadItem>,
}

#[derive(Debug, Deserialize)]
struct UploadItem {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "UploadId")]
    upload_id: String,
}

#[derive(Debug, Deserialize)]
struct ListPartsResult {
    #[serde(rename = "Part", default)]
    parts: Vec<PartItem>,
}

#[derive(Debug, Deserialize)]
struct PartItem {
    #[serde(rename = "PartNumber")]
    part_number: i32,
    #[serde(rename = "ETag")]
    etag: String,
    #[serde(rename = "Size")]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorResult {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

/// Render the completion request body, parts in ascending order
pub fn complete_multipart_upload_body(parts: &[CompletedPart]) -> Result<String> {
    if parts.is_empty() {
        return Err(Error::MultipartIntegrity(
            "a multipart upload needs at least one part".into(),
        ));
    }

    let mut ordered: Vec<&CompletedPart> = parts.iter().collect();
    ordered.sort_by_key(|p| p.part_number);

    let body = CompleteMultipartUpload {
        parts: ordered
            .into_iter()
            .map(|p| CompletePartEntry {
                part_number: p.part_number,
                etag: &p.etag,
            })
            .collect(),
    };
    Ok(quick_xml::se::to_string(&body)?)
}

/// Extract the upload id from an initiate response
pub fn parse_initiate_response(xml: &str) -> Result<String> {
    let result: InitiateMultipartUploadResult = quick_xml::de::from_str(xml)?;
    if result.upload_id.is_empty() {
        return Err(Error::Xml("initiate response carries an empty UploadId".into()));
    }
    Ok(result.upload_id)
}

/// Parse a list-uploads response
pub fn parse_list_uploads_response(xml: &str) -> Result<Vec<UploadEntry>> {
    let result: ListMultipartUploadsResult = quick_xml::de::from_str(xml)?;
    Ok(result
        .uploads
        .into_iter()
        .map(|u| UploadEntry {
            key: u.key,
            upload_id: u.upload_id,
        })
        .collect())
}

/// Parse a list-parts response, sorted by part number
pub fn parse_list_parts_response(xml: &str) -> Result<Vec<Part>> {
    let result: ListPartsResult = quick_xml::de::from_str(xml)?;
    let mut parts: Vec<Part> = result
        .parts
        .into_iter()
        .map(|p| Part {
            part_number: p.part_number,
            size: p.size,
            etag: p.etag,
        })
        .collect();
    parts.sort_by_key(|p| p.part_number);
    Ok(parts)
}

/// Summarize an `<Error>` response body as `Code: Message`
///
/// Returns `None` when the body is not an error document.
pub fn parse_error_response(xml: &str) -> Option<String> {
    let result: ErrorResult = quick_xml::de::from_str(xml).ok()?;
    if result.message.is_empty() {
        Some(result.code)
    } else {
        Some(format!("{}: {}", result.code, result.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(part_number: i32, etag: &str) -> CompletedPart {
        CompletedPart {
            part_number,
            etag: etag.to_string(),
        }
    }

    #[test]
    fn test_complete_body_orders_parts() {
        let body = complete_multipart_upload_body(&[
            completed(2, "etag-2"),
            completed(1, "etag-1"),
            completed(3, "etag-3"),
        ])
        .unwrap();

        assert!(body.starts_with("<CompleteMultipartUpload>"));
        assert!(body.ends_with("</CompleteMultipartUpload>"));
        assert!(body.contains("<Part><PartNumber>1</PartNumber><ETag>etag-1</ETag></Part>"));

        let first = body.find("<PartNumber>1<").unwrap();
        let second = body.find("<PartNumber>2<").unwrap();
        let third = body.find("<PartNumber>3<").unwrap();
        assert!(first < second && second < third);
    }

    #[test]
    fn test_complete_body_rejects_empty() {
        let err = complete_multipart_upload_body(&[]).unwrap_err();
        assert!(matches!(err, Error::MultipartIntegrity(_)));
    }

    #[test]
    fn test_parse_initiate_response() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<InitiateMultipartUploadResult>
  <Bucket>logs</Bucket>
  <Key>2024/app.log</Key>
  <UploadId>0004B9894A22E5B1888A1E29F823****</UploadId>
</InitiateMultipartUploadResult>"#;
        assert_eq!(
            parse_initiate_response(xml).unwrap(),
            "0004B9894A22E5B1888A1E29F823****"
        );
    }

    #[test]
    fn test_parse_list_uploads_response() {
        let xml = r#"<ListMultipartUploadsResult>
  <Bucket>logs</Bucket>
  <Upload><Key>a.bin</Key><UploadId>id-a</UploadId><Initiated>2024-01-01T00:00:00.000Z</Initiated></Upload>
  <Upload><Key>b.bin</Key><UploadId>id-b</UploadId><Initiated>2024-01-01T00:00:00.000Z</Initiated></Upload>
</ListMultipartUploadsResult>"#;
        let uploads = parse_list_uploads_response(xml).unwrap();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[1].key, "b.bin");
        assert_eq!(uploads[1].upload_id, "id-b");

        let empty = parse_list_uploads_response("<ListMultipartUploadsResult><Bucket>logs</Bucket></ListMultipartUploadsResult>").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_parse_list_parts_response() {
        let xml = r#"<ListPartsResult>
  <Bucket>logs</Bucket>
  <Part><PartNumber>2</PartNumber><ETag>"e2"</ETag><Size>100</Size></Part>
  <Part><PartNumber>1</PartNumber><ETag>"e1"</ETag><Size>5242880</Size></Part>
</ListPartsResult>"#;
        let parts = parse_list_parts_response(xml).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].part_number, 1);
        assert_eq!(parts[0].size, 5_242_880);
        assert_eq!(parts[1].etag, "\"e2\"");
    }

    #[test]
    fn test_parse_error_response() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error>
  <Code>NoSuchUpload</Code>
  <Message>The specified upload does not exist.</Message>
  <RequestId>5C3D9175B6FC201293AD****</RequestId>
</Error>"#;
        assert_eq!(
            parse_error_response(xml).as_deref(),
            Some("NoSuchUpload: The specified upload does not exist.")
        );
        assert_eq!(parse_error_response("<html>gateway</html>"), None);
        assert_eq!(parse_error_response(""), None);
    }
}
