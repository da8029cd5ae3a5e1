//! Request signing seam
//!
//! The transport hands every outgoing request to a signer right before it is
//! sent. Credentials and signature versions stay outside the transport.

use std::time::Duration;

use bf_core::{Error, Result};
use url::Url;

/// Authenticates outgoing requests
pub trait RequestSigner: Send + Sync {
    /// Add authentication to a request about to be sent
    fn sign(&self, request: &mut reqwest::Request) -> Result<()>;

    /// Produce a URL granting `method` on `url` for `expires_in`
    fn presign(&self, method: &str, url: Url, expires_in: Duration) -> Result<Url> {
        let _ = (method, url, expires_in);
        Err(Error::UnsupportedFeature(
            "this signer cannot produce expiring URLs".to_string(),
        ))
    }
}

/// Sends requests as they are, for public buckets and local gateways
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl RequestSigner for Anonymous {
    fn sign(&self, _request: &mut reqwest::Request) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_leaves_request_untouched() {
        let url = Url::parse("http://localhost:9000/bucket/a.txt").unwrap();
        let mut request = reqwest::Request::new(reqwest::Method::GET, url);
        Anonymous.sign(&mut request).unwrap();
        assert!(request.headers().is_empty());
    }

    #[test]
    fn test_anonymous_cannot_presign() {
        let url = Url::parse("http://localhost:9000/bucket/a.txt").unwrap();
        let err = Anonymous
            .presign("GET", url, Duration::from_secs(60))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature(_)));
    }
}
