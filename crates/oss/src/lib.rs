//! bf-oss: OSS REST transport for bucketfile
//!
//! This crate implements the `ObjectTransport` trait from bf-core by talking
//! to an OSS-compatible REST endpoint with reqwest. Request signing is
//! pluggable through [`RequestSigner`].

pub mod client;
pub mod signer;

pub use client::OssTransport;
pub use signer::{Anonymous, RequestSigner};
