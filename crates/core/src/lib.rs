//! bf-core: Core library for bucketfile
//!
//! This crate provides the object-storage file model, including:
//! - Key resolution from directory and file keys
//! - The user metadata codec between symbolic keys and wire headers
//! - The ObjectTransport trait and an in-memory implementation
//! - Multipart upload orchestration with resume and abort
//! - Configuration and alias management
//!
//! Concrete backends live in bf-s3 and bf-oss; this crate depends on no
//! storage SDK.

pub mod alias;
pub mod config;
pub mod directory;
pub mod error;
pub mod file;
pub mod headers;
pub mod memory;
pub mod metadata;
pub mod multipart;
pub mod path;
pub mod transport;
pub mod wire;

pub use alias::{Alias, AliasManager, Backend, BucketLookup};
pub use config::{Config, ConfigManager};
pub use directory::{Directory, Files};
pub use error::{Error, Result};
pub use file::{Body, File, FileAttributes, Lazy, Owner, Saved};
pub use headers::ObjectHeaders;
pub use memory::MemoryTransport;
pub use metadata::{Metadata, MetadataCodec};
pub use multipart::{MultipartConfig, MultipartUpload, MultipartUploader, UploadPhase};
pub use path::{ObjectLocation, ParsedPath, RemotePath, parse_path};
pub use transport::{CompletedPart, ObjectTransport, Part, UploadEntry};
