//! Impls - ports の実装
//!
//! # 開発用・テスト用
//! - **InMemoryBlobStore** / **InMemoryMetadataRepository**
//!
//! # 本番用
//! - **S3BlobStore**: aws-sdk-s3 (AWS または S3 互換エンドポイント)
//! - **SqliteMetadataRepository**: rusqlite
//! - **HttpTransport**: reqwest multipart

pub mod http_transport;
pub mod memory_blob;
pub mod memory_metadata;
pub mod s3_blob;
pub mod sqlite_metadata;

pub use self::http_transport::HttpTransport;
pub use self::memory_blob::InMemoryBlobStore;
pub use self::memory_metadata::InMemoryMetadataRepository;
pub use self::s3_blob::{S3BlobStore, S3Settings};
pub use self::sqlite_metadata::SqliteMetadataRepository;
