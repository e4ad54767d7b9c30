//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 外部システム（Blob storage, metadata DB, HTTP transport）への
//! インターフェースを trait として提供し、実装の詳細を隠蔽します。
//!
//! 実装は `impls` にあります。

pub mod blob_store;
pub mod clock;
pub mod id_generator;
pub mod metadata;
pub mod transport;

pub use self::blob_store::BlobStore;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::metadata::MetadataRepository;
pub use self::transport::{ProgressReporter, Transport};
