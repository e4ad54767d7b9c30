//! ferry-core
//!
//! Building blocks for resilient file transfer.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, outcome, record, state, errors, events）
//! - **ports**: 抽象化レイヤー（Transport, BlobStore, MetadataRepository, Clock, IdGenerator）
//! - **scheduler**: クライアント側のアップロードキュー（並行数制限・リトライ）
//! - **ingestion**: サーバ側の取り込み（検証 → Blob 保存 → メタデータ記録）、レート制限
//! - **impls**: ports の実装（InMemory, S3, SQLite, HTTP）
//! - **validation**: サイズ上限と MIME 許可リスト
//! - **observability**: 状態別の件数

pub mod domain;
pub mod impls;
pub mod ingestion;
pub mod observability;
pub mod ports;
pub mod scheduler;
pub mod validation;

pub use domain::{FerryError, Outcome, TaskId, TaskSnapshot, UploadFile};
pub use scheduler::{SchedulerConfig, UploadScheduler};
