//! S3BlobStore - AWS S3 / S3 互換ストレージ
//!
//! `S3_ENDPOINT` が指定された場合は path-style (MinIO など)。
//! SDK のエラーはここで `FerryError::Storage` に変換し、ポートの外には出さない。

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, SharedCredentialsProvider};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::domain::FerryError;
use crate::ports::BlobStore;

/// Connection settings for an S3 bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Settings {
    pub region: String,
    pub bucket: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,

    /// Custom endpoint for S3-compatible stores; switches to path-style URLs.
    pub endpoint: Option<String>,
}

impl S3Settings {
    /// Public URL of `key` in this bucket.
    pub fn object_url(&self, key: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}/{key}", endpoint.trim_end_matches('/'), self.bucket),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{key}",
                self.bucket, self.region
            ),
        }
    }
}

pub struct S3BlobStore {
    client: Client,
    settings: S3Settings,
}

impl S3BlobStore {
    /// Build a client from `settings`. Static credentials are used when both
    /// halves are present; otherwise the default provider chain applies.
    pub async fn connect(settings: S3Settings) -> Result<Self, FerryError> {
        if settings.bucket.trim().is_empty() {
            return Err(FerryError::Configuration("S3 bucket not configured".into()));
        }

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(settings.region.clone()));
        match (&settings.access_key_id, &settings.secret_access_key) {
            (Some(ak), Some(sk)) => {
                let creds = Credentials::new(ak.trim(), sk.trim(), None, None, "ferry-static");
                loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
            }
            (None, None) => {}
            _ => {
                return Err(FerryError::Configuration(
                    "S3 credentials incomplete: both access key and secret key must be provided"
                        .into(),
                ));
            }
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        let client = Client::from_conf(builder.build());
        debug!(bucket = %settings.bucket, region = %settings.region, endpoint = ?settings.endpoint, "s3 client ready");
        Ok(Self { client, settings })
    }

    pub fn bucket(&self) -> &str {
        &self.settings.bucket
    }
}

/// Translate an SDK error, keeping the service error code when there is one.
fn storage_error<E, R>(op: &str, err: SdkError<E, R>) -> FerryError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match err.as_service_error() {
        Some(service) => {
            let message = format!("{op}: {}", service.message().unwrap_or("no message"));
            match service.code() {
                Some(code) => FerryError::blob(message).with_code(code),
                None => FerryError::blob(message),
            }
        }
        None => FerryError::blob(format!("{op}: {}", DisplayErrorContext(&err))),
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String, FerryError> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.settings.bucket)
            .key(key)
            .if_none_match("*")
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| storage_error("put_object", e))?;
        debug!(bucket = %self.settings.bucket, key, size, "object stored");
        Ok(self.settings.object_url(key))
    }

    async fn delete(&self, key: &str) -> Result<(), FerryError> {
        self.client
            .delete_object()
            .bucket(&self.settings.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| storage_error("delete_object", e))?;
        Ok(())
    }

    async fn ping(&self) -> bool {
        match self
            .client
            .head_bucket()
            .bucket(&self.settings.bucket)
            .send()
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(bucket = %self.settings.bucket, error = %DisplayErrorContext(&e), "bucket unreachable");
                false
            }
        }
    }
}
