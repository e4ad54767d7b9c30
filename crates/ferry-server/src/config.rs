//! Server configuration from the environment.
//!
//! Every missing required variable is reported at once so a misconfigured
//! deployment fails on the first start instead of one variable at a time.

use std::time::Duration;

use ferry_core::impls::S3Settings;
use ferry_core::ingestion::rate_limit::{DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_DATABASE_URL: &str = "ferry.db";

const REQUIRED: [&str; 4] = [
    "AWS_REGION",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "S3_BUCKET_NAME",
];

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub environment: Environment,
    pub s3: S3Settings,
    pub database_url: String,
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let missing: Vec<&'static str> = REQUIRED
            .iter()
            .copied()
            .filter(|name| get(*name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(vec![name]));

        let environment = match get("FERRY_ENV").as_deref() {
            None | Some("development") => Environment::Development,
            Some("production") => Environment::Production,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "FERRY_ENV",
                    value: other.to_string(),
                });
            }
        };

        Ok(Self {
            port: parse_or("PORT", get("PORT"), DEFAULT_PORT)?,
            environment,
            s3: S3Settings {
                region: required("AWS_REGION")?,
                bucket: required("S3_BUCKET_NAME")?,
                access_key_id: Some(required("AWS_ACCESS_KEY_ID")?),
                secret_access_key: Some(required("AWS_SECRET_ACCESS_KEY")?),
                endpoint: get("S3_ENDPOINT"),
            },
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            rate_limit_max: parse_or("RATE_LIMIT_MAX", get("RATE_LIMIT_MAX"), DEFAULT_MAX_REQUESTS)?,
            rate_limit_window: Duration::from_secs(parse_or(
                "RATE_LIMIT_WINDOW_SECS",
                get("RATE_LIMIT_WINDOW_SECS"),
                DEFAULT_WINDOW.as_secs(),
            )?),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid { name, value: v }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    const STORAGE: [(&str, &str); 4] = [
        ("AWS_REGION", "eu-west-1"),
        ("AWS_ACCESS_KEY_ID", "AKIA"),
        ("AWS_SECRET_ACCESS_KEY", "secret"),
        ("S3_BUCKET_NAME", "uploads"),
    ];

    #[test]
    fn defaults_apply_when_only_storage_is_set() {
        let cfg = ServerConfig::from_lookup(lookup(&STORAGE)).unwrap();
        assert_eq!(cfg.port, 3001);
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.database_url, "ferry.db");
        assert_eq!(cfg.rate_limit_max, 100);
        assert_eq!(cfg.rate_limit_window, Duration::from_secs(900));
        assert_eq!(cfg.s3.bucket, "uploads");
        assert_eq!(cfg.s3.endpoint, None);
    }

    #[test]
    fn all_missing_variables_are_reported() {
        let err = ServerConfig::from_lookup(lookup(&[("AWS_REGION", "eu-west-1"), ("S3_BUCKET_NAME", " ")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Missing(vec![
                "AWS_ACCESS_KEY_ID",
                "AWS_SECRET_ACCESS_KEY",
                "S3_BUCKET_NAME"
            ])
        );
        assert!(err.to_string().contains("AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY"));
    }

    #[test]
    fn overrides_are_parsed() {
        let mut vars = STORAGE.to_vec();
        vars.extend([
            ("PORT", "8080"),
            ("FERRY_ENV", "production"),
            ("S3_ENDPOINT", "http://minio:9000"),
            ("DATABASE_URL", "/var/lib/ferry/meta.db"),
            ("RATE_LIMIT_MAX", "5"),
            ("RATE_LIMIT_WINDOW_SECS", "60"),
        ]);
        let cfg = ServerConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(cfg.port, 8080);
        assert!(cfg.environment.is_production());
        assert_eq!(cfg.s3.endpoint.as_deref(), Some("http://minio:9000"));
        assert_eq!(cfg.rate_limit_max, 5);
        assert_eq!(cfg.rate_limit_window, Duration::from_secs(60));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let mut vars = STORAGE.to_vec();
        vars.push(("PORT", "eighty"));
        assert_eq!(
            ServerConfig::from_lookup(lookup(&vars)).unwrap_err(),
            ConfigError::Invalid {
                name: "PORT",
                value: "eighty".into()
            }
        );

        let mut vars = STORAGE.to_vec();
        vars.push(("FERRY_ENV", "staging"));
        assert!(matches!(
            ServerConfig::from_lookup(lookup(&vars)),
            Err(ConfigError::Invalid { name: "FERRY_ENV", .. })
        ));
    }
}
