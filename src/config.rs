use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct Settings {
    pub(crate) api: ApiConfig,
    #[serde(default)]
    pub(crate) replication: ReplicationConfig,
}

/// Connection details handed to the API client when it is built.
#[derive(Debug, Deserialize, Clone)]
pub(crate) struct ApiConfig {
    #[serde(default = "default_endpoint")]
    pub(crate) endpoint: String,
    pub(crate) access_token: String,
    #[serde(default = "default_timeout_secs")]
    pub(crate) timeout_secs: u64,
    #[serde(default)]
    pub(crate) headers: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct ReplicationConfig {
    #[serde(default = "default_data_dir")]
    pub(crate) data_dir: PathBuf,
    #[serde(default)]
    pub(crate) page_size: Option<u32>,
    /// Marks Media categories and CustomFields keys as provider codes.
    #[serde(default = "default_coded_prefix")]
    pub(crate) coded_prefix: String,
    #[serde(default = "default_watermark_skew_minutes")]
    pub(crate) watermark_skew_minutes: i64,
    #[serde(default = "default_timestamp_field")]
    pub(crate) timestamp_field: String,
    #[serde(default = "default_expand")]
    pub(crate) expand: String,
    #[serde(default = "default_count_select")]
    pub(crate) count_select: String,
    #[serde(default)]
    pub(crate) pretty: bool,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            page_size: None,
            coded_prefix: default_coded_prefix(),
            watermark_skew_minutes: default_watermark_skew_minutes(),
            timestamp_field: default_timestamp_field(),
            expand: default_expand(),
            count_select: default_count_select(),
            pretty: false,
        }
    }
}

fn default_endpoint() -> String {
    "https://replication.sparkapi.com/Reso/OData".to_string()
}

// large expanded pages take a while
fn default_timeout_secs() -> u64 {
    30
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_coded_prefix() -> String {
    "b__".to_string()
}

fn default_watermark_skew_minutes() -> i64 {
    20
}

fn default_timestamp_field() -> String {
    "ModificationTimestamp".to_string()
}

fn default_expand() -> String {
    "Media,CustomFields".to_string()
}

fn default_count_select() -> String {
    "ListingKey".to_string()
}

impl Settings {
    /// Reads `path` (if present) and layers `RESO__*` environment variables on top.
    pub(crate) fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("RESO").separator("__"));

        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config = builder.build()?;
        let settings: Settings = config.try_deserialize()?;

        debug!(
            endpoint = %settings.api.endpoint,
            data_dir = %settings.replication.data_dir.display(),
            headers = ?settings.api.headers.keys().collect::<Vec<_>>(),
            "Parsed settings"
        );

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(raw: &str) -> Result<Settings, ConfigError> {
        Settings::from_builder(
            Config::builder().add_source(config::File::from_str(raw, config::FileFormat::Toml)),
        )
    }

    #[test]
    fn defaults_fill_missing_keys() {
        let settings = from_toml(
            r#"
            [api]
            access_token = "token"
            "#,
        )
        .unwrap();

        assert_eq!(settings.api.endpoint, "https://replication.sparkapi.com/Reso/OData");
        assert_eq!(settings.api.timeout_secs, 30);
        assert!(settings.api.headers.is_empty());

        let replication = settings.replication;
        assert_eq!(replication.data_dir, PathBuf::from("."));
        assert_eq!(replication.page_size, None);
        assert_eq!(replication.coded_prefix, "b__");
        assert_eq!(replication.watermark_skew_minutes, 20);
        assert_eq!(replication.timestamp_field, "ModificationTimestamp");
        assert_eq!(replication.expand, "Media,CustomFields");
        assert_eq!(replication.count_select, "ListingKey");
        assert!(!replication.pretty);
    }

    #[test]
    fn file_values_override_defaults() {
        let settings = from_toml(
            r#"
            [api]
            endpoint = "https://example.test/odata"
            access_token = "token"
            timeout_secs = 90

            [api.headers]
            X-Client = "replicator"

            [replication]
            data_dir = "out"
            page_size = 250
            coded_prefix = "c__"
            pretty = true
            "#,
        )
        .unwrap();

        assert_eq!(settings.api.endpoint, "https://example.test/odata");
        assert_eq!(settings.api.timeout_secs, 90);
        assert_eq!(settings.replication.data_dir, PathBuf::from("out"));
        assert_eq!(settings.replication.page_size, Some(250));
        assert_eq!(settings.replication.coded_prefix, "c__");
        assert!(settings.replication.pretty);
        assert_eq!(settings.replication.watermark_skew_minutes, 20);
    }

    #[test]
    fn access_token_is_required() {
        assert!(from_toml("[api]\nendpoint = \"https://example.test\"").is_err());
    }
}
