use async_trait::async_trait;
use http::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use http::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ApiConfig;
use crate::error::{Error, Result};

/// OData query parameters, in the order they are sent.
pub(crate) type QueryParams = Vec<(&'static str, String)>;

/// The slice of the RESO Web API the replicator needs.
#[async_trait]
pub(crate) trait ResoApi: Send + Sync {
    /// `GET path?query`, decoded as JSON.
    async fn get(&self, path: &str, query: &QueryParams) -> Result<Value>;

    /// `GET path`, raw body. Used for the XML `$metadata` document.
    async fn get_text(&self, path: &str) -> Result<String>;
}

pub(crate) struct HttpResoClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpResoClient {
    pub(crate) fn new(config: &ApiConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {}", config.access_token);
        let mut auth = HeaderValue::from_str(&bearer)
            .map_err(|_| Error::InvalidInput("access token is not a valid header value".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::InvalidInput(format!("invalid header name '{}'", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| Error::InvalidInput(format!("invalid value for header '{}'", name)))?;
            headers.insert(name, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str, query: &QueryParams) -> Result<reqwest::Url> {
        let base = format!("{}{}", self.endpoint, path);
        if query.is_empty() {
            Ok(reqwest::Url::parse(&base)?)
        } else {
            Ok(reqwest::Url::parse_with_params(&base, query.iter().map(|(k, v)| (*k, v.as_str())))?)
        }
    }

    async fn send(&self, url: reqwest::Url, accept: &'static str) -> Result<reqwest::Response> {
        debug!(%url, "GET");
        let response = self
            .http
            .get(url)
            .header(ACCEPT, HeaderValue::from_static(accept))
            .send()
            .await?;

        let status = response.status();
        info!("Response Code: {}", status);
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, body))
    }
}

/// Maps a non-success response onto the crate error.
fn status_error(status: StatusCode, body: String) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Unauthorized(status),
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimit,
        _ => Error::Status { status, body },
    }
}

#[async_trait]
impl ResoApi for HttpResoClient {
    async fn get(&self, path: &str, query: &QueryParams) -> Result<Value> {
        let url = self.url(path, query)?;
        let response = self.send(url, "application/json").await?;
        Ok(response.json().await?)
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        let url = self.url(path, &QueryParams::new())?;
        let response = self.send(url, "application/xml").await?;
        Ok(response.text().await?)
    }
}
