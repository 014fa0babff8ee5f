//! Authenticated JSON transport shared by the Google API services
//!
//! Every request goes through [`RetryPolicy::retry_async`]; non-success
//! responses become [`ApiError`] so the retry wrapper can classify them.

use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;

use crate::config::Config;
use crate::error::{ApiError, GsuiteMcpError, Result};
use crate::google::auth::Authenticator;
use crate::retry::RetryPolicy;

/// How requests are authorized
#[derive(Clone)]
pub enum Credentials {
    /// OAuth token managed by an [`Authenticator`]
    OAuth(Arc<Authenticator>),

    /// Fixed bearer token (fake backend)
    Static(String),
}

impl Credentials {
    /// Pick credentials for the configured mode
    pub fn from_config(config: &Config) -> Result<Self> {
        match &config.ish {
            Some(ish) => Ok(Credentials::Static(ish.bearer_token())),
            None => Ok(Credentials::OAuth(Arc::new(Authenticator::new(config)?))),
        }
    }

    async fn bearer_token(&self) -> Result<String> {
        match self {
            Credentials::OAuth(auth) => auth.access_token().await,
            Credentials::Static(token) => Ok(token.clone()),
        }
    }
}

/// HTTP client for Google REST APIs
#[derive(Clone)]
pub struct ApiClient {
    http_client: reqwest::Client,
    credentials: Credentials,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(credentials: Credentials, retry: RetryPolicy) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            credentials,
            retry,
        }
    }

    pub async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        self.execute(Method::GET, url, query, None).await
    }

    pub async fn post(&self, url: &str, query: &[(&str, String)], body: &Value) -> Result<Value> {
        self.execute(Method::POST, url, query, Some(body)).await
    }

    pub async fn put(&self, url: &str, query: &[(&str, String)], body: &Value) -> Result<Value> {
        self.execute(Method::PUT, url, query, Some(body)).await
    }

    pub async fn patch(&self, url: &str, query: &[(&str, String)], body: &Value) -> Result<Value> {
        self.execute(Method::PATCH, url, query, Some(body)).await
    }

    pub async fn delete(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        self.execute(Method::DELETE, url, query, None).await
    }

    /// Send a request, retrying rate limits and server errors
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        tracing::debug!("{} {}", method, url);
        self.retry
            .retry_async(|| self.send_once(method.clone(), url, query, body))
            .await
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let token = self.credentials.bearer_token().await?;

        let mut request = self
            .http_client
            .request(method, url)
            .bearer_auth(&token)
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::debug!("{} returned {}", url, status);
            return Err(ApiError::new(status.as_u16(), text).into());
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Log a failed call and label it with the action
pub(crate) fn failed(err: GsuiteMcpError, action: &str) -> GsuiteMcpError {
    tracing::warn!("{}: {}", action, err);
    err.context(action)
}

/// Percent-encode an id so it stays one URL path segment
pub fn path_segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Encode a People resource name (`people/<id>`), keeping the collection
/// prefix as a literal path
pub fn resource_path(resource_name: &str) -> String {
    match resource_name.strip_prefix("people/") {
        Some(id) => format!("people/{}", path_segment(id)),
        None => path_segment(resource_name),
    }
}

/// Read a string field, empty when absent
pub fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Read an array field, empty when absent
pub fn array_field(value: &Value, key: &str) -> Vec<Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}
