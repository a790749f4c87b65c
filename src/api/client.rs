//! HTTP client for the back-office record services, with secure credential
//! handling and safe logging.

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::config::Settings;
use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// User agent string for all API requests.
const CLIENT_USER_AGENT: &str = concat!("bulk-edit/", env!("CARGO_PKG_VERSION"));

/// Header carrying the tenant the request acts on behalf of.
pub const TENANT_HEADER: &str = "X-Tenant-Id";

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Query parameter keys (case-insensitive) that should have their values redacted.
const SENSITIVE_QUERY_PARAMS: &[&str] = &["access_token", "api_token", "token", "authorization", "session"];

// ─────────────────────────────────────────────────────────────────────────────
// LoggingMode
// ─────────────────────────────────────────────────────────────────────────────

/// Controls how URLs are sanitized for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoggingMode {
    /// Log only the path component. Strips scheme, host, query, and fragment.
    #[default]
    PathOnly,

    /// Log path and query parameters, but redact sensitive values.
    PathAndQueryRedacted,
}

// ─────────────────────────────────────────────────────────────────────────────
// URL Sanitization
// ─────────────────────────────────────────────────────────────────────────────

fn is_sensitive_param(key: &str) -> bool {
    let key_lower = key.to_ascii_lowercase();
    SENSITIVE_QUERY_PARAMS.iter().any(|&sensitive| key_lower == sensitive)
}

/// Sanitizes a URL for safe logging. The result never contains the scheme,
/// host, or fragment.
pub fn sanitize_url_for_logs(url: &Url, mode: LoggingMode) -> String {
    let path = url.path();

    match mode {
        LoggingMode::PathOnly => path.to_string(),
        LoggingMode::PathAndQueryRedacted => {
            let query_pairs: Vec<_> = url.query_pairs().collect();
            if query_pairs.is_empty() {
                return path.to_string();
            }

            let redacted_pairs: Vec<String> = query_pairs
                .into_iter()
                .map(|(key, value)| {
                    if is_sensitive_param(&key) {
                        format!("{}=***", key)
                    } else {
                        format!("{}={}", key, value)
                    }
                })
                .collect();

            format!("{}?{}", path, redacted_pairs.join("&"))
        }
    }
}

/// Shortens an id for logging (first 8 chars).
pub(crate) fn redact_id(id: &str) -> String {
    match id.char_indices().nth(8) {
        Some((idx, _)) => format!("{}...", &id[..idx]),
        None => id.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ApiClient
// ─────────────────────────────────────────────────────────────────────────────

/// Thin authenticated HTTP client bound to one service base URL and tenant.
///
/// Cloning is cheap; the underlying `reqwest::Client` shares its pool.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    api_token: Option<SecretString>,
    tenant_id: Option<String>,
    logging_mode: LoggingMode,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("tenant_id", &self.tenant_id)
            .field("logging_mode", &self.logging_mode)
            .finish()
    }
}

impl ApiClient {
    /// Creates a client for `base_url` with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the HTTP client fails to initialize.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            http: build_http_client(timeout)?,
            base_url,
            api_token: None,
            tenant_id: None,
            logging_mode: LoggingMode::default(),
        })
    }

    /// Creates a client from loaded settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        let mut client = Self::new(settings.base_url.clone(), settings.request_timeout())?
            .with_logging_mode(settings.logging_mode);
        client.api_token = settings.api_token.clone();
        client.tenant_id = settings.tenant_id.clone();
        Ok(client)
    }

    pub fn with_api_token(mut self, token: SecretString) -> Self {
        self.api_token = Some(token);
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_logging_mode(mut self, mode: LoggingMode) -> Self {
        self.logging_mode = mode;
        self
    }

    /// Appends path segments to the base URL, keeping any path prefix the
    /// base carries (`https://host/backend/` + `["api"]` is `/backend/api`).
    /// Segments are percent-encoded, so a `/` inside one stays inside it.
    pub fn build_url<I>(&self, segments: I) -> Result<Url, AppError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Internal("Base URL cannot have path segments".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Executes a request with auth, tenant and correlation headers, timing
    /// and sanitized logging.
    ///
    /// # Security
    ///
    /// - Never logs the Authorization header or request/response bodies
    /// - Error messages never contain raw URLs or tokens
    pub async fn execute(
        &self,
        method: Method,
        url: Url,
        json_body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, AppError> {
        let start = Instant::now();
        let sanitized_url = sanitize_url_for_logs(&url, self.logging_mode);
        let request_id = Uuid::new_v4().to_string();

        let mut request = self
            .http
            .request(method.clone(), url.as_str())
            .header(REQUEST_ID_HEADER, &request_id);

        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token.expose_secret());
        }
        if let Some(tenant) = &self.tenant_id {
            request = request.header(TENANT_HEADER, tenant);
        }
        if let Some(body) = json_body {
            request = request.header("Content-Type", "application/json").body(body);
        }

        let result = request.send().await;
        let duration_ms = start.elapsed().as_millis();

        match result {
            Ok(response) => {
                info!(
                    "[HTTP] {} {} {} {}ms {}",
                    method,
                    sanitized_url,
                    response.status().as_u16(),
                    duration_ms,
                    request_id
                );
                Ok(response)
            }
            Err(e) => {
                let kind = if e.is_timeout() { "TIMEOUT" } else { "FAILED" };
                info!(
                    "[HTTP] {} {} {} {}ms {}",
                    method, sanitized_url, kind, duration_ms, request_id
                );
                Err(AppError::ConnectionFailed(format!(
                    "{} {} {}",
                    method,
                    sanitized_url,
                    kind.to_ascii_lowercase()
                )))
            }
        }
    }
}

/// Builds the configured HTTP client.
fn build_http_client(timeout: Duration) -> Result<reqwest::Client, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}
