//! Discord HTTP client implementation.
//!
//! The request engine serializes calls per rate-limit bucket, honors the
//! server-reported reset/retry windows, and retries 429/5xx responses up to
//! a configurable attempt budget.

use crate::error::{ErrorResponse, HttpError};
use crate::file::File;
use crate::ratelimit::Ratelimiter;
use crate::route::Route;
use crate::routes::{GetGateway, GetGatewayBot};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, Response};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// User agent for requests.
const USER_AGENT_VALUE: &str = concat!(
    "DiscordBot (https://github.com/corded-rs/corded, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Default attempt budget for one logical request.
const DEFAULT_ATTEMPTS: usize = 3;

/// How to decode a successful response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// The raw body bytes.
    Raw,
    /// The body parsed as JSON (empty bodies decode to null).
    #[default]
    Json,
    /// The body as text.
    Text,
    /// JSON if the body parses, text otherwise.
    Auto,
    /// The undecoded response object.
    Response,
}

/// A successful response, decoded per the requested [`ResponseFormat`].
#[derive(Debug)]
pub enum ResponseValue {
    /// Raw body bytes.
    Raw(Vec<u8>),
    /// Parsed JSON body.
    Json(Value),
    /// Text body.
    Text(String),
    /// The response object itself, body unread.
    Response(Response),
}

impl ResponseValue {
    /// Extract the JSON value, failing for the other variants.
    pub fn into_json(self) -> Result<Value, HttpError> {
        match self {
            Self::Json(value) => Ok(value),
            other => Err(HttpError::Client(format!(
                "expected a JSON response, got {other:?}"
            ))),
        }
    }
}

/// Per-request options for [`HttpClient::request`].
#[derive(Debug, Default)]
pub struct RequestOptions {
    attempts: Option<usize>,
    expect: ResponseFormat,
    body: Option<Value>,
    files: Vec<File>,
    reason: Option<String>,
    headers: HeaderMap,
}

impl RequestOptions {
    /// Create options with the defaults: three attempts, JSON decoding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the attempt budget (minimum 1).
    pub fn attempts(mut self, attempts: usize) -> Self {
        self.attempts = Some(attempts.max(1));
        self
    }

    /// Select the response decoding format.
    pub fn expect(mut self, format: ResponseFormat) -> Self {
        self.expect = format;
        self
    }

    /// Attach a JSON body. With files present, object fields become
    /// multipart form fields instead.
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach a file; files are sent as multipart parts `file_0..file_N`.
    pub fn file(mut self, file: File) -> Self {
        self.files.push(file);
        self
    }

    /// Attach several files.
    pub fn files(mut self, files: impl IntoIterator<Item = File>) -> Self {
        self.files.extend(files);
        self
    }

    /// Audit-log reason, sent as the `X-Audit-Log-Reason` header.
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Extra request headers.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// Discord REST API client.
pub struct HttpClient {
    /// Inner pooled HTTP client carrying the standing headers.
    client: Client,
    /// Bot token.
    token: String,
    /// API base URL.
    base_url: String,
    /// Rate limiter.
    ratelimiter: Arc<Ratelimiter>,
}

impl HttpClient {
    /// Create a new HTTP client with the given bot token.
    pub fn new(token: impl Into<String>) -> Result<Self, HttpError> {
        let token = token.into();

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bot {}", token))?,
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(
            "x-ratelimit-precision",
            HeaderValue::from_static("millisecond"),
        );

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            token,
            base_url: crate::API_BASE.to_string(),
            ratelimiter: Arc::new(Ratelimiter::new()),
        })
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Get the bot token.
    pub fn token(&self) -> &str {
        &self.token
    }

    // =========================================================================
    // Gateway Endpoints
    // =========================================================================

    /// Get the gateway connection URL.
    pub async fn get_gateway(&self) -> Result<GetGateway, HttpError> {
        let value = self
            .request(Method::GET, Route::new("/gateway"), RequestOptions::new())
            .await?;
        Ok(serde_json::from_value(value.into_json()?)?)
    }

    /// Get gateway bot information: URL, recommended shard count, and the
    /// session start limit that governs identify concurrency.
    pub async fn get_gateway_bot(&self) -> Result<GetGatewayBot, HttpError> {
        let value = self
            .request(
                Method::GET,
                Route::new("/gateway/bot"),
                RequestOptions::new(),
            )
            .await?;
        Ok(serde_json::from_value(value.into_json()?)?)
    }

    // =========================================================================
    // Request Engine
    // =========================================================================

    /// Make a request, observing rate limits and retrying per the options.
    pub async fn request(
        &self,
        method: Method,
        route: Route,
        options: RequestOptions,
    ) -> Result<ResponseValue, HttpError> {
        let bucket = route.bucket();
        let url = format!("{}{}", self.base_url, route.resolved_path());
        let attempts = options.attempts.unwrap_or(DEFAULT_ATTEMPTS);

        let mut request_headers = options.headers.clone();
        if let Some(reason) = &options.reason {
            request_headers.insert("x-audit-log-reason", HeaderValue::from_str(reason)?);
        }

        let mut last_failure: Option<ErrorResponse> = None;
        // Whether this request currently holds the bucket. Retried attempts
        // (429/5xx) keep their hold instead of re-acquiring the lock they
        // already own.
        let mut held = false;

        for attempt in 0..attempts {
            if !held {
                self.ratelimiter.acquire(&bucket).await?;
                held = true;
            }

            let request = self
                .build_request(&method, &url, &request_headers, &options)
                .map_err(|e| {
                    self.ratelimiter.release(&bucket, Duration::ZERO);
                    e
                })?;

            debug!(method = %method, path = %route.resolved_path(), attempt, "Making request");

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    self.ratelimiter.release(&bucket, Duration::ZERO);
                    return Err(e.into());
                }
            };

            let status = response.status();
            let response_headers = response.headers().clone();

            let reset_after = header_f64(&response_headers, "x-ratelimit-reset-after").unwrap_or(0.0);
            // Default keeps unauthenticated (hence unlimited) endpoints from stalling.
            let remaining = header_u64(&response_headers, "x-ratelimit-remaining").unwrap_or(1);

            let mut sleep_for = Duration::ZERO;
            if status.as_u16() != 429 && remaining == 0 {
                sleep_for = Duration::from_secs_f64(reset_after.max(0.0));
            }

            if status.is_success() {
                self.ratelimiter.release(&bucket, sleep_for);
                return decode(response, options.expect).await;
            }

            if status.as_u16() == 429 {
                // A 429 that never passed through the platform edge carries no
                // Via header and cannot be waited out.
                if !response_headers.contains_key("via") {
                    self.ratelimiter.release(&bucket, Duration::ZERO);
                    let body = response.text().await.unwrap_or_default();
                    return Err(HttpError::TooManyRequests(
                        ErrorResponse::new(429, body).with_message("ratelimited by the edge proxy"),
                    ));
                }

                let body = match response.text().await {
                    Ok(body) => body,
                    Err(e) => {
                        self.ratelimiter.release(&bucket, Duration::ZERO);
                        return Err(e.into());
                    }
                };
                let data: Value = serde_json::from_str(&body).unwrap_or(Value::Null);

                let retry_after = data
                    .get("retry_after")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0);
                let is_global = data.get("global").and_then(|v| v.as_bool()).unwrap_or(false);

                if is_global {
                    self.ratelimiter
                        .lock_global(Duration::from_secs_f64(retry_after.max(0.0)));
                }

                warn!(
                    bucket = %bucket,
                    retry_after,
                    global = is_global,
                    "Rate limited"
                );

                sleep_for = Duration::from_secs_f64(retry_after.max(0.0));
                last_failure = Some(ErrorResponse::new(429, body));
                // The bucket stays held across the retry.
            } else if status.is_server_error() {
                sleep_for = Duration::from_secs(1 + attempt as u64 * 2);
                let body = response.text().await.unwrap_or_default();
                last_failure = Some(ErrorResponse::new(status.as_u16(), body));

                warn!(
                    status = status.as_u16(),
                    attempt,
                    backoff_s = sleep_for.as_secs(),
                    "Server error, will retry"
                );
            } else {
                self.ratelimiter.release(&bucket, Duration::ZERO);
                let body = response.text().await.unwrap_or_default();
                return Err(HttpError::from_response(ErrorResponse::new(
                    status.as_u16(),
                    body,
                )));
            }

            if attempt == attempts - 1 {
                self.ratelimiter.release(&bucket, sleep_for);
                break;
            }

            sleep(sleep_for).await;
        }

        match last_failure {
            Some(failure) => Err(HttpError::from_response(failure)),
            None => Err(HttpError::Client("request made no attempts".to_string())),
        }
    }

    /// Build one attempt's request. Multipart forms are rebuilt from the
    /// owned file contents, so a retry re-reads every file from the start.
    fn build_request(
        &self,
        method: &Method,
        url: &str,
        headers: &HeaderMap,
        options: &RequestOptions,
    ) -> Result<reqwest::RequestBuilder, HttpError> {
        let mut request = self
            .client
            .request(method.clone(), url)
            .headers(headers.clone());

        if options.files.is_empty() {
            if let Some(body) = &options.body {
                request = request.json(body);
            }
            return Ok(request);
        }

        let mut form = Form::new();
        for (index, file) in options.files.iter().enumerate() {
            let part = Part::bytes(file.contents().to_vec()).file_name(file.filename.clone());
            form = form.part(format!("file_{index}"), part);
        }

        if let Some(body) = &options.body {
            let Value::Object(fields) = body else {
                return Err(HttpError::Client(
                    "multipart request body must be a JSON object".to_string(),
                ));
            };
            for (key, value) in fields {
                let text = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                form = form.text(key.clone(), text);
            }
        }

        Ok(request.multipart(form))
    }
}

/// Decode a successful response per the requested format.
async fn decode(response: Response, expect: ResponseFormat) -> Result<ResponseValue, HttpError> {
    match expect {
        ResponseFormat::Raw => Ok(ResponseValue::Raw(response.bytes().await?.to_vec())),
        ResponseFormat::Json => {
            let bytes = response.bytes().await?;
            if bytes.is_empty() {
                Ok(ResponseValue::Json(Value::Null))
            } else {
                Ok(ResponseValue::Json(serde_json::from_slice(&bytes)?))
            }
        }
        ResponseFormat::Text => Ok(ResponseValue::Text(response.text().await?)),
        ResponseFormat::Auto => {
            let text = response.text().await?;
            match serde_json::from_str(&text) {
                Ok(value) => Ok(ResponseValue::Json(value)),
                Err(_) => Ok(ResponseValue::Text(text)),
            }
        }
        ResponseFormat::Response => Ok(ResponseValue::Response(response)),
    }
}

fn header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = HttpClient::new("test_token");
        assert!(client.is_ok());
    }

    #[test]
    fn test_response_format_default() {
        assert_eq!(ResponseFormat::default(), ResponseFormat::Json);
    }

    #[test]
    fn test_options_attempts_floor() {
        let options = RequestOptions::new().attempts(0);
        assert_eq!(options.attempts, Some(1));
    }
}
