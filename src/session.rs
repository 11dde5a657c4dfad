//! Cookie-carrying session client.
//!
//! A [`SessionClient`] owns one [`CookieJar`]. Every request it sends carries
//! the jar's cookies, and every response it receives feeds its `Set-Cookie`
//! headers back into the jar, so logging in once authenticates all later
//! calls made through the same client.

use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ClientSettings, LOGIN_PATH};
use crate::cookie::{CookieError, CookieJar};
use crate::transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport, TransportError};

/// Errors surfaced by [`SessionClient::request`].
///
/// HTTP error statuses are never errors; they come back as an [`Envelope`]
/// with `success: false`.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Strict-mode jar rejected a `Set-Cookie` header
    #[error(transparent)]
    Cookie(#[from] CookieError),

    /// A header name or value cannot be sent; the request was never made
    #[error("Invalid header `{name}`: {message}")]
    InvalidHeader { name: String, message: String },
}

/// Uniform response wrapper returned for every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: u16,
    pub data: Value,
    pub success: bool,
}

impl Envelope {
    pub fn new(status: u16, data: Value) -> Self {
        Self {
            status,
            data,
            success: (200..300).contains(&status),
        }
    }

    /// The envelope as a JSON value, the root for placeholder paths
    pub fn to_value(&self) -> Value {
        json!({
            "status": self.status,
            "success": self.success,
            "data": self.data,
        })
    }

    /// Best-effort error message from a backend `{error: {message}}` body
    pub fn error_message(&self) -> Option<String> {
        match self.data.get("error")? {
            Value::String(msg) => Some(msg.clone()),
            Value::Object(obj) => obj
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
    }
}

/// Per-request options
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    /// JSON body. A string value is sent verbatim.
    pub body: Option<Value>,
    /// Extra headers; these win over defaults and the jar's `Cookie` header
    pub headers: Vec<(String, String)>,
    /// `None` decides by `Content-Type`, `Some(true)` always parses JSON,
    /// `Some(false)` always returns text
    pub expect_json: Option<bool>,
    /// Overrides the client timeout for this request
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn expect_json(mut self, expect: bool) -> Self {
        self.expect_json = Some(expect);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Login payload for `POST /auth/login`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// HTTP client that carries a session across requests
pub struct SessionClient {
    base_url: String,
    default_headers: Vec<(String, String)>,
    timeout: Duration,
    jar: CookieJar,
    transport: Box<dyn Transport>,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("base_url", &self.base_url)
            .field("default_headers", &self.default_headers)
            .field("timeout", &self.timeout)
            .field("jar", &self.jar)
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    /// Create a client using the reqwest transport. When the settings name a
    /// cookie file, the jar starts with its contents.
    pub fn new(settings: &ClientSettings) -> Result<Self, ClientError> {
        let mut client = Self::with_transport(settings, ReqwestTransport::new()?);
        if let Some(path) = &settings.cookie_file {
            client.jar.load_file(path)?;
        }
        Ok(client)
    }

    /// Create a client over any [`Transport`]; the cookie file is not read
    pub fn with_transport(settings: &ClientSettings, transport: impl Transport + 'static) -> Self {
        let jar = if settings.strict_cookies {
            CookieJar::strict()
        } else {
            CookieJar::new()
        };

        Self {
            base_url: settings.base_url.clone(),
            default_headers: settings.default_headers.clone(),
            timeout: settings.timeout,
            jar,
            transport: Box::new(transport),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn jar(&self) -> &CookieJar {
        &self.jar
    }

    pub fn jar_mut(&mut self) -> &mut CookieJar {
        &mut self.jar
    }

    /// Send a request and wrap the response in an [`Envelope`]
    pub async fn request(&mut self, path: &str, options: RequestOptions) -> Result<Envelope, ClientError> {
        let url = join_url(&self.base_url, path);

        let body = match options.body {
            Some(Value::String(raw)) => Some(raw),
            Some(value) => Some(value.to_string()),
            None => None,
        };

        let mut headers = Vec::new();
        for (name, value) in &self.default_headers {
            set_header(&mut headers, name, value);
        }
        if body.is_some() {
            set_header(&mut headers, "Content-Type", "application/json");
        }
        if !self.jar.is_empty() {
            set_header(&mut headers, "Cookie", &self.jar.to_header());
        }
        for (name, value) in &options.headers {
            set_header(&mut headers, name, value);
        }
        for (name, value) in &headers {
            validate_header(name, value)?;
        }

        debug!(method = %options.method, url = %url, cookies = self.jar.len(), "sending request");

        let response = self
            .transport
            .send(HttpRequest {
                method: options.method,
                url: url.clone(),
                headers,
                body,
                timeout: options.timeout.unwrap_or(self.timeout),
            })
            .await?;

        let set_cookies: Vec<&str> = response.header_all("set-cookie").collect();
        if !set_cookies.is_empty() {
            debug!(count = set_cookies.len(), "received Set-Cookie headers");
            self.jar.ingest(&set_cookies)?;
        }

        let envelope = Envelope::new(response.status, read_body(&response, options.expect_json));
        if envelope.success {
            debug!(status = envelope.status, url = %url, "request succeeded");
        } else {
            let message = envelope.error_message().unwrap_or_default();
            warn!(
                status = envelope.status,
                url = %url,
                error = %message,
                "request returned non-success status"
            );
        }

        Ok(envelope)
    }

    /// Log in with `POST /auth/login`; the session cookie lands in the jar
    pub async fn login(&mut self, credentials: &Credentials) -> Result<Envelope, ClientError> {
        let body = serde_json::to_value(credentials).map_err(|e| TransportError::Request {
            url: join_url(&self.base_url, LOGIN_PATH),
            message: e.to_string(),
        })?;
        self.request(LOGIN_PATH, RequestOptions::new(Method::Post).body(body))
            .await
    }

    pub async fn get(&mut self, path: &str) -> Result<Envelope, ClientError> {
        self.request(path, RequestOptions::new(Method::Get)).await
    }

    pub async fn post(&mut self, path: &str, body: Value) -> Result<Envelope, ClientError> {
        self.request(path, RequestOptions::new(Method::Post).body(body))
            .await
    }

    pub async fn put(&mut self, path: &str, body: Value) -> Result<Envelope, ClientError> {
        self.request(path, RequestOptions::new(Method::Put).body(body))
            .await
    }

    pub async fn delete(&mut self, path: &str) -> Result<Envelope, ClientError> {
        self.request(path, RequestOptions::new(Method::Delete)).await
    }
}

/// Join a base URL and a path; absolute `http(s)://` paths are kept as-is
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Insert or replace a header, matching names case-insensitively
fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    match headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
        Some(entry) => *entry = (name.to_string(), value.to_string()),
        None => headers.push((name.to_string(), value.to_string())),
    }
}

/// Reject names and values the HTTP stack would refuse to encode
fn validate_header(name: &str, value: &str) -> Result<(), ClientError> {
    let invalid = |message: String| ClientError::InvalidHeader {
        name: name.to_string(),
        message,
    };
    HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
    HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
    Ok(())
}

fn is_json_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || mime.ends_with("+json")
}

/// Decode a body as JSON or wrap it as `{"text": ...}`
fn read_body(response: &HttpResponse, expect_json: Option<bool>) -> Value {
    let want_json = expect_json.unwrap_or_else(|| {
        response
            .header("content-type")
            .map(is_json_content_type)
            .unwrap_or(false)
    });

    if want_json {
        if response.body.trim().is_empty() {
            return Value::Null;
        }
        match serde_json::from_str(&response.body) {
            Ok(value) => return value,
            Err(err) => debug!(error = %err, "body is not valid JSON, returning text"),
        }
    }

    json!({ "text": response.body })
}
