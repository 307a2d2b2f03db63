//! Generic request executor for the SnapWeather REST API.
//!
//! `HttpClient` knows nothing about individual endpoints: it builds the URL,
//! attaches the bearer token, encodes the body and hands back the status code
//! and body bytes. Expected HTTP error statuses are returned as data, never as
//! `Err`; only transport failures and malformed payloads are errors.

use std::fmt;

use anyhow::{Context, Result};
use reqwest::{header, Client, Method, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::auth::{SessionCell, Token};
use crate::config::Config;

use super::ApiError;

/// The `{ success, datas }` wrapper around every non-binary response.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub datas: Option<T>,
}

enum RequestBody {
    Empty,
    Json(Vec<u8>),
    Raw { bytes: Vec<u8>, content_type: String },
}

/// Per-request options: authentication and body.
pub struct RequestOptions {
    authenticated: bool,
    body: RequestBody,
}

impl RequestOptions {
    /// A request sent without credentials
    pub fn public() -> Self {
        Self {
            authenticated: false,
            body: RequestBody::Empty,
        }
    }

    /// A request carrying the session's bearer token, if there is one
    pub fn authenticated() -> Self {
        Self {
            authenticated: true,
            body: RequestBody::Empty,
        }
    }

    /// Serialize `body` as the JSON payload
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to encode JSON body: {}", e)))?;
        self.body = RequestBody::Json(bytes);
        Ok(self)
    }

    /// Send `bytes` unmodified with the given content type
    pub fn raw(mut self, bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        self.body = RequestBody::Raw {
            bytes,
            content_type: content_type.into(),
        };
        self
    }
}

/// Status code and body of a completed round trip.
pub struct HttpResponse {
    status: StatusCode,
    body: Vec<u8>,
    bearer: Option<Token>,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: Vec<u8>) -> Self {
        Self {
            status,
            body,
            bearer: None,
        }
    }

    /// The token this request was sent with, if any
    pub fn bearer(&self) -> Option<&Token> {
        self.bearer.as_ref()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.body
    }

    /// Parse the body as a JSON envelope
    pub fn envelope<T: DeserializeOwned>(&self) -> Result<Envelope<T>, ApiError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            error!(
                status = self.status_code(),
                error = %e,
                body = %ApiError::truncate_body(&self.body),
                "Failed to parse response envelope"
            );
            ApiError::MalformedResponse(format!("Invalid JSON envelope: {}", e))
        })
    }

    /// Parse the envelope and return its payload.
    ///
    /// A 2xx answer must say `success: true` and carry `datas`.
    pub fn datas<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let envelope: Envelope<T> = self.envelope()?;
        if !envelope.success {
            error!(status = self.status_code(), "Envelope reports success: false");
            return Err(ApiError::MalformedResponse(
                "Server reported success: false".to_string(),
            ));
        }
        envelope.datas.ok_or_else(|| {
            error!(status = self.status_code(), "Envelope has no datas");
            ApiError::MalformedResponse("Missing 'datas' in response".to_string())
        })
    }
}

/// HTTP client bound to one API origin and one session.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
    session: SessionCell,
}

impl HttpClient {
    pub fn new(config: &Config, session: SessionCell) -> Result<Self> {
        let base_url = config.base_url()?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            session,
        })
    }

    pub(crate) fn session(&self) -> &SessionCell {
        &self.session
    }

    /// Base URL plus `path`, each `/`-separated segment percent-encoded
    fn url(&self, path: &str) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ApiError::InvalidRequest(format!("Base URL '{}' cannot take a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(path.split('/').filter(|segment| !segment.is_empty()));
        Ok(url)
    }

    /// Execute one request and wait for the full response body.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<HttpResponse, ApiError> {
        let url = self.url(path)?;
        let mut request = self.client.request(method.clone(), url);

        // Read once: a concurrent login or logout affects the next request, not this one
        let bearer = if options.authenticated {
            self.session.token().await
        } else {
            None
        };
        match &bearer {
            Some(token) => request = request.bearer_auth(token.as_str()),
            None if options.authenticated => {
                debug!(%method, path, "No token available, sending without Authorization")
            }
            None => {}
        }

        request = match options.body {
            RequestBody::Empty => request,
            RequestBody::Json(bytes) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(bytes),
            RequestBody::Raw {
                bytes,
                content_type,
            } => request.header(header::CONTENT_TYPE, content_type).body(bytes),
        };

        let response = request.send().await.map_err(|e| {
            warn!(%method, path, error = %e, timeout = e.is_timeout(), "Request failed");
            ApiError::Network(e)
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            warn!(%method, path, error = %e, "Failed to read response body");
            ApiError::Network(e)
        })?;

        debug!(%method, path, status = status.as_u16(), bytes = body.len(), "Response received");

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
            bearer,
        })
    }
}
