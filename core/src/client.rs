//! Stateless request builder and response parser for the Movebank service.
//!
//! # Design
//! `MovebankClient` holds only its configuration and a `Transport`. Each call
//! is split into `build_request` (produces an `HttpRequest`), the transport
//! round-trip, and `parse_response` (consumes an `HttpResponse`). The build and
//! parse halves never touch the network, so they can be tested against plain
//! data.
//!
//! The one multi-request exchange is license acceptance: a study with license
//! terms answers its first request with the terms text, and the client repeats
//! the request with the MD5 of that text and the session cookie it was given.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use md5::{Digest, Md5};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::params::RequestParams;
use crate::response::{Format, RawResponse, Row};
use crate::transport::{Transport, UreqTransport};

/// Body prefix the service uses when a study's license must be accepted.
pub const LICENSE_MARKER: &str = "License Terms:";

/// Query parameter carrying the hash of accepted license terms.
pub const LICENSE_MD5_PARAM: &str = "license-md5";

const CSV_PATH: &str = "direct-read";
const JSON_PATH: &str = "json-auth";

/// Client for the Movebank tabular-data API.
#[derive(Debug, Clone)]
pub struct MovebankClient<T = UreqTransport> {
    config: ClientConfig,
    transport: T,
}

impl MovebankClient<UreqTransport> {
    /// A client that talks HTTP(S) through ureq.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let transport = UreqTransport::new(config.timeout);
        Self::with_transport(config, transport)
    }

    pub fn from_env() -> Result<Self, ApiError> {
        Self::new(ClientConfig::from_env()?)
    }
}

impl<T: Transport> MovebankClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Result<Self, ApiError> {
        config.validate()?;
        Ok(Self { config, transport })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The service URL that answers in `format`.
    pub fn endpoint(&self, format: Format) -> String {
        let path = match format {
            Format::Csv => CSV_PATH,
            Format::Json => JSON_PATH,
        };
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    pub fn build_request(&self, params: &RequestParams, format: Format) -> HttpRequest {
        self.build_request_with_cookies(params, format, &[])
    }

    fn build_request_with_cookies(
        &self,
        params: &RequestParams,
        format: Format,
        cookies: &[String],
    ) -> HttpRequest {
        let accept = match format {
            Format::Csv => "text/csv",
            Format::Json => "application/json",
        };
        let mut headers = vec![("accept".to_string(), accept.to_string())];
        if let Some(creds) = &self.config.credentials {
            let token = BASE64.encode(format!("{}:{}", creds.username, creds.password));
            headers.push(("authorization".to_string(), format!("Basic {token}")));
        }
        if !cookies.is_empty() {
            headers.push(("cookie".to_string(), cookies.join("; ")));
        }

        HttpRequest {
            method: HttpMethod::Get,
            url: format!("{}?{}", self.endpoint(format), params.to_query_string()),
            headers,
            body: None,
        }
    }

    /// Check the status and settle the body's format.
    ///
    /// A recognisable `Content-Type` wins over `expected`; anything generic
    /// (the service often says `text/plain`) falls back to `expected`.
    pub fn parse_response(&self, response: HttpResponse, expected: Format) -> Result<RawResponse, ApiError> {
        if !response.is_success() {
            return Err(ApiError::Remote {
                status: response.status,
                body: response.body,
            });
        }
        let content_type = response.header("content-type").map(str::to_string);
        let format = content_type
            .as_deref()
            .and_then(Format::from_content_type)
            .unwrap_or(expected);
        Ok(RawResponse {
            status: response.status,
            format,
            content_type,
            body: response.body,
        })
    }

    /// One request/response exchange, accepting license terms if the service
    /// asks for them and `accept_license` is set.
    pub fn request(&self, params: &RequestParams, format: Format) -> Result<RawResponse, ApiError> {
        debug!(entity_type = %params.entity_type(), ?format, "movebank request");
        let request = self.build_request(params, format);
        let response = self.transport.execute(&request)?;

        if !(self.config.accept_license && response.status == 200 && is_license_terms(&response.body)) {
            return self.parse_response(response, format);
        }

        let hash = license_md5(&response.body);
        info!(entity_type = %params.entity_type(), md5 = %hash, "accepting study license terms");
        let accepted = params.clone().with(LICENSE_MD5_PARAM, hash);
        let retry = self.build_request_with_cookies(&accepted, format, &response.cookies());
        let response = self.transport.execute(&retry)?;
        self.parse_response(response, format)
    }

    /// Request CSV and decode every row.
    pub fn fetch_csv(&self, params: &RequestParams) -> Result<Vec<Row>, ApiError> {
        self.request(params, Format::Csv)?.collect_rows()
    }

    /// Request JSON and decode it into a value tree.
    pub fn fetch_json(&self, params: &RequestParams) -> Result<serde_json::Value, ApiError> {
        self.request(params, Format::Json)?.json()
    }
}

pub fn is_license_terms(body: &str) -> bool {
    body.contains(LICENSE_MARKER)
}

/// Lowercase hex MD5 of the license text, as the service expects it echoed.
pub fn license_md5(body: &str) -> String {
    hex::encode(Md5::digest(body.as_bytes()))
}
