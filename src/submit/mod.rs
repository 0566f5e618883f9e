//! Collector client: result submission and related endpoints.
//!
//! The client is a single-attempt transport primitive. It classifies every
//! HTTP/network condition into a [`SubmitOutcome`] and never retries; retry
//! policy belongs to the caller. Credentials are per-call values, so one
//! client is safely reusable across jobs.

use crate::core::error::{Error, Result};
use crate::core::types::ScanVariant;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Classified outcome of one submission attempt.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// 200/201 with a parseable JSON body
    Success(Value),
    /// 401: the token was rejected; re-authentication required
    AuthExpired,
    /// Any other non-2xx response, with the server's error message
    Rejected(String),
    /// Connection refused or host unreachable
    Unreachable,
    /// The request timed out
    TimedOut,
}

impl SubmitOutcome {
    /// Whether a retry could plausibly succeed without caller intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmitOutcome::Unreachable | SubmitOutcome::TimedOut)
    }
}

impl std::fmt::Display for SubmitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitOutcome::Success(_) => write!(f, "accepted by collector"),
            SubmitOutcome::AuthExpired => write!(f, "authentication expired"),
            SubmitOutcome::Rejected(reason) => write!(f, "rejected: {}", reason),
            SubmitOutcome::Unreachable => write!(f, "collector unreachable"),
            SubmitOutcome::TimedOut => write!(f, "request timed out"),
        }
    }
}

/// A previously uploaded scan as returned by the collector.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedScan {
    pub id: i64,
    pub scan_type: String,
    pub scan_result: Value,
    pub upload_at: String,
}

#[derive(Debug, Deserialize)]
struct ResultsResponse {
    #[serde(default)]
    results: Vec<UploadedScan>,
}

/// HTTP client for the collector service.
pub struct CollectorClient {
    http: reqwest::Client,
    base_url: String,
}

impl CollectorClient {
    /// Create a client for the given collector base URL.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// The collector base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe collector reachability via `GET /test-connection`.
    pub async fn test_connection(&self) -> Result<bool> {
        let url = format!("{}/test-connection", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Network(format!("connection test failed: {}", e)))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("connection test returned invalid JSON: {}", e)))?;

        Ok(body
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    /// Authenticate via `POST /auth/login` and return the access token.
    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        let url = format!("{}/auth/login", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({"email": email, "password": password}))
            .send()
            .await
            .map_err(|e| Error::Network(format!("login request failed: {}", e)))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("login returned invalid JSON: {}", e)))?;

        if status.is_success() {
            body.get("access_token")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::Network("login response missing access_token".to_string()))
        } else {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("Authentication failed");
            Err(Error::Network(message.to_string()))
        }
    }

    /// Submit a completed scan result via `POST /scan/upload`.
    ///
    /// One attempt; the outcome classifies what happened. The serialized
    /// report is owned by the caller and survives any outcome.
    pub async fn submit(
        &self,
        result: &Value,
        variant: ScanVariant,
        token: &str,
    ) -> Result<SubmitOutcome> {
        let url = format!("{}/scan/upload", self.base_url);
        let body = json!({
            "scan_type": variant.as_str(),
            "scan_result": result,
        });

        log::debug!("Uploading {} result to {}", variant.as_str(), url);

        let response = self
            .http
            .post(&url)
            .header("Authorization", bearer_header(token))
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => return Ok(classify_transport_error(&e)),
        };

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("failed to read collector response: {}", e)))?;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(SubmitOutcome::AuthExpired);
        }

        let parsed: std::result::Result<Value, _> = serde_json::from_str(&raw);

        if status.is_success() {
            match parsed {
                Ok(body) => Ok(SubmitOutcome::Success(body)),
                Err(_) => Ok(SubmitOutcome::Rejected(format!(
                    "non-JSON response: {}",
                    raw
                ))),
            }
        } else {
            match parsed {
                Ok(body) => {
                    let message = body
                        .get("error")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("HTTP error: {}", status.as_u16()));
                    Ok(SubmitOutcome::Rejected(message))
                }
                Err(_) => Ok(SubmitOutcome::Rejected(format!(
                    "non-JSON response: {}",
                    raw
                ))),
            }
        }
    }

    /// Fetch previously uploaded results via `GET /scan/result`.
    ///
    /// The collector answers 404 when the caller has no uploads; that maps
    /// to an empty list, not an error.
    pub async fn fetch_results(&self, token: &str) -> Result<Vec<UploadedScan>> {
        let url = format!("{}/scan/result", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("Authorization", bearer_header(token))
            .send()
            .await
            .map_err(|e| Error::Network(format!("fetching results failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(Error::Network(format!(
                "collector returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: ResultsResponse = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("invalid results response: {}", e)))?;
        Ok(body.results)
    }
}

/// Build the Authorization header value.
///
/// The token is normalized first, so a caller passing either a bare token
/// or a full `Bearer ...` value gets exactly one prefix.
fn bearer_header(token: &str) -> String {
    let token = token.trim();
    let token = token.strip_prefix("Bearer ").unwrap_or(token);
    format!("Bearer {}", token)
}

/// Map a reqwest transport error to its outcome class.
fn classify_transport_error(error: &reqwest::Error) -> SubmitOutcome {
    if error.is_timeout() {
        SubmitOutcome::TimedOut
    } else if error.is_connect() {
        SubmitOutcome::Unreachable
    } else {
        SubmitOutcome::Rejected(format!("request failed: {}", error))
    }
}
