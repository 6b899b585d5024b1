// src/sources/http.rs
// Shared reqwest plumbing for the platform clients.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::error::{Result, ScanError};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn client(user_agent: &str) -> anyhow::Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| anyhow::anyhow!("building http client: {e}"))
}

/// `Retry-After` in seconds (HTTP-date form is ignored).
pub fn retry_after(resp: &Response) -> Option<Duration> {
    resp.headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Successful response body, or the status mapped onto [`ScanError`].
///
/// `refine` sees `(status, body)` first and may return a platform-specific
/// error; `None` falls back to the generic status mapping.
pub async fn read_body<F>(resp: Response, refine: F) -> Result<String>
where
    F: FnOnce(u16, &str) -> Option<ScanError>,
{
    let status = resp.status();
    let hint = retry_after(&resp);
    let body = resp.text().await?;
    if status.is_success() {
        return Ok(body);
    }
    let code = status.as_u16();
    Err(refine(code, &body).unwrap_or_else(|| ScanError::from_status(code, &body, hint)))
}

pub async fn read_json<T, F>(resp: Response, refine: F) -> Result<T>
where
    T: DeserializeOwned,
    F: FnOnce(u16, &str) -> Option<ScanError>,
{
    let body = read_body(resp, refine).await?;
    Ok(serde_json::from_str(&body)?)
}

/// No platform-specific refinement.
pub fn plain(_status: u16, _body: &str) -> Option<ScanError> {
    None
}

/// RFC 3339 timestamp, or the `+0000` offset form some Graph APIs return.
pub fn parse_timestamp(s: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    use chrono::{DateTime, Utc};
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z"))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ScanError::MalformedUpstreamResponse(format!("bad timestamp `{s}`: {e}")))
}

/// Build a URL with query parameters; `None` values are left out.
pub fn url_with(base: &str, params: &[(&str, Option<&str>)]) -> Result<reqwest::Url> {
    let present = params
        .iter()
        .filter_map(|(k, v)| v.map(|v| (*k, v)));
    reqwest::Url::parse_with_params(base, present)
        .map_err(|e| ScanError::Fatal(format!("bad url `{base}`: {e}")))
}
