use crate::error::ClientError;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Builds the HTTP client used by one adapter. The timeout bounds the whole request.
pub(crate) fn client(timeout: Duration) -> Result<reqwest::Client, ClientError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status { status, body })
}

pub(crate) async fn json_body<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let text = ensure_success(response).await?.text().await?;
    serde_json::from_str(&text).map_err(|e| ClientError::Malformed(e.to_string()))
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}
