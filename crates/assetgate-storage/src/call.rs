//! Plumbing shared by server-side provider calls: deadlines, status mapping
//! and URL expiry arithmetic.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};

use assetgate_core::{HttpMethod, ProviderName};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderName, HeaderValue};

use crate::traits::{StorageError, StorageResult};

pub(crate) fn expiry_from(now: DateTime<Utc>, expires_in: Duration) -> DateTime<Utc> {
    now + chrono::Duration::seconds(expires_in.as_secs() as i64)
}

pub(crate) fn reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

/// Reject header names or values a client could not send verbatim.
pub(crate) fn check_headers(headers: &BTreeMap<String, String>) -> StorageResult<()> {
    for (name, value) in headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            return Err(StorageError::invalid_request(
                "headers",
                format!("invalid header name '{}'", name),
            ));
        }
        if HeaderValue::from_str(value).is_err() {
            return Err(StorageError::invalid_request(
                "headers",
                format!("invalid value for header '{}'", name),
            ));
        }
    }
    Ok(())
}

/// Run one provider call under `timeout`, logging how it ended.
pub(crate) async fn bounded<T, F>(
    provider: ProviderName,
    operation: &str,
    key: &str,
    timeout: Duration,
    call: F,
) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    let start = Instant::now();
    let result = match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                provider = %provider,
                operation = operation,
                key = %key,
                timeout_ms = timeout.as_millis() as u64,
                "Provider call timed out"
            );
            return Err(StorageError::Timeout {
                provider,
                operation: operation.to_string(),
            });
        }
    };

    match &result {
        Ok(_) => tracing::debug!(
            provider = %provider,
            operation = operation,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Provider call completed"
        ),
        Err(StorageError::NotFound(_)) => tracing::debug!(
            provider = %provider,
            operation = operation,
            key = %key,
            "Object not found"
        ),
        Err(e) => tracing::error!(
            error = %e,
            provider = %provider,
            operation = operation,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Provider call failed"
        ),
    }
    result
}

/// Error for a non-success HTTP status; 404 becomes `NotFound(key)`.
pub(crate) fn status_error(
    provider: ProviderName,
    operation: &str,
    key: &str,
    status: u16,
    detail: &str,
) -> StorageError {
    if status == 404 {
        return StorageError::NotFound(key.to_string());
    }
    let detail = detail.trim();
    let message = if detail.is_empty() {
        format!("{} returned {}", operation, status)
    } else {
        format!("{} returned {} ({})", operation, status, detail)
    };
    StorageError::provider_status(provider, status, message)
}

/// Send a request, mapping transport failures and non-success statuses.
pub(crate) async fn send_checked(
    provider: ProviderName,
    operation: &str,
    key: &str,
    request: reqwest::RequestBuilder,
) -> StorageResult<reqwest::Response> {
    let response = request
        .send()
        .await
        .map_err(|e| StorageError::provider_call(provider, format!("{} failed: {}", operation, e)))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail: String = body.chars().take(256).collect();
    Err(status_error(provider, operation, key, status.as_u16(), &detail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_keeps_the_key() {
        let err = status_error(ProviderName::Gcs, "get_object", "a/b.png", 404, "");
        assert!(matches!(err, StorageError::NotFound(ref key) if key == "a/b.png"));
    }

    #[test]
    fn other_statuses_carry_the_code() {
        let err = status_error(ProviderName::Cdn, "delete_object", "a.png", 401, "bad key");
        assert!(matches!(
            err,
            StorageError::ProviderCall {
                status: Some(401),
                ref message,
                ..
            } if message == "delete_object returned 401 (bad key)"
        ));
        assert!(!err.is_retryable());
        assert!(status_error(ProviderName::Cdn, "delete_object", "a.png", 502, "").is_retryable());
    }

    #[test]
    fn rejects_header_injection() {
        let ok = BTreeMap::from([("content-type".to_string(), "image/png".to_string())]);
        assert!(check_headers(&ok).is_ok());

        let bad_value = BTreeMap::from([("x-amz-meta-a".to_string(), "a\r\nb".to_string())]);
        assert!(check_headers(&bad_value).is_err());

        let bad_name = BTreeMap::from([("bad header".to_string(), "v".to_string())]);
        assert!(check_headers(&bad_name).is_err());
    }

    #[tokio::test]
    async fn deadline_becomes_timeout() {
        let result: StorageResult<()> = bounded(
            ProviderName::R2,
            "head_object",
            "a.png",
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;
        assert!(matches!(
            result,
            Err(StorageError::Timeout {
                provider: ProviderName::R2,
                ..
            })
        ));
    }
}
