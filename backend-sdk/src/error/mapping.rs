//! Error mapping for backend APIs
//!
//! Converts non-success HTTP responses from GitHub, Elasticsearch and
//! ServiceNow into the normalized `ServiceError` taxonomy. The backend is
//! selected by `context.service`.

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::Value;

use super::{ErrorContext, ServiceError};
use crate::util::{sanitize_for_logging, truncate_string};

/// Longest backend message carried into an error
const MAX_MESSAGE_LEN: usize = 200;

/// Map a GitHub error response to a ServiceError
pub fn map_github_error(
    status: StatusCode,
    headers: &HeaderMap,
    json: &Value,
    context: &mut ErrorContext,
) -> ServiceError {
    context.service = "github".to_string();

    if let Some(url) = json.get("documentation_url").and_then(|u| u.as_str()) {
        context.add("documentation_url", url);
    }

    let message = json
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("Unknown GitHub error");

    // GitHub reports primary rate limiting as 403 with an exhausted quota
    let quota_exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false);

    if status == StatusCode::FORBIDDEN && quota_exhausted {
        if let Some(reset) = headers.get("x-ratelimit-reset").and_then(|v| v.to_str().ok()) {
            context.add("rate_limit_reset", reset);
        }
        return ServiceError::rate_limited(clean(message));
    }

    map_status(status, clean(message))
}

/// Map an Elasticsearch error response to a ServiceError
pub fn map_elasticsearch_error(
    status: StatusCode,
    json: &Value,
    context: &mut ErrorContext,
) -> ServiceError {
    context.service = "elasticsearch".to_string();

    let error = json.get("error");
    let error_type = error
        .and_then(|e| e.get("type"))
        .and_then(|t| t.as_str())
        .or_else(|| {
            error
                .and_then(|e| e.get("root_cause"))
                .and_then(|r| r.get(0))
                .and_then(|r| r.get("type"))
                .and_then(|t| t.as_str())
        });
    let reason = error
        .and_then(|e| e.get("reason"))
        .and_then(|r| r.as_str())
        .or_else(|| error.and_then(|e| e.as_str()))
        .unwrap_or("Unknown Elasticsearch error");

    if let Some(error_type) = error_type {
        context.error_code = Some(error_type.to_string());
    }

    let message = match error_type {
        Some(error_type) => format!("{}: {}", error_type, reason),
        None => reason.to_string(),
    };

    // Query syntax problems surface as 400 parsing/query exceptions
    if matches!(
        error_type,
        Some("parsing_exception") | Some("query_shard_exception") | Some("search_phase_execution_exception")
    ) && status.is_client_error()
    {
        return ServiceError::validation(clean(&message));
    }

    map_status(status, clean(&message))
}

/// Map a ServiceNow error response to a ServiceError
pub fn map_servicenow_error(
    status: StatusCode,
    json: &Value,
    context: &mut ErrorContext,
) -> ServiceError {
    context.service = "servicenow".to_string();

    let error = json.get("error");
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or("Unknown ServiceNow error");

    if let Some(detail) = error.and_then(|e| e.get("detail")).and_then(|d| d.as_str()) {
        context.add("detail", clean(detail));
    }

    map_status(status, clean(message))
}

/// Map a generic HTTP error to a ServiceError
pub fn map_http_error(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    context: &mut ErrorContext,
) -> ServiceError {
    context.status_code = Some(status.as_u16());

    if let Ok(json) = serde_json::from_str::<Value>(body) {
        match context.service.as_str() {
            "github" => return map_github_error(status, headers, &json, context),
            "elasticsearch" => return map_elasticsearch_error(status, &json, context),
            "servicenow" => return map_servicenow_error(status, &json, context),
            _ => {
                let message = json
                    .get("message")
                    .or_else(|| json.get("error"))
                    .and_then(|m| m.as_str())
                    .unwrap_or(body);
                return map_status(status, clean(message));
            }
        }
    }

    let message = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, clean(body))
    };

    map_status(status, message)
}

/// Status-only classification shared by every backend
pub fn map_status(status: StatusCode, message: String) -> ServiceError {
    match status.as_u16() {
        400 | 422 => ServiceError::validation(message),
        401 => ServiceError::authentication(message),
        403 => ServiceError::permission(message),
        404 => ServiceError::not_found(message),
        408 => ServiceError::transient_network(message),
        429 => ServiceError::rate_limited(message),
        500..=599 => ServiceError::transient_network(message),
        _ => ServiceError::unknown(message),
    }
}

fn clean(message: &str) -> String {
    truncate_string(&sanitize_for_logging(message), MAX_MESSAGE_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use reqwest::header::HeaderValue;

    fn context(service: &str) -> ErrorContext {
        ErrorContext::for_service(service)
    }

    #[test]
    fn test_status_table() {
        let cases = [
            (400, ErrorKind::ValidationError),
            (401, ErrorKind::AuthError),
            (403, ErrorKind::PermissionError),
            (404, ErrorKind::NotFoundError),
            (408, ErrorKind::TransientNetwork),
            (422, ErrorKind::ValidationError),
            (429, ErrorKind::RateLimited),
            (500, ErrorKind::TransientNetwork),
            (503, ErrorKind::TransientNetwork),
            (504, ErrorKind::TransientNetwork),
            (418, ErrorKind::UnknownError),
        ];

        for (code, kind) in cases {
            let status = StatusCode::from_u16(code).unwrap();
            let err = map_http_error(status, &HeaderMap::new(), "", &mut context("other"));
            assert_eq!(err.kind(), kind, "status {}", code);
        }
    }

    #[test]
    fn test_github_exhausted_quota_is_rate_limited() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("1700000000"));
        let mut ctx = context("github");

        let err = map_http_error(
            StatusCode::FORBIDDEN,
            &headers,
            r#"{"message":"API rate limit exceeded"}"#,
            &mut ctx,
        );

        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.message(), "API rate limit exceeded");
        assert_eq!(ctx.data.get("rate_limit_reset").map(String::as_str), Some("1700000000"));
    }

    #[test]
    fn test_github_forbidden_with_quota_left_is_permission() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("4999"));

        let err = map_http_error(
            StatusCode::FORBIDDEN,
            &headers,
            r#"{"message":"Resource not accessible by integration"}"#,
            &mut context("github"),
        );

        assert_eq!(err.kind(), ErrorKind::PermissionError);
    }

    #[test]
    fn test_elasticsearch_parsing_exception_is_validation() {
        let body = r#"{"error":{"root_cause":[{"type":"parsing_exception","reason":"Unknown key"}],"type":"parsing_exception","reason":"Unknown key for a START_OBJECT in [bogus]."},"status":400}"#;
        let mut ctx = context("elasticsearch");

        let err = map_http_error(StatusCode::BAD_REQUEST, &HeaderMap::new(), body, &mut ctx);

        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(err.message().starts_with("parsing_exception"));
        assert_eq!(ctx.error_code.as_deref(), Some("parsing_exception"));
    }

    #[test]
    fn test_servicenow_message_and_detail() {
        let body = r#"{"error":{"message":"No Record found","detail":"Record doesn't exist or ACL restricts the record retrieval"},"status":"failure"}"#;
        let mut ctx = context("servicenow");

        let err = map_http_error(StatusCode::NOT_FOUND, &HeaderMap::new(), body, &mut ctx);

        assert_eq!(err.kind(), ErrorKind::NotFoundError);
        assert_eq!(err.message(), "No Record found");
        assert!(ctx.data.contains_key("detail"));
    }

    #[test]
    fn test_non_json_body_is_truncated() {
        let body = "x".repeat(1000);
        let err = map_http_error(StatusCode::BAD_GATEWAY, &HeaderMap::new(), &body, &mut context("servicenow"));

        assert_eq!(err.kind(), ErrorKind::TransientNetwork);
        assert!(err.message().len() < 300);
    }
}
