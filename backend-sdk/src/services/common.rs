//! Common utilities for the adapters
//!
//! Sending a request, classifying whatever comes back, and decoding JSON
//! bodies. Every adapter funnels its HTTP traffic through `send` so that no
//! raw transport fault escapes unclassified.

use log::{debug, error, warn};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use url::Url;

use crate::error::{ErrorContext, ErrorKind, Result, ServiceError};
use crate::util::{generate_request_id, measure_time_async, sanitize_for_logging};

/// Create error context for HTTP requests
pub fn create_error_context(service_name: &str, endpoint: &str, request_id: &str) -> ErrorContext {
    ErrorContext::for_service(service_name)
        .endpoint(endpoint)
        .request_id(request_id)
}

/// Send a request and classify any failure
///
/// Non-2xx responses are mapped through `error::mapping`; transport faults
/// through `From<reqwest::Error>`. Either way the error carries the service,
/// endpoint and request id.
pub async fn send(client: &Client, service: &str, request: RequestBuilder) -> Result<Response> {
    let request_id = generate_request_id();
    let request = request
        .header("X-Request-ID", request_id.as_str())
        .build()
        .map_err(|e| transport_error(service, "", &request_id, e))?;

    let endpoint = format!("{} {}", request.method(), request.url().path());
    debug!(
        "{} request {} {}",
        service,
        request_id,
        sanitize_for_logging(request.url().as_str())
    );

    let (result, elapsed) = measure_time_async(|| client.execute(request)).await;

    match result {
        Ok(response) if response.status().is_success() => {
            debug!("{} {} -> {} in {:?}", service, endpoint, response.status(), elapsed);
            Ok(response)
        }
        Ok(response) => {
            let err = parse_error_response(service, &endpoint, &request_id, response).await;
            log_failure(&err, service, &endpoint);
            Err(err)
        }
        Err(e) => {
            let err = transport_error(service, &endpoint, &request_id, e);
            log_failure(&err, service, &endpoint);
            Err(err)
        }
    }
}

/// Parse error response from HTTP response
pub async fn parse_error_response(
    service_name: &str,
    endpoint: &str,
    request_id: &str,
    response: Response,
) -> ServiceError {
    let status = response.status();
    let headers = response.headers().clone();
    let mut context = create_error_context(service_name, endpoint, request_id).status_code(status.as_u16());

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => format!("Failed to read error response: {}", e),
    };

    crate::error::mapping::map_http_error(status, &headers, &body, &mut context).with_context(context)
}

/// Decode a successful response body as JSON
pub async fn read_json(service: &str, response: Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().await.map_err(|e| {
        ServiceError::from(e).with_context_value("service", service)
    })?;

    if body.trim().is_empty() && status == StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body).map_err(|e| {
        ServiceError::unknown(format!("{} returned a malformed JSON body: {}", service, e))
            .with_context(ErrorContext::for_service(service).status_code(status.as_u16()))
    })
}

/// Decode a successful response body as text
pub async fn read_text(service: &str, response: Response) -> Result<String> {
    response
        .text()
        .await
        .map_err(|e| ServiceError::from(e).with_context_value("service", service))
}

/// Append path segments to a base URL, percent-encoding each one
pub fn join_segments<'a>(base: &Url, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| ServiceError::configuration(format!("Base URL cannot carry a path: {}", base)))?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

/// Parse a configured base URL
pub fn parse_base_url(service: &str, raw: &str) -> Result<Url> {
    Url::parse(raw.trim_end_matches('/'))
        .map_err(|e| ServiceError::configuration(format!("Invalid {} URL '{}': {}", service, raw, e)))
}

fn transport_error(service: &str, endpoint: &str, request_id: &str, err: reqwest::Error) -> ServiceError {
    match ServiceError::from(err) {
        ServiceError::WithContext { inner, mut context } => {
            context.service = service.to_string();
            if !endpoint.is_empty() {
                context.endpoint = Some(endpoint.to_string());
            }
            context.request_id = Some(request_id.to_string());
            ServiceError::WithContext { inner, context }
        }
        other => other.with_context(create_error_context(service, endpoint, request_id)),
    }
}

fn log_failure(err: &ServiceError, service: &str, endpoint: &str) {
    match err.kind() {
        ErrorKind::UnknownError => error!("{} {} failed with an unclassified error: {:?}", service, endpoint, err),
        ErrorKind::TransientNetwork | ErrorKind::RateLimited => {
            warn!("{} {} failed: {}", service, endpoint, err)
        }
        _ => debug!("{} {} failed: {}", service, endpoint, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_segments_encodes_each_segment() {
        let base = parse_base_url("github", "https://ghe.example.com/api/v3/").unwrap();
        let url = join_segments(&base, ["repos", "octo", "hello world", "contents"]).unwrap();
        assert_eq!(url.as_str(), "https://ghe.example.com/api/v3/repos/octo/hello%20world/contents");
    }

    #[test]
    fn test_parse_base_url_rejects_garbage() {
        let err = parse_base_url("servicenow", "not a url").unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(_)));
    }
}
