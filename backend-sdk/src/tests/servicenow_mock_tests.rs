//! Mock tests for the ServiceNow adapter
//!
//! These tests use WireMock to simulate the Table API and verify
//! authentication, pagination, retry classes and record-number resolution.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::ServiceNowConfig;
    use crate::core::{Assignee, Capability, Fields, OperationsAdapter, Visibility};
    use crate::error::ErrorKind;
    use crate::pagination::PageRequest;
    use crate::query::FilterPredicate;
    use crate::resilience::{RetryConfig, RetryPolicy};
    use crate::services::servicenow::{CannedQuery, ServiceNowAdapter};

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts: 3,
            initial_interval: Duration::from_millis(5),
            max_interval: Duration::from_millis(20),
            multiplier: 2.0,
            randomization_factor: 0.0,
        })
    }

    fn basic_config(server: &MockServer) -> ServiceNowConfig {
        ServiceNowConfig {
            instance: server.uri(),
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            timeout_seconds: 5,
            ..Default::default()
        }
    }

    fn create_test_adapter(server: &MockServer) -> ServiceNowAdapter {
        ServiceNowAdapter::new(basic_config(server))
            .expect("Failed to build ServiceNow adapter")
            .with_retry_policy(fast_retry())
    }

    fn fields(value: serde_json::Value) -> Fields {
        match value {
            serde_json::Value::Object(fields) => fields,
            _ => panic!("expected an object"),
        }
    }

    #[tokio::test]
    async fn test_basic_auth_and_page_window() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/now/table/incident"))
            .and(header("Authorization", "Basic dXNlcjpwYXNz"))
            .and(query_param("sysparm_limit", "20"))
            .and(query_param("sysparm_offset", "20"))
            .and(query_param("sysparm_query", "state!=6^state!=7"))
            .and(query_param("sysparm_orderby", "^sys_updated_on"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Total-Count", "45")
                    .set_body_json(json!({
                        "result": [
                            { "sys_id": "a1", "number": "INC0000021", "state": "2" },
                            { "sys_id": "a2", "number": "INC0000022", "state": "1" }
                        ]
                    })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let adapter = create_test_adapter(&server);
        let page = adapter
            .query_canned(&CannedQuery::Open, &PageRequest::page(Some(20), 2))
            .await
            .unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, Some(45));
        // X-Total-Count decides, not the short page
        assert!(page.has_more);
        assert_eq!(page.next_offset, Some(22));
        assert_eq!(page.items[0].identifier().as_deref(), Some("INC0000021"));
    }

    #[tokio::test]
    async fn test_empty_predicate_sends_no_filter() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/now/table/incident"))
            .and(query_param("sysparm_limit", "100"))
            .and(query_param("sysparm_offset", "0"))
            .and(query_param_is_missing("sysparm_query"))
            .and(query_param_is_missing("sysparm_fields"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = create_test_adapter(&server);
        let page = adapter
            .query(&FilterPredicate::empty(), &PageRequest::page(Some(500), 1), None)
            .await
            .unwrap();

        assert!(page.items.is_empty());
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_configured_fields_limit_query_columns() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/now/table/incident"))
            .and(query_param("sysparm_fields", "number,short_description"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [{ "number": "INC0000001", "short_description": "Printer jam" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = ServiceNowConfig {
            fields: vec!["number".to_string(), "short_description".to_string()],
            ..basic_config(&server)
        };
        let adapter = ServiceNowAdapter::new(config).unwrap().with_retry_policy(fast_retry());

        let page = adapter
            .query(&FilterPredicate::eq("active", true), &PageRequest::first(), None)
            .await
            .unwrap();
        assert_eq!(page.items[0].get_str("short_description").as_deref(), Some("Printer jam"));
    }

    #[tokio::test]
    async fn test_token_takes_precedence_over_basic() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/now/table/incident/abc123"))
            .and(header("Authorization", "Bearer snow-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": { "sys_id": "abc123", "number": "INC0010001" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = ServiceNowConfig {
            api_token: Some("snow-token".to_string()),
            ..basic_config(&server)
        };
        let adapter = ServiceNowAdapter::new(config).unwrap().with_retry_policy(fast_retry());

        let record = adapter.read("abc123").await.unwrap();
        assert_eq!(record.get_str("number").as_deref(), Some("INC0010001"));
    }

    #[tokio::test]
    async fn test_read_retries_transient_failures() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/now/table/incident/abc123"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/now/table/incident/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": { "sys_id": "abc123", "number": "INC0010001" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = create_test_adapter(&server);
        let record = adapter.read("abc123").await.unwrap();
        assert_eq!(record.identifier().as_deref(), Some("INC0010001"));
    }

    #[tokio::test]
    async fn test_create_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/now/table/incident"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = create_test_adapter(&server);
        let err = adapter
            .create(fields(json!({ "short_description": "VPN down" })))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TransientNetwork);
        assert_eq!(err.status_code(), Some(503));
    }

    #[tokio::test]
    async fn test_create_defaults_priority_and_links_record() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/now/table/incident"))
            .and(body_json(json!({ "short_description": "VPN down", "priority": "3" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "result": { "sys_id": "new1", "number": "INC0010002", "priority": "3" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = create_test_adapter(&server);
        let record = adapter
            .create(fields(json!({ "short_description": "VPN down" })))
            .await
            .unwrap();

        let link = record.get_str("link").unwrap();
        assert!(link.ends_with("/nav_to.do?uri=incident.do?sys_id=new1"));
    }

    #[tokio::test]
    async fn test_create_requires_summary() {
        let server = MockServer::start().await;
        let adapter = create_test_adapter(&server);

        let err = adapter.create(fields(json!({ "priority": "1" }))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_number_shaped_read_resolves_by_number() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/now/table/incident"))
            .and(query_param("sysparm_query", "number=INC0010001"))
            .and(query_param("sysparm_limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [{ "sys_id": "abc123", "number": "INC0010001" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = create_test_adapter(&server);
        let record = adapter.read("INC0010001").await.unwrap();
        assert_eq!(record.get_str("sys_id").as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_unknown_number_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/now/table/incident"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": [] })))
            .mount(&server)
            .await;

        let adapter = create_test_adapter(&server);
        let err = adapter.read("INC9999999").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFoundError);
    }

    #[tokio::test]
    async fn test_transition_resolves_number_then_patches_once() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/now/table/incident"))
            .and(query_param("sysparm_query", "number=INC0010001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [{ "sys_id": "abc123", "number": "INC0010001" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PATCH"))
            .and(path("/api/now/table/incident/abc123"))
            .and(body_json(json!({ "state": "6", "close_notes": "Fixed" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": { "sys_id": "abc123", "number": "INC0010001", "state": "6" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = create_test_adapter(&server);
        let record = adapter
            .transition("INC0010001", "resolved", fields(json!({ "close_notes": "Fixed" })))
            .await
            .unwrap();
        assert_eq!(record.state().as_deref(), Some("6"));
    }

    #[tokio::test]
    async fn test_comment_visibility_selects_field() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/api/now/table/incident/abc123"))
            .and(body_json(json!({ "work_notes": "Checked the logs" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": { "sys_id": "abc123", "number": "INC0010001" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PATCH"))
            .and(path("/api/now/table/incident/abc123"))
            .and(body_json(json!({ "comments": "We are on it" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": { "sys_id": "abc123", "number": "INC0010001" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = create_test_adapter(&server);
        let internal = adapter
            .comment("abc123", "Checked the logs", Visibility::Internal)
            .await
            .unwrap();
        assert_eq!(internal.identifier, "INC0010001");

        adapter
            .comment("abc123", "We are on it", Visibility::Customer)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_assign_with_group() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/api/now/table/incident/abc123"))
            .and(body_json(json!({ "assigned_to": "jdoe", "assignment_group": "network" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": { "sys_id": "abc123", "number": "INC0010001" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = create_test_adapter(&server);
        let ack = adapter
            .assign(
                "abc123",
                &Assignee {
                    user: "jdoe".to_string(),
                    group: Some("network".to_string()),
                },
            )
            .await
            .unwrap();
        assert!(ack.message.contains("jdoe"));
    }

    #[tokio::test]
    async fn test_permission_error_carries_detail() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/now/table/incident"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": { "message": "Insufficient rights", "detail": "ACL denied" },
                "status": "failure"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = create_test_adapter(&server);
        let err = adapter
            .query(&FilterPredicate::eq("active", true), &PageRequest::first(), None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PermissionError);
        assert!(err.message().contains("Insufficient rights"));
    }

    #[test]
    fn test_supports_every_capability() {
        let adapter = ServiceNowAdapter::new(ServiceNowConfig {
            instance: "dev1.service-now.com".to_string(),
            api_token: Some("t".to_string()),
            ..Default::default()
        })
        .unwrap();

        for capability in [
            Capability::Create,
            Capability::Read,
            Capability::Update,
            Capability::Query,
            Capability::Comment,
            Capability::Transition,
            Capability::Assign,
        ] {
            assert!(adapter.supports(capability));
        }
    }
}
