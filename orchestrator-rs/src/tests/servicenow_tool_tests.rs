//! ServiceNow tools driven through the orchestrator against a mock instance

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use backend_sdk::config::ServiceNowConfig;
    use backend_sdk::{ErrorKind, RetryConfig, RetryPolicy, ServiceNowAdapter};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::conversation::{ConversationState, Message};
    use crate::model::ModelResponse;
    use crate::orchestrator::Orchestrator;
    use crate::registry::ToolRegistry;
    use crate::tests::fakes::{call, ScriptedModel};
    use crate::tools::{register_backend_tools, Backends};

    fn backends(server: &MockServer) -> Backends {
        let adapter = ServiceNowAdapter::new(ServiceNowConfig {
            instance: server.uri(),
            api_token: Some("snow-token".to_string()),
            timeout_seconds: 5,
            ..Default::default()
        })
        .expect("Failed to build ServiceNow adapter")
        .with_retry_policy(RetryPolicy::new(RetryConfig {
            max_attempts: 3,
            initial_interval: Duration::from_millis(5),
            max_interval: Duration::from_millis(20),
            multiplier: 2.0,
            randomization_factor: 0.0,
        }));

        Backends {
            servicenow: Some(Arc::new(adapter)),
            ..Default::default()
        }
    }

    fn orchestrator(server: &MockServer, model: Arc<ScriptedModel>) -> Orchestrator {
        let mut registry = ToolRegistry::new();
        let count = register_backend_tools(&mut registry, &backends(server)).unwrap();
        assert_eq!(count, 7);
        Orchestrator::new(Arc::new(registry), model)
    }

    fn only_result(state: &ConversationState) -> crate::conversation::ToolCallResult {
        let results: Vec<_> = state
            .snapshot()
            .iter()
            .filter_map(|message| match message {
                Message::Tool(result) => Some(result.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(results.len(), 1);
        results[0].clone()
    }

    #[tokio::test]
    async fn test_create_case_is_sent_once_on_server_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/now/table/incident"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let model = Arc::new(ScriptedModel::new(vec![
            ModelResponse::calls(vec![call(
                "c1",
                "create_case",
                json!({ "short_description": "VPN down" }),
            )]),
            ModelResponse::text("The case system is unavailable right now."),
        ]));
        let orchestrator = orchestrator(&server, model);
        let mut state = ConversationState::new();

        let reply = orchestrator.run_turn(&mut state, "open a case").await.unwrap();
        assert_eq!(reply.text, "The case system is unavailable right now.");

        let result = only_result(&state);
        assert!(!result.success);
        assert_eq!(result.error_kind(), Some(ErrorKind::TransientNetwork));
    }

    #[tokio::test]
    async fn test_query_cases_pages_by_offset() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/now/table/incident"))
            .and(query_param("sysparm_limit", "20"))
            .and(query_param("sysparm_offset", "20"))
            .and(query_param("sysparm_query", "state!=6^state!=7"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Total-Count", "21")
                    .set_body_json(json!({
                        "result": [{ "sys_id": "z9", "number": "INC0000021", "state": "1" }]
                    })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let model = Arc::new(ScriptedModel::new(vec![
            ModelResponse::calls(vec![call(
                "q1",
                "query_cases",
                json!({ "query_type": "open", "page_size": 20, "page_number": 2 }),
            )]),
            ModelResponse::text("One more open case."),
        ]));
        let orchestrator = orchestrator(&server, model);
        let mut state = ConversationState::new();

        orchestrator.run_turn(&mut state, "next page").await.unwrap();

        let result = only_result(&state);
        assert!(result.success);
        let payload = result.payload.unwrap();
        assert_eq!(payload["has_more"], json!(false));
        assert_eq!(payload["items"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_string_page_arguments_are_coerced() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/now/table/incident"))
            .and(query_param("sysparm_limit", "5"))
            .and(query_param("sysparm_offset", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let model = Arc::new(ScriptedModel::new(vec![ModelResponse::calls(vec![call(
            "q1",
            "query_cases",
            json!({ "query_type": "high_priority", "page_size": "5", "page_number": "3" }),
        )])]));
        let orchestrator = orchestrator(&server, model);
        let mut state = ConversationState::new();

        orchestrator.run_turn(&mut state, "high priority").await.unwrap();
        assert!(only_result(&state).success);
    }
}
