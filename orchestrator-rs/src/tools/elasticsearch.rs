//! Elasticsearch tools

use std::sync::Arc;

use async_trait::async_trait;
use backend_sdk::{ElasticsearchAdapter, FilterPredicate, OperationClass, OperationsAdapter};
use serde_json::{json, Value};

use super::to_payload;
use crate::registry::{ParamType, ParameterSpec, RegistryError, ToolArguments, ToolDefinition, ToolHandler, ToolRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    RawSearch,
    StructuredQuery,
}

/// One Elasticsearch operation exposed as a tool
pub struct ElasticsearchTool {
    adapter: Arc<ElasticsearchAdapter>,
    operation: Operation,
}

pub(super) fn register(registry: &mut ToolRegistry, adapter: &Arc<ElasticsearchAdapter>) -> Result<(), RegistryError> {
    let search_logs = ToolDefinition::new(
        "search_logs",
        &format!(
            "Run an Elasticsearch query against the '{}' index. Pass a JSON object: either a query clause such as \
             {{\"match\": {{\"message\": \"timeout\"}}}} or a full search body with \"query\", \"size\" and \"from\".",
            adapter.index()
        ),
        OperationClass::Read,
    )
    .param(ParameterSpec::required("query", ParamType::String, "Elasticsearch query as a JSON object"));

    let query_logs = ToolDefinition::new(
        "query_logs",
        "Find log records by level, message text and host. All given filters must match.",
        OperationClass::Read,
    )
    .param(ParameterSpec::optional("level", ParamType::String, "Log level, e.g. ERROR"))
    .param(ParameterSpec::optional("message", ParamType::String, "Text the message must contain"))
    .param(ParameterSpec::optional("host", ParamType::String, "Host name"))
    .param(ParameterSpec::optional("page_size", ParamType::Integer, "Records per page (default 20, max 100)"))
    .param(ParameterSpec::optional("page_number", ParamType::Integer, "1-based page number").with_default(json!(1)));

    for (definition, operation) in [(search_logs, Operation::RawSearch), (query_logs, Operation::StructuredQuery)] {
        let handler = ElasticsearchTool {
            adapter: Arc::clone(adapter),
            operation,
        };
        registry.register(definition, Arc::new(handler))?;
    }
    Ok(())
}

/// Conjunction of the filters that were supplied
fn log_predicate(arguments: &ToolArguments) -> FilterPredicate {
    let mut filters = Vec::new();
    if let Some(level) = arguments.str("level") {
        filters.push(FilterPredicate::eq("level", level));
    }
    if let Some(message) = arguments.str("message") {
        filters.push(FilterPredicate::contains("message", message));
    }
    if let Some(host) = arguments.str("host") {
        filters.push(FilterPredicate::eq("host", host));
    }
    FilterPredicate::and(filters)
}

#[async_trait]
impl ToolHandler for ElasticsearchTool {
    async fn call(&self, arguments: ToolArguments) -> backend_sdk::Result<Value> {
        let page = match self.operation {
            Operation::RawSearch => self.adapter.search_raw(arguments.require_str("query")?).await?,
            Operation::StructuredQuery => {
                self.adapter
                    .query(&log_predicate(&arguments), &arguments.page_request(), None)
                    .await?
            }
        };
        to_payload(&page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend_sdk::{encode, Dialect};

    #[test]
    fn test_log_predicate_joins_supplied_filters() {
        let mut values = serde_json::Map::new();
        values.insert("level".to_string(), json!("ERROR"));
        values.insert("message".to_string(), json!("disk"));
        let arguments = ToolArguments::new(values);

        let encoded = encode(&log_predicate(&arguments), Dialect::Lucene).unwrap();
        assert_eq!(encoded, "level:ERROR AND message:*disk*");

        let empty = encode(&log_predicate(&ToolArguments::default()), Dialect::Lucene).unwrap();
        assert_eq!(empty, "");
    }
}
