//! ServiceNow case tools

use std::sync::Arc;

use async_trait::async_trait;
use backend_sdk::servicenow::{CannedQuery, IncidentState};
use backend_sdk::{Assignee, Fields, OperationClass, OperationsAdapter, ServiceError, ServiceNowAdapter, Visibility};
use serde_json::{json, Value};

use super::to_payload;
use crate::registry::{ParamType, ParameterSpec, RegistryError, ToolArguments, ToolDefinition, ToolHandler, ToolRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    CreateCase,
    GetCase,
    UpdateCase,
    QueryCases,
    AddComment,
    CloseCase,
    AssignCase,
}

/// One ServiceNow operation exposed as a tool
pub struct ServiceNowTool {
    adapter: Arc<ServiceNowAdapter>,
    operation: Operation,
}

fn case_id() -> ParameterSpec {
    ParameterSpec::required(
        "case_sys_id",
        ParamType::String,
        "sys_id of the case, or its number (e.g. INC0010001)",
    )
}

fn priority(default_moderate: bool) -> ParameterSpec {
    let spec = ParameterSpec::optional(
        "priority",
        ParamType::String,
        "1 (Critical), 2 (High), 3 (Moderate), 4 (Low), 5 (Planning)",
    )
    .one_of(&["1", "2", "3", "4", "5"]);

    if default_moderate {
        spec.with_default(json!("3"))
    } else {
        spec
    }
}

fn definitions() -> Vec<(ToolDefinition, Operation)> {
    vec![
        (
            ToolDefinition::new(
                "create_case",
                "Create a new support case. Use when the user wants to log a new issue.",
                OperationClass::Mutating,
            )
            .param(ParameterSpec::required("short_description", ParamType::String, "Brief summary of the issue"))
            .param(ParameterSpec::optional("description", ParamType::String, "Detailed description"))
            .param(priority(true))
            .param(ParameterSpec::optional("category", ParamType::String, "Case category"))
            .param(ParameterSpec::optional("contact", ParamType::String, "Contact sys_id"))
            .param(ParameterSpec::optional("account", ParamType::String, "Account sys_id")),
            Operation::CreateCase,
        ),
        (
            ToolDefinition::new("get_case", "Fetch one case by sys_id or number.", OperationClass::Read).param(
                ParameterSpec::required("case_id", ParamType::String, "sys_id or case number (e.g. INC0010001)"),
            ),
            Operation::GetCase,
        ),
        (
            ToolDefinition::new(
                "update_case",
                "Update fields of an existing case. At least one field must be given.",
                OperationClass::Mutating,
            )
            .param(case_id())
            .param(ParameterSpec::optional(
                "state",
                ParamType::String,
                "new, in_progress, on_hold, resolved, closed, canceled, or a numeric state",
            ))
            .param(priority(false))
            .param(ParameterSpec::optional("short_description", ParamType::String, "New summary"))
            .param(ParameterSpec::optional("description", ParamType::String, "New description")),
            Operation::UpdateCase,
        ),
        (
            ToolDefinition::new(
                "query_cases",
                "List cases: open cases, high-priority cases, a text search, or cases for a contact or account.",
                OperationClass::Read,
            )
            .param(
                ParameterSpec::required("query_type", ParamType::String, "Which list to return")
                    .one_of(&["open", "high_priority", "search", "by_contact", "by_account"]),
            )
            .param(ParameterSpec::optional("search_text", ParamType::String, "Text to find when query_type is 'search'"))
            .param(ParameterSpec::optional("contact_sys_id", ParamType::String, "Contact when query_type is 'by_contact'"))
            .param(ParameterSpec::optional("account_sys_id", ParamType::String, "Account when query_type is 'by_account'"))
            .param(ParameterSpec::optional("page_size", ParamType::Integer, "Cases per page (default 20)"))
            .param(ParameterSpec::optional("page_number", ParamType::Integer, "1-based page number").with_default(json!(1))),
            Operation::QueryCases,
        ),
        (
            ToolDefinition::new("add_case_comment", "Add a comment to a case.", OperationClass::Mutating)
                .param(case_id())
                .param(ParameterSpec::required("comment", ParamType::String, "Comment text"))
                .param(
                    ParameterSpec::optional(
                        "comment_type",
                        ParamType::String,
                        "'work_notes' (internal) or 'comments' (customer-visible)",
                    )
                    .one_of(&["work_notes", "comments"])
                    .with_default(json!("work_notes")),
                ),
            Operation::AddComment,
        ),
        (
            ToolDefinition::new("close_case", "Resolve a case.", OperationClass::Mutating)
                .param(case_id())
                .param(ParameterSpec::optional("resolution_notes", ParamType::String, "How the case was resolved"))
                .param(ParameterSpec::optional("close_code", ParamType::String, "Close code or reason")),
            Operation::CloseCase,
        ),
        (
            ToolDefinition::new("assign_case", "Assign a case to a user and optionally a group.", OperationClass::Mutating)
                .param(case_id())
                .param(ParameterSpec::required("assigned_to", ParamType::String, "sys_id or user name of the assignee"))
                .param(ParameterSpec::optional("assignment_group", ParamType::String, "sys_id of the assignment group")),
            Operation::AssignCase,
        ),
    ]
}

pub(super) fn register(registry: &mut ToolRegistry, adapter: &Arc<ServiceNowAdapter>) -> Result<(), RegistryError> {
    for (definition, operation) in definitions() {
        let handler = ServiceNowTool {
            adapter: Arc::clone(adapter),
            operation,
        };
        registry.register(definition, Arc::new(handler))?;
    }
    Ok(())
}

/// Copy the named string arguments that were supplied into `fields`
fn copy_fields(arguments: &ToolArguments, names: &[&str], fields: &mut Fields) {
    for name in names {
        if let Some(value) = arguments.str(name) {
            fields.insert(name.to_string(), Value::String(value.to_string()));
        }
    }
}

fn canned_query(arguments: &ToolArguments) -> backend_sdk::Result<CannedQuery> {
    let text = |name: &str| arguments.str(name).unwrap_or_default().to_string();

    match arguments.require_str("query_type")? {
        "open" => Ok(CannedQuery::Open),
        "high_priority" => Ok(CannedQuery::HighPriority),
        "search" => Ok(CannedQuery::Search(text("search_text"))),
        "by_contact" => Ok(CannedQuery::ByContact(text("contact_sys_id"))),
        "by_account" => Ok(CannedQuery::ByAccount(text("account_sys_id"))),
        other => Err(ServiceError::validation(format!("Unknown query_type '{}'", other))),
    }
}

#[async_trait]
impl ToolHandler for ServiceNowTool {
    async fn call(&self, arguments: ToolArguments) -> backend_sdk::Result<Value> {
        let adapter = &self.adapter;

        match self.operation {
            Operation::CreateCase => {
                let mut fields = Fields::new();
                copy_fields(
                    &arguments,
                    &["short_description", "description", "priority", "category", "contact", "account"],
                    &mut fields,
                );
                to_payload(&adapter.create(fields).await?)
            }
            Operation::GetCase => to_payload(&adapter.read(arguments.require_str("case_id")?).await?),
            Operation::UpdateCase => {
                let mut fields = Fields::new();
                if let Some(state) = arguments.str("state") {
                    let state = IncidentState::resolve(state)?;
                    fields.insert("state".to_string(), Value::String(state.to_string()));
                }
                copy_fields(&arguments, &["priority", "short_description", "description"], &mut fields);

                let id = arguments.require_str("case_sys_id")?;
                to_payload(&adapter.update(id, fields).await?)
            }
            Operation::QueryCases => {
                let query = canned_query(&arguments)?;
                to_payload(&adapter.query_canned(&query, &arguments.page_request()).await?)
            }
            Operation::AddComment => {
                let visibility = match arguments.str("comment_type") {
                    Some("comments") => Visibility::Customer,
                    _ => Visibility::Internal,
                };
                let ack = adapter
                    .comment(
                        arguments.require_str("case_sys_id")?,
                        arguments.require_str("comment")?,
                        visibility,
                    )
                    .await?;
                to_payload(&ack)
            }
            Operation::CloseCase => {
                let mut metadata = Fields::new();
                copy_fields(&arguments, &["resolution_notes", "close_code"], &mut metadata);

                let id = arguments.require_str("case_sys_id")?;
                to_payload(&adapter.transition(id, "resolved", metadata).await?)
            }
            Operation::AssignCase => {
                let assignee = Assignee {
                    user: arguments.require_str("assigned_to")?.to_string(),
                    group: arguments.str("assignment_group").map(str::to_string),
                };
                to_payload(&adapter.assign(arguments.require_str("case_sys_id")?, &assignee).await?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arguments(value: Value) -> ToolArguments {
        match value {
            Value::Object(map) => ToolArguments::new(map),
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_catalogue() {
        let names: Vec<String> = definitions().into_iter().map(|(d, _)| d.name).collect();
        assert_eq!(
            names,
            vec![
                "create_case",
                "get_case",
                "update_case",
                "query_cases",
                "add_case_comment",
                "close_case",
                "assign_case"
            ]
        );

        let mutating: Vec<String> = definitions()
            .into_iter()
            .filter(|(d, _)| d.operation_class == OperationClass::Mutating)
            .map(|(d, _)| d.name)
            .collect();
        assert_eq!(mutating.len(), 5);
        assert!(!mutating.contains(&"get_case".to_string()));
    }

    #[test]
    fn test_canned_query_selection() {
        assert_eq!(
            canned_query(&arguments(json!({ "query_type": "search", "search_text": "vpn" }))).unwrap(),
            CannedQuery::Search("vpn".to_string())
        );
        assert_eq!(
            canned_query(&arguments(json!({ "query_type": "high_priority" }))).unwrap(),
            CannedQuery::HighPriority
        );
        assert!(canned_query(&arguments(json!({ "query_type": "custom" }))).is_err());
    }

    #[test]
    fn test_copy_fields_skips_absent_arguments() {
        let mut fields = Fields::new();
        copy_fields(
            &arguments(json!({ "short_description": "VPN down", "priority": "2" })),
            &["short_description", "description", "priority"],
            &mut fields,
        );
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["priority"], json!("2"));
    }
}
