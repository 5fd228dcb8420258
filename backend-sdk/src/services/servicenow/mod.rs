//! ServiceNow adapter
//!
//! Case/incident operations against the Table API
//! (`/api/now/table/{table}`). Implements all seven capabilities.
//! Authentication is a bearer token or basic credentials, selected at
//! construction.

mod queries;
pub use queries::{CannedQuery, IncidentState};

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, Method};
use serde_json::Value;
use url::Url;

use crate::config::ServiceNowConfig;
use crate::core::{Ack, Assignee, Auth, Capability, ClientBuilder, Entity, Fields, OperationsAdapter, Visibility};
use crate::error::{Result, ServiceError};
use crate::pagination::{PageRequest, PageResult, Paginator};
use crate::query::{encode, encode_order, Dialect, FilterPredicate, OrderBy};
use crate::resilience::{OperationClass, RetryPolicy};
use crate::services::common::{join_segments, parse_base_url, read_json, send};

const SERVICE: &str = "servicenow";

const CAPABILITIES: &[Capability] = &[
    Capability::Create,
    Capability::Read,
    Capability::Update,
    Capability::Query,
    Capability::Comment,
    Capability::Transition,
    Capability::Assign,
];

/// Priority applied to new records that do not name one
const DEFAULT_PRIORITY: &str = "3";

/// Adapter over the ServiceNow Table API
pub struct ServiceNowAdapter {
    http: Client,
    instance_url: Url,
    table_url: Url,
    table: String,
    auth: Auth,
    retry: RetryPolicy,
    paginator: Paginator,
    fields: Vec<String>,
}

impl ServiceNowAdapter {
    /// Create an adapter from configuration
    pub fn new(config: ServiceNowConfig) -> Result<Self> {
        let auth = config.auth()?;
        let http = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .build_http_client()?;

        let instance_url = parse_base_url(SERVICE, &config.instance_url())?;
        let table_url = join_segments(&instance_url, ["api", "now", "table", config.table.as_str()])?;

        info!(
            "ServiceNow adapter for table '{}' at {} using {} auth",
            config.table,
            instance_url,
            auth.mode()
        );

        Ok(Self {
            http,
            instance_url,
            table_url,
            table: config.table,
            auth,
            retry: RetryPolicy::default(),
            paginator: Paginator::with_max_page_size(config.max_page_size),
            fields: config.fields,
        })
    }

    /// Replace the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Run one of the predefined case queries
    pub async fn query_canned(&self, query: &CannedQuery, page: &PageRequest) -> Result<PageResult<Entity>> {
        let predicate = query.predicate()?;
        self.query(&predicate, page, Some(&query.order())).await
    }

    /// Browser link to a record
    pub fn record_link(&self, sys_id: &str) -> String {
        format!(
            "{}/nav_to.do?uri={}.do?sys_id={}",
            self.instance_url.as_str().trim_end_matches('/'),
            self.table,
            sys_id
        )
    }

    fn record_url(&self, sys_id: &str) -> Result<Url> {
        join_segments(&self.table_url, [sys_id])
    }

    /// Issue one Table API request and unwrap its `result`
    async fn call(
        &self,
        label: &str,
        class: OperationClass,
        method: Method,
        url: Url,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<(Value, Option<u64>)> {
        self.retry
            .run(label, class, || {
                let mut request = self.auth.apply(self.http.request(method.clone(), url.clone()));
                if !query.is_empty() {
                    request = request.query(query);
                }
                if let Some(body) = body {
                    request = request.json(body);
                }
                async move {
                    let response = send(&self.http, SERVICE, request).await?;
                    let total = response
                        .headers()
                        .get("x-total-count")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.trim().parse::<u64>().ok());
                    let value = read_json(SERVICE, response).await?;
                    Ok((value, total))
                }
            })
            .await
            .and_then(|(value, total)| match value {
                Value::Object(mut object) => match object.remove("result") {
                    Some(result) => Ok((result, total)),
                    None => Err(ServiceError::unknown("ServiceNow response has no 'result'")),
                },
                _ => Err(ServiceError::unknown("ServiceNow response is not a JSON object")),
            })
    }

    /// Resolve a record number such as `INC0010001` to its sys_id
    async fn resolve_sys_id(&self, identifier: &str) -> Result<String> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(ServiceError::validation("Record identifier must not be empty"));
        }
        if !looks_like_record_number(identifier) {
            return Ok(identifier.to_string());
        }

        let record = self.read_by_number(identifier).await?;
        record
            .get_str("sys_id")
            .ok_or_else(|| ServiceError::unknown(format!("Record {} has no sys_id", identifier)))
    }

    async fn read_by_number(&self, number: &str) -> Result<Entity> {
        let predicate = FilterPredicate::eq("number", number);
        let params = vec![
            ("sysparm_query", encode(&predicate, Dialect::ServiceNow)?),
            ("sysparm_limit", "1".to_string()),
        ];

        let (result, _) = self
            .call("get_by_number", OperationClass::Read, Method::GET, self.table_url.clone(), &params, None)
            .await?;

        match result {
            Value::Array(records) => match records.into_iter().next() {
                Some(record) => Entity::from_value(record),
                None => Err(ServiceError::not_found(format!("Record {} not found", number))),
            },
            other => Entity::from_value(other),
        }
    }

    /// PATCH a record; attempted exactly once
    async fn patch(&self, label: &str, identifier: &str, fields: Fields) -> Result<Entity> {
        let sys_id = self.resolve_sys_id(identifier).await?;
        let url = self.record_url(&sys_id)?;
        let body = Value::Object(fields);

        let (result, _) = self
            .call(label, OperationClass::Mutating, Method::PATCH, url, &[], Some(&body))
            .await?;
        Entity::from_value(result)
    }
}

/// Record numbers are an upper-case prefix followed by digits
pub fn looks_like_record_number(identifier: &str) -> bool {
    let prefix_len = identifier.chars().take_while(|c| c.is_ascii_uppercase()).count();
    let digits = &identifier[prefix_len..];
    prefix_len >= 2 && !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

#[async_trait]
impl OperationsAdapter for ServiceNowAdapter {
    fn name(&self) -> &str {
        SERVICE
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    async fn create(&self, mut fields: Fields) -> Result<Entity> {
        let has_summary = fields
            .get("short_description")
            .and_then(Value::as_str)
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);
        if !has_summary {
            return Err(ServiceError::validation("Missing required field 'short_description'"));
        }

        fields
            .entry("priority")
            .or_insert_with(|| Value::String(DEFAULT_PRIORITY.to_string()));

        let body = Value::Object(fields);
        let (result, _) = self
            .call("create", OperationClass::Mutating, Method::POST, self.table_url.clone(), &[], Some(&body))
            .await?;

        let mut entity = Entity::from_value(result)?;
        if let Some(sys_id) = entity.get_str("sys_id") {
            let link = self.record_link(&sys_id);
            entity.0.insert("link".to_string(), Value::String(link));
        }
        info!("Created {} record {}", self.table, entity.identifier().unwrap_or_default());
        Ok(entity)
    }

    /// Accepts a sys_id or a record number
    async fn read(&self, identifier: &str) -> Result<Entity> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(ServiceError::validation("Record identifier must not be empty"));
        }

        if looks_like_record_number(identifier) {
            return self.read_by_number(identifier).await;
        }

        let url = self.record_url(identifier)?;
        let (result, _) = self.call("get", OperationClass::Read, Method::GET, url, &[], None).await?;
        Entity::from_value(result)
    }

    async fn update(&self, identifier: &str, fields: Fields) -> Result<Entity> {
        if fields.is_empty() {
            return Err(ServiceError::validation("No fields to update"));
        }
        self.patch("update", identifier, fields).await
    }

    async fn query(
        &self,
        predicate: &FilterPredicate,
        page: &PageRequest,
        order: Option<&OrderBy>,
    ) -> Result<PageResult<Entity>> {
        let encoded = encode(predicate, Dialect::ServiceNow)?;
        let plan = self.paginator.plan(page)?;

        let mut params = vec![
            ("sysparm_limit", plan.limit.to_string()),
            ("sysparm_offset", plan.offset.to_string()),
        ];
        if !encoded.is_empty() {
            params.push(("sysparm_query", encoded));
        }
        if let Some(order) = order {
            params.push(("sysparm_orderby", encode_order(order, Dialect::ServiceNow)?));
        }
        if !self.fields.is_empty() {
            params.push(("sysparm_fields", self.fields.join(",")));
        }

        let (result, total) = self
            .call("query", OperationClass::Read, Method::GET, self.table_url.clone(), &params, None)
            .await?;

        let records = match result {
            Value::Array(records) => records,
            other => {
                return Err(ServiceError::unknown(format!(
                    "Expected a list of records, got {}",
                    crate::core::json_type_name(&other)
                )))
            }
        };

        let items = records
            .into_iter()
            .map(Entity::from_value)
            .collect::<Result<Vec<_>>>()?;

        debug!("{} query returned {} records (total {:?})", self.table, items.len(), total);
        Ok(self.paginator.interpret(items, &plan, total))
    }

    async fn comment(&self, identifier: &str, text: &str, visibility: Visibility) -> Result<Ack> {
        if text.trim().is_empty() {
            return Err(ServiceError::validation("Comment must not be empty"));
        }

        let field = match visibility {
            Visibility::Internal => "work_notes",
            Visibility::Customer => "comments",
        };
        let mut fields = Fields::new();
        fields.insert(field.to_string(), Value::String(text.to_string()));

        let entity = self.patch("comment", identifier, fields).await?;
        let identifier = entity.identifier().unwrap_or_else(|| identifier.to_string());
        Ok(Ack {
            message: format!("Added {} to {}", field, identifier),
            identifier,
        })
    }

    /// Target is a named state (`resolved`, `closed`, ...) or a numeric code
    async fn transition(&self, identifier: &str, target_state: &str, metadata: Fields) -> Result<Entity> {
        let state = IncidentState::resolve(target_state)?;

        let mut fields = metadata;
        fields.insert("state".to_string(), Value::String(state.to_string()));

        self.patch("transition", identifier, fields).await
    }

    async fn assign(&self, identifier: &str, assignee: &Assignee) -> Result<Ack> {
        if assignee.user.trim().is_empty() {
            return Err(ServiceError::validation("assigned_to must not be empty"));
        }

        let mut fields = Fields::new();
        fields.insert("assigned_to".to_string(), Value::String(assignee.user.clone()));
        if let Some(ref group) = assignee.group {
            fields.insert("assignment_group".to_string(), Value::String(group.clone()));
        }

        let entity = self.patch("assign", identifier, fields).await?;
        let identifier = entity.identifier().unwrap_or_else(|| identifier.to_string());
        Ok(Ack {
            message: format!("Assigned {} to {}", identifier, assignee.user),
            identifier,
        })
    }
}
