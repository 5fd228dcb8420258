//! Elasticsearch adapter
//!
//! Log search against one index (or index pattern). Only the `query`
//! capability is implemented, plus `search_raw` for model-authored query
//! bodies.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use url::Url;

use crate::config::ElasticsearchConfig;
use crate::core::{json_type_name, Auth, Capability, ClientBuilder, Entity, OperationsAdapter};
use crate::error::{Result, ServiceError};
use crate::pagination::{PagePlan, PageRequest, PageResult, Paginator};
use crate::query::{encode, encode_order, Dialect, FilterPredicate, OrderBy, SortDirection};
use crate::resilience::{OperationClass, RetryPolicy};
use crate::services::common::{join_segments, parse_base_url, read_json, send};

const SERVICE: &str = "elasticsearch";

const CAPABILITIES: &[Capability] = &[Capability::Query];

/// Elasticsearch's own default `size`
const DEFAULT_SEARCH_SIZE: i64 = 10;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    #[serde(default)]
    total: Option<Total>,
    #[serde(default)]
    hits: Vec<Hit>,
}

/// `hits.total` is an object on 7.x+ and a bare number before that
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Total {
    Object { value: u64 },
    Count(u64),
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: Option<String>,
    #[serde(rename = "_source", default)]
    source: Map<String, Value>,
}

/// Adapter over the Elasticsearch search API
pub struct ElasticsearchAdapter {
    http: Client,
    base_url: Url,
    index: String,
    auth: Auth,
    retry: RetryPolicy,
    paginator: Paginator,
}

impl ElasticsearchAdapter {
    /// Create an adapter from configuration
    pub fn new(config: ElasticsearchConfig) -> Result<Self> {
        let http = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .header("Content-Type", "application/json")
            .build_http_client()?;

        Ok(Self {
            http,
            base_url: parse_base_url(SERVICE, &config.url)?,
            auth: config.auth(),
            index: config.index,
            retry: RetryPolicy::default(),
            paginator: Paginator::new(),
        })
    }

    /// Replace the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Run a model-authored query
    ///
    /// Accepts either a bare query clause (`{"match": {...}}`) or a full
    /// search body with a top-level `query`. Anything that is not a JSON
    /// object fails with a validation error before any request is sent.
    /// `size` and `from` go through the paginator, so an oversized `size`
    /// is clamped and a negative one is rejected.
    pub async fn search_raw(&self, raw: &str) -> Result<PageResult<Entity>> {
        let parsed: Value = serde_json::from_str(raw)
            .map_err(|e| ServiceError::validation(format!("Query is not valid JSON: {}", e)))?;

        let object = match parsed {
            Value::Object(object) => object,
            other => {
                return Err(ServiceError::validation(format!(
                    "Query must be a JSON object, got {}",
                    json_type_name(&other)
                )))
            }
        };

        let mut body = if object.contains_key("query") {
            object
        } else {
            let mut wrapped = Map::new();
            wrapped.insert("query".to_string(), Value::Object(object));
            wrapped
        };

        let request = PageRequest::offset(
            Some(body.get("size").and_then(Value::as_i64).unwrap_or(DEFAULT_SEARCH_SIZE)),
            body.get("from").and_then(Value::as_i64).unwrap_or(0),
        );
        let plan = self.paginator.plan(&request)?;
        body.insert("size".to_string(), json!(plan.limit));
        body.insert("from".to_string(), json!(plan.offset));

        self.search(&Value::Object(body), &plan).await
    }

    async fn search(&self, body: &Value, plan: &PagePlan) -> Result<PageResult<Entity>> {
        let url = join_segments(&self.base_url, [self.index.as_str(), "_search"])?;
        debug!("Searching {} with {}", self.index, body);

        let value = self
            .retry
            .run("search", OperationClass::Read, || {
                let request = self.auth.apply(self.http.post(url.clone())).json(body);
                async move {
                    let response = send(&self.http, SERVICE, request).await?;
                    read_json(SERVICE, response).await
                }
            })
            .await?;

        let response: SearchResponse = serde_json::from_value(value)?;
        let total = response.hits.total.map(|total| match total {
            Total::Object { value } => value,
            Total::Count(count) => count,
        });

        let items = response
            .hits
            .hits
            .into_iter()
            .map(|hit| {
                let mut fields = hit.source;
                if let Some(id) = hit.id {
                    fields.insert("_id".to_string(), Value::String(id));
                }
                Entity::new(fields)
            })
            .collect();

        Ok(self.paginator.interpret(items, plan, total))
    }
}

#[async_trait]
impl OperationsAdapter for ElasticsearchAdapter {
    fn name(&self) -> &str {
        SERVICE
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    async fn query(
        &self,
        predicate: &FilterPredicate,
        page: &PageRequest,
        order: Option<&OrderBy>,
    ) -> Result<PageResult<Entity>> {
        let q = encode(predicate, Dialect::Lucene)?;
        let plan = self.paginator.plan(page)?;

        let query = if q.is_empty() {
            json!({ "match_all": {} })
        } else {
            json!({ "query_string": { "query": q } })
        };

        let mut body = json!({
            "query": query,
            "from": plan.offset,
            "size": plan.limit,
        });

        if let Some(order) = order {
            let encoded = encode_order(order, Dialect::Lucene)?;
            let field = encoded.trim_start_matches(Dialect::Lucene.descending_marker());
            let direction = match order.direction {
                SortDirection::Ascending => "asc",
                SortDirection::Descending => "desc",
            };
            let mut sort = Map::new();
            sort.insert(field.to_string(), json!({ "order": direction }));
            body["sort"] = Value::Array(vec![Value::Object(sort)]);
        }

        self.search(&body, &plan).await
    }
}
