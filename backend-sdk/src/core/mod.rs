//! Core abstractions for the Backend SDK
//!
//! - `OperationsAdapter`: the capability surface every backend implements
//! - `Entity`: a backend record as a field mapping
//! - `ClientBuilder` / `Auth`: HTTP client construction

pub mod builder;
pub use builder::{Auth, ClientBuilder};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ServiceError};
use crate::pagination::{PageRequest, PageResult};
use crate::query::{FilterPredicate, OrderBy};

/// Field name to value mapping
pub type Fields = serde_json::Map<String, Value>;

/// A backend record: incident, case, repository, file or log record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(pub Fields);

impl Entity {
    pub fn new(fields: Fields) -> Self {
        Self(fields)
    }

    /// Build an entity from a JSON value, rejecting non-objects
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(ServiceError::unknown(format!(
                "Expected a JSON object for an entity, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Look up a field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// A field rendered as a string, when it is a string or number
    pub fn get_str(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// The record's number or identifier, whichever the backend provides
    pub fn identifier(&self) -> Option<String> {
        ["number", "identifier", "sys_id", "id", "_id", "full_name", "path"]
            .iter()
            .find_map(|field| self.get_str(field))
    }

    /// The record's state, if it has one
    pub fn state(&self) -> Option<String> {
        self.get_str("state")
    }

    pub fn fields(&self) -> &Fields {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Fields> for Entity {
    fn from(fields: Fields) -> Self {
        Self(fields)
    }
}

/// Capabilities a backend may implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Create,
    Read,
    Update,
    Query,
    Comment,
    Transition,
    Assign,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Capability::Create => "create",
            Capability::Read => "read",
            Capability::Update => "update",
            Capability::Query => "query",
            Capability::Comment => "comment",
            Capability::Transition => "transition",
            Capability::Assign => "assign",
        };
        f.write_str(name)
    }
}

/// Who can see a comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Work notes, visible to agents only
    Internal,
    /// Visible to the customer
    Customer,
}

/// Target of an assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignee {
    pub user: String,
    pub group: Option<String>,
}

/// Acknowledgement for operations that do not return the updated record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub identifier: String,
    pub message: String,
}

fn unsupported(adapter: &str, capability: Capability) -> ServiceError {
    ServiceError::unsupported(format!("{} does not support {}", adapter, capability))
}

/// Uniform capability surface over one backend
///
/// The only component that performs backend I/O. Implementations are
/// stateless apart from their connection pool and are safe to call
/// concurrently. Unimplemented capabilities fail with `UnsupportedOperation`.
#[async_trait]
pub trait OperationsAdapter: Send + Sync {
    /// Adapter name, used in logs and errors
    fn name(&self) -> &str;

    /// Capabilities this backend implements
    fn capabilities(&self) -> &[Capability];

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    async fn create(&self, _fields: Fields) -> Result<Entity> {
        Err(unsupported(self.name(), Capability::Create))
    }

    async fn read(&self, _identifier: &str) -> Result<Entity> {
        Err(unsupported(self.name(), Capability::Read))
    }

    async fn update(&self, _identifier: &str, _fields: Fields) -> Result<Entity> {
        Err(unsupported(self.name(), Capability::Update))
    }

    async fn query(
        &self,
        _predicate: &FilterPredicate,
        _page: &PageRequest,
        _order: Option<&OrderBy>,
    ) -> Result<PageResult<Entity>> {
        Err(unsupported(self.name(), Capability::Query))
    }

    async fn comment(&self, _identifier: &str, _text: &str, _visibility: Visibility) -> Result<Ack> {
        Err(unsupported(self.name(), Capability::Comment))
    }

    async fn transition(&self, _identifier: &str, _target_state: &str, _metadata: Fields) -> Result<Entity> {
        Err(unsupported(self.name(), Capability::Transition))
    }

    async fn assign(&self, _identifier: &str, _assignee: &Assignee) -> Result<Ack> {
        Err(unsupported(self.name(), Capability::Assign))
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
