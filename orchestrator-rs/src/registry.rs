//! Tool Registry
//!
//! Declarative mapping from tool name to parameter schema and handler,
//! populated once at startup. The registry does no business logic: it looks
//! tools up and validates arguments against their schemas.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use backend_sdk::{OperationClass, PageRequest, ServiceError};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Primitive parameter types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// One parameter of a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub description: String,
    pub param_type: ParamType,
    pub required: bool,
    /// Applied when an optional parameter is absent
    pub default: Option<Value>,
    /// Allowed values, when the parameter is an enumeration
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
}

impl ParameterSpec {
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            param_type,
            required: true,
            default: None,
            allowed: Vec::new(),
        }
    }

    pub fn optional(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn one_of(mut self, allowed: &[&str]) -> Self {
        self.allowed = allowed.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Check and coerce one supplied value
    ///
    /// Models often send numbers and booleans as strings; those are parsed.
    fn coerce(&self, value: Value) -> Result<Value, RegistryError> {
        let invalid = |reason: String| RegistryError::Validation {
            parameter: self.name.clone(),
            reason,
        };

        let coerced = match (self.param_type, value) {
            (ParamType::String, Value::String(s)) => Value::String(s),
            (ParamType::String, v @ (Value::Number(_) | Value::Bool(_))) => Value::String(v.to_string()),

            (ParamType::Integer, Value::Number(n)) => match n.as_i64() {
                Some(i) => json!(i),
                None => match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => json!(f as i64),
                    _ => return Err(invalid(format!("expected an integer, got {}", n))),
                },
            },
            (ParamType::Integer, Value::String(s)) => match s.trim().parse::<i64>() {
                Ok(i) => json!(i),
                Err(_) => return Err(invalid(format!("expected an integer, got '{}'", s))),
            },

            (ParamType::Number, Value::Number(n)) => Value::Number(n),
            (ParamType::Number, Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(f) if f.is_finite() => json!(f),
                _ => return Err(invalid(format!("expected a number, got '{}'", s))),
            },

            (ParamType::Boolean, Value::Bool(b)) => Value::Bool(b),
            (ParamType::Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Value::Bool(true),
                "false" | "no" | "0" => Value::Bool(false),
                _ => return Err(invalid(format!("expected a boolean, got '{}'", s))),
            },

            (expected, other) => {
                return Err(invalid(format!(
                    "expected {}, got {}",
                    expected,
                    json_type(&other)
                )))
            }
        };

        if !self.allowed.is_empty() {
            let text = coerced.as_str().map(str::to_string).unwrap_or_else(|| coerced.to_string());
            if !self.allowed.iter().any(|a| *a == text) {
                return Err(invalid(format!(
                    "'{}' is not one of {}",
                    text,
                    self.allowed.join(", ")
                )));
            }
        }

        Ok(coerced)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Name, description and parameter schema of a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
    /// Whether the underlying backend call has side effects
    pub operation_class: OperationClass,
}

impl ToolDefinition {
    pub fn new(name: &str, description: &str, operation_class: OperationClass) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: Vec::new(),
            operation_class,
        }
    }

    pub fn param(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    /// JSON Schema object describing the parameters
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        for spec in &self.parameters {
            let mut property = Map::new();
            property.insert("type".to_string(), json!(spec.param_type.to_string()));
            property.insert("description".to_string(), json!(spec.description));
            if let Some(ref default) = spec.default {
                property.insert("default".to_string(), default.clone());
            }
            if !spec.allowed.is_empty() {
                property.insert("enum".to_string(), json!(spec.allowed));
            }
            properties.insert(spec.name.clone(), Value::Object(property));
        }

        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|spec| spec.required)
            .map(|spec| spec.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Invalid parameter '{parameter}': {reason}")]
    Validation { parameter: String, reason: String },
}

impl From<RegistryError> for ServiceError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::Validation { .. } => ServiceError::validation(error.to_string()),
            other => ServiceError::unknown(other.to_string()),
        }
    }
}

/// Validated arguments with typed accessors
///
/// Every required parameter is present and every value has its declared
/// type, so accessors only fail for names the schema does not declare.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments(Map<String, Value>);

impl ToolArguments {
    pub fn new(values: Map<String, Value>) -> Self {
        Self(values)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// A required string parameter
    pub fn require_str(&self, name: &str) -> backend_sdk::Result<&str> {
        self.str(name)
            .ok_or_else(|| ServiceError::validation(format!("Missing required parameter '{}'", name)))
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    /// Pagination from the conventional `page_size` / `page_number` parameters
    pub fn page_request(&self) -> PageRequest {
        PageRequest::page(self.i64("page_size"), self.i64("page_number").unwrap_or(1))
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

/// Executes one tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: ToolArguments) -> backend_sdk::Result<Value>;
}

/// A definition paired with its handler
#[derive(Clone)]
pub struct RegisteredTool {
    pub definition: ToolDefinition,
    pub handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

impl RegisteredTool {
    /// Validate raw model arguments against the schema
    ///
    /// Missing required parameters and type mismatches fail with the
    /// offending parameter name; absent optional parameters take their
    /// default; parameters the schema does not declare are dropped.
    pub fn validate(&self, raw: &Map<String, Value>) -> Result<ToolArguments, RegistryError> {
        let mut validated = Map::new();

        for spec in &self.definition.parameters {
            match raw.get(&spec.name) {
                Some(value) if !value.is_null() => {
                    validated.insert(spec.name.clone(), spec.coerce(value.clone())?);
                }
                _ if spec.required => {
                    return Err(RegistryError::Validation {
                        parameter: spec.name.clone(),
                        reason: "missing required parameter".to_string(),
                    })
                }
                _ => {
                    if let Some(ref default) = spec.default {
                        validated.insert(spec.name.clone(), default.clone());
                    }
                }
            }
        }

        for name in raw.keys() {
            if !self.definition.parameters.iter().any(|spec| &spec.name == name) {
                debug!("Ignoring undeclared parameter '{}' for tool {}", name, self.definition.name);
            }
        }

        Ok(ToolArguments(validated))
    }
}

/// Lookup table of registered tools
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; names are unique
    pub fn register(&mut self, definition: ToolDefinition, handler: Arc<dyn ToolHandler>) -> Result<(), RegistryError> {
        if self.index.contains_key(&definition.name) {
            return Err(RegistryError::DuplicateTool(definition.name));
        }

        info!(
            "Tool {} registered ({} parameters, {})",
            definition.name,
            definition.parameters.len(),
            definition.operation_class
        );

        self.index.insert(definition.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool { definition, handler });
        Ok(())
    }

    /// Look up a tool by name
    pub fn resolve(&self, name: &str) -> Result<&RegisteredTool, RegistryError> {
        self.index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }

    /// Definitions in registration order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|tool| tool.definition.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
