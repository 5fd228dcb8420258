//! Predefined case queries and incident state codes

use std::fmt;

use crate::error::{Result, ServiceError};
use crate::query::{FilterPredicate, OrderBy};

/// Incident-table state codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentState {
    New,
    InProgress,
    OnHold,
    Resolved,
    Closed,
    Canceled,
    /// Any other numeric code the instance defines
    Other(u32),
}

impl IncidentState {
    pub fn code(self) -> u32 {
        match self {
            IncidentState::New => 1,
            IncidentState::InProgress => 2,
            IncidentState::OnHold => 3,
            IncidentState::Resolved => 6,
            IncidentState::Closed => 7,
            IncidentState::Canceled => 8,
            IncidentState::Other(code) => code,
        }
    }

    /// Parse a state name (`in_progress`, `In Progress`) or a numeric code
    pub fn resolve(target: &str) -> Result<Self> {
        let normalized = target.trim().to_lowercase().replace([' ', '-'], "_");

        let state = match normalized.as_str() {
            "new" => IncidentState::New,
            "in_progress" | "work_in_progress" => IncidentState::InProgress,
            "on_hold" => IncidentState::OnHold,
            "resolved" => IncidentState::Resolved,
            "closed" => IncidentState::Closed,
            "canceled" | "cancelled" => IncidentState::Canceled,
            other => match other.parse::<u32>() {
                Ok(code) => IncidentState::Other(code),
                Err(_) => {
                    return Err(ServiceError::validation(format!(
                        "Unknown state '{}'; expected new, in_progress, on_hold, resolved, closed, canceled or a numeric code",
                        target
                    )))
                }
            },
        };

        Ok(state)
    }
}

impl fmt::Display for IncidentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// The case queries the assistant offers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CannedQuery {
    /// Not resolved and not closed, most recently updated first
    Open,
    /// Priority 1 or 2 and still open
    HighPriority,
    /// Text match across short and long description
    Search(String),
    ByContact(String),
    ByAccount(String),
}

impl CannedQuery {
    pub fn predicate(&self) -> Result<FilterPredicate> {
        let open = || {
            vec![
                FilterPredicate::ne("state", IncidentState::Resolved.code() as i64),
                FilterPredicate::ne("state", IncidentState::Closed.code() as i64),
            ]
        };

        Ok(match self {
            CannedQuery::Open => FilterPredicate::and(open()),
            CannedQuery::HighPriority => {
                let mut children = vec![FilterPredicate::or(vec![
                    FilterPredicate::eq("priority", 1),
                    FilterPredicate::eq("priority", 2),
                ])];
                children.extend(open());
                FilterPredicate::and(children)
            }
            CannedQuery::Search(text) => {
                let text = non_empty(text, "search_text")?;
                FilterPredicate::or(vec![
                    FilterPredicate::contains("short_description", text),
                    FilterPredicate::contains("description", text),
                ])
            }
            CannedQuery::ByContact(id) => FilterPredicate::eq("contact", non_empty(id, "contact_sys_id")?),
            CannedQuery::ByAccount(id) => FilterPredicate::eq("account", non_empty(id, "account_sys_id")?),
        })
    }

    pub fn order(&self) -> OrderBy {
        match self {
            CannedQuery::Open | CannedQuery::Search(_) => OrderBy::desc("sys_updated_on"),
            CannedQuery::HighPriority => OrderBy::asc("priority"),
            CannedQuery::ByContact(_) | CannedQuery::ByAccount(_) => OrderBy::desc("sys_created_on"),
        }
    }
}

fn non_empty<'a>(value: &'a str, name: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        Err(ServiceError::validation(format!("{} must not be empty", name)))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{encode, encode_order, Dialect};

    #[test]
    fn test_canned_queries_encode() {
        let cases = [
            (CannedQuery::Open, "state!=6^state!=7", "^sys_updated_on"),
            (
                CannedQuery::HighPriority,
                "priority=1^ORpriority=2^state!=6^state!=7",
                "priority",
            ),
            (
                CannedQuery::Search("vpn".to_string()),
                "short_descriptionLIKEvpn^ORdescriptionLIKEvpn",
                "^sys_updated_on",
            ),
            (CannedQuery::ByContact("abc".to_string()), "contact=abc", "^sys_created_on"),
            (CannedQuery::ByAccount("def".to_string()), "account=def", "^sys_created_on"),
        ];

        for (query, expected, order) in cases {
            assert_eq!(encode(&query.predicate().unwrap(), Dialect::ServiceNow).unwrap(), expected);
            assert_eq!(encode_order(&query.order(), Dialect::ServiceNow).unwrap(), order);
        }
    }

    #[test]
    fn test_search_requires_text() {
        assert!(CannedQuery::Search("  ".to_string()).predicate().is_err());
    }

    #[test]
    fn test_state_resolution() {
        assert_eq!(IncidentState::resolve("Resolved").unwrap().code(), 6);
        assert_eq!(IncidentState::resolve("in progress").unwrap().code(), 2);
        assert_eq!(IncidentState::resolve("7").unwrap(), IncidentState::Other(7));
        assert!(IncidentState::resolve("done-ish").is_err());
    }
}
