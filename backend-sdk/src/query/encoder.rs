//! Dialect encoders for `FilterPredicate` trees

use super::{validate_field, Dialect, FilterPredicate, FilterValue, OrderBy, Operator, SortDirection};
use crate::error::{Result, ServiceError};

/// Characters with meaning in Lucene query syntax
const LUCENE_SPECIAL: &[char] = &[
    '+', '-', '=', '&', '|', '>', '<', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\', '/',
];

/// Encode a predicate tree into the native query string of `dialect`
///
/// An empty tree encodes to `""`.
pub fn encode(predicate: &FilterPredicate, dialect: Dialect) -> Result<String> {
    match encode_node(predicate, dialect)? {
        Some(fragment) => render_leading(fragment, dialect),
        None => Ok(String::new()),
    }
}

/// Encode an ordering directive, prefixing the dialect's descending marker
pub fn encode_order(order: &OrderBy, dialect: Dialect) -> Result<String> {
    validate_field(&order.field)?;
    Ok(match order.direction {
        SortDirection::Ascending => order.field.clone(),
        SortDirection::Descending => format!("{}{}", dialect.descending_marker(), order.field),
    })
}

/// An encoded subtree; negation blocks are joined with their own connective
enum Fragment {
    Plain(String),
    Negated(String),
}

fn encode_node(predicate: &FilterPredicate, dialect: Dialect) -> Result<Option<Fragment>> {
    match predicate {
        FilterPredicate::Condition { field, operator, value } => {
            validate_field(field)?;
            encode_condition(field, *operator, value, dialect, false).map(|s| Some(Fragment::Plain(s)))
        }
        FilterPredicate::And(children) => join(children, Connective::And, dialect),
        FilterPredicate::Or(children) => join(children, Connective::Or, dialect),
        FilterPredicate::Not(child) => {
            if child.is_empty() {
                return Err(ServiceError::validation("Cannot negate an empty predicate"));
            }

            if dialect == Dialect::GitHubSearch {
                return match child.as_ref() {
                    FilterPredicate::Condition { field, operator, value } => {
                        validate_field(field)?;
                        encode_condition(field, *operator, value, dialect, true).map(|s| Some(Fragment::Plain(s)))
                    }
                    _ => Err(ServiceError::validation(
                        "GitHub search can only negate a single qualifier",
                    )),
                };
            }

            let inner = match encode_node(child, dialect)? {
                Some(fragment) => render_leading(fragment, dialect)?,
                None => return Ok(None),
            };
            Ok(Some(Fragment::Negated(inner)))
        }
    }
}

#[derive(Clone, Copy)]
enum Connective {
    And,
    Or,
}

fn join(children: &[FilterPredicate], connective: Connective, dialect: Dialect) -> Result<Option<Fragment>> {
    let mut fragments = Vec::with_capacity(children.len());
    for child in children {
        if let Some(fragment) = encode_node(child, dialect)? {
            fragments.push(fragment);
        }
    }

    let mut iter = fragments.into_iter();
    let first = match iter.next() {
        Some(first) => first,
        None => return Ok(None),
    };

    let mut rest = iter.peekable();
    if rest.peek().is_none() {
        return Ok(Some(first));
    }

    let mut out = render_leading(first, dialect)?;
    for fragment in rest {
        match fragment {
            Fragment::Plain(s) => {
                out.push_str(separator(connective, dialect));
                out.push_str(&s);
            }
            Fragment::Negated(s) => {
                out.push_str(negated_separator(connective, dialect));
                out.push_str(&s);
            }
        }
    }

    Ok(Some(Fragment::Plain(out)))
}

fn separator(connective: Connective, dialect: Dialect) -> &'static str {
    match (dialect, connective) {
        (Dialect::ServiceNow, Connective::And) => "^",
        (Dialect::ServiceNow, Connective::Or) => "^OR",
        (Dialect::Lucene, Connective::And) => " AND ",
        (Dialect::Lucene, Connective::Or) => " OR ",
        (Dialect::GitHubSearch, Connective::And) => " ",
        (Dialect::GitHubSearch, Connective::Or) => " OR ",
    }
}

fn negated_separator(connective: Connective, dialect: Dialect) -> &'static str {
    match (dialect, connective) {
        (Dialect::ServiceNow, _) => "^NQ",
        (Dialect::Lucene, Connective::And) => " AND NOT ",
        (Dialect::Lucene, Connective::Or) => " OR NOT ",
        // GitHub negations are always encoded as plain `-qualifier` fragments
        (Dialect::GitHubSearch, connective) => separator(connective, Dialect::GitHubSearch),
    }
}

fn render_leading(fragment: Fragment, dialect: Dialect) -> Result<String> {
    match (fragment, dialect) {
        (Fragment::Plain(s), _) => Ok(s),
        (Fragment::Negated(_), Dialect::ServiceNow) => Err(ServiceError::validation(
            "A ServiceNow encoded query cannot start with a negation block",
        )),
        (Fragment::Negated(s), Dialect::Lucene) => Ok(format!("NOT {}", s)),
        (Fragment::Negated(s), Dialect::GitHubSearch) => Ok(format!("-{}", s)),
    }
}

fn encode_condition(
    field: &str,
    operator: Operator,
    value: &FilterValue,
    dialect: Dialect,
    negated: bool,
) -> Result<String> {
    match dialect {
        Dialect::ServiceNow => servicenow_condition(field, operator, value),
        Dialect::Lucene => lucene_condition(field, operator, value),
        Dialect::GitHubSearch => github_condition(field, operator, value, negated),
    }
}

fn servicenow_condition(field: &str, operator: Operator, value: &FilterValue) -> Result<String> {
    let value = value.to_string();
    if value.contains('^') {
        return Err(ServiceError::validation(format!(
            "Value for '{}' must not contain '^'",
            field
        )));
    }

    let token = match operator {
        Operator::Equals => "=",
        Operator::NotEquals => "!=",
        Operator::Contains => "LIKE",
        Operator::GreaterThan => ">",
        Operator::LessThan => "<",
        Operator::GreaterOrEqual => ">=",
        Operator::LessOrEqual => "<=",
    };

    Ok(format!("{}{}{}", field, token, value))
}

fn lucene_condition(field: &str, operator: Operator, value: &FilterValue) -> Result<String> {
    let term = value.to_string();

    Ok(match operator {
        Operator::Equals => format!("{}:{}", field, lucene_term(&term)),
        Operator::NotEquals => format!("NOT {}:{}", field, lucene_term(&term)),
        Operator::Contains => format!("{}:*{}*", field, lucene_escape(&term, true)),
        Operator::GreaterThan => format!("{}:>{}", field, lucene_term(&term)),
        Operator::LessThan => format!("{}:<{}", field, lucene_term(&term)),
        Operator::GreaterOrEqual => format!("{}:>={}", field, lucene_term(&term)),
        Operator::LessOrEqual => format!("{}:<={}", field, lucene_term(&term)),
    })
}

/// Quote terms with whitespace, escape everything else
fn lucene_term(term: &str) -> String {
    if term.is_empty() {
        return "\"\"".to_string();
    }

    if term.chars().any(char::is_whitespace) {
        let escaped = term.replace('\\', "\\\\").replace('"', "\\\"");
        return format!("\"{}\"", escaped);
    }

    lucene_escape(term, false)
}

fn lucene_escape(term: &str, escape_whitespace: bool) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if LUCENE_SPECIAL.contains(&c) || (escape_whitespace && c.is_whitespace()) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn github_condition(field: &str, operator: Operator, value: &FilterValue, negated: bool) -> Result<String> {
    let term = value.to_string();
    if term.contains('"') {
        return Err(ServiceError::validation(format!(
            "Value for '{}' must not contain '\"'",
            field
        )));
    }

    let term = if term.is_empty() || term.chars().any(char::is_whitespace) {
        format!("\"{}\"", term)
    } else {
        term
    };

    let (negate, comparison) = match operator {
        Operator::Equals => (negated, ""),
        Operator::NotEquals => (!negated, ""),
        Operator::Contains => {
            return Err(ServiceError::validation(format!(
                "GitHub search cannot express 'contains' on '{}'",
                field
            )))
        }
        Operator::GreaterThan => (negated, ">"),
        Operator::LessThan => (negated, "<"),
        Operator::GreaterOrEqual => (negated, ">="),
        Operator::LessOrEqual => (negated, "<="),
    };

    Ok(format!("{}{}:{}{}", if negate { "-" } else { "" }, field, comparison, term))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn open_high_priority() -> FilterPredicate {
        FilterPredicate::and(vec![
            FilterPredicate::or(vec![FilterPredicate::eq("priority", 1), FilterPredicate::eq("priority", 2)]),
            FilterPredicate::ne("state", 6),
            FilterPredicate::ne("state", 7),
        ])
    }

    #[test]
    fn test_empty_tree_encodes_to_empty_string() {
        for dialect in [Dialect::ServiceNow, Dialect::Lucene, Dialect::GitHubSearch] {
            assert_eq!(encode(&FilterPredicate::empty(), dialect).unwrap(), "");
            assert_eq!(
                encode(&FilterPredicate::or(vec![FilterPredicate::empty()]), dialect).unwrap(),
                ""
            );
        }
    }

    #[test]
    fn test_servicenow_operators_and_connectives() {
        let encoded = encode(&open_high_priority(), Dialect::ServiceNow).unwrap();
        assert_eq!(encoded, "priority=1^ORpriority=2^state!=6^state!=7");

        let search = FilterPredicate::or(vec![
            FilterPredicate::contains("short_description", "vpn"),
            FilterPredicate::contains("description", "vpn"),
        ]);
        assert_eq!(
            encode(&search, Dialect::ServiceNow).unwrap(),
            "short_descriptionLIKEvpn^ORdescriptionLIKEvpn"
        );
    }

    #[test]
    fn test_servicenow_negation_block() {
        let predicate = FilterPredicate::and(vec![
            FilterPredicate::eq("active", true),
            FilterPredicate::not(FilterPredicate::eq("priority", 5)),
        ]);
        assert_eq!(encode(&predicate, Dialect::ServiceNow).unwrap(), "active=true^NQpriority=5");

        let leading = FilterPredicate::not(FilterPredicate::eq("priority", 5));
        assert_eq!(encode(&leading, Dialect::ServiceNow).unwrap_err().kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn test_servicenow_rejects_separator_in_value() {
        let err = encode(&FilterPredicate::eq("short_description", "a^ORb"), Dialect::ServiceNow).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn test_reserved_field_names_rejected() {
        for dialect in [Dialect::ServiceNow, Dialect::Lucene, Dialect::GitHubSearch] {
            let err = encode(&FilterPredicate::eq("state^ORpriority", 1), dialect).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValidationError);
            assert!(err.message().contains("state^ORpriority"));
        }
    }

    #[test]
    fn test_lucene_encoding() {
        let predicate = FilterPredicate::and(vec![
            FilterPredicate::eq("level", "ERROR"),
            FilterPredicate::contains("message", "disk full"),
            FilterPredicate::condition("http.status", Operator::GreaterOrEqual, 500),
            FilterPredicate::not(FilterPredicate::eq("host", "web-01")),
        ]);

        assert_eq!(
            encode(&predicate, Dialect::Lucene).unwrap(),
            r"level:ERROR AND message:*disk\ full* AND http.status:>=500 AND NOT host:web\-01"
        );
    }

    #[test]
    fn test_lucene_quotes_whitespace_and_leading_not() {
        assert_eq!(
            encode(&FilterPredicate::eq("message", "connection \"refused\""), Dialect::Lucene).unwrap(),
            r#"message:"connection \"refused\"""#
        );
        assert_eq!(
            encode(&FilterPredicate::not(FilterPredicate::eq("level", "INFO")), Dialect::Lucene).unwrap(),
            "NOT level:INFO"
        );
        assert_eq!(
            encode(&FilterPredicate::ne("level", "INFO"), Dialect::Lucene).unwrap(),
            "NOT level:INFO"
        );
    }

    #[test]
    fn test_github_qualifiers() {
        let predicate = FilterPredicate::and(vec![
            FilterPredicate::eq("user", "octocat"),
            FilterPredicate::condition("stars", Operator::GreaterThan, 10),
            FilterPredicate::not(FilterPredicate::eq("archived", true)),
        ]);
        assert_eq!(
            encode(&predicate, Dialect::GitHubSearch).unwrap(),
            "user:octocat stars:>10 -archived:true"
        );

        let either = FilterPredicate::or(vec![FilterPredicate::eq("language", "rust"), FilterPredicate::eq("language", "go")]);
        assert_eq!(encode(&either, Dialect::GitHubSearch).unwrap(), "language:rust OR language:go");
    }

    #[test]
    fn test_github_rejects_contains_and_compound_negation() {
        let err = encode(&FilterPredicate::contains("name", "cli"), Dialect::GitHubSearch).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);

        let compound = FilterPredicate::not(FilterPredicate::and(vec![
            FilterPredicate::eq("user", "a"),
            FilterPredicate::eq("user", "b"),
        ]));
        assert_eq!(encode(&compound, Dialect::GitHubSearch).unwrap_err().kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn test_negating_empty_tree_is_rejected() {
        let err = encode(&FilterPredicate::not(FilterPredicate::empty()), Dialect::Lucene).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn test_encoding_is_deterministic_and_order_preserving() {
        let forward = FilterPredicate::or(vec![FilterPredicate::eq("a", 1), FilterPredicate::eq("b", 2)]);
        let backward = FilterPredicate::or(vec![FilterPredicate::eq("b", 2), FilterPredicate::eq("a", 1)]);

        for dialect in [Dialect::ServiceNow, Dialect::Lucene, Dialect::GitHubSearch] {
            let first = encode(&forward, dialect).unwrap();
            assert_eq!(first, encode(&forward, dialect).unwrap());
            assert_ne!(first, encode(&backward, dialect).unwrap());
        }
    }

    #[test]
    fn test_order_markers() {
        assert_eq!(encode_order(&OrderBy::desc("sys_updated_on"), Dialect::ServiceNow).unwrap(), "^sys_updated_on");
        assert_eq!(encode_order(&OrderBy::desc("@timestamp"), Dialect::Lucene).unwrap(), "-@timestamp");
        assert_eq!(encode_order(&OrderBy::desc("time stamp"), Dialect::Lucene).unwrap_err().kind(), ErrorKind::ValidationError);
        assert_eq!(encode_order(&OrderBy::asc("stars"), Dialect::GitHubSearch).unwrap(), "stars");
    }
}
