use crate::{Error, Result};
use serde_json::{Map, Value};

/// Shorthand comparison operators and their query extension opcodes.
///
/// Order matters: the first operator that splits a shorthand string into
/// exactly two pieces wins.
pub const OPERATORS: [(&str, &str); 5] = [
    (">=", "gte"),
    ("<=", "lte"),
    ("=", "eq"),
    (">", "gt"),
    ("<", "lt"),
];

/// Anything that can be turned into a query extension object.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryLike {
    /// A query object, e.g. `{"eo:cloud_cover": {"lt": 10}}`.
    Map(Map<String, Value>),

    /// Shorthand expressions, e.g. `["eo:cloud_cover<10", "gsd=30"]`.
    Shorthand(Vec<String>),

    /// A JSON value holding either of the above.
    Value(Value),
}

/// Compiles a query into its canonical object form.
///
/// # Examples
///
/// ```
/// use stac_client::normalize_query;
/// use serde_json::json;
///
/// let query = normalize_query(["eo:cloud_cover<=10", "eo:cloud_cover>=2"]).unwrap();
/// assert_eq!(
///     serde_json::Value::Object(query),
///     json!({"eo:cloud_cover": {"lte": "10", "gte": "2"}})
/// );
/// ```
pub fn normalize_query(query: impl Into<QueryLike>) -> Result<Map<String, Value>> {
    match query.into() {
        QueryLike::Map(map) => Ok(map),
        QueryLike::Shorthand(expressions) => compile(&expressions),
        QueryLike::Value(Value::Object(map)) => Ok(map),
        QueryLike::Value(Value::String(s)) => compile(&[s]),
        QueryLike::Value(Value::Array(values)) => {
            let mut expressions = Vec::with_capacity(values.len());
            for value in values {
                match value {
                    Value::String(s) => expressions.push(s),
                    _ => return Err(Error::InvalidQuery(value.to_string())),
                }
            }
            compile(&expressions)
        }
        QueryLike::Value(value) => Err(Error::InvalidQuery(value.to_string())),
    }
}

/// Recursively merges `source` into `target`.
///
/// Nested objects are merged key by key, everything else in `source`
/// overwrites `target`.
///
/// # Examples
///
/// ```
/// use stac_client::merge_maps;
/// use serde_json::json;
///
/// let mut target = json!({"a": {"b": 1, "c": 2}}).as_object().unwrap().clone();
/// let source = json!({"a": {"c": 3}, "d": 4}).as_object().unwrap().clone();
/// merge_maps(&mut target, source);
/// assert_eq!(serde_json::Value::Object(target), json!({"a": {"b": 1, "c": 3}, "d": 4}));
/// ```
pub fn merge_maps(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(target)), Value::Object(source)) => merge_maps(target, source),
            (_, value) => {
                let _ = target.insert(key, value);
            }
        }
    }
}

fn compile(expressions: &[String]) -> Result<Map<String, Value>> {
    let mut query = Map::new();
    for expression in expressions {
        if let Some((field, opcode, value)) = split(expression) {
            let value = if field == "gsd" {
                value
                    .parse::<f64>()
                    .map(Value::from)
                    .map_err(|_| Error::InvalidQuery(expression.clone()))?
            } else {
                Value::String(value.to_string())
            };
            let mut comparison = Map::new();
            let _ = comparison.insert(opcode.to_string(), value);
            let mut clause = Map::new();
            let _ = clause.insert(field.to_string(), Value::Object(comparison));
            merge_maps(&mut query, clause);
        } else {
            tracing::debug!("skipping query expression without an operator: {expression}");
        }
    }
    Ok(query)
}

fn split(expression: &str) -> Option<(&str, &'static str, &str)> {
    OPERATORS.iter().find_map(|(operator, opcode)| {
        let mut parts = expression.split(operator);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(field), Some(value), None) => Some((field, *opcode, value)),
            _ => None,
        }
    })
}

impl From<Map<String, Value>> for QueryLike {
    fn from(map: Map<String, Value>) -> QueryLike {
        QueryLike::Map(map)
    }
}

impl From<&str> for QueryLike {
    fn from(s: &str) -> QueryLike {
        QueryLike::Shorthand(vec![s.to_string()])
    }
}

impl From<String> for QueryLike {
    fn from(s: String) -> QueryLike {
        QueryLike::Shorthand(vec![s])
    }
}

impl From<Vec<String>> for QueryLike {
    fn from(expressions: Vec<String>) -> QueryLike {
        QueryLike::Shorthand(expressions)
    }
}

impl From<Vec<&str>> for QueryLike {
    fn from(expressions: Vec<&str>) -> QueryLike {
        QueryLike::Shorthand(expressions.into_iter().map(String::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for QueryLike {
    fn from(expressions: [&str; N]) -> QueryLike {
        QueryLike::Shorthand(expressions.into_iter().map(String::from).collect())
    }
}

impl From<Value> for QueryLike {
    fn from(value: Value) -> QueryLike {
        QueryLike::Value(value)
    }
}
