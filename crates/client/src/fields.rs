use crate::{ConformanceClass, Error, Result, Transport};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stac::api::Fields;

/// The fields object as item search endpoints expect it.
#[derive(Debug, Serialize, Deserialize)]
struct FieldsObject {
    #[serde(default, alias = "include")]
    includes: Vec<String>,

    #[serde(default, alias = "exclude")]
    excludes: Vec<String>,
}

/// Anything that can be turned into [Fields].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldsLike {
    /// A comma-delimited string, e.g. `id,-properties`.
    Text(String),

    /// A list of `+field`, `-field`, or `field` strings.
    Shorthand(Vec<String>),

    /// Already-structured fields.
    Structured(Fields),

    /// A JSON value holding any of the above.
    Value(Value),
}

/// Normalizes fields into their structured form.
///
/// The API must conform to the fields extension.
///
/// # Examples
///
/// ```
/// use stac_client::{StacApiIo, normalize_fields};
///
/// let io = StacApiIo::new().unwrap();
/// let fields = normalize_fields(["id", "-properties", "+geometry"], &io).unwrap();
/// assert_eq!(fields.include, vec!["id", "geometry"]);
/// assert_eq!(fields.exclude, vec!["properties"]);
/// ```
pub fn normalize_fields<T>(fields: impl Into<FieldsLike>, transport: &T) -> Result<Fields>
where
    T: Transport + ?Sized,
{
    transport.assert_conforms_to(ConformanceClass::Fields)?;
    parse_fields(fields.into())
}

fn parse_fields(fields: FieldsLike) -> Result<Fields> {
    match fields {
        FieldsLike::Text(s) => Ok(from_parts(s.split(','))),
        FieldsLike::Shorthand(parts) => Ok(from_parts(parts.iter().map(String::as_str))),
        FieldsLike::Structured(fields) => Ok(fields),
        FieldsLike::Value(Value::String(s)) => Ok(from_parts(s.split(','))),
        FieldsLike::Value(Value::Array(values)) => {
            let mut parts = Vec::with_capacity(values.len());
            for value in values {
                match value {
                    Value::String(s) => parts.push(s),
                    _ => return Err(Error::InvalidFields(value.to_string())),
                }
            }
            Ok(from_parts(parts.iter().map(String::as_str)))
        }
        FieldsLike::Value(value @ Value::Object(_)) => {
            serde_json::from_value::<FieldsObject>(value.clone())
                .map(Fields::from)
                .map_err(|_| Error::InvalidFields(value.to_string()))
        }
        FieldsLike::Value(value) => Err(Error::InvalidFields(value.to_string())),
    }
}

/// Renders fields in their GET form, e.g. `+id,-properties`.
///
/// # Examples
///
/// ```
/// use stac_client::{Fields, fields_to_string};
///
/// let fields = Fields {
///     include: vec!["id".to_string()],
///     exclude: vec!["properties".to_string()],
/// };
/// assert_eq!(fields_to_string(&fields), "+id,-properties");
/// ```
pub fn fields_to_string(fields: &Fields) -> String {
    fields
        .include
        .iter()
        .map(|field| format!("+{field}"))
        .chain(fields.exclude.iter().map(|field| format!("-{field}")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Serializes optional [Fields] as `{"includes": [..], "excludes": [..]}`.
pub(crate) mod wire {
    use super::{Fields, FieldsObject};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub(crate) fn serialize<S: Serializer>(
        fields: &Option<Fields>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        fields
            .as_ref()
            .map(|fields| FieldsObject {
                includes: fields.include.clone(),
                excludes: fields.exclude.clone(),
            })
            .serialize(serializer)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Fields>, D::Error> {
        Ok(Option::<FieldsObject>::deserialize(deserializer)?.map(Fields::from))
    }
}

impl From<FieldsObject> for Fields {
    fn from(object: FieldsObject) -> Fields {
        Fields {
            include: object.includes,
            exclude: object.excludes,
        }
    }
}

fn from_parts<'a>(parts: impl Iterator<Item = &'a str>) -> Fields {
    let mut fields = Fields::default();
    for part in parts.filter(|part| !part.is_empty()) {
        if let Some(field) = part.strip_prefix('-') {
            fields.exclude.push(field.to_string());
        } else {
            fields.include.push(part.strip_prefix('+').unwrap_or(part).to_string());
        }
    }
    fields
}

impl From<&str> for FieldsLike {
    fn from(s: &str) -> FieldsLike {
        FieldsLike::Text(s.to_string())
    }
}

impl From<String> for FieldsLike {
    fn from(s: String) -> FieldsLike {
        FieldsLike::Text(s)
    }
}

impl From<Vec<String>> for FieldsLike {
    fn from(parts: Vec<String>) -> FieldsLike {
        FieldsLike::Shorthand(parts)
    }
}

impl From<Vec<&str>> for FieldsLike {
    fn from(parts: Vec<&str>) -> FieldsLike {
        FieldsLike::Shorthand(parts.into_iter().map(String::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for FieldsLike {
    fn from(parts: [&str; N]) -> FieldsLike {
        FieldsLike::Shorthand(parts.into_iter().map(String::from).collect())
    }
}

impl From<Fields> for FieldsLike {
    fn from(fields: Fields) -> FieldsLike {
        FieldsLike::Structured(fields)
    }
}

impl From<Value> for FieldsLike {
    fn from(value: Value) -> FieldsLike {
        FieldsLike::Value(value)
    }
}
