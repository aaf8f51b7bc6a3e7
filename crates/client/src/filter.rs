use crate::{ConformanceClass, Error, Result, Transport};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

/// A filter expression, passed through to the server untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Filter {
    /// A cql2-text expression, e.g. `eo:cloud_cover < 10`.
    Cql2Text(String),

    /// A cql2-json expression.
    Cql2Json(Map<String, Value>),
}

/// The language of a [Filter].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterLang {
    /// `cql2-text`
    #[serde(rename = "cql2-text")]
    Cql2Text,

    /// `cql2-json`
    #[serde(rename = "cql2-json")]
    Cql2Json,
}

/// Checks that the API supports filtering and returns the filter unchanged.
pub fn normalize_filter<T>(filter: impl Into<Filter>, transport: &T) -> Result<Filter>
where
    T: Transport + ?Sized,
{
    transport.assert_conforms_to(ConformanceClass::Filter)?;
    Ok(filter.into())
}

/// Picks the filter language.
///
/// An explicit language always wins. Otherwise the language is inferred from
/// the shape of the filter.
///
/// # Examples
///
/// ```
/// use stac_client::{Filter, FilterLang, normalize_filter_lang};
///
/// let filter = Filter::from("id = 'an-id'");
/// assert_eq!(normalize_filter_lang(Some(&filter), None), Some(FilterLang::Cql2Text));
/// assert_eq!(normalize_filter_lang(None, Some(FilterLang::Cql2Text)), None);
/// ```
pub fn normalize_filter_lang(filter: Option<&Filter>, lang: Option<FilterLang>) -> Option<FilterLang> {
    let filter = filter?;
    lang.or(Some(match filter {
        Filter::Cql2Text(_) => FilterLang::Cql2Text,
        Filter::Cql2Json(_) => FilterLang::Cql2Json,
    }))
}

impl Filter {
    /// Returns the string used for this filter in a GET query string.
    ///
    /// Text filters are used as-is, json filters are encoded.
    pub fn to_query_value(&self) -> Result<String> {
        match self {
            Filter::Cql2Text(s) => Ok(s.clone()),
            Filter::Cql2Json(map) => serde_json::to_string(map).map_err(Error::from),
        }
    }
}

impl FilterLang {
    fn as_str(&self) -> &'static str {
        match self {
            FilterLang::Cql2Text => "cql2-text",
            FilterLang::Cql2Json => "cql2-json",
        }
    }
}

impl Display for FilterLang {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterLang {
    type Err = Error;

    fn from_str(s: &str) -> Result<FilterLang> {
        match s {
            "cql2-text" => Ok(FilterLang::Cql2Text),
            "cql2-json" => Ok(FilterLang::Cql2Json),
            _ => Err(Error::InvalidFilterLang(s.to_string())),
        }
    }
}

impl From<&str> for Filter {
    fn from(s: &str) -> Filter {
        Filter::Cql2Text(s.to_string())
    }
}

impl From<String> for Filter {
    fn from(s: String) -> Filter {
        Filter::Cql2Text(s)
    }
}

impl From<Map<String, Value>> for Filter {
    fn from(map: Map<String, Value>) -> Filter {
        Filter::Cql2Json(map)
    }
}

impl TryFrom<Value> for Filter {
    type Error = Error;

    fn try_from(value: Value) -> Result<Filter> {
        match value {
            Value::String(s) => Ok(Filter::Cql2Text(s)),
            Value::Object(map) => Ok(Filter::Cql2Json(map)),
            _ => Err(Error::InvalidFilter(value.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Filter, FilterLang, normalize_filter, normalize_filter_lang};
    use crate::{ConformanceClass, Error, StacApiIo};
    use serde_json::json;

    #[test]
    fn infer_lang() {
        let json: Filter = json!({"op": "=", "args": [{"property": "id"}, "an-id"]})
            .try_into()
            .unwrap();
        assert_eq!(
            normalize_filter_lang(Some(&json), None),
            Some(FilterLang::Cql2Json)
        );
        assert_eq!(
            normalize_filter_lang(Some(&json), Some(FilterLang::Cql2Text)),
            Some(FilterLang::Cql2Text)
        );
        assert_eq!(normalize_filter_lang(None, None), None);
    }

    #[test]
    fn serialize() {
        assert_eq!(
            serde_json::to_value(Filter::from("id = 'a'")).unwrap(),
            json!("id = 'a'")
        );
        assert_eq!(
            serde_json::to_value(FilterLang::Cql2Json).unwrap(),
            json!("cql2-json")
        );
    }

    #[test]
    fn query_value() {
        let filter: Filter = json!({"op": "isNull", "args": [{"property": "a"}]})
            .try_into()
            .unwrap();
        assert_eq!(
            filter.to_query_value().unwrap(),
            r#"{"op":"isNull","args":[{"property":"a"}]}"#
        );
        assert_eq!(Filter::from("a IS NULL").to_query_value().unwrap(), "a IS NULL");
    }

    #[test]
    fn parse_lang() {
        assert_eq!("cql2-text".parse::<FilterLang>().unwrap(), FilterLang::Cql2Text);
        assert!(matches!(
            "cql".parse::<FilterLang>().unwrap_err(),
            Error::InvalidFilterLang(_)
        ));
    }

    #[test]
    fn invalid_value() {
        assert!(matches!(
            Filter::try_from(json!(42)).unwrap_err(),
            Error::InvalidFilter(_)
        ));
    }

    #[test]
    fn requires_conformance() {
        let io = StacApiIo::new().unwrap();
        io.set_conformance(Some(vec![ConformanceClass::ItemSearch.uri()]));
        assert!(matches!(
            normalize_filter("id = 'a'", &io).unwrap_err(),
            Error::NotConformant(ConformanceClass::Filter)
        ));
    }
}
