use crate::{ConformanceClass, Error, Result, Transport};
use serde_json::Value;
use stac::api::{Direction, Sortby};

/// Anything that can be turned into a list of [Sortby].
#[derive(Debug, Clone, PartialEq)]
pub enum SortbyLike {
    /// A comma-delimited string, e.g. `-datetime,+id`.
    Text(String),

    /// A list of `+field`, `-field`, or `field` strings.
    Shorthand(Vec<String>),

    /// Already-structured sort fields.
    Structured(Vec<Sortby>),

    /// A JSON value holding any of the above.
    Value(Value),
}

/// Normalizes a sortby into its structured form.
///
/// The API must conform to the sort extension.
///
/// # Examples
///
/// ```
/// use stac_client::{StacApiIo, Sortby, normalize_sortby};
///
/// let io = StacApiIo::new().unwrap();
/// let sortby = normalize_sortby(["-a", "+b", "c"], &io).unwrap();
/// assert_eq!(sortby, vec![Sortby::desc("a"), Sortby::asc("b"), Sortby::asc("c")]);
/// ```
pub fn normalize_sortby<T>(sortby: impl Into<SortbyLike>, transport: &T) -> Result<Vec<Sortby>>
where
    T: Transport + ?Sized,
{
    transport.assert_conforms_to(ConformanceClass::Sort)?;
    parse_sortby(sortby.into())
}

/// Renders sort fields in their GET form, e.g. `-datetime,+id`.
///
/// # Examples
///
/// ```
/// use stac_client::{Sortby, sortby_to_string};
///
/// let sortby = vec![Sortby::desc("a"), Sortby::asc("b")];
/// assert_eq!(sortby_to_string(&sortby), "-a,+b");
/// ```
pub fn sortby_to_string(sortby: &[Sortby]) -> String {
    sortby
        .iter()
        .map(|sortby| match sortby.direction {
            Direction::Ascending => format!("+{}", sortby.field),
            Direction::Descending => format!("-{}", sortby.field),
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_sortby(sortby: SortbyLike) -> Result<Vec<Sortby>> {
    match sortby {
        SortbyLike::Text(s) => Ok(s.split(',').map(parse_part).collect()),
        SortbyLike::Shorthand(parts) if !parts.is_empty() => {
            Ok(parts.iter().map(|part| parse_part(part)).collect())
        }
        SortbyLike::Structured(sortby) if !sortby.is_empty() => Ok(sortby),
        SortbyLike::Value(Value::String(s)) => parse_sortby(SortbyLike::Text(s)),
        SortbyLike::Value(Value::Array(values)) => match values.first() {
            Some(Value::String(_)) => values
                .into_iter()
                .map(|value| match value {
                    Value::String(s) => Ok(parse_part(&s)),
                    _ => Err(Error::InvalidSortby(value.to_string())),
                })
                .collect(),
            Some(Value::Object(_)) => {
                serde_json::from_value(Value::Array(values.clone()))
                    .map_err(|_| Error::InvalidSortby(Value::Array(values).to_string()))
            }
            _ => Err(Error::InvalidSortby(Value::Array(values).to_string())),
        },
        SortbyLike::Value(value) => Err(Error::InvalidSortby(value.to_string())),
        SortbyLike::Shorthand(_) | SortbyLike::Structured(_) => {
            Err(Error::InvalidSortby("empty list".to_string()))
        }
    }
}

fn parse_part(part: &str) -> Sortby {
    let Ok(sortby) = part.parse::<Sortby>();
    sortby
}

impl From<&str> for SortbyLike {
    fn from(s: &str) -> SortbyLike {
        SortbyLike::Text(s.to_string())
    }
}

impl From<String> for SortbyLike {
    fn from(s: String) -> SortbyLike {
        SortbyLike::Text(s)
    }
}

impl From<Vec<String>> for SortbyLike {
    fn from(parts: Vec<String>) -> SortbyLike {
        SortbyLike::Shorthand(parts)
    }
}

impl From<Vec<&str>> for SortbyLike {
    fn from(parts: Vec<&str>) -> SortbyLike {
        SortbyLike::Shorthand(parts.into_iter().map(String::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for SortbyLike {
    fn from(parts: [&str; N]) -> SortbyLike {
        SortbyLike::Shorthand(parts.into_iter().map(String::from).collect())
    }
}

impl From<Vec<Sortby>> for SortbyLike {
    fn from(sortby: Vec<Sortby>) -> SortbyLike {
        SortbyLike::Structured(sortby)
    }
}

impl From<Sortby> for SortbyLike {
    fn from(sortby: Sortby) -> SortbyLike {
        SortbyLike::Structured(vec![sortby])
    }
}

impl From<Value> for SortbyLike {
    fn from(value: Value) -> SortbyLike {
        SortbyLike::Value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{SortbyLike, normalize_sortby, parse_sortby, sortby_to_string};
    use crate::{ConformanceClass, Direction, Error, Sortby, StacApiIo};
    use serde_json::json;

    #[test]
    fn shorthand_round_trip() {
        let sortby = parse_sortby(["-a", "+b", "c"].into()).unwrap();
        assert_eq!(
            serde_json::to_value(&sortby).unwrap(),
            json!([
                {"field": "a", "direction": "desc"},
                {"field": "b", "direction": "asc"},
                {"field": "c", "direction": "asc"},
            ])
        );
        assert_eq!(sortby_to_string(&sortby), "-a,+b,+c");
    }

    #[test]
    fn comma_delimited() {
        assert_eq!(
            parse_sortby("-datetime,id".into()).unwrap(),
            vec![Sortby::desc("datetime"), Sortby::asc("id")]
        );
    }

    #[test]
    fn structured_passes_through() {
        let sortby = vec![Sortby {
            field: "properties.eo:cloud_cover".to_string(),
            direction: Direction::Descending,
        }];
        assert_eq!(parse_sortby(sortby.clone().into()).unwrap(), sortby);
    }

    #[test]
    fn json_values() {
        assert_eq!(
            parse_sortby(json!(["-a", "b"]).into()).unwrap(),
            vec![Sortby::desc("a"), Sortby::asc("b")]
        );
        assert_eq!(
            parse_sortby(json!([{"field": "a", "direction": "desc"}]).into()).unwrap(),
            vec![Sortby::desc("a")]
        );
        assert_eq!(
            parse_sortby(json!("+a").into()).unwrap(),
            vec![Sortby::asc("a")]
        );
    }

    #[test]
    fn invalid() {
        for sortby in [
            SortbyLike::from(json!(42)),
            SortbyLike::from(json!([1, 2])),
            SortbyLike::from(json!([{"field": "a"}])),
            SortbyLike::from(json!({"field": "a", "direction": "asc"})),
            SortbyLike::Shorthand(Vec::new()),
            SortbyLike::Structured(Vec::new()),
        ] {
            assert!(matches!(
                parse_sortby(sortby).unwrap_err(),
                Error::InvalidSortby(_)
            ));
        }
    }

    #[test]
    fn requires_conformance() {
        let io = StacApiIo::new().unwrap();
        io.set_conformance(Some(vec![ConformanceClass::ItemSearch.uri()]));
        assert!(matches!(
            normalize_sortby("a", &io).unwrap_err(),
            Error::NotConformant(ConformanceClass::Sort)
        ));
        io.set_conformance(Some(vec![ConformanceClass::Sort.uri()]));
        let _ = normalize_sortby("a", &io).unwrap();
    }
}
