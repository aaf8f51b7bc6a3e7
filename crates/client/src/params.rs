use crate::{Error, Fields, Filter, FilterLang, Result, Sortby, fields_to_string, sortby_to_string};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stac::Collection;

/// The canonical, wire-ready search parameters.
///
/// Only fields that are set are serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    /// The maximum number of results per page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    /// Requested bounding box.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    /// A single datetime or an interval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    /// Item ids.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    /// Collection ids.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,

    /// A GeoJSON geometry the items must intersect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intersects: Option<Map<String, Value>>,

    /// Query extension object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Map<String, Value>>,

    /// Filter extension expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,

    /// The language of `filter`.
    #[serde(rename = "filter-lang", skip_serializing_if = "Option::is_none")]
    pub filter_lang: Option<FilterLang>,

    /// Sort extension fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sortby: Option<Vec<Sortby>>,

    /// Fields extension object.
    #[serde(
        default,
        with = "crate::fields::wire",
        skip_serializing_if = "Option::is_none"
    )]
    pub fields: Option<Fields>,
}

/// GET query parameters for the item search endpoint.
///
/// Every structured value is flattened into a string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetParameters {
    /// The maximum number of results per page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    /// Comma-delimited bounding box.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<String>,

    /// A single datetime or an interval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    /// Comma-delimited item ids.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<String>,

    /// Comma-delimited collection ids.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<String>,

    /// JSON-encoded intersects geometry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intersects: Option<String>,

    /// JSON-encoded query object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// The filter, JSON-encoded if it is cql2-json.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// The language of `filter`.
    #[serde(rename = "filter-lang", skip_serializing_if = "Option::is_none")]
    pub filter_lang: Option<FilterLang>,

    /// Sort fields, e.g. `-datetime,+id`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sortby: Option<String>,

    /// Fields, e.g. `+id,-properties`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<String>,
}

/// Anything that can be turned into a bounding box.
#[derive(Debug, Clone, PartialEq)]
pub enum BboxLike {
    /// A comma-delimited string, e.g. `-105.1,41.1,-105.0,41.2`.
    Text(String),

    /// A sequence of numbers.
    Values(Vec<f64>),

    /// A JSON string or array of numbers.
    Value(Value),
}

/// Anything that can be turned into a list of item ids.
#[derive(Debug, Clone, PartialEq)]
pub enum IdsLike {
    /// A comma-delimited string.
    Text(String),

    /// A list of ids.
    List(Vec<String>),
}

/// Anything that can be turned into a list of collection ids.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionsLike {
    /// A comma-delimited string.
    Text(String),

    /// A list of collection ids.
    List(Vec<String>),
}

/// Normalizes a bounding box into a list of numbers.
///
/// The number of values is not checked.
///
/// # Examples
///
/// ```
/// use stac_client::normalize_bbox;
///
/// assert_eq!(normalize_bbox("-105.1, 41.1,-105.0,41.2").unwrap(), vec![-105.1, 41.1, -105.0, 41.2]);
/// assert_eq!(normalize_bbox([1, 2, 3, 4]).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
/// ```
pub fn normalize_bbox(bbox: impl Into<BboxLike>) -> Result<Vec<f64>> {
    match bbox.into() {
        BboxLike::Text(s) => s
            .split(',')
            .map(|value| {
                value
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| Error::InvalidBbox(s.clone()))
            })
            .collect(),
        BboxLike::Values(values) => Ok(values),
        BboxLike::Value(Value::String(s)) => normalize_bbox(s),
        BboxLike::Value(Value::Array(values)) => values
            .iter()
            .map(|value| {
                value
                    .as_f64()
                    .ok_or_else(|| Error::InvalidBbox(Value::Array(values.clone()).to_string()))
            })
            .collect(),
        BboxLike::Value(value) => Err(Error::InvalidBbox(value.to_string())),
    }
}

/// Normalizes item ids into a list.
///
/// Order and duplicates are preserved.
pub fn normalize_ids(ids: impl Into<IdsLike>) -> Vec<String> {
    match ids.into() {
        IdsLike::Text(s) => s.split(',').map(String::from).collect(),
        IdsLike::List(ids) => ids,
    }
}

/// Normalizes collection ids into a list.
///
/// [Collection]s are replaced by their ids.
///
/// # Examples
///
/// ```
/// use stac::Collection;
/// use stac_client::normalize_collections;
///
/// let collection = Collection::new("an-id", "a description");
/// assert_eq!(normalize_collections(&collection), vec!["an-id"]);
/// assert_eq!(normalize_collections("a,b"), vec!["a", "b"]);
/// ```
pub fn normalize_collections(collections: impl Into<CollectionsLike>) -> Vec<String> {
    match collections.into() {
        CollectionsLike::Text(s) => s.split(',').map(String::from).collect(),
        CollectionsLike::List(collections) => collections,
    }
}

impl Parameters {
    /// Returns these parameters as a JSON object.
    pub fn to_map(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

impl GetParameters {
    /// Encodes these parameters as a url query string.
    ///
    /// # Examples
    ///
    /// ```
    /// use stac_client::GetParameters;
    ///
    /// let parameters = GetParameters {
    ///     limit: Some(10),
    ///     collections: Some("a,b".to_string()),
    ///     ..Default::default()
    /// };
    /// assert_eq!(parameters.to_query_string().unwrap(), "limit=10&collections=a%2Cb");
    /// ```
    pub fn to_query_string(&self) -> Result<String> {
        serde_urlencoded::to_string(self).map_err(Error::from)
    }

    /// Returns these parameters as a JSON object.
    pub fn to_map(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

impl TryFrom<&Parameters> for GetParameters {
    type Error = Error;

    fn try_from(parameters: &Parameters) -> Result<GetParameters> {
        let bbox = parameters.bbox.as_ref().map(|bbox| {
            bbox.iter()
                .map(|value| value.to_string())
                .collect::<Vec<_>>()
                .join(",")
        });
        let intersects = parameters
            .intersects
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let query = parameters
            .query
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let filter = parameters
            .filter
            .as_ref()
            .map(Filter::to_query_value)
            .transpose()?;
        Ok(GetParameters {
            limit: parameters.limit,
            bbox,
            datetime: parameters.datetime.clone(),
            ids: parameters.ids.as_ref().map(|ids| ids.join(",")),
            collections: parameters
                .collections
                .as_ref()
                .map(|collections| collections.join(",")),
            intersects,
            query,
            filter,
            filter_lang: parameters.filter_lang,
            sortby: parameters
                .sortby
                .as_ref()
                .map(|sortby| sortby_to_string(sortby)),
            fields: parameters.fields.as_ref().map(fields_to_string),
        })
    }
}

impl From<&str> for BboxLike {
    fn from(s: &str) -> BboxLike {
        BboxLike::Text(s.to_string())
    }
}

impl From<String> for BboxLike {
    fn from(s: String) -> BboxLike {
        BboxLike::Text(s)
    }
}

impl<T: Into<f64>> From<Vec<T>> for BboxLike {
    fn from(values: Vec<T>) -> BboxLike {
        BboxLike::Values(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<f64>, const N: usize> From<[T; N]> for BboxLike {
    fn from(values: [T; N]) -> BboxLike {
        BboxLike::Values(values.into_iter().map(Into::into).collect())
    }
}

impl From<Value> for BboxLike {
    fn from(value: Value) -> BboxLike {
        BboxLike::Value(value)
    }
}

impl From<&str> for IdsLike {
    fn from(s: &str) -> IdsLike {
        IdsLike::Text(s.to_string())
    }
}

impl From<String> for IdsLike {
    fn from(s: String) -> IdsLike {
        IdsLike::Text(s)
    }
}

impl From<Vec<String>> for IdsLike {
    fn from(ids: Vec<String>) -> IdsLike {
        IdsLike::List(ids)
    }
}

impl From<Vec<&str>> for IdsLike {
    fn from(ids: Vec<&str>) -> IdsLike {
        IdsLike::List(ids.into_iter().map(String::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for IdsLike {
    fn from(ids: [&str; N]) -> IdsLike {
        IdsLike::List(ids.into_iter().map(String::from).collect())
    }
}

impl From<&str> for CollectionsLike {
    fn from(s: &str) -> CollectionsLike {
        CollectionsLike::Text(s.to_string())
    }
}

impl From<String> for CollectionsLike {
    fn from(s: String) -> CollectionsLike {
        CollectionsLike::Text(s)
    }
}

impl From<Vec<String>> for CollectionsLike {
    fn from(collections: Vec<String>) -> CollectionsLike {
        CollectionsLike::List(collections)
    }
}

impl From<Vec<&str>> for CollectionsLike {
    fn from(collections: Vec<&str>) -> CollectionsLike {
        CollectionsLike::List(collections.into_iter().map(String::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for CollectionsLike {
    fn from(collections: [&str; N]) -> CollectionsLike {
        CollectionsLike::List(collections.into_iter().map(String::from).collect())
    }
}

impl From<&Collection> for CollectionsLike {
    fn from(collection: &Collection) -> CollectionsLike {
        CollectionsLike::List(vec![collection.id.clone()])
    }
}

impl From<&[Collection]> for CollectionsLike {
    fn from(collections: &[Collection]) -> CollectionsLike {
        CollectionsLike::List(
            collections
                .iter()
                .map(|collection| collection.id.clone())
                .collect(),
        )
    }
}

impl From<Vec<Collection>> for CollectionsLike {
    fn from(collections: Vec<Collection>) -> CollectionsLike {
        CollectionsLike::List(
            collections
                .into_iter()
                .map(|collection| collection.id)
                .collect(),
        )
    }
}
