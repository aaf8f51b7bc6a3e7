use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The prefix for every STAC API conformance uri.
pub const STAC_API_PREFIX: &str = "https://api.stacspec.org/v1.0.0";

/// The OGC API - Features core conformance uri.
pub const OGC_API_FEATURES_URI: &str = "http://www.opengis.net/spec/ogcapi-features-1/1.0/conf/core";

/// The OGC API - Features OpenAPI conformance uri.
///
/// Older APIs advertise this to declare a `/collections` endpoint.
pub const OGC_API_FEATURES_OAS30_URI: &str =
    "http://www.opengis.net/spec/ogcapi-features-1/1.0/conf/oas30";

/// The OGC API - Features OpenAPI requirements class uri.
///
/// Some APIs advertise the requirements class instead of the conformance
/// class.
pub const OGC_API_FEATURES_OAS30_REQ_URI: &str =
    "http://www.opengis.net/spec/ogcapi-features-1/1.0/req/oas30";

/// An optional API capability, declared by the server in `conformsTo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConformanceClass {
    /// STAC API - Core
    Core,

    /// STAC API - Item Search
    ItemSearch,

    /// Item search context extension
    Context,

    /// Item search fields extension
    Fields,

    /// Item search sort extension
    Sort,

    /// Item search query extension
    Query,

    /// Item search filter extension
    Filter,

    /// STAC API - Collections
    Collections,

    /// STAC API - Features
    Features,
}

/// The landing page's conformance classes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conformance {
    /// The conformance uris.
    #[serde(rename = "conformsTo")]
    pub conforms_to: Vec<String>,
}

impl ConformanceClass {
    /// Every conformance class, in declaration order.
    pub const ALL: [ConformanceClass; 9] = [
        ConformanceClass::Core,
        ConformanceClass::ItemSearch,
        ConformanceClass::Context,
        ConformanceClass::Fields,
        ConformanceClass::Sort,
        ConformanceClass::Query,
        ConformanceClass::Filter,
        ConformanceClass::Collections,
        ConformanceClass::Features,
    ];

    /// Returns the official uri for this conformance class.
    ///
    /// # Examples
    ///
    /// ```
    /// use stac_client::ConformanceClass;
    ///
    /// assert_eq!(
    ///     ConformanceClass::ItemSearch.uri(),
    ///     "https://api.stacspec.org/v1.0.0/item-search"
    /// );
    /// ```
    pub fn uri(&self) -> String {
        format!("{STAC_API_PREFIX}/{}", self.suffix())
    }

    /// Returns true if this uri declares this conformance class.
    ///
    /// Any `v1.0.0` pre-release (e.g. `v1.0.0-rc.1` or `v1.0.0-beta.2`) is
    /// accepted.
    ///
    /// # Examples
    ///
    /// ```
    /// use stac_client::ConformanceClass;
    ///
    /// let class = ConformanceClass::Sort;
    /// assert!(class.matches("https://api.stacspec.org/v1.0.0/item-search#sort"));
    /// assert!(class.matches("https://api.stacspec.org/v1.0.0-rc.2/item-search#sort"));
    /// assert!(!class.matches("https://api.stacspec.org/v1.0.0/item-search"));
    /// ```
    pub fn matches(&self, uri: &str) -> bool {
        if let Some(rest) = uri.strip_prefix(STAC_API_PREFIX) {
            let rest = match rest.strip_prefix('-') {
                Some(pre_release) => match pre_release.split_once('/') {
                    Some((tag, rest)) if is_pre_release(tag) => rest,
                    _ => return false,
                },
                None => match rest.strip_prefix('/') {
                    Some(rest) => rest,
                    None => return false,
                },
            };
            rest == self.suffix()
        } else {
            match self {
                ConformanceClass::Features => uri == OGC_API_FEATURES_URI,
                ConformanceClass::Collections => {
                    uri == OGC_API_FEATURES_OAS30_URI || uri == OGC_API_FEATURES_OAS30_REQ_URI
                }
                _ => false,
            }
        }
    }

    /// Returns true if any of these uris declare this conformance class.
    pub fn is_declared_by<S: AsRef<str>>(&self, uris: &[S]) -> bool {
        uris.iter().any(|uri| self.matches(uri.as_ref()))
    }

    fn suffix(&self) -> &'static str {
        match self {
            ConformanceClass::Core => "core",
            ConformanceClass::ItemSearch => "item-search",
            ConformanceClass::Context => "item-search#context",
            ConformanceClass::Fields => "item-search#fields",
            ConformanceClass::Sort => "item-search#sort",
            ConformanceClass::Query => "item-search#query",
            ConformanceClass::Filter => "item-search#filter",
            ConformanceClass::Collections => "collections",
            ConformanceClass::Features => "ogcapi-features",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ConformanceClass::Core => "CORE",
            ConformanceClass::ItemSearch => "ITEM_SEARCH",
            ConformanceClass::Context => "CONTEXT",
            ConformanceClass::Fields => "FIELDS",
            ConformanceClass::Sort => "SORT",
            ConformanceClass::Query => "QUERY",
            ConformanceClass::Filter => "FILTER",
            ConformanceClass::Collections => "COLLECTIONS",
            ConformanceClass::Features => "FEATURES",
        }
    }
}

impl Conformance {
    /// Returns true if these uris declare the conformance class.
    pub fn conforms_to(&self, class: ConformanceClass) -> bool {
        class.is_declared_by(&self.conforms_to)
    }
}

impl Display for ConformanceClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// e.g. beta.2, rc.1
fn is_pre_release(tag: &str) -> bool {
    match tag.split_once('.') {
        Some((label, number)) => {
            !label.is_empty()
                && label.chars().all(|c| c.is_ascii_alphabetic())
                && !number.is_empty()
                && number.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}
