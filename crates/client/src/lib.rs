//! Search [STAC APIs](https://github.com/radiantearth/stac-api-spec).
//!
//! Open an API with [Client], then build an [ItemSearch] from its search
//! link:
//!
//! ```no_run
//! use futures::TryStreamExt;
//! use stac_client::Client;
//!
//! # tokio_test::block_on(async {
//! let client = Client::open("https://planetarycomputer.microsoft.com/api/stac/v1")
//!     .await
//!     .unwrap();
//! let builder = client
//!     .search()
//!     .unwrap()
//!     .collections("sentinel-2-l2a")
//!     .bbox([-105.1, 41.1, -105.0, 41.2])
//!     .datetime("2023-06")
//!     .max_items(10);
//! let search = client.build_search(builder).unwrap();
//! let items: Vec<_> = search.items().try_collect().await.unwrap();
//! assert!(items.len() <= 10);
//! # })
//! ```
//!
//! Searches are lazy. Nothing is sent until a stream is polled or a result
//! method is awaited, and every input is validated when the search is built.
//!
//! Anything that implements [Transport] can stand in for the default
//! [reqwest]-backed [StacApiIo].

#![warn(missing_docs, unused_qualifications)]

mod client;
mod conformance;
mod datetime;
mod error;
mod fields;
mod filter;
mod intersects;
mod io;
mod pages;
mod params;
mod query;
mod search;
mod sort;
mod transport;

pub use {
    client::{Client, QUERYABLES_REL},
    conformance::{
        Conformance, ConformanceClass, OGC_API_FEATURES_OAS30_REQ_URI, OGC_API_FEATURES_OAS30_URI,
        OGC_API_FEATURES_URI, STAC_API_PREFIX,
    },
    datetime::{DatetimeComponent, DatetimeLike, OPEN, resolve_datetime},
    error::{Error, ErrorKind},
    fields::{FieldsLike, fields_to_string, normalize_fields},
    filter::{Filter, FilterLang, normalize_filter, normalize_filter_lang},
    intersects::{GeoInterface, IntersectsLike, normalize_intersects},
    io::{RequestModifier, StacApiIo, StacApiIoBuilder},
    pages::{Page, follow_link},
    params::{
        BboxLike, CollectionsLike, GetParameters, IdsLike, Parameters, normalize_bbox,
        normalize_collections, normalize_ids,
    },
    query::{OPERATORS, QueryLike, merge_maps, normalize_query},
    search::{Builder, DEFAULT_LIMIT, ItemSearch, MAX_LIMIT, Materialized},
    sort::{SortbyLike, normalize_sortby, sortby_to_string},
    stac::{
        Link,
        api::{Context, Direction, Fields, Sortby},
    },
    transport::{Request, Transport},
};

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, Error>;

/// A raw item, as returned in a page's `features` array.
pub type Item = serde_json::Map<String, serde_json::Value>;

/// Returns a string suitable for use as a HTTP user agent.
pub fn user_agent() -> &'static str {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))
}
