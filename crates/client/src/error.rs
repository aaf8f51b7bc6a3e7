use crate::ConformanceClass;
use http::{Method, StatusCode};
use thiserror::Error;
use url::Url;

/// Error enum for crate-specific errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The API has no collection with this id.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// This value can't be turned into a bounding box.
    #[error("invalid bbox: {0}")]
    InvalidBbox(String),

    /// A datetime component doesn't match the datetime grammar.
    #[error("invalid datetime component: {0}")]
    InvalidDatetime(String),

    /// This value can't be turned into include/exclude fields.
    #[error("invalid fields: {0}")]
    InvalidFields(String),

    /// This value is neither a cql2-text string nor a cql2-json object.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Unknown filter language.
    #[error("invalid filter-lang: {0} (expected cql2-text or cql2-json)")]
    InvalidFilterLang(String),

    /// A header name or value is not valid.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// This value is not a GeoJSON geometry object.
    #[error("invalid intersects: {0}")]
    InvalidIntersects(String),

    /// The page size is outside of the range allowed by the STAC API spec.
    #[error("invalid limit of {0}, must be between 1 and 10,000")]
    InvalidLimit(u64),

    /// This value can't be turned into a query extension object.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A response is missing a required member.
    #[error("invalid response from {url}: missing or malformed \"{field}\"")]
    InvalidResponse {
        /// The url that returned the page.
        url: Url,

        /// The name of the missing field.
        field: &'static str,
    },

    /// This value can't be turned into sortby fields.
    #[error("invalid sortby: {0}")]
    InvalidSortby(String),

    /// The catalog doesn't have a `rel="search"` link.
    #[error("no link with rel=\"search\" could be found in this catalog")]
    NoSearchLink,

    /// The API does not advertise a required conformance class.
    #[error("{0} not supported")]
    NotConformant(ConformanceClass),

    /// [reqwest::Error]
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    /// [serde_json::Error]
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    /// [serde_urlencoded::ser::Error]
    #[error(transparent)]
    SerdeUrlencoded(#[from] serde_urlencoded::ser::Error),

    /// A non-success HTTP response.
    #[error("{method} {url} returned {status}: {body}")]
    Status {
        /// The request method.
        method: Method,

        /// The request url, including the query string.
        url: Url,

        /// The response status.
        status: StatusCode,

        /// The response body, as text.
        body: String,
    },

    /// Too many components in a datetime interval.
    #[error("too many datetime components (max=2, actual={0})")]
    TooManyDatetimeComponents(usize),

    /// Only `GET` and `POST` are supported for search requests.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(Method),

    /// [url::ParseError]
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),
}

/// Broad categories of [Error].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A user-supplied value is malformed.
    ///
    /// These are always returned before any request is made.
    InvalidInput,

    /// The server lacks a capability, or the operation isn't supported.
    UnsupportedOperation,

    /// A response was structurally invalid.
    Protocol,

    /// The request failed on the wire or the server returned an error status.
    Transport,
}

impl Error {
    /// Returns this error's [ErrorKind].
    ///
    /// # Examples
    ///
    /// ```
    /// use stac_client::{Error, ErrorKind};
    ///
    /// assert_eq!(Error::InvalidLimit(0).kind(), ErrorKind::InvalidInput);
    /// assert_eq!(Error::NoSearchLink.kind(), ErrorKind::UnsupportedOperation);
    /// ```
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidBbox(_)
            | Error::InvalidDatetime(_)
            | Error::InvalidFields(_)
            | Error::InvalidFilter(_)
            | Error::InvalidFilterLang(_)
            | Error::InvalidHeader(_)
            | Error::InvalidIntersects(_)
            | Error::InvalidLimit(_)
            | Error::InvalidQuery(_)
            | Error::InvalidSortby(_)
            | Error::TooManyDatetimeComponents(_)
            | Error::UrlParse(_) => ErrorKind::InvalidInput,
            Error::NoSearchLink | Error::NotConformant(_) | Error::UnsupportedMethod(_) => {
                ErrorKind::UnsupportedOperation
            }
            Error::InvalidResponse { .. } | Error::SerdeJson(_) => ErrorKind::Protocol,
            Error::CollectionNotFound(_)
            | Error::Reqwest(_)
            | Error::SerdeUrlencoded(_)
            | Error::Status { .. } => ErrorKind::Transport,
        }
    }

    /// Returns the HTTP status code, if this error came from a server response.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Reqwest(err) => err.status(),
            _ => None,
        }
    }
}
