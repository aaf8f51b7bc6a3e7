use crate::{ConformanceClass, Error, Result};
use http::Method;
use serde_json::{Map, Value};
use std::future::Future;
use url::Url;

/// A single request to a STAC API.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// The url, possibly already carrying a query string.
    pub url: Url,

    /// The http method.
    pub method: Method,

    /// The JSON body, sent with `POST` requests.
    pub body: Option<Map<String, Value>>,

    /// An encoded query string, appended to the url's existing query.
    pub query: Option<String>,

    /// Extra headers for this request only.
    pub headers: Vec<(String, String)>,
}

/// The collaborator that performs round trips to a STAC API.
///
/// [`Transport::fetch_json`] and [`Transport::conforms_to`] are the only
/// required methods. Pagination, parameter encoding, and method fallback are
/// built on top of them.
pub trait Transport: Send + Sync {
    /// Sends one request and decodes the response body as a JSON object.
    ///
    /// Non-success responses are returned as [Error::Status].
    fn fetch_json(
        &self,
        request: Request,
    ) -> impl Future<Output = Result<Map<String, Value>>> + Send;

    /// Returns true if the API supports this conformance class.
    fn conforms_to(&self, class: ConformanceClass) -> bool;

    /// Returns an error naming the conformance class if the API doesn't support it.
    fn assert_conforms_to(&self, class: ConformanceClass) -> Result<()> {
        if self.conforms_to(class) {
            Ok(())
        } else {
            Err(Error::NotConformant(class))
        }
    }

    /// Returns true if this API has rejected a `POST` search.
    ///
    /// The default implementation keeps no state.
    fn post_rejected(&self) -> bool {
        false
    }

    /// Remembers that this API rejected a `POST` search.
    ///
    /// The default implementation keeps no state.
    fn downgrade_post(&self) {}
}

impl Request {
    /// Creates a new `GET` request.
    ///
    /// # Examples
    ///
    /// ```
    /// use stac_client::Request;
    ///
    /// let request = Request::get("http://stac.test/collections".parse().unwrap());
    /// ```
    pub fn get(url: Url) -> Request {
        Request {
            url,
            method: Method::GET,
            body: None,
            query: None,
            headers: Vec::new(),
        }
    }

    /// Creates a new `POST` request with a JSON body.
    pub fn post(url: Url, body: Map<String, Value>) -> Request {
        Request {
            url,
            method: Method::POST,
            body: Some(body),
            query: None,
            headers: Vec::new(),
        }
    }

    /// Sets the encoded query string of this request.
    pub fn with_query(mut self, query: impl ToString) -> Request {
        let query = query.to_string();
        self.query = if query.is_empty() { None } else { Some(query) };
        self
    }

    /// Returns the full url of this request, including its query string.
    ///
    /// # Examples
    ///
    /// ```
    /// use stac_client::Request;
    ///
    /// let request = Request::get("http://stac.test/search?token=a".parse().unwrap())
    ///     .with_query("limit=1");
    /// assert_eq!(request.full_url().as_str(), "http://stac.test/search?token=a&limit=1");
    /// ```
    pub fn full_url(&self) -> Url {
        self.full_url_with(&[])
    }

    pub(crate) fn full_url_with(&self, parameters: &[(String, String)]) -> Url {
        let mut url = self.url.clone();
        let defaults = if parameters.is_empty() {
            None
        } else {
            serde_urlencoded::to_string(parameters).ok()
        };
        let query = [url.query(), self.query.as_deref(), defaults.as_deref()]
            .into_iter()
            .flatten()
            .filter(|query| !query.is_empty())
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(if query.is_empty() { None } else { Some(query.as_str()) });
        url
    }
}

#[cfg(test)]
mod tests {
    use super::{Request, Transport};
    use crate::{ConformanceClass, Error, Result};
    use serde_json::{Map, Value};

    struct SearchOnly;

    impl Transport for SearchOnly {
        async fn fetch_json(&self, _: Request) -> Result<Map<String, Value>> {
            Ok(Map::new())
        }

        fn conforms_to(&self, class: ConformanceClass) -> bool {
            class == ConformanceClass::ItemSearch
        }
    }

    #[test]
    fn assert_conforms_to() {
        SearchOnly
            .assert_conforms_to(ConformanceClass::ItemSearch)
            .unwrap();
        assert!(matches!(
            SearchOnly
                .assert_conforms_to(ConformanceClass::Sort)
                .unwrap_err(),
            Error::NotConformant(ConformanceClass::Sort)
        ));
        assert!(!SearchOnly.post_rejected());
    }

    #[test]
    fn full_url() {
        let request = Request::get("http://stac.test/search".parse().unwrap());
        assert_eq!(request.full_url().as_str(), "http://stac.test/search");
        let request = request.with_query("limit=1");
        assert_eq!(
            request
                .full_url_with(&[("key".to_string(), "a b".to_string())])
                .as_str(),
            "http://stac.test/search?limit=1&key=a+b"
        );
        let request = Request::get("http://stac.test/search".parse().unwrap()).with_query("");
        assert_eq!(request.query, None);
    }
}
