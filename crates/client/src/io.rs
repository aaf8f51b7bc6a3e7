use crate::{ConformanceClass, Error, Request, Result, Transport};
use http::Method;
use reqwest::{
    Client,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use serde_json::{Map, Value};
use std::{
    fmt::{Debug, Formatter},
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

/// The default [Transport], backed by [reqwest].
///
/// Holds the http client, the headers and query parameters sent with every
/// request, and what the API told us about itself.
#[derive(Debug)]
pub struct StacApiIo {
    client: Client,
    parameters: Vec<(String, String)>,
    conformance: RwLock<Option<Vec<String>>>,
    post_rejected: AtomicBool,
    request_modifier: Option<RequestModifier>,
}

/// Configures a [StacApiIo].
#[derive(Debug, Clone, Default)]
pub struct StacApiIoBuilder {
    headers: Vec<(String, String)>,
    parameters: Vec<(String, String)>,
    conformance: Option<Vec<String>>,
    request_modifier: Option<RequestModifier>,
}

/// A hook that can change every request before it is sent.
#[derive(Clone)]
pub struct RequestModifier(Arc<dyn Fn(&mut reqwest::Request) + Send + Sync>);

impl Debug for RequestModifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("RequestModifier")
    }
}

impl StacApiIo {
    /// Creates a new transport with no extra headers or parameters.
    ///
    /// Conformance is ignored until it is set.
    ///
    /// # Examples
    ///
    /// ```
    /// use stac_client::StacApiIo;
    ///
    /// let io = StacApiIo::new().unwrap();
    /// ```
    pub fn new() -> Result<StacApiIo> {
        StacApiIo::builder().build()
    }

    /// Returns a builder for configuring headers, query parameters, and
    /// conformance.
    ///
    /// # Examples
    ///
    /// ```
    /// use stac_client::StacApiIo;
    ///
    /// let io = StacApiIo::builder()
    ///     .header("x-api-key", "secret")
    ///     .parameter("token", "abc")
    ///     .build()
    ///     .unwrap();
    /// ```
    pub fn builder() -> StacApiIoBuilder {
        StacApiIoBuilder::default()
    }

    /// Replaces the conformance uris.
    ///
    /// `None` means conformance is ignored and every class is supported.
    pub fn set_conformance(&self, conformance: Option<Vec<String>>) {
        match self.conformance.write() {
            Ok(mut guard) => *guard = conformance,
            Err(poisoned) => *poisoned.into_inner() = conformance,
        }
    }

    /// Returns the conformance uris, or `None` if conformance is ignored.
    pub fn conformance(&self) -> Option<Vec<String>> {
        match self.conformance.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl StacApiIoBuilder {
    /// Adds a header that is sent with every request.
    pub fn header(mut self, key: impl ToString, value: impl ToString) -> StacApiIoBuilder {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    /// Adds headers that are sent with every request.
    pub fn headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> StacApiIoBuilder
    where
        K: ToString,
        V: ToString,
    {
        self.headers.extend(
            headers
                .into_iter()
                .map(|(key, value)| (key.to_string(), value.to_string())),
        );
        self
    }

    /// Adds a query parameter that is sent with every request.
    pub fn parameter(mut self, key: impl ToString, value: impl ToString) -> StacApiIoBuilder {
        self.parameters.push((key.to_string(), value.to_string()));
        self
    }

    /// Adds query parameters that are sent with every request.
    pub fn parameters<K, V>(
        mut self,
        parameters: impl IntoIterator<Item = (K, V)>,
    ) -> StacApiIoBuilder
    where
        K: ToString,
        V: ToString,
    {
        self.parameters.extend(
            parameters
                .into_iter()
                .map(|(key, value)| (key.to_string(), value.to_string())),
        );
        self
    }

    /// Sets the conformance uris.
    pub fn conformance(mut self, conformance: Option<Vec<String>>) -> StacApiIoBuilder {
        self.conformance = conformance;
        self
    }

    /// Sets a function that is called on every request just before it is sent.
    ///
    /// Use this for signing requests or adding short-lived credentials.
    ///
    /// # Examples
    ///
    /// ```
    /// use stac_client::StacApiIo;
    ///
    /// let io = StacApiIo::builder()
    ///     .request_modifier(|request| {
    ///         let _ = request
    ///             .headers_mut()
    ///             .insert("x-signature", "abc".parse().unwrap());
    ///     })
    ///     .build()
    ///     .unwrap();
    /// ```
    pub fn request_modifier<F>(mut self, f: F) -> StacApiIoBuilder
    where
        F: Fn(&mut reqwest::Request) + Send + Sync + 'static,
    {
        self.request_modifier = Some(RequestModifier(Arc::new(f)));
        self
    }

    /// Builds the transport.
    ///
    /// Returns an error if a header name or value is invalid.
    pub fn build(self) -> Result<StacApiIo> {
        let mut headers = HeaderMap::new();
        for (key, value) in &self.headers {
            let name = HeaderName::try_from(key.as_str())
                .map_err(|_| Error::InvalidHeader(key.clone()))?;
            let value = HeaderValue::try_from(value.as_str())
                .map_err(|_| Error::InvalidHeader(format!("{key}: {value}")))?;
            let _ = headers.insert(name, value);
        }
        let client = Client::builder()
            .user_agent(crate::user_agent())
            .default_headers(headers)
            .build()?;
        Ok(StacApiIo {
            client,
            parameters: self.parameters,
            conformance: RwLock::new(self.conformance),
            post_rejected: AtomicBool::new(false),
            request_modifier: self.request_modifier,
        })
    }
}

impl Transport for StacApiIo {
    async fn fetch_json(&self, request: Request) -> Result<Map<String, Value>> {
        let url = request.full_url_with(&self.parameters);
        let mut builder = self.client.request(request.method.clone(), url.clone());
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if request.method == Method::POST {
            let body = request.body.unwrap_or_default();
            tracing::debug!(
                "{} {} payload: {}",
                request.method,
                url,
                serde_json::Value::Object(body.clone())
            );
            builder = builder.json(&body);
        } else {
            tracing::debug!("{} {}", request.method, url);
        }
        let mut http_request = builder.build()?;
        if let Some(RequestModifier(modify)) = &self.request_modifier {
            modify(&mut http_request);
        }
        let response = self.client.execute(http_request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Status {
                method: request.method,
                url,
                status,
                body,
            });
        }
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(Error::from)
    }

    fn conforms_to(&self, class: ConformanceClass) -> bool {
        match self.conformance() {
            Some(conformance) => class.is_declared_by(&conformance),
            None => true,
        }
    }

    fn post_rejected(&self) -> bool {
        self.post_rejected.load(Ordering::Relaxed)
    }

    fn downgrade_post(&self) {
        self.post_rejected.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::StacApiIo;
    use crate::{ConformanceClass, Error, ErrorKind, Request, Transport};
    use http::StatusCode;
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[tokio::test]
    async fn get_with_defaults() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/collections")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("limit".into(), "2".into()),
                Matcher::UrlEncoded("token".into(), "abc".into()),
            ]))
            .match_header("x-api-key", "secret")
            .match_header("x-request", "yes")
            .match_header(
                "user-agent",
                Matcher::Regex(format!("^{}", env!("CARGO_PKG_NAME"))),
            )
            .with_body(r#"{"collections": []}"#)
            .create_async()
            .await;
        let io = StacApiIo::builder()
            .header("x-api-key", "secret")
            .parameter("token", "abc")
            .build()
            .unwrap();
        let url = format!("{}/collections", server.url()).parse().unwrap();
        let mut request = Request::get(url).with_query("limit=2");
        request.headers.push(("x-request".to_string(), "yes".to_string()));
        let value = io.fetch_json(request).await.unwrap();
        assert_eq!(value["collections"], json!([]));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn post_json() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/search")
            .match_body(Matcher::Json(json!({"limit": 1})))
            .with_body(r#"{"type": "FeatureCollection", "features": []}"#)
            .create_async()
            .await;
        let io = StacApiIo::new().unwrap();
        let url = format!("{}/search", server.url()).parse().unwrap();
        let body = json!({"limit": 1}).as_object().unwrap().clone();
        let value = io.fetch_json(Request::post(url, body)).await.unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/search")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;
        let io = StacApiIo::new().unwrap();
        let url = format!("{}/search", server.url()).parse().unwrap();
        let error = io.fetch_json(Request::get(url)).await.unwrap_err();
        assert_eq!(error.status_code(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(error.kind(), ErrorKind::Transport);
        let Error::Status { body, .. } = error else {
            panic!("expected a status error");
        };
        assert_eq!(body, "boom");
    }

    #[tokio::test]
    async fn not_an_object() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/")
            .with_body("[1, 2, 3]")
            .create_async()
            .await;
        let io = StacApiIo::new().unwrap();
        let url = server.url().parse().unwrap();
        let error = io.fetch_json(Request::get(url)).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn request_modifier() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .match_header("x-signature", "signed GET")
            .with_body("{}")
            .expect(2)
            .create_async()
            .await;
        let io = StacApiIo::builder()
            .request_modifier(|request| {
                let signature = format!("signed {}", request.method());
                let _ = request
                    .headers_mut()
                    .insert("x-signature", signature.parse().unwrap());
            })
            .build()
            .unwrap();
        let url: url::Url = server.url().parse().unwrap();
        let _ = io.fetch_json(Request::get(url.clone())).await.unwrap();
        let _ = io.fetch_json(Request::get(url)).await.unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn invalid_header() {
        assert!(matches!(
            StacApiIo::builder()
                .header("bad header", "value")
                .build()
                .unwrap_err(),
            Error::InvalidHeader(_)
        ));
    }

    #[test]
    fn conformance() {
        let io = StacApiIo::new().unwrap();
        assert!(io.conformance().is_none());
        assert!(io.conforms_to(ConformanceClass::Filter));
        io.set_conformance(Some(vec![ConformanceClass::Core.uri()]));
        assert!(io.conforms_to(ConformanceClass::Core));
        assert!(!io.conforms_to(ConformanceClass::ItemSearch));
    }

    #[test]
    fn downgrade_is_sticky() {
        let io = StacApiIo::new().unwrap();
        assert!(!io.post_rejected());
        io.downgrade_post();
        io.downgrade_post();
        assert!(io.post_rejected());
    }
}
