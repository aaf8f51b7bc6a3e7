use crate::{
    BboxLike, CollectionsLike, ConformanceClass, DatetimeLike, Error, FieldsLike, Filter,
    FilterLang, GetParameters, IdsLike, IntersectsLike, Item, Page, Parameters, QueryLike,
    Request, Result, SortbyLike, StacApiIo, Transport, normalize_bbox, normalize_collections,
    normalize_fields, normalize_filter, normalize_filter_lang, normalize_ids,
    normalize_intersects, normalize_query, normalize_sortby, pages::paginate, resolve_datetime,
};
use async_stream::try_stream;
use futures::{Stream, TryStreamExt, pin_mut};
use http::{Method, StatusCode};
use serde_json::{Map, Value};
use stac::ItemCollection;
use std::{
    borrow::Cow,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::OnceCell;
use url::Url;

/// The default number of items per page.
pub const DEFAULT_LIMIT: u64 = 100;

/// The largest page size allowed by the STAC API spec.
pub const MAX_LIMIT: u64 = 10_000;

/// A deferred search of a STAC API item search endpoint.
///
/// Nothing is sent to the API until items, pages, or the matched count are
/// requested.
#[derive(Debug)]
pub struct ItemSearch<T: Transport = StacApiIo> {
    url: Url,
    method: Method,
    downgraded: AtomicBool,
    parameters: Parameters,
    max_items: Option<usize>,
    transport: Arc<T>,
    matched: OnceCell<Option<u64>>,
    raw: OnceCell<Map<String, Value>>,
    item_collection: OnceCell<ItemCollection>,
}

/// Collects the loose inputs of an [ItemSearch].
///
/// Setters never fail. Everything is normalized and checked in
/// [Builder::build].
#[derive(Debug, Clone)]
pub struct Builder {
    url: String,
    method: Method,
    limit: Option<u64>,
    max_items: Option<usize>,
    bbox: Option<BboxLike>,
    datetime: Option<DatetimeLike>,
    intersects: Option<IntersectsLike>,
    ids: Option<IdsLike>,
    collections: Option<CollectionsLike>,
    query: Option<QueryLike>,
    filter: Option<Filter>,
    filter_lang: Option<FilterLang>,
    sortby: Option<SortbyLike>,
    fields: Option<FieldsLike>,
}

/// Search parameters encoded for a specific http method.
#[derive(Debug, Clone, PartialEq)]
pub enum Materialized<'a> {
    /// The JSON body of a `POST` request.
    Post(&'a Parameters),

    /// The query parameters of a `GET` request.
    Get(GetParameters),
}

impl Builder {
    /// Sets the http method, `POST` by default.
    ///
    /// Anything other than `GET` or `POST` is rejected by [Builder::build].
    pub fn method(mut self, method: Method) -> Builder {
        self.method = method;
        self
    }

    /// Sets the number of items per page.
    pub fn limit(mut self, limit: u64) -> Builder {
        self.limit = Some(limit);
        self
    }

    /// Leaves the page size up to the server.
    pub fn no_limit(mut self) -> Builder {
        self.limit = None;
        self
    }

    /// Sets the maximum number of items to return across all pages.
    pub fn max_items(mut self, max_items: usize) -> Builder {
        self.max_items = Some(max_items);
        self
    }

    /// Sets the bounding box.
    pub fn bbox(mut self, bbox: impl Into<BboxLike>) -> Builder {
        self.bbox = Some(bbox.into());
        self
    }

    /// Sets the datetime or datetime interval.
    pub fn datetime(mut self, datetime: impl Into<DatetimeLike>) -> Builder {
        self.datetime = Some(datetime.into());
        self
    }

    /// Sets the intersects geometry.
    pub fn intersects(mut self, intersects: impl Into<IntersectsLike>) -> Builder {
        self.intersects = Some(intersects.into());
        self
    }

    /// Sets the item ids.
    pub fn ids(mut self, ids: impl Into<IdsLike>) -> Builder {
        self.ids = Some(ids.into());
        self
    }

    /// Sets the collections.
    pub fn collections(mut self, collections: impl Into<CollectionsLike>) -> Builder {
        self.collections = Some(collections.into());
        self
    }

    /// Sets the query extension object or shorthand expressions.
    pub fn query(mut self, query: impl Into<QueryLike>) -> Builder {
        self.query = Some(query.into());
        self
    }

    /// Sets the filter expression.
    pub fn filter(mut self, filter: impl Into<Filter>) -> Builder {
        self.filter = Some(filter.into());
        self
    }

    /// Sets the filter language, otherwise it's inferred from the filter.
    pub fn filter_lang(mut self, filter_lang: FilterLang) -> Builder {
        self.filter_lang = Some(filter_lang);
        self
    }

    /// Sets the sort fields.
    pub fn sortby(mut self, sortby: impl Into<SortbyLike>) -> Builder {
        self.sortby = Some(sortby.into());
        self
    }

    /// Sets the fields to include or exclude.
    pub fn fields(mut self, fields: impl Into<FieldsLike>) -> Builder {
        self.fields = Some(fields.into());
        self
    }

    /// Normalizes every parameter and builds the search.
    ///
    /// Fails if the API doesn't support item search, if the method isn't
    /// `GET` or `POST`, if the page size is out of range, if any parameter is
    /// malformed, or if a parameter needs an extension the API doesn't
    /// support.
    ///
    /// # Examples
    ///
    /// ```
    /// use stac_client::{ItemSearch, StacApiIo};
    /// use std::sync::Arc;
    ///
    /// let search = ItemSearch::builder("http://stac.test/search")
    ///     .collections("sentinel-2-l2a")
    ///     .datetime("2023")
    ///     .max_items(10)
    ///     .build(Arc::new(StacApiIo::new().unwrap()))
    ///     .unwrap();
    /// assert_eq!(search.parameters().limit, Some(10));
    /// assert_eq!(
    ///     search.parameters().datetime.as_deref(),
    ///     Some("2023-01-01T00:00:00Z/2023-12-31T23:59:59Z")
    /// );
    /// ```
    pub fn build<T: Transport>(self, transport: Arc<T>) -> Result<ItemSearch<T>> {
        transport.assert_conforms_to(ConformanceClass::ItemSearch)?;
        if self.method != Method::GET && self.method != Method::POST {
            return Err(Error::UnsupportedMethod(self.method));
        }
        let limit = match (self.limit, self.max_items) {
            (Some(limit), Some(max_items)) => {
                Some(limit.min(u64::try_from(max_items).unwrap_or(u64::MAX)))
            }
            (limit, _) => limit,
        };
        if let Some(limit) = limit
            && !(1..=MAX_LIMIT).contains(&limit)
        {
            return Err(Error::InvalidLimit(limit));
        }
        let url = Url::parse(&self.url)?;
        let filter = self
            .filter
            .map(|filter| normalize_filter(filter, transport.as_ref()))
            .transpose()?;
        let filter_lang = normalize_filter_lang(filter.as_ref(), self.filter_lang);
        let parameters = Parameters {
            limit,
            bbox: self.bbox.map(normalize_bbox).transpose()?,
            datetime: self
                .datetime
                .map(resolve_datetime)
                .transpose()?
                .flatten(),
            ids: self.ids.map(normalize_ids),
            collections: self.collections.map(normalize_collections),
            intersects: self.intersects.map(normalize_intersects).transpose()?,
            query: self.query.map(normalize_query).transpose()?,
            filter,
            filter_lang,
            sortby: self
                .sortby
                .map(|sortby| normalize_sortby(sortby, transport.as_ref()))
                .transpose()?,
            fields: self
                .fields
                .map(|fields| normalize_fields(fields, transport.as_ref()))
                .transpose()?,
        };
        Ok(ItemSearch {
            url,
            method: self.method,
            downgraded: AtomicBool::new(false),
            parameters,
            max_items: self.max_items,
            transport,
            matched: OnceCell::new(),
            raw: OnceCell::new(),
            item_collection: OnceCell::new(),
        })
    }
}

impl ItemSearch {
    /// Starts building a search of this item search endpoint.
    ///
    /// The transport is chosen when the search is built.
    pub fn builder(url: impl ToString) -> Builder {
        Builder {
            url: url.to_string(),
            method: Method::POST,
            limit: Some(DEFAULT_LIMIT),
            max_items: None,
            bbox: None,
            datetime: None,
            intersects: None,
            ids: None,
            collections: None,
            query: None,
            filter: None,
            filter_lang: None,
            sortby: None,
            fields: None,
        }
    }
}

impl<T: Transport> ItemSearch<T> {
    /// Returns the item search endpoint.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the http method that the next request will use.
    ///
    /// A `POST` search becomes a `GET` search for good once the API rejects a
    /// `POST`.
    pub fn method(&self) -> Method {
        if self.method == Method::POST
            && (self.downgraded.load(Ordering::Relaxed) || self.transport.post_rejected())
        {
            Method::GET
        } else {
            self.method.clone()
        }
    }

    /// Returns the normalized parameters.
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Returns the maximum number of items this search will return.
    pub fn max_items(&self) -> Option<usize> {
        self.max_items
    }

    /// Returns the parameters encoded for the current http method.
    pub fn materialize_parameters(&self) -> Result<Materialized<'_>> {
        if self.method() == Method::POST {
            Ok(Materialized::Post(&self.parameters))
        } else {
            GetParameters::try_from(&self.parameters).map(Materialized::Get)
        }
    }

    /// Returns every page of results.
    ///
    /// Pages are fetched one at a time, as the stream is polled.
    pub fn pages(&self) -> impl Stream<Item = Result<Page>> + '_ {
        try_stream! {
            let parameters = self.parameters.to_map()?;
            let pages = paginate(
                self.transport.as_ref(),
                self.fetch_search(None),
                "features",
                Some(parameters),
            );
            pin_mut!(pages);
            while let Some(page) = pages.try_next().await? {
                yield Page::from_json(page)?;
            }
        }
    }

    /// Returns every item across all pages, up to `max_items`.
    ///
    /// No further pages are requested once `max_items` items have been
    /// yielded.
    pub fn items(&self) -> impl Stream<Item = Result<Item>> + '_ {
        try_stream! {
            let mut remaining = self.max_items;
            let pages = self.pages();
            pin_mut!(pages);
            while remaining != Some(0) {
                let Some(page) = pages.try_next().await? else {
                    break;
                };
                for item in page.features {
                    if remaining == Some(0) {
                        break;
                    }
                    yield item;
                    remaining = remaining.map(|n| n - 1);
                }
            }
        }
    }

    /// Returns the number of items that match this search.
    ///
    /// Sends one request with a page size of one. Returns `None`, with a
    /// warning, if the API doesn't report a count. The result is cached.
    pub async fn matched(&self) -> Result<Option<u64>> {
        self.matched
            .get_or_try_init(|| async {
                let (url, page) = self.fetch_search(Some(1)).await?;
                let matched = page
                    .get("context")
                    .and_then(|context| context.get("matched"))
                    .and_then(Value::as_u64)
                    .or_else(|| page.get("numberMatched").and_then(Value::as_u64));
                if matched.is_none() {
                    tracing::warn!("numberMatched or context.matched not in response from {url}");
                }
                Ok::<_, Error>(matched)
            })
            .await
            .copied()
    }

    /// Returns every item, up to `max_items`, as a GeoJSON feature collection.
    ///
    /// The result is cached.
    pub async fn items_as_raw(&self) -> Result<&Map<String, Value>> {
        self.raw
            .get_or_try_init(|| async {
                let mut features = Vec::new();
                let pages = self.pages();
                pin_mut!(pages);
                while self.max_items.is_none_or(|max_items| features.len() < max_items) {
                    let Some(page) = pages.try_next().await? else {
                        break;
                    };
                    features.extend(page.features.into_iter().map(Value::Object));
                }
                if let Some(max_items) = self.max_items {
                    features.truncate(max_items);
                }
                let mut feature_collection = Map::new();
                let _ = feature_collection.insert("type".to_string(), "FeatureCollection".into());
                let _ = feature_collection.insert("features".to_string(), Value::Array(features));
                Ok::<_, Error>(feature_collection)
            })
            .await
    }

    /// Returns every item, up to `max_items`, as STAC items.
    ///
    /// Fails if any item isn't a complete STAC item, e.g. if the fields
    /// extension removed required fields. The result is cached.
    pub async fn item_collection(&self) -> Result<&ItemCollection> {
        self.item_collection
            .get_or_try_init(|| async {
                let raw = self.items_as_raw().await?;
                serde_json::from_value(Value::Object(raw.clone())).map_err(Error::from)
            })
            .await
    }

    fn request(&self, method: &Method, limit: Option<u64>) -> Result<Request> {
        let mut parameters = Cow::Borrowed(&self.parameters);
        if let Some(limit) = limit {
            parameters.to_mut().limit = Some(limit);
        }
        if *method == Method::POST {
            Ok(Request::post(self.url.clone(), parameters.to_map()?))
        } else {
            let get = GetParameters::try_from(parameters.as_ref())?;
            Ok(Request::get(self.url.clone()).with_query(get.to_query_string()?))
        }
    }

    async fn fetch_search(&self, limit: Option<u64>) -> Result<(Url, Map<String, Value>)> {
        let method = self.method();
        let request = self.request(&method, limit)?;
        match self.transport.fetch_json(request).await {
            Err(Error::Status { status, .. })
                if status == StatusCode::METHOD_NOT_ALLOWED && method == Method::POST =>
            {
                tracing::warn!("{} does not allow POST, searching with GET", self.url);
                self.downgraded.store(true, Ordering::Relaxed);
                self.transport.downgrade_post();
                let request = self.request(&Method::GET, limit)?;
                let page = self.transport.fetch_json(request).await?;
                Ok((self.url.clone(), page))
            }
            result => Ok((self.url.clone(), result?)),
        }
    }
}

impl Materialized<'_> {
    /// Returns these parameters as a JSON object.
    pub fn to_json(&self) -> Result<Map<String, Value>> {
        match self {
            Materialized::Post(parameters) => parameters.to_map(),
            Materialized::Get(parameters) => parameters.to_map(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ItemSearch, Materialized};
    use crate::{ConformanceClass, Error, ErrorKind, Item, Request, Result, Sortby, Transport};
    use futures::{TryStreamExt, pin_mut};
    use http::{Method, StatusCode};
    use serde_json::{Map, Value, json};
    use std::{
        collections::VecDeque,
        io::Write,
        sync::{
            Arc, Mutex,
            atomic::{AtomicBool, Ordering},
        },
    };

    const URL: &str = "http://stac.test/search";

    #[derive(Debug)]
    enum Response {
        Page(Value),
        Status(u16),
    }

    #[derive(Debug)]
    struct Queue {
        conformance: Vec<ConformanceClass>,
        responses: Mutex<VecDeque<Response>>,
        requests: Mutex<Vec<Request>>,
        post_rejected: AtomicBool,
    }

    impl Queue {
        fn new(responses: Vec<Response>) -> Queue {
            Queue {
                conformance: ConformanceClass::ALL.to_vec(),
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
                post_rejected: AtomicBool::new(false),
            }
        }

        fn conforming_to(conformance: Vec<ConformanceClass>) -> Queue {
            Queue {
                conformance,
                ..Queue::new(Vec::new())
            }
        }

        fn requests(&self) -> Vec<Request> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Transport for Queue {
        async fn fetch_json(&self, request: Request) -> Result<Map<String, Value>> {
            let url = request.full_url();
            let method = request.method.clone();
            self.requests.lock().unwrap().push(request);
            match self.responses.lock().unwrap().pop_front().unwrap() {
                Response::Page(value) => Ok(value.as_object().unwrap().clone()),
                Response::Status(status) => Err(Error::Status {
                    method,
                    url,
                    status: StatusCode::from_u16(status).unwrap(),
                    body: String::new(),
                }),
            }
        }

        fn conforms_to(&self, class: ConformanceClass) -> bool {
            self.conformance.contains(&class)
        }

        fn post_rejected(&self) -> bool {
            self.post_rejected.load(Ordering::Relaxed)
        }

        fn downgrade_post(&self) {
            self.post_rejected.store(true, Ordering::Relaxed);
        }
    }

    fn page(ids: &[&str], next: Option<&str>) -> Response {
        let features = ids
            .iter()
            .map(|id| serde_json::to_value(stac::Item::new(*id)).unwrap())
            .collect::<Vec<_>>();
        let links = next
            .map(|href| vec![json!({"rel": "next", "href": href})])
            .unwrap_or_default();
        Response::Page(json!({
            "type": "FeatureCollection",
            "features": features,
            "links": links,
        }))
    }

    #[derive(Clone, Default)]
    struct Logs(Arc<Mutex<Vec<u8>>>);

    impl Write for Logs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Logs {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    async fn items_until_error(search: &ItemSearch<Queue>) -> (Vec<Item>, Error) {
        let items = search.items();
        pin_mut!(items);
        let mut yielded = Vec::new();
        loop {
            match items.try_next().await {
                Ok(Some(item)) => yielded.push(item),
                Ok(None) => panic!("expected an error"),
                Err(err) => return (yielded, err),
            }
        }
    }

    fn ids(items: &[Map<String, Value>]) -> Vec<&str> {
        items
            .iter()
            .map(|item| item["id"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn requires_item_search() {
        let transport = Arc::new(Queue::conforming_to(vec![ConformanceClass::Core]));
        let error = ItemSearch::builder(URL).build(transport).unwrap_err();
        assert!(matches!(
            error,
            Error::NotConformant(ConformanceClass::ItemSearch)
        ));
        assert_eq!(error.kind(), ErrorKind::UnsupportedOperation);
    }

    #[test]
    fn unsupported_method() {
        let transport = Arc::new(Queue::new(Vec::new()));
        assert!(matches!(
            ItemSearch::builder(URL)
                .method(Method::PUT)
                .build(transport)
                .unwrap_err(),
            Error::UnsupportedMethod(Method::PUT)
        ));
    }

    #[test]
    fn limits() {
        let transport = Arc::new(Queue::new(Vec::new()));
        let search = ItemSearch::builder(URL).build(transport.clone()).unwrap();
        assert_eq!(search.parameters().limit, Some(100));
        let search = ItemSearch::builder(URL)
            .limit(20_000)
            .max_items(1)
            .build(transport.clone())
            .unwrap();
        assert_eq!(search.parameters().limit, Some(1));
        let search = ItemSearch::builder(URL)
            .limit(10_000)
            .build(transport.clone())
            .unwrap();
        assert_eq!(search.parameters().limit, Some(10_000));
        let search = ItemSearch::builder(URL)
            .no_limit()
            .build(transport.clone())
            .unwrap();
        assert!(!search.parameters().to_map().unwrap().contains_key("limit"));
        for builder in [
            ItemSearch::builder(URL).limit(20_000),
            ItemSearch::builder(URL).limit(0),
            ItemSearch::builder(URL).max_items(0),
        ] {
            let error = builder.build(transport.clone()).unwrap_err();
            assert!(matches!(error, Error::InvalidLimit(_)));
            assert_eq!(error.kind(), ErrorKind::InvalidInput);
        }
    }

    #[test]
    fn extension_preconditions() {
        let transport = Arc::new(Queue::conforming_to(vec![ConformanceClass::ItemSearch]));
        assert!(matches!(
            ItemSearch::builder(URL)
                .sortby("-datetime")
                .build(transport.clone())
                .unwrap_err(),
            Error::NotConformant(ConformanceClass::Sort)
        ));
        assert!(matches!(
            ItemSearch::builder(URL)
                .fields("id")
                .build(transport.clone())
                .unwrap_err(),
            Error::NotConformant(ConformanceClass::Fields)
        ));
        assert!(matches!(
            ItemSearch::builder(URL)
                .filter("id = 'a'")
                .build(transport.clone())
                .unwrap_err(),
            Error::NotConformant(ConformanceClass::Filter)
        ));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn invalid_inputs_fail_at_build() {
        let transport = Arc::new(Queue::new(Vec::new()));
        let error = ItemSearch::builder(URL)
            .datetime("2020/2021/2022")
            .build(transport.clone())
            .unwrap_err();
        assert!(matches!(error, Error::TooManyDatetimeComponents(3)));
        let error = ItemSearch::builder(URL)
            .bbox("a,b,c,d")
            .build(transport.clone())
            .unwrap_err();
        assert!(matches!(error, Error::InvalidBbox(_)));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn only_present_keys() {
        let transport = Arc::new(Queue::new(Vec::new()));
        let search = ItemSearch::builder(URL)
            .collections("a,b")
            .sortby(["-datetime"])
            .build(transport)
            .unwrap();
        assert_eq!(
            Value::Object(search.materialize_parameters().unwrap().to_json().unwrap()),
            json!({
                "limit": 100,
                "collections": ["a", "b"],
                "sortby": [{"field": "datetime", "direction": "desc"}],
            })
        );
        assert_eq!(search.parameters().sortby, Some(vec![Sortby::desc("datetime")]));
    }

    #[test]
    fn materialize_get() {
        let transport = Arc::new(Queue::new(Vec::new()));
        let search = ItemSearch::builder(URL)
            .method(Method::GET)
            .bbox([-104.5, 44.0, -104.0, 45.0])
            .ids(["a", "b"])
            .fields(["id", "-assets"])
            .build(transport)
            .unwrap();
        let Materialized::Get(parameters) = search.materialize_parameters().unwrap() else {
            panic!("expected GET parameters");
        };
        assert_eq!(parameters.bbox.as_deref(), Some("-104.5,44,-104,45"));
        assert_eq!(parameters.ids.as_deref(), Some("a,b"));
        assert_eq!(parameters.fields.as_deref(), Some("+id,-assets"));
    }

    #[tokio::test]
    async fn max_items_stops_paging() {
        let transport = Arc::new(Queue::new(vec![
            page(&["a", "b", "c"], Some("search?page=2")),
            page(&["d", "e", "f"], Some("search?page=3")),
            page(&["g", "h", "i"], None),
        ]));
        let search = ItemSearch::builder(URL)
            .limit(3)
            .max_items(5)
            .build(transport.clone())
            .unwrap();
        let items: Vec<_> = search.items().try_collect().await.unwrap();
        assert_eq!(ids(&items), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn every_page_without_max_items() {
        let transport = Arc::new(Queue::new(vec![
            page(&["a"], Some("search?page=2")),
            page(&["b"], Some("search?page=3")),
            page(&[], None),
        ]));
        let search = ItemSearch::builder(URL).build(transport.clone()).unwrap();
        let pages: Vec<_> = search.pages().try_collect().await.unwrap();
        assert_eq!(pages.len(), 2);
        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].method, Method::POST);
        assert_eq!(requests[0].body.as_ref().unwrap()["limit"], 100);
        assert_eq!(requests[1].method, Method::GET);
        assert_eq!(requests[1].url.as_str(), "http://stac.test/search?page=2");
    }

    #[tokio::test]
    async fn no_requests_until_polled() {
        let transport = Arc::new(Queue::new(Vec::new()));
        let search = ItemSearch::builder(URL).build(transport.clone()).unwrap();
        let _items = search.items();
        let _pages = search.pages();
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn matched_is_cached() {
        let transport = Arc::new(Queue::new(vec![Response::Page(json!({
            "type": "FeatureCollection",
            "features": [],
            "context": {"returned": 0, "limit": 1, "matched": 42},
            "numberMatched": 7,
        }))]));
        let search = ItemSearch::builder(URL)
            .collections("a")
            .build(transport.clone())
            .unwrap();
        assert_eq!(search.matched().await.unwrap(), Some(42));
        assert_eq!(search.matched().await.unwrap(), Some(42));
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            Value::Object(requests[0].body.clone().unwrap()),
            json!({"limit": 1, "collections": ["a"]})
        );
        assert_eq!(search.parameters().limit, Some(100));
    }

    #[tokio::test]
    async fn matched_falls_back_to_number_matched() {
        let transport = Arc::new(Queue::new(vec![Response::Page(json!({
            "features": [],
            "numberMatched": 7,
        }))]));
        let search = ItemSearch::builder(URL).build(transport).unwrap();
        assert_eq!(search.matched().await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn matched_unknown() {
        let logs = Logs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);
        let transport = Arc::new(Queue::new(vec![Response::Page(json!({"features": []}))]));
        let search = ItemSearch::builder(URL).build(transport).unwrap();
        assert_eq!(search.matched().await.unwrap(), None);
        let logs = logs.contents();
        assert!(logs.contains("WARN"));
        assert!(logs.contains("numberMatched or context.matched not in response"));
    }

    #[tokio::test]
    async fn downgrade_to_get() {
        let transport = Arc::new(Queue::new(vec![
            Response::Status(405),
            page(&["a"], None),
        ]));
        let search = ItemSearch::builder(URL)
            .collections("a")
            .build(transport.clone())
            .unwrap();
        assert_eq!(search.method(), Method::POST);
        let items: Vec<_> = search.items().try_collect().await.unwrap();
        assert_eq!(ids(&items), vec!["a"]);
        assert_eq!(search.method(), Method::GET);
        assert!(matches!(
            search.materialize_parameters().unwrap(),
            Materialized::Get(_)
        ));
        let requests = transport.requests();
        assert_eq!(requests[0].method, Method::POST);
        assert_eq!(requests[1].method, Method::GET);
        assert_eq!(
            requests[1].full_url().as_str(),
            "http://stac.test/search?limit=100&collections=a"
        );

        let other = ItemSearch::builder(URL).build(transport).unwrap();
        assert_eq!(other.method(), Method::GET);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let transport = Arc::new(Queue::new(vec![Response::Status(500)]));
        let search = ItemSearch::builder(URL).build(transport.clone()).unwrap();
        let error = search.items().try_collect::<Vec<_>>().await.unwrap_err();
        assert_eq!(error.status_code(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(search.method(), Method::POST);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn transport_error_keeps_earlier_items() {
        let transport = Arc::new(Queue::new(vec![
            page(&["a", "b"], Some("search?page=2")),
            Response::Status(502),
        ]));
        let search = ItemSearch::builder(URL).build(transport.clone()).unwrap();
        let (items, error) = items_until_error(&search).await;
        assert_eq!(ids(&items), vec!["a", "b"]);
        assert_eq!(error.kind(), ErrorKind::Transport);
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn protocol_error_keeps_earlier_items() {
        let transport = Arc::new(Queue::new(vec![
            page(&["a"], Some("search?page=2")),
            Response::Page(json!({"type": "FeatureCollection", "links": []})),
        ]));
        let search = ItemSearch::builder(URL).build(transport).unwrap();
        let (items, error) = items_until_error(&search).await;
        assert_eq!(ids(&items), vec!["a"]);
        assert_eq!(error.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn malformed_unrelated_link() {
        let transport = Arc::new(Queue::new(vec![
            Response::Page(json!({
                "type": "FeatureCollection",
                "features": [stac::Item::new("a")],
                "links": [
                    {"rel": "self", "merge": "sometimes"},
                    {"rel": "next", "href": "search?page=2"}
                ]
            })),
            page(&["b"], None),
        ]));
        let search = ItemSearch::builder(URL).build(transport).unwrap();
        let items: Vec<_> = search.items().try_collect().await.unwrap();
        assert_eq!(ids(&items), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn raw_is_truncated_and_cached() {
        let transport = Arc::new(Queue::new(vec![
            page(&["a", "b"], Some("search?page=2")),
            page(&["c", "d"], None),
        ]));
        let search = ItemSearch::builder(URL)
            .max_items(3)
            .build(transport.clone())
            .unwrap();
        let raw = search.items_as_raw().await.unwrap();
        assert_eq!(raw["type"], "FeatureCollection");
        assert_eq!(raw["features"].as_array().unwrap().len(), 3);
        let item_collection = search.item_collection().await.unwrap();
        assert_eq!(item_collection.items.len(), 3);
        assert_eq!(item_collection.items[2].id, "c");
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn raw_stops_paging_at_max_items() {
        let transport = Arc::new(Queue::new(vec![
            page(&["a", "b"], Some("search?page=2")),
            page(&["c"], None),
        ]));
        let search = ItemSearch::builder(URL)
            .max_items(2)
            .build(transport.clone())
            .unwrap();
        let raw = search.items_as_raw().await.unwrap();
        assert_eq!(raw["features"].as_array().unwrap().len(), 2);
        assert_eq!(transport.requests().len(), 1);
    }
}
