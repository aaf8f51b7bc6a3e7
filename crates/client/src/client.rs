use crate::{
    Builder, ConformanceClass, Error, ItemSearch, Link, Request, Result, StacApiIo, Transport,
    pages::paginate,
};
use async_stream::try_stream;
use futures::{Stream, TryStreamExt, pin_mut};
use http::{Method, StatusCode};
use serde_json::{Map, Value};
use stac::{Collection, Item};
use std::sync::Arc;
use url::Url;

/// The link relation of a queryables endpoint.
pub const QUERYABLES_REL: &str = "http://www.opengis.net/def/rel/ogc/1.0/queryables";

/// A client for a STAC API, opened from its landing page.
#[derive(Debug, Clone)]
pub struct Client {
    io: Arc<StacApiIo>,
    url: Url,
    root: Map<String, Value>,
    links: Vec<Link>,
}

impl Client {
    /// Opens a STAC API.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use stac_client::Client;
    ///
    /// # tokio_test::block_on(async {
    /// let client = Client::open("https://planetarycomputer.microsoft.com/api/stac/v1")
    ///     .await
    ///     .unwrap();
    /// # })
    /// ```
    pub async fn open(url: impl AsRef<str>) -> Result<Client> {
        Client::open_with(url, StacApiIo::new()?, false).await
    }

    /// Opens a STAC API with a configured transport.
    ///
    /// The transport's conformance is set from the landing page's
    /// `conformsTo`. Conformance is ignored entirely if `ignore_conformance`
    /// is true, or if the landing page has a search link but no
    /// `conformsTo`.
    pub async fn open_with(
        url: impl AsRef<str>,
        io: StacApiIo,
        ignore_conformance: bool,
    ) -> Result<Client> {
        let url = Url::parse(url.as_ref())?;
        let root = io.fetch_json(Request::get(url.clone())).await?;
        let links: Vec<Link> = root
            .get("links")
            .map(|links| serde_json::from_value(links.clone()))
            .transpose()?
            .unwrap_or_default();
        let conforms_to: Option<Vec<String>> = root
            .get("conformsTo")
            .map(|conforms_to| serde_json::from_value(conforms_to.clone()))
            .transpose()?;
        let client = Client {
            io: Arc::new(io),
            url,
            root,
            links,
        };
        let has_search_link = client
            .search_link()
            .is_some_and(|link| !link.href.is_empty());
        if ignore_conformance || (conforms_to.is_none() && has_search_link) {
            tracing::info!("ignoring conformance classes of {}", client.url);
            client.io.set_conformance(None);
        } else {
            client.io.set_conformance(Some(conforms_to.unwrap_or_default()));
        }
        Ok(client)
    }

    /// Returns the id of the landing page.
    pub fn id(&self) -> Option<&str> {
        self.root.get("id").and_then(Value::as_str)
    }

    /// Returns the url this client was opened with.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the landing page.
    pub fn root(&self) -> &Map<String, Value> {
        &self.root
    }

    /// Returns the transport shared by this client and its searches.
    pub fn io(&self) -> &Arc<StacApiIo> {
        &self.io
    }

    /// Returns true if the API supports this conformance class.
    pub fn conforms_to(&self, class: ConformanceClass) -> bool {
        self.io.conforms_to(class)
    }

    /// Returns the `rel="search"` link with a JSON or GeoJSON media type.
    pub fn search_link(&self) -> Option<&Link> {
        self.links
            .iter()
            .find(|link| link.rel == "search" && (link.is_json() || link.is_geojson()))
    }

    /// Starts a search of this API's item search endpoint.
    ///
    /// Fails if the API doesn't support item search or has no search link.
    pub fn search(&self) -> Result<Builder> {
        self.io.assert_conforms_to(ConformanceClass::ItemSearch)?;
        let link = self.search_link().ok_or(Error::NoSearchLink)?;
        let url = self.url.join(&link.href)?;
        Ok(ItemSearch::builder(url))
    }

    /// Builds a search that shares this client's transport.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use stac_client::Client;
    ///
    /// # tokio_test::block_on(async {
    /// let client = Client::open("https://planetarycomputer.microsoft.com/api/stac/v1")
    ///     .await
    ///     .unwrap();
    /// let search = client
    ///     .build_search(client.search().unwrap().collections("sentinel-2-l2a").max_items(10))
    ///     .unwrap();
    /// let matched = search.matched().await.unwrap();
    /// # })
    /// ```
    pub fn build_search(&self, builder: Builder) -> Result<ItemSearch> {
        builder.build(self.io.clone())
    }

    /// Returns every collection in this API.
    ///
    /// Pages through `/collections` if the API supports it, otherwise follows
    /// the landing page's child links.
    pub fn collections(&self) -> impl Stream<Item = Result<Collection>> + '_ {
        try_stream! {
            if self.supports_collections() {
                let url = self.endpoint(&["collections"])?;
                let pages = paginate(self.io.as_ref(), self.fetch(url), "collections", None);
                pin_mut!(pages);
                while let Some(mut page) = pages.try_next().await? {
                    if let Some(Value::Array(collections)) = page.remove("collections") {
                        for collection in collections {
                            yield serde_json::from_value::<Collection>(collection)?;
                        }
                    }
                }
            } else {
                for link in self.links.iter().filter(|link| link.rel == "child") {
                    let url = self.url.join(&link.href)?;
                    let value = self.io.fetch_json(Request::get(url)).await?;
                    if value.get("type").and_then(Value::as_str) == Some("Collection") {
                        yield serde_json::from_value::<Collection>(Value::Object(value))?;
                    }
                }
            }
        }
    }

    /// Returns a single collection, or `None` if it doesn't exist.
    pub async fn collection(&self, id: &str) -> Result<Option<Collection>> {
        if self.supports_collections() {
            let url = self.endpoint(&["collections", id])?;
            self.fetch_optional(url).await
        } else {
            let collections = self.collections();
            pin_mut!(collections);
            while let Some(collection) = collections.try_next().await? {
                if collection.id == id {
                    return Ok(Some(collection));
                }
            }
            Ok(None)
        }
    }

    /// Returns a single item, or `None` if it doesn't exist.
    ///
    /// Uses the features endpoint if the API supports it, otherwise an item
    /// search by id.
    pub async fn item(&self, collection_id: &str, item_id: &str) -> Result<Option<Item>> {
        if self.conforms_to(ConformanceClass::Features) {
            let url = self.endpoint(&["collections", collection_id, "items", item_id])?;
            self.fetch_optional(url).await
        } else if self.conforms_to(ConformanceClass::ItemSearch) {
            let builder = self.search().map(|builder| {
                builder
                    .method(Method::GET)
                    .ids(vec![item_id])
                    .collections(vec![collection_id])
                    .max_items(1)
            });
            let items = self.search_items(builder);
            pin_mut!(items);
            items.try_next().await
        } else {
            Err(Error::NotConformant(ConformanceClass::Features))
        }
    }

    /// Returns the items with these ids, from any collection.
    ///
    /// Delegates to an item search.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use futures::TryStreamExt;
    /// use stac_client::Client;
    ///
    /// # tokio_test::block_on(async {
    /// let client = Client::open("https://planetarycomputer.microsoft.com/api/stac/v1")
    ///     .await
    ///     .unwrap();
    /// let items: Vec<_> = client
    ///     .items(&["S2B_MSIL2A_20230601T173909_R098_T13TDE_20230601T221113"])
    ///     .try_collect()
    ///     .await
    ///     .unwrap();
    /// # })
    /// ```
    pub fn items(&self, ids: &[&str]) -> impl Stream<Item = Result<Item>> + '_ {
        let builder = self.search().map(|builder| builder.ids(ids.to_vec()));
        self.search_items(builder)
    }

    /// Returns every item in this API.
    ///
    /// Delegates to an item search with no filters.
    pub fn all_items(&self) -> impl Stream<Item = Result<Item>> + '_ {
        self.search_items(self.search())
    }

    /// Returns the items of one collection.
    ///
    /// Uses a `GET` item search restricted to the collection if the API
    /// supports item search. Otherwise pages through the collection's `items`
    /// link, or `/collections/{id}/items` if it has none.
    pub fn collection_items<'a>(
        &'a self,
        collection_id: &'a str,
    ) -> impl Stream<Item = Result<Item>> + 'a {
        try_stream! {
            if self.conforms_to(ConformanceClass::ItemSearch) && self.search_link().is_some() {
                let builder = self
                    .search()
                    .map(|builder| builder.method(Method::GET).collections(vec![collection_id]));
                let items = self.search_items(builder);
                pin_mut!(items);
                while let Some(item) = items.try_next().await? {
                    yield item;
                }
            } else {
                self.io.assert_conforms_to(ConformanceClass::Features)?;
                let url = self.collection_link(collection_id, "items", "items").await?;
                let pages = paginate(self.io.as_ref(), self.fetch(url), "features", None);
                pin_mut!(pages);
                while let Some(mut page) = pages.try_next().await? {
                    if let Some(Value::Array(features)) = page.remove("features") {
                        for feature in features {
                            yield serde_json::from_value::<Item>(feature)?;
                        }
                    }
                }
            }
        }
    }

    /// Returns the queryables of this API, or of some of its collections.
    ///
    /// The properties of every collection's queryables are combined.
    pub async fn queryables(&self, collections: &[&str]) -> Result<Map<String, Value>> {
        self.io.assert_conforms_to(ConformanceClass::Filter)?;
        if collections.is_empty() {
            let url = match self.links.iter().find(|link| link.rel == QUERYABLES_REL) {
                Some(link) => self.url.join(&link.href)?,
                None => self.endpoint(&["queryables"])?,
            };
            return self.fetch_queryables(url).await;
        }
        let mut queryables: Option<Map<String, Value>> = None;
        for id in collections {
            let url = self
                .collection_link(id, QUERYABLES_REL, "queryables")
                .await?;
            let mut next = self.fetch_queryables(url).await?;
            match queryables.as_mut() {
                None => {
                    let _ = next.remove("$id");
                    queryables = Some(next);
                }
                Some(queryables) => {
                    if let (Some(Value::Object(properties)), Some(Value::Object(more))) =
                        (queryables.get_mut("properties"), next.remove("properties"))
                    {
                        properties.extend(more);
                    }
                }
            }
        }
        Ok(queryables.unwrap_or_default())
    }

    /// Resolves a collection's link with this rel.
    ///
    /// Falls back to `/collections/{id}/{fallback}` if the collection has no
    /// such link.
    async fn collection_link(&self, collection_id: &str, rel: &str, fallback: &str) -> Result<Url> {
        let collection = self
            .collection(collection_id)
            .await?
            .ok_or_else(|| Error::CollectionNotFound(collection_id.to_string()))?;
        let base = self.endpoint(&["collections", collection_id])?;
        match collection.links.iter().find(|link| link.rel == rel) {
            Some(link) => base.join(&link.href).map_err(Error::from),
            None => self.endpoint(&["collections", collection_id, fallback]),
        }
    }

    fn search_items(&self, builder: Result<Builder>) -> impl Stream<Item = Result<Item>> + '_ {
        try_stream! {
            let search = self.build_search(builder?)?;
            let items = search.items();
            pin_mut!(items);
            while let Some(item) = items.try_next().await? {
                yield serde_json::from_value::<Item>(Value::Object(item))?;
            }
        }
    }

    fn supports_collections(&self) -> bool {
        self.conforms_to(ConformanceClass::Collections) || self.conforms_to(ConformanceClass::Features)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.url.clone();
        let _ = url
            .path_segments_mut()
            .map_err(|_| Error::UrlParse(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch(&self, url: Url) -> Result<(Url, Map<String, Value>)> {
        let value = self.io.fetch_json(Request::get(url.clone())).await?;
        Ok((url, value))
    }

    async fn fetch_optional<T>(&self, url: Url) -> Result<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        match self.io.fetch_json(Request::get(url)).await {
            Ok(value) => serde_json::from_value(Value::Object(value))
                .map(Some)
                .map_err(Error::from),
            Err(err) if err.status_code() == Some(StatusCode::NOT_FOUND) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn fetch_queryables(&self, url: Url) -> Result<Map<String, Value>> {
        let value = self.io.fetch_json(Request::get(url.clone())).await?;
        if value.contains_key("properties") {
            Ok(value)
        } else {
            Err(Error::InvalidResponse {
                url,
                field: "properties",
            })
        }
    }
}
