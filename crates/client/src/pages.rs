use crate::{Error, Item, Request, Result, Transport};
use async_stream::try_stream;
use futures::Stream;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use stac::{Link, api::Context};
use std::future::Future;
use url::Url;

/// One page of an item search.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Page {
    /// The items on this page.
    ///
    /// These are raw objects because the fields extension can trim them.
    pub features: Vec<Item>,

    /// Links, including a `rel="next"` link if there are more pages.
    ///
    /// Entries that aren't valid links are dropped.
    #[serde(
        default,
        deserialize_with = "valid_links",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub links: Vec<Link>,

    /// The context extension object, if the server sent a valid one.
    #[serde(
        default,
        deserialize_with = "valid_context",
        skip_serializing_if = "Option::is_none"
    )]
    pub context: Option<Context>,

    /// The number of items that match the search.
    #[serde(rename = "numberMatched", skip_serializing_if = "Option::is_none")]
    pub number_matched: Option<u64>,

    /// The number of items on this page.
    #[serde(rename = "numberReturned", skip_serializing_if = "Option::is_none")]
    pub number_returned: Option<u64>,

    /// Additional fields, e.g. `type`.
    #[serde(flatten)]
    pub additional_fields: Map<String, Value>,
}

impl Page {
    /// Decodes a page from a response object.
    pub fn from_json(value: Map<String, Value>) -> Result<Page> {
        serde_json::from_value(Value::Object(value)).map_err(Error::from)
    }

    /// Returns this page's `rel="next"` link, if there is one.
    pub fn next_link(&self) -> Option<&Link> {
        self.links.iter().find(|link| link.rel == "next")
    }

    /// Returns the number of matched items.
    ///
    /// `context.matched` is preferred over `numberMatched`.
    ///
    /// # Examples
    ///
    /// ```
    /// use stac_client::Page;
    ///
    /// let page = Page {
    ///     number_matched: Some(42),
    ///     ..Default::default()
    /// };
    /// assert_eq!(page.matched(), Some(42));
    /// ```
    pub fn matched(&self) -> Option<u64> {
        self.context
            .as_ref()
            .and_then(|context| context.matched)
            .or(self.number_matched)
    }
}

fn valid_links<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<Link>, D::Error> {
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect())
}

fn valid_context<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<Context>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| serde_json::from_value(value).ok()))
}

/// Builds the request that follows a link.
///
/// Relative hrefs are resolved against `base`. A `POST` link sends its own
/// body, or `parameters` with the body merged on top when `merge` is set.
/// Every other link is a `GET`, with its parameters already in the href.
///
/// # Examples
///
/// ```
/// use stac::Link;
/// use stac_client::follow_link;
///
/// let link = Link::new("search?token=abc", "next");
/// let request = follow_link(&link, &"http://stac.test/api/".parse().unwrap(), None).unwrap();
/// assert_eq!(request.url.as_str(), "http://stac.test/api/search?token=abc");
/// ```
pub fn follow_link(
    link: &Link,
    base: &Url,
    parameters: Option<&Map<String, Value>>,
) -> Result<Request> {
    let url = base.join(&link.href)?;
    let is_post = link
        .method
        .as_deref()
        .is_some_and(|method| method.eq_ignore_ascii_case("POST"));
    let mut request = if is_post {
        let mut body = if link.merge == Some(true) {
            parameters.cloned().unwrap_or_default()
        } else {
            Map::new()
        };
        body.extend(link.body.clone().unwrap_or_default());
        Request::post(url, body)
    } else {
        Request::get(url)
    };
    if let Some(headers) = &link.headers {
        for (key, value) in headers {
            let value = match value {
                Value::String(s) => s.clone(),
                _ => value.to_string(),
            };
            request.headers.push((key.clone(), value));
        }
    }
    Ok(request)
}

/// Lazily fetches every page of a paginated response.
///
/// `first` produces the first page and the url it came from. Each later page
/// is fetched by following the previous page's `rel="next"` link, only when
/// the consumer asks for it. A page whose `field` array is empty ends the
/// stream without being yielded. Only the next link itself is decoded, after
/// its page has been yielded.
pub(crate) fn paginate<'a, T, F>(
    transport: &'a T,
    first: F,
    field: &'static str,
    parameters: Option<Map<String, Value>>,
) -> impl Stream<Item = Result<Map<String, Value>>> + 'a
where
    T: Transport + ?Sized,
    F: Future<Output = Result<(Url, Map<String, Value>)>> + 'a,
{
    try_stream! {
        let (mut url, mut page) = first.await?;
        loop {
            if is_empty(&page, field, &url)? {
                break;
            }
            let next = next_link(&page);
            yield page;
            let Some(next) = next else {
                break;
            };
            let link: Link = serde_json::from_value(next)?;
            let request = follow_link(&link, &url, parameters.as_ref())?;
            url = request.url.clone();
            page = transport.fetch_json(request).await?;
        }
    }
}

fn is_empty(page: &Map<String, Value>, field: &'static str, url: &Url) -> Result<bool> {
    match page.get(field) {
        Some(Value::Array(values)) => Ok(values.is_empty()),
        _ => Err(Error::InvalidResponse {
            url: url.clone(),
            field,
        }),
    }
}

fn next_link(page: &Map<String, Value>) -> Option<Value> {
    page.get("links")?
        .as_array()?
        .iter()
        .find(|link| link.get("rel").and_then(Value::as_str) == Some("next"))
        .cloned()
}
