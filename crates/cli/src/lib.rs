// The verbosity stuff is cribbed from https://github.com/clap-rs/clap-verbosity-flag/blob/c621a6a8a7c0b6df8f1464a985a5d076b4915693/src/lib.rs and updated for tracing

#![deny(unused_crate_dependencies)]

use anyhow::{Error, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand};
use futures_util::TryStreamExt;
use http::Method;
use stac_client::{Client, FilterLang, StacApiIo};
use std::{io::Write, str::FromStr};
use tracing::metadata::Level;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{
    fmt::writer::MakeWriterExt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// stac-client: A command-line interface for searching STAC APIs
#[derive(Debug, Parser)]
pub struct StacClient {
    #[command(subcommand)]
    command: Command,

    /// Headers to send with every request.
    ///
    /// Each header should be provided in `KEY=VALUE` format,
    /// e.g.: `stac-client --header "x-api-key=redacted" search https://stac.test`
    #[arg(long = "header", global = true, verbatim_doc_comment)]
    headers: Vec<KeyValue>,

    /// Query parameters to send with every request, in `KEY=VALUE` format.
    #[arg(long = "param", global = true)]
    parameters: Vec<KeyValue>,

    /// Don't check the API's conformance classes before sending requests.
    #[arg(long = "ignore-conformance", global = true, default_value_t = false)]
    ignore_conformance: bool,

    /// Whether to print compact JSON output.
    ///
    /// By default, JSON output will printed "compact" if it is being output to a file, and printed "pretty" if it is being output to standard output.
    /// Use this argument to force one or the other.
    #[arg(short = 'c', long = "compact-json", global = true)]
    compact_json: Option<bool>,

    #[arg(
        long,
        short = 'v',
        action = clap::ArgAction::Count,
        global = true,
        help = ErrorLevel::verbose_help(),
        long_help = ErrorLevel::verbose_long_help(),
    )]
    verbose: u8,

    #[arg(
        long,
        short = 'q',
        action = clap::ArgAction::Count,
        global = true,
        help = ErrorLevel::quiet_help(),
        long_help = ErrorLevel::quiet_long_help(),
        conflicts_with = "verbose",
    )]
    quiet: u8,
}

/// A stac-client subcommand.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Searches a STAC API for items.
    ///
    /// Prints the found items as a GeoJSON feature collection, or the number
    /// of matched items if `--matched` is passed.
    Search {
        /// The root url of the STAC API.
        href: String,

        /// The output file.
        ///
        /// To write to standard output, pass `-` or don't provide an argument at all.
        outfile: Option<String>,

        /// The http method to search with.
        ///
        /// Defaults to POST. A POST search falls back to GET if the API
        /// rejects it.
        #[arg(long = "method", value_enum)]
        method: Option<SearchMethod>,

        /// The maximum number of items to return from the search.
        #[arg(short = 'n', long = "max-items")]
        max_items: Option<usize>,

        /// The page size to be returned from the server.
        #[arg(long = "limit")]
        limit: Option<u64>,

        /// Requested bounding box, as a comma-delimited string.
        #[arg(long = "bbox", allow_hyphen_values = true)]
        bbox: Option<String>,

        /// A single datetime or an interval ('/' separator).
        ///
        /// Dates can be truncated (e.g. `2017`, `2017-06`) and are expanded to
        /// cover the whole period. Use double dots `..` for open ranges.
        #[arg(long = "datetime")]
        datetime: Option<String>,

        /// Searches items by performing intersection between their geometry and provided GeoJSON geometry.
        #[arg(long = "intersects")]
        intersects: Option<String>,

        /// Comma-delimited list of Item ids to return.
        #[arg(long = "ids")]
        ids: Option<String>,

        /// Comma-delimited list of one or more Collection IDs that each matching Item must be in.
        #[arg(long = "collections")]
        collections: Option<String>,

        /// Query extension expressions, e.g. `eo:cloud_cover<10`.
        #[arg(long = "query")]
        query: Vec<String>,

        /// CQL2 filter expression.
        ///
        /// Values that parse as a JSON object are sent as cql2-json, all others
        /// as cql2-text.
        #[arg(long = "filter")]
        filter: Option<String>,

        /// The language of `--filter`, if it can't be inferred.
        #[arg(long = "filter-lang")]
        filter_lang: Option<FilterLang>,

        /// Fields by which to sort results, as a comma-delimited string.
        #[arg(long = "sortby", allow_hyphen_values = true)]
        sortby: Option<String>,

        /// Include/exclude fields from item collections, as a comma-delimited string.
        #[arg(long = "fields", allow_hyphen_values = true)]
        fields: Option<String>,

        /// Only print the number of matched items.
        #[arg(long = "matched", default_value_t = false)]
        matched: bool,
    },

    /// Lists the collections of a STAC API.
    Collections {
        /// The root url of the STAC API.
        href: String,

        /// The output file.
        ///
        /// To write to standard output, pass `-` or don't provide an argument at all.
        outfile: Option<String>,
    },

    /// Fetches a single item.
    Item {
        /// The root url of the STAC API.
        href: String,

        /// The id of the item's collection.
        collection_id: String,

        /// The id of the item.
        item_id: String,

        /// The output file.
        ///
        /// To write to standard output, pass `-` or don't provide an argument at all.
        outfile: Option<String>,
    },

    /// Prints the queryables of a STAC API.
    Queryables {
        /// The root url of the STAC API.
        href: String,

        /// The output file.
        ///
        /// To write to standard output, pass `-` or don't provide an argument at all.
        outfile: Option<String>,

        /// Only the queryables of these collections.
        #[arg(long = "collection")]
        collections: Vec<String>,
    },

    /// Generate completion scripts for a given shell.
    GenerateCompletions {
        /// The shell to generate completion scripts for.
        shell: clap_complete::Shell,
    },
}

/// The http method of a search.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum SearchMethod {
    /// Search with query parameters
    Get,
    /// Search with a JSON body
    Post,
}

#[derive(Debug, Clone)]
struct KeyValue(String, String);

#[derive(Copy, Clone, Debug, Default)]
struct ErrorLevel;

impl StacClient {
    /// Runs this command.
    ///
    /// If `init_tracing_subscriber` is `false`, it is expected that the caller
    /// is setting up the appropriate logging.
    pub async fn run(self, init_tracing_subscriber: bool) -> Result<()> {
        if init_tracing_subscriber {
            let indicatif_layer = IndicatifLayer::new();
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer().with_writer(
                        indicatif_layer
                            .get_stderr_writer()
                            .with_max_level(self.log_level().unwrap_or(Level::WARN)),
                    ),
                )
                .with(indicatif_layer)
                .init();
        }
        match self.command {
            Command::Search {
                ref href,
                ref outfile,
                method,
                max_items,
                limit,
                ref bbox,
                ref datetime,
                ref intersects,
                ref ids,
                ref collections,
                ref query,
                ref filter,
                filter_lang,
                ref sortby,
                ref fields,
                matched,
            } => {
                let client = self.open(href).await?;
                let mut builder = client.search()?;
                if let Some(method) = method {
                    builder = builder.method(method.into());
                }
                if let Some(limit) = limit {
                    builder = builder.limit(limit);
                }
                if let Some(max_items) = max_items {
                    builder = builder.max_items(max_items);
                }
                if let Some(bbox) = bbox {
                    builder = builder.bbox(bbox.as_str());
                }
                if let Some(datetime) = datetime {
                    builder = builder.datetime(datetime.as_str());
                }
                if let Some(intersects) = intersects {
                    builder = builder.intersects(intersects.as_str());
                }
                if let Some(ids) = ids {
                    builder = builder.ids(ids.as_str());
                }
                if let Some(collections) = collections {
                    builder = builder.collections(collections.as_str());
                }
                if !query.is_empty() {
                    builder = builder.query(query.clone());
                }
                if let Some(filter) = filter {
                    builder = match serde_json::from_str::<serde_json::Value>(filter) {
                        Ok(serde_json::Value::Object(object)) => builder.filter(object),
                        _ => builder.filter(filter.as_str()),
                    };
                }
                if let Some(filter_lang) = filter_lang {
                    builder = builder.filter_lang(filter_lang);
                }
                if let Some(sortby) = sortby {
                    builder = builder.sortby(sortby.as_str());
                }
                if let Some(fields) = fields {
                    builder = builder.fields(fields.as_str());
                }
                let search = client.build_search(builder)?;
                if matched {
                    let matched = search
                        .matched()
                        .await?
                        .ok_or_else(|| anyhow!("{} did not report a matched count", search.url()))?;
                    self.put(outfile.as_deref(), matched.into()).await
                } else {
                    let feature_collection = search.items_as_raw().await?;
                    self.put(
                        outfile.as_deref(),
                        serde_json::Value::Object(feature_collection.clone()),
                    )
                    .await
                }
            }
            Command::Collections {
                ref href,
                ref outfile,
            } => {
                let client = self.open(href).await?;
                let collections: Vec<_> = client.collections().try_collect().await?;
                let value = serde_json::json!({ "collections": collections });
                self.put(outfile.as_deref(), value).await
            }
            Command::Item {
                ref href,
                ref collection_id,
                ref item_id,
                ref outfile,
            } => {
                let client = self.open(href).await?;
                let item = client
                    .item(collection_id, item_id)
                    .await?
                    .ok_or_else(|| anyhow!("item not found: {collection_id}/{item_id}"))?;
                self.put(outfile.as_deref(), serde_json::to_value(item)?)
                    .await
            }
            Command::Queryables {
                ref href,
                ref outfile,
                ref collections,
            } => {
                let client = self.open(href).await?;
                let collections: Vec<&str> = collections.iter().map(String::as_str).collect();
                let queryables = client.queryables(&collections).await?;
                self.put(outfile.as_deref(), serde_json::Value::Object(queryables))
                    .await
            }
            Command::GenerateCompletions { shell } => {
                let mut command = StacClient::command();
                clap_complete::generate(shell, &mut command, "stac-client", &mut std::io::stdout());
                Ok(())
            }
        }
    }

    async fn open(&self, href: &str) -> Result<Client> {
        let io = StacApiIo::builder()
            .headers(self.headers.iter().map(|kv| (&kv.0, &kv.1)))
            .parameters(self.parameters.iter().map(|kv| (&kv.0, &kv.1)))
            .build()?;
        Client::open_with(href, io, self.ignore_conformance)
            .await
            .map_err(Error::from)
    }

    async fn put(&self, href: Option<&str>, value: serde_json::Value) -> Result<()> {
        let href = href.and_then(|s| if s == "-" { None } else { Some(s) });
        let compact = self.compact_json.unwrap_or(href.is_some());
        let mut bytes = if compact {
            serde_json::to_vec(&value)?
        } else {
            serde_json::to_vec_pretty(&value)?
        };
        bytes.push(b'\n');
        if let Some(href) = href {
            tokio::fs::write(href, bytes).await?;
        } else {
            std::io::stdout().write_all(&bytes)?;
        }
        Ok(())
    }

    /// Returns the log level set by `-v` and `-q`.
    pub fn log_level(&self) -> Option<Level> {
        level_enum(self.verbosity())
    }

    fn verbosity(&self) -> i8 {
        level_value(ErrorLevel::default()) - (self.quiet as i8) + (self.verbose as i8)
    }
}

impl ErrorLevel {
    fn default() -> Option<Level> {
        Some(Level::ERROR)
    }

    fn verbose_help() -> Option<&'static str> {
        Some("Increase verbosity")
    }

    fn verbose_long_help() -> Option<&'static str> {
        None
    }

    fn quiet_help() -> Option<&'static str> {
        Some("Decrease verbosity")
    }

    fn quiet_long_help() -> Option<&'static str> {
        None
    }
}

impl From<SearchMethod> for Method {
    fn from(method: SearchMethod) -> Method {
        match method {
            SearchMethod::Get => Method::GET,
            SearchMethod::Post => Method::POST,
        }
    }
}

impl FromStr for KeyValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some((key, value)) = s.split_once('=') {
            Ok(KeyValue(key.to_string(), value.to_string()))
        } else {
            Err(anyhow!("invalid key=value: {s}"))
        }
    }
}

fn level_enum(verbosity: i8) -> Option<Level> {
    match verbosity {
        i8::MIN..=-1 => None,
        0 => Some(Level::ERROR),
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        4..=i8::MAX => Some(Level::TRACE),
    }
}

fn level_value(level: Option<Level>) -> i8 {
    match level {
        None => -1,
        Some(Level::ERROR) => 0,
        Some(Level::WARN) => 1,
        Some(Level::INFO) => 2,
        Some(Level::DEBUG) => 3,
        Some(Level::TRACE) => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::{StacClient, level_enum};
    use clap::Parser;
    use tracing::metadata::Level;

    #[test]
    fn log_level() {
        let cli = StacClient::parse_from(["stac-client", "search", "http://stac.test"]);
        assert_eq!(cli.log_level(), Some(Level::ERROR));
        let cli = StacClient::parse_from(["stac-client", "-vv", "search", "http://stac.test"]);
        assert_eq!(cli.log_level(), Some(Level::INFO));
        let cli = StacClient::parse_from(["stac-client", "search", "http://stac.test", "-q"]);
        assert_eq!(cli.log_level(), None);
        assert_eq!(level_enum(10), Some(Level::TRACE));
    }

    #[test]
    fn key_values() {
        let cli = StacClient::parse_from([
            "stac-client",
            "--header",
            "x-api-key=a=b",
            "--param",
            "token=abc",
            "search",
            "http://stac.test",
        ]);
        assert_eq!(cli.headers[0].0, "x-api-key");
        assert_eq!(cli.headers[0].1, "a=b");
        assert_eq!(cli.parameters[0].1, "abc");
        assert!(
            StacClient::try_parse_from([
                "stac-client",
                "--header",
                "no-equals",
                "search",
                "http://stac.test",
            ])
            .is_err()
        );
    }

    #[test]
    fn search_flags() {
        let cli = StacClient::try_parse_from([
            "stac-client",
            "search",
            "http://stac.test",
            "--bbox",
            "-105.1,41.1,-105.0,41.2",
            "--sortby",
            "-datetime",
            "--filter-lang",
            "cql2-json",
            "--method",
            "get",
            "--query",
            "eo:cloud_cover<10",
            "--query",
            "gsd=30",
        ])
        .unwrap();
        let super::Command::Search {
            bbox,
            sortby,
            filter_lang,
            query,
            ..
        } = cli.command
        else {
            panic!("expected a search");
        };
        assert_eq!(bbox.as_deref(), Some("-105.1,41.1,-105.0,41.2"));
        assert_eq!(sortby.as_deref(), Some("-datetime"));
        assert_eq!(filter_lang, Some(stac_client::FilterLang::Cql2Json));
        assert_eq!(query.len(), 2);
        assert!(
            StacClient::try_parse_from([
                "stac-client",
                "search",
                "http://stac.test",
                "--filter-lang",
                "cql2-yaml",
            ])
            .is_err()
        );
    }
}

#[cfg(test)]
use {assert_cmd as _, mockito as _, rstest as _, tempfile as _};
