//! Catalog pagination and aggregation.
//!
//! The catalog endpoint returns one page of a category per POST. Pages are
//! requested strictly in sequence and merged into a single [`Catalog`] until
//! the total declared by the first page has been reached. Any anomaly (a
//! failed request, a page that does not parse) ends pagination early and the
//! partial catalog is returned.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::session::Session;

/// One downloadable asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Opaque identifier used to build the download URL.
    #[serde(rename = "file", deserialize_with = "lenient_string")]
    pub file_id: String,
    /// Destination base name.
    #[serde(deserialize_with = "lenient_string")]
    pub filename: String,
    /// Upload time in seconds since the epoch (UTC).
    #[serde(
        rename = "date_uploaded",
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub uploaded_at: Option<i64>,
    /// Destination directory, set by directory planning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_path: Option<PathBuf>,
    /// Any other fields the server sent, kept for the snapshot.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl FileEntry {
    /// Creates an entry with no destination and no extra fields.
    #[must_use]
    pub fn new(
        file_id: impl Into<String>,
        filename: impl Into<String>,
        uploaded_at: Option<i64>,
    ) -> Self {
        Self {
            file_id: file_id.into(),
            filename: filename.into(),
            uploaded_at,
            download_path: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// One page as returned by the catalog endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogPage {
    /// File identifiers on this page, in display order.
    #[serde(deserialize_with = "lenient_string_vec")]
    pub order: Vec<String>,
    /// Entries on this page keyed by identifier.
    #[serde(deserialize_with = "lenient_file_map")]
    pub files: BTreeMap<String, FileEntry>,
    /// Declared total number of entries in the category.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total: u64,
    /// Free-form server description.
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: String,
    /// Server status code.
    #[serde(default, deserialize_with = "lenient_code")]
    pub code: i64,
}

impl CatalogPage {
    /// Parses a page body.
    ///
    /// Only `order` and `files` are required. File records that do not
    /// decode are dropped with a warning instead of failing the page.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPage`] if the body is not JSON with `order`
    /// and `files` fields.
    pub fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| Error::MalformedPage(e.to_string()))
    }
}

/// Aggregated listing of one category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// File identifiers in page order.
    pub order: Vec<String>,
    /// Entries keyed by identifier.
    pub files: BTreeMap<String, FileEntry>,
    /// Total declared by the first page.
    pub total: u64,
    /// Description from the first page.
    pub description: String,
    /// Status code from the first page.
    #[serde(rename = "code")]
    pub status_code: i64,
}

impl Catalog {
    /// Appends a page: `order` is extended, `files` is key-merged.
    pub fn merge(&mut self, page: CatalogPage) {
        self.order.extend(page.order);
        self.files.extend(page.files);
    }

    /// Returns true once every declared entry has been collected.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.files.len() as u64 >= self.total
    }

    /// Returns the entries in catalog order.
    ///
    /// Identifiers listed in `order` come first (each once); entries that
    /// no page listed follow in key order.
    #[must_use]
    pub fn entries(&self) -> Vec<&FileEntry> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut entries: Vec<&FileEntry> = self
            .order
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| self.files.get(id))
            .collect();
        entries.extend(
            self.files
                .iter()
                .filter(|(id, _)| !seen.contains(id.as_str()))
                .map(|(_, entry)| entry),
        );
        entries
    }

    /// Returns mutable access to every entry.
    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut FileEntry> {
        self.files.values_mut()
    }
}

/// Parameters of one catalog page request.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    /// Media category (`photos`, `videos`, ...).
    pub category: &'a str,
    /// 1-based page number.
    pub page: u32,
    /// URL-escaped user identifier.
    pub user: &'a str,
}

/// Source of catalog pages.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetches and parses one page.
    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<CatalogPage>;
}

/// Catalog pages fetched over HTTP from a logged-in session.
pub struct HttpCatalog<'a> {
    session: &'a Session,
    endpoint: Url,
}

impl<'a> HttpCatalog<'a> {
    /// Binds the catalog endpoint path to a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be resolved against the session root.
    pub fn new(session: &'a Session, endpoint: &str) -> Result<Self> {
        Ok(Self {
            session,
            endpoint: session.resolve(endpoint)?,
        })
    }
}

#[async_trait]
impl CatalogSource for HttpCatalog<'_> {
    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<CatalogPage> {
        let page = request.page.to_string();
        let form = [
            ("type", request.category),
            ("p", page.as_str()),
            ("d", request.user),
            ("options[filter_sortby]", ""),
            ("options[filter_date_type]", "date_created"),
            ("options[filter_filename]", ""),
            ("options[start_date]", ""),
            ("options[end_date]", ""),
            ("options[device]", ""),
        ];
        let response = self
            .session
            .http()
            .post(self.endpoint.clone())
            .form(&form)
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(Error::Status {
                status: response.status().as_u16(),
                url: self.endpoint.to_string(),
            });
        }
        CatalogPage::parse(&response.text().await?)
    }
}

/// Percent-encodes a user identifier the way a URL path component is quoted.
#[must_use]
pub fn quote_user(user: &str) -> String {
    user.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'.' | b'-' | b'~' | b'/' => {
                char::from(b).to_string()
            }
            _ => format!("%{b:02X}"),
        })
        .collect()
}

/// Paginates `category` for `user` and merges every page into one catalog.
///
/// Pagination ends when the running count of listed identifiers reaches the
/// total declared by the first page. It also ends, returning what was
/// collected so far, when a page fails or does not parse, after
/// `config.max_empty_pages` consecutive empty pages, or after
/// `config.max_pages` pages.
pub async fn aggregate<S>(source: &S, user: &str, category: &str, config: &Config) -> Catalog
where
    S: CatalogSource + ?Sized,
{
    let user = quote_user(user);
    let mut catalog = Catalog::default();
    let mut declared: Option<u64> = None;
    let mut fetched: u64 = 0;
    let mut empty_streak: u32 = 0;

    for page in 1..=config.max_pages {
        if page > 1 {
            tokio::time::sleep(config.page_delay()).await;
        }

        let request = PageRequest {
            category,
            page,
            user: &user,
        };
        let data = match source.fetch_page(request).await {
            Ok(data) => data,
            Err(e) => {
                log::error!("Stopping {category} pagination at page {page}: {e}");
                return catalog;
            }
        };

        let total = *declared.get_or_insert_with(|| {
            catalog.total = data.total;
            catalog.description.clone_from(&data.description);
            catalog.status_code = data.code;
            data.total
        });

        let listed = data.order.len() as u64;
        catalog.merge(data);
        fetched += listed;
        log::debug!("{category} page {page}: {listed} entries, {fetched}/{total}");

        if fetched >= total {
            log::info!("Fetched {} {category} entries in {page} page(s)", catalog.files.len());
            return catalog;
        }

        if listed == 0 {
            empty_streak += 1;
            if empty_streak >= config.max_empty_pages {
                log::warn!(
                    "Stopping {category} pagination after {empty_streak} empty page(s) at {fetched}/{total}"
                );
                return catalog;
            }
        } else {
            empty_streak = 0;
        }
    }

    log::warn!(
        "Stopping {category} pagination at the {} page ceiling with {fetched}/{} entries",
        config.max_pages,
        catalog.total
    );
    catalog
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    value_to_string(Value::deserialize(deserializer)?)
        .ok_or_else(|| serde::de::Error::custom("expected a string or number"))
}

fn lenient_string_vec<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<String>, D::Error> {
    Vec::<Value>::deserialize(deserializer)?
        .into_iter()
        .map(|v| value_to_string(v).ok_or_else(|| serde::de::Error::custom("invalid identifier")))
        .collect()
}

/// Accepts an object, or the empty array some servers emit for "no files".
fn lenient_file_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, FileEntry>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Object(map) => Ok(map
            .into_iter()
            .filter_map(|(k, v)| match serde_json::from_value(v) {
                Ok(entry) => Some((k, entry)),
                Err(e) => {
                    log::warn!("Dropping unreadable file record {k}: {e}");
                    None
                }
            })
            .collect()),
        Value::Array(items) if items.is_empty() => Ok(BTreeMap::new()),
        _ => Err(serde::de::Error::custom("expected an object of files")),
    }
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom("total must be non-negative")),
        Value::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        Value::Null => Ok(0),
        _ => Err(serde::de::Error::custom("expected a count")),
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    Ok(value_to_string(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn lenient_code<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    })
}

#[allow(clippy::cast_possible_truncation)]
fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<i64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    })
}
