//! # PostgREST Backend
//!
//! `FeedBackend` over the PostgREST dialect (as served under `rest/v1/` by a
//! Supabase project). Tables:
//!
//! - `content`: one row per content item.
//! - `likes (user_id, content_id)`
//! - `follows (follower_id, creator_name)`
//!
//! Filters use PostgREST operators (`eq.`, `in.(...)`); every request carries the
//! project key in `apikey` and a bearer token (the viewer's access token when
//! signed in, the project key otherwise).
//!
//! Reads page through `limit`/`offset` over a total order, since the server caps
//! every response at its `max-rows` setting. Edge inserts are idempotent: a row
//! that already exists (a retried POST, or a stale view) counts as written.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::FeedBackend;
use crate::error::{BackendError, BackendResult};
use crate::model::{Category, ContentItem, FollowEdge, LikeEdge, ViewerId};
use crate::retrieve::ky_http::{ApiClient, ApiError, ClientOptions};

const CONTENT_PATH: &str = "rest/v1/content";
const LIKES_PATH: &str = "rest/v1/likes";
const FOLLOWS_PATH: &str = "rest/v1/follows";

/// Item ids per like-edge request, keeping the `in.(...)` filter within URL limits.
const LIKE_ID_CHUNK: usize = 100;

/// Rows per read page. Must not exceed the server's `max-rows` (1000 on Supabase).
pub const DEFAULT_PAGE_SIZE: usize = 1000;

const LIKE_CONFLICT: &str = "user_id,content_id";
const FOLLOW_CONFLICT: &str = "follower_id,creator_name";

/// Connection settings for `RestBackend`.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co/`.
    pub base_url: String,
    pub api_key: String,
    /// The signed-in viewer's access token. Writes need it under row-level policies.
    pub access_token: Option<String>,
    pub max_retries: u32,
    pub timeout: Duration,
    pub page_size: usize,
}

impl RestConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            access_token: None,
            max_retries: 3,
            timeout: Duration::from_secs(10),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }
}

impl From<ApiError> for BackendError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Json(e) => BackendError::Decode(e.to_string()),
            other => BackendError::Network(other.to_string()),
        }
    }
}

/// A path plus PostgREST query pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TableQuery {
    path: &'static str,
    params: Vec<(&'static str, String)>,
}

impl TableQuery {
    fn new(path: &'static str) -> Self {
        Self {
            path,
            params: Vec::new(),
        }
    }

    fn param(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.params.push((key, value.into()));
        self
    }

    fn pairs(&self) -> Vec<(&str, &str)> {
        self.params.iter().map(|(k, v)| (*k, v.as_str())).collect()
    }

    fn page(&self, offset: usize, limit: usize) -> Self {
        self.clone()
            .param("limit", limit.to_string())
            .param("offset", offset.to_string())
    }
}

/// Quotes a value for an `in.(...)` list when it holds PostgREST-reserved characters.
fn list_value(raw: &str) -> String {
    if raw.contains([',', '(', ')', '"', '\\', ':', '.', ' ']) {
        let escaped = raw.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{}\"", escaped)
    } else {
        raw.to_string()
    }
}

fn content_query(category: Category) -> TableQuery {
    TableQuery::new(CONTENT_PATH)
        .param("select", "*")
        .param("category", format!("eq.{}", category))
        .param("order", "created_at.desc,id.desc")
}

fn like_edges_query(item_ids: &[String]) -> TableQuery {
    let list: Vec<String> = item_ids.iter().map(|id| list_value(id)).collect();
    TableQuery::new(LIKES_PATH)
        .param("select", "user_id,content_id")
        .param("content_id", format!("in.({})", list.join(",")))
        .param("order", "content_id,user_id")
}

fn follow_edges_query(viewer: &ViewerId) -> TableQuery {
    TableQuery::new(FOLLOWS_PATH)
        .param("select", "follower_id,creator_name")
        .param("follower_id", format!("eq.{}", viewer))
        .param("order", "creator_name")
}

fn insert_query(path: &'static str, conflict: &str) -> TableQuery {
    TableQuery::new(path).param("on_conflict", conflict)
}

fn like_delete_query(edge: &LikeEdge) -> TableQuery {
    TableQuery::new(LIKES_PATH)
        .param("user_id", format!("eq.{}", edge.viewer_id))
        .param("content_id", format!("eq.{}", edge.item_id))
}

fn follow_delete_query(edge: &FollowEdge) -> TableQuery {
    TableQuery::new(FOLLOWS_PATH)
        .param("follower_id", format!("eq.{}", edge.follower_id))
        .param("creator_name", format!("eq.{}", edge.creator_name))
}

/// Maps a non-2xx write status. 4xx other than timeouts and rate limits means
/// the backend refused the row.
fn write_failure(status: u16, body: String) -> BackendError {
    match status {
        408 | 429 => BackendError::Status { status, body },
        400..=499 => BackendError::Rejected(format!("status {}: {}", status, body)),
        _ => BackendError::Status { status, body },
    }
}

/// `FeedBackend` backed by PostgREST tables.
pub struct RestBackend {
    api: ApiClient,
    page_size: usize,
}

impl RestBackend {
    pub fn new(config: RestConfig) -> BackendResult<Self> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| BackendError::Network(format!("Invalid api key header: {}", e)))?;
        headers.insert(HeaderName::from_static("apikey"), key);

        let bearer = config
            .access_token
            .clone()
            .unwrap_or_else(|| config.api_key.clone());
        let options = ClientOptions {
            max_retries: config.max_retries,
            timeout: config.timeout,
            default_headers: headers,
        };
        // Relative table paths must join beneath the base path.
        let mut base_url = config.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let api = ApiClient::with_options(&base_url, Some(bearer), options)?;
        log::info!("PostgREST backend at {}", api.base_url());
        Ok(Self {
            api,
            page_size: config.page_size.max(1),
        })
    }

    /// Reads every row matching `query`, one page at a time until a short page.
    async fn read<T: DeserializeOwned>(&self, query: &TableQuery) -> BackendResult<Vec<T>> {
        let mut rows = Vec::new();
        loop {
            let page = query.page(rows.len(), self.page_size);
            let res = self
                .api
                .request::<Vec<T>, ()>(Method::GET, page.path, &page.pairs(), None, None)
                .await?;
            if !res.success {
                return Err(BackendError::Status {
                    status: res.status,
                    body: res.error_body.unwrap_or_default(),
                });
            }
            let batch = res.data.unwrap_or_default();
            let done = batch.len() < self.page_size;
            rows.extend(batch);
            if done {
                return Ok(rows);
            }
        }
    }

    async fn write<B: Serialize>(
        &self,
        method: Method,
        query: &TableQuery,
        prefer: &'static str,
        body: Option<B>,
    ) -> BackendResult<()> {
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("prefer"), HeaderValue::from_static(prefer));
        let res = self
            .api
            .request::<serde_json::Value, B>(method, query.path, &query.pairs(), Some(headers), body)
            .await?;
        if !res.success {
            return Err(write_failure(res.status, res.error_body.unwrap_or_default()));
        }
        Ok(())
    }

    async fn insert<B: Serialize>(&self, path: &'static str, conflict: &str, row: B) -> BackendResult<()> {
        let query = insert_query(path, conflict);
        match self
            .write(Method::POST, &query, "return=minimal,resolution=ignore-duplicates", Some(row))
            .await
        {
            // Servers without a matching unique index still answer a duplicate with 409.
            Err(BackendError::Rejected(reason)) if reason.starts_with("status 409") => {
                log::debug!("Edge already present in {}: {}", path, reason);
                Ok(())
            }
            other => other,
        }
    }

    async fn delete(&self, query: &TableQuery) -> BackendResult<()> {
        self.write::<()>(Method::DELETE, query, "return=minimal", None).await
    }
}

#[async_trait]
impl FeedBackend for RestBackend {
    async fn list_content(&self, category: Category) -> BackendResult<Vec<ContentItem>> {
        self.read(&content_query(category)).await
    }

    async fn list_like_edges(&self, item_ids: &[String]) -> BackendResult<Vec<LikeEdge>> {
        let mut edges = Vec::new();
        for chunk in item_ids.chunks(LIKE_ID_CHUNK) {
            edges.extend(self.read::<LikeEdge>(&like_edges_query(chunk)).await?);
        }
        Ok(edges)
    }

    async fn list_follow_edges(&self, viewer: &ViewerId) -> BackendResult<Vec<FollowEdge>> {
        self.read(&follow_edges_query(viewer)).await
    }

    async fn insert_like(&self, edge: &LikeEdge) -> BackendResult<()> {
        self.insert(LIKES_PATH, LIKE_CONFLICT, edge).await
    }

    async fn delete_like(&self, edge: &LikeEdge) -> BackendResult<()> {
        self.delete(&like_delete_query(edge)).await
    }

    async fn insert_follow(&self, edge: &FollowEdge) -> BackendResult<()> {
        self.insert(FOLLOWS_PATH, FOLLOW_CONFLICT, edge).await
    }

    async fn delete_follow(&self, edge: &FollowEdge) -> BackendResult<()> {
        self.delete(&follow_delete_query(edge)).await
    }
}
