/*
    couch.rs - CouchDB client over HTTP

    Maps the DocumentStore contract onto the CouchDB REST API:

        create_database   PUT    /{db}        412 -> AlreadyExists
        destroy_database  DELETE /{db}        404 -> NotFound
        get               GET    /{db}/{id}   404 -> NotFound
        insert            PUT    /{db}/{id}   409 -> Conflict

    Design documents are addressed as `/{db}/_design/{name}`; any other id is
    sent as a single percent-encoded path segment.
*/

use super::errors::{StoreError, StoreResult};
use super::{with_revision, Document, DocumentStore};
use crate::config::StoreConfig;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

const DESIGN_PREFIX: &str = "_design/";

/// Error body CouchDB sends with non-2xx answers
#[derive(Debug, Default, Deserialize)]
struct CouchErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    reason: String,
}

/// Explicitly constructed CouchDB connection
#[derive(Clone)]
pub struct CouchClient {
    base: Url,
    client: Client,
    username: String,
    password: String,
}

impl CouchClient {
    /// Build a client from connection settings
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let base = Url::parse(&config.base_url())
            .map_err(|e| StoreError::InvalidUrl(format!("{}: {}", config.base_url(), e)))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl(config.base_url()));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StoreError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base,
            client,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn database_url(&self, db: &str) -> StoreResult<Url> {
        if db.is_empty() {
            return Err(StoreError::InvalidUrl("empty database name".to_string()));
        }
        self.url(&[db])
    }

    fn document_url(&self, db: &str, id: &str) -> StoreResult<Url> {
        if db.is_empty() || id.is_empty() {
            return Err(StoreError::InvalidUrl(format!("empty database or document id: {db:?}/{id:?}")));
        }
        match id.strip_prefix(DESIGN_PREFIX) {
            Some(name) if !name.is_empty() => self.url(&[db, "_design", name]),
            _ => self.url(&[db, id]),
        }
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// Turn a non-success response into a StoreError
    async fn error_from(response: Response) -> StoreError {
        let status = response.status();
        let body: CouchErrorBody = response.json().await.unwrap_or_default();

        match status {
            StatusCode::PRECONDITION_FAILED if body.error == "file_exists" || body.error.is_empty() => {
                StoreError::AlreadyExists(body.reason)
            }
            StatusCode::NOT_FOUND => StoreError::NotFound(body.reason),
            StatusCode::CONFLICT => StoreError::Conflict(body.reason),
            _ => StoreError::Http {
                status: status.as_u16(),
                error: body.error,
                reason: body.reason,
            },
        }
    }
}

impl fmt::Debug for CouchClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CouchClient")
            .field("base", &self.base.as_str())
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DocumentStore for CouchClient {
    async fn create_database(&self, name: &str) -> StoreResult<()> {
        let url = self.database_url(name)?;
        let response = self.request(Method::PUT, url).send().await?;

        if response.status().is_success() {
            tracing::debug!("Created database {}", name);
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }

    async fn destroy_database(&self, name: &str) -> StoreResult<()> {
        let url = self.database_url(name)?;
        let response = self.request(Method::DELETE, url).send().await?;

        if response.status().is_success() {
            tracing::debug!("Destroyed database {}", name);
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }

    async fn get(&self, db: &str, id: &str) -> StoreResult<Document> {
        let url = self.document_url(db, id)?;
        let response = self.request(Method::GET, url).send().await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let value: Value = response.json().await?;
        Document::from_value(id, value)
    }

    async fn insert(
        &self,
        db: &str,
        id: &str,
        body: &Value,
        rev: Option<&str>,
    ) -> StoreResult<Option<String>> {
        let url = self.document_url(db, id)?;
        let body = with_revision(body, rev)?;
        let response = self.request(Method::PUT, url).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        // `_security` answers `{"ok":true}` without a revision
        let answer: Value = response.json().await.unwrap_or(Value::Null);
        Ok(answer.get("rev").and_then(Value::as_str).map(str::to_string))
    }
}
