//! [`CatalogBackend`] over the catalog REST API.

use async_trait::async_trait;
use fieldx::fxstruct;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use reqwest::header::AUTHORIZATION;
use reqwest::Response;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;
use tracing::instrument;
use tracing::trace;

use crate::error::ApiError;
use crate::traits::CatalogBackend;
use crate::types::ItemKey;
use crate::types::Score;
use crate::types::WatchRecord;
use crate::types::WatchStatus;

#[derive(Clone, Debug)]
#[fxstruct(no_new, builder)]
pub struct HttpConfig {
    /// API root, e.g. `https://api.example.org/v1`.
    #[fieldx(get, builder(into))]
    base_url:   String,
    /// Bearer token of the signed-in user.
    #[fieldx(optional, get, builder(into))]
    token:      String,
    #[fieldx(get(copy), default(Duration::from_secs(15)))]
    timeout:    Duration,
    #[fieldx(get, builder(into), default(String::from(concat!("watch-cache/", env!("CARGO_PKG_VERSION")))))]
    user_agent: String,
}

// Wire form of a watch record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WatchBody {
    #[serde(default)]
    status:    Option<WatchStatus>,
    #[serde(default)]
    score:     Score,
    #[serde(default)]
    episodes:  u32,
    #[serde(default)]
    rewatches: u32,
    #[serde(default)]
    note:      Option<String>,
}

impl From<WatchBody> for WatchRecord {
    fn from(body: WatchBody) -> Self {
        Self {
            status:    body.status.unwrap_or_default(),
            score:     body.score,
            episodes:  body.episodes,
            rewatches: body.rewatches,
            note:      body.note,
        }
    }
}

impl From<&WatchRecord> for WatchBody {
    fn from(record: &WatchRecord) -> Self {
        Self {
            status:    Some(record.status),
            score:     record.score,
            episodes:  record.episodes,
            rewatches: record.rewatches,
            note:      record.note.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SuccessBody {
    success: bool,
}

#[derive(Clone, Debug)]
pub struct HttpBackend {
    client:   reqwest::Client,
    base_url: String,
    headers:  HeaderMap,
}

impl HttpBackend {
    pub fn new(config: HttpConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent().as_str())
            .build()?;

        let mut headers = HeaderMap::new();
        if let Some(token) = config.token() {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| ApiError::Config(e.to_string()))?,
            );
        }

        Ok(Self {
            client,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            headers,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn favourite_path(item: &ItemKey) -> String {
        format!("/favourite/{}/{}", item.content(), item.slug())
    }

    async fn send(&self, method: reqwest::Method, path: &str) -> Result<Response, ApiError> {
        trace!("{method} {path}");
        Ok(self
            .client
            .request(method, self.url(path))
            .headers(self.headers.clone())
            .send()
            .await?)
    }

    fn check(response: Response, path: &str) -> Result<Response, ApiError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound);
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                path:   path.to_string(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl CatalogBackend for HttpBackend {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_watch(&self, slug: &str) -> Result<Option<WatchRecord>, ApiError> {
        let path = format!("/watch/{slug}");
        match Self::check(self.send(reqwest::Method::GET, &path).await?, &path) {
            Ok(response) => Ok(Some(response.json::<WatchBody>().await?.into())),
            Err(ApiError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    #[instrument(level = "debug", skip(self, record))]
    async fn put_watch(&self, slug: &str, record: &WatchRecord) -> Result<Option<WatchRecord>, ApiError> {
        let path = format!("/watch/{slug}");
        let response = self
            .client
            .put(self.url(&path))
            .headers(self.headers.clone())
            .json(&WatchBody::from(record))
            .send()
            .await?;
        let bytes = Self::check(response, &path)?.bytes().await?;
        // Plain acknowledgements carry no record; only an echoed one is taken as authoritative.
        Ok(serde_json::from_slice::<WatchBody>(&bytes)
            .ok()
            .filter(|body| body.status.is_some())
            .map(WatchRecord::from))
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete_watch(&self, slug: &str) -> Result<bool, ApiError> {
        let path = format!("/watch/{slug}");
        match Self::check(self.send(reqwest::Method::DELETE, &path).await?, &path) {
            Ok(response) => Ok(response.json::<SuccessBody>().await?.success),
            // Nothing to remove is as good as removed.
            Err(ApiError::NotFound) => Ok(true),
            Err(err) => Err(err),
        }
    }

    #[instrument(level = "debug", skip(self, item), fields(item = %item))]
    async fn fetch_favourite(&self, item: &ItemKey) -> Result<bool, ApiError> {
        let path = Self::favourite_path(item);
        match Self::check(self.send(reqwest::Method::GET, &path).await?, &path) {
            Ok(_) => Ok(true),
            Err(ApiError::NotFound) => Ok(false),
            Err(err) => Err(err),
        }
    }

    #[instrument(level = "debug", skip(self, item), fields(item = %item))]
    async fn put_favourite(&self, item: &ItemKey) -> Result<(), ApiError> {
        let path = Self::favourite_path(item);
        Self::check(self.send(reqwest::Method::PUT, &path).await?, &path)?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self, item), fields(item = %item))]
    async fn delete_favourite(&self, item: &ItemKey) -> Result<(), ApiError> {
        let path = Self::favourite_path(item);
        match Self::check(self.send(reqwest::Method::DELETE, &path).await?, &path) {
            Ok(_) | Err(ApiError::NotFound) => Ok(()),
            Err(err) => Err(err),
        }
    }
}
