//! Microsoft Graph connector implementation
//!
//! Implements the `FileStorage` trait for OneDrive via Graph v1.0 drive-item
//! paths. All engine data lives under a configurable app folder; collection
//! directories are created lazily on first use.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use bridge_traits::error::Result as BridgeResult;
use bridge_traits::storage::{FileStorage, RemoteEntry};

use crate::error::{OneDriveError, Result};
use crate::types::{DriveItem, DriveItemList};

/// Microsoft Graph drive base URL
const GRAPH_DRIVE_BASE: &str = "https://graph.microsoft.com/v1.0/me/drive";

/// Results per children page (Graph caps at 200 for drive items)
const PAGE_SIZE: u32 = 200;

/// Retry attempts for throttled or transient failures
const MAX_RETRIES: u32 = 3;

/// Graph API connector
///
/// # Example
///
/// ```ignore
/// use provider_onedrive::OneDriveConnector;
/// use bridge_traits::storage::FileStorage;
///
/// let connector = OneDriveConnector::new(access_token, "Apps/Linkbook");
/// let etag = connector.directory_etag("links").await?;
/// ```
pub struct OneDriveConnector {
    client: Client,
    base_url: String,
    /// App folder all collection directories live under
    root_path: String,
    /// OAuth 2.0 access token with `Files.ReadWrite` scope
    access_token: String,
}

impl OneDriveConnector {
    pub fn new(access_token: impl Into<String>, root_path: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: GRAPH_DRIVE_BASE.to_string(),
            root_path: root_path.into().trim_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    /// Override the Graph endpoint (tests, sovereign clouds).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Path of a collection directory under the app folder.
    fn full_path(&self, dir: &str) -> String {
        if self.root_path.is_empty() {
            dir.to_string()
        } else {
            format!("{}/{}", self.root_path, dir)
        }
    }

    /// Drive-item URL for a path, with each segment escaped.
    fn item_url(&self, path: &str) -> String {
        let escaped = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/root:/{}", self.base_url, escaped)
    }

    /// Execute a request with bounded retry on throttling and 5xx.
    ///
    /// Honors `Retry-After` when Graph provides it, otherwise backs off
    /// exponentially.
    async fn execute_with_retry<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;

        loop {
            let response = build().bearer_auth(&self.access_token).send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                attempt += 1;
                if attempt >= MAX_RETRIES {
                    return Err(OneDriveError::ApiError {
                        status_code: status.as_u16(),
                        message: format!("Request failed after {} retries", MAX_RETRIES),
                    });
                }

                let backoff = retry_after(&response)
                    .unwrap_or_else(|| Duration::from_millis(100 * 2u64.pow(attempt)));
                warn!(
                    "Graph request throttled (attempt {}/{}): status={}, retrying in {:?}",
                    attempt, MAX_RETRIES, status, backoff
                );
                tokio::time::sleep(backoff).await;
                continue;
            }

            return Ok(response);
        }
    }

    /// Map non-success statuses onto the provider error taxonomy.
    async fn check_status(response: Response, path: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::NOT_FOUND => Err(OneDriveError::NotFound(path.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(OneDriveError::AuthRequired),
            _ => {
                let message = response.text().await.unwrap_or_default();
                Err(OneDriveError::ApiError {
                    status_code: status.as_u16(),
                    message,
                })
            }
        }
    }

    /// Fetch a drive item's metadata.
    async fn get_item(&self, path: &str) -> Result<DriveItem> {
        let url = format!("{}?$select=name,eTag,file,folder,size", self.item_url(path));
        let response = self.execute_with_retry(|| self.client.get(&url)).await?;
        let response = Self::check_status(response, path).await?;

        Ok(response.json::<DriveItem>().await?)
    }

    /// Create one folder under a parent path.
    async fn create_folder(&self, parent: &str, name: &str) -> Result<DriveItem> {
        debug!("Creating remote folder {}/{}", parent, name);
        let url = if parent.is_empty() {
            format!("{}/root/children", self.base_url)
        } else {
            format!("{}:/children", self.item_url(parent))
        };

        let body = json!({
            "name": name,
            "folder": {},
            "@microsoft.graph.conflictBehavior": "replace",
        });

        let response = self
            .execute_with_retry(|| self.client.post(&url).json(&body))
            .await?;
        let response = Self::check_status(response, name).await?;

        Ok(response.json::<DriveItem>().await?)
    }

    /// Walk a path segment by segment, creating missing folders.
    async fn ensure_path(&self, path: &str) -> Result<DriveItem> {
        let mut current = String::new();
        let mut item: Option<DriveItem> = None;

        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            let next = if current.is_empty() {
                segment.to_string()
            } else {
                format!("{}/{}", current, segment)
            };

            item = Some(match self.get_item(&next).await {
                Ok(existing) => existing,
                Err(OneDriveError::NotFound(_)) => self.create_folder(&current, segment).await?,
                Err(e) => return Err(e),
            });
            current = next;
        }

        item.ok_or_else(|| OneDriveError::InvalidResponse("Empty directory path".to_string()))
    }

    fn require_etag(item: &DriveItem, path: &str) -> Result<String> {
        item.e_tag
            .clone()
            .ok_or_else(|| OneDriveError::InvalidResponse(format!("No eTag on {}", path)))
    }
}

#[async_trait]
impl FileStorage for OneDriveConnector {
    #[instrument(skip(self))]
    async fn directory_etag(&self, dir: &str) -> BridgeResult<String> {
        let path = self.full_path(dir);
        let item = self.ensure_path(&path).await?;

        Ok(Self::require_etag(&item, &path)?)
    }

    #[instrument(skip(self))]
    async fn list(&self, dir: &str) -> BridgeResult<Vec<RemoteEntry>> {
        let path = self.full_path(dir);
        let mut url = format!(
            "{}:/children?$select=name,eTag,file,folder&$top={}",
            self.item_url(&path),
            PAGE_SIZE
        );
        let mut entries = Vec::new();

        loop {
            let response = self.execute_with_retry(|| self.client.get(&url)).await?;
            let response = Self::check_status(response, &path).await?;
            let page = response
                .json::<DriveItemList>()
                .await
                .map_err(OneDriveError::from)?;

            for item in page.value {
                if item.is_folder() {
                    continue;
                }
                let etag = Self::require_etag(&item, &item.name)?;
                entries.push(RemoteEntry {
                    name: item.name,
                    etag,
                });
            }

            match page.next_link {
                Some(next) => url = next,
                None => break,
            }
        }

        debug!("Listed {} entries under {}", entries.len(), path);
        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn get(&self, dir: &str, name: &str) -> BridgeResult<(Bytes, String)> {
        let path = format!("{}/{}", self.full_path(dir), name);
        let item = self.get_item(&path).await?;
        let etag = Self::require_etag(&item, &path)?;

        let url = format!("{}:/content", self.item_url(&path));
        let response = self.execute_with_retry(|| self.client.get(&url)).await?;
        let response = Self::check_status(response, &path).await?;
        let body = response.bytes().await.map_err(OneDriveError::from)?;

        Ok((body, etag))
    }

    #[instrument(skip(self, body))]
    async fn put(&self, dir: &str, name: &str, body: Bytes) -> BridgeResult<String> {
        let path = format!("{}/{}", self.full_path(dir), name);
        let url = format!("{}:/content", self.item_url(&path));

        let response = self
            .execute_with_retry(|| {
                self.client
                    .put(&url)
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(body.clone())
            })
            .await?;
        let response = Self::check_status(response, &path).await?;
        let item = response
            .json::<DriveItem>()
            .await
            .map_err(OneDriveError::from)?;

        Ok(Self::require_etag(&item, &path)?)
    }

    #[instrument(skip(self))]
    async fn delete(&self, dir: &str, name: &str) -> BridgeResult<()> {
        let path = format!("{}/{}", self.full_path(dir), name);
        let url = self.item_url(&path);

        let response = self.execute_with_retry(|| self.client.delete(&url)).await?;
        Self::check_status(response, &path).await?;

        Ok(())
    }
}

/// Parse a `Retry-After` header (seconds form).
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

// ============================================================================
// Tests
// ============================================================================
