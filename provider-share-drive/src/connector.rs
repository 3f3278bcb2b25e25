//! Share API connector
//!
//! Talks to the share-link side of the drive: directory listing, server-side
//! copy into the backing drive and the two preview endpoints.

use bridge_traits::backing::MaterializedHandle;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use core_auth::types::ApiErrorBody;
use core_auth::{CredentialKind, ShareSession};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Result, ShareDriveError};
use crate::types::{
    BatchItem, BatchRequest, BatchResponse, CopyBody, ListRequest, ListResponse, PreviewMethod,
    PreviewRequest, ShareFile,
};

/// Paginated directory listing
pub const FILE_LIST_URL: &str = "https://api.aliyundrive.com/adrive/v3/file/list";

/// Batch endpoint used for the server-side copy
pub const BATCH_URL: &str = "https://api.aliyundrive.com/adrive/v2/batch";

pub const OFFICE_PREVIEW_URL: &str = "https://api.aliyundrive.com/v2/file/get_office_preview_url";

pub const VIDEO_PREVIEW_URL: &str =
    "https://api.aliyundrive.com/v2/file/get_video_preview_play_info";

const SHARE_TOKEN_HEADER: &str = "x-share-token";

/// Required by the batch endpoint for share-side copies
const CANARY_HEADER: (&str, &str) = ("X-Canary", "client=web,app=share,version=v2.3.1");

/// Items per listing page
const PAGE_SIZE: u32 = 100;

const IMAGE_THUMBNAIL_PROCESS: &str = "image/resize,w_160/format,jpeg";
const IMAGE_URL_PROCESS: &str = "image/resize,w_1920/format,jpeg";
const VIDEO_THUMBNAIL_PROCESS: &str = "video/snapshot,t_1000,f_jpg,ar_auto,w_300";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Share API connector
///
/// Every call is authorized through a [`ShareSession`]. Credential failures
/// reported by the API are recovered within the session's retry budget and
/// the call is re-issued; any other API error is returned as-is.
///
/// # Example
///
/// ```ignore
/// use provider_share_drive::ShareDriveConnector;
///
/// let connector = ShareDriveConnector::new(http_client, session, "name", "ASC");
/// let files = connector.list_directory("root").await?;
/// ```
pub struct ShareDriveConnector {
    http_client: Arc<dyn HttpClient>,
    session: Arc<ShareSession>,
    order_by: String,
    order_direction: String,
    /// Drive id of the share, learned from the first listing
    drive_id: RwLock<Option<String>>,
}

impl ShareDriveConnector {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        session: Arc<ShareSession>,
        order_by: impl Into<String>,
        order_direction: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            session,
            order_by: order_by.into(),
            order_direction: order_direction.into(),
            drive_id: RwLock::new(None),
        }
    }

    pub fn session(&self) -> &Arc<ShareSession> {
        &self.session
    }

    pub fn share_id(&self) -> &str {
        self.session.share_id()
    }

    /// Share-side drive id, if a listing has revealed it yet.
    pub async fn drive_id(&self) -> Option<String> {
        self.drive_id.read().await.clone()
    }

    pub async fn clear_drive_id(&self) {
        self.drive_id.write().await.take();
    }

    /// Turn a non-2xx response into the matching error.
    fn check(response: HttpResponse) -> Result<HttpResponse> {
        if response.is_success() {
            return Ok(response);
        }
        match ApiErrorBody::parse(&response.body) {
            Some(body) => Err(ShareDriveError::from_code(body.code, body.message)),
            None => Err(ShareDriveError::Api {
                code: format!("HTTP {}", response.status),
                message: response.text_lossy(),
            }),
        }
    }

    fn credential_kind(error: &ShareDriveError) -> Option<CredentialKind> {
        match error {
            ShareDriveError::AccessTokenInvalid => Some(CredentialKind::AccessToken),
            ShareDriveError::ShareLinkTokenInvalid => Some(CredentialKind::ShareToken),
            _ => None,
        }
    }

    /// POST `body` with bearer and share token, recovering from credential failures.
    ///
    /// `policy` governs transport retries only.
    #[instrument(skip(self, body, headers, policy), fields(url = %url))]
    async fn request<B: Serialize + Sync>(
        &self,
        url: &str,
        body: &B,
        headers: &[(&str, &str)],
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let mut budget = self.session.retry_budget();

        loop {
            let auth = self.session.authorize().await?;

            let mut request = HttpRequest::post_json(url, body)?
                .bearer_token(&auth.access_token.value)
                .header(SHARE_TOKEN_HEADER, auth.share_token.value.as_str())
                .timeout(REQUEST_TIMEOUT);
            for (key, value) in headers {
                request = request.header(*key, *value);
            }

            let response = self
                .http_client
                .execute_with_retry(request, policy.clone())
                .await?;
            match Self::check(response) {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let Some(kind) = Self::credential_kind(&e) else {
                        warn!(error = %e, "Share API rejected request");
                        return Err(e);
                    };
                    debug!(kind = %kind, "Credential rejected, refreshing and retrying");
                    self.session
                        .handle_auth_error(kind, auth.generation(kind), &mut budget)
                        .await?;
                }
            }
        }
    }

    /// List every entry of `folder_id`, following `next_marker` to the end.
    ///
    /// The listing endpoint is authorized by the share token alone. On a
    /// credential failure the share token is re-acquired and the listing
    /// restarts from the first page.
    #[instrument(skip(self), fields(share_id = %self.share_id()))]
    pub async fn list_directory(&self, folder_id: &str) -> Result<Vec<ShareFile>> {
        let mut budget = self.session.retry_budget();

        'restart: loop {
            let mut files = Vec::new();
            let mut marker = String::new();

            loop {
                let share_token = self.session.authorize_share().await?;
                let page = ListRequest {
                    image_thumbnail_process: IMAGE_THUMBNAIL_PROCESS,
                    image_url_process: IMAGE_URL_PROCESS,
                    limit: PAGE_SIZE,
                    order_by: &self.order_by,
                    order_direction: &self.order_direction,
                    parent_file_id: folder_id,
                    share_id: self.share_id(),
                    video_thumbnail_process: VIDEO_THUMBNAIL_PROCESS,
                    marker: &marker,
                };
                let request = HttpRequest::post_json(FILE_LIST_URL, &page)?
                    .header(SHARE_TOKEN_HEADER, share_token.value.as_str())
                    .timeout(REQUEST_TIMEOUT);

                let response = match Self::check(self.http_client.execute(request).await?) {
                    Ok(response) => response,
                    Err(e) if e.is_credential_expired() => {
                        warn!(error = %e, pages_lost = !files.is_empty(), "Listing rejected, restarting");
                        self.session
                            .handle_auth_error(
                                CredentialKind::ShareToken,
                                share_token.generation,
                                &mut budget,
                            )
                            .await?;
                        continue 'restart;
                    }
                    Err(e) => {
                        error!(folder_id = %folder_id, error = %e, "Failed to list folder");
                        return Err(e);
                    }
                };

                let page: ListResponse = response
                    .json()
                    .map_err(|e| ShareDriveError::Parse(format!("Failed to parse file list: {}", e)))?;
                debug!(items = page.items.len(), next_marker = %page.next_marker, "Listed page");

                if let Some(first) = page.items.first() {
                    self.learn_drive_id(&first.drive_id).await;
                }
                files.extend(page.items);

                if page.next_marker.is_empty() {
                    info!(folder_id = %folder_id, count = files.len(), "Listed folder");
                    return Ok(files);
                }
                marker = page.next_marker;
            }
        }
    }

    async fn learn_drive_id(&self, drive_id: &str) {
        if drive_id.is_empty() {
            return;
        }
        let mut slot = self.drive_id.write().await;
        if slot.is_none() {
            debug!(drive_id = %drive_id, "Learned share drive id");
            *slot = Some(drive_id.to_string());
        }
    }

    /// Copy a shared file into `to_parent_file_id` on drive `to_drive_id`.
    ///
    /// Sent as a single-item batch with `auto_rename`, so a name clash in the
    /// destination folder never fails the copy.
    #[instrument(skip(self), fields(share_id = %self.share_id()))]
    pub async fn copy_to_drive(
        &self,
        file_id: &str,
        name: &str,
        to_parent_file_id: &str,
        to_drive_id: &str,
    ) -> Result<MaterializedHandle> {
        let batch = BatchRequest {
            requests: vec![BatchItem {
                body: CopyBody {
                    file_id,
                    share_id: self.share_id(),
                    auto_rename: true,
                    to_parent_file_id,
                    to_drive_id,
                },
                headers: HashMap::from([("Content-Type", "application/json")]),
                id: "0",
                method: "POST",
                url: "/file/copy",
            }],
            resource: "file",
        };

        // A resent copy would leave a second, untracked file behind
        let response = self
            .request(BATCH_URL, &batch, &[CANARY_HEADER], RetryPolicy::no_retry())
            .await?;
        let batch: BatchResponse = response
            .json()
            .map_err(|e| ShareDriveError::Parse(format!("Failed to parse batch response: {}", e)))?;

        let Some(item) = batch.responses.into_iter().next() else {
            error!(file_id = %file_id, name = %name, "Copy batch returned no item");
            return Err(ShareDriveError::MaterializationFailed {
                file_id: file_id.to_string(),
                status: 0,
            });
        };
        if !(200..300).contains(&item.status) || item.body.file_id.is_empty() {
            error!(file_id = %file_id, name = %name, status = item.status, "Copy rejected");
            return Err(ShareDriveError::MaterializationFailed {
                file_id: file_id.to_string(),
                status: item.status,
            });
        }

        info!(file_id = %file_id, copy_id = %item.body.file_id, "Shared file copied");
        Ok(MaterializedHandle {
            file_id: item.body.file_id,
            domain_id: item.body.domain_id,
            drive_id: item.body.drive_id,
            name: name.to_string(),
        })
    }

    /// Proxy a preview request for `file_id`.
    ///
    /// Supports `doc_preview` and `video_preview`; anything else fails
    /// without touching the network.
    #[instrument(skip(self))]
    pub async fn other(&self, method: &str, file_id: &str) -> Result<serde_json::Value> {
        let Some(preview) = PreviewMethod::parse(method) else {
            return Err(ShareDriveError::UnsupportedOperation(method.to_string()));
        };

        let (url, category) = match preview {
            PreviewMethod::Document => (OFFICE_PREVIEW_URL, None),
            PreviewMethod::Video => (VIDEO_PREVIEW_URL, Some("live_transcoding")),
        };
        let body = PreviewRequest {
            share_id: self.share_id(),
            file_id,
            category,
        };

        let response = self.request(url, &body, &[], RetryPolicy::default()).await?;
        response
            .json()
            .map_err(|e| ShareDriveError::Parse(format!("Failed to parse preview response: {}", e)))
    }
}
