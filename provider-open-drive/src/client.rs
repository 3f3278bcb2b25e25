//! Open platform drive client
//!
//! The owned, writable drive that holds materialized copies. It refreshes
//! its own OAuth session, knows its default drive id, and links or removes
//! files it owns.

use async_trait::async_trait;
use bridge_traits::backing::{BackingDrive, DownloadLink, MaterializedHandle, RefreshTokenSink};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use core_runtime::config::{RemoveWay, ShareCacheConfig};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{OpenDriveError, Result};

pub const OPEN_API_BASE: &str = "https://openapi.aliyundrive.com";

/// Lifetime requested for download links (4h)
const LINK_EXPIRE_SECS: u64 = 14_400;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for [`OpenDriveClient`], usually taken from the cache config document.
#[derive(Clone)]
pub struct OpenDriveConfig {
    pub refresh_token: String,
    /// Third-party token endpoint, used when no client credentials are set
    pub oauth_token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub remove_way: RemoveWay,
    pub api_base: String,
}

impl OpenDriveConfig {
    pub fn from_document(document: &ShareCacheConfig) -> Self {
        Self {
            refresh_token: document.open_refresh_token.clone(),
            oauth_token_url: document.oauth_token_url.clone(),
            client_id: document.client_id.clone(),
            client_secret: document.client_secret.clone(),
            remove_way: document.remove_way,
            api_base: OPEN_API_BASE.to_string(),
        }
    }

    fn uses_official_endpoint(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

impl fmt::Debug for OpenDriveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenDriveConfig")
            .field("refresh_token", &"[REDACTED]")
            .field("oauth_token_url", &self.oauth_token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("remove_way", &self.remove_way)
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[derive(Default)]
struct Session {
    access_token: String,
    refresh_token: String,
}

#[derive(Deserialize)]
struct TokenReply {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
}

#[derive(Deserialize)]
struct ErrorReply {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct DriveInfo {
    default_drive_id: String,
}

#[derive(Serialize)]
struct FileRef<'a> {
    drive_id: &'a str,
    file_id: &'a str,
}

#[derive(Deserialize)]
struct DownloadUrl {
    url: String,
    #[serde(default)]
    expiration: Option<DateTime<Utc>>,
}

/// Backing drive on the open platform API.
///
/// Call [`OpenDriveClient::init`] once before use: it obtains an access
/// token and discovers the default drive id.
pub struct OpenDriveClient {
    http_client: Arc<dyn HttpClient>,
    config: OpenDriveConfig,
    session: RwLock<Session>,
    drive_id: RwLock<Option<String>>,
    refresh_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
    token_sink: Option<Arc<dyn RefreshTokenSink>>,
}

impl OpenDriveClient {
    pub fn new(http_client: Arc<dyn HttpClient>, config: OpenDriveConfig) -> Self {
        let session = Session {
            access_token: String::new(),
            refresh_token: config.refresh_token.clone(),
        };
        Self {
            http_client,
            config,
            session: RwLock::new(session),
            drive_id: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            clock: Arc::new(SystemClock),
            token_sink: None,
        }
    }

    /// Report every rotated refresh token to `sink`.
    pub fn with_refresh_token_sink(mut self, sink: Arc<dyn RefreshTokenSink>) -> Self {
        self.token_sink = Some(sink);
        self
    }

    /// Replace the clock used to stamp link expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &OpenDriveConfig {
        &self.config
    }

    /// Refresh the session and discover the default drive id.
    #[instrument(skip(self))]
    pub async fn init(&self) -> Result<()> {
        self.refresh_session().await?;
        self.discover_drive_id().await
    }

    async fn discover_drive_id(&self) -> Result<()> {
        let response = self
            .request("/adrive/v1.0/user/getDriveInfo", &json!({}))
            .await?;
        let info: DriveInfo = response
            .json()
            .map_err(|e| OpenDriveError::Parse(format!("Failed to parse drive info: {}", e)))?;

        info!(drive_id = %info.default_drive_id, "Open drive initialized");
        *self.drive_id.write().await = Some(info.default_drive_id);
        Ok(())
    }

    async fn refresh_session(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        let refresh_token = self.session.read().await.refresh_token.clone();

        let request = if self.config.uses_official_endpoint() {
            HttpRequest::post_json(
                format!("{}/oauth/access_token", self.config.api_base),
                &json!({
                    "client_id": self.config.client_id,
                    "client_secret": self.config.client_secret,
                    "grant_type": "refresh_token",
                    "refresh_token": refresh_token,
                }),
            )?
        } else {
            HttpRequest::post_json(
                self.config.oauth_token_url.clone(),
                &json!({
                    "refresh_token": refresh_token,
                    "grant_type": "refresh_token",
                }),
            )?
        };

        let response = self
            .http_client
            .execute(request.timeout(REQUEST_TIMEOUT))
            .await?;
        if let Some(e) = Self::error_of(&response) {
            error!(error = %e, "Open drive token refresh rejected");
            return Err(e);
        }

        let reply: TokenReply = response
            .json()
            .map_err(|e| OpenDriveError::Parse(format!("Failed to parse token response: {}", e)))?;
        if reply.access_token.is_empty() || reply.refresh_token.is_empty() {
            return Err(OpenDriveError::EmptyToken);
        }

        {
            let mut session = self.session.write().await;
            session.access_token = reply.access_token;
            session.refresh_token = reply.refresh_token.clone();
        }
        debug!("Open drive session refreshed");

        if let Some(sink) = &self.token_sink {
            sink.refresh_token_rotated(&reply.refresh_token).await;
        }
        Ok(())
    }

    fn error_of(response: &HttpResponse) -> Option<OpenDriveError> {
        if let Ok(reply) = serde_json::from_slice::<ErrorReply>(&response.body) {
            if reply.code == "AccessTokenInvalid" {
                return Some(OpenDriveError::AccessTokenInvalid);
            }
            if !reply.code.is_empty() {
                return Some(OpenDriveError::Api {
                    code: reply.code,
                    message: reply.message,
                });
            }
        }
        if !response.is_success() {
            return Some(OpenDriveError::Api {
                code: format!("HTTP {}", response.status),
                message: response.text_lossy(),
            });
        }
        None
    }

    /// POST to `path`, refreshing the session once if the token was rejected.
    async fn request<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<HttpResponse> {
        let url = format!("{}{}", self.config.api_base, path);
        let mut refreshed = false;

        loop {
            let access_token = self.session.read().await.access_token.clone();
            let request = HttpRequest::post_json(url.as_str(), body)?
                .bearer_token(&access_token)
                .timeout(REQUEST_TIMEOUT);

            let response = self.http_client.execute(request).await?;
            match Self::error_of(&response) {
                None => return Ok(response),
                Some(OpenDriveError::AccessTokenInvalid) if !refreshed => {
                    warn!(path = %path, "Open drive token rejected, refreshing");
                    refreshed = true;
                    self.refresh_session().await?;
                }
                Some(e) => return Err(e),
            }
        }
    }

    async fn target_drive(&self, handle: &MaterializedHandle) -> Result<String> {
        if !handle.drive_id.is_empty() {
            return Ok(handle.drive_id.clone());
        }
        self.drive_id.read().await.clone().ok_or(OpenDriveError::NoDriveId)
    }
}

#[async_trait]
impl BackingDrive for OpenDriveClient {
    async fn drive_id(&self) -> Option<String> {
        self.drive_id.read().await.clone()
    }

    #[instrument(skip(self), fields(file_id = %handle.file_id))]
    async fn link(&self, handle: &MaterializedHandle) -> bridge_traits::error::Result<DownloadLink> {
        let drive_id = self.target_drive(handle).await?;
        let response = self
            .request(
                "/adrive/v1.0/openFile/getDownloadUrl",
                &json!({
                    "drive_id": drive_id,
                    "file_id": handle.file_id,
                    "expire_sec": LINK_EXPIRE_SECS,
                }),
            )
            .await?;

        let reply: DownloadUrl = response
            .json()
            .map_err(|e| OpenDriveError::Parse(format!("Failed to parse download url: {}", e)))?;

        // Links without a reported expiry live for the requested lifetime
        let expires_at = reply.expiration.unwrap_or_else(|| {
            self.clock.now() + chrono::Duration::seconds(LINK_EXPIRE_SECS as i64)
        });
        Ok(DownloadLink::new(reply.url).with_expiry(expires_at))
    }

    #[instrument(skip(self), fields(file_id = %handle.file_id, remove_way = ?self.config.remove_way))]
    async fn remove(&self, handle: &MaterializedHandle) -> bridge_traits::error::Result<()> {
        let drive_id = self.target_drive(handle).await?;
        let path = match self.config.remove_way {
            RemoveWay::Trash => "/adrive/v1.0/openFile/recyclebin/trash",
            RemoveWay::Delete => "/adrive/v1.0/openFile/delete",
        };

        self.request(
            path,
            &FileRef {
                drive_id: &drive_id,
                file_id: &handle.file_id,
            },
        )
        .await?;

        info!(file_id = %handle.file_id, "Removed file from open drive");
        Ok(())
    }

    async fn refresh_credentials(&self) -> bridge_traits::error::Result<()> {
        self.refresh_session().await?;
        if self.drive_id.read().await.is_none() {
            info!("Drive id unknown, looking it up again");
            self.discover_drive_id().await?;
        }
        Ok(())
    }

    async fn refresh_token(&self) -> Option<String> {
        let token = self.session.read().await.refresh_token.clone();
        (!token.is_empty()).then_some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bytes::Bytes;
    use chrono::TimeZone;
    use core_runtime::config::DEFAULT_OAUTH_TOKEN_URL;
    use mockall::mock;
    use mockall::Sequence;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    mock! {
        Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    fn reply(status: u16, body: serde_json::Value) -> bridge_traits::error::Result<HttpResponse> {
        Ok(HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        })
    }

    fn body_of(request: &HttpRequest) -> serde_json::Value {
        serde_json::from_slice(request.body.as_ref().unwrap()).unwrap()
    }

    fn config(remove_way: RemoveWay) -> OpenDriveConfig {
        let document = ShareCacheConfig {
            open_refresh_token: "open-rt".to_string(),
            remove_way,
            ..Default::default()
        };
        OpenDriveConfig::from_document(&document)
    }

    fn handle() -> MaterializedHandle {
        MaterializedHandle {
            file_id: "copy-1".to_string(),
            domain_id: "bj29".to_string(),
            drive_id: "drive-9".to_string(),
            name: "movie.mkv".to_string(),
        }
    }

    fn token_reply(n: u32) -> bridge_traits::error::Result<HttpResponse> {
        reply(
            200,
            json!({ "access_token": format!("open-at-{}", n), "refresh_token": format!("open-rt-{}", n) }),
        )
    }

    #[tokio::test]
    async fn test_init_uses_third_party_token_url_without_client_credentials() {
        let mut http = MockHttp::new();
        let mut seq = Sequence::new();
        http.expect_execute()
            .withf(|r| r.url == DEFAULT_OAUTH_TOKEN_URL && body_of(r)["refresh_token"] == "open-rt")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| token_reply(1));
        http.expect_execute()
            .withf(|r| {
                r.url.ends_with("/adrive/v1.0/user/getDriveInfo")
                    && r.header_value("authorization") == Some("Bearer open-at-1")
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| reply(200, json!({ "default_drive_id": "drive-9" })));

        let client = OpenDriveClient::new(Arc::new(http), config(RemoveWay::Delete));
        client.init().await.unwrap();

        assert_eq!(client.drive_id().await.as_deref(), Some("drive-9"));
        assert_eq!(client.refresh_token().await.as_deref(), Some("open-rt-1"));
    }

    #[tokio::test]
    async fn test_refresh_after_failed_init_discovers_drive_id() {
        let mut http = MockHttp::new();
        let mut seq = Sequence::new();
        http.expect_execute()
            .withf(|r| r.url == DEFAULT_OAUTH_TOKEN_URL)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| reply(503, json!({ "code": "ServiceUnavailable", "message": "busy" })));
        http.expect_execute()
            .withf(|r| r.url == DEFAULT_OAUTH_TOKEN_URL)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| token_reply(1));
        http.expect_execute()
            .withf(|r| r.url.ends_with("/adrive/v1.0/user/getDriveInfo"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| reply(200, json!({ "default_drive_id": "drive-9" })));

        let client = OpenDriveClient::new(Arc::new(http), config(RemoveWay::Delete));
        assert!(client.init().await.is_err());
        assert_eq!(client.drive_id().await, None);

        client.refresh_credentials().await.unwrap();

        assert_eq!(client.drive_id().await.as_deref(), Some("drive-9"));
    }

    #[tokio::test]
    async fn test_refresh_with_known_drive_skips_lookup() {
        let mut http = MockHttp::new();
        let mut seq = Sequence::new();
        http.expect_execute()
            .withf(|r| r.url == DEFAULT_OAUTH_TOKEN_URL)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| token_reply(1));
        http.expect_execute()
            .withf(|r| r.url.ends_with("/adrive/v1.0/user/getDriveInfo"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| reply(200, json!({ "default_drive_id": "drive-9" })));
        http.expect_execute()
            .withf(|r| r.url == DEFAULT_OAUTH_TOKEN_URL)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| token_reply(2));

        let client = OpenDriveClient::new(Arc::new(http), config(RemoveWay::Delete));
        client.init().await.unwrap();
        client.refresh_credentials().await.unwrap();

        assert_eq!(client.refresh_token().await.as_deref(), Some("open-rt-2"));
    }

    #[derive(Default)]
    struct RecordingSink {
        tokens: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl RefreshTokenSink for RecordingSink {
        async fn refresh_token_rotated(&self, refresh_token: &str) {
            self.tokens.lock().unwrap().push(refresh_token.to_string());
        }
    }

    #[tokio::test]
    async fn test_rejected_request_refresh_reports_rotated_token() {
        let mut http = MockHttp::new();
        let mut seq = Sequence::new();
        http.expect_execute()
            .withf(|r| r.url.ends_with("/adrive/v1.0/openFile/getDownloadUrl"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| reply(401, json!({ "code": "AccessTokenInvalid", "message": "expired" })));
        http.expect_execute()
            .withf(|r| r.url == DEFAULT_OAUTH_TOKEN_URL)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| token_reply(1));
        http.expect_execute()
            .withf(|r| r.url.ends_with("/adrive/v1.0/openFile/getDownloadUrl"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| reply(200, json!({ "url": "https://cdn.example.com/copy-1" })));

        let sink = Arc::new(RecordingSink::default());
        let client = OpenDriveClient::new(Arc::new(http), config(RemoveWay::Delete))
            .with_refresh_token_sink(sink.clone());

        client.link(&handle()).await.unwrap();

        assert_eq!(*sink.tokens.lock().unwrap(), vec!["open-rt-1".to_string()]);
    }

    #[tokio::test]
    async fn test_official_endpoint_with_client_credentials() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|r| {
                let body = body_of(r);
                r.url == "https://openapi.aliyundrive.com/oauth/access_token"
                    && body["client_id"] == "cid"
                    && body["client_secret"] == "secret"
            })
            .times(1)
            .returning(|_| token_reply(1));

        let mut config = config(RemoveWay::Delete);
        config.client_id = "cid".to_string();
        config.client_secret = "secret".to_string();
        http.expect_execute()
            .withf(|r| {
                r.url == "https://openapi.aliyundrive.com/adrive/v1.0/user/getDriveInfo"
                    && r.header_value("authorization") == Some("Bearer open-at-1")
            })
            .times(1)
            .returning(|_| reply(200, json!({ "default_drive_id": "drive-9" })));

        let client = OpenDriveClient::new(Arc::new(http), config);

        client.init().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_token_is_rejected() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .returning(|_| reply(200, json!({ "access_token": "", "refresh_token": "" })));

        let client = OpenDriveClient::new(Arc::new(http), config(RemoveWay::Delete));

        let err = client.refresh_credentials().await.unwrap_err();
        assert!(matches!(err, BridgeError::OperationFailed(m) if m.contains("empty token")));
        assert_eq!(client.refresh_token().await.as_deref(), Some("open-rt"));
    }

    #[tokio::test]
    async fn test_link_requests_four_hour_url() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|r| {
                let body = body_of(r);
                r.url.ends_with("/adrive/v1.0/openFile/getDownloadUrl")
                    && body["file_id"] == "copy-1"
                    && body["drive_id"] == "drive-9"
                    && body["expire_sec"] == 14_400
            })
            .times(1)
            .returning(|_| {
                reply(
                    200,
                    json!({ "url": "https://cdn.example.com/copy-1", "expiration": "2024-01-01T04:00:00Z" }),
                )
            });

        let client = OpenDriveClient::new(Arc::new(http), config(RemoveWay::Delete));
        let link = client.link(&handle()).await.unwrap();

        assert_eq!(link.url, "https://cdn.example.com/copy-1");
        assert_eq!(
            link.expires_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 4, 0, 0).unwrap())
        );
    }

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[tokio::test]
    async fn test_link_without_expiration_uses_requested_lifetime() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .returning(|_| reply(200, json!({ "url": "https://cdn.example.com/copy-1" })));

        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let client = OpenDriveClient::new(Arc::new(http), config(RemoveWay::Delete))
            .with_clock(Arc::new(FixedClock(now)));
        let link = client.link(&handle()).await.unwrap();

        assert_eq!(link.expires_at, Some(now + chrono::Duration::hours(4)));
    }

    #[tokio::test]
    async fn test_remove_way_selects_endpoint() {
        for (way, suffix) in [
            (RemoveWay::Trash, "/adrive/v1.0/openFile/recyclebin/trash"),
            (RemoveWay::Delete, "/adrive/v1.0/openFile/delete"),
        ] {
            let mut http = MockHttp::new();
            http.expect_execute()
                .withf(move |r| r.url.ends_with(suffix) && body_of(r)["file_id"] == "copy-1")
                .times(1)
                .returning(|_| reply(200, json!({})));

            let client = OpenDriveClient::new(Arc::new(http), config(way));
            client.remove(&handle()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_retries_once_after_access_token_invalid() {
        let mut http = MockHttp::new();
        let mut seq = Sequence::new();
        http.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| reply(401, json!({ "code": "AccessTokenInvalid", "message": "expired" })));
        http.expect_execute()
            .withf(|r| r.url == DEFAULT_OAUTH_TOKEN_URL)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| token_reply(2));
        http.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| reply(401, json!({ "code": "AccessTokenInvalid", "message": "expired" })));

        let client = OpenDriveClient::new(Arc::new(http), config(RemoveWay::Delete));
        let err = client.remove(&handle()).await.unwrap_err();

        assert!(matches!(err, BridgeError::OperationFailed(m) if m.contains("access token is invalid")));
    }

    #[tokio::test]
    async fn test_link_without_drive_id_fails() {
        let client = OpenDriveClient::new(Arc::new(MockHttp::new()), config(RemoveWay::Delete));
        let mut orphan = handle();
        orphan.drive_id.clear();

        let err = client.link(&orphan).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotAvailable(_)));
    }
}
