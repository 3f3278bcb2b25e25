//! End-to-end driver behaviour against an in-memory cloud.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::storage::ConfigStore;
use bytes::Bytes;
use core_auth::token_client::{ACCOUNT_TOKEN_URL, SHARE_TOKEN_URL};
use core_runtime::config::DEFAULT_OAUTH_TOKEN_URL;
use core_service::{
    bootstrap, CoreDependencies, CoreError, DriverConfig, ShareCacheConfig, ShareDriveService,
};
use provider_share_drive::connector::{BATCH_URL, FILE_LIST_URL, OFFICE_PREVIEW_URL};
use provider_share_drive::ShareDriveError;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Share API, account token endpoint and open drive in one fake.
#[derive(Default)]
struct FakeCloud {
    requests: Mutex<Vec<HttpRequest>>,
    list_pages: Mutex<VecDeque<Value>>,
    copies: AtomicUsize,
    copy_delay: Option<Duration>,
    /// Open drive token requests to reject before answering
    open_token_failures: AtomicUsize,
}

impl FakeCloud {
    fn body(request: &HttpRequest) -> Value {
        request
            .body
            .as_ref()
            .map(|b| serde_json::from_slice(b).unwrap())
            .unwrap_or(Value::Null)
    }

    fn count(&self, matches: impl Fn(&HttpRequest) -> bool) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| matches(r)).count()
    }

    fn deleted(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.ends_with("/adrive/v1.0/openFile/delete"))
            .map(|r| Self::body(r)["file_id"].as_str().unwrap().to_string())
            .collect()
    }

    fn copies_of(&self, file_id: &str) -> usize {
        self.count(|r| {
            r.url == BATCH_URL && Self::body(r)["requests"][0]["body"]["file_id"] == file_id
        })
    }
}

#[async_trait]
impl HttpClient for FakeCloud {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let body = Self::body(&request);
        let url = request.url.as_str();

        let reply = if url == ACCOUNT_TOKEN_URL {
            json!({ "access_token": "at", "refresh_token": "rt-2" })
        } else if url == SHARE_TOKEN_URL {
            json!({ "share_token": "st" })
        } else if url == DEFAULT_OAUTH_TOKEN_URL {
            let rejecting = self
                .open_token_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if rejecting {
                return Ok(HttpResponse {
                    status: 503,
                    headers: HashMap::new(),
                    body: Bytes::from(r#"{"code":"ServiceUnavailable","message":"busy"}"#),
                });
            }
            json!({ "access_token": "oat", "refresh_token": "ort-2" })
        } else if url == FILE_LIST_URL {
            self.list_pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(json!({ "items": [], "next_marker": "" }))
        } else if url == BATCH_URL {
            if let Some(delay) = self.copy_delay {
                tokio::time::sleep(delay).await;
            }
            let n = self.copies.fetch_add(1, Ordering::SeqCst) + 1;
            json!({ "responses": [{ "id": "0", "status": 201, "body": {
                "domain_id": "bj29", "drive_id": "backing", "file_id": format!("copy-{}", n)
            }}]})
        } else if url == OFFICE_PREVIEW_URL {
            json!({ "preview_url": "https://office/p" })
        } else if url.ends_with("/adrive/v1.0/user/getDriveInfo") {
            json!({ "default_drive_id": "backing" })
        } else if url.ends_with("/adrive/v1.0/openFile/getDownloadUrl") {
            json!({ "url": format!("https://cdn/{}", body["file_id"].as_str().unwrap_or_default()) })
        } else if url.ends_with("/adrive/v1.0/openFile/delete") {
            json!({})
        } else {
            return Ok(HttpResponse {
                status: 404,
                headers: HashMap::new(),
                body: Bytes::from(r#"{"code":"NotFound","message":"no route"}"#),
            });
        };

        Ok(HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from(reply.to_string()),
        })
    }
}

#[derive(Default)]
struct MemoryStore {
    doc: Mutex<Option<Bytes>>,
}

impl MemoryStore {
    fn with(document: &ShareCacheConfig) -> Self {
        Self {
            doc: Mutex::new(Some(Bytes::from(document.to_document().unwrap()))),
        }
    }

    fn document(&self) -> ShareCacheConfig {
        ShareCacheConfig::from_document(self.doc.lock().unwrap().as_deref())
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn load(&self) -> BridgeResult<Option<Bytes>> {
        Ok(self.doc.lock().unwrap().clone())
    }

    async fn save(&self, data: Bytes) -> BridgeResult<()> {
        *self.doc.lock().unwrap() = Some(data);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

fn document(max_temp_file_size: u64) -> ShareCacheConfig {
    ShareCacheConfig {
        shared_refresh_token: "rt-1".to_string(),
        open_refresh_token: "ort-1".to_string(),
        temp_folder_id: "tmp".to_string(),
        max_temp_file_size,
        ..Default::default()
    }
}

fn driver_config() -> DriverConfig {
    DriverConfig::builder()
        .share_id("share-1")
        .list_min_interval(Duration::ZERO)
        .link_min_interval(Duration::ZERO)
        .build()
        .unwrap()
}

async fn start(
    cloud: Arc<FakeCloud>,
    max_temp_file_size: u64,
) -> (ShareDriveService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with(&document(max_temp_file_size)));
    let deps = CoreDependencies::new(cloud, store.clone());
    let service = bootstrap(deps, driver_config()).await.unwrap();
    (service, store)
}

#[tokio::test]
async fn test_bootstrap_persists_rotated_refresh_tokens() {
    let cloud = Arc::new(FakeCloud::default());
    let (service, store) = start(cloud.clone(), 50).await;

    let saved = store.document();
    assert_eq!(saved.shared_refresh_token, "rt-2");
    assert_eq!(saved.open_refresh_token, "ort-2");
    assert_eq!(saved.temp_folder_id, "tmp");
    assert!(service.is_refreshing().await);

    service.shutdown().await;
}

#[tokio::test]
async fn test_list_aggregates_pages() {
    let cloud = Arc::new(FakeCloud::default());
    cloud.list_pages.lock().unwrap().extend([
        json!({ "items": [
            { "drive_id": "share-drive", "file_id": "x", "name": "x.mkv", "type": "file" },
            { "drive_id": "share-drive", "file_id": "y", "name": "Extras", "type": "folder" }
        ], "next_marker": "m1" }),
        json!({ "items": [{ "file_id": "z", "name": "z.mkv", "type": "file" }], "next_marker": "" }),
    ]);
    let (service, _) = start(cloud.clone(), 50).await;

    let files = service.list(None).await.unwrap();

    let ids: Vec<_> = files.iter().map(|f| f.file_id.as_str()).collect();
    assert_eq!(ids, vec!["x", "y", "z"]);
    assert!(files[1].is_folder());
    assert_eq!(service.connector().drive_id().await.as_deref(), Some("share-drive"));

    service.shutdown().await;
    assert_eq!(service.connector().drive_id().await, None);
}

#[tokio::test]
async fn test_link_evicts_oldest_copy_fifo() {
    let cloud = Arc::new(FakeCloud::default());
    let (service, _) = start(cloud.clone(), 2).await;

    let a = service.link("A", "a.mkv").await.unwrap();
    service.link("B", "b.mkv").await.unwrap();
    service.link("C", "c.mkv").await.unwrap();

    assert_eq!(a.url, "https://cdn/copy-1");
    assert_eq!(service.cache().keys().await, vec!["B", "C"]);

    let again = service.link("A", "a.mkv").await.unwrap();
    assert_eq!(again.url, "https://cdn/copy-4");
    assert_eq!(cloud.copies_of("A"), 2);

    service.shutdown().await;
    assert_eq!(cloud.deleted(), vec!["copy-1", "copy-2"]);
}

#[tokio::test]
async fn test_copy_targets_temp_folder_on_backing_drive() {
    let cloud = Arc::new(FakeCloud::default());
    let (service, _) = start(cloud.clone(), 50).await;

    service.link("A", "a.mkv").await.unwrap();

    let batch = cloud
        .requests
        .lock()
        .unwrap()
        .iter()
        .find(|r| r.url == BATCH_URL)
        .cloned()
        .unwrap();
    let copy = &FakeCloud::body(&batch)["requests"][0]["body"];
    assert_eq!(copy["to_parent_file_id"], "tmp");
    assert_eq!(copy["to_drive_id"], "backing");
    assert_eq!(batch.header_value("authorization"), Some("Bearer at"));

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_drivers_sharing_a_cache_copy_once() {
    let cloud = Arc::new(FakeCloud {
        copy_delay: Some(Duration::from_millis(20)),
        ..Default::default()
    });
    let (first, _) = start(cloud.clone(), 50).await;
    let manager_store = Arc::new(MemoryStore::with(&document(50)));
    let second = {
        let token_store = core_auth::TokenStore::load(manager_store).await;
        let manager = Arc::new(core_auth::CredentialManager::new(
            core_auth::TokenClient::new(cloud.clone()),
            token_store,
            core_service::EventBus::default(),
        ));
        ShareDriveService::with_shared_cache(
            driver_config(),
            manager,
            cloud.clone(),
            Arc::clone(first.cache()),
        )
        .await
        .unwrap()
    };
    let first = Arc::new(first);
    let second = Arc::new(second);

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let driver = if i % 2 == 0 { first.clone() } else { second.clone() };
            tokio::spawn(async move { driver.link("A", "a.mkv").await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap().url, "https://cdn/copy-1");
    }

    assert_eq!(cloud.copies_of("A"), 1);

    // Only the owner drains the cache
    second.shutdown().await;
    assert!(first.link("B", "b.mkv").await.is_ok());
    first.shutdown().await;
}

#[tokio::test]
async fn test_unsupported_preview_makes_no_call() {
    let cloud = Arc::new(FakeCloud::default());
    let (service, _) = start(cloud.clone(), 50).await;
    let before = cloud.requests.lock().unwrap().len();

    let err = service.other("archive_preview", "A").await.unwrap_err();

    assert!(matches!(
        err,
        CoreError::Share(ShareDriveError::UnsupportedOperation(_))
    ));
    assert_eq!(cloud.requests.lock().unwrap().len(), before);

    let preview = service.other("doc_preview", "A").await.unwrap();
    assert_eq!(preview["preview_url"], "https://office/p");

    service.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_refresh_and_rejects_calls() {
    let cloud = Arc::new(FakeCloud::default());
    let (service, _) = start(cloud.clone(), 50).await;

    service.shutdown().await;
    service.shutdown().await;

    assert!(!service.is_refreshing().await);
    assert!(matches!(service.list(None).await, Err(CoreError::ShutDown)));
    assert!(matches!(service.link("A", "a").await, Err(CoreError::ShutDown)));
}

#[tokio::test(start_paused = true)]
async fn test_refresh_cycle_recovers_backing_drive_that_failed_at_startup() {
    let cloud = Arc::new(FakeCloud {
        open_token_failures: AtomicUsize::new(1),
        ..Default::default()
    });
    let store = Arc::new(MemoryStore::with(&document(50)));
    let config = DriverConfig::builder()
        .share_id("share-1")
        .refresh_interval(Duration::from_secs(60))
        .list_min_interval(Duration::ZERO)
        .link_min_interval(Duration::ZERO)
        .build()
        .unwrap();
    let service = bootstrap(CoreDependencies::new(cloud.clone(), store.clone()), config)
        .await
        .unwrap();

    assert!(service.link("A", "a.mkv").await.is_err());
    assert_eq!(store.document().open_refresh_token, "ort-1");

    tokio::time::sleep(Duration::from_secs(61)).await;

    let link = service.link("A", "a.mkv").await.unwrap();
    assert_eq!(link.url, "https://cdn/copy-1");
    assert_eq!(store.document().open_refresh_token, "ort-2");

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_link_calls_are_spaced() {
    let cloud = Arc::new(FakeCloud::default());
    let store = Arc::new(MemoryStore::with(&document(50)));
    let config = DriverConfig::builder()
        .share_id("share-1")
        .link_min_interval(Duration::from_secs(1))
        .build()
        .unwrap();
    let service = bootstrap(CoreDependencies::new(cloud, store), config)
        .await
        .unwrap();
    let start = tokio::time::Instant::now();

    service.link("A", "a").await.unwrap();
    service.link("A", "a").await.unwrap();
    service.link("A", "a").await.unwrap();

    assert!(start.elapsed() >= Duration::from_secs(2));
    service.shutdown().await;
}
