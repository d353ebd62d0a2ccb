// 测试用的内存NVR

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use common::{CameraInfo, Credentials};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::api::{FeedEvent, LiveFeed, ProtectApi, ProtectConnector, UpstreamError};

#[derive(Default)]
struct MockState {
    cameras: Mutex<Vec<CameraInfo>>,
    feeds: Mutex<HashMap<String, mpsc::Sender<FeedEvent>>>,
    login_delay: Mutex<Duration>,
    fail_login: AtomicBool,
    fail_bootstrap: AtomicBool,
    fail_feed: AtomicBool,
    logins: AtomicUsize,
    bootstraps: AtomicUsize,
    feeds_opened: AtomicUsize,
    logouts: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    /// 摄像头id为`cam-<name>`
    pub fn with_cameras(names: &[&str]) -> Self {
        let mock = Self::default();
        *mock.state.cameras.lock().unwrap() = names
            .iter()
            .map(|name| CameraInfo::new(format!("cam-{}", name), *name))
            .collect();
        mock
    }

    pub fn into_connector(self) -> Arc<dyn ProtectConnector> {
        Arc::new(self)
    }

    pub fn set_fail_login(&self, fail: bool) {
        self.state.fail_login.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_bootstrap(&self, fail: bool) {
        self.state.fail_bootstrap.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_feed(&self, fail: bool) {
        self.state.fail_feed.store(fail, Ordering::SeqCst);
    }

    pub fn set_login_delay(&self, delay: Duration) {
        *self.state.login_delay.lock().unwrap() = delay;
    }

    pub fn logins(&self) -> usize {
        self.state.logins.load(Ordering::SeqCst)
    }

    pub fn bootstraps(&self) -> usize {
        self.state.bootstraps.load(Ordering::SeqCst)
    }

    pub fn feeds_opened(&self) -> usize {
        self.state.feeds_opened.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> usize {
        self.state.logouts.load(Ordering::SeqCst)
    }

    /// 向摄像头当前的实时流推送一帧，流不存在或已关闭时返回false
    pub async fn push_frame(&self, camera_id: &str, data: impl Into<Bytes>) -> bool {
        self.push(camera_id, FeedEvent::Frame(data.into())).await
    }

    pub async fn push_codec(&self, camera_id: &str, codec: &str) -> bool {
        self.push(camera_id, FeedEvent::Codec(codec.to_string())).await
    }

    /// 模拟上游断流
    pub fn end_feed(&self, camera_id: &str) {
        self.state.feeds.lock().unwrap().remove(camera_id);
    }

    pub fn has_open_feed(&self, camera_id: &str) -> bool {
        self.state
            .feeds
            .lock()
            .unwrap()
            .get(camera_id)
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    /// 等待累计打开的实时流数量达到`count`
    pub async fn wait_for_feeds(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.feeds_opened() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("feed was not opened in time");
    }

    async fn push(&self, camera_id: &str, event: FeedEvent) -> bool {
        let tx = self.state.feeds.lock().unwrap().get(camera_id).cloned();
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl ProtectConnector for MockConnector {
    async fn login(
        &self,
        _host: &str,
        _credentials: &Credentials,
    ) -> Result<Arc<dyn ProtectApi>, UpstreamError> {
        self.state.logins.fetch_add(1, Ordering::SeqCst);

        let delay = *self.state.login_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.state.fail_login.load(Ordering::SeqCst) {
            return Err(UpstreamError::Rejected("Invalid login credentials".to_string()));
        }

        Ok(Arc::new(MockApi {
            state: self.state.clone(),
        }))
    }
}

struct MockApi {
    state: Arc<MockState>,
}

#[async_trait]
impl ProtectApi for MockApi {
    async fn bootstrap(&self) -> Result<Vec<CameraInfo>, UpstreamError> {
        self.state.bootstraps.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_bootstrap.load(Ordering::SeqCst) {
            return Err(UpstreamError::Http("bootstrap unavailable".to_string()));
        }
        Ok(self.state.cameras.lock().unwrap().clone())
    }

    async fn open_livestream(
        &self,
        camera_id: &str,
        _channel: u8,
    ) -> Result<LiveFeed, UpstreamError> {
        if self.state.fail_feed.load(Ordering::SeqCst) {
            return Err(UpstreamError::WebSocket("livestream refused".to_string()));
        }

        let known = self
            .state
            .cameras
            .lock()
            .unwrap()
            .iter()
            .any(|camera| camera.id == camera_id);
        if !known {
            return Err(UpstreamError::Rejected(format!("unknown camera {}", camera_id)));
        }

        let (tx, rx) = mpsc::channel(64);
        self.state
            .feeds
            .lock()
            .unwrap()
            .insert(camera_id.to_string(), tx);
        self.state.feeds_opened.fetch_add(1, Ordering::SeqCst);

        Ok(LiveFeed::new(rx, CancellationToken::new()))
    }

    async fn logout(&self) {
        self.state.logouts.fetch_add(1, Ordering::SeqCst);
    }
}
