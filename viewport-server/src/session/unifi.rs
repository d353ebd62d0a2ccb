use std::sync::{Arc, Mutex, RwLock, Weak};

use async_trait::async_trait;
use common::{CameraInfo, DispatchError, Result, SessionState, StreamMetadata};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::pump::{self, PumpContext};
use super::{ErrorRecoveryPolicy, StreamSession};
use crate::device::NvrConnection;
use crate::relay::Relay;

pub const DEFAULT_CODEC: &str = "h264";
pub const RELAY_CONTAINER: &str = "fmp4";

/// 正在运行的实时流转发任务
struct FeedPump {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// NVR摄像头的流会话，帧数据经relay转发给订阅者
pub struct UnifiStreamSession {
    id: String,
    camera: CameraInfo,
    nvr: Arc<NvrConnection>,
    relay: Relay,
    recovery: ErrorRecoveryPolicy,
    state: Mutex<SessionState>,
    metadata: Arc<RwLock<StreamMetadata>>,
    feed: tokio::sync::Mutex<Option<FeedPump>>,
    this: Weak<UnifiStreamSession>,
}

impl UnifiStreamSession {
    pub fn new(
        camera: CameraInfo,
        nvr: Arc<NvrConnection>,
        relay: Relay,
        recovery: ErrorRecoveryPolicy,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: session_id(nvr.host(), &camera.name),
            camera,
            nvr,
            relay,
            recovery,
            state: Mutex::new(SessionState::Created),
            metadata: Arc::new(RwLock::new(StreamMetadata::default())),
            feed: tokio::sync::Mutex::new(None),
            this: this.clone(),
        })
    }

    pub fn camera(&self) -> &CameraInfo {
        &self.camera
    }

    /// 上游实时流当前是否打开
    pub async fn is_wired(&self) -> bool {
        self.feed
            .lock()
            .await
            .as_ref()
            .map(|pump| !pump.task.is_finished())
            .unwrap_or(false)
    }
}

/// 会话标识: `host:cameraName`
pub fn session_id(host: &str, camera_name: &str) -> String {
    format!("{}:{}", host, camera_name)
}

#[async_trait]
impl StreamSession for UnifiStreamSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> SessionState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(SessionState::Disposed)
    }

    fn metadata(&self) -> StreamMetadata {
        self.metadata
            .read()
            .map(|metadata| metadata.clone())
            .unwrap_or_default()
    }

    async fn start(&self) -> Result<()> {
        {
            let mut state = self
                .state
                .lock()
                .map_err(|_| DispatchError::SessionDisposed(self.id.clone()))?;
            match *state {
                SessionState::Started => {
                    debug!("Stream '{}' already started", self.id);
                    return Ok(());
                }
                SessionState::Disposed => return Err(DispatchError::SessionDisposed(self.id.clone())),
                SessionState::Created | SessionState::Stopped => {}
            }

            if let Ok(mut metadata) = self.metadata.write() {
                *metadata = StreamMetadata {
                    codec: self
                        .camera
                        .video_codec
                        .clone()
                        .unwrap_or_else(|| DEFAULT_CODEC.to_string()),
                    container: RELAY_CONTAINER.to_string(),
                    endpoint: self.relay.public_url().to_string(),
                };
            }
            *state = SessionState::Started;
        }

        if let Some(this) = self.this.upgrade() {
            self.relay.register(&self.id, this);
        }

        info!("Stream '{}' started", self.id);
        Ok(())
    }

    async fn wire(&self) -> Result<()> {
        match self.state() {
            SessionState::Disposed => return Err(DispatchError::SessionDisposed(self.id.clone())),
            SessionState::Stopped => {
                return Err(DispatchError::LiveFeed(format!(
                    "Stream '{}' is stopped",
                    self.id
                )))
            }
            SessionState::Created | SessionState::Started => {}
        }

        let mut slot = self.feed.lock().await;
        if let Some(ref pump) = *slot {
            if !pump.task.is_finished() {
                return Ok(());
            }
        }

        let feed = self.nvr.open_livestream(&self.camera).await?;
        let cancel = CancellationToken::new();
        let context = PumpContext {
            topic: self.id.clone(),
            camera: self.camera.clone(),
            nvr: self.nvr.clone(),
            relay: self.relay.clone(),
            recovery: self.recovery.clone(),
            metadata: self.metadata.clone(),
            session: self.this.clone(),
        };
        let task = tokio::spawn(pump::run(context, feed, cancel.clone()));

        debug!("Live feed for '{}' opened", self.id);
        *slot = Some(FeedPump { cancel, task });
        Ok(())
    }

    async fn unwire(&self) {
        if let Some(pump) = self.feed.lock().await.take() {
            // 不等待任务结束，unwire可能由转发任务自身触发
            pump.cancel.cancel();
            debug!("Live feed for '{}' closed", self.id);
        }
    }

    async fn stop(&self) -> Result<()> {
        {
            let mut state = self
                .state
                .lock()
                .map_err(|_| DispatchError::SessionDisposed(self.id.clone()))?;
            if *state != SessionState::Started {
                debug!("Stream '{}' is not running, nothing to stop", self.id);
                return Ok(());
            }
            *state = SessionState::Stopped;
        }

        self.relay.close_topic(&self.id);
        self.unwire().await;

        info!("Stream '{}' stopped", self.id);
        Ok(())
    }

    async fn dispose(&self) {
        let previous = match self.state.lock() {
            Ok(mut state) => std::mem::replace(&mut *state, SessionState::Disposed),
            Err(_) => return,
        };
        if previous == SessionState::Disposed {
            return;
        }

        if previous == SessionState::Started {
            self.relay.close_topic(&self.id);
        }
        self.unwire().await;

        debug!("Stream '{}' disposed", self.id);
    }
}
