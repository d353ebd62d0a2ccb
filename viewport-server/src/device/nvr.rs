use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::{CameraInfo, Credentials, DeviceKey, DispatchError, Result};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::api::{LiveFeed, ProtectApi, ProtectConnector};
use crate::config::UpstreamConfig;

/// 已登录并完成bootstrap的NVR连接
///
/// 摄像头清单在连接建立时获取一次，之后不再刷新。
pub struct NvrConnection {
    key: DeviceKey,
    api: Arc<dyn ProtectApi>,
    cameras: Vec<CameraInfo>,
    config: UpstreamConfig,
    disposed: AtomicBool,
}

impl NvrConnection {
    /// 登录并拉取摄像头清单
    pub async fn connect(
        key: DeviceKey,
        credentials: Credentials,
        connector: Arc<dyn ProtectConnector>,
        config: UpstreamConfig,
    ) -> Result<Self> {
        let host = key.host.clone();

        let api = match timeout(config.login_timeout, connector.login(&host, &credentials)).await {
            Ok(Ok(api)) => api,
            Ok(Err(e)) => {
                return Err(DispatchError::AuthenticationFailed {
                    host,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(DispatchError::AuthenticationFailed {
                    host,
                    reason: format!("login timed out after {:?}", config.login_timeout),
                })
            }
        };

        let cameras = match timeout(config.bootstrap_timeout, api.bootstrap()).await {
            Ok(Ok(cameras)) => cameras,
            Ok(Err(e)) => {
                api.logout().await;
                return Err(DispatchError::BootstrapFailed {
                    host,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                api.logout().await;
                return Err(DispatchError::BootstrapFailed {
                    host,
                    reason: format!("bootstrap timed out after {:?}", config.bootstrap_timeout),
                });
            }
        };

        info!(
            "Connected to NVR {} with {} cameras",
            key,
            cameras.len()
        );

        Ok(Self {
            key,
            api,
            cameras,
            config,
            disposed: AtomicBool::new(false),
        })
    }

    pub fn key(&self) -> &DeviceKey {
        &self.key
    }

    pub fn host(&self) -> &str {
        &self.key.host
    }

    /// bootstrap时获得的摄像头清单，保持设备上报顺序
    pub fn cameras(&self) -> &[CameraInfo] {
        &self.cameras
    }

    /// 打开摄像头实时流
    pub async fn open_livestream(&self, camera: &CameraInfo) -> Result<LiveFeed> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(DispatchError::LiveFeed(format!(
                "NVR connection {} has been disposed",
                self.key
            )));
        }

        debug!("Opening livestream for camera '{}' on {}", camera.name, self.key);

        match timeout(
            self.config.feed_open_timeout,
            self.api
                .open_livestream(&camera.id, self.config.livestream_channel),
        )
        .await
        {
            Ok(Ok(feed)) => Ok(feed),
            Ok(Err(e)) => Err(DispatchError::LiveFeed(format!(
                "camera '{}' on '{}': {}",
                camera.name,
                self.host(),
                e
            ))),
            Err(_) => Err(DispatchError::LiveFeed(format!(
                "camera '{}' on '{}': livestream did not open within {:?}",
                camera.name,
                self.host(),
                self.config.feed_open_timeout
            ))),
        }
    }

    /// 注销登录，可重复调用
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Disconnecting from NVR {}", self.key);
        if timeout(self.config.login_timeout, self.api.logout())
            .await
            .is_err()
        {
            warn!("Logout from NVR {} timed out", self.key);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
