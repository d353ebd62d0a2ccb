// 上游NVR能力抽象
//
// 登录、拉取摄像头清单（bootstrap）、打开实时流通道三种能力，
// 具体厂商协议由实现方负责。

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use common::{CameraInfo, Credentials};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// 上游客户端错误
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("Rejected by controller: {0}")]
    Rejected(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),
}

/// 实时流事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// 上游报告的编码信息
    Codec(String),
    /// 原始帧数据
    Frame(Bytes),
}

/// 已打开的实时流通道
///
/// 丢弃或调用`close`都会通知上游读取任务退出。
pub struct LiveFeed {
    events: mpsc::Receiver<FeedEvent>,
    cancel: CancellationToken,
}

impl LiveFeed {
    pub fn new(events: mpsc::Receiver<FeedEvent>, cancel: CancellationToken) -> Self {
        Self { events, cancel }
    }

    /// 下一个事件，`None`表示上游已关闭
    pub async fn next_event(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }

    pub fn close(&mut self) {
        self.cancel.cancel();
        self.events.close();
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// 登录能力，成功后返回已认证的API句柄
#[async_trait]
pub trait ProtectConnector: Send + Sync {
    async fn login(
        &self,
        host: &str,
        credentials: &Credentials,
    ) -> Result<Arc<dyn ProtectApi>, UpstreamError>;
}

/// 已认证的NVR会话
#[async_trait]
pub trait ProtectApi: Send + Sync {
    /// 拉取设备当前的摄像头清单
    async fn bootstrap(&self) -> Result<Vec<CameraInfo>, UpstreamError>;

    /// 为指定摄像头打开实时流通道
    async fn open_livestream(&self, camera_id: &str, channel: u8)
        -> Result<LiveFeed, UpstreamError>;

    async fn logout(&self) {}
}
