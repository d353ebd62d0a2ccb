// 流提供者
//
// 每种上游家族一个provider：判断能否处理请求、解析设备与摄像头、
// 构造并缓存流会话。

pub mod registry;
pub mod rtsp;
pub mod unifi;

use std::sync::Arc;

use async_trait::async_trait;
use common::Result;

use crate::request::StreamRequest;
use crate::session::StreamSession;

pub use registry::ProviderRegistry;
pub use rtsp::RtspStreamProvider;
pub use unifi::UnifiStreamProvider;

#[async_trait]
pub trait StreamProvider: Send + Sync {
    fn name(&self) -> &str;

    /// 不会失败，不匹配时返回false
    fn can_handle(&self, request: &StreamRequest) -> bool;

    /// 解析请求得到的会话，按请求顺序排列；同一摄像头总是返回同一个会话
    async fn get_or_create_sessions(
        &self,
        request: &StreamRequest,
    ) -> Result<Vec<Arc<dyn StreamSession>>>;

    fn session_count(&self) -> usize;

    /// 先停止并释放会话，再释放设备连接
    async fn dispose(&self);
}
