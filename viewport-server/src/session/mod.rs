// 流会话
//
// 状态机: Created --start()--> Started --stop()--> Stopped --dispose()--> Disposed
// 会话由provider持有，relay在会话启动期间引用它。

pub mod recovery;
pub mod unifi;

mod pump;

use async_trait::async_trait;
use common::{Result, SessionState, StreamMetadata, StreamReport};

pub use recovery::{ErrorRecoveryPolicy, RetryStrategy};
pub use unifi::UnifiStreamSession;

/// 单个摄像头/源的流会话
#[async_trait]
pub trait StreamSession: Send + Sync {
    /// 全局唯一标识，同时作为relay的topic
    fn id(&self) -> &str;

    fn state(&self) -> SessionState;

    /// 启动后才填充
    fn metadata(&self) -> StreamMetadata;

    /// 启动会话，已启动时不做任何事
    async fn start(&self) -> Result<()>;

    /// 第一个订阅者到来时由relay调用，打开上游实时流
    async fn wire(&self) -> Result<()>;

    /// 关闭上游实时流，会话保持当前状态
    async fn unwire(&self);

    /// 停止会话并关闭所有订阅者，未启动时不做任何事
    async fn stop(&self) -> Result<()>;

    /// 释放全部资源，可重复调用
    async fn dispose(&self);

    fn report(&self) -> StreamReport {
        StreamReport::new(self.id(), self.metadata())
    }
}
