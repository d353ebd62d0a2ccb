use common::{Result, StreamReport};
use tracing::{error, info};

use crate::provider::ProviderRegistry;
use crate::request::StreamRequest;

/// 调度入口：解析请求，选择provider，解析并启动会话
pub struct Dispatcher {
    registry: ProviderRegistry,
}

impl Dispatcher {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// 按输入顺序处理一批请求URL
    ///
    /// 遇到第一个失败立即返回，之前已启动的会话保持运行。
    /// `layout`只影响显示排列，这里仅记录。
    pub async fn handle_requests(
        &self,
        layout: Option<&str>,
        urls: &[String],
    ) -> Result<Vec<StreamReport>> {
        if let Some(layout) = layout {
            info!("Requested layout '{}' for {} urls", layout, urls.len());
        }

        let mut reports = Vec::new();
        for url in urls {
            match self.handle_request(url).await {
                Ok(mut started) => reports.append(&mut started),
                Err(e) => {
                    error!("Failed to dispatch stream url: {}", e);
                    return Err(e);
                }
            }
        }

        Ok(reports)
    }

    async fn handle_request(&self, url: &str) -> Result<Vec<StreamReport>> {
        let request = StreamRequest::parse(url)?;
        let provider = self.registry.select(&request)?;
        let sessions = provider.get_or_create_sessions(&request).await?;

        let mut reports = Vec::with_capacity(sessions.len());
        for session in sessions {
            session.start().await?;
            let report = session.report();
            info!("{}", report);
            reports.push(report);
        }

        Ok(reports)
    }

    /// 按注册顺序释放所有provider
    pub async fn dispose(&self) {
        for provider in self.registry.providers() {
            info!("Disposing provider '{}'", provider.name());
            provider.dispose().await;
        }
    }
}
