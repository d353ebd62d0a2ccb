use std::sync::Arc;

use common::{Credentials, DeviceKey, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tracing::{debug, info};

use super::api::ProtectConnector;
use super::nvr::NvrConnection;
use crate::config::UpstreamConfig;

type PendingConnection = Shared<BoxFuture<'static, Result<Arc<NvrConnection>>>>;

enum Slot {
    Ready(Arc<NvrConnection>),
    /// 登录进行中，并发请求共享同一个future
    Pending(PendingConnection),
}

/// NVR连接池
///
/// 每个`DeviceKey`最多一次登录：并发请求等待同一次登录，
/// 成功后缓存连接，失败则不缓存，下次请求重新登录。
pub struct ConnectionPool {
    connector: Arc<dyn ProtectConnector>,
    config: UpstreamConfig,
    slots: DashMap<DeviceKey, Slot>,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn ProtectConnector>, config: UpstreamConfig) -> Self {
        Self {
            connector,
            config,
            slots: DashMap::new(),
        }
    }

    /// 获取或建立连接
    ///
    /// 命中缓存时忽略传入的凭据。
    pub async fn get_or_create(
        &self,
        key: DeviceKey,
        credentials: Credentials,
    ) -> Result<Arc<NvrConnection>> {
        let pending = match self.slots.entry(key.clone()) {
            Entry::Occupied(entry) => match entry.get() {
                Slot::Ready(connection) => {
                    debug!("Reusing NVR connection {}", key);
                    return Ok(connection.clone());
                }
                Slot::Pending(pending) => pending.clone(),
            },
            Entry::Vacant(entry) => {
                let pending = NvrConnection::connect(
                    key.clone(),
                    credentials,
                    self.connector.clone(),
                    self.config.clone(),
                )
                .map(|result| result.map(Arc::new))
                .boxed()
                .shared();
                entry.insert(Slot::Pending(pending.clone()));
                pending
            }
        };

        let result = pending.clone().await;

        // 只有仍然是本次登录占位时才落定，避免覆盖dispose之后的新条目
        if let Entry::Occupied(mut entry) = self.slots.entry(key) {
            let ours = matches!(entry.get(), Slot::Pending(p) if p.ptr_eq(&pending));
            if ours {
                match &result {
                    Ok(connection) => {
                        entry.insert(Slot::Ready(connection.clone()));
                    }
                    Err(e) => {
                        info!("Connection to NVR {} failed: {}", entry.key(), e);
                        entry.remove();
                    }
                }
            }
        }

        result
    }

    /// 已缓存或正在建立的连接数
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 是否持有该设备的已登录连接
    pub fn contains(&self, key: &DeviceKey) -> bool {
        self.slots
            .get(key)
            .map(|slot| matches!(slot.value(), Slot::Ready(_)))
            .unwrap_or(false)
    }

    /// 清空连接池并注销所有连接
    ///
    /// 进行中的登录会被等待，成功后同样注销。
    pub async fn dispose(&self) {
        let keys: Vec<DeviceKey> = self.slots.iter().map(|entry| entry.key().clone()).collect();

        let mut connections = Vec::new();
        let mut pending = Vec::new();
        for key in keys {
            match self.slots.remove(&key) {
                Some((_, Slot::Ready(connection))) => connections.push(connection),
                Some((key, Slot::Pending(login))) => pending.push((key, login)),
                None => {}
            }
        }

        for (key, login) in pending {
            debug!("Waiting for in-flight login to NVR {}", key);
            if let Ok(connection) = login.await {
                connections.push(connection);
            }
        }

        for connection in connections {
            connection.dispose().await;
        }
    }
}
