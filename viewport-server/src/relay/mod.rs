// 发布/订阅中继
//
// 一个上游实时流按topic扇出给多个订阅者连接。
// topic即会话标识，只有已启动并注册的会话才能被订阅。

pub mod connection;
pub mod server;
pub mod subscriber;

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use common::{ControlMessage, ControlReply, DispatchError, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::session::StreamSession;

pub use server::RelayServer;
pub use subscriber::{Outbound, SubscriberHandle};

/// topic失去最后一个订阅者时如何处理上游实时流
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdlePolicy {
    /// 保持打开直到会话停止，重新订阅无需等待上游
    #[default]
    KeepOpen,
    /// 立即关闭上游实时流，下一个订阅者到来时重新打开
    CloseUpstream,
}

/// 控制消息的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    Subscribed(String),
    Unsubscribed(String),
    /// 已回复错误，订阅状态未改变
    Replied,
    /// 订阅被拒绝，连接将被关闭
    Rejected,
}

struct RelayInner {
    public_url: String,
    idle_policy: IdlePolicy,
    sessions: DashMap<String, Arc<dyn StreamSession>>,
    topics: DashMap<String, HashMap<Uuid, SubscriberHandle>>,
}

#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

impl Relay {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                public_url: config.public_url.clone(),
                idle_policy: config.idle_policy,
                sessions: DashMap::new(),
                topics: DashMap::new(),
            }),
        }
    }

    /// 会话汇报给观看端的地址
    pub fn public_url(&self) -> &str {
        &self.inner.public_url
    }

    pub fn idle_policy(&self) -> IdlePolicy {
        self.inner.idle_policy
    }

    /// 注册已启动的会话，之后该topic可被订阅
    pub fn register(&self, topic: &str, session: Arc<dyn StreamSession>) {
        debug!("Registering topic '{}'", topic);
        self.inner.sessions.insert(topic.to_string(), session);
    }

    pub fn is_registered(&self, topic: &str) -> bool {
        self.inner.sessions.contains_key(topic)
    }

    /// 订阅topic
    ///
    /// 未知topic: 回复`Unknown stream id`并关闭订阅者连接。
    /// 第一个订阅者会触发会话打开上游实时流。
    pub async fn subscribe(&self, topic: &str, subscriber: SubscriberHandle) -> Result<()> {
        let session = match self.inner.sessions.get(topic) {
            Some(entry) => entry.value().clone(),
            None => {
                warn!("Rejecting subscriber {} for unknown topic '{}'", subscriber.id(), topic);
                subscriber.reject(ControlReply::unknown_stream());
                return Err(DispatchError::UnknownTopic(topic.to_string()));
            }
        };

        let first = {
            let mut subscribers = self.inner.topics.entry(topic.to_string()).or_default();
            let first = subscribers.is_empty();
            subscribers.insert(subscriber.id(), subscriber.clone());
            first
        };

        debug!("Subscriber {} joined topic '{}'", subscriber.id(), topic);

        if first {
            if let Err(e) = session.wire().await {
                warn!("Unable to open live feed for '{}': {}", topic, e);
                // 等待期间加入的订阅者同样没有实时流，一并拒绝
                let reply = ControlReply::error(e.to_string());
                let joined = self
                    .inner
                    .topics
                    .remove(topic)
                    .map(|(_, subscribers)| subscribers)
                    .unwrap_or_default();
                if !joined.contains_key(&subscriber.id()) {
                    subscriber.reject(reply.clone());
                }
                for waiting in joined.values() {
                    waiting.reject(reply.clone());
                }
                return Err(e);
            }
        }

        Ok(())
    }

    /// 退订，订阅者不在topic中时不做任何事
    pub async fn unsubscribe(&self, topic: &str, subscriber_id: Uuid) {
        let emptied = self.remove_subscriber(topic, subscriber_id);

        if emptied && self.inner.idle_policy == IdlePolicy::CloseUpstream {
            let session = self
                .inner
                .sessions
                .get(topic)
                .map(|entry| entry.value().clone());
            if let Some(session) = session {
                debug!("Topic '{}' is idle, closing live feed", topic);
                session.unwire().await;
            }
        }
    }

    /// 向topic的所有订阅者投递一帧，返回投递成功的订阅者数量
    ///
    /// 投递失败的订阅者被移出扇出集合，不影响其他订阅者。
    pub fn publish(&self, topic: &str, frame: Bytes) -> usize {
        let (delivered, emptied) = match self.inner.topics.get_mut(topic) {
            Some(mut subscribers) => {
                let before = subscribers.len();
                subscribers.retain(|_, subscriber| subscriber.send(Outbound::Frame(frame.clone())));
                let dropped = before - subscribers.len();
                if dropped > 0 {
                    debug!("Dropped {} disconnected subscribers from '{}'", dropped, topic);
                }
                (subscribers.len(), before > 0 && subscribers.is_empty())
            }
            None => (0, false),
        };

        if emptied {
            self.inner
                .topics
                .remove_if(topic, |_, subscribers| subscribers.is_empty());

            if self.inner.idle_policy == IdlePolicy::CloseUpstream {
                let session = self
                    .inner
                    .sessions
                    .get(topic)
                    .map(|entry| entry.value().clone());
                if let Some(session) = session {
                    tokio::spawn(async move { session.unwire().await });
                }
            }
        }

        delivered
    }

    /// 注销会话并通知所有订阅者topic已关闭
    pub fn close_topic(&self, topic: &str) {
        self.inner.sessions.remove(topic);

        if let Some((_, subscribers)) = self.inner.topics.remove(topic) {
            info!(
                "Closing topic '{}' with {} subscribers",
                topic,
                subscribers.len()
            );
            for subscriber in subscribers.values() {
                subscriber.send(Outbound::Closed {
                    topic: topic.to_string(),
                });
            }
        }
    }

    /// 处理订阅者发来的一条文本控制消息
    pub async fn handle_control(&self, text: &str, subscriber: &SubscriberHandle) -> ControlOutcome {
        match ControlMessage::parse(text) {
            Err(reply) => {
                debug!("Subscriber {} sent an invalid control message", subscriber.id());
                subscriber.reply(reply);
                ControlOutcome::Replied
            }
            Ok(ControlMessage::Subscribe { topic }) => {
                match self.subscribe(&topic, subscriber.clone()).await {
                    Ok(()) => ControlOutcome::Subscribed(topic),
                    Err(_) => ControlOutcome::Rejected,
                }
            }
            Ok(ControlMessage::Unsubscribe { topic }) => {
                self.unsubscribe(&topic, subscriber.id()).await;
                ControlOutcome::Unsubscribed(topic)
            }
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .topics
            .get(topic)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }

    /// 至少有一个订阅者的topic数量
    pub fn topic_count(&self) -> usize {
        self.inner.topics.len()
    }

    /// 移除订阅者，返回topic是否因此变空
    fn remove_subscriber(&self, topic: &str, subscriber_id: Uuid) -> bool {
        let emptied = match self.inner.topics.get_mut(topic) {
            Some(mut subscribers) => {
                subscribers.remove(&subscriber_id).is_some() && subscribers.is_empty()
            }
            None => false,
        };

        if emptied {
            self.inner
                .topics
                .remove_if(topic, |_, subscribers| subscribers.is_empty());
        }
        emptied
    }
}
