// 实时流转发任务
//
// 从上游实时流读取事件并发布到relay；上游断开时按恢复策略重连，
// 重试耗尽后停止会话。

use std::sync::{Arc, RwLock, Weak};

use common::{CameraInfo, DispatchError, StreamMetadata};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ErrorRecoveryPolicy, StreamSession, UnifiStreamSession};
use crate::device::{FeedEvent, LiveFeed, NvrConnection};
use crate::relay::Relay;

pub(super) struct PumpContext {
    pub topic: String,
    pub camera: CameraInfo,
    pub nvr: Arc<NvrConnection>,
    pub relay: Relay,
    pub recovery: ErrorRecoveryPolicy,
    pub metadata: Arc<RwLock<StreamMetadata>>,
    pub session: Weak<UnifiStreamSession>,
}

pub(super) async fn run(context: PumpContext, mut feed: LiveFeed, cancel: CancellationToken) {
    let mut attempt = 0u32;

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                feed.close();
                return;
            }
            event = feed.next_event() => event,
        };

        match event {
            Some(FeedEvent::Frame(data)) => {
                attempt = 0;
                context.relay.publish(&context.topic, data);
            }
            Some(FeedEvent::Codec(codec)) => {
                debug!("Stream '{}' reports codec '{}'", context.topic, codec);
                if let Ok(mut metadata) = context.metadata.write() {
                    metadata.codec = codec;
                }
            }
            None => {
                warn!("Live feed for '{}' ended unexpectedly", context.topic);
                match reconnect(&context, &cancel, &mut attempt).await {
                    Some(next) => feed = next,
                    None => break,
                }
            }
        }
    }

    if cancel.is_cancelled() {
        return;
    }

    if let Some(session) = context.session.upgrade() {
        warn!(
            "Giving up on live feed for '{}', stopping stream",
            context.topic
        );
        if let Err(e) = session.stop().await {
            warn!("Failed to stop stream '{}': {}", context.topic, e);
        }
    }
}

async fn reconnect(
    context: &PumpContext,
    cancel: &CancellationToken,
    attempt: &mut u32,
) -> Option<LiveFeed> {
    let mut error = DispatchError::LiveFeed(format!("live feed for '{}' closed", context.topic));

    while context.recovery.should_retry(&error, *attempt) {
        let delay = context.recovery.calculate_delay(*attempt);
        *attempt += 1;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        match context.nvr.open_livestream(&context.camera).await {
            Ok(feed) => {
                info!(
                    "Live feed for '{}' reconnected (attempt {})",
                    context.topic, attempt
                );
                return Some(feed);
            }
            Err(e) => {
                warn!(
                    "Reconnect attempt {} for '{}' failed: {}",
                    attempt, context.topic, e
                );
                error = e;
            }
        }
    }

    None
}
