// 单个订阅者WebSocket连接
//
// 入站文本消息作为控制消息处理；relay的输出按类型写回：
// 帧数据为二进制消息，错误应答为JSON文本，topic关闭或拒绝时关闭连接。

use std::collections::HashSet;

use axum::extract::ws::{Message, WebSocket};
use common::{ControlReply, UNKNOWN_MESSAGE_TYPE};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info};

use super::{ControlOutcome, Outbound, Relay, SubscriberHandle};

pub async fn serve_connection(socket: WebSocket, relay: Relay) {
    let (subscriber, mut outbound) = SubscriberHandle::channel();
    let (mut sink, mut stream) = socket.split();
    let mut topics: HashSet<String> = HashSet::new();

    info!("Subscriber {} connected", subscriber.id());

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    match relay.handle_control(&text, &subscriber).await {
                        ControlOutcome::Subscribed(topic) => {
                            topics.insert(topic);
                        }
                        ControlOutcome::Unsubscribed(topic) => {
                            topics.remove(&topic);
                        }
                        ControlOutcome::Replied | ControlOutcome::Rejected => {}
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    subscriber.reply(ControlReply::error(UNKNOWN_MESSAGE_TYPE));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Subscriber {} socket error: {}", subscriber.id(), e);
                    break;
                }
            },
            message = outbound.recv() => match message {
                Some(Outbound::Frame(data)) => {
                    if sink.send(Message::Binary(data.to_vec())).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Reply(reply)) => {
                    if sink.send(Message::Text(reply.to_json())).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Closed { topic }) => {
                    topics.remove(&topic);
                    if topics.is_empty() {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
                Some(Outbound::Disconnect) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }

    for topic in topics {
        relay.unsubscribe(&topic, subscriber.id()).await;
    }

    info!("Subscriber {} disconnected", subscriber.id());
}
