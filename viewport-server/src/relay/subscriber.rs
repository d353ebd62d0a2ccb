use bytes::Bytes;
use common::ControlReply;
use tokio::sync::mpsc;
use uuid::Uuid;

/// relay发往订阅者连接的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// 一帧原始数据，作为二进制消息发送
    Frame(Bytes),
    /// 错误应答，作为JSON文本发送
    Reply(ControlReply),
    /// topic已关闭（会话停止）
    Closed { topic: String },
    /// 立即关闭连接
    Disconnect,
}

/// 订阅者句柄
///
/// 每个订阅者一个无界队列，连接任务负责把队列写入socket。
/// 只有队列接收端已关闭才算投递失败。
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl SubscriberHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn send(&self, message: Outbound) -> bool {
        self.tx.send(message).is_ok()
    }

    pub fn reply(&self, reply: ControlReply) -> bool {
        self.send(Outbound::Reply(reply))
    }

    /// 发送错误应答后关闭连接
    pub fn reject(&self, reply: ControlReply) {
        if self.reply(reply) {
            self.send(Outbound::Disconnect);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reject_sends_reply_then_disconnect() {
        let (handle, mut rx) = SubscriberHandle::channel();
        handle.reject(ControlReply::unknown_stream());

        assert_eq!(
            rx.recv().await,
            Some(Outbound::Reply(ControlReply::unknown_stream()))
        );
        assert_eq!(rx.recv().await, Some(Outbound::Disconnect));
    }

    #[test]
    fn test_send_fails_after_receiver_dropped() {
        let (handle, rx) = SubscriberHandle::channel();
        assert!(handle.send(Outbound::Frame(Bytes::from_static(b"f1"))));

        drop(rx);
        assert!(handle.is_closed());
        assert!(!handle.send(Outbound::Frame(Bytes::from_static(b"f2"))));
    }
}
