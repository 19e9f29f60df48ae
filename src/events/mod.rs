use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

// 每个群组通道的积压上限，慢消费者超过后丢旧消息
const CHANNEL_CAPACITY: usize = 128;

/// 推给订阅者的群组动态快照
#[derive(Debug, Clone, Serialize)]
pub struct FeedEvent {
    pub message_id: String,
    pub group_id: String,
    pub user_id: String,
    pub nickname: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// 进程内的群组事件总线。
///
/// 每个群组一条 broadcast 通道，按需建立；订阅是惰性的，断开重连即重新
/// 订阅（不回放历史）。最后一个订阅者退出后，下一次 publish 会把通道回收。
#[derive(Clone, Default)]
pub struct EventHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<FeedEvent>>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, group_id: &str) -> broadcast::Receiver<FeedEvent> {
        let mut channels = self.channels.lock().expect("event hub lock poisoned");
        channels
            .entry(group_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn publish(&self, event: FeedEvent) {
        let group_id = event.group_id.clone();
        let mut channels = self.channels.lock().expect("event hub lock poisoned");
        if let Some(tx) = channels.get(&group_id) {
            if tx.send(event).is_err() {
                // 没有存活的订阅者，回收通道
                channels.remove(&group_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(group_id: &str, content: &str) -> FeedEvent {
        FeedEvent {
            message_id: "m1".into(),
            group_id: group_id.into(),
            user_id: "u1".into(),
            nickname: "测试用户".into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe("g1");
        hub.publish(event("g1", "hello"));
        let got = rx.recv().await.unwrap();
        assert_eq!(got.content, "hello");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let hub = EventHub::new();
        hub.publish(event("g1", "nobody home"));
        // 之后的订阅者照常工作
        let mut rx = hub.subscribe("g1");
        hub.publish(event("g1", "second"));
        assert_eq!(rx.recv().await.unwrap().content, "second");
    }

    #[tokio::test]
    async fn groups_are_isolated() {
        let hub = EventHub::new();
        let mut rx_a = hub.subscribe("g-a");
        let mut rx_b = hub.subscribe("g-b");
        hub.publish(event("g-a", "only a"));
        assert_eq!(rx_a.recv().await.unwrap().group_id, "g-a");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn resubscribing_does_not_replay_history() {
        let hub = EventHub::new();
        let rx = hub.subscribe("g1");
        hub.publish(event("g1", "before"));
        drop(rx);
        let mut rx2 = hub.subscribe("g1");
        assert!(rx2.try_recv().is_err());
        hub.publish(event("g1", "after"));
        assert_eq!(rx2.recv().await.unwrap().content, "after");
    }
}
