//! Real-time event streaming
//! 把合并后的状态变更通过 SSE 推送给控制台页面

pub mod dispatcher;
pub mod push;

use std::time::Duration;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::models::RequestStatus;

pub use dispatcher::{
    apply_event, ConsoleState, Dispatcher, DispatcherHandle, SharedState, SyncMessage,
};
pub use push::{PushChannel, PushState};

/// 控制台事件类型
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleEvent {
    /// 全量刷新已生效
    GardensRefreshed { count: usize, replayed: usize },
    /// 花园新增/更新/移除
    GardenChanged { name: String, removed: bool },
    /// 系统新增/更新/移除
    SystemChanged {
        garden: String,
        system: String,
        removed: bool,
    },
    /// 实例状态变更
    InstanceChanged {
        garden: String,
        instance: String,
        status: String,
    },
    /// 请求生命周期变更
    RequestChanged {
        request_id: String,
        status: RequestStatus,
        views: Vec<String>,
    },
    /// 推送通道连接状态
    PushChannel { connected: bool },
    /// 心跳信号（保持连接活跃）
    Heartbeat,
}

impl ConsoleEvent {
    /// 转换为SSE格式的数据
    pub fn to_sse_data(&self) -> String {
        let data = match self {
            ConsoleEvent::GardensRefreshed { count, replayed } => serde_json::json!({
                "count": count,
                "replayed": replayed,
            }),
            ConsoleEvent::GardenChanged { name, removed } => serde_json::json!({
                "name": name,
                "removed": removed,
            }),
            ConsoleEvent::SystemChanged {
                garden,
                system,
                removed,
            } => serde_json::json!({
                "garden": garden,
                "system": system,
                "removed": removed,
            }),
            ConsoleEvent::InstanceChanged {
                garden,
                instance,
                status,
            } => serde_json::json!({
                "garden": garden,
                "instance": instance,
                "status": status,
            }),
            ConsoleEvent::RequestChanged {
                request_id,
                status,
                views,
            } => serde_json::json!({
                "request_id": request_id,
                "status": status,
                "views": views,
            }),
            ConsoleEvent::PushChannel { connected } => serde_json::json!({
                "connected": connected,
            }),
            ConsoleEvent::Heartbeat => serde_json::json!({
                "timestamp": chrono::Utc::now().to_rfc3339()
            }),
        };

        serde_json::json!({
            "type": self.event_type(),
            "data": data,
        })
        .to_string()
    }

    /// 获取事件类型名称
    pub fn event_type(&self) -> &'static str {
        match self {
            ConsoleEvent::GardensRefreshed { .. } => "gardens_refreshed",
            ConsoleEvent::GardenChanged { .. } => "garden_changed",
            ConsoleEvent::SystemChanged { .. } => "system_changed",
            ConsoleEvent::InstanceChanged { .. } => "instance_changed",
            ConsoleEvent::RequestChanged { .. } => "request_changed",
            ConsoleEvent::PushChannel { .. } => "push_channel",
            ConsoleEvent::Heartbeat => "heartbeat",
        }
    }
}

/// 事件总线
#[derive(Clone)]
pub struct EventBus {
    /// 广播发送器（用于向所有订阅者发送事件）
    sender: broadcast::Sender<ConsoleEvent>,
}

impl EventBus {
    /// 创建新的事件总线
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 发布事件；没有订阅者不算错误
    pub fn publish(&self, event: ConsoleEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No SSE subscribers, event dropped");
        }
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// 订阅事件流，可按请求 id 过滤
    pub fn subscribe_stream(&self, request_id: Option<String>) -> ConsoleEventStream {
        ConsoleEventStream {
            receiver: self.subscribe(),
            request_id,
        }
    }
}

/// 控制台事件流
pub struct ConsoleEventStream {
    receiver: broadcast::Receiver<ConsoleEvent>,
    request_id: Option<String>,
}

impl ConsoleEventStream {
    fn wants(&self, event: &ConsoleEvent) -> bool {
        match (&self.request_id, event) {
            (None, _) => true,
            (Some(focus), ConsoleEvent::RequestChanged { request_id, views, .. }) => {
                request_id == focus || views.contains(focus)
            }
            (Some(_), ConsoleEvent::Heartbeat | ConsoleEvent::PushChannel { .. }) => true,
            (Some(_), _) => false,
        }
    }

    /// 转换为SSE流
    pub fn to_sse_stream(
        mut self,
        heartbeat: Duration,
    ) -> impl futures::Stream<Item = Result<String>> {
        let (tx, rx) = tokio::sync::mpsc::channel(100);

        // 心跳定时器
        let heartbeat_tx = tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(heartbeat);
            loop {
                interval.tick().await;
                let frame = sse_frame(&ConsoleEvent::Heartbeat);
                if heartbeat_tx.send(Ok(frame)).await.is_err() {
                    break;
                }
            }
        });

        // 事件转发任务
        tokio::spawn(async move {
            loop {
                let event = match self.receiver.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "SSE subscriber lagged behind");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if self.wants(&event) && tx.send(Ok(sse_frame(&event))).await.is_err() {
                    break;
                }
            }
        });

        tokio_stream::wrappers::ReceiverStream::new(rx)
    }
}

fn sse_frame(event: &ConsoleEvent) -> String {
    format!("event: {}\ndata: {}\n\n", event.event_type(), event.to_sse_data())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_data_shape() {
        let event = ConsoleEvent::GardenChanged {
            name: "remote".to_string(),
            removed: true,
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_sse_data()).unwrap();
        assert_eq!(value["type"], "garden_changed");
        assert_eq!(value["data"]["name"], "remote");
        assert_eq!(value["data"]["removed"], true);
    }

    #[test]
    fn test_stream_filter_by_request() {
        let bus = EventBus::new(8);
        let stream = bus.subscribe_stream(Some("p1".to_string()));

        let child = ConsoleEvent::RequestChanged {
            request_id: "c1".to_string(),
            status: RequestStatus::Success,
            views: vec!["p1".to_string()],
        };
        let other = ConsoleEvent::RequestChanged {
            request_id: "c9".to_string(),
            status: RequestStatus::Success,
            views: vec![],
        };
        assert!(stream.wants(&child));
        assert!(!stream.wants(&other));
        assert!(!stream.wants(&ConsoleEvent::GardenChanged {
            name: "g".to_string(),
            removed: false,
        }));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        bus.publish(ConsoleEvent::Heartbeat);

        let mut receiver = bus.subscribe();
        bus.publish(ConsoleEvent::PushChannel { connected: true });
        assert_eq!(
            receiver.recv().await.unwrap(),
            ConsoleEvent::PushChannel { connected: true }
        );
    }
}
