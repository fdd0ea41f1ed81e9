//! 事件调度器
//! 唯一修改控制台状态的任务：REST 快照与推送事件经同一个 mpsc 队列串行应用

use std::sync::Arc;

use tokio::sync::{mpsc, watch, RwLock};

use super::{ConsoleEvent, EventBus};
use crate::config::RealtimeConfig;
use crate::error::{AppError, Result};
use crate::models::{Event, EventEnvelope, Garden, Request};
use crate::services::{
    GardenState, RefreshOutcome, RefreshTicket, RequestIndex, RequestView, RequestViews,
};
use crate::upstream::UpstreamClient;

/// 调度器消息
#[derive(Debug)]
pub enum SyncMessage {
    /// 发起全量刷新
    RefreshRequested,
    /// 刷新结果
    GardenSnapshot {
        ticket: RefreshTicket,
        result: std::result::Result<Vec<Garden>, String>,
    },
    /// 推送通道原始消息
    Push(EventEnvelope),
    /// 开始跟踪某个请求的子请求视图
    TrackRequest(Request),
    /// 停止跟踪
    UntrackRequest(String),
}

/// 控制台状态
#[derive(Debug, Clone)]
pub struct ConsoleState {
    pub gardens: GardenState,
    pub requests: RequestViews,
    pub request_index: RequestIndex,
    /// 是否已拿到过一次花园快照
    pub snapshot_loaded: bool,
}

impl ConsoleState {
    pub fn new(config: &RealtimeConfig) -> Self {
        Self {
            gardens: GardenState::new(),
            requests: RequestViews::new(config.tracked_request_limit),
            request_index: RequestIndex::new(config.request_index_limit),
            snapshot_loaded: false,
        }
    }
}

pub type SharedState = Arc<RwLock<ConsoleState>>;

/// 把已校验事件应用到状态，返回需要广播的控制台事件
pub fn apply_event(state: &mut ConsoleState, event: &Event) -> Vec<ConsoleEvent> {
    let mut published = Vec::new();

    match event {
        Event::GardenUpserted(garden) | Event::GardenRemoved(garden) => {
            state.gardens.apply(event);
            published.push(ConsoleEvent::GardenChanged {
                name: garden.name.clone(),
                removed: matches!(event, Event::GardenRemoved(_)),
            });
        }
        Event::SystemUpserted { garden, system } | Event::SystemRemoved { garden, system } => {
            if state.gardens.apply(event) {
                published.push(ConsoleEvent::SystemChanged {
                    garden: garden.clone(),
                    system: format!("{}/{}/{}", system.namespace, system.name, system.version),
                    removed: matches!(event, Event::SystemRemoved { .. }),
                });
            }
        }
        Event::InstanceUpdated { garden, instance } => {
            if state.gardens.apply(event) {
                published.push(ConsoleEvent::InstanceChanged {
                    garden: garden.clone(),
                    instance: instance.name.clone(),
                    status: instance.status.clone(),
                });
            }
        }
        Event::Request(request_event) => {
            let views = state.requests.apply(request_event);
            let indexed = state.request_index.apply(request_event);
            if indexed || !views.is_empty() {
                published.push(ConsoleEvent::RequestChanged {
                    request_id: request_event.request.id.clone(),
                    status: request_event.request.status,
                    views,
                });
            }
        }
        Event::Ignored(name) => {
            tracing::trace!(event = %name, "Ignoring untracked event");
        }
    }

    published
}

/// 调度器句柄，供推送通道、定时器和 HTTP 处理器投递消息
#[derive(Clone)]
pub struct DispatcherHandle {
    sender: mpsc::Sender<SyncMessage>,
}

impl DispatcherHandle {
    async fn send(&self, message: SyncMessage) -> Result<()> {
        self.sender.send(message).await.map_err(|_| {
            tracing::error!("Dispatcher is gone, message dropped");
            AppError::Internal
        })
    }

    pub async fn request_refresh(&self) -> Result<()> {
        self.send(SyncMessage::RefreshRequested).await
    }

    pub async fn push(&self, envelope: EventEnvelope) -> Result<()> {
        self.send(SyncMessage::Push(envelope)).await
    }

    pub async fn track_request(&self, request: Request) -> Result<()> {
        self.send(SyncMessage::TrackRequest(request)).await
    }

    pub async fn untrack_request(&self, id: impl Into<String>) -> Result<()> {
        self.send(SyncMessage::UntrackRequest(id.into())).await
    }

    pub async fn deliver_snapshot(
        &self,
        ticket: RefreshTicket,
        result: std::result::Result<Vec<Garden>, String>,
    ) -> Result<()> {
        self.send(SyncMessage::GardenSnapshot { ticket, result }).await
    }
}

/// 事件调度器
pub struct Dispatcher {
    state: SharedState,
    bus: EventBus,
    upstream: Option<UpstreamClient>,
    sender: mpsc::Sender<SyncMessage>,
    receiver: mpsc::Receiver<SyncMessage>,
}

impl Dispatcher {
    pub fn new(
        state: SharedState,
        bus: EventBus,
        upstream: Option<UpstreamClient>,
        queue: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(queue);
        Self {
            state,
            bus,
            upstream,
            sender,
            receiver,
        }
    }

    pub fn handle(&self) -> DispatcherHandle {
        DispatcherHandle {
            sender: self.sender.clone(),
        }
    }

    /// 主循环，收到关闭信号后退出
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::info!("Dispatcher started");

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                message = self.receiver.recv() => {
                    match message {
                        Some(message) => self.handle_message(message).await,
                        None => break,
                    }
                }
            }
        }

        tracing::info!("Dispatcher stopped");
    }

    /// 处理单条消息
    pub async fn handle_message(&mut self, message: SyncMessage) {
        match message {
            SyncMessage::RefreshRequested => self.start_refresh().await,
            SyncMessage::GardenSnapshot { ticket, result } => {
                self.finish_refresh(ticket, result).await
            }
            SyncMessage::Push(envelope) => self.apply_envelope(envelope).await,
            SyncMessage::TrackRequest(request) => {
                let id = request.id.clone();
                self.state
                    .write()
                    .await
                    .requests
                    .track(RequestView::seeded(request));
                tracing::debug!(request_id = %id, "Tracking request view");
            }
            SyncMessage::UntrackRequest(id) => {
                let removed = self.state.write().await.requests.untrack(&id);
                tracing::debug!(request_id = %id, removed, "Untracking request view");
            }
        }
    }

    async fn start_refresh(&mut self) {
        let Some(upstream) = self.upstream.clone() else {
            tracing::debug!("No upstream client configured, refresh skipped");
            return;
        };

        let ticket = self.state.write().await.gardens.begin_refresh();
        let handle = self.handle();

        tokio::spawn(async move {
            let result = upstream.list_gardens().await.map_err(|e| e.to_string());
            if handle.deliver_snapshot(ticket, result).await.is_err() {
                tracing::warn!(ticket = ticket.id(), "Snapshot arrived after dispatcher shut down");
            }
        });
    }

    async fn finish_refresh(
        &mut self,
        ticket: RefreshTicket,
        result: std::result::Result<Vec<Garden>, String>,
    ) {
        let mut state = self.state.write().await;

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                state.gardens.abandon_refresh(ticket);
                metrics::counter!("console_refresh_total", "outcome" => "failed").increment(1);
                tracing::warn!(ticket = ticket.id(), error = %e, "Garden refresh failed");
                return;
            }
        };

        match state.gardens.complete_refresh(ticket, snapshot) {
            RefreshOutcome::Applied { replayed } => {
                state.snapshot_loaded = true;
                let count = state.gardens.len();
                drop(state);

                metrics::counter!("console_refresh_total", "outcome" => "applied").increment(1);
                tracing::info!(ticket = ticket.id(), count, replayed, "Garden snapshot applied");
                self.bus
                    .publish(ConsoleEvent::GardensRefreshed { count, replayed });
            }
            RefreshOutcome::Stale => {
                metrics::counter!("console_refresh_total", "outcome" => "stale").increment(1);
                tracing::info!(ticket = ticket.id(), "Discarding stale garden snapshot");
            }
        }
    }

    async fn apply_envelope(&mut self, envelope: EventEnvelope) {
        let name = envelope.name.clone();
        let event = match Event::try_from(envelope) {
            Ok(event) => event,
            Err(e) => {
                metrics::counter!("console_events_rejected_total", "reason" => rejection_reason(&e))
                    .increment(1);
                tracing::warn!(event = %name, error = %e, "Rejected push event");
                return;
            }
        };

        let published = {
            let mut state = self.state.write().await;
            apply_event(&mut state, &event)
        };

        metrics::counter!("console_events_applied_total", "kind" => event.kind()).increment(1);
        tracing::debug!(event = %name, kind = event.kind(), "Applied push event");

        for console_event in published {
            self.bus.publish(console_event);
        }
    }
}

fn rejection_reason(error: &crate::models::EventError) -> &'static str {
    use crate::models::EventError;

    match error {
        EventError::Upstream { .. } => "upstream_error",
        EventError::MissingPayload { .. } => "missing_payload",
        EventError::MissingGarden { .. } => "missing_garden",
        EventError::InvalidPayload { .. } => "invalid_payload",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConnectionType, RequestEvent, RequestEventKind};

    fn realtime_config() -> RealtimeConfig {
        RealtimeConfig {
            event_bus_capacity: 16,
            dispatcher_queue: 16,
            tracked_request_limit: 4,
            request_index_limit: 10,
            reconnect_initial_ms: 10,
            reconnect_max_ms: 100,
            heartbeat_secs: 30,
        }
    }

    #[test]
    fn test_apply_event_publishes_garden_change() {
        let mut state = ConsoleState::new(&realtime_config());
        let published = apply_event(
            &mut state,
            &Event::GardenUpserted(Garden::new("local", ConnectionType::Local)),
        );
        assert_eq!(
            published,
            vec![ConsoleEvent::GardenChanged {
                name: "local".to_string(),
                removed: false,
            }]
        );
        assert_eq!(state.gardens.len(), 1);
    }

    #[test]
    fn test_apply_event_for_unknown_garden_system_is_silent() {
        let mut state = ConsoleState::new(&realtime_config());
        let event = Event::SystemUpserted {
            garden: "nowhere".to_string(),
            system: crate::models::System::new("ns", "echo", "1.0"),
        };
        assert!(apply_event(&mut state, &event).is_empty());
    }

    #[test]
    fn test_apply_event_request_reaches_view_and_index() {
        let mut state = ConsoleState::new(&realtime_config());
        state.requests.track(RequestView::new("p1"));

        let event = Event::Request(RequestEvent::new(
            RequestEventKind::Created,
            Request::new("c1").with_parent("p1"),
        ));
        let published = apply_event(&mut state, &event);

        assert_eq!(published.len(), 1);
        assert_eq!(state.requests.get("p1").unwrap().children.len(), 1);
        // 子请求不进入顶层索引
        assert!(state.request_index.is_empty());
    }

    #[tokio::test]
    async fn test_dispatcher_rejects_invalid_envelope() {
        let state: SharedState = Arc::new(RwLock::new(ConsoleState::new(&realtime_config())));
        let mut dispatcher = Dispatcher::new(state.clone(), EventBus::new(8), None, 8);

        dispatcher
            .handle_message(SyncMessage::Push(EventEnvelope::new(
                "GARDEN_UPDATED",
                serde_json::json!({"status": "RUNNING"}),
            )))
            .await;

        assert!(state.read().await.gardens.is_empty());
    }

    #[tokio::test]
    async fn test_dispatcher_snapshot_marks_loaded() {
        let state: SharedState = Arc::new(RwLock::new(ConsoleState::new(&realtime_config())));
        let mut dispatcher = Dispatcher::new(state.clone(), EventBus::new(8), None, 8);

        let ticket = state.write().await.gardens.begin_refresh();
        dispatcher
            .handle_message(SyncMessage::GardenSnapshot {
                ticket,
                result: Ok(vec![Garden::new("local", ConnectionType::Local)]),
            })
            .await;

        let state = state.read().await;
        assert!(state.snapshot_loaded);
        assert_eq!(state.gardens.len(), 1);
    }
}
