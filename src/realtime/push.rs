//! 推送通道
//! 连接 beer-garden 事件 WebSocket，把消息转交调度器，断线后指数退避重连

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, Secret};
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{ConsoleEvent, DispatcherHandle, EventBus};
use crate::config::AppConfig;
use crate::models::EventEnvelope;

const BACKOFF_MULTIPLIER: f64 = 2.0;

/// 推送通道连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushState {
    Disconnected,
    Connected,
}

/// 推送通道客户端
pub struct PushChannel {
    url: String,
    token: Option<Secret<String>>,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    bus: EventBus,
}

impl PushChannel {
    pub fn new(config: &AppConfig, bus: EventBus) -> Self {
        Self {
            url: config.upstream.events_url(),
            token: config.upstream.token.clone(),
            initial_backoff_ms: config.realtime.reconnect_initial_ms,
            max_backoff_ms: config.realtime.reconnect_max_ms,
            bus,
        }
    }

    /// 在后台任务中启动连接循环，返回连接状态
    pub fn start(
        self,
        dispatcher: DispatcherHandle,
        shutdown_rx: watch::Receiver<bool>,
    ) -> watch::Receiver<PushState> {
        let (state_tx, state_rx) = watch::channel(PushState::Disconnected);

        tokio::spawn(async move {
            self.connection_loop(dispatcher, shutdown_rx, state_tx).await;
        });

        state_rx
    }

    fn connect_url(&self) -> String {
        match &self.token {
            Some(token) => {
                let separator = if self.url.contains('?') { '&' } else { '?' };
                format!("{}{}token={}", self.url, separator, token.expose_secret())
            }
            None => self.url.clone(),
        }
    }

    /// 主连接循环（含重连）
    async fn connection_loop(
        &self,
        dispatcher: DispatcherHandle,
        mut shutdown_rx: watch::Receiver<bool>,
        state_tx: watch::Sender<PushState>,
    ) {
        let mut backoff_ms = self.initial_backoff_ms;

        loop {
            if *shutdown_rx.borrow() {
                tracing::info!("Push channel shutting down");
                return;
            }

            tracing::info!(url = %self.url, "Connecting to push channel");

            match self
                .try_connect(&dispatcher, &mut shutdown_rx, &state_tx, &mut backoff_ms)
                .await
            {
                Ok(()) => return,
                Err(e) => {
                    self.set_state(&state_tx, PushState::Disconnected);
                    metrics::counter!("push_reconnects_total").increment(1);
                    tracing::warn!(error = %e, backoff_ms, "Push channel disconnected, will retry");
                }
            }

            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return;
                    }
                }
                _ = tokio::time::sleep(Duration::from_millis(backoff_ms)) => {}
            }

            backoff_ms = next_backoff(backoff_ms, self.max_backoff_ms);
        }
    }

    async fn try_connect(
        &self,
        dispatcher: &DispatcherHandle,
        shutdown_rx: &mut watch::Receiver<bool>,
        state_tx: &watch::Sender<PushState>,
        backoff_ms: &mut u64,
    ) -> Result<(), String> {
        let (ws_stream, _response) = connect_async(self.connect_url())
            .await
            .map_err(|e| format!("WebSocket connection failed: {}", e))?;

        let (mut sender, mut receiver) = ws_stream.split();

        *backoff_ms = self.initial_backoff_ms;
        self.set_state(state_tx, PushState::Connected);
        tracing::info!("Push channel connected");

        // 断线期间可能丢失事件，重连后刷新一次
        dispatcher
            .request_refresh()
            .await
            .map_err(|e| format!("Dispatcher unavailable: {}", e))?;

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        let _ = sender.close().await;
                        self.set_state(state_tx, PushState::Disconnected);
                        return Ok(());
                    }
                }

                result = receiver.next() => {
                    match result {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<EventEnvelope>(&text) {
                                Ok(envelope) => {
                                    dispatcher
                                        .push(envelope)
                                        .await
                                        .map_err(|e| format!("Dispatcher unavailable: {}", e))?;
                                }
                                Err(e) => {
                                    metrics::counter!(
                                        "console_events_rejected_total",
                                        "reason" => "malformed_json"
                                    )
                                    .increment(1);
                                    tracing::warn!(error = %e, "Failed to parse push message");
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = sender.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Err("Connection closed by upstream".to_string());
                        }
                        Some(Err(e)) => {
                            return Err(format!("WebSocket error: {}", e));
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn set_state(&self, state_tx: &watch::Sender<PushState>, state: PushState) {
        let changed = state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });

        if changed {
            self.bus.publish(ConsoleEvent::PushChannel {
                connected: state == PushState::Connected,
            });
        }
    }
}

fn next_backoff(current_ms: u64, max_ms: u64) -> u64 {
    ((current_ms as f64) * BACKOFF_MULTIPLIER).min(max_ms as f64) as u64
}
