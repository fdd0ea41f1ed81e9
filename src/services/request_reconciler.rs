//! 请求事件合并
//! 维护某个父请求的子请求视图，以及最新顶层请求索引

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::models::{Request, RequestEvent};

/// 聚焦于单个请求的父/子视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestView {
    pub focus_id: String,
    /// 聚焦请求本身；尚未拿到时为 `None`
    pub request: Option<Request>,
    pub children: Vec<Request>,
}

impl RequestView {
    pub fn new(focus_id: impl Into<String>) -> Self {
        Self {
            focus_id: focus_id.into(),
            request: None,
            children: Vec::new(),
        }
    }

    /// 从 REST 返回的请求建立视图
    pub fn seeded(mut request: Request) -> Self {
        let children = request.children.take().unwrap_or_default();
        Self {
            focus_id: request.id.clone(),
            request: Some(request),
            children,
        }
    }

    /// 应用生命周期事件；与本视图无关时返回 false
    pub fn apply(&mut self, event: &RequestEvent) -> bool {
        let payload = &event.request;

        if payload.id == self.focus_id {
            self.replace_focus(payload.clone());
            return true;
        }

        if let Some(known) = self.children.iter_mut().find(|child| child.id == payload.id) {
            known.apply_lifecycle(payload);
            return true;
        }

        if payload.parent_id() == Some(self.focus_id.as_str()) {
            if !event.is_creation() {
                tracing::debug!(
                    request_id = %payload.id,
                    parent_id = %self.focus_id,
                    "Creation event missed, appending child from update"
                );
            }
            self.children.push(payload.clone());
            return true;
        }

        false
    }

    /// 合并同一请求的另一份视图（通常是较晚到达的 REST 结果）
    ///
    /// 已知子请求保留；对方独有的子请求追加。
    fn merge(&mut self, other: RequestView) {
        if let Some(request) = other.request {
            self.replace_focus(request);
        }
        for child in other.children {
            if !self.children.iter().any(|known| known.id == child.id) {
                self.children.push(child);
            }
        }
    }

    fn replace_focus(&mut self, mut request: Request) {
        if let Some(children) = request.children.take().filter(|c| !c.is_empty()) {
            self.children = children;
        }
        self.request = Some(request);
    }
}

/// 纯函数形式的请求事件应用
pub fn apply_request_event(mut state: RequestView, event: &RequestEvent) -> RequestView {
    state.apply(event);
    state
}

/// 当前被跟踪的请求视图，超出容量时淘汰最早跟踪的
#[derive(Debug, Clone)]
pub struct RequestViews {
    capacity: usize,
    views: HashMap<String, RequestView>,
    order: VecDeque<String>,
}

impl RequestViews {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            views: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// 开始跟踪；已跟踪时只合并聚焦请求，保留事件已经应用的子请求
    pub fn track(&mut self, view: RequestView) {
        if let Some(known) = self.views.get_mut(&view.focus_id) {
            tracing::debug!(request_id = %view.focus_id, "Request view already tracked, merging");
            known.merge(view);
            return;
        }

        let id = view.focus_id.clone();
        self.views.insert(id.clone(), view);
        self.order.push_back(id);

        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                tracing::debug!(request_id = %evicted, "Evicting tracked request view");
                self.views.remove(&evicted);
            }
        }
    }

    pub fn untrack(&mut self, focus_id: &str) -> bool {
        self.order.retain(|id| id != focus_id);
        self.views.remove(focus_id).is_some()
    }

    pub fn get(&self, focus_id: &str) -> Option<&RequestView> {
        self.views.get(focus_id)
    }

    pub fn contains(&self, focus_id: &str) -> bool {
        self.views.contains_key(focus_id)
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// 把事件应用到所有视图，返回受影响视图的 id
    pub fn apply(&mut self, event: &RequestEvent) -> Vec<String> {
        self.views
            .values_mut()
            .filter_map(|view| view.apply(event).then(|| view.focus_id.clone()))
            .collect()
    }
}

/// 最新顶层请求列表（新的在前），容量固定
#[derive(Debug, Clone)]
pub struct RequestIndex {
    capacity: usize,
    entries: VecDeque<Request>,
}

impl RequestIndex {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Request> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 子请求不进入索引
    pub fn apply(&mut self, event: &RequestEvent) -> bool {
        let payload = &event.request;
        if payload.parent.is_some() {
            return false;
        }

        if let Some(known) = self.entries.iter_mut().find(|entry| entry.id == payload.id) {
            known.apply_lifecycle(payload);
            return true;
        }

        let mut entry = payload.clone();
        entry.children = None;
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
        true
    }
}
