//! 花园/系统事件合并
//! 把推送通道的乱序 upsert/remove 事件合并到扁平花园列表，并与周期性全量刷新保持一致

use std::collections::HashSet;

use serde::Serialize;

use crate::models::{Event, Garden, Instance, System};
use crate::services::scope_tree::{assemble_tree, ScopeTreeError};

/// 一次全量刷新的凭据，由 [`GardenState::begin_refresh`] 发放
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RefreshTicket(u64);

impl RefreshTicket {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// 全量刷新结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// 快照已生效，并重放了刷新期间到达的事件
    Applied { replayed: usize },
    /// 比最近一次完成的刷新更旧，已丢弃
    Stale,
}

#[derive(Debug, Clone)]
struct JournalEntry {
    /// 事件到达时最新发放的凭据
    issued: u64,
    event: Event,
}

/// 已知花园的扁平列表；`parent` 链接构成树
#[derive(Debug, Clone, Default)]
pub struct GardenState {
    data: Vec<Garden>,
    next_ticket: u64,
    last_completed: u64,
    outstanding: Vec<u64>,
    journal: Vec<JournalEntry>,
}

impl GardenState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_gardens(gardens: Vec<Garden>) -> Self {
        let mut state = Self::new();
        state.replace(gardens);
        state
    }

    pub fn gardens(&self) -> &[Garden] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&Garden> {
        self.data.iter().find(|garden| garden.name == name)
    }

    /// 第一个 LOCAL 花园，即隐式根
    pub fn local_garden(&self) -> Option<&Garden> {
        self.data.iter().find(|garden| garden.is_local())
    }

    /// 以本地花园为根组装嵌套树；尚无本地花园时返回 `None`
    pub fn tree(&self) -> Result<Option<Garden>, ScopeTreeError> {
        match self.local_garden() {
            Some(local) => assemble_tree(&self.data, &local.name).map(Some),
            None => Ok(None),
        }
    }

    /// 合并单个花园（及其携带的子花园）
    pub fn upsert(&mut self, garden: Garden) {
        let incoming_local = garden.is_local();
        let incoming_name = garden.name.clone();
        let mut children = garden.children.clone();

        // 按 id 匹配时保留已知名称，后续的父节点链接以它为准
        let name = match self.data.iter_mut().find(|known| known.same_identity(&garden)) {
            Some(known) => {
                merge_into(known, garden);
                known.name.clone()
            }
            None => {
                self.data.push(garden);
                incoming_name.clone()
            }
        };

        if incoming_local {
            self.adopt_orphans(&name);
        } else {
            self.attach_default_parent(&name);
        }

        for child in children.iter_mut() {
            if child.parent.is_none() || child.parent.as_deref() == Some(incoming_name.as_str()) {
                child.parent = Some(name.clone());
                child.has_parent = true;
            }
        }
        for child in children {
            self.upsert(child);
        }
    }

    /// 移除花园：先子后父，再级联清理 `parent` 指向它的条目
    pub fn remove(&mut self, garden: &Garden) {
        let mut visited = HashSet::new();
        self.remove_inner(garden, &mut visited);
    }

    fn remove_inner(&mut self, garden: &Garden, visited: &mut HashSet<String>) {
        // 按 id 匹配时以已知名称查找孤儿
        let name = self
            .data
            .iter()
            .find(|known| known.same_identity(garden))
            .map_or_else(|| garden.name.clone(), |known| known.name.clone());

        if !visited.insert(name.clone()) {
            tracing::warn!(garden = %name, "Garden already removed in this pass, skipping");
            return;
        }

        for child in &garden.children {
            self.remove_inner(child, visited);
        }

        self.data.retain(|known| !known.same_identity(garden));
        for known in self.data.iter_mut() {
            strip_child(known, garden);
        }

        let orphans: Vec<Garden> = self
            .data
            .iter()
            .filter(|known| known.parent.as_deref() == Some(name.as_str()))
            .cloned()
            .collect();
        for orphan in orphans {
            tracing::debug!(
                garden = %orphan.name,
                parent = %name,
                "Removing orphaned garden"
            );
            self.remove_inner(&orphan, visited);
        }
    }

    /// 全量替换，快照同样经过 upsert 规范化
    pub fn replace(&mut self, snapshot: Vec<Garden>) {
        self.data.clear();
        for garden in snapshot {
            self.upsert(garden);
        }
    }

    /// 合并系统（按 namespace/name/version 匹配）；花园未知时返回 false
    pub fn upsert_system(&mut self, garden_name: &str, system: System) -> bool {
        let Some(garden) = self.find_mut(garden_name) else {
            return false;
        };

        match garden
            .systems
            .iter_mut()
            .find(|known| known.same_identity(&system))
        {
            Some(known) => *known = system,
            None => garden.systems.push(system),
        }
        true
    }

    pub fn remove_system(&mut self, garden_name: &str, system: &System) -> bool {
        let Some(garden) = self.find_mut(garden_name) else {
            return false;
        };

        let before = garden.systems.len();
        garden.systems.retain(|known| !known.same_identity(system));
        garden.systems.len() != before
    }

    /// 更新实例状态（按 id，否则按名称）
    pub fn update_instance(&mut self, garden_name: &str, instance: &Instance) -> bool {
        let Some(garden) = self.find_mut(garden_name) else {
            return false;
        };

        let mut updated = false;
        for known in garden
            .systems
            .iter_mut()
            .flat_map(|system| system.instances.iter_mut())
            .filter(|known| known.same_identity(instance))
        {
            known.status = instance.status.clone();
            updated = true;
        }
        updated
    }

    /// 应用已校验的事件；与花园无关的事件返回 false
    pub fn apply(&mut self, event: &Event) -> bool {
        let applied = self.apply_unjournaled(event);
        if applied && !self.outstanding.is_empty() {
            self.journal.push(JournalEntry {
                issued: self.next_ticket,
                event: event.clone(),
            });
        }
        applied
    }

    fn apply_unjournaled(&mut self, event: &Event) -> bool {
        match event {
            Event::GardenUpserted(garden) => {
                self.upsert(garden.clone());
                true
            }
            Event::GardenRemoved(garden) => {
                self.remove(garden);
                true
            }
            Event::SystemUpserted { garden, system } => {
                self.upsert_system(garden, system.clone())
            }
            Event::SystemRemoved { garden, system } => self.remove_system(garden, system),
            Event::InstanceUpdated { garden, instance } => self.update_instance(garden, instance),
            Event::Request(_) | Event::Ignored(_) => false,
        }
    }

    /// 发起全量刷新
    pub fn begin_refresh(&mut self) -> RefreshTicket {
        self.next_ticket += 1;
        self.outstanding.push(self.next_ticket);
        RefreshTicket(self.next_ticket)
    }

    /// 刷新结果到达
    ///
    /// 凭据不晚于上一次完成的刷新时丢弃快照；否则替换列表并重放凭据发放之后到达的事件。
    pub fn complete_refresh(
        &mut self,
        ticket: RefreshTicket,
        snapshot: Vec<Garden>,
    ) -> RefreshOutcome {
        self.outstanding.retain(|id| *id != ticket.0);

        if ticket.0 <= self.last_completed {
            self.prune_journal();
            return RefreshOutcome::Stale;
        }

        self.replace(snapshot);
        let replay: Vec<Event> = self
            .journal
            .iter()
            .filter(|entry| entry.issued >= ticket.0)
            .map(|entry| entry.event.clone())
            .collect();
        for event in &replay {
            self.apply_unjournaled(event);
        }

        self.last_completed = ticket.0;
        self.outstanding.retain(|id| *id > ticket.0);
        self.prune_journal();

        RefreshOutcome::Applied {
            replayed: replay.len(),
        }
    }

    /// 刷新失败，不再等待该凭据
    pub fn abandon_refresh(&mut self, ticket: RefreshTicket) {
        self.outstanding.retain(|id| *id != ticket.0);
        self.prune_journal();
    }

    pub fn refresh_pending(&self) -> bool {
        !self.outstanding.is_empty()
    }

    fn prune_journal(&mut self) {
        match self.outstanding.iter().min().copied() {
            Some(oldest) => self.journal.retain(|entry| entry.issued >= oldest),
            None => self.journal.clear(),
        }
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Garden> {
        self.data.iter_mut().find(|garden| garden.name == name)
    }

    fn attach_default_parent(&mut self, name: &str) {
        let Some(local_name) = self.local_garden().map(|local| local.name.clone()) else {
            return;
        };

        if let Some(garden) = self
            .data
            .iter_mut()
            .find(|garden| garden.name == name && !garden.is_local() && garden.parent.is_none())
        {
            tracing::debug!(
                garden = %garden.name,
                parent = %local_name,
                "Attaching garden under local garden"
            );
            garden.parent = Some(local_name);
            garden.has_parent = true;
        }
    }

    fn adopt_orphans(&mut self, local_name: &str) {
        for garden in self
            .data
            .iter_mut()
            .filter(|garden| !garden.is_local() && garden.parent.is_none())
        {
            garden.parent = Some(local_name.to_string());
            garden.has_parent = true;
        }
    }
}

/// 只覆盖固定的最小字段集；`children` 仅在新数据非空或原数据为空时覆盖
fn merge_into(known: &mut Garden, incoming: Garden) {
    known.status = incoming.status;
    known.receiving_connections = incoming.receiving_connections;
    known.publishing_connections = incoming.publishing_connections;
    known.metadata = incoming.metadata;

    if !incoming.children.is_empty() || known.children.is_empty() {
        known.children = incoming.children;
    }

    if known.parent.is_none() && incoming.parent.is_some() {
        known.parent = incoming.parent;
        known.has_parent = true;
    }
}

fn strip_child(garden: &mut Garden, removed: &Garden) {
    garden.children.retain(|child| !child.same_identity(removed));
    for child in garden.children.iter_mut() {
        strip_child(child, removed);
    }
}

/// 纯函数形式的 upsert
pub fn upsert_garden(mut state: GardenState, garden: Garden) -> GardenState {
    state.upsert(garden);
    state
}

/// 纯函数形式的 remove
pub fn remove_garden(mut state: GardenState, garden: &Garden) -> GardenState {
    state.remove(garden);
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConnectionType, GardenStatus};

    fn names(state: &GardenState) -> Vec<&str> {
        state.gardens().iter().map(|g| g.name.as_str()).collect()
    }

    #[test]
    fn test_upsert_appends_then_merges() {
        let mut state = GardenState::new();
        state.upsert(Garden::new("local", ConnectionType::Local));
        state.upsert(
            Garden::new("remote", ConnectionType::Http)
                .with_system(System::new("ns", "echo", "1.0")),
        );

        let mut update = Garden::new("remote", ConnectionType::Http);
        update.status = GardenStatus::Stopped;
        state.upsert(update);

        let remote = state.find("remote").unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(remote.status, GardenStatus::Stopped);
        // systems 不在合并字段集中
        assert_eq!(remote.systems.len(), 1);
    }

    #[test]
    fn test_payload_children_are_flattened() {
        let mut state = GardenState::new();
        let payload = Garden::new("local", ConnectionType::Local)
            .with_child(Garden::new("a", ConnectionType::Http));
        state.upsert(payload);

        assert_eq!(names(&state), vec!["local", "a"]);
        assert_eq!(state.find("a").unwrap().parent.as_deref(), Some("local"));
    }

    #[test]
    fn test_local_garden_adopts_earlier_orphans() {
        let mut state = GardenState::new();
        state.upsert(Garden::new("remote", ConnectionType::Stomp));
        assert!(state.find("remote").unwrap().parent.is_none());

        state.upsert(Garden::new("local", ConnectionType::Local));
        let remote = state.find("remote").unwrap();
        assert_eq!(remote.parent.as_deref(), Some("local"));
        assert!(remote.has_parent);
    }

    #[test]
    fn test_system_and_instance_events() {
        let mut state = GardenState::new();
        state.upsert(
            Garden::new("local", ConnectionType::Local)
                .with_system(System::new("ns", "echo", "1.0").with_instance("default")),
        );

        let mut stopped = Instance::new("default");
        stopped.status = "STOPPED".to_string();
        assert!(state.update_instance("local", &stopped));
        assert_eq!(
            state.find("local").unwrap().systems[0].instances[0].status,
            "STOPPED"
        );

        assert!(state.upsert_system("local", System::new("ns", "echo", "2.0")));
        assert_eq!(state.find("local").unwrap().systems.len(), 2);
        assert!(state.remove_system("local", &System::new("ns", "echo", "1.0")));
        assert!(!state.upsert_system("missing", System::new("ns", "echo", "1.0")));
    }

    #[test]
    fn test_tree_assembled_from_parent_links() {
        let mut state = GardenState::new();
        assert_eq!(state.tree().unwrap(), None);

        state.upsert(Garden::new("local", ConnectionType::Local));
        state.upsert(Garden::new("a", ConnectionType::Http));
        state.upsert(Garden::new("b", ConnectionType::Http).with_parent("a"));

        let tree = state.tree().unwrap().unwrap();
        assert_eq!(tree.children[0].name, "a");
        assert_eq!(tree.children[0].children[0].name, "b");
    }

    #[test]
    fn test_pure_wrappers() {
        let state = upsert_garden(GardenState::new(), Garden::new("local", ConnectionType::Local));
        let state = upsert_garden(state, Garden::new("r", ConnectionType::Http));
        let state = remove_garden(state, &Garden::new("r", ConnectionType::Http));
        assert_eq!(names(&state), vec!["local"]);
    }
}
