//! 作用域树读取
//! 在花园树（garden → children → systems → instances/commands）上做只读的深度优先查找

use std::collections::HashSet;

use crate::models::{Garden, ScopeQuery, System};

/// 树结构数据完整性错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeTreeError {
    #[error("garden `{0}` is reachable more than once in the garden tree")]
    Cycle(String),

    #[error("root garden `{0}` not found")]
    MissingRoot(String),
}

/// 花园树的只读视图
pub struct ScopeTree<'a> {
    root: &'a Garden,
}

impl<'a> ScopeTree<'a> {
    pub fn new(root: &'a Garden) -> Self {
        Self { root }
    }

    /// 树中是否至少存在一个匹配查询前缀的 (system, instance, command) 组合
    ///
    /// 只指定花园名的查询匹配花园本身。
    pub fn contains(&self, query: &ScopeQuery) -> Result<bool, ScopeTreeError> {
        let mut visited = HashSet::new();
        let mut found = false;
        walk(self.root, &mut visited, &mut |garden| {
            found = garden_matches(garden, query);
            found
        })?;
        Ok(found)
    }

    /// 按名称查找花园
    pub fn find_garden(&self, name: &str) -> Result<Option<&'a Garden>, ScopeTreeError> {
        let mut visited = HashSet::new();
        let mut found = None;
        walk(self.root, &mut visited, &mut |garden| {
            if garden.name == name {
                found = Some(garden);
            }
            found.is_some()
        })?;
        Ok(found)
    }

    /// 深度优先顺序的全部花园名
    pub fn garden_names(&self) -> Result<Vec<&'a str>, ScopeTreeError> {
        let mut visited = HashSet::new();
        let mut names = Vec::new();
        walk(self.root, &mut visited, &mut |garden| {
            names.push(garden.name.as_str());
            false
        })?;
        Ok(names)
    }
}

/// 深度优先遍历；`visit` 返回 true 时提前结束
fn walk<'a, F>(
    garden: &'a Garden,
    visited: &mut HashSet<&'a str>,
    visit: &mut F,
) -> Result<bool, ScopeTreeError>
where
    F: FnMut(&'a Garden) -> bool,
{
    if !visited.insert(garden.name.as_str()) {
        return Err(ScopeTreeError::Cycle(garden.name.clone()));
    }

    if visit(garden) {
        return Ok(true);
    }

    for child in &garden.children {
        if walk(child, visited, visit)? {
            return Ok(true);
        }
    }

    Ok(false)
}

fn garden_matches(garden: &Garden, query: &ScopeQuery) -> bool {
    if let Some(name) = &query.garden_name {
        if name != &garden.name {
            return false;
        }
    }

    if query.is_garden_only() {
        return true;
    }

    garden
        .systems
        .iter()
        .any(|system| system_matches(system, query))
}

fn system_matches(system: &System, query: &ScopeQuery) -> bool {
    let field_ok = |wanted: &Option<String>, actual: &str| {
        wanted.as_deref().map_or(true, |wanted| wanted == actual)
    };

    if !field_ok(&query.namespace, &system.namespace)
        || !field_ok(&query.system_name, &system.name)
        || !field_ok(&query.system_version, &system.version)
    {
        return false;
    }

    let instance_ok = query.instance_name.as_deref().map_or(true, |wanted| {
        system.instances.iter().any(|instance| instance.name == wanted)
    });
    let command_ok = query.command_name.as_deref().map_or(true, |wanted| {
        system.commands.iter().any(|command| command.name == wanted)
    });

    instance_ok && command_ok
}

/// 根据 `parent` 链接把扁平花园列表重建为以 `root_name` 为根的嵌套树
///
/// 扁平列表是拓扑的唯一来源，输入中内嵌的 `children` 会被替换。
pub fn assemble_tree(flat: &[Garden], root_name: &str) -> Result<Garden, ScopeTreeError> {
    let root = flat
        .iter()
        .find(|garden| garden.name == root_name)
        .ok_or_else(|| ScopeTreeError::MissingRoot(root_name.to_string()))?;

    let mut visited = HashSet::new();
    assemble_node(flat, root, &mut visited)
}

fn assemble_node<'a>(
    flat: &'a [Garden],
    node: &'a Garden,
    visited: &mut HashSet<&'a str>,
) -> Result<Garden, ScopeTreeError> {
    if !visited.insert(node.name.as_str()) {
        return Err(ScopeTreeError::Cycle(node.name.clone()));
    }

    let mut assembled = node.clone();
    assembled.children = flat
        .iter()
        .filter(|garden| garden.parent.as_deref() == Some(node.name.as_str()))
        .map(|child| assemble_node(flat, child, visited))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(assembled)
}
