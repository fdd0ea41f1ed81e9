//! 角色聚合服务
//! 展开嵌套角色（角色的角色），汇总用户的有效角色名与权限字符串

use serde::Serialize;
use std::collections::BTreeSet;
use validator::Validate;

use crate::models::{Garden, Role, ScopeDimension, ScopeQuery};
use crate::services::scope_tree::{ScopeTree, ScopeTreeError};

/// 角色数据完整性错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoleError {
    #[error("role `{0}` is nested inside itself")]
    Cycle(String),
}

/// 汇总结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoalescedPermissions {
    pub roles: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
}

/// 按先序展开角色及其嵌套角色
///
/// 同一角色名在祖先路径上再次出现视为循环。
pub fn flatten_roles<'a, I>(roles: I) -> Result<Vec<&'a Role>, RoleError>
where
    I: IntoIterator<Item = &'a Role>,
{
    let mut flattened = Vec::new();
    let mut path = Vec::new();
    for role in roles {
        walk(role, &mut path, &mut flattened)?;
    }
    Ok(flattened)
}

fn walk<'a>(
    role: &'a Role,
    path: &mut Vec<&'a str>,
    out: &mut Vec<&'a Role>,
) -> Result<(), RoleError> {
    if path.contains(&role.name.as_str()) {
        return Err(RoleError::Cycle(role.name.clone()));
    }

    out.push(role);
    path.push(role.name.as_str());
    for nested in &role.roles {
        walk(nested, path, out)?;
    }
    path.pop();

    Ok(())
}

/// 汇总角色名与权限字符串
///
/// 每个角色贡献其显式 `permissions` 以及自身权限级别名称。
pub fn coalesce_permissions<'a, I>(roles: I) -> Result<CoalescedPermissions, RoleError>
where
    I: IntoIterator<Item = &'a Role>,
{
    let mut coalesced = CoalescedPermissions::default();

    for role in flatten_roles(roles)? {
        coalesced.roles.insert(role.name.clone());
        coalesced
            .permissions
            .insert(role.permission.as_str().to_string());
        coalesced
            .permissions
            .extend(role.permissions.iter().cloned());
    }

    Ok(coalesced)
}

/// 作用域中不存在于花园树的条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownScope {
    pub dimension: ScopeDimension,
    pub value: String,
}

/// 角色校验报告
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub unknown_scopes: Vec<UnknownScope>,
}

/// 校验角色定义：字段规则、嵌套循环，以及（提供花园树时）作用域条目是否存在
pub fn validate_role(
    role: &Role,
    tree: Option<&Garden>,
) -> Result<RoleValidationReport, ScopeTreeError> {
    let mut report = RoleValidationReport::default();

    if let Err(errors) = role.validate() {
        report.errors.push(errors.to_string());
    }

    if let Err(error) = flatten_roles(std::iter::once(role)) {
        report.errors.push(error.to_string());
    }

    if let Some(root) = tree {
        let tree = ScopeTree::new(root);
        for dimension in ScopeDimension::ALL {
            for value in role.allow_list(dimension) {
                let query = ScopeQuery::new().with(dimension, value.as_str());
                if !tree.contains(&query)? {
                    report.unknown_scopes.push(UnknownScope {
                        dimension,
                        value: value.clone(),
                    });
                }
            }
        }
    }

    report.valid = report.errors.is_empty() && report.unknown_scopes.is_empty();
    Ok(report)
}
