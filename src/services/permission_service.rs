//! 权限检查服务
//! 根据用户的角色（含嵌套角色）判断其在某个作用域上是否拥有指定权限级别

use std::collections::BTreeSet;

use crate::{
    config::AuthConfig,
    error::AppError,
    models::{Garden, PermissionLevel, Request, Role, ScopeDimension, ScopeQuery, System, User},
    services::role_service,
};

#[derive(Debug, Clone)]
pub struct PermissionService {
    auth_enabled: bool,
}

impl PermissionService {
    pub fn new(auth_enabled: bool) -> Self {
        Self { auth_enabled }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.enabled)
    }

    pub fn auth_enabled(&self) -> bool {
        self.auth_enabled
    }

    /// 能满足 `required` 的全部级别（高级别蕴含低级别）
    pub fn satisfying_levels(required: PermissionLevel) -> BTreeSet<PermissionLevel> {
        PermissionLevel::ALL
            .iter()
            .copied()
            .filter(|level| *level >= required)
            .collect()
    }

    /// 字符串形式的级别；无法识别时返回空集合
    pub fn satisfying_levels_for(required: &str) -> BTreeSet<PermissionLevel> {
        required
            .parse::<PermissionLevel>()
            .map(Self::satisfying_levels)
            .unwrap_or_default()
    }

    /// 检查用户是否拥有权限
    pub fn has_permission(
        &self,
        user: &User,
        required: PermissionLevel,
        scope: &ScopeQuery,
        global: bool,
    ) -> bool {
        self.check_levels(user, &Self::satisfying_levels(required), scope, global)
    }

    /// 同 `has_permission`，级别以字符串给出；未知级别一律拒绝
    pub fn has_permission_str(
        &self,
        user: &User,
        required: &str,
        scope: &ScopeQuery,
        global: bool,
    ) -> bool {
        self.check_levels(user, &Self::satisfying_levels_for(required), scope, global)
    }

    fn check_levels(
        &self,
        user: &User,
        levels: &BTreeSet<PermissionLevel>,
        scope: &ScopeQuery,
        global: bool,
    ) -> bool {
        if !self.auth_enabled {
            return true;
        }

        if levels.is_empty() {
            return false;
        }

        let roles = match role_service::flatten_roles(user.assigned_roles()) {
            Ok(roles) => roles,
            Err(e) => {
                tracing::warn!(
                    username = %user.username,
                    error = %e,
                    "Role data is inconsistent, denying permission"
                );
                return false;
            }
        };

        roles
            .into_iter()
            .any(|role| levels.contains(&role.permission) && Self::check_role(role, scope, global))
    }

    /// 检查角色的作用域是否覆盖查询
    ///
    /// 非全局模式下，空白名单匹配任意值；全局模式下，空白名单只在查询也未指定该维度时通过，
    /// 非空白名单则要求查询指定该维度。
    pub fn check_role(role: &Role, scope: &ScopeQuery, global: bool) -> bool {
        ScopeDimension::ALL.iter().all(|dimension| {
            dimension_allows(role.allow_list(*dimension), scope.get(*dimension), global)
        })
    }

    /// 花园级权限
    pub fn has_garden_permission(
        &self,
        user: &User,
        required: PermissionLevel,
        garden: &Garden,
    ) -> bool {
        self.has_permission(user, required, &ScopeQuery::garden(garden.name.as_str()), false)
    }

    /// 系统级权限
    pub fn has_system_permission(
        &self,
        user: &User,
        required: PermissionLevel,
        garden_name: &str,
        system: &System,
    ) -> bool {
        self.has_permission(user, required, &system_scope(garden_name, system), false)
    }

    /// 命令级权限
    pub fn has_command_permission(
        &self,
        user: &User,
        required: PermissionLevel,
        garden_name: &str,
        system: &System,
        command_name: &str,
    ) -> bool {
        let scope = system_scope(garden_name, system).with(ScopeDimension::Command, command_name);
        self.has_permission(user, required, &scope, false)
    }

    /// 请求级权限（请求本身不携带花园名）
    pub fn has_request_permission(
        &self,
        user: &User,
        required: PermissionLevel,
        request: &Request,
    ) -> bool {
        let mut scope = ScopeQuery::new();
        for (dimension, value) in [
            (ScopeDimension::Namespace, &request.namespace),
            (ScopeDimension::System, &request.system),
            (ScopeDimension::Version, &request.system_version),
            (ScopeDimension::Instance, &request.instance_name),
            (ScopeDimension::Command, &request.command),
        ] {
            if !value.is_empty() {
                scope = scope.with(dimension, value.as_str());
            }
        }
        self.has_permission(user, required, &scope, false)
    }

    /// 是否为全局花园管理员
    pub fn is_garden_admin(&self, user: &User) -> bool {
        self.has_permission(user, PermissionLevel::GardenAdmin, &ScopeQuery::new(), true)
    }

    /// 过滤出用户可见的花园
    pub fn filter_gardens<'a>(
        &self,
        user: &User,
        required: PermissionLevel,
        gardens: &'a [Garden],
    ) -> Vec<&'a Garden> {
        gardens
            .iter()
            .filter(|garden| self.has_garden_permission(user, required, garden))
            .collect()
    }

    /// 检查权限，如果无权限则返回错误
    pub fn require_permission(
        &self,
        user: &User,
        required: PermissionLevel,
        scope: &ScopeQuery,
        global: bool,
    ) -> Result<(), AppError> {
        if !self.has_permission(user, required, scope, global) {
            tracing::warn!(
                username = %user.username,
                required = %required,
                global,
                "Permission denied"
            );
            return Err(AppError::Forbidden);
        }

        Ok(())
    }
}

fn dimension_allows(allowed: &[String], requested: Option<&str>, global: bool) -> bool {
    match (allowed.is_empty(), requested) {
        (true, None) => true,
        (true, Some(_)) => !global,
        (false, Some(value)) => allowed.iter().any(|candidate| candidate == value),
        (false, None) => !global,
    }
}

fn system_scope(garden_name: &str, system: &System) -> ScopeQuery {
    ScopeQuery::garden(garden_name)
        .with(ScopeDimension::Namespace, system.namespace.as_str())
        .with(ScopeDimension::System, system.name.as_str())
        .with(ScopeDimension::Version, system.version.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_satisfying_levels() {
        let levels = PermissionService::satisfying_levels(PermissionLevel::Operator);
        assert!(!levels.contains(&PermissionLevel::ReadOnly));
        assert!(levels.contains(&PermissionLevel::Operator));
        assert!(levels.contains(&PermissionLevel::GardenAdmin));
        assert_eq!(PermissionService::satisfying_levels(PermissionLevel::ReadOnly).len(), 4);
    }

    #[test]
    fn test_unknown_level_satisfies_nothing() {
        assert!(PermissionService::satisfying_levels_for("ROOT").is_empty());
        assert_eq!(PermissionService::satisfying_levels_for("PLUGIN_ADMIN").len(), 2);
    }

    #[test]
    fn test_dimension_allows_matrix() {
        let scoped = vec!["g1".to_string()];
        assert!(dimension_allows(&[], None, false));
        assert!(dimension_allows(&[], Some("g1"), false));
        assert!(dimension_allows(&[], None, true));
        assert!(!dimension_allows(&[], Some("g1"), true));
        assert!(dimension_allows(&scoped, Some("g1"), false));
        assert!(dimension_allows(&scoped, Some("g1"), true));
        assert!(!dimension_allows(&scoped, Some("g2"), false));
        assert!(dimension_allows(&scoped, None, false));
        assert!(!dimension_allows(&scoped, None, true));
    }
}
