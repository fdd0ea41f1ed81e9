//! 权限服务集成测试
//!
//! 测试权限级别展开、作用域匹配和全局模式

use garden_console::{
    models::{
        ConnectionType, Garden, PermissionLevel, Request, Role, ScopeDimension, ScopeQuery, System,
    },
    services::PermissionService,
};

mod common;
use common::{enabled_service, role, user_with_roles};

fn sample_scopes() -> Vec<ScopeQuery> {
    vec![
        ScopeQuery::new(),
        ScopeQuery::garden("g1"),
        ScopeQuery::garden("g2").with(ScopeDimension::Namespace, "ns1"),
        ScopeQuery::garden("g1")
            .with(ScopeDimension::Namespace, "ns1")
            .with(ScopeDimension::System, "echo")
            .with(ScopeDimension::Version, "1.0")
            .with(ScopeDimension::Instance, "default")
            .with(ScopeDimension::Command, "say"),
    ]
}

/// 高级别蕴含低级别
#[test]
fn test_permission_monotonicity() {
    let service = enabled_service();
    let users = vec![
        user_with_roles(vec![role("op", PermissionLevel::Operator)], vec![]),
        user_with_roles(
            vec![],
            vec![role("scoped", PermissionLevel::GardenAdmin)
                .scoped(ScopeDimension::Garden, ["g1"])],
        ),
        user_with_roles(vec![role("viewer", PermissionLevel::ReadOnly)], vec![]),
    ];

    for user in &users {
        for scope in sample_scopes() {
            for global in [false, true] {
                if service.has_permission(user, PermissionLevel::Operator, &scope, global) {
                    assert!(service.has_permission(
                        user,
                        PermissionLevel::ReadOnly,
                        &scope,
                        global
                    ));
                }
            }
        }
    }

    let viewer = &users[2];
    assert!(!service.has_permission(viewer, PermissionLevel::Operator, &ScopeQuery::new(), false));
    assert!(service.has_permission(viewer, PermissionLevel::ReadOnly, &ScopeQuery::new(), false));
}

/// 无作用域角色匹配任意非全局查询
#[test]
fn test_unscoped_role_is_universal() {
    let unscoped = role("anything", PermissionLevel::ReadOnly);
    for scope in sample_scopes() {
        assert!(PermissionService::check_role(&unscoped, &scope, false));
    }
}

/// 全局模式严格：限定了花园的角色不能满足未指定花园的全局查询
#[test]
fn test_global_strictness() {
    let scoped =
        role("g1-admin", PermissionLevel::GardenAdmin).scoped(ScopeDimension::Garden, ["g1"]);
    let scope = ScopeQuery::new();

    assert!(PermissionService::check_role(&scoped, &scope, false));
    assert!(!PermissionService::check_role(&scoped, &scope, true));

    // 全局模式下，无作用域角色不能满足指定了维度的查询
    let unscoped = role("admin", PermissionLevel::GardenAdmin);
    assert!(PermissionService::check_role(&unscoped, &ScopeQuery::new(), true));
    assert!(!PermissionService::check_role(&unscoped, &ScopeQuery::garden("g1"), true));
}

#[test]
fn test_scenario_namespace_unscoped_garden_matches() {
    let operator = role("ops", PermissionLevel::Operator).scoped(ScopeDimension::Garden, ["g1"]);
    let scope = ScopeQuery::garden("g1").with(ScopeDimension::Namespace, "ns1");
    assert!(PermissionService::check_role(&operator, &scope, false));
}

#[test]
fn test_scenario_garden_not_in_allow_list() {
    let operator = role("ops", PermissionLevel::Operator).scoped(ScopeDimension::Garden, ["g1"]);
    assert!(!PermissionService::check_role(&operator, &ScopeQuery::garden("g2"), false));
}

/// 未知权限级别一律拒绝
#[test]
fn test_unknown_level_fails_closed() {
    let service = enabled_service();
    let user = user_with_roles(vec![role("admin", PermissionLevel::GardenAdmin)], vec![]);

    assert!(!service.has_permission_str(&user, "SUPERUSER", &ScopeQuery::new(), false));
    assert!(service.has_permission_str(&user, "operator", &ScopeQuery::new(), false));
}

#[test]
fn test_auth_disabled_short_circuits() {
    let service = PermissionService::new(false);
    let nobody = user_with_roles(vec![], vec![]);

    assert!(service.has_permission(
        &nobody,
        PermissionLevel::GardenAdmin,
        &ScopeQuery::new(),
        true
    ));
    assert!(service.has_permission_str(&nobody, "SUPERUSER", &ScopeQuery::new(), false));
}

#[test]
fn test_user_without_roles_denied() {
    let service = enabled_service();
    let nobody = user_with_roles(vec![], vec![]);
    assert!(!service.has_permission(&nobody, PermissionLevel::ReadOnly, &ScopeQuery::new(), false));
}

#[test]
fn test_remote_roles_are_checked() {
    let service = enabled_service();
    let user = user_with_roles(
        vec![role("local-viewer", PermissionLevel::ReadOnly)],
        vec![role("remote-op", PermissionLevel::Operator)
            .scoped(ScopeDimension::Garden, ["remote"])],
    );

    assert!(service.has_permission(
        &user,
        PermissionLevel::Operator,
        &ScopeQuery::garden("remote"),
        false
    ));
    assert!(!service.has_permission(
        &user,
        PermissionLevel::Operator,
        &ScopeQuery::garden("local"),
        false
    ));
}

/// 嵌套角色继承权限
#[test]
fn test_nested_role_grants_permission() {
    let service = enabled_service();
    let mut wrapper = role("team", PermissionLevel::ReadOnly);
    wrapper.roles.push(role("inner-admin", PermissionLevel::PluginAdmin));
    let user = user_with_roles(vec![wrapper], vec![]);

    assert!(service.has_permission(&user, PermissionLevel::PluginAdmin, &ScopeQuery::new(), false));
}

/// 循环嵌套的角色数据拒绝所有权限
#[test]
fn test_cyclic_roles_fail_closed() {
    let service = enabled_service();
    let mut looped = role("loop", PermissionLevel::GardenAdmin);
    looped.roles.push(role("loop", PermissionLevel::GardenAdmin));
    let user = user_with_roles(vec![looped], vec![]);

    assert!(!service.has_permission(&user, PermissionLevel::ReadOnly, &ScopeQuery::new(), false));
}

#[test]
fn test_model_scoped_helpers() {
    let service = enabled_service();
    let user = user_with_roles(
        vec![role("echo-op", PermissionLevel::Operator)
            .scoped(ScopeDimension::Garden, ["local"])
            .scoped(ScopeDimension::System, ["echo"])
            .scoped(ScopeDimension::Command, ["say"])],
        vec![],
    );

    let echo = System::new("default", "echo", "3.0.0");
    let deploy = System::new("ops", "deploy", "1.2.0");
    let local = Garden::new("local", ConnectionType::Local);
    let remote = Garden::new("remote", ConnectionType::Http);

    assert!(service.has_garden_permission(&user, PermissionLevel::Operator, &local));
    assert!(!service.has_garden_permission(&user, PermissionLevel::Operator, &remote));
    assert!(service.has_system_permission(&user, PermissionLevel::Operator, "local", &echo));
    assert!(!service.has_system_permission(&user, PermissionLevel::Operator, "local", &deploy));
    assert!(service.has_command_permission(
        &user,
        PermissionLevel::Operator,
        "local",
        &echo,
        "say"
    ));
    assert!(!service.has_command_permission(
        &user,
        PermissionLevel::Operator,
        "local",
        &echo,
        "shout"
    ));

    let mut request = Request::new("r1");
    request.system = "echo".to_string();
    request.command = "say".to_string();
    assert!(service.has_request_permission(&user, PermissionLevel::Operator, &request));

    let gardens = vec![local, remote];
    let visible = service.filter_gardens(&user, PermissionLevel::ReadOnly, &gardens);
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].name, "local");
}

#[test]
fn test_garden_admin_requires_global_grant() {
    let service = enabled_service();
    let scoped = user_with_roles(
        vec![role("g1-admin", PermissionLevel::GardenAdmin).scoped(ScopeDimension::Garden, ["g1"])],
        vec![],
    );
    let global = user_with_roles(vec![role("admin", PermissionLevel::GardenAdmin)], vec![]);

    assert!(!service.is_garden_admin(&scoped));
    assert!(service.is_garden_admin(&global));
}

#[test]
fn test_require_permission_returns_forbidden() {
    let service = enabled_service();
    let user = user_with_roles(vec![role("viewer", PermissionLevel::ReadOnly)], vec![]);

    let result =
        service.require_permission(&user, PermissionLevel::Operator, &ScopeQuery::new(), false);
    assert!(matches!(result, Err(garden_console::error::AppError::Forbidden)));
    assert!(service
        .require_permission(&user, PermissionLevel::ReadOnly, &ScopeQuery::new(), false)
        .is_ok());
}

#[test]
fn test_role_json_round_trip_through_check() {
    let role: Role = serde_json::from_str(
        r#"{
            "name": "ops",
            "permission": "OPERATOR",
            "scope_gardens": ["g1"],
            "scope_namespaces": []
        }"#,
    )
    .unwrap();
    assert!(PermissionService::check_role(
        &role,
        &ScopeQuery::garden("g1").with(ScopeDimension::Namespace, "ns1"),
        false
    ));
}
