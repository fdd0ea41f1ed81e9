//! Console core services layer

pub mod garden_reconciler;
pub mod permission_service;
pub mod request_reconciler;
pub mod role_service;
pub mod scope_tree;

pub use garden_reconciler::{
    remove_garden, upsert_garden, GardenState, RefreshOutcome, RefreshTicket,
};
pub use permission_service::PermissionService;
pub use request_reconciler::{apply_request_event, RequestIndex, RequestView, RequestViews};
pub use role_service::{coalesce_permissions, CoalescedPermissions, RoleError};
pub use scope_tree::{ScopeTree, ScopeTreeError};
