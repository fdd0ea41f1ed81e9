//! 数据模型模块
//! 与上游 REST/推送通道 JSON 结构一一对应

pub mod event;
pub mod garden;
pub mod request;
pub mod role;
pub mod scope;
pub mod user;

pub use event::{Event, EventEnvelope, EventError, RequestEvent, RequestEventKind};
pub use garden::{Command, Connection, ConnectionType, Garden, GardenStatus, Instance, System};
pub use request::{Request, RequestRef, RequestStatus};
pub use role::{PermissionLevel, Role};
pub use scope::{ScopeDimension, ScopeQuery};
pub use user::User;
