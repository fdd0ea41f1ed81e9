//! 花园控制台核心库
//! 权限/作用域判定、角色汇总，以及花园与请求的事件合并

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod realtime;
pub mod routes;
pub mod services;
pub mod telemetry;
pub mod upstream;
