//! HTTP 处理器模块

pub mod events;
pub mod gardens;
pub mod health;
pub mod permissions;
pub mod requests;
