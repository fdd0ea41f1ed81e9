//! Request domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    #[default]
    Created,
    Received,
    InProgress,
    Canceled,
    Success,
    Error,
    #[serde(other)]
    Unknown,
}

impl RequestStatus {
    /// Terminal states
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            RequestStatus::Canceled | RequestStatus::Success | RequestStatus::Error
        )
    }
}

/// Reference to a parent request; upstream sends the full parent, only the id is kept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRef {
    pub id: String,
}

/// One invocation of a system command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub system_version: String,
    #[serde(default)]
    pub instance_name: String,
    #[serde(default)]
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<RequestRef>,
    /// `None` when the payload did not carry children at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Request>>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl Request {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: String::new(),
            namespace: String::new(),
            system: String::new(),
            system_version: String::new(),
            instance_name: String::new(),
            status: RequestStatus::Created,
            parent: None,
            children: None,
            created_at: None,
            updated_at: None,
            error_class: None,
            output: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent = Some(RequestRef { id: parent_id.into() });
        self
    }

    pub fn with_status(mut self, status: RequestStatus) -> Self {
        self.status = status;
        self
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent.as_ref().map(|parent| parent.id.as_str())
    }

    /// Copy the lifecycle fields carried by update events
    pub fn apply_lifecycle(&mut self, update: &Request) {
        self.status = update.status;
        self.updated_at = update.updated_at;
        self.error_class = update.error_class.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserialize_epoch_millis() {
        let request: Request = serde_json::from_str(
            r#"{
                "id": "r1",
                "command": "say",
                "status": "IN_PROGRESS",
                "parent": {"id": "p1", "command": "outer"},
                "created_at": 1700000000000
            }"#,
        )
        .unwrap();
        assert_eq!(request.status, RequestStatus::InProgress);
        assert_eq!(request.parent_id(), Some("p1"));
        assert!(request.children.is_none());
        assert_eq!(request.created_at.map(|t| t.timestamp()), Some(1_700_000_000));
    }

    #[test]
    fn test_request_status_complete() {
        assert!(RequestStatus::Success.is_complete());
        assert!(RequestStatus::Error.is_complete());
        assert!(!RequestStatus::InProgress.is_complete());
    }
}
