//! Push-channel event protocol
//!
//! Upstream pushes `{ name, garden, payload, ... }` JSON messages. They are
//! validated into [`Event`] at the boundary so that reconcilers only ever see
//! well-formed payloads.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::garden::{Garden, Instance, System};
use super::request::Request;

/// Raw push-channel message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub name: String,
    /// Garden that emitted the event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub garden: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl EventEnvelope {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            garden: None,
            payload: Some(payload),
            error: None,
            timestamp: None,
        }
    }

    pub fn from_garden(mut self, garden: impl Into<String>) -> Self {
        self.garden = Some(garden.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.unwrap_or(false)
    }
}

/// Envelope rejected at the boundary
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("event {name} reported an upstream error")]
    Upstream { name: String },

    #[error("event {name} has no payload")]
    MissingPayload { name: String },

    #[error("event {name} does not name its source garden")]
    MissingGarden { name: String },

    #[error("event {name} carries an invalid payload: {source}")]
    InvalidPayload {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Request lifecycle event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestEventKind {
    Created,
    Started,
    Updated,
    Completed,
    Canceled,
}

/// Request lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEvent {
    pub kind: RequestEventKind,
    pub request: Request,
}

impl RequestEvent {
    pub fn new(kind: RequestEventKind, request: Request) -> Self {
        Self { kind, request }
    }

    pub fn is_creation(&self) -> bool {
        self.kind == RequestEventKind::Created
    }
}

/// Validated push-channel event
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    GardenUpserted(Garden),
    GardenRemoved(Garden),
    SystemUpserted { garden: String, system: System },
    SystemRemoved { garden: String, system: System },
    InstanceUpdated { garden: String, instance: Instance },
    Request(RequestEvent),
    /// Event names the console does not track
    Ignored(String),
}

impl Event {
    /// Static label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Event::GardenUpserted(_) => "garden_upserted",
            Event::GardenRemoved(_) => "garden_removed",
            Event::SystemUpserted { .. } => "system_upserted",
            Event::SystemRemoved { .. } => "system_removed",
            Event::InstanceUpdated { .. } => "instance_updated",
            Event::Request(_) => "request",
            Event::Ignored(_) => "ignored",
        }
    }
}

impl TryFrom<EventEnvelope> for Event {
    type Error = EventError;

    fn try_from(envelope: EventEnvelope) -> Result<Self, Self::Error> {
        if envelope.is_error() {
            return Err(EventError::Upstream {
                name: envelope.name,
            });
        }

        let event = match envelope.name.as_str() {
            "GARDEN_CREATED" | "GARDEN_CONFIGURED" | "GARDEN_UPDATED" | "GARDEN_STARTED"
            | "GARDEN_STOPPED" | "GARDEN_SYNC" => Event::GardenUpserted(payload(&envelope)?),
            "GARDEN_REMOVED" => Event::GardenRemoved(payload(&envelope)?),
            "SYSTEM_CREATED" | "SYSTEM_UPDATED" => Event::SystemUpserted {
                garden: source_garden(&envelope)?,
                system: payload(&envelope)?,
            },
            "SYSTEM_REMOVED" => Event::SystemRemoved {
                garden: source_garden(&envelope)?,
                system: payload(&envelope)?,
            },
            "INSTANCE_INITIALIZED" | "INSTANCE_STARTED" | "INSTANCE_STOPPED"
            | "INSTANCE_UPDATED" => Event::InstanceUpdated {
                garden: source_garden(&envelope)?,
                instance: payload(&envelope)?,
            },
            "REQUEST_CREATED" => request_event(&envelope, RequestEventKind::Created)?,
            "REQUEST_STARTED" => request_event(&envelope, RequestEventKind::Started)?,
            "REQUEST_UPDATED" => request_event(&envelope, RequestEventKind::Updated)?,
            "REQUEST_COMPLETED" => request_event(&envelope, RequestEventKind::Completed)?,
            "REQUEST_CANCELED" => request_event(&envelope, RequestEventKind::Canceled)?,
            _ => Event::Ignored(envelope.name),
        };

        Ok(event)
    }
}

fn request_event(envelope: &EventEnvelope, kind: RequestEventKind) -> Result<Event, EventError> {
    Ok(Event::Request(RequestEvent::new(kind, payload(envelope)?)))
}

fn payload<T: DeserializeOwned>(envelope: &EventEnvelope) -> Result<T, EventError> {
    let value = envelope
        .payload
        .as_ref()
        .filter(|value| !value.is_null())
        .ok_or_else(|| EventError::MissingPayload {
            name: envelope.name.clone(),
        })?;

    T::deserialize(value).map_err(|source| EventError::InvalidPayload {
        name: envelope.name.clone(),
        source,
    })
}

fn source_garden(envelope: &EventEnvelope) -> Result<String, EventError> {
    envelope
        .garden
        .clone()
        .filter(|garden| !garden.is_empty())
        .ok_or_else(|| EventError::MissingGarden {
            name: envelope.name.clone(),
        })
}
