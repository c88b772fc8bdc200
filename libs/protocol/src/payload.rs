//! Event payload contract.
//!
//! The client collects a payload for a handful of event names; the server
//! validates it against the shape the event name requires before any user
//! callback sees it.

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::ProtocolError;

/// `input` events: the control's name and current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEvent {
    #[serde(default)]
    pub name: String,
    pub value: String,
}

/// `change` events carry the same fields as [`InputEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(flatten)]
    pub input: InputEvent,
}

/// `submit` events: every named field of the form.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubmitEvent {
    pub fields: BTreeMap<String, String>,
}

/// Keyboard events: the control's name and the key pressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    #[serde(default)]
    pub name: String,
    pub key: String,
}

/// A validated payload handed to event callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    None,
    Input(InputEvent),
    Change(ChangeEvent),
    Submit(SubmitEvent),
    Key(KeyEvent),
}

impl EventPayload {
    /// The submitted or typed value, for input and change payloads.
    pub fn value(&self) -> Option<&str> {
        match self {
            EventPayload::Input(ev) => Some(&ev.value),
            EventPayload::Change(ev) => Some(&ev.input.value),
            _ => None,
        }
    }
}

/// The payload shape an event name requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    None,
    Input,
    Change,
    Submit,
    Key,
}

impl PayloadKind {
    pub fn for_event_name(event_name: &str) -> Self {
        match event_name {
            "input" => PayloadKind::Input,
            "change" => PayloadKind::Change,
            "submit" => PayloadKind::Submit,
            "keydown" | "keyup" | "keypress" => PayloadKind::Key,
            _ => PayloadKind::None,
        }
    }

    /// Validates a raw client payload. Events without a payload contract
    /// ignore whatever the client sent.
    pub fn validate(
        self,
        event_name: &str,
        raw: Option<&Value>,
    ) -> Result<EventPayload, ProtocolError> {
        Ok(match self {
            PayloadKind::None => EventPayload::None,
            PayloadKind::Input => EventPayload::Input(decode(event_name, raw)?),
            PayloadKind::Change => EventPayload::Change(decode(event_name, raw)?),
            PayloadKind::Submit => EventPayload::Submit(decode(event_name, raw)?),
            PayloadKind::Key => EventPayload::Key(decode(event_name, raw)?),
        })
    }
}

fn decode<T: DeserializeOwned>(event_name: &str, raw: Option<&Value>) -> Result<T, ProtocolError> {
    let raw = raw.ok_or_else(|| ProtocolError::InvalidPayload {
        event_name: event_name.to_string(),
        detail: "missing payload".to_string(),
    })?;
    T::deserialize(raw).map_err(|e| ProtocolError::InvalidPayload {
        event_name: event_name.to_string(),
        detail: e.to_string(),
    })
}
