//! Wire messages exchanged over the duplex channel.

use serde::{Deserialize, Serialize};
use weft_id::{ComponentId, CssStateId, HandlerId};

use crate::{PNode, ProtocolError};

/// Messages sent by the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// First message on every connection: the root ids present in the DOM.
    Connect {
        #[serde(rename = "rootIDs")]
        root_ids: Vec<ComponentId>,
        #[serde(
            rename = "cssStateID",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        css_state_id: Option<CssStateId>,
    },

    /// A DOM event matched a handler marker.
    Event {
        #[serde(rename = "rootID")]
        root_id: ComponentId,
        #[serde(rename = "componentID")]
        component_id: ComponentId,
        #[serde(rename = "eventID")]
        event_id: HandlerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event: Option<serde_json::Value>,
    },

    /// The cumulative set of event names the client has wired listeners for.
    SeenEventNames {
        #[serde(rename = "seenEventNames")]
        seen_event_names: Vec<String>,
    },

    /// The first CSS rule index the client has not yet received.
    NextRuleIndex {
        #[serde(rename = "nextRuleIndex")]
        next_rule_index: usize,
    },
}

impl ClientMessage {
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// CSS rules appended since the index the client last confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CssUpdates {
    #[serde(rename = "newCSSRules")]
    pub new_css_rules: Vec<String>,
    #[serde(rename = "nextRuleIndex")]
    pub next_rule_index: usize,
}

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Replace the subtree owned by `component_id` with `p_node`.
    Update {
        #[serde(rename = "componentID")]
        component_id: ComponentId,
        #[serde(rename = "pNode")]
        p_node: PNode,
        #[serde(rename = "newEventNames", default)]
        new_event_names: Vec<String>,
        #[serde(
            rename = "cssUpdates",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        css_updates: Option<CssUpdates>,
    },
}

impl ServerMessage {
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
