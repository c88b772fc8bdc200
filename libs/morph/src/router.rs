//! Turns DOM events into `event` messages.
//!
//! Listeners are wired per event name, lazily, once the server reports a
//! name in use. A dispatched event walks the target's ancestors twice:
//! outermost-first for `data-<name>-capture` markers, then target-first for
//! `data-<name>` markers. Every matching element yields one message, so
//! nested components can all react to the same event.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;
use tracing::{debug, trace};
use weft_id::{ComponentId, CssStateId, HandlerId};
use weft_protocol::{
    attrs, ClientMessage, InputEvent, KeyEvent, PayloadKind, ProtocolError, SubmitEvent,
};

use crate::dom::{Dom, NodeKey};
use crate::MorphError;

/// A DOM event as raised on its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomEvent {
    pub name: String,
    pub target: NodeKey,
    /// The key pressed, for keyboard events.
    pub key: Option<String>,
}

impl DomEvent {
    pub fn new(name: impl Into<String>, target: NodeKey) -> Self {
        Self {
            name: name.into(),
            target,
            key: None,
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// What dispatching one event produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dispatch {
    pub messages: Vec<ClientMessage>,
    /// Set when a submit handler matched; the native submission must not
    /// happen.
    pub default_prevented: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EventRouter {
    wired: BTreeSet<String>,
    roots: HashMap<NodeKey, ComponentId>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the `connect` message from the root markers in the document.
    pub fn connect(&mut self, dom: &Dom, css_state_id: Option<CssStateId>) -> Result<ClientMessage, MorphError> {
        let root_ids = dom
            .descendants(dom.body())
            .into_iter()
            .filter_map(|key| dom.attr(key, attrs::DATA_ROOT))
            .map(|raw| parse_marker(attrs::DATA_ROOT, raw))
            .collect::<Result<Vec<ComponentId>, _>>()?;
        if root_ids.is_empty() {
            return Err(MorphError::NoRoots);
        }
        debug!(roots = root_ids.len(), "Connecting");
        Ok(ClientMessage::Connect {
            root_ids,
            css_state_id,
        })
    }

    /// Installs listeners for newly reported event names. Returns the
    /// cumulative acknowledgement when anything new was wired.
    pub fn wire<'a>(&mut self, names: impl IntoIterator<Item = &'a String>) -> Option<ClientMessage> {
        let mut added = false;
        for name in names {
            if self.wired.insert(name.clone()) {
                debug!(event_name = %name, "Wired listener");
                added = true;
            }
        }
        added.then(|| ClientMessage::SeenEventNames {
            seen_event_names: self.wired.iter().cloned().collect(),
        })
    }

    pub fn is_wired(&self, name: &str) -> bool {
        self.wired.contains(name)
    }

    pub fn wired(&self) -> impl Iterator<Item = &str> {
        self.wired.iter().map(String::as_str)
    }

    /// Drops memoized root lookups. Call after the tree changes shape.
    pub fn forget_roots(&mut self) {
        self.roots.clear();
    }

    pub fn dispatch(&mut self, dom: &Dom, event: &DomEvent) -> Result<Dispatch, MorphError> {
        let mut dispatch = Dispatch::default();
        if !self.is_wired(&event.name) {
            trace!(event_name = %event.name, "Event not wired");
            return Ok(dispatch);
        }

        let path: Vec<NodeKey> = dom.ancestors(event.target).collect();
        let capture = attrs::event_attr(&event.name, true);
        let bubble = attrs::event_attr(&event.name, false);
        let matches = path
            .iter()
            .rev()
            .filter_map(|key| Some((*key, dom.attr(*key, &capture)?)))
            .chain(path.iter().filter_map(|key| Some((*key, dom.attr(*key, &bubble)?))));

        let mut payload: Option<Option<Value>> = None;
        for (element, handler) in matches {
            let event_id: HandlerId = parse_marker(&event.name, handler)?;
            if event.name == "submit" {
                dispatch.default_prevented = true;
            }
            let component_id = nearest_component(dom, element)?;
            let root_id = self.root_for(dom, element)?;
            let event_payload = match &payload {
                Some(collected) => collected.clone(),
                None => {
                    let collected = collect_payload(dom, event)?;
                    payload = Some(collected.clone());
                    collected
                }
            };
            dispatch.messages.push(ClientMessage::Event {
                root_id,
                component_id,
                event_id,
                event: event_payload,
            });
        }
        Ok(dispatch)
    }

    fn root_for(&mut self, dom: &Dom, element: NodeKey) -> Result<ComponentId, MorphError> {
        if let Some(root) = self.roots.get(&element) {
            return Ok(*root);
        }
        let raw = dom
            .ancestors(element)
            .find_map(|key| dom.attr(key, attrs::DATA_ROOT))
            .ok_or(MorphError::OutsideRoot(element))?;
        let root = parse_marker(attrs::DATA_ROOT, raw)?;
        self.roots.insert(element, root);
        Ok(root)
    }
}

fn parse_marker<T>(attr: &str, raw: &str) -> Result<T, MorphError>
where
    T: std::str::FromStr<Err = weft_id::IdError>,
{
    raw.parse().map_err(|source| MorphError::BadMarker {
        attr: attr.to_string(),
        source,
    })
}

fn nearest_component(dom: &Dom, element: NodeKey) -> Result<ComponentId, MorphError> {
    let raw = dom
        .ancestors(element)
        .find_map(|key| dom.attr(key, attrs::DATA_COMPONENT_ID))
        .ok_or(MorphError::OutsideRoot(element))?;
    parse_marker(attrs::DATA_COMPONENT_ID, raw)
}

fn collect_payload(dom: &Dom, event: &DomEvent) -> Result<Option<Value>, MorphError> {
    let target = event.target;
    let name = dom.attr(target, "name").unwrap_or_default().to_string();
    let value = match PayloadKind::for_event_name(&event.name) {
        PayloadKind::None => return Ok(None),
        PayloadKind::Input | PayloadKind::Change => serde_json::to_value(InputEvent {
            name,
            value: control_value(dom, target).unwrap_or_default(),
        }),
        PayloadKind::Key => serde_json::to_value(KeyEvent {
            name,
            key: event.key.clone().unwrap_or_default(),
        }),
        PayloadKind::Submit => {
            let form = dom
                .ancestors(target)
                .find(|key| dom.tag(*key) == Some("form"))
                .unwrap_or(target);
            serde_json::to_value(SubmitEvent {
                fields: form_fields(dom, form),
            })
        }
    };
    Ok(Some(value.map_err(ProtocolError::from)?))
}

/// The value a control would submit, or `None` when it submits nothing.
fn control_value(dom: &Dom, key: NodeKey) -> Option<String> {
    match dom.tag(key)? {
        "select" => dom
            .descendants(key)
            .into_iter()
            .find(|option| dom.tag(*option) == Some("option") && dom.selected(*option))
            .map(|option| option_value(dom, option)),
        "input" if matches!(dom.attr(key, "type"), Some("checkbox" | "radio")) => dom
            .checked(key)
            .then(|| dom.attr(key, "value").unwrap_or("on").to_string()),
        "input" | "textarea" => dom.value(key).map(str::to_string),
        _ => None,
    }
}

fn option_value(dom: &Dom, option: NodeKey) -> String {
    dom.attr(option, "value")
        .map(str::to_string)
        .unwrap_or_else(|| dom.text_content(option))
}

fn form_fields(dom: &Dom, form: NodeKey) -> BTreeMap<String, String> {
    dom.descendants(form)
        .into_iter()
        .filter(|key| *key != form)
        .filter_map(|key| {
            let name = dom.attr(key, "name")?;
            Some((name.to_string(), control_value(dom, key)?))
        })
        .collect()
}
