//! The client driver: one document, one connection.

use std::time::Instant;

use tracing::{debug, warn};
use weft_id::{ComponentId, CssStateId};
use weft_protocol::{attrs, ClientMessage, CssUpdates, ServerMessage};

use crate::dom::{Dom, NodeKey};
use crate::morph::{Morph, MorphOptions, MorphOutcome};
use crate::router::{Dispatch, DomEvent, EventRouter};
use crate::MorphError;

/// Binds a [`Dom`] to the morph engine and the event router, and speaks the
/// client half of the wire protocol.
#[derive(Debug)]
pub struct Client {
    dom: Dom,
    morph: Morph,
    router: EventRouter,
    css_state_id: Option<CssStateId>,
    css_rules: Vec<String>,
    adopted: bool,
}

impl Client {
    /// Wraps a document holding a server-rendered page.
    pub fn new(dom: Dom, options: MorphOptions) -> Self {
        Self {
            dom,
            morph: Morph::new(options),
            router: EventRouter::new(),
            css_state_id: None,
            css_rules: Vec::new(),
            adopted: false,
        }
    }

    /// Seeds the CSS state the page was rendered with.
    #[must_use]
    pub fn with_css(mut self, css_state_id: CssStateId, rules: Vec<String>) -> Self {
        self.css_state_id = Some(css_state_id);
        self.css_rules = rules;
        self
    }

    /// Adopts the page on first use and builds the `connect` message.
    pub fn connect(&mut self) -> Result<ClientMessage, MorphError> {
        if !self.adopted {
            let adopted = self.dom.adopt(self.dom.body())?;
            debug!(nodes = adopted, "Adopted page");
            self.adopted = true;
        }
        self.router.connect(&self.dom, self.css_state_id)
    }

    /// Applies a server message and returns the acknowledgements to send
    /// back.
    pub fn apply(&mut self, message: ServerMessage, now: Instant) -> Result<Vec<ClientMessage>, MorphError> {
        let ServerMessage::Update {
            component_id,
            p_node,
            new_event_names,
            css_updates,
        } = message;

        let mut acks = Vec::new();
        if let Some(updates) = css_updates {
            acks.extend(self.append_css(updates));
        }

        let target = self.locate(component_id)?;
        let MorphOutcome { stats, .. } = self.morph.apply(&mut self.dom, target, &p_node, now)?;
        self.router.forget_roots();
        debug!(
            component_id = %component_id,
            created = stats.created,
            reused = stats.reused,
            removed = stats.removed,
            "Applied update"
        );

        acks.extend(self.router.wire(&new_event_names));
        Ok(acks)
    }

    /// Routes a DOM event through the wired listeners.
    pub fn dispatch(&mut self, event: &DomEvent) -> Result<Dispatch, MorphError> {
        self.router.dispatch(&self.dom, event)
    }

    /// Commits debounced values that have fallen due.
    pub fn tick(&mut self, now: Instant) -> Result<usize, MorphError> {
        self.morph.flush(&mut self.dom, now)
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    pub fn dom_mut(&mut self) -> &mut Dom {
        &mut self.dom
    }

    pub fn css_rules(&self) -> &[String] {
        &self.css_rules
    }

    pub fn is_wired(&self, event_name: &str) -> bool {
        self.router.is_wired(event_name)
    }

    /// The element showing `component_id`. Root updates are addressed by
    /// root id, which the DOM carries as `data-root` when the root aliases
    /// a nested component.
    fn locate(&self, component_id: ComponentId) -> Result<NodeKey, MorphError> {
        let id = component_id.to_string();
        self.dom
            .find(attrs::DATA_COMPONENT_ID, &id)
            .or_else(|| self.dom.find(attrs::DATA_ROOT, &id))
            .ok_or(MorphError::UnknownTarget(component_id))
    }

    fn append_css(&mut self, updates: CssUpdates) -> Option<ClientMessage> {
        let CssUpdates {
            new_css_rules,
            next_rule_index,
        } = updates;
        let first = next_rule_index.saturating_sub(new_css_rules.len());
        if first > self.css_rules.len() {
            warn!(
                have = self.css_rules.len(),
                first, "CSS rules arrived with a gap"
            );
        }
        let before = self.css_rules.len();
        for (index, rule) in (first..).zip(new_css_rules) {
            if index == self.css_rules.len() {
                self.css_rules.push(rule);
            }
        }
        (self.css_rules.len() != before).then(|| ClientMessage::NextRuleIndex {
            next_rule_index: self.css_rules.len(),
        })
    }
}
