//! Edits a live [`Dom`] subtree to match an incoming node description.
//!
//! Elements keep their identity while their tag stays the same; attributes
//! such as `id` or `class` are patched in place. Siblings carrying
//! `data-key` are matched by key so reorders move nodes instead of
//! rebuilding them, and the rest are matched in document order.
//!
//! Form elements marked `data-controlled` get special treatment: checkbox
//! and radio state is written immediately, while text values are debounced
//! so an update arriving mid-typing does not clobber the keystrokes still in
//! flight. Call [`Morph::flush`] as time passes to commit them.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::debug;
use weft_protocol::{attrs, PElement, PNode};

use crate::dom::{Dom, NodeKey, Retained};
use crate::MorphError;

/// How long a controlled text value waits for quiet before it is written.
pub const DEFAULT_TEXT_DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MorphOptions {
    pub text_debounce: Duration,
}

impl Default for MorphOptions {
    fn default() -> Self {
        Self {
            text_debounce: DEFAULT_TEXT_DEBOUNCE,
        }
    }
}

/// Counters for one morph pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MorphStats {
    /// Nodes built from scratch.
    pub created: usize,
    /// Existing nodes patched in place.
    pub reused: usize,
    /// Nodes dropped from the document.
    pub removed: usize,
    /// Controlled values scheduled behind the debounce.
    pub deferred: usize,
}

/// Result of [`Morph::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MorphOutcome {
    /// The node now standing for the description. Differs from the target
    /// when the target had to be replaced.
    pub node: NodeKey,
    pub stats: MorphStats,
}

#[derive(Debug, Clone, Default)]
pub struct Morph {
    options: MorphOptions,
}

impl Morph {
    pub fn new(options: MorphOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MorphOptions {
        &self.options
    }

    /// Morphs `target` into `node`.
    ///
    /// A target that was never adopted or built by the engine is replaced
    /// wholesale. A target whose retained description no longer matches the
    /// node it is attached to is a divergence and fails the pass.
    pub fn apply(
        &self,
        dom: &mut Dom,
        target: NodeKey,
        node: &PNode,
        now: Instant,
    ) -> Result<MorphOutcome, MorphError> {
        let mut stats = MorphStats::default();
        let node = self.morph_node(dom, target, node, now, &mut stats)?;
        debug!(
            node = %node,
            created = stats.created,
            reused = stats.reused,
            removed = stats.removed,
            "Morphed subtree"
        );
        Ok(MorphOutcome { node, stats })
    }

    /// Writes every debounced value that has fallen due. Returns how many
    /// were written.
    pub fn flush(&self, dom: &mut Dom, now: Instant) -> Result<usize, MorphError> {
        let due = dom.take_due_values(now);
        let count = due.len();
        for (key, value) in due {
            dom.set_value(key, value)?;
        }
        Ok(count)
    }

    fn morph_node(
        &self,
        dom: &mut Dom,
        key: NodeKey,
        node: &PNode,
        now: Instant,
        stats: &mut MorphStats,
    ) -> Result<NodeKey, MorphError> {
        let Some(retained) = dom.retained(key)?.cloned() else {
            return self.replace(dom, key, node, stats);
        };
        let shape = dom.shape(key)?;
        if retained != shape {
            return Err(MorphError::RetainedMismatch {
                node: key,
                retained: retained.to_string(),
                found: shape.to_string(),
            });
        }

        match (node, &shape) {
            (PNode::Text { text }, Retained::Text) => {
                if dom.text(key) != Some(text.as_str()) {
                    dom.set_text(key, text.clone())?;
                }
                stats.reused += 1;
                Ok(key)
            }
            (PNode::Element(el), Retained::Element(tag)) if *tag == el.selector => {
                self.morph_element(dom, key, el, now, stats)?;
                stats.reused += 1;
                Ok(key)
            }
            _ => self.replace(dom, key, node, stats),
        }
    }

    fn replace(
        &self,
        dom: &mut Dom,
        key: NodeKey,
        node: &PNode,
        stats: &mut MorphStats,
    ) -> Result<NodeKey, MorphError> {
        let fresh = dom.build(node);
        stats.created += dom.descendants(fresh).len();
        if let Some(parent) = dom.parent(key) {
            let index = dom
                .children(parent)
                .iter()
                .position(|child| *child == key)
                .unwrap_or(usize::MAX);
            dom.insert_at(parent, fresh, index)?;
        }
        stats.removed += dom.remove(key)?;
        Ok(fresh)
    }

    fn morph_element(
        &self,
        dom: &mut Dom,
        key: NodeKey,
        el: &PElement,
        now: Instant,
        stats: &mut MorphStats,
    ) -> Result<(), MorphError> {
        sync_attrs(dom, key, el)?;

        let controlled = el.attrs.contains_key(attrs::DATA_CONTROLLED);
        if controlled {
            self.sync_controlled(dom, key, el, now, stats)?;
        }

        if !el.attrs.contains_key(attrs::DATA_IGNORE_CHILDREN) {
            self.morph_children(dom, key, &el.children, now, stats)?;
        }

        if controlled && el.selector == "select" {
            sync_selection(dom, key)?;
        }
        Ok(())
    }

    fn sync_controlled(
        &self,
        dom: &mut Dom,
        key: NodeKey,
        el: &PElement,
        now: Instant,
        stats: &mut MorphStats,
    ) -> Result<(), MorphError> {
        match el.selector.as_str() {
            "input" if is_toggle(el) => dom.set_checked(key, el.attrs.contains_key("checked")),
            "option" => dom.set_selected(key, el.attrs.contains_key("selected")),
            "input" | "textarea" => {
                let desired = el.attrs.get("value").map(String::as_str).unwrap_or_default();
                if dom.value(key) == Some(desired) && !dom.has_pending_value(key) {
                    return Ok(());
                }
                stats.deferred += 1;
                dom.schedule_value(key, desired.to_string(), now + self.options.text_debounce)
            }
            _ => Ok(()),
        }
    }

    fn morph_children(
        &self,
        dom: &mut Dom,
        parent: NodeKey,
        incoming: &[PNode],
        now: Instant,
        stats: &mut MorphStats,
    ) -> Result<(), MorphError> {
        let mut keyed: HashMap<String, NodeKey> = HashMap::new();
        let mut unkeyed: VecDeque<NodeKey> = VecDeque::new();
        for child in dom.children(parent).to_vec() {
            match dom.attr(child, attrs::DATA_KEY) {
                Some(k) if !keyed.contains_key(k) => {
                    keyed.insert(k.to_string(), child);
                }
                _ => unkeyed.push_back(child),
            }
        }

        for (index, node) in incoming.iter().enumerate() {
            let candidate = match node.key() {
                Some(k) => keyed.remove(k),
                None => unkeyed.pop_front(),
            };
            let child = match candidate {
                Some(existing) => self.morph_node(dom, existing, node, now, stats)?,
                None => {
                    let fresh = dom.build(node);
                    stats.created += dom.descendants(fresh).len();
                    fresh
                }
            };
            dom.insert_at(parent, child, index)?;
        }

        let leftovers = dom.children(parent).get(incoming.len()..).unwrap_or_default().to_vec();
        for child in leftovers {
            stats.removed += dom.remove(child)?;
        }
        Ok(())
    }
}

fn is_toggle(el: &PElement) -> bool {
    matches!(el.attrs.get("type").map(String::as_str), Some("checkbox" | "radio"))
}

fn sync_attrs(dom: &mut Dom, key: NodeKey, el: &PElement) -> Result<(), MorphError> {
    let stale: Vec<String> = dom
        .attrs(key)
        .map(|current| {
            current
                .keys()
                .filter(|name| !el.attrs.contains_key(*name))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    for name in stale {
        dom.remove_attr(key, &name)?;
    }
    for (name, value) in &el.attrs {
        if dom.attr(key, name) != Some(value.as_str()) {
            dom.set_attr(key, name.clone(), value.clone())?;
        }
    }
    Ok(())
}

/// Makes each option's live selection follow its `selected` attribute.
fn sync_selection(dom: &mut Dom, select: NodeKey) -> Result<(), MorphError> {
    let options: Vec<NodeKey> = dom
        .descendants(select)
        .into_iter()
        .filter(|key| dom.tag(*key) == Some("option"))
        .collect();
    for option in options {
        let selected = dom.attr(option, "selected").is_some();
        dom.set_selected(option, selected)?;
    }
    Ok(())
}
