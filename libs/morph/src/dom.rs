//! An arena-backed document.
//!
//! Nodes live in generation-checked slots, so a [`NodeKey`] held past the
//! removal of its node is detected instead of silently aliasing whatever
//! reuses the slot. Per-node client state (the retained description used by
//! the morph engine and a pending debounced value) lives in the slot and dies
//! with it.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use weft_protocol::{PElement, PNode};

use crate::MorphError;

/// Handle to a node in a [`Dom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    index: u32,
    generation: u32,
}

impl NodeKey {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// What the morph engine last wrote into a node.
///
/// Only nodes carrying a retained description are morphed in place; anything
/// else is treated as foreign and replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retained {
    Element(String),
    Text,
}

impl fmt::Display for Retained {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Retained::Element(tag) => write!(f, "<{tag}>"),
            Retained::Text => f.write_str("#text"),
        }
    }
}

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    attrs: BTreeMap<String, String>,
    /// Live form state. Attributes only seed these on creation.
    value: String,
    checked: bool,
    selected: bool,
}

#[derive(Debug, Clone)]
enum Content {
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct PendingValue {
    value: String,
    due: Instant,
}

#[derive(Debug, Clone)]
struct NodeData {
    content: Content,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
    retained: Option<Retained>,
    pending: Option<PendingValue>,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    data: Option<NodeData>,
}

/// A document tree rooted at a `body` element.
#[derive(Debug, Clone)]
pub struct Dom {
    slots: Vec<Slot>,
    free: Vec<u32>,
    body: NodeKey,
    timers: Vec<NodeKey>,
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}

impl Dom {
    pub fn new() -> Self {
        let mut dom = Self {
            slots: Vec::new(),
            free: Vec::new(),
            body: NodeKey::new(0, 0),
            timers: Vec::new(),
        };
        dom.body = dom.create_element("body");
        dom
    }

    /// The document's top element.
    pub fn body(&self) -> NodeKey {
        self.body
    }

    /// Number of live nodes, `body` included.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.data.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.get(key).is_some()
    }

    fn alloc(&mut self, content: Content) -> NodeKey {
        let data = NodeData {
            content,
            parent: None,
            children: Vec::new(),
            retained: None,
            pending: None,
        };
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.data = Some(data);
            return NodeKey::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            data: Some(data),
        });
        NodeKey::new(index, 0)
    }

    fn get(&self, key: NodeKey) -> Option<&NodeData> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.data.as_ref())
    }

    fn get_mut(&mut self, key: NodeKey) -> Option<&mut NodeData> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.data.as_mut())
    }

    fn node(&self, key: NodeKey) -> Result<&NodeData, MorphError> {
        self.get(key).ok_or(MorphError::StaleNode(key))
    }

    fn node_mut(&mut self, key: NodeKey) -> Result<&mut NodeData, MorphError> {
        self.get_mut(key).ok_or(MorphError::StaleNode(key))
    }

    fn element(&self, key: NodeKey) -> Option<&ElementData> {
        match &self.get(key)?.content {
            Content::Element(el) => Some(el),
            Content::Text(_) => None,
        }
    }

    fn element_mut(&mut self, key: NodeKey) -> Result<&mut ElementData, MorphError> {
        match &mut self.node_mut(key)?.content {
            Content::Element(el) => Ok(el),
            Content::Text(_) => Err(MorphError::NotAnElement(key)),
        }
    }

    /// Creates a detached element. Form state is seeded from attributes
    /// later set through [`Dom::build`] or [`Dom::load`].
    pub fn create_element(&mut self, tag: &str) -> NodeKey {
        self.alloc(Content::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            value: String::new(),
            checked: false,
            selected: false,
        }))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeKey {
        self.alloc(Content::Text(text.into()))
    }

    pub fn append_child(&mut self, parent: NodeKey, child: NodeKey) -> Result<(), MorphError> {
        self.insert_at(parent, child, usize::MAX)
    }

    /// Moves `child` to position `index` among `parent`'s children, detaching
    /// it from wherever it was. Indices past the end append.
    pub fn insert_at(&mut self, parent: NodeKey, child: NodeKey, index: usize) -> Result<(), MorphError> {
        self.element(parent).ok_or_else(|| {
            if self.contains(parent) {
                MorphError::NotAnElement(parent)
            } else {
                MorphError::StaleNode(parent)
            }
        })?;
        self.node(child)?;
        if self.ancestors(parent).any(|key| key == child) {
            return Err(MorphError::Cycle { parent, child });
        }

        self.detach(child)?;
        let children = &mut self.node_mut(parent)?.children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Unlinks a node from its parent, keeping its subtree alive.
    pub fn detach(&mut self, key: NodeKey) -> Result<(), MorphError> {
        let Some(parent) = self.node_mut(key)?.parent.take() else {
            return Ok(());
        };
        if let Some(data) = self.get_mut(parent) {
            data.children.retain(|child| *child != key);
        }
        Ok(())
    }

    /// Removes a node and its subtree. The body itself cannot be removed. Keys into the subtree go stale and any
    /// debounced value scheduled on them is dropped. Returns the number of
    /// nodes freed.
    pub fn remove(&mut self, key: NodeKey) -> Result<usize, MorphError> {
        if key == self.body {
            return Err(MorphError::Cycle {
                parent: key,
                child: key,
            });
        }
        self.detach(key)?;
        Ok(self.free_subtree(key))
    }

    fn free_subtree(&mut self, key: NodeKey) -> usize {
        let Some(slot) = self
            .slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
        else {
            return 0;
        };
        let Some(data) = slot.data.take() else {
            return 0;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        1 + data
            .children
            .into_iter()
            .map(|child| self.free_subtree(child))
            .sum::<usize>()
    }

    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.get(key)?.parent
    }

    /// Children in document order; empty for text and stale keys.
    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        self.get(key).map_or(&[], |data| data.children.as_slice())
    }

    /// `key` and then each ancestor up to the body.
    pub fn ancestors(&self, key: NodeKey) -> impl Iterator<Item = NodeKey> + '_ {
        std::iter::successors(self.contains(key).then_some(key), move |key| self.parent(*key))
    }

    /// `key` and its descendants in document order.
    pub fn descendants(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut stack = vec![key];
        while let Some(key) = stack.pop() {
            if !self.contains(key) {
                continue;
            }
            out.push(key);
            stack.extend(self.children(key).iter().rev().copied());
        }
        out
    }

    /// First element under the body whose attribute `name` equals `value`.
    pub fn find(&self, name: &str, value: &str) -> Option<NodeKey> {
        self.descendants(self.body)
            .into_iter()
            .find(|key| self.attr(*key, name) == Some(value))
    }

    pub fn is_text(&self, key: NodeKey) -> bool {
        matches!(self.get(key).map(|data| &data.content), Some(Content::Text(_)))
    }

    pub fn tag(&self, key: NodeKey) -> Option<&str> {
        self.element(key).map(|el| el.tag.as_str())
    }

    pub fn text(&self, key: NodeKey) -> Option<&str> {
        match &self.get(key)?.content {
            Content::Text(text) => Some(text),
            Content::Element(_) => None,
        }
    }

    pub fn set_text(&mut self, key: NodeKey, text: impl Into<String>) -> Result<(), MorphError> {
        match &mut self.node_mut(key)?.content {
            Content::Text(current) => {
                *current = text.into();
                Ok(())
            }
            Content::Element(_) => Err(MorphError::NotAnElement(key)),
        }
    }

    /// Concatenated text of the subtree.
    pub fn text_content(&self, key: NodeKey) -> String {
        self.descendants(key)
            .into_iter()
            .filter_map(|key| self.text(key))
            .collect()
    }

    pub fn attr(&self, key: NodeKey, name: &str) -> Option<&str> {
        self.element(key)?.attrs.get(name).map(String::as_str)
    }

    pub fn attrs(&self, key: NodeKey) -> Option<&BTreeMap<String, String>> {
        self.element(key).map(|el| &el.attrs)
    }

    pub fn set_attr(
        &mut self,
        key: NodeKey,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), MorphError> {
        self.element_mut(key)?.attrs.insert(name.into(), value.into());
        Ok(())
    }

    pub fn remove_attr(&mut self, key: NodeKey, name: &str) -> Result<(), MorphError> {
        self.element_mut(key)?.attrs.remove(name);
        Ok(())
    }

    /// The live value of a form control.
    pub fn value(&self, key: NodeKey) -> Option<&str> {
        self.element(key).map(|el| el.value.as_str())
    }

    /// Sets the live value, as typing would.
    pub fn set_value(&mut self, key: NodeKey, value: impl Into<String>) -> Result<(), MorphError> {
        self.element_mut(key)?.value = value.into();
        Ok(())
    }

    pub fn checked(&self, key: NodeKey) -> bool {
        self.element(key).is_some_and(|el| el.checked)
    }

    pub fn set_checked(&mut self, key: NodeKey, checked: bool) -> Result<(), MorphError> {
        self.element_mut(key)?.checked = checked;
        Ok(())
    }

    pub fn selected(&self, key: NodeKey) -> bool {
        self.element(key).is_some_and(|el| el.selected)
    }

    pub fn set_selected(&mut self, key: NodeKey, selected: bool) -> Result<(), MorphError> {
        self.element_mut(key)?.selected = selected;
        Ok(())
    }

    pub fn retained(&self, key: NodeKey) -> Result<Option<&Retained>, MorphError> {
        Ok(self.node(key)?.retained.as_ref())
    }

    pub fn set_retained(&mut self, key: NodeKey, retained: Option<Retained>) -> Result<(), MorphError> {
        self.node_mut(key)?.retained = retained;
        Ok(())
    }

    /// What the node actually is, in the vocabulary of [`Retained`].
    pub fn shape(&self, key: NodeKey) -> Result<Retained, MorphError> {
        Ok(match &self.node(key)?.content {
            Content::Element(el) => Retained::Element(el.tag.clone()),
            Content::Text(_) => Retained::Text,
        })
    }

    /// Creates a detached subtree from a node description, as the morph
    /// engine does for fresh inserts. Every created node is retained.
    pub fn build(&mut self, node: &PNode) -> NodeKey {
        let key = self.instantiate(node);
        for key in self.descendants(key) {
            if let Ok(shape) = self.shape(key) {
                if let Some(data) = self.get_mut(key) {
                    data.retained = Some(shape);
                }
            }
        }
        key
    }

    /// Appends a subtree to `parent` the way a parsed page arrives: without
    /// retained descriptions until [`Dom::adopt`] runs.
    pub fn load(&mut self, parent: NodeKey, node: &PNode) -> Result<NodeKey, MorphError> {
        let key = self.instantiate(node);
        self.append_child(parent, key)?;
        Ok(key)
    }

    fn instantiate(&mut self, node: &PNode) -> NodeKey {
        match node {
            PNode::Text { text } => self.create_text(text.clone()),
            PNode::Element(el) => {
                let key = self.alloc(Content::Element(ElementData {
                    tag: el.selector.clone(),
                    value: el.attrs.get("value").cloned().unwrap_or_default(),
                    checked: el.attrs.contains_key("checked"),
                    selected: el.attrs.contains_key("selected"),
                    attrs: el.attrs.clone(),
                }));
                let children: Vec<NodeKey> = el.children.iter().map(|child| self.instantiate(child)).collect();
                for child in &children {
                    if let Some(data) = self.get_mut(*child) {
                        data.parent = Some(key);
                    }
                }
                if let Some(data) = self.get_mut(key) {
                    data.children = children;
                }
                key
            }
        }
    }

    /// Tags every node of a subtree with its current shape. Run once over a
    /// server-rendered page before the first morph. Returns the number of
    /// nodes adopted.
    pub fn adopt(&mut self, key: NodeKey) -> Result<usize, MorphError> {
        self.node(key)?;
        let nodes = self.descendants(key);
        for key in &nodes {
            let shape = self.shape(*key)?;
            self.node_mut(*key)?.retained = Some(shape);
        }
        Ok(nodes.len())
    }

    /// Reads a subtree back as a node description. Live form state is not
    /// included.
    pub fn describe(&self, key: NodeKey) -> Option<PNode> {
        let data = self.get(key)?;
        Some(match &data.content {
            Content::Text(text) => PNode::text(text.clone()),
            Content::Element(el) => PNode::Element(PElement {
                selector: el.tag.clone(),
                attrs: el.attrs.clone(),
                children: data
                    .children
                    .iter()
                    .filter_map(|child| self.describe(*child))
                    .collect(),
                owner: None,
            }),
        })
    }

    /// Schedules `value` to overwrite the node's live value at `due`,
    /// replacing any value already scheduled on it.
    pub(crate) fn schedule_value(&mut self, key: NodeKey, value: String, due: Instant) -> Result<(), MorphError> {
        self.element_mut(key)?;
        self.node_mut(key)?.pending = Some(PendingValue { value, due });
        if !self.timers.contains(&key) {
            self.timers.push(key);
        }
        Ok(())
    }

    pub fn has_pending_value(&self, key: NodeKey) -> bool {
        self.get(key).is_some_and(|data| data.pending.is_some())
    }

    /// Earliest time a scheduled value falls due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers
            .iter()
            .filter_map(|key| self.get(*key)?.pending.as_ref())
            .map(|pending| pending.due)
            .min()
    }

    /// Removes and returns every scheduled value due at `now`. Timers on
    /// removed nodes are discarded.
    pub(crate) fn take_due_values(&mut self, now: Instant) -> Vec<(NodeKey, String)> {
        let mut due = Vec::new();
        let timers = std::mem::take(&mut self.timers);
        for key in timers {
            let Some(data) = self.get_mut(key) else {
                continue;
            };
            match data.pending.take() {
                Some(pending) if pending.due <= now => due.push((key, pending.value)),
                Some(pending) => {
                    data.pending = Some(pending);
                    self.timers.push(key);
                }
                None => {}
            }
        }
        due
    }
}
