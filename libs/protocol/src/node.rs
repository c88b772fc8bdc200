//! The node model shipped to the client.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use weft_id::ComponentId;

use crate::attrs;

/// An element node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PElement {
    /// Tag name, lowercase.
    pub selector: String,

    /// Attributes in name order. Boolean attributes carry an empty value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,

    /// Children in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PNode>,

    /// The instance whose render produced this element as its root.
    ///
    /// Server-side only. Resolve the instance's *current* node through the
    /// root's node arena instead of trusting this tree to be fresh.
    #[serde(skip)]
    pub owner: Option<ComponentId>,
}

/// A virtual DOM node: exactly one of element or text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PNode {
    Element(PElement),
    Text { text: String },
}

impl PNode {
    /// Creates an element node with no attributes or children.
    pub fn element(selector: impl Into<String>) -> Self {
        PNode::Element(PElement {
            selector: selector.into().to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            children: Vec::new(),
            owner: None,
        })
    }

    /// Creates a text node.
    pub fn text(text: impl Into<String>) -> Self {
        PNode::Text { text: text.into() }
    }

    /// Builder-style attribute setter; a no-op on text nodes.
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let PNode::Element(el) = &mut self {
            el.attrs.insert(name.into(), value.into());
        }
        self
    }

    /// Builder-style child appender; a no-op on text nodes.
    #[must_use]
    pub fn with_child(mut self, child: PNode) -> Self {
        if let PNode::Element(el) = &mut self {
            el.children.push(child);
        }
        self
    }

    pub fn as_element(&self) -> Option<&PElement> {
        match self {
            PNode::Element(el) => Some(el),
            PNode::Text { .. } => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut PElement> {
        match self {
            PNode::Element(el) => Some(el),
            PNode::Text { .. } => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, PNode::Text { .. })
    }

    /// Tag name for elements, `None` for text.
    pub fn selector(&self) -> Option<&str> {
        self.as_element().map(|el| el.selector.as_str())
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.as_element()
            .and_then(|el| el.attrs.get(name))
            .map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn children(&self) -> &[PNode] {
        match self {
            PNode::Element(el) => &el.children,
            PNode::Text { .. } => &[],
        }
    }

    /// The component id stamped on this element, if it parses.
    pub fn component_id(&self) -> Option<ComponentId> {
        self.attr(attrs::DATA_COMPONENT_ID)
            .and_then(|raw| raw.parse().ok())
    }

    pub fn key(&self) -> Option<&str> {
        self.attr(attrs::DATA_KEY)
    }

    pub fn is_controlled(&self) -> bool {
        self.has_attr(attrs::DATA_CONTROLLED)
    }

    pub fn ignores_children(&self) -> bool {
        self.has_attr(attrs::DATA_IGNORE_CHILDREN)
    }

    pub fn owner(&self) -> Option<ComponentId> {
        self.as_element().and_then(|el| el.owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_json_shape() {
        let node = PNode::element("DIV")
            .with_attr("class", "a")
            .with_child(PNode::text("hi"));
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "selector": "div",
                "attrs": {"class": "a"},
                "children": [{"text": "hi"}]
            })
        );
    }

    #[test]
    fn test_owner_is_not_serialized() {
        let mut node = PNode::element("p");
        node.as_element_mut().unwrap().owner = Some(ComponentId::new());
        let json = serde_json::to_string(&node).unwrap();
        assert_eq!(json, r#"{"selector":"p"}"#);
        let back: PNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back.owner(), None);
    }

    #[test]
    fn test_text_decodes_as_text() {
        let node: PNode = serde_json::from_str(r#"{"text":"x"}"#).unwrap();
        assert!(node.is_text());
        assert!(node.children().is_empty());
    }

    #[test]
    fn test_marker_helpers() {
        let id = ComponentId::new();
        let node = PNode::element("input")
            .with_attr(attrs::DATA_COMPONENT_ID, id.to_string())
            .with_attr(attrs::DATA_CONTROLLED, "")
            .with_attr(attrs::DATA_KEY, "k1");
        assert_eq!(node.component_id(), Some(id));
        assert!(node.is_controlled());
        assert_eq!(node.key(), Some("k1"));
        assert!(!node.ignores_children());
    }
}
