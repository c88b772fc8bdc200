//! HTML serialization of node trees, used for the initial page render.

use crate::{PNode, ProtocolError};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Serializes a node tree to HTML, validating tag and attribute names and
/// escaping all content.
pub fn to_html(node: &PNode) -> Result<String, ProtocolError> {
    let mut out = String::new();
    write_node(node, &mut out)?;
    Ok(out)
}

fn write_node(node: &PNode, out: &mut String) -> Result<(), ProtocolError> {
    match node {
        PNode::Text { text } => {
            escape_text(text, out);
            Ok(())
        }
        PNode::Element(el) => {
            if !is_valid_tag_name(&el.selector) {
                return Err(ProtocolError::InvalidTagName(el.selector.clone()));
            }
            out.push('<');
            out.push_str(&el.selector);
            for (name, value) in &el.attrs {
                if !is_valid_attribute_name(name) {
                    return Err(ProtocolError::InvalidAttributeName {
                        tag: el.selector.clone(),
                        name: name.clone(),
                    });
                }
                out.push(' ');
                out.push_str(name);
                if !value.is_empty() {
                    out.push_str("=\"");
                    escape_attribute(value, out);
                    out.push('"');
                }
            }
            out.push('>');

            if VOID_ELEMENTS.contains(&el.selector.as_str()) {
                if !el.children.is_empty() {
                    return Err(ProtocolError::VoidElementChildren(el.selector.clone()));
                }
                return Ok(());
            }

            for child in &el.children {
                write_node(child, out)?;
            }
            out.push_str("</");
            out.push_str(&el.selector);
            out.push('>');
            Ok(())
        }
    }
}

fn is_valid_tag_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_valid_attribute_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| {
            !c.is_whitespace()
                && !c.is_control()
                && !matches!(c, '"' | '\'' | '>' | '/' | '=' | '<')
        })
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}
