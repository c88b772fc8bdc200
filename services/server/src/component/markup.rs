//! Render output.
//!
//! Components return a [`Markup`] tree mixing DOM elements, text, nested
//! components and fragments. The reconciler expands it into a
//! [`weft_protocol::PNode`] tree, allocating handler ids and component
//! instances along the way.

use std::collections::BTreeMap;

use weft_protocol::attrs;

use super::{Callback, ComponentType, Props};

#[derive(Debug, Clone, Default)]
pub enum Markup {
    /// Renders nothing.
    #[default]
    Empty,
    Text(String),
    Element(Box<El>),
    Component(ComponentMarkup),
    Fragment(Vec<Markup>),
}

impl Markup {
    pub fn text(text: impl Into<String>) -> Self {
        Markup::Text(text.into())
    }

    /// A nested component instance.
    pub fn component<C: ComponentType>(props: Props) -> Self {
        Markup::Component(ComponentMarkup {
            name: C::NAME.to_string(),
            props,
        })
    }

    /// A nested component looked up by registered name.
    pub fn named(name: impl Into<String>, props: Props) -> Self {
        Markup::Component(ComponentMarkup {
            name: name.into(),
            props,
        })
    }

    /// Stateless components are plain functions.
    pub fn stateless<F>(f: F, props: &Props) -> Self
    where
        F: FnOnce(&Props) -> Markup,
    {
        f(props)
    }

    pub fn fragment<I, M>(items: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<Markup>,
    {
        Markup::Fragment(items.into_iter().map(Into::into).collect())
    }
}

impl From<El> for Markup {
    fn from(el: El) -> Self {
        Markup::Element(Box::new(el))
    }
}

impl From<&str> for Markup {
    fn from(text: &str) -> Self {
        Markup::Text(text.to_string())
    }
}

impl From<String> for Markup {
    fn from(text: String) -> Self {
        Markup::Text(text)
    }
}

impl<M: Into<Markup>> From<Option<M>> for Markup {
    fn from(value: Option<M>) -> Self {
        value.map_or(Markup::Empty, Into::into)
    }
}

impl<M: Into<Markup>> From<Vec<M>> for Markup {
    fn from(items: Vec<M>) -> Self {
        Markup::fragment(items)
    }
}

#[derive(Debug, Clone)]
pub struct ComponentMarkup {
    pub(crate) name: String,
    pub(crate) props: Props,
}

#[derive(Debug, Clone)]
pub(crate) struct EventBinding {
    pub(crate) event_name: String,
    pub(crate) capture: bool,
    pub(crate) callback: Callback,
}

/// A DOM element under construction.
#[derive(Debug, Clone)]
pub struct El {
    pub(crate) tag: String,
    pub(crate) attrs: BTreeMap<String, String>,
    pub(crate) events: Vec<EventBinding>,
    pub(crate) css: Vec<String>,
    pub(crate) controlled: bool,
    pub(crate) select_value: Option<String>,
    pub(crate) children: Vec<Markup>,
}

impl El {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            events: Vec::new(),
            css: Vec::new(),
            controlled: false,
            select_value: None,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Sets or clears a boolean attribute.
    #[must_use]
    pub fn flag(mut self, name: impl Into<String>, on: bool) -> Self {
        let name = name.into();
        if on {
            self.attrs.insert(name, String::new());
        } else {
            self.attrs.remove(&name);
        }
        self
    }

    /// Appends to the `class` attribute.
    #[must_use]
    pub fn class(mut self, class: impl AsRef<str>) -> Self {
        append_class(&mut self.attrs, class.as_ref());
        self
    }

    /// Reorder key for sibling matching on the client.
    #[must_use]
    pub fn key(self, key: impl Into<String>) -> Self {
        self.attr(attrs::DATA_KEY, key)
    }

    /// The client never touches existing children of this element.
    #[must_use]
    pub fn ignore_children(self) -> Self {
        self.attr(attrs::DATA_IGNORE_CHILDREN, "")
    }

    /// Bubble-phase event handler.
    #[must_use]
    pub fn on(mut self, event_name: impl Into<String>, callback: Callback) -> Self {
        self.events.push(EventBinding {
            event_name: event_name.into(),
            capture: false,
            callback,
        });
        self
    }

    /// Capture-phase event handler.
    #[must_use]
    pub fn on_capture(mut self, event_name: impl Into<String>, callback: Callback) -> Self {
        self.events.push(EventBinding {
            event_name: event_name.into(),
            capture: true,
            callback,
        });
        self
    }

    /// Controlled value. On a `select` the matching option is marked selected.
    #[must_use]
    pub fn value(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        self.controlled = true;
        if self.tag == "select" {
            self.select_value = Some(value);
        } else {
            self.attrs.insert("value".to_string(), value);
        }
        self
    }

    /// Controlled checked state for checkboxes and radios.
    #[must_use]
    pub fn checked(mut self, checked: bool) -> Self {
        self.controlled = true;
        self.flag("checked", checked)
    }

    /// Controlled selection for an option.
    #[must_use]
    pub fn selected(mut self, selected: bool) -> Self {
        self.controlled = true;
        self.flag("selected", selected)
    }

    /// Atomic CSS declarations, e.g. `"color: red"`. Each becomes a generated
    /// class.
    #[must_use]
    pub fn css(mut self, declaration: impl Into<String>) -> Self {
        self.css.push(declaration.into());
        self
    }

    #[must_use]
    pub fn child(mut self, child: impl Into<Markup>) -> Self {
        self.children.push(child.into());
        self
    }

    #[must_use]
    pub fn children<I, M>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<Markup>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }
}

pub(crate) fn append_class(attrs: &mut BTreeMap<String, String>, class: &str) {
    if class.is_empty() {
        return;
    }
    match attrs.get_mut("class") {
        Some(existing) if !existing.is_empty() => {
            existing.push(' ');
            existing.push_str(class);
        }
        _ => {
            attrs.insert("class".to_string(), class.to_string());
        }
    }
}

pub fn el(tag: &str) -> El {
    El::new(tag)
}

macro_rules! tags {
    ($($name:ident),* $(,)?) => {
        $(
            pub fn $name() -> El {
                El::new(stringify!($name))
            }
        )*
    };
}

tags!(div, span, p, h1, h2, ul, li, form, input, button, label, select, option, textarea);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_appends() {
        let el = div().class("a").class("b");
        assert_eq!(el.attrs["class"], "a b");
    }

    #[test]
    fn test_controlled_value() {
        let el = input().value("hi");
        assert!(el.controlled);
        assert_eq!(el.attrs["value"], "hi");

        let el = select().value("b");
        assert_eq!(el.select_value.as_deref(), Some("b"));
        assert!(!el.attrs.contains_key("value"));
    }

    #[test]
    fn test_checked_flag() {
        let el = input().attr("type", "checkbox").checked(true);
        assert_eq!(el.attrs["checked"], "");
        let el = el.checked(false);
        assert!(!el.attrs.contains_key("checked"));
    }

    #[test]
    fn test_option_markup_flattens() {
        let some: Markup = Some(span()).into();
        assert!(matches!(some, Markup::Element(_)));
        let none: Markup = Option::<El>::None.into();
        assert!(matches!(none, Markup::Empty));
    }
}
