//! DOM attribute conventions shared by the reconciler and the morph engine.

/// Marks the outermost element of a root component.
pub const DATA_ROOT: &str = "data-root";

/// Carries the component id visible in the DOM.
pub const DATA_COMPONENT_ID: &str = "data-component-id";

/// Explicit reorder key for sibling matching.
pub const DATA_KEY: &str = "data-key";

/// Existing children of this element are never touched by a morph.
pub const DATA_IGNORE_CHILDREN: &str = "data-ignore-children";

/// The server, not the user, owns this form element's committed value.
pub const DATA_CONTROLLED: &str = "data-controlled";

const DATA_PREFIX: &str = "data-";
const CAPTURE_SUFFIX: &str = "-capture";

/// The marker attribute for a handler of `event_name` in the given phase,
/// e.g. `data-click` or `data-click-capture`.
pub fn event_attr(event_name: &str, capture: bool) -> String {
    if capture {
        format!("{DATA_PREFIX}{event_name}{CAPTURE_SUFFIX}")
    } else {
        format!("{DATA_PREFIX}{event_name}")
    }
}
