use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use tracing::warn;

use super::Callback;
use crate::State;

/// Inputs a parent hands to a child: plain values plus named callbacks.
#[derive(Clone, Default)]
pub struct Props {
    values: State,
    callbacks: BTreeMap<String, Callback>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_callback(mut self, name: impl Into<String>, callback: Callback) -> Self {
        self.callbacks.insert(name.into(), callback);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_i64)
    }

    pub fn callback(&self, name: &str) -> Option<&Callback> {
        self.callbacks.get(name)
    }

    pub fn values(&self) -> &State {
        &self.values
    }
}

impl From<State> for Props {
    fn from(values: State) -> Self {
        Self {
            values,
            callbacks: BTreeMap::new(),
        }
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("values", &self.values)
            .field("callbacks", &self.callbacks.keys().collect::<Vec<_>>())
            .finish()
    }
}

type Updater = Box<dyn FnOnce(&State) -> State + Send>;

/// A pending state mutation.
pub enum Changeset {
    /// Shallow-merged into the current state.
    Merge(State),
    /// Called with the state as left by earlier changesets in the same batch;
    /// its result is shallow-merged.
    Update(Updater),
}

impl Changeset {
    pub fn update<F>(f: F) -> Self
    where
        F: FnOnce(&State) -> State + Send + 'static,
    {
        Changeset::Update(Box::new(f))
    }

    pub(crate) fn apply(self, state: &mut State) {
        let patch = match self {
            Changeset::Merge(patch) => patch,
            Changeset::Update(f) => f(state),
        };
        for (key, value) in patch {
            state.insert(key, value);
        }
    }
}

impl From<State> for Changeset {
    fn from(patch: State) -> Self {
        Changeset::Merge(patch)
    }
}

impl From<Value> for Changeset {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(patch) => Changeset::Merge(patch),
            other => {
                warn!(value = %other, "Ignoring non-object state changeset");
                Changeset::Merge(State::new())
            }
        }
    }
}

impl fmt::Debug for Changeset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Changeset::Merge(patch) => f.debug_tuple("Merge").field(patch).finish(),
            Changeset::Update(_) => f.write_str("Update(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_is_shallow() {
        let mut state = json!({"a": 1, "nested": {"x": 1}})
            .as_object()
            .cloned()
            .unwrap();
        Changeset::from(json!({"nested": {"y": 2}})).apply(&mut state);
        assert_eq!(state["a"], json!(1));
        assert_eq!(state["nested"], json!({"y": 2}));
    }

    #[test]
    fn test_updater_sees_current_state() {
        let mut state = State::new();
        state.insert("n".into(), json!(1));
        Changeset::update(|s| {
            let n = s["n"].as_i64().unwrap_or_default();
            json!({"n": n + 1}).as_object().cloned().unwrap_or_default()
        })
        .apply(&mut state);
        assert_eq!(state["n"], json!(2));
    }

    #[test]
    fn test_non_object_changeset_is_ignored() {
        let mut state = State::new();
        Changeset::from(json!(5)).apply(&mut state);
        assert!(state.is_empty());
    }

    #[test]
    fn test_props_accessors() {
        let props = Props::new().with("label", "Save").with("count", 3);
        assert_eq!(props.get_str("label"), Some("Save"));
        assert_eq!(props.get_i64("count"), Some(3));
        assert!(props.callback("onSave").is_none());
    }
}
