//! State shared by every instance under one root.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use weft_id::ComponentId;
use weft_protocol::PNode;

use crate::component::{ComponentRegistry, Instance};
use crate::css::CssEngine;
use crate::render::{Followups, RenderTrigger};
use crate::report::ErrorReporter;
use crate::{lock, DivergenceError};

/// Default time a handler id stays dispatchable after the render that
/// dropped it.
pub const DEFAULT_HANDLER_GRACE: Duration = Duration::from_secs(10);

/// Knobs for the reconciler.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub handler_grace: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            handler_grace: DEFAULT_HANDLER_GRACE,
        }
    }
}

/// Superseded-id edges created when a component's output root is a nested
/// component's element.
///
/// An edge `outer -> inner` says the DOM shows `inner`'s id where `outer`'s
/// would be. Edges never form cycles; resolution is bounded regardless.
#[derive(Debug, Default)]
pub(crate) struct AliasMap {
    edges: HashMap<ComponentId, ComponentId>,
}

impl AliasMap {
    pub(crate) fn insert(&mut self, from: ComponentId, to: ComponentId) -> Result<(), DivergenceError> {
        if from == to {
            self.edges.remove(&from);
            return Ok(());
        }
        if self.resolve(to)? == from {
            return Err(DivergenceError::AliasCycle(from));
        }
        self.edges.insert(from, to);
        Ok(())
    }

    pub(crate) fn remove(&mut self, from: &ComponentId) {
        self.edges.remove(from);
    }

    pub(crate) fn next(&self, id: &ComponentId) -> Option<ComponentId> {
        self.edges.get(id).copied()
    }

    /// Follows edges to the id currently visible in the DOM.
    pub(crate) fn resolve(&self, id: ComponentId) -> Result<ComponentId, DivergenceError> {
        let mut current = id;
        for _ in 0..=self.edges.len() {
            match self.edges.get(&current) {
                Some(next) => current = *next,
                None => return Ok(current),
            }
        }
        Err(DivergenceError::AliasCycle(id))
    }

    /// Whether `id` is `from` or lies on the edge chain leaving it.
    pub(crate) fn reaches(&self, from: ComponentId, id: ComponentId) -> bool {
        let mut current = from;
        for _ in 0..=self.edges.len() {
            if current == id {
                return true;
            }
            match self.edges.get(&current) {
                Some(next) => current = *next,
                None => return false,
            }
        }
        false
    }

    fn clear(&mut self) {
        self.edges.clear();
    }
}

/// Per-root registry of live instances, alias edges, rendered nodes and
/// accumulated event names.
pub(crate) struct Scope {
    components: Arc<ComponentRegistry>,
    css: Arc<dyn CssEngine>,
    reporter: Arc<ErrorReporter>,
    options: RenderOptions,
    root_id: OnceLock<ComponentId>,
    live: Mutex<HashMap<ComponentId, Instance>>,
    aliases: Mutex<AliasMap>,
    nodes: Mutex<HashMap<ComponentId, PNode>>,
    event_names: Mutex<BTreeSet<String>>,
    trigger: Mutex<Option<Arc<dyn RenderTrigger>>>,
    deferred: Mutex<Followups>,
    mounted: AtomicBool,
}

impl Scope {
    pub(crate) fn new(
        components: Arc<ComponentRegistry>,
        css: Arc<dyn CssEngine>,
        reporter: Arc<ErrorReporter>,
        options: RenderOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            components,
            css,
            reporter,
            options,
            root_id: OnceLock::new(),
            live: Mutex::new(HashMap::new()),
            aliases: Mutex::new(AliasMap::default()),
            nodes: Mutex::new(HashMap::new()),
            event_names: Mutex::new(BTreeSet::new()),
            trigger: Mutex::new(None),
            deferred: Mutex::new(Followups::default()),
            mounted: AtomicBool::new(false),
        })
    }

    pub(crate) fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    pub(crate) fn css(&self) -> &dyn CssEngine {
        self.css.as_ref()
    }

    pub(crate) fn reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    pub(crate) fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub(crate) fn set_root_id(&self, id: ComponentId) {
        let _ = self.root_id.set(id);
    }

    pub(crate) fn root_id(&self) -> Option<ComponentId> {
        self.root_id.get().copied()
    }

    /// Whether `id`'s element is where the root shows in the DOM, either as
    /// the root itself or as a component the root directly nests.
    pub(crate) fn carries_root(&self, id: ComponentId) -> bool {
        match self.root_id.get() {
            Some(root) => lock(&self.aliases).reaches(*root, id),
            None => false,
        }
    }

    pub(crate) fn register(&self, instance: &Instance) {
        lock(&self.live).insert(instance.id(), instance.clone());
    }

    pub(crate) fn deregister(&self, id: ComponentId) {
        lock(&self.live).remove(&id);
        lock(&self.nodes).remove(&id);
        lock(&self.aliases).remove(&id);
    }

    pub(crate) fn lookup(&self, id: ComponentId) -> Option<Instance> {
        lock(&self.live).get(&id).cloned()
    }

    pub(crate) fn live_count(&self) -> usize {
        lock(&self.live).len()
    }

    pub(crate) fn set_alias(&self, from: ComponentId, to: ComponentId) -> Result<(), DivergenceError> {
        lock(&self.aliases).insert(from, to)
    }

    pub(crate) fn clear_alias(&self, from: ComponentId) {
        lock(&self.aliases).remove(&from);
    }

    pub(crate) fn next_alias(&self, id: ComponentId) -> Option<ComponentId> {
        lock(&self.aliases).next(&id)
    }

    pub(crate) fn resolve_visible(&self, id: ComponentId) -> Result<ComponentId, DivergenceError> {
        lock(&self.aliases).resolve(id)
    }

    pub(crate) fn store_node(&self, id: ComponentId, node: Option<PNode>) {
        let mut nodes = lock(&self.nodes);
        match node {
            Some(node) => {
                nodes.insert(id, node);
            }
            None => {
                nodes.remove(&id);
            }
        }
    }

    pub(crate) fn node(&self, id: ComponentId) -> Option<PNode> {
        lock(&self.nodes).get(&id).cloned()
    }

    pub(crate) fn add_event_names(&self, names: impl IntoIterator<Item = String>) {
        lock(&self.event_names).extend(names);
    }

    pub(crate) fn event_names(&self) -> BTreeSet<String> {
        lock(&self.event_names).clone()
    }

    pub(crate) fn trigger(&self) -> Option<Arc<dyn RenderTrigger>> {
        lock(&self.trigger).clone()
    }

    pub(crate) fn set_trigger(&self, trigger: Option<Arc<dyn RenderTrigger>>) {
        *lock(&self.trigger) = trigger;
    }

    pub(crate) fn defer_mount(&self, instance: Instance) {
        lock(&self.deferred).defer_mount(instance);
    }

    pub(crate) fn defer_unmount(&self, instances: impl IntoIterator<Item = Instance>) {
        lock(&self.deferred).defer_unmount(instances);
    }

    pub(crate) fn take_deferred(&self) -> Followups {
        std::mem::take(&mut *lock(&self.deferred))
    }

    pub(crate) fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_mounted(&self) {
        self.mounted.store(true, Ordering::SeqCst);
    }

    /// Drops every live reference without running hooks.
    pub(crate) fn dispose(&self) {
        lock(&self.live).clear();
        lock(&self.nodes).clear();
        lock(&self.aliases).clear();
        *lock(&self.trigger) = None;
        *lock(&self.deferred) = Followups::default();
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("root_id", &self.root_id.get())
            .field("live", &self.live_count())
            .field("mounted", &self.is_mounted())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_resolution_follows_chain() {
        let (a, b, c) = (ComponentId::new(), ComponentId::new(), ComponentId::new());
        let mut aliases = AliasMap::default();
        aliases.insert(a, b).unwrap();
        aliases.insert(b, c).unwrap();
        assert_eq!(aliases.resolve(a).unwrap(), c);
        assert_eq!(aliases.resolve(c).unwrap(), c);
    }

    #[test]
    fn test_alias_cycle_rejected() {
        let (a, b) = (ComponentId::new(), ComponentId::new());
        let mut aliases = AliasMap::default();
        aliases.insert(a, b).unwrap();
        assert_eq!(aliases.insert(b, a), Err(DivergenceError::AliasCycle(b)));
        assert_eq!(aliases.resolve(a).unwrap(), b);
    }

    #[test]
    fn test_self_alias_clears_edge() {
        let (a, b) = (ComponentId::new(), ComponentId::new());
        let mut aliases = AliasMap::default();
        aliases.insert(a, b).unwrap();
        aliases.insert(a, a).unwrap();
        assert_eq!(aliases.resolve(a).unwrap(), a);
    }

    #[test]
    fn test_reaches_walks_from_outer_only() {
        let (a, b, c, d) = (
            ComponentId::new(),
            ComponentId::new(),
            ComponentId::new(),
            ComponentId::new(),
        );
        let mut aliases = AliasMap::default();
        aliases.insert(a, b).unwrap();
        aliases.insert(b, c).unwrap();

        assert!(aliases.reaches(a, a));
        assert!(aliases.reaches(a, b));
        assert!(aliases.reaches(a, c));
        assert!(!aliases.reaches(b, a));
        assert!(!aliases.reaches(a, d));
    }
}
