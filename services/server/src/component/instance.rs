use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::{join_all, BoxFuture};
use tokio::time::Instant;
use tracing::{debug, warn};
use weft_id::{ComponentId, HandlerId};
use weft_protocol::StateTree;

use super::{Changeset, Component, ComponentDescriptor, Props};
use crate::render::handlers::{HandlerEntry, HandlerTable};
use crate::render::run_deferred;
use crate::scope::Scope;
use crate::{lock, LifecycleError, ServerError, State};

/// Mutations tolerated on an unmounted instance before `set_state` fails.
pub const STRAY_MUTATION_LIMIT: u32 = 10;

/// Child instances keyed by structural position, in render order per key.
pub(crate) type ChildMap = BTreeMap<String, VecDeque<Instance>>;

pub(crate) struct InstanceData {
    pub(crate) props: Props,
    pub(crate) state: State,
    pub(crate) children: ChildMap,
    pub(crate) handlers: HandlerTable,
    pub(crate) pending: VecDeque<Changeset>,
    /// Snapshot consulted by the first render after rehydration.
    pub(crate) restore: Option<StateTree>,
}

struct InstanceInner {
    id: ComponentId,
    name: Arc<str>,
    component: Box<dyn Component>,
    scope: Arc<Scope>,
    /// Serializes state application, renders, mount and unmount. Always taken
    /// parent before child.
    lock: tokio::sync::Mutex<()>,
    data: Mutex<InstanceData>,
    mounted: AtomicBool,
    unmounted: AtomicBool,
    directly_nests: AtomicBool,
    stray_mutations: AtomicU32,
}

/// A live component instance. Cheap to clone; clones share the instance.
#[derive(Clone)]
pub struct Instance {
    inner: Arc<InstanceInner>,
}

impl Instance {
    pub(crate) fn new(descriptor: &ComponentDescriptor, props: Props, scope: &Arc<Scope>) -> Self {
        Self::with_id(ComponentId::new(), descriptor, props, scope)
    }

    pub(crate) fn with_id(
        id: ComponentId,
        descriptor: &ComponentDescriptor,
        props: Props,
        scope: &Arc<Scope>,
    ) -> Self {
        let component = descriptor.create(&props);
        let state = component.initial_state(&props);
        let instance = Self {
            inner: Arc::new(InstanceInner {
                id,
                name: descriptor.shared_name(),
                component,
                scope: scope.clone(),
                lock: tokio::sync::Mutex::new(()),
                data: Mutex::new(InstanceData {
                    props,
                    state,
                    children: ChildMap::new(),
                    handlers: HandlerTable::default(),
                    pending: VecDeque::new(),
                    restore: None,
                }),
                mounted: AtomicBool::new(false),
                unmounted: AtomicBool::new(false),
                directly_nests: AtomicBool::new(false),
                stray_mutations: AtomicU32::new(0),
            }),
        };
        scope.register(&instance);
        debug!(component_id = %id, component = %descriptor.name(), "Instance created");
        instance
    }

    pub fn id(&self) -> ComponentId {
        self.inner.id
    }

    /// The registered component name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> State {
        self.data().state.clone()
    }

    pub fn props(&self) -> Props {
        self.data().props.clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.load(Ordering::SeqCst)
    }

    pub fn is_unmounted(&self) -> bool {
        self.inner.unmounted.load(Ordering::SeqCst)
    }

    /// True while this instance's rendered root is a nested component's
    /// element rather than one of its own.
    pub fn directly_nests(&self) -> bool {
        self.inner.directly_nests.load(Ordering::SeqCst)
    }

    /// Current children, in structural-key order.
    pub fn children(&self) -> Vec<Instance> {
        self.data().children.values().flatten().cloned().collect()
    }

    /// Queues a state change and applies it.
    ///
    /// The changeset is queued before this returns; the returned future
    /// yields once so that every change queued in the same tick lands in one
    /// batch, then applies the batch and re-renders at most once.
    pub fn set_state(
        &self,
        change: impl Into<Changeset>,
    ) -> impl Future<Output = Result<(), ServerError>> + Send + 'static {
        let this = self.clone();
        let stray = if self.is_unmounted() {
            Some(self.stray_mutation())
        } else {
            self.data().pending.push_back(change.into());
            None
        };
        async move {
            if let Some(stray) = stray {
                return stray.map_err(ServerError::from);
            }
            tokio::task::yield_now().await;
            this.apply_pending().await
        }
    }

    /// `set_state` with an updater that sees the state as left by earlier
    /// changes in the same batch.
    pub fn update_state<F>(
        &self,
        f: F,
    ) -> impl Future<Output = Result<(), ServerError>> + Send + 'static
    where
        F: FnOnce(&State) -> State + Send + 'static,
    {
        self.set_state(Changeset::update(f))
    }

    fn stray_mutation(&self) -> Result<(), LifecycleError> {
        let attempts = self.inner.stray_mutations.fetch_add(1, Ordering::SeqCst) + 1;
        if attempts > STRAY_MUTATION_LIMIT {
            warn!(component_id = %self.id(), attempts, "State mutated after unmount");
            return Err(LifecycleError::StrayMutation {
                component_id: self.id(),
                attempts,
            });
        }
        debug!(component_id = %self.id(), attempts, "Ignoring state change after unmount");
        Ok(())
    }

    async fn apply_pending(&self) -> Result<(), ServerError> {
        {
            let _guard = self.inner.lock.lock().await;
            if self.is_unmounted() {
                self.data().pending.clear();
                return Ok(());
            }

            let (pending, mut state) = {
                let mut data = self.data();
                if data.pending.is_empty() {
                    return Ok(());
                }
                let pending: Vec<Changeset> = data.pending.drain(..).collect();
                (pending, data.state.clone())
            };
            let batch = pending.len();
            let before = state.clone();
            for change in pending {
                change.apply(&mut state);
            }
            if state == before {
                debug!(component_id = %self.id(), batch, "State unchanged");
                return Ok(());
            }
            self.data().state = state;
            debug!(component_id = %self.id(), batch, "State applied");

            if let Some(trigger) = self.scope().trigger() {
                trigger.rerender(self).await?;
            }
        }
        run_deferred(self.scope()).await
    }

    /// Marks this subtree mounted and runs `did_mount` hooks, children first.
    pub fn mount(&self) -> BoxFuture<'_, Result<(), ServerError>> {
        Box::pin(async move {
            let children = {
                let _guard = self.inner.lock.lock().await;
                if self.is_unmounted() || self.inner.mounted.swap(true, Ordering::SeqCst) {
                    return Ok(());
                }
                self.children()
            };

            let mut first_err = None;
            for result in join_all(children.iter().map(Instance::mount)).await {
                if let Err(err) = result {
                    first_err.get_or_insert(err);
                }
            }
            if let Err(err) = self.run_did_mount().await {
                first_err.get_or_insert(err);
            }
            first_err.map_or(Ok(()), Err)
        })
    }

    /// Mounts an instance created by a re-render after the root had mounted.
    /// Its descendants are mounted by their own entries.
    pub(crate) async fn mount_fresh(&self) -> Result<(), ServerError> {
        if self.is_unmounted() || self.inner.mounted.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.run_did_mount().await
    }

    async fn run_did_mount(&self) -> Result<(), ServerError> {
        debug!(component_id = %self.id(), component = %self.name(), "Mounted");
        match self.inner.component.did_mount(self).await {
            Ok(()) => Ok(()),
            Err(err) => self.scope().reporter().report(err),
        }
    }

    /// Unmounts children, runs `will_unmount` and deregisters the instance.
    ///
    /// Deregistration happens even when a child's or this instance's hook
    /// fails; the first failure is returned.
    pub fn unmount(&self) -> BoxFuture<'_, Result<(), ServerError>> {
        Box::pin(async move {
            let children: Vec<Instance> = {
                let _guard = self.inner.lock.lock().await;
                if self.inner.unmounted.swap(true, Ordering::SeqCst) {
                    return Ok(());
                }
                let mut data = self.data();
                data.pending.clear();
                data.restore = None;
                std::mem::take(&mut data.children)
                    .into_values()
                    .flatten()
                    .collect()
            };

            let mut first_err = None;
            for result in join_all(children.iter().map(Instance::unmount)).await {
                if let Err(err) = result {
                    first_err.get_or_insert(err);
                }
            }

            if self.is_mounted() {
                if let Err(err) = self.inner.component.will_unmount(self).await {
                    if let Err(err) = self.scope().reporter().report(err) {
                        first_err.get_or_insert(err);
                    }
                }
            }

            self.data().handlers = HandlerTable::default();
            self.scope().deregister(self.id());
            debug!(component_id = %self.id(), component = %self.name(), "Unmounted");
            first_err.map_or(Ok(()), Err)
        })
    }

    /// Computes initial state, re-running the async supplier when `reload`
    /// is set, and merges `saved` on top.
    pub(crate) async fn init_state(&self, saved: Option<State>, reload: bool) -> Result<(), ServerError> {
        let props = self.props();
        let mut state = self.state();
        if reload {
            match self.inner.component.reload_state(&props).await {
                Ok(Some(fresh)) => state = fresh,
                Ok(None) => {}
                Err(err) => self.scope().reporter().report(err)?,
            }
        }
        if let Some(saved) = saved {
            state.extend(saved);
        }
        self.data().state = state;
        Ok(())
    }

    /// Serializable mirror of this subtree.
    pub fn snapshot(&self) -> StateTree {
        let (state, children) = {
            let data = self.data();
            let children: Vec<(String, Vec<Instance>)> = data
                .children
                .iter()
                .map(|(key, list)| (key.clone(), list.iter().cloned().collect()))
                .collect();
            (data.state.clone(), children)
        };
        let mut tree = StateTree::new(self.name(), state);
        for (key, list) in children {
            tree.child_map
                .insert(key, list.iter().map(Instance::snapshot).collect());
        }
        tree
    }

    pub(crate) fn handler(&self, id: HandlerId) -> Option<HandlerEntry> {
        self.data().handlers.lookup(id, Instant::now()).cloned()
    }

    pub(crate) fn component(&self) -> &dyn Component {
        self.inner.component.as_ref()
    }

    pub(crate) fn scope(&self) -> &Arc<Scope> {
        &self.inner.scope
    }

    pub(crate) async fn acquire(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.inner.lock.lock().await
    }

    pub(crate) fn data(&self) -> MutexGuard<'_, InstanceData> {
        lock(&self.inner.data)
    }

    pub(crate) fn set_directly_nests(&self, nests: bool) {
        self.inner.directly_nests.store(nests, Ordering::SeqCst);
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("mounted", &self.is_mounted())
            .field("unmounted", &self.is_unmounted())
            .finish()
    }
}
