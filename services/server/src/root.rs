//! Root components and the context they render in.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;
use weft_id::{ComponentId, HandlerId};
use weft_protocol::{PNode, StateTree};

use crate::component::{ComponentRegistry, Instance, Props};
use crate::css::{AtomicCss, CssEngine};
use crate::render::handlers::HandlerEntry;
use crate::render::{render_instance, run_deferred, RenderJob, RenderTrigger};
use crate::report::ErrorReporter;
use crate::scope::{RenderOptions, Scope};
use crate::{DivergenceError, RegistryError, ServerError};

/// Collaborators shared by the roots of one page or connection.
#[derive(Clone)]
pub struct RootContext {
    pub components: Arc<ComponentRegistry>,
    pub css: Arc<dyn CssEngine>,
    pub reporter: Arc<ErrorReporter>,
    pub options: RenderOptions,
}

impl RootContext {
    pub fn new(components: Arc<ComponentRegistry>) -> Self {
        Self {
            components,
            css: Arc::new(AtomicCss::new()),
            reporter: Arc::new(ErrorReporter::default()),
            options: RenderOptions::default(),
        }
    }

    #[must_use]
    pub fn with_css(mut self, css: Arc<dyn CssEngine>) -> Self {
        self.css = css;
        self
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    fn scope(&self) -> Arc<Scope> {
        Scope::new(
            self.components.clone(),
            self.css.clone(),
            self.reporter.clone(),
            self.options.clone(),
        )
    }
}

impl fmt::Debug for RootContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootContext")
            .field("components", &self.components)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// A top-level component instance and the scope its subtree lives in.
#[derive(Clone)]
pub struct Root {
    instance: Instance,
}

impl Root {
    pub fn new(cx: &RootContext, name: &str, props: Props) -> Result<Self, RegistryError> {
        let scope = cx.scope();
        let descriptor = scope.components().get(name)?.clone();
        let instance = Instance::new(&descriptor, props, &scope);
        scope.set_root_id(instance.id());
        Ok(Self { instance })
    }

    /// Recreates a root from its snapshot under the id the client knows it
    /// by. Children are rehydrated by the first render.
    pub async fn rehydrate(
        cx: &RootContext,
        id: ComponentId,
        mut tree: StateTree,
    ) -> Result<Self, ServerError> {
        let scope = cx.scope();
        let descriptor = scope.components().get(&tree.name)?.clone();
        let instance = Instance::with_id(id, &descriptor, Props::new(), &scope);
        scope.set_root_id(id);

        let saved = std::mem::take(&mut tree.state);
        let reload = tree.reload;
        debug!(root_id = %id, instances = tree.instance_count(), reload, "Rehydrating root");
        instance.data().restore = Some(tree);
        instance.init_state(Some(saved), reload).await?;
        Ok(Self { instance })
    }

    pub fn id(&self) -> ComponentId {
        self.instance.id()
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Renders the whole tree. Nothing is sent anywhere.
    pub async fn render(&self) -> Result<Option<PNode>, ServerError> {
        let result = render_instance(&self.instance, RenderJob::acquire()).await;
        let deferred = run_deferred(self.scope()).await;
        let node = result?;
        deferred?;
        Ok(node)
    }

    /// Runs the initial mount pass.
    pub async fn mount(&self) -> Result<(), ServerError> {
        self.scope().mark_mounted();
        let result = self.instance.mount().await;
        let deferred = run_deferred(self.scope()).await;
        result.and(deferred)
    }

    /// Unmounts the tree and releases the scope.
    pub async fn unmount(&self) -> Result<(), ServerError> {
        self.scope().set_trigger(None);
        let result = self.instance.unmount().await;
        let deferred = run_deferred(self.scope()).await;
        self.scope().dispose();
        result.and(deferred)
    }

    /// Releases the scope without running unmount hooks.
    pub fn dispose(&self) {
        self.scope().dispose();
    }

    pub fn snapshot(&self) -> StateTree {
        self.instance.snapshot()
    }

    pub fn set_trigger(&self, trigger: Arc<dyn RenderTrigger>) {
        self.scope().set_trigger(Some(trigger));
    }

    pub fn lookup(&self, id: ComponentId) -> Option<Instance> {
        self.scope().lookup(id)
    }

    pub fn live_count(&self) -> usize {
        self.scope().live_count()
    }

    /// The id the DOM currently shows for `id`.
    pub fn resolve_visible(&self, id: ComponentId) -> Result<ComponentId, DivergenceError> {
        self.scope().resolve_visible(id)
    }

    /// The instance's most recently rendered node.
    pub fn node(&self, id: ComponentId) -> Option<PNode> {
        self.scope().node(id)
    }

    /// Every event name any render under this root has bound.
    pub fn event_names(&self) -> BTreeSet<String> {
        self.scope().event_names()
    }

    /// Finds a handler on the addressed instance or, when that instance's
    /// output is a nested component's element, further down the alias chain.
    pub(crate) fn find_handler(
        &self,
        component_id: ComponentId,
        handler_id: HandlerId,
    ) -> Option<(Instance, HandlerEntry)> {
        let scope = self.scope();
        let mut id = component_id;
        for _ in 0..=scope.live_count() {
            if let Some(instance) = scope.lookup(id) {
                if let Some(entry) = instance.handler(handler_id) {
                    return Some((instance, entry));
                }
            }
            id = scope.next_alias(id)?;
        }
        None
    }

    pub(crate) fn scope(&self) -> &Arc<Scope> {
        self.instance.scope()
    }
}

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Root")
            .field("instance", &self.instance)
            .field("scope", self.scope())
            .finish()
    }
}
