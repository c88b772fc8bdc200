//! The reconciler: expands an instance's [`Markup`] into a [`PNode`] tree.
//!
//! A render pass runs in three phases under the instance's lock:
//!
//! 1. Walk the markup synchronously. Nested components are matched against
//!    the previous child map by structural key (reused first-in-first-out),
//!    created fresh, or rehydrated from a snapshot, and their slot in the new
//!    child map is reserved in render order. Event handlers get ids and
//!    marker attributes; style declarations become atomic classes.
//! 2. Render every child concurrently, each under its own lock.
//! 3. Assemble the node tree, stamp the root element, store it in the scope's
//!    node arena and retire children that were not rendered again.
//!
//! Mount and unmount hooks never run under a lock. Work they need is queued
//! on the scope and drained by whoever releases the outermost lock.

pub(crate) mod handlers;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::{join_all, BoxFuture};
use tokio::time::Instant;
use tracing::{debug, instrument};
use weft_protocol::{attrs, PElement, PNode};

use crate::component::markup::{append_class, El};
use crate::component::{ChildMap, Instance, Markup, Props, RenderCx};
use crate::scope::Scope;
use crate::{DivergenceError, ServerError, State};

use handlers::HandlerTableBuilder;

/// Invoked after a batch of state changes altered an instance's state.
///
/// Called while the instance's lock is held, so implementations must not
/// wait on `set_state` of the same instance or any of its ancestors.
#[async_trait]
pub trait RenderTrigger: Send + Sync {
    async fn rerender(&self, instance: &Instance) -> Result<(), ServerError>;
}

/// Lifecycle work queued by renders, run once no instance lock is held.
#[derive(Debug, Default)]
pub(crate) struct Followups {
    mount: Vec<Instance>,
    unmount: Vec<Instance>,
}

impl Followups {
    pub(crate) fn defer_mount(&mut self, instance: Instance) {
        self.mount.push(instance);
    }

    pub(crate) fn defer_unmount(&mut self, instances: impl IntoIterator<Item = Instance>) {
        self.unmount.extend(instances);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.mount.is_empty() && self.unmount.is_empty()
    }
}

/// Runs queued unmounts, then queued mounts in the order they were queued.
pub(crate) async fn run_deferred(scope: &Scope) -> Result<(), ServerError> {
    let followups = scope.take_deferred();
    if followups.is_empty() {
        return Ok(());
    }

    let mut first_err = None;
    for instance in &followups.unmount {
        if let Err(err) = instance.unmount().await {
            first_err.get_or_insert(err);
        }
    }
    for instance in &followups.mount {
        if let Err(err) = instance.mount_fresh().await {
            first_err.get_or_insert(err);
        }
    }
    first_err.map_or(Ok(()), Err)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Locking {
    Acquire,
    /// The caller already holds the instance's lock.
    Held,
}

#[derive(Debug)]
struct Init {
    saved: Option<State>,
    reload: bool,
}

pub(crate) struct RenderJob {
    props: Option<Props>,
    init: Option<Init>,
    locking: Locking,
}

impl RenderJob {
    pub(crate) fn acquire() -> Self {
        Self {
            props: None,
            init: None,
            locking: Locking::Acquire,
        }
    }

    pub(crate) fn held() -> Self {
        Self {
            locking: Locking::Held,
            ..Self::acquire()
        }
    }
}

/// Renders one instance and its subtree.
///
/// Returns `None` when the component rendered nothing or its render failed
/// and the failure was contained by the error hook.
pub(crate) fn render_instance(
    instance: &Instance,
    job: RenderJob,
) -> BoxFuture<'_, Result<Option<PNode>, ServerError>> {
    Box::pin(async move {
        let _guard = match job.locking {
            Locking::Acquire => Some(instance.acquire().await),
            Locking::Held => None,
        };
        if instance.is_unmounted() {
            return Ok(None);
        }
        render_locked(instance, job).await
    })
}

#[instrument(level = "debug", skip_all, fields(component_id = %instance.id(), component = %instance.name()))]
async fn render_locked(instance: &Instance, job: RenderJob) -> Result<Option<PNode>, ServerError> {
    let scope = instance.scope().clone();
    if let Some(props) = job.props {
        instance.data().props = props;
    }
    if let Some(init) = job.init {
        instance.init_state(init.saved, init.reload).await?;
    }

    let (props, state) = {
        let data = instance.data();
        (data.props.clone(), data.state.clone())
    };
    let rendered = {
        let mut cx = RenderCx {
            instance,
            props: &props,
            state: &state,
        };
        instance.component().render(&mut cx)
    };
    let markup = match rendered {
        Ok(markup) => markup,
        Err(err) => {
            scope.reporter().report(err)?;
            return Ok(None);
        }
    };

    let (previous, handlers, restore) = {
        let mut data = instance.data();
        (
            std::mem::take(&mut data.children),
            std::mem::take(&mut data.handlers),
            data.restore.take(),
        )
    };
    let mut planner = Planner {
        scope: &scope,
        previous,
        next: ChildMap::new(),
        restore,
        handlers: handlers.rebuild(),
        children: Vec::new(),
        event_names: BTreeSet::new(),
    };
    let mut plan = Vec::new();
    let planned = planner.plan(markup, "", &mut plan);
    let Planner {
        previous,
        next,
        handlers,
        children,
        event_names,
        ..
    } = planner;

    {
        let mut data = instance.data();
        data.children = next;
        data.handlers = handlers.finish(Instant::now(), scope.options().handler_grace);
        if planned.is_err() {
            // Children the failed walk never reached stay attached.
            for (key, list) in previous {
                data.children.entry(key).or_default().extend(list);
            }
            return planned.map(|()| None);
        }
    }
    scope.defer_unmount(previous.into_values().flatten());
    scope.add_event_names(event_names);

    let results = join_all(children.into_iter().map(|slot| async move {
        let job = RenderJob {
            props: Some(slot.props),
            init: slot.init,
            locking: Locking::Acquire,
        };
        let result = render_instance(&slot.instance, job).await;
        (slot.instance, slot.fresh, result)
    }))
    .await;

    let mut rendered = Vec::with_capacity(results.len());
    let mut visible = Vec::with_capacity(results.len());
    let mut first_err = None;
    for (child, fresh, result) in results {
        if fresh && scope.is_mounted() {
            scope.defer_mount(child.clone());
        }
        match result {
            Ok(node) => rendered.push(node),
            Err(err) => {
                first_err.get_or_insert(err);
                rendered.push(None);
            }
        }
        visible.push(child);
    }
    if let Some(err) = first_err {
        return Err(err);
    }

    let mut roots: Vec<(PNode, Option<usize>)> = plan
        .into_iter()
        .filter_map(|node| {
            let origin = match &node {
                PlanNode::Child(index) => Some(*index),
                _ => None,
            };
            build(node, &mut rendered).map(|node| (node, origin))
        })
        .collect();

    let node = match roots.len() {
        0 => {
            instance.set_directly_nests(false);
            scope.clear_alias(instance.id());
            None
        }
        1 => {
            let (node, origin) = roots.remove(0);
            let nested = origin.map(|index| &visible[index]);
            Some(stamp_root(instance, &scope, node, nested)?)
        }
        count => {
            return Err(DivergenceError::NotExactlyOneRoot {
                component: instance.name().to_string(),
                count,
            }
            .into())
        }
    };

    scope.store_node(instance.id(), node.clone());
    debug!(children = visible.len(), "Rendered");
    Ok(node)
}

fn stamp_root(
    instance: &Instance,
    scope: &Scope,
    mut node: PNode,
    nested: Option<&Instance>,
) -> Result<PNode, ServerError> {
    let id = instance.id();
    let Some(el) = node.as_element_mut() else {
        return Err(DivergenceError::TextRoot {
            component: instance.name().to_string(),
        }
        .into());
    };

    match nested {
        Some(child) => {
            instance.set_directly_nests(true);
            let visible = scope.resolve_visible(child.id())?;
            scope.set_alias(id, visible)?;
        }
        None => {
            instance.set_directly_nests(false);
            scope.clear_alias(id);
            el.attrs
                .insert(attrs::DATA_COMPONENT_ID.to_string(), id.to_string());
        }
    }
    // A component the root directly nests renders the root's element, so
    // its own updates must keep the marker too.
    if scope.carries_root(id) {
        if let Some(root) = scope.root_id() {
            el.attrs.insert(attrs::DATA_ROOT.to_string(), root.to_string());
        }
    }
    el.owner = Some(id);
    Ok(node)
}

enum PlanNode {
    Text(String),
    Element(PlannedElement),
    Child(usize),
}

struct PlannedElement {
    tag: String,
    attrs: std::collections::BTreeMap<String, String>,
    children: Vec<PlanNode>,
}

struct ChildSlot {
    instance: Instance,
    props: Props,
    init: Option<Init>,
    fresh: bool,
}

struct Planner<'a> {
    scope: &'a Arc<Scope>,
    previous: ChildMap,
    next: ChildMap,
    restore: Option<weft_protocol::StateTree>,
    handlers: HandlerTableBuilder,
    children: Vec<ChildSlot>,
    event_names: BTreeSet<String>,
}

impl Planner<'_> {
    fn plan(&mut self, markup: Markup, path: &str, out: &mut Vec<PlanNode>) -> Result<(), ServerError> {
        match markup {
            Markup::Empty => {}
            Markup::Text(text) => out.push(PlanNode::Text(text)),
            Markup::Fragment(items) => {
                for item in items {
                    self.plan(item, path, out)?;
                }
            }
            Markup::Component(component) => {
                let key = format!("{path}/{}", component.name);
                let index = self.place_child(key, component.name, component.props)?;
                out.push(PlanNode::Child(index));
            }
            Markup::Element(el) => {
                let planned = self.plan_element(*el, path)?;
                out.push(PlanNode::Element(planned));
            }
        }
        Ok(())
    }

    fn place_child(&mut self, key: String, name: String, props: Props) -> Result<usize, ServerError> {
        let descriptor = self.scope.components().get(&name)?.clone();

        let reused = self.previous.get_mut(&key).and_then(|list| list.pop_front());
        let (instance, init, fresh) = match reused {
            Some(instance) => (instance, None, false),
            None => {
                let instance = Instance::new(&descriptor, props.clone(), self.scope);
                let snapshot = self
                    .restore
                    .as_mut()
                    .and_then(|tree| tree.take_child(&key, &name));
                let init = snapshot.map(|mut tree| {
                    let init = Init {
                        saved: Some(std::mem::take(&mut tree.state)),
                        reload: tree.reload,
                    };
                    instance.data().restore = Some(tree);
                    init
                });
                (instance, init, true)
            }
        };

        self.next
            .entry(key)
            .or_default()
            .push_back(instance.clone());
        self.children.push(ChildSlot {
            instance,
            props,
            init,
            fresh,
        });
        Ok(self.children.len() - 1)
    }

    fn plan_element(&mut self, el: El, path: &str) -> Result<PlannedElement, ServerError> {
        let El {
            tag,
            mut attrs,
            events,
            css,
            controlled,
            select_value,
            children,
        } = el;

        for binding in &events {
            let id = self.handlers.bind(binding);
            attrs.insert(
                attrs::event_attr(&binding.event_name, binding.capture),
                id.to_string(),
            );
            self.event_names.insert(binding.event_name.clone());
        }
        if controlled {
            attrs.insert(attrs::DATA_CONTROLLED.to_string(), String::new());
        }
        if !css.is_empty() {
            let classes = self.scope.css().classes_for(&css);
            append_class(&mut attrs, &classes.join(" "));
        }

        let child_path = format!("{path}/{tag}");
        let mut planned_children = Vec::with_capacity(children.len());
        for child in children {
            self.plan(child, &child_path, &mut planned_children)?;
        }

        if tag == "select" {
            if let Some(value) = &select_value {
                for child in &mut planned_children {
                    select_option(child, value);
                }
            }
            if planned_children.iter().any(has_controlled_option) {
                attrs.insert(attrs::DATA_CONTROLLED.to_string(), String::new());
            }
        }

        Ok(PlannedElement {
            tag,
            attrs,
            children: planned_children,
        })
    }
}

/// Marks options matching `value` selected and clears the rest.
fn select_option(node: &mut PlanNode, value: &str) {
    let PlanNode::Element(el) = node else {
        return;
    };
    match el.tag.as_str() {
        "option" => {
            let option_value = match el.attrs.get("value") {
                Some(v) => v.clone(),
                None => text_content(&el.children),
            };
            if option_value == value {
                el.attrs.insert("selected".to_string(), String::new());
            } else {
                el.attrs.remove("selected");
            }
        }
        "optgroup" => {
            for child in &mut el.children {
                select_option(child, value);
            }
        }
        _ => {}
    }
}

fn has_controlled_option(node: &PlanNode) -> bool {
    match node {
        PlanNode::Element(el) if el.tag == "option" => el.attrs.contains_key(attrs::DATA_CONTROLLED),
        PlanNode::Element(el) if el.tag == "optgroup" => el.children.iter().any(has_controlled_option),
        _ => false,
    }
}

fn text_content(nodes: &[PlanNode]) -> String {
    nodes
        .iter()
        .filter_map(|node| match node {
            PlanNode::Text(text) => Some(text.as_str()),
            _ => None,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

fn build(node: PlanNode, rendered: &mut [Option<PNode>]) -> Option<PNode> {
    match node {
        PlanNode::Text(text) => Some(PNode::text(text)),
        PlanNode::Child(index) => rendered.get_mut(index).and_then(Option::take),
        PlanNode::Element(el) => {
            let children = el
                .children
                .into_iter()
                .filter_map(|child| build(child, rendered))
                .collect();
            Some(PNode::Element(PElement {
                selector: el.tag,
                attrs: el.attrs,
                children,
                owner: None,
            }))
        }
    }
}
