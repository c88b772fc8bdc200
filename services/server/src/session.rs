//! One client connection.
//!
//! A session waits for the client's `connect` message, rehydrates every root
//! the client reports from its snapshot, re-renders each one and sends a
//! single update per root. From then on it dispatches events to handlers and
//! pushes an update whenever a state change re-renders an instance. On close
//! every root is snapshotted for reload and unmounted.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use weft_id::{ComponentId, ConnectionId, CssStateId, HandlerId};
use weft_protocol::{ClientMessage, CssUpdates, PNode, ServerMessage, StateTree};

use crate::component::{EventCx, Instance};
use crate::css::{AtomicCss, CssEngine};
use crate::render::{render_instance, RenderJob, RenderTrigger};
use crate::root::{Root, RootContext};
use crate::server::ServerInner;
use crate::{lock, DivergenceError, ProtocolViolation, ServerError};

/// Outbound half of a connection plus what the client has acknowledged.
pub(crate) struct Connection {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    acknowledged: Mutex<BTreeSet<String>>,
    next_rule_index: AtomicUsize,
    css: Arc<dyn CssEngine>,
}

impl Connection {
    fn new(id: ConnectionId, outbound: mpsc::UnboundedSender<ServerMessage>, css: Arc<dyn CssEngine>) -> Self {
        Self {
            id,
            outbound,
            acknowledged: Mutex::new(BTreeSet::new()),
            next_rule_index: AtomicUsize::new(css.rule_count()),
            css,
        }
    }

    fn acknowledge(&self, names: Vec<String>) {
        lock(&self.acknowledged).extend(names);
    }

    fn confirm_rules(&self, next_rule_index: usize) {
        self.next_rule_index.store(next_rule_index, Ordering::SeqCst);
    }

    fn css_updates(&self) -> Option<CssUpdates> {
        let from = self.next_rule_index.load(Ordering::SeqCst);
        let rules = self.css.rules_since(from);
        if rules.is_empty() {
            return None;
        }
        Some(CssUpdates {
            next_rule_index: from + rules.len(),
            new_css_rules: rules,
        })
    }

    /// Sends `node` as the new content of `component_id`, with whatever
    /// event names and CSS rules the client has not confirmed yet.
    fn send_update(&self, component_id: ComponentId, p_node: PNode, event_names: &BTreeSet<String>) {
        let new_event_names = {
            let acknowledged = lock(&self.acknowledged);
            event_names.difference(&acknowledged).cloned().collect()
        };
        let message = ServerMessage::Update {
            component_id,
            p_node,
            new_event_names,
            css_updates: self.css_updates(),
        };
        if self.outbound.send(message).is_err() {
            debug!(connection_id = %self.id, component_id = %component_id, "Dropping update for closed connection");
        }
    }
}

/// Re-renders an instance whose state changed and pushes the result.
pub(crate) struct UpdateBroadcaster {
    connection: Arc<Connection>,
}

#[async_trait]
impl RenderTrigger for UpdateBroadcaster {
    async fn rerender(&self, instance: &Instance) -> Result<(), ServerError> {
        let scope = instance.scope();
        // The DOM still shows the previous render, so the target is what
        // was visible before this one rewrites the alias edges.
        let target = scope.resolve_visible(instance.id())?;
        render_instance(instance, RenderJob::held()).await?;

        let Some(node) = scope.node(instance.id()) else {
            debug!(component_id = %instance.id(), "Nothing rendered, no update sent");
            return Ok(());
        };
        self.connection
            .send_update(target, node, &scope.event_names());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingConnect,
    Connecting,
    Connected,
    Closed,
}

struct SessionInner {
    id: ConnectionId,
    server: Arc<ServerInner>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    phase: Mutex<Phase>,
    connection: OnceLock<Arc<Connection>>,
    roots: Mutex<HashMap<ComponentId, Root>>,
    css_state_id: Mutex<Option<CssStateId>>,
}

/// Server side of one duplex channel.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub(crate) fn new(server: Arc<ServerInner>) -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let session = Self {
            inner: Arc::new(SessionInner {
                id: ConnectionId::new(),
                server,
                outbound,
                phase: Mutex::new(Phase::AwaitingConnect),
                connection: OnceLock::new(),
                roots: Mutex::new(HashMap::new()),
                css_state_id: Mutex::new(None),
            }),
        };
        (session, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn is_connected(&self) -> bool {
        *lock(&self.inner.phase) == Phase::Connected
    }

    /// The root instance the client knows as `root_id`.
    pub fn root(&self, root_id: ComponentId) -> Option<Root> {
        lock(&self.inner.roots).get(&root_id).cloned()
    }

    /// Decodes and handles one text frame.
    pub async fn handle_text(&self, raw: &str) -> Result<(), ServerError> {
        let message = ClientMessage::decode(raw).map_err(ProtocolViolation::from)?;
        self.handle(message).await
    }

    pub async fn handle(&self, message: ClientMessage) -> Result<(), ServerError> {
        match message {
            ClientMessage::Connect {
                root_ids,
                css_state_id,
            } => self.connect(root_ids, css_state_id).await,
            ClientMessage::Event {
                root_id,
                component_id,
                event_id,
                event,
            } => {
                self.dispatch_event(root_id, component_id, event_id, event)
                    .await
            }
            ClientMessage::SeenEventNames { seen_event_names } => {
                self.connection()?.acknowledge(seen_event_names);
                Ok(())
            }
            ClientMessage::NextRuleIndex { next_rule_index } => {
                self.connection()?.confirm_rules(next_rule_index);
                Ok(())
            }
        }
    }

    fn connection(&self) -> Result<&Arc<Connection>, ServerError> {
        if !self.is_connected() {
            return Err(ProtocolViolation::NotConnected.into());
        }
        self.inner
            .connection
            .get()
            .ok_or_else(|| ProtocolViolation::NotConnected.into())
    }

    fn advance(&self, from: Phase, to: Phase) -> bool {
        let mut phase = lock(&self.inner.phase);
        if *phase != from {
            return false;
        }
        *phase = to;
        true
    }

    #[instrument(skip_all, fields(connection_id = %self.id(), roots = root_ids.len()))]
    async fn connect(
        &self,
        root_ids: Vec<ComponentId>,
        css_state_id: Option<CssStateId>,
    ) -> Result<(), ServerError> {
        if !self.advance(Phase::AwaitingConnect, Phase::Connecting) {
            return Err(ProtocolViolation::AlreadyConnected.into());
        }
        if root_ids.is_empty() {
            return Err(ProtocolViolation::EmptyRootIds.into());
        }

        let server = &self.inner.server;
        let css: Arc<dyn CssEngine> = match css_state_id {
            Some(id) => {
                let state = server
                    .store
                    .get_css(id)
                    .await?
                    .ok_or(ProtocolViolation::MissingCssState(id))?;
                Arc::new(AtomicCss::import(state))
            }
            None => Arc::new(AtomicCss::new()),
        };

        let lookups = join_all(root_ids.iter().map(|id| server.store.get(*id))).await;
        let mut snapshots = Vec::with_capacity(root_ids.len());
        for (id, lookup) in root_ids.iter().zip(lookups) {
            let tree = lookup?.ok_or(ProtocolViolation::MissingSnapshot(*id))?;
            snapshots.push((*id, tree));
        }

        let cx = RootContext::new(server.components.clone())
            .with_css(css.clone())
            .with_reporter(server.reporter.clone())
            .with_options(server.options.render.clone());
        let mut roots = Vec::with_capacity(snapshots.len());
        for (id, tree) in snapshots {
            match rehydrate(&cx, id, tree).await {
                Ok(root) => roots.push(root),
                Err(err) => {
                    for root in &roots {
                        root.dispose();
                    }
                    return Err(ProtocolViolation::RehydrationFailed {
                        root_id: id,
                        reason: err.to_string(),
                    }
                    .into());
                }
            }
        }

        let connection = Arc::new(Connection::new(self.id(), self.inner.outbound.clone(), css));
        let broadcaster: Arc<dyn RenderTrigger> = Arc::new(UpdateBroadcaster {
            connection: connection.clone(),
        });
        for root in &roots {
            root.set_trigger(broadcaster.clone());
            if let Some(node) = root.node(root.id()) {
                connection.send_update(root.id(), node, &root.event_names());
            }
        }

        let _ = self.inner.connection.set(connection);
        *lock(&self.inner.css_state_id) = css_state_id;
        {
            let mut phase = lock(&self.inner.phase);
            if *phase != Phase::Connecting {
                drop(phase);
                debug!("Closed while rehydrating");
                for root in &roots {
                    root.dispose();
                }
                return Ok(());
            }
            *phase = Phase::Connected;
            lock(&self.inner.roots).extend(roots.iter().map(|root| (root.id(), root.clone())));
        }
        info!("Connection resumed");

        tokio::spawn(async move {
            for root in roots {
                if let Err(err) = root.mount().await {
                    warn!(root_id = %root.id(), error = %err, "Mount pass failed");
                }
            }
        });
        Ok(())
    }

    #[instrument(skip(self, payload), fields(connection_id = %self.id()))]
    async fn dispatch_event(
        &self,
        root_id: ComponentId,
        component_id: ComponentId,
        event_id: HandlerId,
        payload: Option<Value>,
    ) -> Result<(), ServerError> {
        self.connection()?;
        let root = self
            .root(root_id)
            .ok_or(ProtocolViolation::UnknownRoot(root_id))?;

        let Some((instance, handler)) = root.find_handler(component_id, event_id) else {
            warn!("Event for unknown or expired handler");
            return Ok(());
        };
        let payload = handler
            .payload
            .validate(&handler.event_name, payload.as_ref())
            .map_err(|source| ServerError::RejectedEvent {
                handler_id: event_id,
                source,
            })?;

        debug!(event = %handler.event_name, target = %instance.id(), "Dispatching event");
        let scope = instance.scope().clone();
        let cx = EventCx {
            instance,
            event_name: handler.event_name.clone(),
            payload,
        };
        if let Err(err) = handler.callback.call(cx).await {
            scope.reporter().report(err)?;
        }
        Ok(())
    }

    /// Snapshots every root for reload, unmounts it and persists the
    /// connection's CSS state. Idempotent.
    pub async fn close(&self) {
        let previous = std::mem::replace(&mut *lock(&self.inner.phase), Phase::Closed);
        if previous == Phase::Closed {
            return;
        }

        let server = &self.inner.server;
        let ttl = server.options.reload_snapshot_ttl;
        let roots: Vec<(ComponentId, Root)> = lock(&self.inner.roots).drain().collect();
        for (id, root) in &roots {
            let mut tree = root.snapshot();
            tree.mark_reload();
            if let Err(err) = server.store.save(*id, &tree, ttl).await {
                warn!(connection_id = %self.id(), root_id = %id, error = %err, "Failed to save reload snapshot");
            }
            if let Err(err) = root.unmount().await {
                warn!(connection_id = %self.id(), root_id = %id, error = %err, "Unmount failed");
            }
        }

        let css_state_id = *lock(&self.inner.css_state_id);
        if let (Some(connection), Some(css_state_id)) = (self.inner.connection.get(), css_state_id) {
            if let Err(err) = server
                .store
                .save_css(css_state_id, &connection.css.export(), ttl)
                .await
            {
                warn!(connection_id = %self.id(), error = %err, "Failed to save CSS state");
            }
        }
        info!(connection_id = %self.id(), roots = roots.len(), "Connection closed");
    }
}

/// Rebuilds a root and renders it once so its subtree exists again.
async fn rehydrate(
    cx: &RootContext,
    id: ComponentId,
    tree: StateTree,
) -> Result<Root, ServerError> {
    let root = Root::rehydrate(cx, id, tree).await?;
    match root.render().await {
        Ok(Some(_)) => Ok(root),
        Ok(None) => {
            root.dispose();
            Err(DivergenceError::NotExactlyOneRoot {
                component: root.instance().name().to_string(),
                count: 0,
            }
            .into())
        }
        Err(err) => {
            root.dispose();
            Err(err)
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("phase", &*lock(&self.inner.phase))
            .finish()
    }
}
