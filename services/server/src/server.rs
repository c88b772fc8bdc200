//! The server facade: page renders and live sessions.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, instrument};
use weft_id::{ComponentId, CssStateId};
use weft_protocol::{html, PNode, ServerMessage};

use crate::component::{ComponentRegistry, Props};
use crate::css::{AtomicCss, CssEngine};
use crate::report::{ErrorHook, ErrorReporter};
use crate::root::{Root, RootContext};
use crate::scope::RenderOptions;
use crate::session::Session;
use crate::snapshot::{MemorySnapshotStore, SnapshotStore};
use crate::{DivergenceError, ServerError};

/// Default lifetime of the snapshot taken after a page render.
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(60 * 60);

/// Default lifetime of the snapshot taken on graceful disconnect.
pub const DEFAULT_RELOAD_SNAPSHOT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub snapshot_ttl: Duration,
    pub reload_snapshot_ttl: Duration,
    pub render: RenderOptions,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            snapshot_ttl: DEFAULT_SNAPSHOT_TTL,
            reload_snapshot_ttl: DEFAULT_RELOAD_SNAPSHOT_TTL,
            render: RenderOptions::default(),
        }
    }
}

pub(crate) struct ServerInner {
    pub(crate) components: Arc<ComponentRegistry>,
    pub(crate) store: Arc<dyn SnapshotStore>,
    pub(crate) reporter: Arc<ErrorReporter>,
    pub(crate) options: ServerOptions,
}

/// Renders pages and opens sessions against one component registry and
/// snapshot store.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

/// The result of an initial page render.
#[derive(Debug, Clone)]
pub struct PageRender {
    pub root_id: ComponentId,
    pub css_state_id: CssStateId,
    /// The root's node, as serialized into `html`.
    pub node: PNode,
    /// The root's markup.
    pub html: String,
    /// Every CSS rule the render emitted, in index order.
    pub css_rules: Vec<String>,
}

impl PageRender {
    /// A complete HTML document embedding the root and its stylesheet.
    pub fn document(&self, title: &str) -> String {
        let mut title_html = String::new();
        for c in title.chars() {
            match c {
                '&' => title_html.push_str("&amp;"),
                '<' => title_html.push_str("&lt;"),
                '>' => title_html.push_str("&gt;"),
                c => title_html.push(c),
            }
        }
        format!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title_html}</title>\
             <style data-css-state-id=\"{}\">{}</style></head><body>{}</body></html>",
            self.css_state_id,
            self.css_rules.join(""),
            self.html
        )
    }
}

impl Server {
    pub fn builder(components: ComponentRegistry) -> ServerBuilder {
        ServerBuilder {
            components,
            store: None,
            error_hook: None,
            options: ServerOptions::default(),
        }
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.inner.components
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.inner.store
    }

    pub fn options(&self) -> &ServerOptions {
        &self.inner.options
    }

    /// Renders `name` to HTML and persists the snapshot and CSS state a
    /// client needs to connect to it later. No instance stays alive.
    #[instrument(skip(self, props))]
    pub async fn render_page(&self, name: &str, props: Props) -> Result<PageRender, ServerError> {
        let inner = &self.inner;
        let css = Arc::new(AtomicCss::new());
        let cx = RootContext::new(inner.components.clone())
            .with_css(css.clone())
            .with_reporter(inner.reporter.clone())
            .with_options(inner.options.render.clone());

        let root = Root::new(&cx, name, props)?;
        let rendered = root.render().await;
        let snapshot = root.snapshot();
        root.dispose();

        let node = rendered?.ok_or_else(|| DivergenceError::NotExactlyOneRoot {
            component: name.to_string(),
            count: 0,
        })?;
        let html = html::to_html(&node).map_err(ServerError::Html)?;

        let ttl = inner.options.snapshot_ttl;
        inner.store.save(root.id(), &snapshot, ttl).await?;
        let css_state_id = CssStateId::new();
        inner.store.save_css(css_state_id, &css.export(), ttl).await?;

        info!(
            root_id = %root.id(),
            instances = snapshot.instance_count(),
            css_rules = css.rule_count(),
            "Rendered page"
        );
        Ok(PageRender {
            root_id: root.id(),
            css_state_id,
            node,
            html,
            css_rules: css.rules_since(0),
        })
    }

    /// Opens a session. Messages for the client arrive on the receiver.
    pub fn open_session(&self) -> (Session, mpsc::UnboundedReceiver<ServerMessage>) {
        Session::new(self.inner.clone())
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("components", &self.inner.components.len())
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

pub struct ServerBuilder {
    components: ComponentRegistry,
    store: Option<Arc<dyn SnapshotStore>>,
    error_hook: Option<ErrorHook>,
    options: ServerOptions,
}

impl ServerBuilder {
    #[must_use]
    pub fn store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Contains user-code failures instead of propagating them.
    #[must_use]
    pub fn error_hook(mut self, hook: ErrorHook) -> Self {
        self.error_hook = Some(hook);
        self
    }

    #[must_use]
    pub fn options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Server {
        Server {
            inner: Arc::new(ServerInner {
                components: Arc::new(self.components),
                store: self
                    .store
                    .unwrap_or_else(|| Arc::new(MemorySnapshotStore::new())),
                reporter: Arc::new(ErrorReporter::new(self.error_hook)),
                options: self.options,
            }),
        }
    }
}
