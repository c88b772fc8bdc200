//! End-to-end tests for a live page.
//!
//! Each test renders a page on the server, loads it into an in-memory
//! document, and drives a client and a session against each other over
//! their message types:
//!
//! 1. Initial render and connect
//! 2. Events round-trip into morphed updates
//! 3. Controlled inputs keep in-flight typing until the debounce passes
//! 4. A dropped connection resumes from the saved snapshot
//! 5. Roots that show a nested component keep working across updates
//!
//! ## Running
//!
//! ```bash
//! cargo test -p weft-e2e --test live_page
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::mpsc;
use weft_id::ComponentId;
use weft_morph::{Client, Dom, DomEvent, MorphOptions, NodeKey, DEFAULT_TEXT_DEBOUNCE};
use weft_protocol::{attrs, ClientMessage, ServerMessage};
use weft_server::component::markup::p;
use weft_server::demo::Counter;
use weft_server::snapshot::MemorySnapshotStore;
use weft_server::{
    demo, Component, ComponentRegistry, HookError, Markup, PageRender, Props, RenderCx, Server,
    Session, State,
};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,weft_server=debug,weft_morph=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

fn server() -> Server {
    Server::builder(demo::registry().unwrap())
        .store(Arc::new(MemorySnapshotStore::new()))
        .build()
}

/// Renders a counter and nothing else.
struct Wrapper;

impl Component for Wrapper {
    fn render(&self, _cx: &mut RenderCx<'_>) -> Result<Markup, HookError> {
        Ok(Markup::component::<Counter>(Props::new()))
    }
}

/// Flips between a counter and a plain paragraph.
struct Toggle;

impl Component for Toggle {
    fn initial_state(&self, _props: &Props) -> State {
        let mut state = State::new();
        state.insert("counter".into(), json!(false));
        state
    }

    fn render(&self, cx: &mut RenderCx<'_>) -> Result<Markup, HookError> {
        let counter = cx.state().get("counter").and_then(|v| v.as_bool()).unwrap_or(false);
        Ok(if counter {
            Markup::component::<Counter>(Props::new())
        } else {
            p().child("idle").into()
        })
    }
}

fn nesting_server() -> Server {
    let registry = ComponentRegistry::builder()
        .register::<Counter>()
        .register_with("Wrapper", |_props| Wrapper)
        .register_with("Toggle", |_props| Toggle)
        .build()
        .unwrap();
    Server::builder(registry)
        .store(Arc::new(MemorySnapshotStore::new()))
        .build()
}

/// A client and a session wired back to back.
struct Harness {
    server: Server,
    page: PageRender,
    client: Client,
    session: Session,
    rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Harness {
    async fn open(name: &str, props: Props) -> Self {
        Self::open_on(server(), name, props).await
    }

    async fn open_on(server: Server, name: &str, props: Props) -> Self {
        init_tracing();
        let page = server.render_page(name, props).await.unwrap();

        let mut dom = Dom::new();
        dom.load(dom.body(), &page.node).unwrap();
        let client = Client::new(dom, MorphOptions::default())
            .with_css(page.css_state_id, page.css_rules.clone());

        let (session, rx) = server.open_session();
        let mut harness = Self {
            server,
            page,
            client,
            session,
            rx,
        };
        harness.connect().await;
        harness
    }

    /// Connects and applies the one update per root the server answers with.
    async fn connect(&mut self) {
        let connect = self.client.connect().unwrap();
        self.session.handle(connect).await.unwrap();
        self.apply_next().await;
    }

    /// Waits for the next update, applies it and sends the acknowledgements.
    async fn apply_next(&mut self) {
        let message = tokio::time::timeout(RECV_TIMEOUT, self.rx.recv())
            .await
            .expect("timed out waiting for an update")
            .expect("session channel closed");
        let acks = self.client.apply(message, Instant::now()).unwrap();
        for ack in acks {
            self.session.handle(ack).await.unwrap();
        }
    }

    /// Raises a DOM event and forwards every resulting message.
    async fn fire(&mut self, event: DomEvent) -> usize {
        let dispatch = self.client.dispatch(&event).unwrap();
        let count = dispatch.messages.len();
        for message in dispatch.messages {
            self.session.handle(message).await.unwrap();
        }
        count
    }

    /// Drops the connection and opens a fresh one against the same page.
    async fn reconnect(&mut self) {
        self.session.close().await;
        let (session, rx) = self.server.open_session();
        self.session = session;
        self.rx = rx;
        self.connect().await;
    }

    fn root(&self) -> NodeKey {
        self.client
            .dom()
            .find(attrs::DATA_ROOT, &self.page.root_id.to_string())
            .expect("page root is in the document")
    }

    fn text(&self) -> String {
        self.client.dom().text_content(self.root())
    }

    fn by_tag(&self, tag: &str) -> NodeKey {
        let dom = self.client.dom();
        dom.descendants(self.root())
            .into_iter()
            .find(|key| dom.tag(*key) == Some(tag))
            .unwrap_or_else(|| panic!("no <{tag}> in the page"))
    }
}

#[tokio::test]
async fn e2e_counter_click_updates_dom() {
    let mut harness = Harness::open("Counter", Props::new().with("start", 3)).await;
    let root = harness.root();
    assert_eq!(harness.text(), "Count: 3+1");
    assert!(harness.client.is_wired("click"));
    assert_eq!(harness.client.css_rules(), harness.page.css_rules.as_slice());

    let button = harness.by_tag("button");
    assert_eq!(harness.fire(DomEvent::new("click", button)).await, 1);
    harness.apply_next().await;

    assert_eq!(harness.text(), "Count: 4+1");
    assert_eq!(harness.root(), root);
    assert_eq!(harness.by_tag("button"), button);
}

#[tokio::test]
async fn e2e_connect_message_carries_page_ids() {
    init_tracing();
    let server = server();
    let page = server.render_page("Counter", Props::new()).await.unwrap();
    let mut dom = Dom::new();
    dom.load(dom.body(), &page.node).unwrap();
    let mut client = Client::new(dom, MorphOptions::default()).with_css(page.css_state_id, Vec::new());

    let connect = client.connect().unwrap();

    let ClientMessage::Connect {
        root_ids,
        css_state_id,
    } = connect
    else {
        panic!("expected a connect message");
    };
    assert_eq!(root_ids, vec![page.root_id]);
    assert_eq!(css_state_id, Some(page.css_state_id));
}

#[tokio::test]
async fn e2e_typing_and_submit_greets() {
    let mut harness = Harness::open("NameForm", Props::new()).await;
    let input = harness.by_tag("input");
    let form = harness.by_tag("form");

    harness.client.dom_mut().set_value(input, "Ada").unwrap();
    harness.fire(DomEvent::new("input", input)).await;
    harness.apply_next().await;
    assert_eq!(harness.client.dom().value(input), Some("Ada"));
    assert_eq!(harness.client.dom().attr(input, "value"), Some("Ada"));

    harness.fire(DomEvent::new("submit", form)).await;
    harness.apply_next().await;
    let applied_at = Instant::now();

    assert!(harness.text().contains("Hello, Ada."));
    // The cleared draft waits behind the debounce.
    assert_eq!(harness.client.dom().value(input), Some("Ada"));
    assert_eq!(harness.by_tag("input"), input);

    let flushed = harness
        .client
        .tick(applied_at + DEFAULT_TEXT_DEBOUNCE + Duration::from_millis(1))
        .unwrap();
    assert_eq!(flushed, 1);
    assert_eq!(harness.client.dom().value(input), Some(""));
}

#[tokio::test]
async fn e2e_select_change_switches_tone() {
    let mut harness = Harness::open("NameForm", Props::new()).await;
    let input = harness.by_tag("input");
    let select = harness.by_tag("select");
    let options = harness.client.dom().children(select).to_vec();

    harness.client.dom_mut().set_selected(options[0], false).unwrap();
    harness.client.dom_mut().set_selected(options[1], true).unwrap();
    harness.fire(DomEvent::new("change", select)).await;
    harness.apply_next().await;
    assert!(harness.client.dom().selected(options[1]));

    harness.client.dom_mut().set_value(input, "bo").unwrap();
    harness.fire(DomEvent::new("input", input)).await;
    harness.apply_next().await;
    let form = harness.by_tag("form");
    harness.fire(DomEvent::new("submit", form)).await;
    harness.apply_next().await;

    assert!(harness.text().contains("HELLO, BO!"));
}

#[tokio::test]
async fn e2e_reconnect_resumes_state() {
    let mut harness = Harness::open("Counter", Props::new()).await;
    let button = harness.by_tag("button");
    harness.fire(DomEvent::new("click", button)).await;
    harness.apply_next().await;
    harness.fire(DomEvent::new("click", button)).await;
    harness.apply_next().await;
    assert_eq!(harness.text(), "Count: 2+1");

    harness.reconnect().await;

    assert_eq!(harness.text(), "Count: 2+1");
    let button = harness.by_tag("button");
    harness.fire(DomEvent::new("click", button)).await;
    harness.apply_next().await;
    assert_eq!(harness.text(), "Count: 3+1");
}

#[tokio::test]
async fn e2e_update_for_unknown_component_is_divergence() {
    let mut harness = Harness::open("Counter", Props::new()).await;
    let stranger = ComponentId::new();

    let err = harness
        .client
        .apply(
            ServerMessage::Update {
                component_id: stranger,
                p_node: harness.page.node.clone(),
                new_event_names: Vec::new(),
                css_updates: None,
            },
            Instant::now(),
        )
        .unwrap_err();

    assert!(err.is_divergence());
}

#[tokio::test]
async fn e2e_nested_root_survives_repeated_clicks_and_reconnect() {
    let mut harness = Harness::open_on(nesting_server(), "Wrapper", Props::new()).await;
    assert_eq!(harness.text(), "Count: 0+1");

    for expected in ["Count: 1+1", "Count: 2+1"] {
        let button = harness.by_tag("button");
        assert_eq!(harness.fire(DomEvent::new("click", button)).await, 1);
        harness.apply_next().await;
        assert_eq!(harness.text(), expected);
    }

    harness.reconnect().await;
    assert_eq!(harness.text(), "Count: 2+1");
    let button = harness.by_tag("button");
    harness.fire(DomEvent::new("click", button)).await;
    harness.apply_next().await;
    assert_eq!(harness.text(), "Count: 3+1");
}

#[tokio::test]
async fn e2e_root_flipping_to_nested_component_and_back() {
    let mut harness = Harness::open_on(nesting_server(), "Toggle", Props::new()).await;
    let root = harness.session.root(harness.page.root_id).unwrap();
    assert_eq!(harness.text(), "idle");

    root.instance().set_state(json!({"counter": true})).await.unwrap();
    harness.apply_next().await;
    assert_eq!(harness.text(), "Count: 0+1");

    let button = harness.by_tag("button");
    harness.fire(DomEvent::new("click", button)).await;
    harness.apply_next().await;
    assert_eq!(harness.text(), "Count: 1+1");

    root.instance().set_state(json!({"counter": false})).await.unwrap();
    harness.apply_next().await;
    assert_eq!(harness.text(), "idle");

    root.instance().set_state(json!({"counter": true})).await.unwrap();
    harness.apply_next().await;
    assert_eq!(harness.text(), "Count: 0+1");
}
