//! Live sessions over components whose output root is another component.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use weft_id::{ComponentId, HandlerId};
use weft_protocol::{attrs, ClientMessage, PNode, ServerMessage};
use weft_server::component::markup::{div, span};
use weft_server::demo::Counter;
use weft_server::snapshot::MemorySnapshotStore;
use weft_server::{
    Component, ComponentRegistry, HookError, Instance, Markup, PageRender, Props, RenderCx, Server,
    Session, State,
};

/// Shows nothing but a counter.
struct Shell;

impl Component for Shell {
    fn render(&self, _cx: &mut RenderCx<'_>) -> Result<Markup, HookError> {
        Ok(Markup::component::<Counter>(Props::new().with("start", 1)))
    }
}

/// Shows either its own element or a counter.
struct Switch;

impl Component for Switch {
    fn initial_state(&self, props: &Props) -> State {
        let nested = props.get("nested").and_then(|v| v.as_bool()).unwrap_or(false);
        let mut state = State::new();
        state.insert("nested".into(), json!(nested));
        state
    }

    fn render(&self, cx: &mut RenderCx<'_>) -> Result<Markup, HookError> {
        let nested = cx.state().get("nested").and_then(|v| v.as_bool()).unwrap_or(false);
        if nested {
            Ok(Markup::component::<Counter>(Props::new()))
        } else {
            Ok(div().child(span().child("own")).into())
        }
    }
}

struct Page;

impl Component for Page {
    fn render(&self, _cx: &mut RenderCx<'_>) -> Result<Markup, HookError> {
        Ok(div()
            .child(span().child("page"))
            .child(Markup::named("Switch", Props::new()))
            .into())
    }
}

fn server() -> Server {
    let registry = ComponentRegistry::builder()
        .register::<Counter>()
        .register_with("Shell", |_props| Shell)
        .register_with("Switch", |_props| Switch)
        .register_with("Page", |_props| Page)
        .build()
        .unwrap();
    Server::builder(registry)
        .store(Arc::new(MemorySnapshotStore::new()))
        .build()
}

struct Update {
    component_id: ComponentId,
    node: PNode,
}

async fn next_update(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Update {
    match rx.recv().await.expect("channel closed") {
        ServerMessage::Update {
            component_id,
            p_node,
            ..
        } => Update {
            component_id,
            node: p_node,
        },
    }
}

async fn open(server: &Server, page: &PageRender) -> (Session, mpsc::UnboundedReceiver<ServerMessage>, Update) {
    let (session, mut rx) = server.open_session();
    session
        .handle(ClientMessage::Connect {
            root_ids: vec![page.root_id],
            css_state_id: Some(page.css_state_id),
        })
        .await
        .unwrap();
    let update = next_update(&mut rx).await;
    (session, rx, update)
}

fn click(root_id: ComponentId, component_id: ComponentId, event_id: HandlerId) -> ClientMessage {
    ClientMessage::Event {
        root_id,
        component_id,
        event_id,
        event: None,
    }
}

fn click_handler(counter: &PNode) -> HandlerId {
    counter.children()[1]
        .attr(&attrs::event_attr("click", false))
        .and_then(|raw| raw.parse().ok())
        .expect("counter button carries a click marker")
}

fn count_text(counter: &PNode) -> &PNode {
    &counter.children()[0].children()[0]
}

fn only_child(instance: &Instance) -> Instance {
    let children = instance.children();
    assert_eq!(children.len(), 1);
    children[0].clone()
}

#[tokio::test]
async fn test_nested_root_shows_inner_id_and_root_marker() {
    let server = server();
    let page = server.render_page("Shell", Props::new()).await.unwrap();
    let (session, _rx, update) = open(&server, &page).await;
    let counter = only_child(session.root(page.root_id).unwrap().instance());

    assert_eq!(page.node.attr(attrs::DATA_ROOT), Some(page.root_id.to_string().as_str()));
    // Rehydration mints fresh ids for everything below the root.
    assert!(page.node.component_id().is_some_and(|id| id != page.root_id));
    assert_eq!(update.component_id, page.root_id);
    assert_eq!(update.node.component_id(), Some(counter.id()));
}

#[tokio::test]
async fn test_update_from_directly_nested_child_keeps_root_marker() {
    let server = server();
    let page = server.render_page("Shell", Props::new()).await.unwrap();
    let (session, mut rx, update) = open(&server, &page).await;
    let counter = update.node.component_id().unwrap();

    session
        .handle(click(page.root_id, counter, click_handler(&update.node)))
        .await
        .unwrap();

    let update = next_update(&mut rx).await;
    assert_eq!(update.component_id, counter);
    assert_eq!(*count_text(&update.node), PNode::text("Count: 2"));
    assert_eq!(update.node.attr(attrs::DATA_ROOT), Some(page.root_id.to_string().as_str()));
    assert_eq!(update.node.component_id(), Some(counter));
}

#[tokio::test]
async fn test_event_addressed_to_outer_id_reaches_nested_handler() {
    let server = server();
    let page = server.render_page("Shell", Props::new()).await.unwrap();
    let (session, mut rx, update) = open(&server, &page).await;
    let counter = update.node.component_id().unwrap();

    session
        .handle(click(page.root_id, page.root_id, click_handler(&update.node)))
        .await
        .unwrap();

    let update = next_update(&mut rx).await;
    assert_eq!(update.component_id, counter);
    assert_eq!(*count_text(&update.node), PNode::text("Count: 2"));
}

#[tokio::test]
async fn test_nested_root_resumes_after_reconnect() {
    let server = server();
    let page = server.render_page("Shell", Props::new()).await.unwrap();
    let (session, mut rx, update) = open(&server, &page).await;
    let counter = update.node.component_id().unwrap();
    session
        .handle(click(page.root_id, counter, click_handler(&update.node)))
        .await
        .unwrap();
    next_update(&mut rx).await;

    session.close().await;
    let (resumed, mut rx, update) = open(&server, &page).await;

    assert_eq!(update.component_id, page.root_id);
    assert_eq!(*count_text(&update.node), PNode::text("Count: 2"));
    assert_eq!(update.node.attr(attrs::DATA_ROOT), Some(page.root_id.to_string().as_str()));
    let counter = update.node.component_id().unwrap();
    resumed
        .handle(click(page.root_id, counter, click_handler(&update.node)))
        .await
        .unwrap();
    let update = next_update(&mut rx).await;
    assert_eq!(*count_text(&update.node), PNode::text("Count: 3"));
}

#[tokio::test]
async fn test_switching_to_nested_child_targets_own_element() {
    let server = server();
    let page = server.render_page("Page", Props::new()).await.unwrap();
    let (session, mut rx, _update) = open(&server, &page).await;
    let switch = only_child(session.root(page.root_id).unwrap().instance());

    switch.set_state(json!({"nested": true})).await.unwrap();

    let update = next_update(&mut rx).await;
    let counter = only_child(&switch);
    assert_eq!(update.component_id, switch.id());
    assert_eq!(update.node.component_id(), Some(counter.id()));
    assert!(switch.directly_nests());
}

#[tokio::test]
async fn test_switching_back_to_own_element_targets_nested_child() {
    let server = server();
    let page = server.render_page("Page", Props::new()).await.unwrap();
    let (session, mut rx, _update) = open(&server, &page).await;
    let switch = only_child(session.root(page.root_id).unwrap().instance());
    switch.set_state(json!({"nested": true})).await.unwrap();
    next_update(&mut rx).await;
    let counter = only_child(&switch);

    switch.set_state(json!({"nested": false})).await.unwrap();

    let update = next_update(&mut rx).await;
    assert_eq!(update.component_id, counter.id());
    assert_eq!(update.node.component_id(), Some(switch.id()));
    assert!(!switch.directly_nests());

    // The DOM now shows the switch's own element again.
    switch.set_state(json!({"nested": true})).await.unwrap();
    let update = next_update(&mut rx).await;
    assert_eq!(update.component_id, switch.id());
}

#[tokio::test]
async fn test_root_switching_keeps_root_marker_both_ways() {
    let server = server();
    let page = server.render_page("Switch", Props::new()).await.unwrap();
    let (session, mut rx, _update) = open(&server, &page).await;
    let root = session.root(page.root_id).unwrap();
    let marker = page.root_id.to_string();

    root.instance().set_state(json!({"nested": true})).await.unwrap();
    let update = next_update(&mut rx).await;
    let counter = only_child(root.instance());
    assert_eq!(update.component_id, page.root_id);
    assert_eq!(update.node.component_id(), Some(counter.id()));
    assert_eq!(update.node.attr(attrs::DATA_ROOT), Some(marker.as_str()));

    root.instance().set_state(json!({"nested": false})).await.unwrap();
    let update = next_update(&mut rx).await;
    assert_eq!(update.component_id, counter.id());
    assert_eq!(update.node.component_id(), Some(page.root_id));
    assert_eq!(update.node.attr(attrs::DATA_ROOT), Some(marker.as_str()));
}
