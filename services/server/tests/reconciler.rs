//! Integration tests for the reconciler: root rules, handler ids, nesting,
//! child matching and rehydration.

use std::sync::Arc;

use serde_json::json;
use weft_id::ComponentId;
use weft_protocol::{attrs, PNode, StateTree};
use weft_server::component::markup::{button, div, li, option, select, span, ul};
use weft_server::{
    Callback, Component, ComponentRegistry, DivergenceError, HookError, Markup, Props, RenderCx,
    Root, RootContext, ServerError, State,
};

type RenderFn = Arc<dyn Fn(&mut RenderCx<'_>) -> Markup + Send + Sync>;

/// A component whose render is a plain function.
struct View(RenderFn);

impl Component for View {
    fn render(&self, cx: &mut RenderCx<'_>) -> Result<Markup, HookError> {
        Ok((self.0)(cx))
    }
}

fn registry(views: Vec<(&str, RenderFn)>) -> Arc<ComponentRegistry> {
    let mut builder = ComponentRegistry::builder();
    for (name, f) in views {
        builder = builder.register_with(name, move |_props| View(f.clone()));
    }
    Arc::new(builder.build().unwrap())
}

fn view<F>(f: F) -> RenderFn
where
    F: Fn(&mut RenderCx<'_>) -> Markup + Send + Sync + 'static,
{
    Arc::new(f)
}

fn root(views: Vec<(&str, RenderFn)>, name: &str) -> Root {
    let cx = RootContext::new(registry(views));
    Root::new(&cx, name, Props::new()).unwrap()
}

fn count(cx: &RenderCx<'_>) -> i64 {
    cx.state().get("n").and_then(|v| v.as_i64()).unwrap_or(0)
}

fn clicker() -> RenderFn {
    view(|cx| {
        let n = count(cx);
        let this = cx.instance();
        let bump = Callback::new(move |_event| {
            let this = this.clone();
            async move {
                this.set_state(json!({"n": 1})).await?;
                Ok(())
            }
        });
        div()
            .child(span().child(format!("n={n}")))
            .child(button().on("click", bump).child("+"))
            .into()
    })
}

#[tokio::test]
async fn test_root_element_is_stamped() {
    let root = root(vec![("Clicker", clicker())], "Clicker");
    let node = root.render().await.unwrap().unwrap();

    let id = root.id().to_string();
    assert_eq!(node.attr(attrs::DATA_COMPONENT_ID), Some(id.as_str()));
    assert_eq!(node.attr(attrs::DATA_ROOT), Some(id.as_str()));
    assert_eq!(node.owner(), Some(root.id()));
    assert!(root.event_names().contains("click"));
}

#[tokio::test]
async fn test_handler_id_survives_rerender() {
    let root = root(vec![("Clicker", clicker())], "Clicker");
    let before = root.render().await.unwrap().unwrap();
    let marker = attrs::event_attr("click", false);
    let id_before = before.children()[1].attr(&marker).unwrap().to_string();

    root.instance().set_state(json!({"n": 7})).await.unwrap();
    let after = root.render().await.unwrap().unwrap();

    assert_eq!(after.children()[1].attr(&marker), Some(id_before.as_str()));
    assert_eq!(after.children()[0].children()[0], PNode::text("n=7"));
}

#[tokio::test]
async fn test_empty_render_yields_no_node() {
    let root = root(vec![("Nothing", view(|_cx| Markup::Empty))], "Nothing");
    assert_eq!(root.render().await.unwrap(), None);
}

#[tokio::test]
async fn test_multiple_roots_diverge() {
    let root = root(
        vec![("Pair", view(|_cx| Markup::fragment([div(), div()])))],
        "Pair",
    );
    let err = root.render().await.unwrap_err();
    assert!(matches!(
        err,
        ServerError::Divergence(DivergenceError::NotExactlyOneRoot { count: 2, .. })
    ));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_text_root_diverges() {
    let root = root(vec![("Words", view(|_cx| "just text".into()))], "Words");
    let err = root.render().await.unwrap_err();
    assert!(matches!(
        err,
        ServerError::Divergence(DivergenceError::TextRoot { .. })
    ));
}

#[tokio::test]
async fn test_direct_nesting_aliases_outer_to_inner() {
    let root = root(
        vec![
            ("Outer", view(|_cx| Markup::named("Inner", Props::new()))),
            ("Inner", view(|_cx| div().child("inner").into())),
        ],
        "Outer",
    );
    let node = root.render().await.unwrap().unwrap();
    let inner = root.instance().children()[0].clone();

    assert!(root.instance().directly_nests());
    assert!(!inner.directly_nests());
    assert_eq!(node.component_id(), Some(inner.id()));
    assert_eq!(root.resolve_visible(root.id()).unwrap(), inner.id());
    let root_id = root.id().to_string();
    assert_eq!(node.attr(attrs::DATA_ROOT), Some(root_id.as_str()));
}

#[tokio::test]
async fn test_nesting_chain_resolves_to_innermost() {
    let root = root(
        vec![
            ("A", view(|_cx| Markup::named("B", Props::new()))),
            ("B", view(|_cx| Markup::named("C", Props::new()))),
            ("C", view(|_cx| span().into())),
        ],
        "A",
    );
    let node = root.render().await.unwrap().unwrap();
    let b = root.instance().children()[0].clone();
    let c = b.children()[0].clone();

    assert_eq!(node.component_id(), Some(c.id()));
    assert_eq!(root.resolve_visible(root.id()).unwrap(), c.id());
    assert_eq!(root.resolve_visible(b.id()).unwrap(), c.id());
}

#[tokio::test]
async fn test_every_link_of_root_chain_carries_root_marker() {
    let root = root(
        vec![
            ("A", view(|_cx| Markup::named("B", Props::new()))),
            ("B", view(|_cx| Markup::named("C", Props::new()))),
            ("C", view(|_cx| span().into())),
        ],
        "A",
    );
    root.render().await.unwrap();
    root.render().await.unwrap();
    let b = root.instance().children()[0].clone();
    let c = b.children()[0].clone();
    let root_id = root.id().to_string();

    // Each link's own node is what an update for that link would carry.
    for id in [root.id(), b.id(), c.id()] {
        let node = root.node(id).unwrap();
        assert_eq!(node.attr(attrs::DATA_ROOT), Some(root_id.as_str()));
        assert_eq!(node.component_id(), Some(c.id()));
    }
}

#[tokio::test]
async fn test_nested_child_below_root_element_has_no_root_marker() {
    let root = root(
        vec![
            ("Page", view(|_cx| div().child(Markup::named("Leaf", Props::new())).into())),
            ("Leaf", view(|_cx| span().into())),
        ],
        "Page",
    );
    root.render().await.unwrap();
    root.render().await.unwrap();
    let leaf = root.instance().children()[0].clone();

    assert!(!root.node(leaf.id()).unwrap().has_attr(attrs::DATA_ROOT));
}

#[tokio::test]
async fn test_children_are_reused_in_order() {
    let list = view(|cx| {
        let items = cx.state().get("items").and_then(|v| v.as_u64()).unwrap_or(2);
        ul().children((0..items).map(|i| li().child(Markup::named("Item", Props::new().with("i", i)))))
            .into()
    });
    let item = view(|cx| span().child(format!("item {}", cx.props().get_i64("i").unwrap_or(-1))).into());
    let root = root(vec![("List", list), ("Item", item)], "List");

    root.render().await.unwrap();
    let first: Vec<ComponentId> = root.instance().children().iter().map(|c| c.id()).collect();
    assert_eq!(first.len(), 2);

    root.instance().set_state(json!({"items": 3})).await.unwrap();
    let node = root.render().await.unwrap().unwrap();
    let second: Vec<ComponentId> = root.instance().children().iter().map(|c| c.id()).collect();

    assert_eq!(second.len(), 3);
    assert_eq!(&second[..2], &first[..]);
    assert_eq!(node.children()[2].children()[0].children()[0], PNode::text("item 2"));
    assert_eq!(root.live_count(), 4);
}

#[tokio::test]
async fn test_rehydrate_restores_child_state_by_key() {
    let outer = view(|_cx| div().child(Markup::named("Item", Props::new())).into());
    let item = view(|cx| span().child(format!("n={}", count(cx))).into());
    let cx = RootContext::new(registry(vec![("Outer", outer), ("Item", item)]));

    let mut saved = State::new();
    saved.insert("n".into(), json!(5));
    let mut tree = StateTree::new("Outer", State::new());
    tree.child_map
        .insert("/div/Item".into(), vec![StateTree::new("Item", saved)]);

    let id = ComponentId::new();
    let root = Root::rehydrate(&cx, id, tree).await.unwrap();
    let node = root.render().await.unwrap().unwrap();

    assert_eq!(root.id(), id);
    let child = root.instance().children()[0].clone();
    assert_eq!(child.state()["n"], json!(5));
    assert_eq!(node.children()[0].children()[0], PNode::text("n=5"));
}

#[tokio::test]
async fn test_snapshot_mirrors_child_map() {
    let outer = view(|_cx| div().child(Markup::named("Item", Props::new())).into());
    let item = view(|_cx| span().into());
    let root = root(vec![("Outer", outer), ("Item", item)], "Outer");
    root.render().await.unwrap();

    let tree = root.snapshot();

    assert_eq!(tree.name, "Outer");
    assert_eq!(tree.instance_count(), 2);
    assert_eq!(tree.child_map["/div/Item"][0].name, "Item");
}

#[tokio::test]
async fn test_unknown_child_component_fails_render() {
    let root = root(
        vec![("Outer", view(|_cx| div().child(Markup::named("Ghost", Props::new())).into()))],
        "Outer",
    );
    let err = root.render().await.unwrap_err();
    assert!(matches!(err, ServerError::Registry(_)));
}

#[tokio::test]
async fn test_css_declarations_become_shared_classes() {
    let styled = view(|_cx| {
        div()
            .css("color: red")
            .child(span().css("color: red").class("plain"))
            .into()
    });
    let root = root(vec![("Styled", styled)], "Styled");
    let node = root.render().await.unwrap().unwrap();

    let outer = node.attr("class").unwrap();
    let inner = node.children()[0].attr("class").unwrap();
    assert!(outer.starts_with('w'));
    assert!(inner.split(' ').any(|c| c == "plain"));
    assert!(inner.split(' ').any(|c| c == outer));
}

#[tokio::test]
async fn test_controlled_select_marks_option() {
    let form = view(|_cx| {
        select()
            .value("b")
            .child(option().attr("value", "a"))
            .child(option().attr("value", "b"))
            .into()
    });
    let root = root(vec![("Form", form)], "Form");
    let node = root.render().await.unwrap().unwrap();

    assert!(node.is_controlled());
    assert!(!node.children()[0].has_attr("selected"));
    assert!(node.children()[1].has_attr("selected"));
}
