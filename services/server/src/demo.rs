//! Components served by the binary.

use serde_json::json;
use weft_protocol::EventPayload;

use crate::component::markup::{button, div, form, h1, input, option, p, select, span};
use crate::component::{
    Callback, Component, ComponentRegistry, ComponentType, Markup, Props, RenderCx,
};
use crate::{HookError, RegistryError, State};

pub fn registry() -> Result<ComponentRegistry, RegistryError> {
    ComponentRegistry::builder()
        .register::<Counter>()
        .register::<NameForm>()
        .register::<Greeting>()
        .build()
}

fn state(value: serde_json::Value) -> State {
    match value {
        serde_json::Value::Object(map) => map,
        _ => State::new(),
    }
}

/// A click counter.
pub struct Counter {
    start: i64,
}

impl Component for Counter {
    fn initial_state(&self, _props: &Props) -> State {
        state(json!({ "count": self.start }))
    }

    fn render(&self, cx: &mut RenderCx<'_>) -> Result<Markup, HookError> {
        let count = cx.state().get("count").and_then(|v| v.as_i64()).unwrap_or(0);
        let this = cx.instance();
        let increment = Callback::new(move |_event| {
            let this = this.clone();
            async move {
                this.update_state(|s| {
                    let count = s.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
                    state(json!({ "count": count + 1 }))
                })
                .await?;
                Ok(())
            }
        });

        Ok(div()
            .css("display: flex")
            .css("gap: 0.5rem")
            .child(span().child(format!("Count: {count}")))
            .child(button().attr("type", "button").on("click", increment).child("+1"))
            .into())
    }
}

impl ComponentType for Counter {
    const NAME: &'static str = "Counter";

    fn create(props: &Props) -> Self {
        Self {
            start: props.get_i64("start").unwrap_or(0),
        }
    }
}

/// A controlled form that greets whoever submits it.
pub struct NameForm;

impl Component for NameForm {
    fn initial_state(&self, _props: &Props) -> State {
        state(json!({ "draft": "", "name": "", "tone": "plain" }))
    }

    fn render(&self, cx: &mut RenderCx<'_>) -> Result<Markup, HookError> {
        let draft = cx.state().get("draft").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let name = cx.state().get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let tone = cx.state().get("tone").and_then(|v| v.as_str()).unwrap_or("plain").to_string();

        let this = cx.instance();
        let on_input = Callback::new(move |event| {
            let this = this.clone();
            async move {
                if let Some(value) = event.payload.value() {
                    this.set_state(json!({ "draft": value })).await?;
                }
                Ok(())
            }
        });

        let this = cx.instance();
        let on_tone = Callback::new(move |event| {
            let this = this.clone();
            async move {
                if let Some(value) = event.payload.value() {
                    this.set_state(json!({ "tone": value })).await?;
                }
                Ok(())
            }
        });

        let this = cx.instance();
        let on_submit = Callback::new(move |event| {
            let this = this.clone();
            async move {
                let EventPayload::Submit(submit) = event.payload else {
                    return Ok(());
                };
                let name = submit.fields.get("name").cloned().unwrap_or_default();
                this.set_state(json!({ "name": name, "draft": "" })).await?;
                Ok(())
            }
        });

        let greeting = (!name.is_empty()).then(|| {
            Markup::component::<Greeting>(Props::new().with("name", name).with("tone", tone.clone()))
        });

        Ok(div()
            .child(h1().child("Who are you?"))
            .child(
                form()
                    .on("submit", on_submit)
                    .child(input().attr("name", "name").value(draft).on("input", on_input))
                    .child(
                        select()
                            .attr("name", "tone")
                            .value(tone)
                            .on("change", on_tone)
                            .child(option().attr("value", "plain").child("Plain"))
                            .child(option().attr("value", "loud").child("Loud")),
                    )
                    .child(button().attr("type", "submit").child("Greet")),
            )
            .child(greeting)
            .into())
    }
}

impl ComponentType for NameForm {
    const NAME: &'static str = "NameForm";

    fn create(_props: &Props) -> Self {
        NameForm
    }
}

/// Renders a greeting line for the `name` prop.
pub struct Greeting;

impl Component for Greeting {
    fn render(&self, cx: &mut RenderCx<'_>) -> Result<Markup, HookError> {
        let name = cx.props().get_str("name").unwrap_or("stranger");
        let text = match cx.props().get_str("tone") {
            Some("loud") => format!("HELLO, {}!", name.to_uppercase()),
            _ => format!("Hello, {name}."),
        };
        Ok(p().css("font-weight: bold").child(text).into())
    }
}

impl ComponentType for Greeting {
    const NAME: &'static str = "Greeting";

    fn create(_props: &Props) -> Self {
        Greeting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::root::{Root, RootContext};
    use weft_protocol::attrs;

    #[test]
    fn test_registry_builds() {
        let registry = registry().unwrap();
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test]
    async fn test_counter_renders_button_marker() {
        let cx = RootContext::new(Arc::new(registry().unwrap()));
        let root = Root::new(&cx, "Counter", Props::new().with("start", 4)).unwrap();
        let node = root.render().await.unwrap().unwrap();
        let button = &node.children()[1];
        assert!(button.has_attr(&attrs::event_attr("click", false)));
        assert_eq!(node.children()[0].children()[0], weft_protocol::PNode::text("Count: 4"));
        assert!(root.event_names().contains("click"));
    }

    #[tokio::test]
    async fn test_name_form_marks_selected_tone() {
        let cx = RootContext::new(Arc::new(registry().unwrap()));
        let root = Root::new(&cx, "NameForm", Props::new()).unwrap();
        let node = root.render().await.unwrap().unwrap();
        let form = &node.children()[1];
        let select = &form.children()[1];
        assert!(select.is_controlled());
        assert!(select.children()[0].has_attr("selected"));
        assert!(!select.children()[1].has_attr("selected"));
        assert!(form.children()[0].has_attr(attrs::DATA_CONTROLLED));
    }
}
