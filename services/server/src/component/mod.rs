//! Components and their live instances.
//!
//! A [`Component`] renders [`Markup`] from its props and state. Each place a
//! component appears in a rendered tree is backed by an [`Instance`] that owns
//! the state, the child instances and the event handler table, and serializes
//! every mutation of them behind its own async lock.

mod callback;
mod instance;
pub mod markup;
mod props;
mod registry;

use async_trait::async_trait;
use weft_id::ComponentId;

pub use callback::{Callback, CallbackIdentity, EventCx};
pub use instance::{Instance, STRAY_MUTATION_LIMIT};
pub(crate) use instance::{ChildMap, InstanceData};
pub use markup::{El, Markup};
pub use props::{Changeset, Props};
pub use registry::{ComponentDescriptor, ComponentRegistry, ComponentRegistryBuilder};

use crate::{HookError, State};

/// A stateful component.
///
/// `render` must be synchronous and side-effect free; lifecycle hooks and
/// event callbacks do the async work and report back through
/// [`Instance::set_state`].
#[async_trait]
pub trait Component: Send + Sync + 'static {
    fn render(&self, cx: &mut RenderCx<'_>) -> Result<Markup, HookError>;

    /// State for a freshly created instance.
    fn initial_state(&self, _props: &Props) -> State {
        State::new()
    }

    /// Async initial-state supplier, re-run when an instance is rehydrated
    /// from a snapshot taken on graceful disconnect. `None` keeps the
    /// snapshot's state as is.
    async fn reload_state(&self, _props: &Props) -> Result<Option<State>, HookError> {
        Ok(None)
    }

    /// Runs after the instance and all of its children have mounted.
    async fn did_mount(&self, _this: &Instance) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs after the instance's children have unmounted.
    async fn will_unmount(&self, _this: &Instance) -> Result<(), HookError> {
        Ok(())
    }
}

/// A component with a registered name and a props constructor.
pub trait ComponentType: Component + Sized {
    const NAME: &'static str;

    fn create(props: &Props) -> Self;
}

/// What a render function can see.
pub struct RenderCx<'a> {
    pub(crate) instance: &'a Instance,
    pub(crate) props: &'a Props,
    pub(crate) state: &'a State,
}

impl<'a> RenderCx<'a> {
    pub fn props(&self) -> &'a Props {
        self.props
    }

    pub fn state(&self) -> &'a State {
        self.state
    }

    /// A handle to the rendering instance, for capture in callbacks.
    pub fn instance(&self) -> Instance {
        self.instance.clone()
    }

    pub fn id(&self) -> ComponentId {
        self.instance.id()
    }
}
