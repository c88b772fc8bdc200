use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{Component, ComponentType, Props};
use crate::RegistryError;

type Factory = dyn Fn(&Props) -> Box<dyn Component> + Send + Sync;

/// How to construct one registered component type.
#[derive(Clone)]
pub struct ComponentDescriptor {
    name: Arc<str>,
    factory: Arc<Factory>,
}

impl ComponentDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        self.name.clone()
    }

    pub(crate) fn create(&self, props: &Props) -> Box<dyn Component> {
        (self.factory)(props)
    }
}

impl fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Name-keyed table of component types.
///
/// Snapshots identify instances by declared name, so names must be unique
/// and stable across server restarts.
#[derive(Debug, Default, Clone)]
pub struct ComponentRegistry {
    descriptors: HashMap<String, ComponentDescriptor>,
}

impl ComponentRegistry {
    pub fn builder() -> ComponentRegistryBuilder {
        ComponentRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Result<&ComponentDescriptor, RegistryError> {
        self.descriptors
            .get(name)
            .ok_or_else(|| RegistryError::Unregistered(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ComponentRegistryBuilder {
    registry: ComponentRegistry,
    duplicate: Option<String>,
}

impl ComponentRegistryBuilder {
    /// Registers a component type under its declared name.
    #[must_use]
    pub fn register<C: ComponentType>(self) -> Self {
        self.register_with(C::NAME, |props| C::create(props))
    }

    /// Registers a factory under an explicit name.
    #[must_use]
    pub fn register_with<C, F>(mut self, name: &str, factory: F) -> Self
    where
        C: Component,
        F: Fn(&Props) -> C + Send + Sync + 'static,
    {
        if self.registry.descriptors.contains_key(name) {
            self.duplicate.get_or_insert_with(|| name.to_string());
            return self;
        }
        let descriptor = ComponentDescriptor {
            name: Arc::from(name),
            factory: Arc::new(move |props: &Props| Box::new(factory(props)) as Box<dyn Component>),
        };
        self.registry
            .descriptors
            .insert(name.to_string(), descriptor);
        self
    }

    pub fn build(self) -> Result<ComponentRegistry, RegistryError> {
        match self.duplicate {
            Some(name) => Err(RegistryError::DuplicateName(name)),
            None => Ok(self.registry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Markup, RenderCx};
    use crate::HookError;

    struct Hello;

    impl Component for Hello {
        fn render(&self, _cx: &mut RenderCx<'_>) -> Result<Markup, HookError> {
            Ok(Markup::text("hi"))
        }
    }

    impl ComponentType for Hello {
        const NAME: &'static str = "Hello";

        fn create(_props: &Props) -> Self {
            Hello
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ComponentRegistry::builder()
            .register::<Hello>()
            .build()
            .unwrap();
        assert_eq!(registry.get("Hello").unwrap().name(), "Hello");
        assert_eq!(
            registry.get("Nope").unwrap_err(),
            RegistryError::Unregistered("Nope".to_string())
        );
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = ComponentRegistry::builder()
            .register::<Hello>()
            .register_with("Hello", |_| Hello)
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("Hello".to_string()));
    }
}
