use std::collections::HashMap;

use crate::{
    game_object::GameObjectHandle,
    prefab::{
        PrefabComponentDiff,
        PrefabDiff,
        PrefabObjectDiff,
    },
    rtti::{
        Rtti,
        TypeDescriptor,
    },
    scene::{
        Component,
        SceneObject,
    },
    serialized::{
        SerializedEntry,
        SerializedInstance,
        SerializedObject,
    },
};

/// Maps stable type ids to their [`TypeDescriptor`].
///
/// Built once, then shared read-only (usually behind an `Arc`) by every
/// serializer working with it.
#[derive(Default)]
pub struct TypeRegistry {
    types: HashMap<u32, TypeDescriptor>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every reflectable type defined by this crate:
    /// the serialized graph itself, game object handles, scene objects and prefab diffs.
    pub fn with_engine_types() -> Self {
        let mut registry = Self::new();
        registry
            .register::<SerializedObject>()
            .register::<SerializedEntry>()
            .register::<SerializedInstance>()
            .register::<GameObjectHandle>()
            .register::<SceneObject>()
            .register::<Component>()
            .register::<PrefabDiff>()
            .register::<PrefabObjectDiff>()
            .register::<PrefabComponentDiff>();
        registry
    }

    /// Registers `T`. Registering the same type again is a no-op.
    ///
    /// # Panics
    /// If a different type was already registered under `T::RTTI_ID`.
    pub fn register<T: Rtti>(&mut self) -> &mut Self {
        if self.types.contains_key(&T::RTTI_ID) {
            self.check_conflict(T::RTTI_ID, T::RTTI_NAME);
            return self;
        }
        self.register_descriptor(T::rtti())
    }

    /// Registers a descriptor built by hand.
    ///
    /// # Panics
    /// If a different type was already registered under the same id.
    pub fn register_descriptor(&mut self, descriptor: TypeDescriptor) -> &mut Self {
        if self.types.contains_key(&descriptor.id()) {
            self.check_conflict(descriptor.id(), descriptor.name());
        }
        log::trace!("registered type `{}` (id {})", descriptor.name(), descriptor.id());
        self.types.insert(descriptor.id(), descriptor);
        self
    }

    fn check_conflict(&self, id: u32, name: &'static str) {
        if let Some(existing) = self.types.get(&id) {
            assert!(
                existing.name() == name,
                "type id {} is already registered to `{}`, cannot register `{}`",
                id,
                existing.name(),
                name
            );
        }
    }

    /// Returns the descriptor registered under `id`.
    ///
    /// Unknown ids yield `None`; callers treat them as dropped types and skip the subtree.
    pub fn get(&self, id: u32) -> Option<&TypeDescriptor> {
        self.types.get(&id)
    }

    /// Returns `true` if `id` is registered.
    pub fn contains(&self, id: u32) -> bool {
        self.types.contains_key(&id)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if no type is registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterates over every registered descriptor, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.values()
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = self
            .types
            .values()
            .map(|descriptor| (descriptor.id(), descriptor.name()))
            .collect::<Vec<_>>();
        names.sort_unstable();
        f.debug_struct("TypeRegistry").field("types", &names).finish()
    }
}
