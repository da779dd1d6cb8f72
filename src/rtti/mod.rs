//! Runtime type information: the reflection layer every persisted type plugs into.
//!
//! A type becomes persistable by implementing [`Rtti`], usually through
//! `#[derive(Rtti)]`. [`Reflectable`] is the object-safe side of the same
//! contract and is implemented automatically for every [`Rtti`] type.

use std::{
    any::Any,
    cell::RefCell,
    rc::Rc,
};

use crate::error::Error;

mod descriptor;
mod field;
mod registry;

pub use scene_rtti_macros::Rtti;

pub use self::{
    descriptor::{
        DecodeHook,
        TypeDescriptor,
        TypeDescriptorBuilder,
    },
    field::{
        FieldAccess,
        FieldDescriptor,
        FieldKind,
    },
    registry::TypeRegistry,
};

/// Stable type ids of the types defined by this crate.
///
/// User types should pick ids at or above [`FIRST_USER_TYPE_ID`](type_ids::FIRST_USER_TYPE_ID).
pub mod type_ids {
    /// [`SerializedObject`](crate::serialized::SerializedObject)
    pub const SERIALIZED_OBJECT: u32 = 1;
    /// [`SerializedEntry`](crate::serialized::SerializedEntry)
    pub const SERIALIZED_ENTRY: u32 = 2;
    /// [`SerializedInstance`](crate::serialized::SerializedInstance)
    pub const SERIALIZED_INSTANCE: u32 = 3;
    /// [`GameObjectHandle`](crate::game_object::GameObjectHandle)
    pub const GAME_OBJECT_HANDLE: u32 = 10;
    /// [`SceneObject`](crate::scene::SceneObject)
    pub const SCENE_OBJECT: u32 = 20;
    /// [`Component`](crate::scene::Component)
    pub const COMPONENT: u32 = 21;
    /// [`PrefabDiff`](crate::prefab::PrefabDiff)
    pub const PREFAB_DIFF: u32 = 30;
    /// [`PrefabObjectDiff`](crate::prefab::PrefabObjectDiff)
    pub const PREFAB_OBJECT_DIFF: u32 = 31;
    /// [`PrefabComponentDiff`](crate::prefab::PrefabComponentDiff)
    pub const PREFAB_COMPONENT_DIFF: u32 = 32;

    /// The first id that is free for types defined outside this crate.
    pub const FIRST_USER_TYPE_ID: u32 = 1000;
}

/// Static reflection data of a persistable type.
///
/// The id must be unique across every type registered in one [`TypeRegistry`] and
/// must never change once data has been persisted with it.
pub trait Rtti: Default + 'static {
    /// Stable numeric type id, used as the wire key of the type.
    const RTTI_ID: u32;

    /// Human-readable type name.
    const RTTI_NAME: &'static str;

    /// Builds the descriptor listing the reflected fields of the type.
    fn rtti() -> TypeDescriptor;
}

/// Object-safe view of an [`Rtti`] type.
pub trait Reflectable: Any {
    /// Returns the [`Rtti::RTTI_ID`] of the concrete type.
    fn rtti_id(&self) -> u32;

    /// Returns the [`Rtti::RTTI_NAME`] of the concrete type.
    fn rtti_name(&self) -> &'static str;

    /// Upcasts to [`Any`] for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Upcasts to [`Any`] for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Upcasts a boxed value to [`Any`] for downcasting.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Rtti> Reflectable for T {
    fn rtti_id(&self) -> u32 {
        T::RTTI_ID
    }

    fn rtti_name(&self) -> &'static str {
        T::RTTI_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// A shared, type-erased reflectable object.
pub type ReflectPtr = Rc<RefCell<dyn Reflectable>>;

/// A shared object produced by the decoder.
///
/// Holds the same allocation twice: once type-erased for reflection and once as
/// [`Any`] so it can be turned back into its concrete `Rc<RefCell<T>>`.
#[derive(Clone)]
pub struct SharedObject {
    reflect: ReflectPtr,
    any: Rc<dyn Any>,
}

impl SharedObject {
    /// Wraps a value into a new shared allocation.
    pub fn new<T: Rtti>(value: T) -> Self {
        Self::from_rc(Rc::new(RefCell::new(value)))
    }

    /// Wraps an existing shared allocation.
    pub fn from_rc<T: Rtti>(rc: Rc<RefCell<T>>) -> Self {
        let reflect: ReflectPtr = rc.clone();
        let any: Rc<dyn Any> = rc;
        Self { reflect, any }
    }

    /// The type-erased pointer.
    pub fn as_reflect(&self) -> &ReflectPtr {
        &self.reflect
    }

    /// Consumes the object, returning the type-erased pointer.
    pub fn into_reflect(self) -> ReflectPtr {
        self.reflect
    }

    /// Returns the concrete pointer if the object is a `T`.
    pub fn downcast<T: Rtti>(&self) -> Option<Rc<RefCell<T>>> {
        self.any.clone().downcast::<RefCell<T>>().ok()
    }

    /// Like [`downcast`](Self::downcast) but reports the mismatch as an error.
    ///
    /// # Errors
    /// - [`Error::TypeMismatch`] if the object is not a `T`.
    pub fn try_downcast<T: Rtti>(&self) -> Result<Rc<RefCell<T>>, Error> {
        self.downcast::<T>()
            .ok_or_else(|| Error::type_mismatch(T::RTTI_NAME, self.reflect.borrow().rtti_name()))
    }
}

impl std::fmt::Debug for SharedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.reflect.try_borrow() {
            Ok(object) => f
                .debug_tuple("SharedObject")
                .field(&object.rtti_name())
                .finish(),
            Err(_) => f.write_str("SharedObject(<borrowed>)"),
        }
    }
}

/// Downcasts a reflectable to its concrete type.
///
/// # Errors
/// - [`Error::TypeMismatch`] if `object` is not a `T`.
pub fn cast<T: Rtti>(object: &dyn Reflectable) -> Result<&T, Error> {
    object
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| Error::type_mismatch(T::RTTI_NAME, object.rtti_name()))
}

/// Mutably downcasts a reflectable to its concrete type.
///
/// # Errors
/// - [`Error::TypeMismatch`] if `object` is not a `T`.
pub fn cast_mut<T: Rtti>(object: &mut dyn Reflectable) -> Result<&mut T, Error> {
    let found = object.rtti_name();
    object
        .as_any_mut()
        .downcast_mut::<T>()
        .ok_or_else(|| Error::type_mismatch(T::RTTI_NAME, found))
}

/// Converts a boxed reflectable into its concrete type.
///
/// # Errors
/// - [`Error::TypeMismatch`] if `object` is not a `T`.
pub fn cast_box<T: Rtti>(object: Box<dyn Reflectable>) -> Result<T, Error> {
    let found = object.rtti_name();
    object
        .into_any()
        .downcast::<T>()
        .map(|value| *value)
        .map_err(|_| Error::type_mismatch(T::RTTI_NAME, found))
}
