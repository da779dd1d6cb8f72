#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![doc = include_str!("../README.md")]

extern crate self as scene_rtti;

pub mod error;
pub mod format;
pub mod game_object;
pub mod prefab;
pub mod rtti;
pub mod scene;
pub mod serialized;
pub mod serializer;

mod utils;

pub use crate::{
    error::Error,
    format::{
        DefaultDebugFormat,
        DefaultFormat,
        Format,
        JsonFormat,
        MessagePackFormat,
    },
    game_object::{
        GameObject,
        GameObjectHandle,
        GameObjectManager,
    },
    prefab::{
        Prefab,
        PrefabDiff,
    },
    rtti::{
        ReflectPtr,
        Reflectable,
        Rtti,
        SharedObject,
        TypeDescriptor,
        TypeRegistry,
    },
    scene::{
        Component,
        SceneObject,
    },
    serialized::{
        SerializedEntry,
        SerializedInstance,
        SerializedObject,
        SerializedObjectRef,
    },
    serializer::BinarySerializer,
};

/// Prelude: convenient import for all the user-facing APIs provided by the crate
pub mod prelude {
    pub use crate::{
        BinarySerializer,
        Component,
        DefaultDebugFormat,
        DefaultFormat,
        Error,
        Format,
        GameObject,
        GameObjectHandle,
        GameObjectManager,
        JsonFormat,
        MessagePackFormat,
        Prefab,
        PrefabDiff,
        ReflectPtr,
        Reflectable,
        Rtti,
        SceneObject,
        SerializedEntry,
        SerializedInstance,
        SerializedObject,
        SerializedObjectRef,
        SharedObject,
        TypeDescriptor,
        TypeRegistry,
    };
}
