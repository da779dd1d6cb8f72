//! Encoding live object graphs into serialized nodes and back.

use std::{
    io::{
        Read,
        Write,
    },
    rc::Rc,
    sync::Arc,
};

use crate::{
    error::Error,
    format::Format,
    game_object::GameObjectManager,
    rtti::{
        ReflectPtr,
        Reflectable,
        Rtti,
        SharedObject,
        TypeRegistry,
        cast_mut,
    },
    serialized::{
        PersistedGraph,
        SerializedObject,
        SerializedObjectRef,
    },
    utils::ptr_key,
};

mod decoder;
mod encoder;
mod session;

use self::{
    decoder::Decoder,
    encoder::Encoder,
};
pub use self::session::{
    DecodeSession,
    StashedHandle,
};

/// Converts live reflectable objects to [`SerializedObject`] graphs and back.
///
/// # Example
/// ```
/// use std::{cell::RefCell, rc::Rc, sync::Arc};
///
/// use scene_rtti::prelude::*;
///
/// #[derive(Default, Rtti)]
/// #[rtti(id = 1000, name = "Position")]
/// struct Position {
///     #[rtti(id = 0)]
///     x: f32,
///     #[rtti(id = 1)]
///     y: f32,
/// }
///
/// let mut registry = TypeRegistry::new();
/// registry.register::<Position>();
///
/// let serializer = BinarySerializer::new(Arc::new(registry));
///
/// let position: ReflectPtr = Rc::new(RefCell::new(Position { x: 1.0, y: 2.0 }));
/// let node = serializer.encode_object(&position).unwrap();
///
/// let decoded = serializer.decode_object(&node).unwrap().unwrap();
/// let decoded = decoded.downcast::<Position>().unwrap();
/// assert_eq!(decoded.borrow().y, 2.0);
/// ```
#[derive(Clone)]
pub struct BinarySerializer {
    registry: Arc<TypeRegistry>,
    pass: Option<Rc<GameObjectManager>>,
}

impl BinarySerializer {
    /// Creates a serializer working with the types of `registry`.
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            pass: None,
        }
    }

    /// Hands the identity pass of `manager` to every decode hook.
    ///
    /// Game objects decoded while the pass is active receive fresh instance ids, and
    /// handles decoded in the meantime are resolved once the pass ends.
    #[must_use]
    pub fn with_identity_pass(mut self, manager: Rc<GameObjectManager>) -> Self {
        self.pass = Some(manager);
        self
    }

    /// The type registry.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// The game object manager driving the identity pass, if any.
    pub fn identity_pass(&self) -> Option<&Rc<GameObjectManager>> {
        self.pass.as_ref()
    }

    /// Encodes the graph reachable from a shared object.
    ///
    /// Each distinct pointee is encoded once and its node is shared by every
    /// reference to it, cycles included.
    ///
    /// # Errors
    /// - [`Error::UnregisteredType`] if the graph holds an object of an unregistered type.
    /// - [`Error::PlainEncode`] if a plain value cannot be encoded.
    pub fn encode_object(&self, object: &ReflectPtr) -> Result<SerializedObjectRef, Error> {
        Encoder::new(&self.registry).encode_shared(object)
    }

    /// Encodes an object that is not held through a shared pointer.
    ///
    /// # Errors
    /// See [`encode_object`](Self::encode_object).
    pub fn encode_intermediate(&self, object: &dyn Reflectable) -> Result<SerializedObject, Error> {
        Encoder::new(&self.registry).encode_owned(object)
    }

    /// Decodes a graph into live objects.
    ///
    /// Returns `None` if the root node has an unknown type. Ended hooks run once the
    /// whole graph is wired, before this returns.
    ///
    /// # Errors
    /// - [`Error::StructureMismatch`] if an entry does not have the shape its field declares.
    /// - [`Error::TypeMismatch`] if a typed field receives an object of another type.
    /// - Any error returned by a deserialization hook.
    pub fn decode_object(&self, node: &SerializedObjectRef) -> Result<Option<SharedObject>, Error> {
        let context = self.context();
        let mut decoder = Decoder::new(&context);
        let object = decoder.decode_shared(node)?;
        decoder.finish()?;
        Ok(object)
    }

    /// Decodes a node into an object owned by the caller.
    ///
    /// # Errors
    /// See [`decode_object`](Self::decode_object).
    pub fn decode_intermediate(&self, node: &SerializedObjectRef) -> Result<Option<Box<dyn Reflectable>>, Error> {
        self.context().decode_intermediate(node)
    }

    /// Writes the entries of a diff produced by
    /// [`generate_diff`](crate::serialized::generate_diff) onto a live object.
    ///
    /// Inline objects of the same type are patched recursively, every other
    /// recorded field is decoded and replaced. Fields the diff marks as cleared
    /// are emptied.
    ///
    /// # Errors
    /// - [`Error::TypeMismatch`] if `diff` was recorded for another type.
    /// - See [`decode_object`](Self::decode_object).
    pub fn apply_diff(&self, target: &mut dyn Reflectable, diff: &SerializedObject) -> Result<(), Error> {
        let context = self.context();
        let mut decoder = Decoder::new(&context);
        decoder.patch(target, diff)?;
        decoder.finish()
    }

    /// Encodes a graph and writes it with the format `F`.
    ///
    /// # Errors
    /// See [`encode_object`](Self::encode_object), plus [`Error::Saving`] if writing fails.
    pub fn encode<F: Format, W: Write>(&self, writer: W, object: &ReflectPtr) -> Result<(), Error> {
        let node = self.encode_object(object)?;
        F::serialize(writer, &PersistedGraph::from_root(&node))
    }

    /// Reads a graph written with the format `F` and decodes it.
    ///
    /// # Errors
    /// See [`decode_object`](Self::decode_object), plus [`Error::Loading`],
    /// [`Error::UnsupportedVersion`] and [`Error::InvalidReference`] if reading fails.
    pub fn decode<F: Format, R: Read>(&self, reader: R) -> Result<Option<SharedObject>, Error> {
        let graph: PersistedGraph = F::deserialize(reader)?;
        self.decode_object(&graph.into_root()?)
    }

    fn context(&self) -> DecodeContext {
        DecodeContext {
            registry: self.registry.clone(),
            pass: self.pass.clone(),
            session: Rc::default(),
        }
    }
}

impl std::fmt::Debug for BinarySerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinarySerializer")
            .field("registry", &self.registry)
            .field("identity_pass", &self.pass.is_some())
            .finish()
    }
}

/// The object a deserialization hook runs on.
pub enum DecodeTarget<'a> {
    /// An inline object, owned by the decoder until it is moved into its parent.
    Owned(&'a mut dyn Reflectable),
    /// An object held through shared pointers.
    Shared(&'a ReflectPtr),
}

impl DecodeTarget<'_> {
    /// Identity of the target, stable for as long as the object lives.
    pub fn key(&self) -> usize {
        match self {
            Self::Owned(object) => std::ptr::from_ref(&**object).cast::<()>().addr(),
            Self::Shared(object) => ptr_key(*object),
        }
    }

    /// The shared pointer, if the target is held through one.
    pub fn shared(&self) -> Option<&ReflectPtr> {
        match self {
            Self::Owned(_) => None,
            Self::Shared(object) => Some(*object),
        }
    }

    /// Runs `f` with mutable access to the target.
    pub fn with<R>(self, f: impl FnOnce(&mut dyn Reflectable) -> R) -> R {
        match self {
            Self::Owned(object) => f(object),
            Self::Shared(object) => f(&mut *object.borrow_mut()),
        }
    }

    /// Runs `f` with mutable access to the target downcast to `T`.
    ///
    /// # Errors
    /// - [`Error::TypeMismatch`] if the target is not a `T`.
    /// - Any error returned by `f`.
    pub fn with_as<T: Rtti, R>(self, f: impl FnOnce(&mut T) -> Result<R, Error>) -> Result<R, Error> {
        self.with(|object| f(cast_mut::<T>(object)?))
    }
}

/// Context handed to deserialization hooks.
///
/// Shares the registry, the identity pass and the [`DecodeSession`] of the
/// top-level decode call the hook runs in.
pub struct DecodeContext {
    registry: Arc<TypeRegistry>,
    pass: Option<Rc<GameObjectManager>>,
    session: Rc<DecodeSession>,
}

impl DecodeContext {
    /// The type registry.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// The identity pass configured on the serializer, active or not.
    pub fn identity_pass(&self) -> Option<&Rc<GameObjectManager>> {
        self.pass.as_ref()
    }

    /// The identity pass, if it is currently reassigning ids.
    pub fn active_pass(&self) -> Option<&Rc<GameObjectManager>> {
        self.pass
            .as_ref()
            .filter(|manager| manager.is_deserialization_active())
    }

    /// The session of the enclosing top-level decode call.
    pub fn session(&self) -> &Rc<DecodeSession> {
        &self.session
    }

    /// A serializer sharing the registry and identity pass of this context.
    pub fn serializer(&self) -> BinarySerializer {
        BinarySerializer {
            registry: self.registry.clone(),
            pass: self.pass.clone(),
        }
    }

    /// Decodes a node into an owned object, within the current session.
    ///
    /// Ended hooks of every object decoded here have run when this returns.
    ///
    /// # Errors
    /// See [`BinarySerializer::decode_object`].
    pub fn decode_intermediate(&self, node: &SerializedObjectRef) -> Result<Option<Box<dyn Reflectable>>, Error> {
        let mut decoder = Decoder::new(self);
        let object = decoder.decode_owned(node)?;
        decoder.finish()?;
        Ok(object)
    }

    /// Encodes an object owned by the caller.
    ///
    /// # Errors
    /// See [`BinarySerializer::encode_object`].
    pub fn encode_intermediate(&self, object: &dyn Reflectable) -> Result<SerializedObject, Error> {
        Encoder::new(&self.registry).encode_owned(object)
    }
}
