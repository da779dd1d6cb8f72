use crate::{
    error::Error,
    rtti::{
        ReflectPtr,
        Reflectable,
        SharedObject,
    },
};

/// The value category of a reflected field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// A value copied as raw bytes.
    Plain,
    /// A reflectable value exclusively owned by its parent, encoded inline.
    Reflectable,
    /// A shared pointer to a reflectable value, encoded once per pointee.
    ReflectablePtr,
}

impl FieldKind {
    /// Short description used in error messages.
    pub fn describe(self, array: bool) -> &'static str {
        match (self, array) {
            (Self::Plain, false) => "plain value",
            (Self::Plain, true) => "plain array",
            (Self::Reflectable, false) => "inline object",
            (Self::Reflectable, true) => "inline object array",
            (Self::ReflectablePtr, false) => "pointer",
            (Self::ReflectablePtr, true) => "pointer array",
        }
    }
}

pub(crate) type PlainGet = Box<dyn Fn(&dyn Reflectable) -> Result<Option<Vec<u8>>, Error> + Send + Sync>;
pub(crate) type PlainSet = Box<dyn Fn(&mut dyn Reflectable, &[u8]) -> Result<(), Error> + Send + Sync>;

pub(crate) type PlainArrayGet =
    Box<dyn Fn(&dyn Reflectable) -> Result<Vec<Vec<u8>>, Error> + Send + Sync>;
pub(crate) type PlainArraySet =
    Box<dyn Fn(&mut dyn Reflectable, Vec<&[u8]>) -> Result<(), Error> + Send + Sync>;

pub(crate) type OwnedGet = Box<
    dyn for<'a> Fn(&'a dyn Reflectable) -> Result<Option<&'a (dyn Reflectable + 'static)>, Error>
        + Send
        + Sync,
>;
pub(crate) type OwnedGetMut = Box<
    dyn for<'a> Fn(
            &'a mut dyn Reflectable,
        ) -> Result<Option<&'a mut (dyn Reflectable + 'static)>, Error>
        + Send
        + Sync,
>;
pub(crate) type OwnedSet =
    Box<dyn Fn(&mut dyn Reflectable, Box<dyn Reflectable>) -> Result<(), Error> + Send + Sync>;
pub(crate) type OwnedClear = Box<dyn Fn(&mut dyn Reflectable) -> Result<(), Error> + Send + Sync>;

pub(crate) type OwnedArrayGet = Box<
    dyn for<'a> Fn(
            &'a dyn Reflectable,
        ) -> Result<Option<Vec<&'a (dyn Reflectable + 'static)>>, Error>
        + Send
        + Sync,
>;
pub(crate) type OwnedArraySet =
    Box<dyn Fn(&mut dyn Reflectable, Vec<Box<dyn Reflectable>>) -> Result<(), Error> + Send + Sync>;

pub(crate) type PointerGet =
    Box<dyn Fn(&dyn Reflectable) -> Result<Option<ReflectPtr>, Error> + Send + Sync>;
pub(crate) type PointerSet =
    Box<dyn Fn(&mut dyn Reflectable, Option<SharedObject>) -> Result<(), Error> + Send + Sync>;

pub(crate) type PointerArrayGet =
    Box<dyn Fn(&dyn Reflectable) -> Result<Vec<ReflectPtr>, Error> + Send + Sync>;
pub(crate) type PointerArraySet = Box<
    dyn Fn(&mut dyn Reflectable, Vec<Option<SharedObject>>) -> Result<(), Error> + Send + Sync,
>;

// Passing the closures through these pins their signatures to the higher-ranked bounds.
pub(crate) fn owned_get<F>(f: F) -> OwnedGet
where
    F: for<'a> Fn(&'a dyn Reflectable) -> Result<Option<&'a (dyn Reflectable + 'static)>, Error>
        + Send
        + Sync
        + 'static,
{
    Box::new(f)
}

pub(crate) fn owned_get_mut<F>(f: F) -> OwnedGetMut
where
    F: for<'a> Fn(
            &'a mut dyn Reflectable,
        ) -> Result<Option<&'a mut (dyn Reflectable + 'static)>, Error>
        + Send
        + Sync
        + 'static,
{
    Box::new(f)
}

pub(crate) fn owned_array_get<F>(f: F) -> OwnedArrayGet
where
    F: for<'a> Fn(
            &'a dyn Reflectable,
        ) -> Result<Option<Vec<&'a (dyn Reflectable + 'static)>>, Error>
        + Send
        + Sync
        + 'static,
{
    Box::new(f)
}

/// Type-erased accessors of one field, one variant per kind and arity.
///
/// Getters returning `None` mean the field currently has nothing to write and
/// is left out of the encoding.
pub enum FieldAccess {
    /// Scalar [`FieldKind::Plain`].
    Plain {
        /// Encodes the current value.
        get: PlainGet,
        /// Decodes and assigns a value.
        set: PlainSet,
    },
    /// Array of [`FieldKind::Plain`].
    PlainArray {
        /// Encodes every element.
        get: PlainArrayGet,
        /// Decodes and assigns every element.
        set: PlainArraySet,
    },
    /// Scalar [`FieldKind::Reflectable`].
    Reflectable {
        /// Borrows the nested object.
        get: OwnedGet,
        /// Mutably borrows the nested object.
        get_mut: OwnedGetMut,
        /// Replaces the nested object.
        set: OwnedSet,
        /// Removes the nested object, for fields that may hold none.
        clear: Option<OwnedClear>,
    },
    /// Array of [`FieldKind::Reflectable`].
    ReflectableArray {
        /// Borrows every element.
        get: OwnedArrayGet,
        /// Replaces the elements.
        set: OwnedArraySet,
    },
    /// Scalar [`FieldKind::ReflectablePtr`].
    Pointer {
        /// Clones the pointer.
        get: PointerGet,
        /// Replaces the pointer.
        set: PointerSet,
    },
    /// Array of [`FieldKind::ReflectablePtr`].
    PointerArray {
        /// Clones every pointer.
        get: PointerArrayGet,
        /// Replaces the pointers.
        set: PointerArraySet,
    },
}

/// Describes one reflected field of a type.
pub struct FieldDescriptor {
    id: u32,
    name: &'static str,
    access: FieldAccess,
}

impl FieldDescriptor {
    pub(crate) fn new(id: u32, name: &'static str, access: FieldAccess) -> Self {
        Self { id, name, access }
    }

    /// The stable wire id of the field, unique within its type.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The field name, for diagnostics only.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The value category of the field.
    pub fn kind(&self) -> FieldKind {
        match self.access {
            FieldAccess::Plain { .. } | FieldAccess::PlainArray { .. } => FieldKind::Plain,
            FieldAccess::Reflectable { .. } | FieldAccess::ReflectableArray { .. } => {
                FieldKind::Reflectable
            }
            FieldAccess::Pointer { .. } | FieldAccess::PointerArray { .. } => {
                FieldKind::ReflectablePtr
            }
        }
    }

    /// Returns `true` for the array variant of the field kind.
    pub fn is_array(&self) -> bool {
        matches!(
            self.access,
            FieldAccess::PlainArray { .. }
                | FieldAccess::ReflectableArray { .. }
                | FieldAccess::PointerArray { .. }
        )
    }

    /// Returns `true` if the field holds reflectable values, inline or shared.
    pub fn is_reflectable(&self) -> bool {
        self.kind() != FieldKind::Plain
    }

    /// Short description of the declared shape, used in error messages.
    pub fn shape(&self) -> &'static str {
        self.kind().describe(self.is_array())
    }

    /// The accessors of the field.
    pub fn access(&self) -> &FieldAccess {
        &self.access
    }
}

impl std::fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("array", &self.is_array())
            .finish()
    }
}
