//! The intermediate, type-erased representation of reflectable objects.
//!
//! A [`SerializedObject`] records, for one instance, the encoded value of every
//! field keyed by field id. Nested reflectable values are either inline objects,
//! exclusively owned by their entry, or pointers to shared nodes. Shared nodes are
//! referenced by identity, so one live object maps to one node no matter how
//! many fields point at it, and cycles are representable.

use std::{
    cell::RefCell,
    rc::Rc,
};

use crate::rtti::{
    Rtti,
    TypeDescriptor,
    type_ids,
};

pub mod diff;
pub mod persist;
pub mod scan;

pub use self::{
    diff::{
        generate_diff,
        objects_equal,
    },
    persist::PersistedGraph,
    scan::{
        ReferenceScanner,
        find_instances_of_kind,
    },
};

/// A shared serialized node. Node identity is the `Rc` allocation.
pub type SerializedObjectRef = Rc<RefCell<SerializedObject>>;

/// The ordered elements of an array field.
pub type SerializedArray = Vec<SerializedInstance>;

/// The encoded state of one reflectable instance.
///
/// Diff objects may also list cleared fields: fields the original had and the new
/// state left out. A field id is never both cleared and recorded as an entry.
///
/// Cloning is shallow: nested nodes are shared with the clone.
#[derive(Debug, Clone, Default)]
pub struct SerializedObject {
    type_id: u32,
    entries: Vec<SerializedEntry>,
    cleared: Vec<u32>,
}

impl SerializedObject {
    /// Creates an object of the given type with no entries.
    pub fn new(type_id: u32) -> Self {
        Self {
            type_id,
            entries: Vec::new(),
            cleared: Vec::new(),
        }
    }

    /// The type id of the encoded instance.
    pub fn type_id(&self) -> u32 {
        self.type_id
    }

    /// Entries, ordered by field id.
    pub fn entries(&self) -> &[SerializedEntry] {
        &self.entries
    }

    /// Returns the entry of `field_id`.
    pub fn entry(&self, field_id: u32) -> Option<&SerializedEntry> {
        self.entries
            .binary_search_by_key(&field_id, |entry| entry.field_id)
            .ok()
            .map(|index| &self.entries[index])
    }

    /// Field ids cleared by a diff, in ascending order.
    pub fn cleared(&self) -> &[u32] {
        &self.cleared
    }

    /// Records that `field_id` was cleared, dropping its entry.
    pub fn mark_cleared(&mut self, field_id: u32) {
        self.remove(field_id);
        if let Err(index) = self.cleared.binary_search(&field_id) {
            self.cleared.insert(index, field_id);
        }
    }

    /// Inserts an entry, replacing the previous one with the same field id.
    pub fn insert(&mut self, entry: SerializedEntry) {
        if let Ok(index) = self.cleared.binary_search(&entry.field_id) {
            self.cleared.remove(index);
        }
        match self
            .entries
            .binary_search_by_key(&entry.field_id, |entry| entry.field_id)
        {
            Ok(index) => self.entries[index] = entry,
            Err(index) => self.entries.insert(index, entry),
        }
    }

    /// Removes and returns the entry of `field_id`.
    pub fn remove(&mut self, field_id: u32) -> Option<SerializedEntry> {
        self.entries
            .binary_search_by_key(&field_id, |entry| entry.field_id)
            .ok()
            .map(|index| self.entries.remove(index))
    }

    /// Returns `true` if no field is recorded or cleared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.cleared.is_empty()
    }

    /// Moves the object into a new shared node.
    pub fn into_ref(self) -> SerializedObjectRef {
        Rc::new(RefCell::new(self))
    }

    /// Iterates over every node directly nested in this object, inline or shared.
    pub fn nodes(&self) -> impl Iterator<Item = &SerializedObjectRef> {
        self.entries
            .iter()
            .flat_map(SerializedEntry::instances)
            .filter_map(SerializedInstance::node)
    }
}

/// The encoded value of one field.
#[derive(Debug, Clone, Default)]
pub struct SerializedEntry {
    /// The field id within the owning type.
    pub field_id: u32,
    /// The encoded value.
    pub data: EntryData,
}

impl SerializedEntry {
    /// A scalar entry.
    pub fn instance(field_id: u32, instance: SerializedInstance) -> Self {
        Self {
            field_id,
            data: EntryData::Instance(instance),
        }
    }

    /// An array entry.
    pub fn array(field_id: u32, elements: SerializedArray) -> Self {
        Self {
            field_id,
            data: EntryData::Array(elements),
        }
    }

    /// Iterates over the one scalar value or every array element.
    pub fn instances(&self) -> std::slice::Iter<'_, SerializedInstance> {
        match &self.data {
            EntryData::Instance(instance) => std::slice::from_ref(instance).iter(),
            EntryData::Array(elements) => elements.iter(),
        }
    }
}

/// Scalar or array payload of a [`SerializedEntry`].
#[derive(Debug, Clone)]
pub enum EntryData {
    /// A single value.
    Instance(SerializedInstance),
    /// An ordered sequence of values.
    Array(SerializedArray),
}

impl EntryData {
    /// Returns `true` for [`EntryData::Array`].
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Short description used in error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Instance(instance) => instance.describe(),
            Self::Array(_) => "array",
        }
    }
}

impl Default for EntryData {
    fn default() -> Self {
        Self::Instance(SerializedInstance::default())
    }
}

/// One encoded value.
#[derive(Debug, Clone)]
pub enum SerializedInstance {
    /// Raw bytes of a plain value.
    Field(Vec<u8>),
    /// A nested object owned by the entry.
    Object(SerializedObjectRef),
    /// A pointer to a shared node, or null.
    Pointer(Option<SerializedObjectRef>),
}

impl SerializedInstance {
    /// The node held by an inline object or a non-null pointer.
    pub fn node(&self) -> Option<&SerializedObjectRef> {
        match self {
            Self::Field(_) => None,
            Self::Object(node) => Some(node),
            Self::Pointer(node) => node.as_ref(),
        }
    }

    /// Short description used in error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Field(_) => "plain value",
            Self::Object(_) => "inline object",
            Self::Pointer(_) => "pointer",
        }
    }

    fn kind(&self) -> u8 {
        match self {
            Self::Field(_) => 0,
            Self::Object(_) => 1,
            Self::Pointer(_) => 2,
        }
    }

    fn with_kind(kind: u8) -> Self {
        match kind {
            1 => Self::Object(SerializedObject::default().into_ref()),
            2 => Self::Pointer(None),
            _ => Self::Field(Vec::new()),
        }
    }
}

impl Default for SerializedInstance {
    fn default() -> Self {
        Self::Field(Vec::new())
    }
}

// The graph is itself reflectable so that prefab diffs holding serialized
// fragments can be encoded like any other object.

impl Rtti for SerializedObject {
    const RTTI_ID: u32 = type_ids::SERIALIZED_OBJECT;
    const RTTI_NAME: &'static str = "SerializedObject";

    fn rtti() -> TypeDescriptor {
        TypeDescriptor::builder::<Self>()
            .plain(0, "type_id", |o| &o.type_id, |o| &mut o.type_id)
            .reflectable_array(
                1,
                "entries",
                |o| o.entries.as_slice(),
                |o| &mut o.entries,
            )
            .plain_array(2, "cleared", |o| o.cleared.as_slice(), |o| &mut o.cleared)
            .build()
    }
}

impl Rtti for SerializedEntry {
    const RTTI_ID: u32 = type_ids::SERIALIZED_ENTRY;
    const RTTI_NAME: &'static str = "SerializedEntry";

    fn rtti() -> TypeDescriptor {
        TypeDescriptor::builder::<Self>()
            .plain(0, "field_id", |e| &e.field_id, |e| &mut e.field_id)
            .reflectable_with(
                1,
                "instance",
                |e| match &e.data {
                    EntryData::Instance(instance) => Some(instance),
                    EntryData::Array(_) => None,
                },
                |e| match &mut e.data {
                    EntryData::Instance(instance) => Some(instance),
                    EntryData::Array(_) => None,
                },
                |e, instance| e.data = EntryData::Instance(instance),
            )
            .reflectable_array_with(
                2,
                "elements",
                |e| match &e.data {
                    EntryData::Array(elements) => Some(elements.as_slice()),
                    EntryData::Instance(_) => None,
                },
                |e, elements| e.data = EntryData::Array(elements),
            )
            .build()
    }
}

impl Rtti for SerializedInstance {
    const RTTI_ID: u32 = type_ids::SERIALIZED_INSTANCE;
    const RTTI_NAME: &'static str = "SerializedInstance";

    fn rtti() -> TypeDescriptor {
        TypeDescriptor::builder::<Self>()
            .plain_with(
                0,
                "kind",
                |i| Some(i.kind()),
                |i, kind| *i = Self::with_kind(kind),
            )
            .plain_with(
                1,
                "bytes",
                |i| match i {
                    Self::Field(bytes) => Some(bytes.clone()),
                    Self::Object(_) | Self::Pointer(_) => None,
                },
                |i, value| {
                    if let Self::Field(bytes) = i {
                        *bytes = value;
                    }
                },
            )
            .pointer_with(
                2,
                "object",
                |i| i.node().cloned(),
                |i, value| match i {
                    Self::Object(node) => {
                        if let Some(value) = value {
                            *node = value;
                        }
                    }
                    Self::Pointer(node) => *node = value,
                    Self::Field(_) => {}
                },
            )
            .build()
    }
}
