//! Flat, serde-friendly form of a serialized graph.

use std::collections::HashMap;

use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    error::Error,
    serialized::{
        EntryData,
        SerializedEntry,
        SerializedInstance,
        SerializedObject,
        SerializedObjectRef,
    },
    utils::ptr_key,
};

/// The version written into every [`PersistedGraph`].
pub const FORMAT_VERSION: semver::Version = semver::Version::new(1, 0, 0);

/// A serialized graph flattened into an object table.
///
/// Every node is stored once. Nested nodes are referenced by their index in
/// [`objects`](Self::objects), which keeps shared nodes and cycles intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedGraph {
    /// The format version the graph was written with.
    pub version: String,
    /// Index of the root node.
    pub root: u32,
    /// Every node of the graph.
    pub objects: Vec<PersistedObject>,
}

/// One node of a [`PersistedGraph`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedObject {
    /// The type id of the node.
    pub type_id: u32,
    /// The entries, ordered by field id.
    pub entries: Vec<PersistedEntry>,
    /// Field ids cleared by a diff.
    #[serde(default)]
    pub cleared: Vec<u32>,
}

impl PersistedObject {
    // Indices of the nodes this object owns inline.
    fn inline_children(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .iter()
            .flat_map(|entry| match &entry.value {
                PersistedValue::Instance(instance) => std::slice::from_ref(instance),
                PersistedValue::Array(elements) => elements.as_slice(),
            })
            .filter_map(|instance| match instance {
                PersistedInstance::Object(index) => Some(*index),
                PersistedInstance::Field(_) | PersistedInstance::Pointer(_) => None,
            })
    }
}

/// One entry of a [`PersistedObject`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEntry {
    /// The field id.
    pub field: u32,
    /// The value.
    pub value: PersistedValue,
}

/// Scalar or array value of a [`PersistedEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistedValue {
    /// A single value.
    Instance(PersistedInstance),
    /// An ordered sequence of values.
    Array(Vec<PersistedInstance>),
}

/// A persisted [`SerializedInstance`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistedInstance {
    /// Raw bytes of a plain value.
    Field(Vec<u8>),
    /// Index of an inline node.
    Object(u32),
    /// Index of a shared node, or null.
    Pointer(Option<u32>),
}

impl PersistedGraph {
    /// Flattens the graph reachable from `root`.
    pub fn from_root(root: &SerializedObjectRef) -> Self {
        let mut flattener = Flattener::default();
        let root = flattener.index_of(root);

        while let Some(node) = flattener.pending.pop() {
            let index = flattener.indices[&ptr_key(&node)];
            let object = node.borrow();
            let entries = object
                .entries()
                .iter()
                .map(|entry| PersistedEntry {
                    field: entry.field_id,
                    value: match &entry.data {
                        EntryData::Instance(instance) => {
                            PersistedValue::Instance(flattener.instance(instance))
                        }
                        EntryData::Array(elements) => PersistedValue::Array(
                            elements
                                .iter()
                                .map(|instance| flattener.instance(instance))
                                .collect(),
                        ),
                    },
                })
                .collect();

            flattener.objects[index as usize] = Some(PersistedObject {
                type_id: object.type_id(),
                entries,
                cleared: object.cleared().to_vec(),
            });
        }

        Self {
            version: FORMAT_VERSION.to_string(),
            root,
            objects: flattener.objects.into_iter().flatten().collect(),
        }
    }

    /// Rebuilds the node graph.
    ///
    /// # Errors
    /// - [`Error::UnsupportedVersion`] if the graph was written by an incompatible version.
    /// - [`Error::InvalidReference`] if an index points outside the object table.
    /// - [`Error::InlineOwnership`] if an object is embedded inline more than once or
    ///   inside its own subtree.
    pub fn into_root(self) -> Result<SerializedObjectRef, Error> {
        let version = semver::Version::parse(&self.version)
            .map_err(|_| Error::UnsupportedVersion(self.version.clone()))?;

        if version.major != FORMAT_VERSION.major || version > FORMAT_VERSION {
            return Err(Error::UnsupportedVersion(self.version));
        }

        self.check_inline_ownership()?;

        let nodes = self
            .objects
            .iter()
            .map(|object| SerializedObject::new(object.type_id).into_ref())
            .collect::<Vec<_>>();

        let node = |index: u32| {
            nodes
                .get(index as usize)
                .cloned()
                .ok_or(Error::InvalidReference(index))
        };

        let instance = |persisted: PersistedInstance| -> Result<SerializedInstance, Error> {
            Ok(match persisted {
                PersistedInstance::Field(bytes) => SerializedInstance::Field(bytes),
                PersistedInstance::Object(index) => SerializedInstance::Object(node(index)?),
                PersistedInstance::Pointer(index) => {
                    SerializedInstance::Pointer(index.map(node).transpose()?)
                }
            })
        };

        for (target, object) in nodes.iter().zip(self.objects) {
            let mut target = target.borrow_mut();
            for field_id in object.cleared {
                target.mark_cleared(field_id);
            }
            for entry in object.entries {
                let entry = match entry.value {
                    PersistedValue::Instance(value) => {
                        SerializedEntry::instance(entry.field, instance(value)?)
                    }
                    PersistedValue::Array(values) => SerializedEntry::array(
                        entry.field,
                        values
                            .into_iter()
                            .map(&instance)
                            .collect::<Result<_, _>>()?,
                    ),
                };
                target.insert(entry);
            }
        }

        node(self.root)
    }

    // Inline objects form a forest: every object has at most one inline owner and
    // walking down from the unowned objects reaches all of them.
    fn check_inline_ownership(&self) -> Result<(), Error> {
        let count = self.objects.len();
        let mut owned = vec![false; count];
        let mut children = vec![Vec::new(); count];

        for (parent, object) in self.objects.iter().enumerate() {
            for index in object.inline_children() {
                let slot = owned
                    .get_mut(index as usize)
                    .ok_or(Error::InvalidReference(index))?;
                if std::mem::replace(slot, true) {
                    return Err(Error::InlineOwnership(index));
                }
                children[parent].push(index as usize);
            }
        }

        let mut reached = vec![false; count];
        let mut pending = (0..count).filter(|&index| !owned[index]).collect::<Vec<_>>();
        while let Some(index) = pending.pop() {
            reached[index] = true;
            pending.extend(&children[index]);
        }

        match reached.iter().position(|reached| !reached) {
            Some(index) => Err(Error::InlineOwnership(
                u32::try_from(index).unwrap_or(u32::MAX),
            )),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct Flattener {
    indices: HashMap<usize, u32>,
    objects: Vec<Option<PersistedObject>>,
    pending: Vec<SerializedObjectRef>,
}

impl Flattener {
    fn index_of(&mut self, node: &SerializedObjectRef) -> u32 {
        let key = ptr_key(node);
        if let Some(&index) = self.indices.get(&key) {
            return index;
        }

        let index = u32::try_from(self.objects.len()).unwrap_or(u32::MAX);
        self.indices.insert(key, index);
        self.objects.push(None);
        self.pending.push(node.clone());
        index
    }

    fn instance(&mut self, instance: &SerializedInstance) -> PersistedInstance {
        match instance {
            SerializedInstance::Field(bytes) => PersistedInstance::Field(bytes.clone()),
            SerializedInstance::Object(node) => PersistedInstance::Object(self.index_of(node)),
            SerializedInstance::Pointer(node) => {
                PersistedInstance::Pointer(node.as_ref().map(|node| self.index_of(node)))
            }
        }
    }
}
