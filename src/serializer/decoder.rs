use std::collections::HashMap;

use crate::{
    error::Error,
    rtti::{
        DecodeHook,
        FieldAccess,
        FieldDescriptor,
        Reflectable,
        SharedObject,
        TypeDescriptor,
    },
    serialized::{
        EntryData,
        SerializedEntry,
        SerializedInstance,
        SerializedObject,
        SerializedObjectRef,
    },
    serializer::{
        DecodeContext,
        DecodeTarget,
    },
    utils::ptr_key,
};

/// Rebuilds live objects from serialized nodes.
///
/// Shared nodes are decoded once and the resulting object is handed to every
/// referencing field. Ended hooks of shared objects are queued in completion
/// order and run by [`Decoder::finish`], once the whole graph is wired.
pub(crate) struct Decoder<'c> {
    context: &'c DecodeContext,
    shared: HashMap<usize, Option<SharedObject>>,
    ended: Vec<(SharedObject, DecodeHook)>,
}

impl<'c> Decoder<'c> {
    pub(crate) fn new(context: &'c DecodeContext) -> Self {
        Self {
            context,
            shared: HashMap::new(),
            ended: Vec::new(),
        }
    }

    /// Decodes a node into a shared object, or `None` if its type is unknown.
    pub(crate) fn decode_shared(&mut self, node: &SerializedObjectRef) -> Result<Option<SharedObject>, Error> {
        let key = ptr_key(node);
        if let Some(object) = self.shared.get(&key) {
            return Ok(object.clone());
        }

        let registry = self.context.registry().clone();
        let type_id = node.borrow().type_id();
        let Some(descriptor) = registry.get(type_id) else {
            log::debug!("skipping shared node of unknown type {type_id}");
            self.shared.insert(key, None);
            return Ok(None);
        };

        let object = descriptor.new_shared();
        self.shared.insert(key, Some(object.clone()));

        if let Some(hook) = descriptor.on_started() {
            hook(DecodeTarget::Shared(object.as_reflect()), self.context)?;
        }

        {
            let mut target = object.as_reflect().borrow_mut();
            self.populate(descriptor, &node.borrow(), &mut *target)?;
        }

        if let Some(hook) = descriptor.on_ended() {
            self.ended.push((object.clone(), hook));
        }

        Ok(Some(object))
    }

    /// Decodes a node into an owned object, or `None` if its type is unknown.
    pub(crate) fn decode_owned(&mut self, node: &SerializedObjectRef) -> Result<Option<Box<dyn Reflectable>>, Error> {
        let registry = self.context.registry().clone();
        let source = node.borrow();
        let Some(descriptor) = registry.get(source.type_id()) else {
            log::debug!("skipping inline node of unknown type {}", source.type_id());
            return Ok(None);
        };

        let mut object = descriptor.new_boxed();

        if let Some(hook) = descriptor.on_started() {
            hook(DecodeTarget::Owned(&mut *object), self.context)?;
        }

        self.populate(descriptor, &source, &mut *object)?;

        if let Some(hook) = descriptor.on_ended() {
            hook(DecodeTarget::Owned(&mut *object), self.context)?;
        }

        Ok(Some(object))
    }

    /// Writes the entries of `diff` onto `target`.
    ///
    /// Inline objects already present in `target` with the type recorded in the diff
    /// are patched in place. Every other entry is decoded and assigned. Cleared
    /// fields are emptied where the field can hold nothing.
    pub(crate) fn patch(&mut self, target: &mut dyn Reflectable, diff: &SerializedObject) -> Result<(), Error> {
        let registry = self.context.registry().clone();
        let descriptor = registry
            .get(target.rtti_id())
            .ok_or(Error::UnregisteredType {
                type_id: target.rtti_id(),
                type_name: target.rtti_name(),
            })?;

        if diff.type_id() != descriptor.id() {
            return Err(Error::TypeMismatch {
                expected: descriptor.name(),
                found: registry
                    .get(diff.type_id())
                    .map_or("<unknown type>", TypeDescriptor::name),
            });
        }

        for &field_id in diff.cleared() {
            match descriptor.field(field_id).map(FieldDescriptor::access) {
                Some(FieldAccess::Reflectable {
                    clear: Some(clear), ..
                }) => clear(&mut *target)?,
                Some(_) => log::debug!(
                    "field {field_id} of `{}` cannot be cleared, keeping its value",
                    descriptor.name()
                ),
                None => log::debug!(
                    "diff skips unknown cleared field {field_id} of `{}`",
                    descriptor.name()
                ),
            }
        }

        for entry in diff.entries() {
            let Some(field) = descriptor.field(entry.field_id) else {
                log::debug!(
                    "diff skips unknown field {} of `{}`",
                    entry.field_id,
                    descriptor.name()
                );
                continue;
            };

            if let (
                FieldAccess::Reflectable { get_mut, .. },
                EntryData::Instance(SerializedInstance::Object(nested)),
            ) = (field.access(), &entry.data)
            {
                let nested = nested.borrow();
                if let Some(existing) = get_mut(&mut *target)? {
                    if existing.rtti_id() == nested.type_id() {
                        self.patch(existing, &nested)?;
                        continue;
                    }
                }
            }

            self.assign(descriptor, field, entry, target)?;
        }

        Ok(())
    }

    /// Runs the queued ended hooks, in completion order.
    pub(crate) fn finish(self) -> Result<(), Error> {
        for (object, hook) in self.ended {
            hook(DecodeTarget::Shared(object.as_reflect()), self.context)?;
        }
        Ok(())
    }

    fn populate(
        &mut self,
        descriptor: &TypeDescriptor,
        source: &SerializedObject,
        target: &mut dyn Reflectable,
    ) -> Result<(), Error> {
        for entry in source.entries() {
            match descriptor.field(entry.field_id) {
                Some(field) => self.assign(descriptor, field, entry, target)?,
                None => log::debug!(
                    "ignoring unknown field {} of `{}`",
                    entry.field_id,
                    descriptor.name()
                ),
            }
        }
        Ok(())
    }

    fn assign(
        &mut self,
        descriptor: &TypeDescriptor,
        field: &FieldDescriptor,
        entry: &SerializedEntry,
        target: &mut dyn Reflectable,
    ) -> Result<(), Error> {
        let mismatch = |found| Error::StructureMismatch {
            type_name: descriptor.name(),
            field_id: field.id(),
            expected: field.shape(),
            found,
        };

        match (field.access(), &entry.data) {
            (FieldAccess::Plain { set, .. }, EntryData::Instance(SerializedInstance::Field(bytes))) => {
                set(target, bytes.as_slice())?;
            }
            (FieldAccess::PlainArray { set, .. }, EntryData::Array(elements)) => {
                let elements = elements
                    .iter()
                    .map(|element| match element {
                        SerializedInstance::Field(bytes) => Ok(bytes.as_slice()),
                        other => Err(mismatch(other.describe())),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                set(target, elements)?;
            }
            (
                FieldAccess::Reflectable { set, .. },
                EntryData::Instance(SerializedInstance::Object(nested)),
            ) => {
                if let Some(value) = self.decode_owned(nested)? {
                    set(target, value)?;
                }
            }
            (FieldAccess::ReflectableArray { set, .. }, EntryData::Array(elements)) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    let SerializedInstance::Object(nested) = element else {
                        return Err(mismatch(element.describe()));
                    };
                    if let Some(value) = self.decode_owned(nested)? {
                        values.push(value);
                    }
                }
                set(target, values)?;
            }
            (
                FieldAccess::Pointer { set, .. },
                EntryData::Instance(SerializedInstance::Pointer(pointee)),
            ) => match pointee {
                Some(node) => {
                    if let Some(value) = self.decode_shared(node)? {
                        set(target, Some(value))?;
                    }
                }
                None => set(target, None)?,
            },
            (FieldAccess::PointerArray { set, .. }, EntryData::Array(elements)) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    let SerializedInstance::Pointer(pointee) = element else {
                        return Err(mismatch(element.describe()));
                    };
                    values.push(match pointee {
                        Some(node) => self.decode_shared(node)?,
                        None => None,
                    });
                }
                set(target, values)?;
            }
            (_, data) => return Err(mismatch(data.describe())),
        }

        Ok(())
    }
}
