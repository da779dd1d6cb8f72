use std::collections::HashMap;

use crate::{
    error::Error,
    rtti::{
        FieldAccess,
        ReflectPtr,
        Reflectable,
        TypeRegistry,
    },
    serialized::{
        SerializedEntry,
        SerializedInstance,
        SerializedObject,
        SerializedObjectRef,
    },
    utils::ptr_key,
};

/// Walks a live graph, producing serialized nodes.
///
/// Every shared pointee is encoded once. Its node is registered before its fields
/// are visited, so references back to an object still being encoded reuse it.
pub(crate) struct Encoder<'r> {
    registry: &'r TypeRegistry,
    shared: HashMap<usize, (ReflectPtr, SerializedObjectRef)>,
}

impl<'r> Encoder<'r> {
    pub(crate) fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            shared: HashMap::new(),
        }
    }

    pub(crate) fn encode_shared(&mut self, object: &ReflectPtr) -> Result<SerializedObjectRef, Error> {
        let key = ptr_key(object);
        if let Some((_, node)) = self.shared.get(&key) {
            return Ok(node.clone());
        }

        let value = object.borrow();
        let node = SerializedObject::new(value.rtti_id()).into_ref();
        self.shared.insert(key, (object.clone(), node.clone()));

        let encoded = self.encode_owned(&*value)?;
        *node.borrow_mut() = encoded;

        Ok(node)
    }

    pub(crate) fn encode_owned(&mut self, object: &dyn Reflectable) -> Result<SerializedObject, Error> {
        let descriptor = self
            .registry
            .get(object.rtti_id())
            .ok_or(Error::UnregisteredType {
                type_id: object.rtti_id(),
                type_name: object.rtti_name(),
            })?;

        let mut encoded = SerializedObject::new(descriptor.id());

        for field in descriptor.fields() {
            let entry = match field.access() {
                FieldAccess::Plain { get, .. } => get(object)?.map(|bytes| {
                    SerializedEntry::instance(field.id(), SerializedInstance::Field(bytes))
                }),
                FieldAccess::PlainArray { get, .. } => Some(SerializedEntry::array(
                    field.id(),
                    get(object)?
                        .into_iter()
                        .map(SerializedInstance::Field)
                        .collect(),
                )),
                FieldAccess::Reflectable { get, .. } => match get(object)? {
                    Some(nested) => Some(SerializedEntry::instance(
                        field.id(),
                        SerializedInstance::Object(self.encode_owned(nested)?.into_ref()),
                    )),
                    None => None,
                },
                FieldAccess::ReflectableArray { get, .. } => match get(object)? {
                    Some(elements) => {
                        let elements = elements
                            .into_iter()
                            .map(|nested| {
                                self.encode_owned(nested)
                                    .map(|node| SerializedInstance::Object(node.into_ref()))
                            })
                            .collect::<Result<_, _>>()?;
                        Some(SerializedEntry::array(field.id(), elements))
                    }
                    None => None,
                },
                FieldAccess::Pointer { get, .. } => {
                    let pointee = get(object)?
                        .map(|pointee| self.encode_shared(&pointee))
                        .transpose()?;
                    Some(SerializedEntry::instance(
                        field.id(),
                        SerializedInstance::Pointer(pointee),
                    ))
                }
                FieldAccess::PointerArray { get, .. } => {
                    let elements = get(object)?
                        .iter()
                        .map(|pointee| {
                            self.encode_shared(pointee)
                                .map(|node| SerializedInstance::Pointer(Some(node)))
                        })
                        .collect::<Result<_, _>>()?;
                    Some(SerializedEntry::array(field.id(), elements))
                }
            };

            if let Some(entry) = entry {
                encoded.insert(entry);
            }
        }

        Ok(encoded)
    }
}
