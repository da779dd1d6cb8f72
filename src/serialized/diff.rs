//! Field-level differences between two serialized objects.

use std::{
    collections::HashSet,
    rc::Rc,
};

use crate::{
    serialized::{
        EntryData,
        SerializedEntry,
        SerializedInstance,
        SerializedObject,
        SerializedObjectRef,
    },
    utils::ptr_key,
};

/// Computes the entries of `new` that differ from `orig`.
///
/// Returns `None` when nothing changed. Plain values are compared by bytes and
/// inline objects of the same type are diffed recursively. Pointers and arrays
/// are compared structurally and recorded in full when they differ. Fields present
/// only in `orig` are recorded as [cleared](SerializedObject::cleared).
///
/// When the two objects have different types the whole of `new` is returned.
pub fn generate_diff(orig: &SerializedObject, new: &SerializedObject) -> Option<SerializedObject> {
    if orig.type_id() != new.type_id() {
        return Some(new.clone());
    }

    let mut diff = SerializedObject::new(new.type_id());

    for entry in new.entries() {
        let Some(orig_entry) = orig.entry(entry.field_id) else {
            diff.insert(entry.clone());
            continue;
        };

        match (&orig_entry.data, &entry.data) {
            (
                EntryData::Instance(SerializedInstance::Object(orig_node)),
                EntryData::Instance(SerializedInstance::Object(new_node)),
            ) if orig_node.borrow().type_id() == new_node.borrow().type_id() => {
                if let Some(nested) = generate_diff(&orig_node.borrow(), &new_node.borrow()) {
                    diff.insert(SerializedEntry::instance(
                        entry.field_id,
                        SerializedInstance::Object(nested.into_ref()),
                    ));
                }
            }
            (EntryData::Instance(orig_instance), EntryData::Instance(new_instance)) => {
                if !instances_equal(orig_instance, new_instance) {
                    diff.insert(entry.clone());
                }
            }
            (EntryData::Array(orig_elements), EntryData::Array(new_elements)) => {
                let equal = orig_elements.len() == new_elements.len()
                    && orig_elements
                        .iter()
                        .zip(new_elements)
                        .all(|(a, b)| instances_equal(a, b));
                if !equal {
                    diff.insert(entry.clone());
                }
            }
            _ => diff.insert(entry.clone()),
        }
    }

    for entry in orig.entries() {
        if new.entry(entry.field_id).is_none() {
            diff.mark_cleared(entry.field_id);
        }
    }

    (!diff.is_empty()).then_some(diff)
}

/// Compares two node graphs structurally, following nested nodes.
///
/// Cycles are handled: a pair of nodes already under comparison is assumed equal.
pub fn objects_equal(a: &SerializedObjectRef, b: &SerializedObjectRef) -> bool {
    let mut visited = HashSet::new();
    let mut pending = vec![(a.clone(), b.clone())];

    while let Some((left, right)) = pending.pop() {
        if Rc::ptr_eq(&left, &right) || !visited.insert((ptr_key(&left), ptr_key(&right))) {
            continue;
        }

        let left = left.borrow();
        let right = right.borrow();

        if left.type_id() != right.type_id()
            || left.entries().len() != right.entries().len()
            || left.cleared() != right.cleared()
        {
            return false;
        }

        for (a, b) in left.entries().iter().zip(right.entries()) {
            if a.field_id != b.field_id {
                return false;
            }

            let matches = match (&a.data, &b.data) {
                (EntryData::Instance(a), EntryData::Instance(b)) => shallow_match(a, b, &mut pending),
                (EntryData::Array(a), EntryData::Array(b)) => {
                    a.len() == b.len()
                        && a.iter()
                            .zip(b)
                            .all(|(a, b)| shallow_match(a, b, &mut pending))
                }
                _ => false,
            };

            if !matches {
                return false;
            }
        }
    }

    true
}

/// Compares two instances structurally.
pub fn instances_equal(a: &SerializedInstance, b: &SerializedInstance) -> bool {
    let mut pending = Vec::new();
    shallow_match(a, b, &mut pending)
        && pending
            .iter()
            .all(|(left, right)| objects_equal(left, right))
}

fn shallow_match(
    a: &SerializedInstance,
    b: &SerializedInstance,
    pending: &mut Vec<(SerializedObjectRef, SerializedObjectRef)>,
) -> bool {
    match (a, b) {
        (SerializedInstance::Field(a), SerializedInstance::Field(b)) => a == b,
        (SerializedInstance::Object(a), SerializedInstance::Object(b))
        | (SerializedInstance::Pointer(Some(a)), SerializedInstance::Pointer(Some(b))) => {
            pending.push((a.clone(), b.clone()));
            true
        }
        (SerializedInstance::Pointer(None), SerializedInstance::Pointer(None)) => true,
        _ => false,
    }
}
