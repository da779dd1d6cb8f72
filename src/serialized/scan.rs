use std::collections::HashSet;

use crate::{
    error::Error,
    rtti::{
        FieldKind,
        TypeRegistry,
    },
    serialized::{
        SerializedInstance,
        SerializedObjectRef,
    },
    utils::ptr_key,
};

/// Collects every node of a target type reachable from one or more roots.
///
/// Each node is reported once, in depth-first discovery order, however many
/// paths reach it. Nodes of the target type are recorded and not descended
/// into. Nodes of unknown types and entries of unknown fields are skipped.
pub struct ReferenceScanner<'r> {
    registry: &'r TypeRegistry,
    target: u32,
    visited: HashSet<usize>,
    found: Vec<SerializedObjectRef>,
}

impl<'r> ReferenceScanner<'r> {
    /// Creates a scanner looking for nodes of type `target`.
    pub fn new(registry: &'r TypeRegistry, target: u32) -> Self {
        Self {
            registry,
            target,
            visited: HashSet::new(),
            found: Vec::new(),
        }
    }

    /// Scans the graph reachable from `root`, adding to the nodes found so far.
    ///
    /// # Errors
    /// - [`Error::StructureMismatch`] if an entry does not have the shape its field declares.
    pub fn scan(&mut self, root: &SerializedObjectRef) -> Result<(), Error> {
        let registry = self.registry;
        let mut stack = vec![root.clone()];

        while let Some(node) = stack.pop() {
            if !self.visited.insert(ptr_key(&node)) {
                continue;
            }

            let object = node.borrow();

            if object.type_id() == self.target {
                self.found.push(node.clone());
                continue;
            }

            let Some(descriptor) = registry.get(object.type_id()) else {
                log::debug!("scan skips node of unknown type {}", object.type_id());
                continue;
            };

            for entry in object.entries().iter().rev() {
                let Some(field) = descriptor.field(entry.field_id) else {
                    log::debug!(
                        "scan skips unknown field {} of `{}`",
                        entry.field_id,
                        descriptor.name()
                    );
                    continue;
                };

                if !field.is_reflectable() {
                    continue;
                }

                let mismatch = |found| Error::StructureMismatch {
                    type_name: descriptor.name(),
                    field_id: field.id(),
                    expected: field.shape(),
                    found,
                };

                if field.is_array() != entry.data.is_array() {
                    return Err(mismatch(entry.data.describe()));
                }

                for instance in entry.instances().rev() {
                    match (field.kind(), instance) {
                        (FieldKind::Reflectable, SerializedInstance::Object(nested))
                        | (FieldKind::ReflectablePtr, SerializedInstance::Pointer(Some(nested))) => {
                            stack.push(nested.clone());
                        }
                        (FieldKind::ReflectablePtr, SerializedInstance::Pointer(None)) => {}
                        _ => return Err(mismatch(instance.describe())),
                    }
                }
            }
        }

        Ok(())
    }

    /// Nodes found so far.
    pub fn found(&self) -> &[SerializedObjectRef] {
        &self.found
    }

    /// Consumes the scanner, returning the nodes found.
    pub fn into_nodes(self) -> Vec<SerializedObjectRef> {
        self.found
    }
}

/// Finds every distinct node of type `target` reachable from `root`.
///
/// # Errors
/// - [`Error::StructureMismatch`] if an entry does not have the shape its field declares.
pub fn find_instances_of_kind(
    registry: &TypeRegistry,
    root: &SerializedObjectRef,
    target: u32,
) -> Result<Vec<SerializedObjectRef>, Error> {
    let mut scanner = ReferenceScanner::new(registry, target);
    scanner.scan(root)?;
    Ok(scanner.into_nodes())
}
