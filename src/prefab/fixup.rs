//! Game object handle fix-up for decoded prefab diffs.
//!
//! The fragments of a diff are serialized, so handles inside them are not decoded
//! with the diff and never see the identity pass. When a diff is decoded while a pass
//! is active, its handle nodes are decoded on their own so the pass tracks them, and
//! once the pass ends the nodes are re-encoded with the remapped ids.

use crate::{
    error::Error,
    game_object::GameObjectHandle,
    prefab::PrefabDiff,
    rtti::{
        cast_box,
        type_ids,
    },
    serialized::{
        ReferenceScanner,
        SerializedObjectRef,
    },
    serializer::{
        DecodeContext,
        DecodeTarget,
        StashedHandle,
    },
};

pub(crate) fn begin_handle_fixup(target: DecodeTarget<'_>, context: &DecodeContext) -> Result<(), Error> {
    let Some(manager) = context.active_pass() else {
        return Ok(());
    };

    let key = target.key();
    let session = context.session().clone();
    let serializer = context.serializer();
    session.begin_handle_fixup(key);

    manager.register_on_deserialization_end(Box::new(move || {
        for StashedHandle { node, handle } in session.finish_handle_fixup(key)? {
            if handle.is_resolved() {
                let encoded = serializer.encode_intermediate(&handle)?;
                *node.borrow_mut() = encoded;
            }
        }
        Ok(())
    }))
}

pub(crate) fn collect_handles(target: DecodeTarget<'_>, context: &DecodeContext) -> Result<(), Error> {
    let key = target.key();
    let session = context.session();
    if !session.has_handle_fixup(key) {
        return Ok(());
    }

    let fragments = target.with_as::<PrefabDiff, _>(|diff| Ok(serialized_fragments(diff)))?;

    let mut scanner = ReferenceScanner::new(context.registry(), type_ids::GAME_OBJECT_HANDLE);
    for fragment in &fragments {
        scanner.scan(fragment)?;
    }

    let mut handles = Vec::with_capacity(scanner.found().len());
    for node in scanner.into_nodes() {
        let Some(handle) = context.decode_intermediate(&node)? else {
            continue;
        };
        handles.push(StashedHandle {
            node,
            handle: cast_box::<GameObjectHandle>(handle)?,
        });
    }

    log::trace!("stashed {} handles for fix-up", handles.len());
    session.stash_handles(key, handles)
}

// Every serialized fragment held by the diff tree. Removed-id lists carry no handles.
fn serialized_fragments(diff: &PrefabDiff) -> Vec<SerializedObjectRef> {
    let mut fragments = Vec::new();
    let mut pending: Vec<_> = diff.root.iter().cloned().collect();

    while let Some(node) = pending.pop() {
        let node = node.borrow();
        fragments.extend(node.added_components.iter().cloned());
        fragments.extend(node.added_children.iter().cloned());
        fragments.extend(
            node.component_diffs
                .iter()
                .filter_map(|component| component.borrow().data.clone()),
        );
        pending.extend(node.child_diffs.iter().cloned());
    }

    fragments
}
