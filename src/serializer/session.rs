use std::{
    cell::RefCell,
    collections::HashMap,
};

use crate::{
    error::Error,
    game_object::GameObjectHandle,
    serialized::SerializedObjectRef,
};

/// A serialized handle node together with the live handle decoded from it.
#[derive(Debug, Clone)]
pub struct StashedHandle {
    /// The node the handle was decoded from, overwritten once the handle resolves.
    pub node: SerializedObjectRef,
    /// The live handle, tracked by the identity pass.
    pub handle: GameObjectHandle,
}

#[derive(Debug)]
enum HandleFixup {
    Pending,
    Stashed(Vec<StashedHandle>),
}

/// State shared by every decode started from one top-level decode call.
///
/// Holds the handle fix-up slots of the prefab diffs decoded in the call, keyed by
/// the identity of the decoded diff. Slots live until their fix-up completes;
/// nothing is ever written onto the decoded objects themselves.
#[derive(Debug, Default)]
pub struct DecodeSession {
    fixups: RefCell<HashMap<usize, HandleFixup>>,
}

impl DecodeSession {
    /// Opens the fix-up slot of `key`.
    pub fn begin_handle_fixup(&self, key: usize) {
        self.fixups.borrow_mut().insert(key, HandleFixup::Pending);
    }

    /// Returns `true` if a fix-up slot is open for `key`.
    pub fn has_handle_fixup(&self, key: usize) -> bool {
        self.fixups.borrow().contains_key(&key)
    }

    /// Stores the handles collected for `key`.
    ///
    /// # Errors
    /// - [`Error::FixupNotStarted`] if no slot is open for `key`.
    pub fn stash_handles(&self, key: usize, handles: Vec<StashedHandle>) -> Result<(), Error> {
        match self.fixups.borrow_mut().get_mut(&key) {
            Some(slot) => {
                *slot = HandleFixup::Stashed(handles);
                Ok(())
            }
            None => Err(Error::FixupNotStarted(key)),
        }
    }

    /// Closes the slot of `key`, returning its stashed handles.
    ///
    /// # Errors
    /// - [`Error::FixupNotStarted`] if the slot was never opened or never filled.
    pub fn finish_handle_fixup(&self, key: usize) -> Result<Vec<StashedHandle>, Error> {
        match self.fixups.borrow_mut().remove(&key) {
            Some(HandleFixup::Stashed(handles)) => Ok(handles),
            Some(HandleFixup::Pending) | None => Err(Error::FixupNotStarted(key)),
        }
    }
}
