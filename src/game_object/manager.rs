use std::{
    cell::RefCell,
    collections::HashMap,
    rc::{
        Rc,
        Weak,
    },
};

use crate::{
    error::Error,
    game_object::GameObjectHandle,
    rtti::{
        ReflectPtr,
        Reflectable,
    },
};

/// A callback run once the identity pass ends.
pub type DeferredCallback = Box<dyn FnOnce() -> Result<(), Error>>;

type WeakObject = Weak<RefCell<dyn Reflectable>>;

#[derive(Default)]
struct IdentityPass {
    mapping: HashMap<u64, u64>,
    handles: Vec<GameObjectHandle>,
    callbacks: Vec<DeferredCallback>,
}

const MIN_PRUNE_THRESHOLD: usize = 64;

struct ManagerState {
    next_id: u64,
    objects: HashMap<u64, WeakObject>,
    prune_threshold: usize,
    pass: Option<IdentityPass>,
}

/// Owns the table of live game objects and the identity-reassignment pass.
///
/// While a pass is active, every restored game object receives a fresh instance id
/// and the manager records which saved id it replaces. Handles decoded during the
/// pass are tracked and, when the pass ends, rewritten to the fresh ids.
pub struct GameObjectManager {
    state: RefCell<ManagerState>,
}

impl Default for GameObjectManager {
    fn default() -> Self {
        Self {
            state: RefCell::new(ManagerState {
                next_id: 1,
                objects: HashMap::new(),
                prune_threshold: MIN_PRUNE_THRESHOLD,
                pass: None,
            }),
        }
    }
}

impl GameObjectManager {
    /// Creates a manager with no live objects.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a live object under a fresh instance id and returns the id.
    pub fn register_object(&self, object: &ReflectPtr) -> u64 {
        let mut state = self.state.borrow_mut();
        let id = state.allocate_id();
        state.insert(id, object);
        id
    }

    /// Registers a restored object under a fresh instance id, recording that it
    /// replaces `original_id` for the current pass.
    pub fn restore_object(&self, original_id: u64, object: &ReflectPtr) -> u64 {
        let mut state = self.state.borrow_mut();
        let id = state.allocate_id();
        state.insert(id, object);

        match &mut state.pass {
            Some(pass) => {
                pass.mapping.insert(original_id, id);
            }
            None => log::warn!(
                "object {original_id} restored as {id} outside of an identity pass, handles to it will not follow"
            ),
        }

        id
    }

    /// Removes an object from the live table.
    pub fn unregister_object(&self, id: u64) {
        self.state.borrow_mut().objects.remove(&id);
    }

    /// Returns the live object registered under `id`.
    pub fn get(&self, id: u64) -> Option<ReflectPtr> {
        self.state
            .borrow()
            .objects
            .get(&id)
            .and_then(Weak::upgrade)
    }

    /// Returns `true` if a live object is registered under `id`.
    pub fn is_alive(&self, id: u64) -> bool {
        self.get(id).is_some()
    }

    /// Drops table entries of objects that are gone and returns how many were dropped.
    ///
    /// Ending an identity pass prunes the table as well.
    pub fn prune(&self) -> usize {
        self.state.borrow_mut().prune()
    }

    /// Number of registered objects that are still alive.
    pub fn live_count(&self) -> usize {
        self.state
            .borrow()
            .objects
            .values()
            .filter(|object| object.strong_count() > 0)
            .count()
    }

    /// Starts an identity pass.
    ///
    /// # Panics
    /// If a pass is already active.
    pub fn start_deserialization(&self) {
        let mut state = self.state.borrow_mut();
        assert!(state.pass.is_none(), "an identity pass is already active");
        state.pass = Some(IdentityPass::default());
    }

    /// Returns `true` while an identity pass is active.
    pub fn is_deserialization_active(&self) -> bool {
        self.state.borrow().pass.is_some()
    }

    /// Queues a handle to be resolved when the pass ends.
    ///
    /// Outside of a pass the handle is linked to its referent right away.
    pub fn track_handle(&self, handle: GameObjectHandle) {
        let mut state = self.state.borrow_mut();
        if let Some(pass) = &mut state.pass {
            pass.handles.push(handle);
            return;
        }
        drop(state);
        self.link_handle(&handle);
    }

    /// Links a handle to the live object currently registered under its id.
    pub fn link_handle(&self, handle: &GameObjectHandle) {
        let id = handle.instance_id();
        let state = self.state.borrow();
        if let Some(object) = state.objects.get(&id).filter(|object| object.strong_count() > 0) {
            handle.resolve(id, Some(object.clone()));
        }
    }

    /// Queues `callback` to run once the current pass ends, after every handle is
    /// resolved. Callbacks run in registration order.
    ///
    /// Outside of a pass there is nothing to wait for and the callback runs right away.
    ///
    /// # Errors
    /// The error of `callback` when it runs right away.
    pub fn register_on_deserialization_end(&self, callback: DeferredCallback) -> Result<(), Error> {
        let mut state = self.state.borrow_mut();
        if let Some(pass) = &mut state.pass {
            pass.callbacks.push(callback);
            return Ok(());
        }
        drop(state);
        callback()
    }

    /// Ends the current pass.
    ///
    /// Every tracked handle is resolved: ids restored during the pass are rewritten to
    /// the fresh id, ids of objects that are still alive are linked, and unknown ids
    /// are left as they are. The pass is then closed and the queued callbacks run in
    /// registration order.
    ///
    /// # Errors
    /// The first error returned by a callback. Later callbacks do not run.
    pub fn end_deserialization(&self) -> Result<(), Error> {
        let pass = {
            let mut state = self.state.borrow_mut();
            let Some(pass) = state.pass.take() else {
                log::warn!("ending an identity pass that was never started");
                return Ok(());
            };

            for handle in &pass.handles {
                let saved_id = handle.instance_id();
                let id = pass.mapping.get(&saved_id).copied().unwrap_or(saved_id);
                match state.objects.get(&id).filter(|object| object.strong_count() > 0) {
                    Some(object) => handle.resolve(id, Some(object.clone())),
                    None => log::debug!("handle to {saved_id} does not resolve to a live object"),
                }
            }

            let pruned = state.prune();
            log::trace!(
                "identity pass ended: {} objects restored, {} handles tracked, {} expired objects pruned",
                pass.mapping.len(),
                pass.handles.len(),
                pruned
            );

            pass
        };

        for callback in pass.callbacks {
            callback()?;
        }

        Ok(())
    }
}

impl ManagerState {
    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // The table is pruned whenever it doubles, so expired entries never pile up.
    fn insert(&mut self, id: u64, object: &ReflectPtr) {
        if self.objects.len() >= self.prune_threshold {
            self.prune();
            self.prune_threshold = (self.objects.len() * 2).max(MIN_PRUNE_THRESHOLD);
        }
        self.objects.insert(id, Rc::downgrade(object));
    }

    fn prune(&mut self) -> usize {
        let before = self.objects.len();
        self.objects.retain(|_, object| object.strong_count() > 0);
        before - self.objects.len()
    }
}

impl std::fmt::Debug for GameObjectManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("GameObjectManager")
            .field("objects", &state.objects.len())
            .field("pass_active", &state.pass.is_some())
            .finish()
    }
}
