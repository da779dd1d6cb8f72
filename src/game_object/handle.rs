use std::{
    cell::RefCell,
    rc::{
        Rc,
        Weak,
    },
};

use crate::{
    error::Error,
    game_object::GameObject,
    rtti::{
        ReflectPtr,
        Reflectable,
        Rtti,
        TypeDescriptor,
        cast,
        type_ids,
    },
    serializer::{
        DecodeContext,
        DecodeTarget,
    },
};

#[derive(Default)]
struct HandleData {
    instance_id: u64,
    object: Option<Weak<RefCell<dyn Reflectable>>>,
}

/// A weak, id-based reference to a live game object.
///
/// Clones share their resolution state: when the identity pass remaps the id of
/// one copy, every copy observes the new id.
#[derive(Clone, Default)]
pub struct GameObjectHandle {
    data: Rc<RefCell<HandleData>>,
}

impl GameObjectHandle {
    /// A handle to a live game object.
    pub fn new<T: GameObject>(object: &Rc<RefCell<T>>) -> Self {
        let instance_id = object.borrow().instance_id();
        let object: ReflectPtr = object.clone();
        Self::from_parts(instance_id, Some(Rc::downgrade(&object)))
    }

    /// A handle that only knows the id of its referent.
    pub fn from_id(instance_id: u64) -> Self {
        Self::from_parts(instance_id, None)
    }

    fn from_parts(instance_id: u64, object: Option<Weak<RefCell<dyn Reflectable>>>) -> Self {
        Self {
            data: Rc::new(RefCell::new(HandleData {
                instance_id,
                object,
            })),
        }
    }

    /// The instance id of the referent.
    pub fn instance_id(&self) -> u64 {
        self.data.borrow().instance_id
    }

    /// The referent, if it is still alive.
    pub fn get(&self) -> Option<ReflectPtr> {
        self.data
            .borrow()
            .object
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Returns `true` if the handle points to a live object.
    pub fn is_resolved(&self) -> bool {
        self.get().is_some()
    }

    /// Runs `f` with the referent downcast to `T`.
    ///
    /// Returns `None` if the referent is gone or is not a `T`.
    pub fn with<T: Rtti, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let object = self.get()?;
        let object = object.borrow();
        cast::<T>(&*object).ok().map(f)
    }

    /// Returns `true` if both handles share their resolution state.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }

    pub(crate) fn resolve(&self, instance_id: u64, object: Option<Weak<RefCell<dyn Reflectable>>>) {
        let mut data = self.data.borrow_mut();
        data.instance_id = instance_id;
        data.object = object;
    }

    // A new id invalidates the link until the handle is resolved again.
    fn set_instance_id(&mut self, instance_id: u64) {
        let mut data = self.data.borrow_mut();
        if data.instance_id != instance_id {
            data.instance_id = instance_id;
            data.object = None;
        }
    }
}

impl PartialEq for GameObjectHandle {
    fn eq(&self, other: &Self) -> bool {
        self.instance_id() == other.instance_id()
    }
}

impl Eq for GameObjectHandle {}

impl std::fmt::Debug for GameObjectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameObjectHandle")
            .field("instance_id", &self.instance_id())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl Rtti for GameObjectHandle {
    const RTTI_ID: u32 = type_ids::GAME_OBJECT_HANDLE;
    const RTTI_NAME: &'static str = "GameObjectHandle";

    fn rtti() -> TypeDescriptor {
        TypeDescriptor::builder::<Self>()
            .plain_with(
                0,
                "instance_id",
                |h| Some(h.instance_id()),
                Self::set_instance_id,
            )
            .on_deserialization_ended(track_handle)
            .build()
    }
}

// Decoded handles still carry the id they were saved with. An active identity
// pass maps it to the id of the restored object when it ends.
fn track_handle(target: DecodeTarget<'_>, context: &DecodeContext) -> Result<(), Error> {
    let Some(manager) = context.identity_pass() else {
        return Ok(());
    };

    let handle = target.with_as::<GameObjectHandle, _>(|handle| Ok(handle.clone()))?;

    if manager.is_deserialization_active() {
        manager.track_handle(handle);
    } else {
        manager.link_handle(&handle);
    }

    Ok(())
}
