//! Live game objects, weak handles to them and the identity-reassignment pass.

use crate::{
    error::Error,
    rtti::{
        Rtti,
        cast,
        cast_mut,
    },
    serializer::{
        DecodeContext,
        DecodeTarget,
    },
};

mod handle;
mod manager;

pub use self::{
    handle::GameObjectHandle,
    manager::{
        DeferredCallback,
        GameObjectManager,
    },
};

/// A reflectable object tracked by a [`GameObjectManager`] under an instance id.
pub trait GameObject: Rtti {
    /// The id the object is registered under.
    fn instance_id(&self) -> u64;

    /// Replaces the instance id.
    fn set_instance_id(&mut self, id: u64);
}

/// Deserialization-ended hook giving a decoded game object a fresh instance id.
///
/// While the identity pass is active, the object is registered with the manager
/// as the replacement of the id it was saved with, so that handles to the saved
/// id follow it. Outside of a pass the saved id is kept.
///
/// # Errors
/// - [`Error::TypeMismatch`] if the hook is installed on a type other than `T`.
pub fn restore_identity<T: GameObject>(target: DecodeTarget<'_>, context: &DecodeContext) -> Result<(), Error> {
    let Some(manager) = context.active_pass() else {
        return Ok(());
    };

    let Some(object) = target.shared().cloned() else {
        log::debug!("inline `{}` keeps its saved instance id", T::RTTI_NAME);
        return Ok(());
    };

    let saved_id = cast::<T>(&*object.borrow())?.instance_id();
    let id = manager.restore_object(saved_id, &object);
    cast_mut::<T>(&mut *object.borrow_mut())?.set_instance_id(id);

    log::trace!("restored `{}` {saved_id} as {id}", T::RTTI_NAME);
    Ok(())
}
