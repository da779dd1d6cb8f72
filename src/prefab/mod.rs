//! Prefabs and the diffs that carry instance changes across prefab updates.

use std::{
    cell::RefCell,
    rc::Rc,
};

use crate::{
    error::Error,
    game_object::GameObjectManager,
    rtti::{
        ReflectPtr,
        Rtti,
    },
    scene::SceneObject,
    serializer::BinarySerializer,
};

mod diff;
mod fixup;

pub use self::diff::{
    PrefabComponentDiff,
    PrefabDiff,
    PrefabObjectDiff,
};

/// A scene object hierarchy used as a template for instances.
///
/// Every object and component of the template carries a link id. Instances keep
/// those ids, which lets a [`PrefabDiff`] recorded on an instance be replayed onto a
/// fresh instance after the template changed.
#[derive(Debug)]
pub struct Prefab {
    root: Rc<RefCell<SceneObject>>,
    next_link_id: u32,
}

impl Prefab {
    /// Wraps `root` as a template, assigning link ids to every object and component
    /// that lacks one.
    pub fn new(root: Rc<RefCell<SceneObject>>) -> Self {
        let mut prefab = Self { root, next_link_id: 0 };
        prefab.update_links();
        prefab
    }

    /// The template root.
    pub fn root(&self) -> &Rc<RefCell<SceneObject>> {
        &self.root
    }

    /// Assigns link ids to objects and components added to the template since the
    /// last call. Existing link ids are kept.
    pub fn update_links(&mut self) {
        let mut objects = vec![self.root.clone()];
        let mut unlinked_objects = Vec::new();
        let mut unlinked_components = Vec::new();

        while let Some(object) = objects.pop() {
            let object_ref = object.borrow();
            match object_ref.link_id() {
                Some(link_id) => self.next_link_id = self.next_link_id.max(link_id.saturating_add(1)),
                None => unlinked_objects.push(object.clone()),
            }

            for component in object_ref.components() {
                match component.borrow().link_id() {
                    Some(link_id) => self.next_link_id = self.next_link_id.max(link_id.saturating_add(1)),
                    None => unlinked_components.push(component.clone()),
                }
            }

            objects.extend(object_ref.children().iter().rev().cloned());
        }

        for object in unlinked_objects {
            object.borrow_mut().set_link_id(Some(self.allocate_link_id()));
        }
        for component in unlinked_components {
            component.borrow_mut().set_link_id(Some(self.allocate_link_id()));
        }
    }

    /// Clones the template into a new instance.
    ///
    /// The clone goes through the serializer inside an identity pass, so every object
    /// of the instance gets a fresh instance id and handles between template objects
    /// point at their instance counterparts.
    ///
    /// # Errors
    /// - [`Error::UnregisteredType`] if the template holds an unregistered type.
    /// - Any error of decoding the template or of the pass callbacks.
    pub fn instantiate(&self, serializer: &BinarySerializer, manager: &Rc<GameObjectManager>) -> Result<Rc<RefCell<SceneObject>>, Error> {
        let node = serializer.encode_object(&(self.root.clone() as ReflectPtr))?;

        let owns_pass = !manager.is_deserialization_active();
        if owns_pass {
            manager.start_deserialization();
        }

        let decoded = serializer
            .clone()
            .with_identity_pass(manager.clone())
            .decode_object(&node);

        if owns_pass {
            let ended = manager.end_deserialization();
            if decoded.is_ok() {
                ended?;
            }
        }

        match decoded? {
            Some(object) => object.try_downcast::<SceneObject>(),
            None => Err(Error::UnregisteredType {
                type_id: SceneObject::RTTI_ID,
                type_name: SceneObject::RTTI_NAME,
            }),
        }
    }

    /// Records how `instance` differs from the template and stores the diff on it.
    ///
    /// # Errors
    /// See [`PrefabDiff::create`].
    pub fn record_diff(&self, instance: &Rc<RefCell<SceneObject>>, serializer: &BinarySerializer) -> Result<(), Error> {
        let diff = PrefabDiff::create(&self.root.borrow(), &instance.borrow(), serializer)?;
        let diff = (!diff.is_empty()).then(|| Rc::new(RefCell::new(diff)));
        instance.borrow_mut().set_prefab_diff(diff);
        Ok(())
    }

    /// Replaces `instance` with a fresh instance of the template carrying the changes
    /// recorded on `instance`.
    ///
    /// Returns the new instance, which holds the same diff.
    ///
    /// # Errors
    /// See [`instantiate`](Self::instantiate) and [`PrefabDiff::apply`].
    pub fn update_instance(
        &self,
        instance: &Rc<RefCell<SceneObject>>,
        serializer: &BinarySerializer,
        manager: &Rc<GameObjectManager>,
    ) -> Result<Rc<RefCell<SceneObject>>, Error> {
        let diff = instance.borrow().prefab_diff().cloned();
        let updated = self.instantiate(serializer, manager)?;

        if let Some(diff) = diff {
            diff.borrow().apply(&updated, serializer, manager)?;
            updated.borrow_mut().set_prefab_diff(Some(diff));
        }

        Ok(updated)
    }

    fn allocate_link_id(&mut self) -> u32 {
        let id = self.next_link_id;
        self.next_link_id += 1;
        id
    }
}
