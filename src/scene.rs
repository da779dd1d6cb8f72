//! Scene hierarchy: objects, their components and children.

use std::{
    cell::RefCell,
    rc::Rc,
};

use crate::{
    game_object::{
        GameObject,
        GameObjectManager,
        restore_identity,
    },
    prefab::PrefabDiff,
    rtti::{
        ReflectPtr,
        Reflectable,
        Rtti,
        cast,
        cast_mut,
        type_ids,
    },
};

/// A node of the scene hierarchy.
///
/// `link_id` is the stable id the object has in its prefab. Instances of a prefab
/// carry the link ids of the template objects they were cloned from, which is how
/// prefab diffs match instance objects against the template.
#[derive(Default, Rtti)]
#[rtti(id = type_ids::SCENE_OBJECT, name = "SceneObject", ended = restore_identity::<Self>)]
pub struct SceneObject {
    #[rtti(id = 0)]
    instance_id: u64,
    #[rtti(id = 1)]
    link_id: Option<u32>,
    #[rtti(id = 2)]
    name: String,
    #[rtti(id = 3, pointer, array)]
    components: Vec<Rc<RefCell<Component>>>,
    #[rtti(id = 4, pointer, array)]
    children: Vec<Rc<RefCell<SceneObject>>>,
    #[rtti(id = 5, pointer)]
    prefab_diff: Option<Rc<RefCell<PrefabDiff>>>,
}

impl SceneObject {
    /// Creates an object and registers it with `manager`.
    pub fn new(manager: &GameObjectManager, name: impl Into<String>) -> Rc<RefCell<Self>> {
        let object = Rc::new(RefCell::new(Self {
            name: name.into(),
            ..Default::default()
        }));
        let id = manager.register_object(&(object.clone() as ReflectPtr));
        object.borrow_mut().instance_id = id;
        object
    }

    /// The object name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the object.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// The id of the matching object in the prefab, if any.
    pub fn link_id(&self) -> Option<u32> {
        self.link_id
    }

    /// Sets the id of the matching object in the prefab.
    pub fn set_link_id(&mut self, link_id: Option<u32>) {
        self.link_id = link_id;
    }

    /// Components, in insertion order.
    pub fn components(&self) -> &[Rc<RefCell<Component>>] {
        &self.components
    }

    /// Appends a component.
    pub fn add_component(&mut self, component: Rc<RefCell<Component>>) {
        self.components.push(component);
    }

    /// Removes every component whose link id is `link_id`.
    pub fn remove_component(&mut self, link_id: u32) {
        self.components
            .retain(|component| component.borrow().link_id != Some(link_id));
    }

    /// Returns the component linked to `link_id`.
    pub fn component_by_link(&self, link_id: u32) -> Option<Rc<RefCell<Component>>> {
        self.components
            .iter()
            .find(|component| component.borrow().link_id == Some(link_id))
            .cloned()
    }

    /// Children, in insertion order.
    pub fn children(&self) -> &[Rc<RefCell<SceneObject>>] {
        &self.children
    }

    /// Appends a child.
    pub fn add_child(&mut self, child: Rc<RefCell<SceneObject>>) {
        self.children.push(child);
    }

    /// Removes every child whose link id is `link_id`.
    pub fn remove_child(&mut self, link_id: u32) {
        self.children
            .retain(|child| child.borrow().link_id != Some(link_id));
    }

    /// Returns the child linked to `link_id`.
    pub fn child_by_link(&self, link_id: u32) -> Option<Rc<RefCell<SceneObject>>> {
        self.children
            .iter()
            .find(|child| child.borrow().link_id == Some(link_id))
            .cloned()
    }

    /// Returns the first child named `name`.
    pub fn find_child(&self, name: &str) -> Option<Rc<RefCell<SceneObject>>> {
        self.children
            .iter()
            .find(|child| child.borrow().name == name)
            .cloned()
    }

    /// The diff recorded against the prefab this object was instantiated from.
    pub fn prefab_diff(&self) -> Option<&Rc<RefCell<PrefabDiff>>> {
        self.prefab_diff.as_ref()
    }

    /// Replaces the recorded prefab diff.
    pub fn set_prefab_diff(&mut self, diff: Option<Rc<RefCell<PrefabDiff>>>) {
        self.prefab_diff = diff;
    }
}

impl GameObject for SceneObject {
    fn instance_id(&self) -> u64 {
        self.instance_id
    }

    fn set_instance_id(&mut self, id: u64) {
        self.instance_id = id;
    }
}

impl std::fmt::Debug for SceneObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneObject")
            .field("instance_id", &self.instance_id)
            .field("link_id", &self.link_id)
            .field("name", &self.name)
            .field("components", &self.components.len())
            .field("children", &self.children.len())
            .finish_non_exhaustive()
    }
}

/// A component attached to a [`SceneObject`], carrying a reflectable payload.
#[derive(Default, Rtti)]
#[rtti(id = type_ids::COMPONENT, name = "Component", ended = restore_identity::<Self>)]
pub struct Component {
    #[rtti(id = 0)]
    instance_id: u64,
    #[rtti(id = 1)]
    link_id: Option<u32>,
    #[rtti(id = 2, reflectable, dynamic)]
    data: Option<Box<dyn Reflectable>>,
}

impl Component {
    /// Creates a component holding `data` and registers it with `manager`.
    pub fn new<T: Rtti>(manager: &GameObjectManager, data: T) -> Rc<RefCell<Self>> {
        Self::from_boxed(manager, Box::new(data))
    }

    /// Creates a component holding a type-erased payload and registers it with `manager`.
    pub fn from_boxed(manager: &GameObjectManager, data: Box<dyn Reflectable>) -> Rc<RefCell<Self>> {
        let component = Rc::new(RefCell::new(Self {
            data: Some(data),
            ..Default::default()
        }));
        let id = manager.register_object(&(component.clone() as ReflectPtr));
        component.borrow_mut().instance_id = id;
        component
    }

    /// The id of the matching component in the prefab, if any.
    pub fn link_id(&self) -> Option<u32> {
        self.link_id
    }

    /// Sets the id of the matching component in the prefab.
    pub fn set_link_id(&mut self, link_id: Option<u32>) {
        self.link_id = link_id;
    }

    /// The payload.
    pub fn data(&self) -> Option<&dyn Reflectable> {
        self.data.as_deref()
    }

    /// The payload.
    pub fn data_mut(&mut self) -> Option<&mut (dyn Reflectable + 'static)> {
        self.data.as_deref_mut()
    }

    /// Replaces the payload.
    pub fn set_data(&mut self, data: Option<Box<dyn Reflectable>>) {
        self.data = data;
    }

    /// The payload downcast to `T`.
    pub fn data_as<T: Rtti>(&self) -> Option<&T> {
        self.data().and_then(|data| cast::<T>(data).ok())
    }

    /// The payload downcast to `T`.
    pub fn data_as_mut<T: Rtti>(&mut self) -> Option<&mut T> {
        self.data.as_deref_mut().and_then(|data| cast_mut::<T>(data).ok())
    }
}

impl GameObject for Component {
    fn instance_id(&self) -> u64 {
        self.instance_id
    }

    fn set_instance_id(&mut self, id: u64) {
        self.instance_id = id;
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("instance_id", &self.instance_id)
            .field("link_id", &self.link_id)
            .field("data", &self.data.as_ref().map(|data| data.rtti_name()))
            .finish()
    }
}
