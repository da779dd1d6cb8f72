use std::{
    cell::RefCell,
    rc::Rc,
};

use crate::{
    error::Error,
    game_object::GameObjectManager,
    prefab::fixup,
    rtti::{
        ReflectPtr,
        Rtti,
        type_ids,
    },
    scene::{
        Component,
        SceneObject,
    },
    serialized::{
        SerializedObject,
        SerializedObjectRef,
        generate_diff,
    },
    serializer::BinarySerializer,
};

/// The changed fields of one component, matched by link id.
#[derive(Debug, Default, Rtti)]
#[rtti(id = type_ids::PREFAB_COMPONENT_DIFF, name = "PrefabComponentDiff")]
pub struct PrefabComponentDiff {
    /// Link id of the component.
    #[rtti(id = 0)]
    pub id: u32,
    /// The fields of the component payload that differ from the prefab.
    #[rtti(id = 1, pointer)]
    pub data: Option<SerializedObjectRef>,
    /// The instance dropped the payload of the component.
    #[rtti(id = 2)]
    pub cleared: bool,
}

/// The changes made to one scene object and its subtree, matched by link id.
#[derive(Debug, Default, Rtti)]
#[rtti(id = type_ids::PREFAB_OBJECT_DIFF, name = "PrefabObjectDiff")]
pub struct PrefabObjectDiff {
    /// Link id of the object.
    #[rtti(id = 0)]
    pub id: u32,
    /// The new name, if the object was renamed.
    #[rtti(id = 1)]
    pub name: Option<String>,
    /// Field changes of components present in both the prefab and the instance.
    #[rtti(id = 2, pointer, array)]
    pub component_diffs: Vec<Rc<RefCell<PrefabComponentDiff>>>,
    /// Link ids of prefab components missing from the instance.
    #[rtti(id = 3, array)]
    pub removed_components: Vec<u32>,
    /// Fully serialized components only present in the instance.
    #[rtti(id = 4, pointer, array)]
    pub added_components: Vec<SerializedObjectRef>,
    /// Diffs of children present in both the prefab and the instance.
    #[rtti(id = 5, pointer, array)]
    pub child_diffs: Vec<Rc<RefCell<PrefabObjectDiff>>>,
    /// Link ids of prefab children missing from the instance.
    #[rtti(id = 6, array)]
    pub removed_children: Vec<u32>,
    /// Fully serialized children only present in the instance.
    #[rtti(id = 7, pointer, array)]
    pub added_children: Vec<SerializedObjectRef>,
}

impl PrefabObjectDiff {
    /// Returns `true` if the node records no change.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.component_diffs.is_empty()
            && self.removed_components.is_empty()
            && self.added_components.is_empty()
            && self.child_diffs.is_empty()
            && self.removed_children.is_empty()
            && self.added_children.is_empty()
    }
}

/// The differences between a prefab and one of its instances.
///
/// Holds serialized fragments only: changed component fields and fully serialized
/// added components and children. Game object handles embedded in those fragments
/// are rewritten when the diff is decoded during an identity pass, so they keep
/// pointing at the same objects after ids are reassigned.
#[derive(Debug, Default, Rtti)]
#[rtti(
    id = type_ids::PREFAB_DIFF,
    name = "PrefabDiff",
    started = fixup::begin_handle_fixup,
    ended = fixup::collect_handles
)]
pub struct PrefabDiff {
    /// Diff of the root object, `None` if the instance matches the prefab.
    #[rtti(id = 0, pointer)]
    pub root: Option<Rc<RefCell<PrefabObjectDiff>>>,
}

impl PrefabDiff {
    /// Records how `instance` differs from `prefab`.
    ///
    /// Objects and components are matched by link id. Instance items without a
    /// match are recorded as added, prefab items without a match as removed, and
    /// matched components record the fields of their payload that changed.
    ///
    /// # Errors
    /// - [`Error::UnregisteredType`] if a component payload or an added item has an
    ///   unregistered type.
    pub fn create(prefab: &SceneObject, instance: &SceneObject, serializer: &BinarySerializer) -> Result<Self, Error> {
        Ok(Self {
            root: object_diff(prefab, instance, serializer)?
                .map(|diff| Rc::new(RefCell::new(diff))),
        })
    }

    /// Returns `true` if the diff records no change.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Applies the recorded changes to `instance`.
    ///
    /// Per object: rename, remove components, add components, patch components,
    /// remove children, add children, then recurse into child diffs. Added items are
    /// decoded inside an identity pass of `manager`, started here unless one is
    /// already active, so they receive fresh instance ids and their handles resolve.
    ///
    /// # Errors
    /// - Any error of decoding added items or patching components.
    /// - Any error of the deferred callbacks run when the pass started here ends.
    pub fn apply(
        &self,
        instance: &Rc<RefCell<SceneObject>>,
        serializer: &BinarySerializer,
        manager: &Rc<GameObjectManager>,
    ) -> Result<(), Error> {
        let Some(root) = &self.root else {
            return Ok(());
        };

        let owns_pass = !manager.is_deserialization_active();
        if owns_pass {
            manager.start_deserialization();
        }

        let serializer = serializer.clone().with_identity_pass(manager.clone());
        let result = apply_tree(root, instance, &serializer);

        if owns_pass {
            let ended = manager.end_deserialization();
            result?;
            ended
        } else {
            result
        }
    }
}

fn object_diff(
    prefab: &SceneObject,
    instance: &SceneObject,
    serializer: &BinarySerializer,
) -> Result<Option<PrefabObjectDiff>, Error> {
    let mut diff = PrefabObjectDiff {
        id: instance.link_id().or(prefab.link_id()).unwrap_or_default(),
        ..Default::default()
    };

    if prefab.name() != instance.name() {
        diff.name = Some(instance.name().to_owned());
    }

    for prefab_component in prefab.components() {
        let prefab_component = prefab_component.borrow();
        let Some(link_id) = prefab_component.link_id() else {
            continue;
        };

        let Some(instance_component) = instance.component_by_link(link_id) else {
            diff.removed_components.push(link_id);
            continue;
        };

        if let Some(component_diff) = component_diff(
            link_id,
            &prefab_component,
            &instance_component.borrow(),
            serializer,
        )? {
            diff.component_diffs
                .push(Rc::new(RefCell::new(component_diff)));
        }
    }

    for instance_component in instance.components() {
        let linked = instance_component
            .borrow()
            .link_id()
            .is_some_and(|link_id| prefab.component_by_link(link_id).is_some());
        if !linked {
            diff.added_components
                .push(serializer.encode_object(&(instance_component.clone() as ReflectPtr))?);
        }
    }

    for prefab_child in prefab.children() {
        let prefab_child = prefab_child.borrow();
        let Some(link_id) = prefab_child.link_id() else {
            continue;
        };

        let Some(instance_child) = instance.child_by_link(link_id) else {
            diff.removed_children.push(link_id);
            continue;
        };

        if let Some(child_diff) = object_diff(&prefab_child, &instance_child.borrow(), serializer)? {
            diff.child_diffs.push(Rc::new(RefCell::new(child_diff)));
        }
    }

    for instance_child in instance.children() {
        let linked = instance_child
            .borrow()
            .link_id()
            .is_some_and(|link_id| prefab.child_by_link(link_id).is_some());
        if !linked {
            diff.added_children
                .push(serializer.encode_object(&(instance_child.clone() as ReflectPtr))?);
        }
    }

    Ok((!diff.is_empty()).then_some(diff))
}

// Only payloads are compared: instance ids always differ between a prefab and
// its instances.
fn component_diff(
    link_id: u32,
    prefab: &Component,
    instance: &Component,
    serializer: &BinarySerializer,
) -> Result<Option<PrefabComponentDiff>, Error> {
    let data = match (prefab.data(), instance.data()) {
        (Some(orig), Some(new)) => generate_diff(
            &serializer.encode_intermediate(orig)?,
            &serializer.encode_intermediate(new)?,
        ),
        (None, Some(new)) => Some(serializer.encode_intermediate(new)?),
        (Some(_), None) => {
            return Ok(Some(PrefabComponentDiff {
                id: link_id,
                data: None,
                cleared: true,
            }));
        }
        (None, None) => None,
    };

    Ok(data.map(|data| PrefabComponentDiff {
        id: link_id,
        data: Some(data.into_ref()),
        cleared: false,
    }))
}

fn apply_tree(
    root: &Rc<RefCell<PrefabObjectDiff>>,
    instance: &Rc<RefCell<SceneObject>>,
    serializer: &BinarySerializer,
) -> Result<(), Error> {
    let mut pending = vec![(root.clone(), instance.clone())];

    while let Some((diff, object)) = pending.pop() {
        let diff = diff.borrow();
        apply_object(&diff, &object, serializer)?;

        for child_diff in &diff.child_diffs {
            let link_id = child_diff.borrow().id;
            match object.borrow().child_by_link(link_id) {
                Some(child) => pending.push((child_diff.clone(), child)),
                None => log::debug!("no child linked to {link_id}, skipping its diff"),
            }
        }
    }

    Ok(())
}

fn apply_object(
    diff: &PrefabObjectDiff,
    object: &Rc<RefCell<SceneObject>>,
    serializer: &BinarySerializer,
) -> Result<(), Error> {
    if let Some(name) = &diff.name {
        object.borrow_mut().set_name(name.clone());
    }

    for &link_id in &diff.removed_components {
        object.borrow_mut().remove_component(link_id);
    }

    for node in &diff.added_components {
        if let Some(component) = serializer.decode_object(node)? {
            let component = component.try_downcast::<Component>()?;
            object.borrow_mut().add_component(component);
        }
    }

    for component_diff in &diff.component_diffs {
        let component_diff = component_diff.borrow();
        let Some(component) = object.borrow().component_by_link(component_diff.id) else {
            log::debug!("no component linked to {}, skipping its diff", component_diff.id);
            continue;
        };

        if component_diff.cleared {
            component.borrow_mut().set_data(None);
        } else if let Some(data) = &component_diff.data {
            patch_component(&mut component.borrow_mut(), &data.borrow(), serializer)?;
        }
    }

    for &link_id in &diff.removed_children {
        object.borrow_mut().remove_child(link_id);
    }

    for node in &diff.added_children {
        if let Some(child) = serializer.decode_object(node)? {
            let child = child.try_downcast::<SceneObject>()?;
            object.borrow_mut().add_child(child);
        }
    }

    Ok(())
}

fn patch_component(
    component: &mut Component,
    data: &SerializedObject,
    serializer: &BinarySerializer,
) -> Result<(), Error> {
    if let Some(payload) = component.data_mut() {
        if payload.rtti_id() == data.type_id() {
            return serializer.apply_diff(payload, data);
        }
    }

    // The payload type changed: the diff holds the whole new payload.
    let payload = serializer.decode_intermediate(&data.clone().into_ref())?;
    component.set_data(payload);
    Ok(())
}
