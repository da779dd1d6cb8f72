use std::{
    cell::RefCell,
    rc::Rc,
    sync::Arc,
};

use scene_rtti::{
    prefab::PrefabObjectDiff,
    prelude::*,
    rtti::{
        cast_box,
        type_ids,
    },
    serialized::find_instances_of_kind,
    serializer::{
        DecodeSession,
        StashedHandle,
    },
};

#[derive(Default, Rtti)]
#[rtti(id = 1000, name = "Follow")]
struct Follow {
    #[rtti(id = 0, reflectable)]
    target: GameObjectHandle,
}

#[derive(Default, Rtti)]
#[rtti(id = 1001, name = "Health")]
struct Health {
    #[rtti(id = 0)]
    current: u32,
}

struct Fixture {
    manager: Rc<GameObjectManager>,
    serializer: BinarySerializer,
    prefab: Prefab,
}

// A squad whose root follows its leader child.
fn fixture() -> Fixture {
    let mut registry = TypeRegistry::with_engine_types();
    registry.register::<Follow>().register::<Health>();

    let manager = Rc::new(GameObjectManager::new());
    let serializer = BinarySerializer::new(Arc::new(registry)).with_identity_pass(manager.clone());

    let root = SceneObject::new(&manager, "squad");
    let leader = SceneObject::new(&manager, "leader");
    leader
        .borrow_mut()
        .add_component(Component::new(&manager, Health { current: 10 }));
    root.borrow_mut()
        .add_component(Component::new(&manager, Follow {
            target: GameObjectHandle::new(&leader),
        }));
    root.borrow_mut().add_child(leader);

    Fixture {
        manager,
        serializer,
        prefab: Prefab::new(root),
    }
}

// A squad whose scout follows the leader.
fn nested_fixture() -> Fixture {
    let mut registry = TypeRegistry::with_engine_types();
    registry.register::<Follow>().register::<Health>();

    let manager = Rc::new(GameObjectManager::new());
    let serializer = BinarySerializer::new(Arc::new(registry)).with_identity_pass(manager.clone());

    let root = SceneObject::new(&manager, "squad");
    let leader = SceneObject::new(&manager, "leader");
    let scout = SceneObject::new(&manager, "scout");
    scout
        .borrow_mut()
        .add_component(Component::new(&manager, Follow {
            target: GameObjectHandle::new(&leader),
        }));
    root.borrow_mut().add_child(leader);
    root.borrow_mut().add_child(scout);

    Fixture {
        manager,
        serializer,
        prefab: Prefab::new(root),
    }
}

fn handle_ids(serializer: &BinarySerializer, fragment: &SerializedObjectRef) -> anyhow::Result<Vec<u64>> {
    let nodes = find_instances_of_kind(serializer.registry(), fragment, type_ids::GAME_OBJECT_HANDLE)?;
    let mut ids = Vec::new();
    for node in nodes {
        let handle = serializer.decode_intermediate(&node)?.unwrap();
        ids.push(cast_box::<GameObjectHandle>(handle)?.instance_id());
    }
    Ok(ids)
}

fn leader_id(object: &Rc<RefCell<SceneObject>>) -> u64 {
    object.borrow().find_child("leader").unwrap().borrow().instance_id()
}

fn diff_root(object: &Rc<RefCell<SceneObject>>) -> Rc<RefCell<PrefabObjectDiff>> {
    object
        .borrow()
        .prefab_diff()
        .unwrap()
        .borrow()
        .root
        .clone()
        .unwrap()
}

// An instance holding two extra components: one following the leader and one
// following an object that never existed.
fn edited_instance(fixture: &Fixture) -> anyhow::Result<Rc<RefCell<SceneObject>>> {
    let Fixture {
        manager,
        serializer,
        prefab,
    } = fixture;

    let instance = prefab.instantiate(serializer, manager)?;
    let leader = instance.borrow().find_child("leader").unwrap();

    instance
        .borrow_mut()
        .add_component(Component::new(manager, Follow {
            target: GameObjectHandle::new(&leader),
        }));
    instance
        .borrow_mut()
        .add_component(Component::new(manager, Follow {
            target: GameObjectHandle::from_id(9999),
        }));

    prefab.record_diff(&instance, serializer)?;
    Ok(instance)
}

#[test]
fn test_instantiate_remaps_handles() -> anyhow::Result<()> {
    let fixture = fixture();
    let instance = fixture.prefab.instantiate(&fixture.serializer, &fixture.manager)?;

    let instance = instance.borrow();
    let leader = instance.find_child("leader").unwrap();
    let follow = instance.components()[0].borrow();
    let target = &follow.data_as::<Follow>().unwrap().target;

    assert_eq!(target.instance_id(), leader.borrow().instance_id());
    assert_ne!(target.instance_id(), leader_id(fixture.prefab.root()));
    assert!(target.is_resolved());

    Ok(())
}

#[test]
fn test_diff_records_handles() -> anyhow::Result<()> {
    let fixture = fixture();
    let instance = edited_instance(&fixture)?;
    let serializer = &fixture.serializer;

    let root = diff_root(&instance);
    let root = root.borrow();

    assert_eq!(root.added_components.len(), 2);
    assert_eq!(handle_ids(serializer, &root.added_components[0])?, [leader_id(&instance)]);
    assert_eq!(handle_ids(serializer, &root.added_components[1])?, [9999]);

    // The template component follows the template leader, the instance one its own.
    assert_eq!(root.component_diffs.len(), 1);
    let data = root.component_diffs[0].borrow().data.clone().unwrap();
    assert_eq!(handle_ids(serializer, &data)?, [leader_id(&instance)]);

    Ok(())
}

#[test]
fn test_load_in_pass_fixes_handles() -> anyhow::Result<()> {
    let fixture = fixture();
    let instance = edited_instance(&fixture)?;
    let Fixture {
        manager,
        serializer,
        ..
    } = &fixture;

    let mut bytes = Vec::new();
    serializer.encode::<DefaultFormat, _>(&mut bytes, &(instance.clone() as ReflectPtr))?;

    manager.start_deserialization();
    let loaded = serializer
        .decode::<DefaultFormat, _>(bytes.as_slice())?
        .unwrap()
        .try_downcast::<SceneObject>()?;
    manager.end_deserialization()?;

    let loaded_leader = leader_id(&loaded);
    assert_ne!(loaded_leader, leader_id(&instance));

    let root = diff_root(&loaded);
    let root = root.borrow();

    assert_eq!(handle_ids(serializer, &root.added_components[0])?, [loaded_leader]);
    let data = root.component_diffs[0].borrow().data.clone().unwrap();
    assert_eq!(handle_ids(serializer, &data)?, [loaded_leader]);

    // A handle to nothing keeps its saved id.
    assert_eq!(handle_ids(serializer, &root.added_components[1])?, [9999]);

    Ok(())
}

#[test]
fn test_load_outside_pass_keeps_handles() -> anyhow::Result<()> {
    let fixture = fixture();
    let instance = edited_instance(&fixture)?;
    let serializer = &fixture.serializer;

    let node = serializer.encode_object(&(instance.clone() as ReflectPtr))?;
    let loaded = serializer.decode_object(&node)?.unwrap().try_downcast::<SceneObject>()?;

    let root = diff_root(&loaded);
    let root = root.borrow();
    assert_eq!(handle_ids(serializer, &root.added_components[0])?, [leader_id(&instance)]);

    Ok(())
}

#[test]
fn test_loaded_diff_reapplies() -> anyhow::Result<()> {
    let fixture = fixture();
    let instance = edited_instance(&fixture)?;
    let Fixture {
        manager,
        serializer,
        prefab,
    } = &fixture;

    let node = serializer.encode_object(&(instance.clone() as ReflectPtr))?;
    manager.start_deserialization();
    let loaded = serializer.decode_object(&node)?.unwrap().try_downcast::<SceneObject>()?;
    manager.end_deserialization()?;

    let updated = prefab.update_instance(&loaded, serializer, manager)?;
    let updated = updated.borrow();
    assert_eq!(updated.components().len(), 3);

    let follow = updated.components()[1].borrow();
    let target = &follow.data_as::<Follow>().unwrap().target;
    assert_eq!(target.instance_id(), leader_id(&loaded));
    assert!(target.is_resolved());

    Ok(())
}

#[test]
fn test_load_in_pass_fixes_nested_handles() -> anyhow::Result<()> {
    let Fixture {
        manager,
        serializer,
        prefab,
    } = nested_fixture();

    let instance = prefab.instantiate(&serializer, &manager)?;
    let scout = instance.borrow().find_child("scout").unwrap();
    let leader = instance.borrow().find_child("leader").unwrap();
    scout
        .borrow_mut()
        .add_component(Component::new(&manager, Follow {
            target: GameObjectHandle::new(&leader),
        }));
    prefab.record_diff(&instance, &serializer)?;

    let node = serializer.encode_object(&(instance.clone() as ReflectPtr))?;
    manager.start_deserialization();
    let loaded = serializer.decode_object(&node)?.unwrap().try_downcast::<SceneObject>()?;
    manager.end_deserialization()?;

    let loaded_leader = leader_id(&loaded);
    assert_ne!(loaded_leader, leader_id(&instance));

    let root = diff_root(&loaded);
    let root = root.borrow();
    assert!(root.added_components.is_empty());
    assert!(root.component_diffs.is_empty());
    assert_eq!(root.child_diffs.len(), 1);

    let scout_diff = root.child_diffs[0].borrow();
    assert_eq!(scout_diff.added_components.len(), 1);
    assert_eq!(handle_ids(&serializer, &scout_diff.added_components[0])?, [loaded_leader]);

    assert_eq!(scout_diff.component_diffs.len(), 1);
    let data = scout_diff.component_diffs[0].borrow().data.clone().unwrap();
    assert_eq!(handle_ids(&serializer, &data)?, [loaded_leader]);

    Ok(())
}

#[test]
fn test_session_misuse() {
    let session = DecodeSession::default();

    assert!(matches!(
        session.finish_handle_fixup(7),
        Err(Error::FixupNotStarted(7))
    ));
    assert!(matches!(
        session.stash_handles(7, Vec::new()),
        Err(Error::FixupNotStarted(7))
    ));

    // Opened but never filled.
    session.begin_handle_fixup(7);
    assert!(session.has_handle_fixup(7));
    assert!(matches!(
        session.finish_handle_fixup(7),
        Err(Error::FixupNotStarted(7))
    ));
    assert!(!session.has_handle_fixup(7));

    session.begin_handle_fixup(8);
    session
        .stash_handles(8, vec![StashedHandle {
            node: SerializedObject::new(type_ids::GAME_OBJECT_HANDLE).into_ref(),
            handle: GameObjectHandle::from_id(1),
        }])
        .unwrap();
    assert_eq!(session.finish_handle_fixup(8).unwrap().len(), 1);
    assert!(session.finish_handle_fixup(8).is_err());
}
