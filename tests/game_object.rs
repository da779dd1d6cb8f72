use std::{
    cell::RefCell,
    rc::Rc,
    sync::Arc,
};

use scene_rtti::prelude::*;

#[derive(Default, Rtti)]
#[rtti(id = 1000, name = "Health")]
struct Health {
    #[rtti(id = 0)]
    current: u32,
}

#[derive(Default, Rtti)]
#[rtti(id = 1001, name = "Follow")]
struct Follow {
    #[rtti(id = 0, reflectable)]
    target: GameObjectHandle,
}

fn serializer() -> BinarySerializer {
    let mut registry = TypeRegistry::with_engine_types();
    registry.register::<Health>().register::<Follow>();
    BinarySerializer::new(Arc::new(registry))
}

#[test]
fn test_register_and_lookup() {
    let manager = GameObjectManager::new();

    let a = SceneObject::new(&manager, "a");
    let b = SceneObject::new(&manager, "b");

    let a_id = a.borrow().instance_id();
    let b_id = b.borrow().instance_id();
    assert_ne!(a_id, b_id);
    assert!(manager.is_alive(a_id));
    assert_eq!(manager.live_count(), 2);

    drop(b);
    assert!(!manager.is_alive(b_id));
    assert_eq!(manager.live_count(), 1);

    manager.unregister_object(a_id);
    assert!(manager.get(a_id).is_none());
}

#[test]
fn test_handle_links_to_live_object() {
    let manager = GameObjectManager::new();
    let object = SceneObject::new(&manager, "target");

    let handle = GameObjectHandle::new(&object);
    assert!(handle.is_resolved());
    assert_eq!(
        handle.with::<SceneObject, _>(|object| object.name().to_owned()),
        Some("target".to_owned())
    );

    let copy = handle.clone();
    assert!(copy.ptr_eq(&handle));
    assert_eq!(copy, GameObjectHandle::from_id(object.borrow().instance_id()));

    drop(object);
    assert!(!handle.is_resolved());
}

#[test]
fn test_pass_remaps_handles() {
    let manager = GameObjectManager::new();
    let restored = SceneObject::new(&manager, "restored");

    manager.start_deserialization();
    assert!(manager.is_deserialization_active());

    let new_id = manager.restore_object(42, &(restored.clone() as ReflectPtr));
    let handle = GameObjectHandle::from_id(42);
    let dangling = GameObjectHandle::from_id(9999);
    manager.track_handle(handle.clone());
    manager.track_handle(dangling.clone());

    // Nothing moves before the pass ends.
    assert_eq!(handle.instance_id(), 42);

    manager.end_deserialization().unwrap();
    assert!(!manager.is_deserialization_active());

    assert_eq!(handle.instance_id(), new_id);
    assert!(handle.is_resolved());

    assert_eq!(dangling.instance_id(), 9999);
    assert!(!dangling.is_resolved());
}

#[test]
fn test_callbacks_run_in_order_after_handles() {
    let manager = GameObjectManager::new();
    let restored = SceneObject::new(&manager, "restored");
    let log = Rc::new(RefCell::new(Vec::new()));

    manager.start_deserialization();
    let new_id = manager.restore_object(7, &(restored as ReflectPtr));
    let handle = GameObjectHandle::from_id(7);
    manager.track_handle(handle.clone());

    for index in 0..3 {
        let log = log.clone();
        let handle = handle.clone();
        manager
            .register_on_deserialization_end(Box::new(move || {
                log.borrow_mut().push((index, handle.instance_id()));
                Ok(())
            }))
            .unwrap();
    }

    assert!(log.borrow().is_empty());
    manager.end_deserialization().unwrap();

    assert_eq!(*log.borrow(), [(0, new_id), (1, new_id), (2, new_id)]);
}

#[test]
fn test_callback_error_stops_the_queue() {
    let manager = GameObjectManager::new();
    let ran = Rc::new(RefCell::new(false));

    manager.start_deserialization();
    manager
        .register_on_deserialization_end(Box::new(|| Err(Error::InvalidReference(3))))
        .unwrap();
    let flag = ran.clone();
    manager
        .register_on_deserialization_end(Box::new(move || {
            *flag.borrow_mut() = true;
            Ok(())
        }))
        .unwrap();

    assert!(matches!(
        manager.end_deserialization(),
        Err(Error::InvalidReference(3))
    ));
    assert!(!*ran.borrow());
    assert!(!manager.is_deserialization_active());
}

#[test]
fn test_callback_outside_pass_runs_immediately() {
    let manager = GameObjectManager::new();
    let ran = Rc::new(RefCell::new(false));

    let flag = ran.clone();
    manager
        .register_on_deserialization_end(Box::new(move || {
            *flag.borrow_mut() = true;
            Ok(())
        }))
        .unwrap();

    assert!(*ran.borrow());
}

#[test]
#[should_panic(expected = "already active")]
fn test_nested_pass_panics() {
    let manager = GameObjectManager::new();
    manager.start_deserialization();
    manager.start_deserialization();
}

#[test]
fn test_decode_in_pass_reassigns_ids() -> anyhow::Result<()> {
    let manager = Rc::new(GameObjectManager::new());
    let serializer = serializer().with_identity_pass(manager.clone());

    let root = SceneObject::new(&manager, "root");
    let child = SceneObject::new(&manager, "child");
    root.borrow_mut().add_child(child.clone());
    root.borrow_mut()
        .add_component(Component::new(&manager, Follow {
            target: GameObjectHandle::new(&child),
        }));
    root.borrow_mut()
        .add_component(Component::new(&manager, Health { current: 30 }));

    let node = serializer.encode_object(&(root.clone() as ReflectPtr))?;

    manager.start_deserialization();
    let copy = serializer.decode_object(&node)?.unwrap().try_downcast::<SceneObject>()?;
    manager.end_deserialization()?;

    let copy = copy.borrow();
    assert_ne!(copy.instance_id(), root.borrow().instance_id());
    assert!(manager.is_alive(copy.instance_id()));

    let copy_child = copy.find_child("child").unwrap();
    let copy_child_id = copy_child.borrow().instance_id();
    assert_ne!(copy_child_id, child.borrow().instance_id());

    let follow = copy.components()[0].clone();
    let follow = follow.borrow();
    let target = &follow.data_as::<Follow>().unwrap().target;
    assert_eq!(target.instance_id(), copy_child_id);
    assert!(Rc::ptr_eq(&target.get().unwrap(), &(copy_child.clone() as ReflectPtr)));

    assert_eq!(
        copy.components()[1].borrow().data_as::<Health>().unwrap().current,
        30
    );

    Ok(())
}

#[test]
fn test_decode_outside_pass_keeps_ids() -> anyhow::Result<()> {
    let manager = Rc::new(GameObjectManager::new());
    let serializer = serializer().with_identity_pass(manager.clone());

    let root = SceneObject::new(&manager, "root");
    let node = serializer.encode_object(&(root.clone() as ReflectPtr))?;

    let copy = serializer.decode_object(&node)?.unwrap().try_downcast::<SceneObject>()?;
    assert_eq!(copy.borrow().instance_id(), root.borrow().instance_id());

    Ok(())
}

#[test]
fn test_expired_objects_are_pruned() {
    let manager = GameObjectManager::new();
    let kept = SceneObject::new(&manager, "kept");
    let dropped = SceneObject::new(&manager, "dropped");
    drop(dropped);

    assert_eq!(manager.prune(), 1);
    assert_eq!(manager.prune(), 0);

    drop(SceneObject::new(&manager, "temporary"));
    manager.start_deserialization();
    manager.end_deserialization().unwrap();
    assert_eq!(manager.prune(), 0);

    // Registration prunes as the table grows.
    for index in 0..1000 {
        drop(SceneObject::new(&manager, format!("spawned {index}")));
    }
    assert!(manager.prune() < 128);

    assert!(manager.is_alive(kept.borrow().instance_id()));
    assert_eq!(manager.live_count(), 1);
}
