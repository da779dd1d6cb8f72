use std::{
    cell::RefCell,
    collections::HashSet,
    rc::Rc,
    sync::Arc,
};

use scene_rtti::{
    prelude::*,
    rtti::type_ids,
    serialized::{
        ReferenceScanner,
        find_instances_of_kind,
    },
};

#[derive(Default, Rtti)]
#[rtti(id = 1000, name = "Target")]
struct Target {
    #[rtti(id = 0, reflectable)]
    handle: GameObjectHandle,
    #[rtti(id = 1, reflectable, array)]
    handles: Vec<GameObjectHandle>,
}

#[derive(Default, Rtti)]
#[rtti(id = 1001, name = "Roster")]
struct Roster {
    #[rtti(id = 0, reflectable)]
    leader: GameObjectHandle,
    #[rtti(id = 1, pointer)]
    left: Option<Rc<RefCell<Target>>>,
    #[rtti(id = 2, pointer)]
    right: Option<Rc<RefCell<Target>>>,
    #[rtti(id = 3, pointer, array)]
    more: Vec<Rc<RefCell<Target>>>,
    #[rtti(id = 4, pointer)]
    nested: Option<Rc<RefCell<Roster>>>,
}

#[derive(Default, Rtti)]
#[rtti(id = 1002, name = "Hidden")]
struct Hidden {
    #[rtti(id = 0, reflectable)]
    handle: GameObjectHandle,
}

#[derive(Default, Rtti)]
#[rtti(id = 1003, name = "Wrapper")]
struct Wrapper {
    #[rtti(id = 0, reflectable, dynamic)]
    inner: Option<Box<dyn Reflectable>>,
    #[rtti(id = 1, reflectable)]
    handle: GameObjectHandle,
}

fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::with_engine_types();
    registry
        .register::<Target>()
        .register::<Roster>()
        .register::<Hidden>()
        .register::<Wrapper>();
    registry
}

fn target(ids: &[u64]) -> Rc<RefCell<Target>> {
    Rc::new(RefCell::new(Target {
        handle: GameObjectHandle::from_id(ids[0]),
        handles: ids[1..].iter().copied().map(GameObjectHandle::from_id).collect(),
    }))
}

fn handle_ids(serializer: &BinarySerializer, nodes: &[SerializedObjectRef]) -> anyhow::Result<Vec<u64>> {
    let mut ids = Vec::new();
    for node in nodes {
        let handle = serializer.decode_intermediate(node)?.unwrap();
        ids.push(scene_rtti::rtti::cast_box::<GameObjectHandle>(handle)?.instance_id());
    }
    Ok(ids)
}

#[test]
fn test_finds_every_handle_once() -> anyhow::Result<()> {
    let registry = Arc::new(registry());
    let serializer = BinarySerializer::new(registry.clone());

    let shared = target(&[1, 2, 3]);
    let roster: ReflectPtr = Rc::new(RefCell::new(Roster {
        leader: GameObjectHandle::from_id(10),
        left: Some(shared.clone()),
        right: Some(shared.clone()),
        more: vec![shared, target(&[4])],
        nested: Some(Rc::new(RefCell::new(Roster {
            leader: GameObjectHandle::from_id(11),
            ..Default::default()
        }))),
    }));

    let root = serializer.encode_object(&roster)?;
    let found = find_instances_of_kind(&registry, &root, type_ids::GAME_OBJECT_HANDLE)?;

    let keys = found.iter().map(Rc::as_ptr).collect::<HashSet<_>>();
    assert_eq!(keys.len(), found.len());

    let mut ids = handle_ids(&serializer, &found)?;
    ids.sort_unstable();
    assert_eq!(ids, [1, 2, 3, 4, 10, 11]);

    Ok(())
}

#[test]
fn test_discovery_order() -> anyhow::Result<()> {
    let registry = Arc::new(registry());
    let serializer = BinarySerializer::new(registry.clone());

    let roster: ReflectPtr = Rc::new(RefCell::new(Roster {
        leader: GameObjectHandle::from_id(1),
        left: Some(target(&[2, 3])),
        right: Some(target(&[4])),
        ..Default::default()
    }));

    let root = serializer.encode_object(&roster)?;
    let found = find_instances_of_kind(&registry, &root, type_ids::GAME_OBJECT_HANDLE)?;

    assert_eq!(handle_ids(&serializer, &found)?, [1, 2, 3, 4]);

    Ok(())
}

#[test]
fn test_target_nodes_are_not_descended() -> anyhow::Result<()> {
    let registry = Arc::new(registry());
    let serializer = BinarySerializer::new(registry.clone());

    let outer: ReflectPtr = Rc::new(RefCell::new(Roster {
        nested: Some(Rc::new(RefCell::new(Roster {
            nested: Some(Rc::new(RefCell::new(Roster::default()))),
            ..Default::default()
        }))),
        ..Default::default()
    }));

    let root = serializer.encode_object(&outer)?;

    // The root is itself of the target type.
    let found = find_instances_of_kind(&registry, &root, 1001)?;
    assert_eq!(found.len(), 1);
    assert!(Rc::ptr_eq(&found[0], &root));

    Ok(())
}

#[test]
fn test_dynamic_fields_are_followed() -> anyhow::Result<()> {
    let registry = Arc::new(registry());
    let serializer = BinarySerializer::new(registry.clone());

    let wrapper = Wrapper {
        inner: Some(Box::new(Hidden {
            handle: GameObjectHandle::from_id(5),
        })),
        handle: GameObjectHandle::from_id(6),
    };

    let root = serializer.encode_intermediate(&wrapper)?.into_ref();
    let found = find_instances_of_kind(&registry, &root, type_ids::GAME_OBJECT_HANDLE)?;

    assert_eq!(handle_ids(&serializer, &found)?, [5, 6]);

    Ok(())
}

#[test]
fn test_unknown_types_are_skipped() -> anyhow::Result<()> {
    let wrapper = Wrapper {
        inner: Some(Box::new(Hidden {
            handle: GameObjectHandle::from_id(5),
        })),
        handle: GameObjectHandle::from_id(6),
    };
    let root = BinarySerializer::new(Arc::new(registry()))
        .encode_intermediate(&wrapper)?
        .into_ref();

    let mut partial = TypeRegistry::with_engine_types();
    partial.register::<Wrapper>();

    let found = find_instances_of_kind(&partial, &root, type_ids::GAME_OBJECT_HANDLE)?;
    assert_eq!(found.len(), 1);

    Ok(())
}

#[test]
fn test_scanner_accumulates_over_roots() -> anyhow::Result<()> {
    let registry = Arc::new(registry());
    let serializer = BinarySerializer::new(registry.clone());

    let shared = target(&[1]);
    let first = serializer.encode_object(&(shared.clone() as ReflectPtr))?;
    let second = serializer.encode_object(&(target(&[2, 3]) as ReflectPtr))?;

    let mut scanner = ReferenceScanner::new(&registry, type_ids::GAME_OBJECT_HANDLE);
    scanner.scan(&first)?;
    scanner.scan(&second)?;
    scanner.scan(&first)?;

    assert_eq!(scanner.found().len(), 3);
    assert_eq!(handle_ids(&serializer, &scanner.into_nodes())?, [1, 2, 3]);

    Ok(())
}
