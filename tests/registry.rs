use std::{
    cell::RefCell,
    rc::Rc,
};

use scene_rtti::{
    prelude::*,
    rtti::{
        FieldKind,
        type_ids,
    },
};

#[derive(Default, Rtti)]
#[rtti(id = 1000, name = "Stats")]
struct Stats {
    #[rtti(id = 0)]
    level: u32,
    #[rtti(id = 3, name = "display_name")]
    label: String,
    #[rtti(id = 1, array)]
    history: Vec<u32>,
    #[rtti(id = 2, reflectable)]
    bonus: Bonus,
    #[rtti(id = 4, pointer)]
    owner: Option<Rc<RefCell<Stats>>>,
    cache: Vec<u8>,
}

#[derive(Default, Rtti)]
#[rtti(id = 1001)]
struct Bonus {
    #[rtti(id = 0)]
    amount: i32,
}

#[derive(Default, Rtti)]
#[rtti(id = 1000, name = "Impostor")]
struct Impostor;

#[test]
fn test_register_and_lookup() {
    let mut registry = TypeRegistry::new();
    registry.register::<Stats>().register::<Bonus>();

    assert_eq!(registry.len(), 2);

    let stats = registry.get(1000).unwrap();
    assert_eq!(stats.name(), "Stats");

    // Declaration order, skipping fields without an id.
    let ids = stats
        .fields()
        .iter()
        .map(|field| field.id())
        .collect::<Vec<_>>();
    assert_eq!(ids, [0, 3, 1, 2, 4]);

    let label = stats.field(3).unwrap();
    assert_eq!(label.name(), "display_name");
    assert_eq!(label.kind(), FieldKind::Plain);

    let history = stats.field(1).unwrap();
    assert!(history.is_array());
    assert_eq!(history.kind(), FieldKind::Plain);

    assert_eq!(stats.field(2).unwrap().kind(), FieldKind::Reflectable);
    assert_eq!(stats.field(4).unwrap().kind(), FieldKind::ReflectablePtr);
    assert!(stats.field(5).is_none());

    assert_eq!(registry.get(1001).unwrap().name(), "Bonus");
}

#[test]
fn test_unknown_id_is_not_found() {
    let registry = TypeRegistry::with_engine_types();

    assert!(registry.get(4242).is_none());
    assert!(!registry.contains(4242));
}

#[test]
fn test_register_twice_is_noop() {
    let mut registry = TypeRegistry::new();
    registry.register::<Stats>().register::<Stats>();

    assert_eq!(registry.len(), 1);
}

#[test]
#[should_panic(expected = "already registered")]
fn test_conflicting_id_panics() {
    let mut registry = TypeRegistry::new();
    registry.register::<Stats>().register::<Impostor>();
}

#[test]
fn test_engine_types() {
    let registry = TypeRegistry::with_engine_types();

    for id in [
        type_ids::SERIALIZED_OBJECT,
        type_ids::SERIALIZED_ENTRY,
        type_ids::SERIALIZED_INSTANCE,
        type_ids::GAME_OBJECT_HANDLE,
        type_ids::SCENE_OBJECT,
        type_ids::COMPONENT,
        type_ids::PREFAB_DIFF,
        type_ids::PREFAB_OBJECT_DIFF,
        type_ids::PREFAB_COMPONENT_DIFF,
    ] {
        assert!(registry.contains(id), "type {id} is missing");
    }

    assert!(
        registry
            .iter()
            .all(|descriptor| descriptor.id() < type_ids::FIRST_USER_TYPE_ID)
    );
}

#[test]
fn test_factory_builds_defaults() {
    let mut registry = TypeRegistry::new();
    registry.register::<Stats>().register::<Bonus>();

    let descriptor = registry.get(1000).unwrap();

    let boxed = descriptor.new_boxed();
    assert_eq!(boxed.rtti_id(), 1000);

    let shared = descriptor.new_shared();
    let stats = shared.downcast::<Stats>().unwrap();
    assert_eq!(stats.borrow().level, 0);
    assert!(stats.borrow().owner.is_none());
    assert!(shared.downcast::<Bonus>().is_none());
}
