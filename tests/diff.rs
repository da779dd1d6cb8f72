use std::sync::Arc;

use scene_rtti::{
    prelude::*,
    rtti::cast,
    serialized::{
        EntryData,
        PersistedGraph,
        generate_diff,
        objects_equal,
    },
};

#[derive(Default, Rtti)]
#[rtti(id = 1000, name = "Attributes")]
struct Attributes {
    #[rtti(id = 0)]
    speed: f32,
    #[rtti(id = 1)]
    armor: u32,
}

#[derive(Default, Rtti)]
#[rtti(id = 1001, name = "Unit")]
struct Unit {
    #[rtti(id = 0)]
    name: String,
    #[rtti(id = 1, reflectable)]
    attributes: Attributes,
    #[rtti(id = 2, array)]
    abilities: Vec<String>,
    #[rtti(id = 3)]
    level: u32,
}

#[derive(Default, Rtti)]
#[rtti(id = 1002, name = "Marker")]
struct Marker {
    #[rtti(id = 0)]
    level: u32,
}

#[derive(Default, Rtti)]
#[rtti(id = 1003, name = "Slot")]
struct Slot {
    #[rtti(id = 0, reflectable, dynamic)]
    item: Option<Box<dyn Reflectable>>,
    #[rtti(id = 1)]
    count: u32,
}

fn serializer() -> BinarySerializer {
    let mut registry = TypeRegistry::new();
    registry
        .register::<Attributes>()
        .register::<Unit>()
        .register::<Marker>()
        .register::<Slot>();
    BinarySerializer::new(Arc::new(registry))
}

fn unit() -> Unit {
    Unit {
        name: "archer".into(),
        attributes: Attributes {
            speed: 1.5,
            armor: 2,
        },
        abilities: vec!["volley".into()],
        level: 1,
    }
}

#[test]
fn test_identical_objects_have_no_diff() -> anyhow::Result<()> {
    let serializer = serializer();

    let orig = serializer.encode_intermediate(&unit())?;
    let new = serializer.encode_intermediate(&unit())?;

    assert!(generate_diff(&orig, &new).is_none());
    assert!(objects_equal(&orig.into_ref(), &new.into_ref()));

    Ok(())
}

#[test]
fn test_only_changed_fields_are_recorded() -> anyhow::Result<()> {
    let serializer = serializer();

    let mut changed = unit();
    changed.level = 4;
    changed.attributes.armor = 7;

    let orig = serializer.encode_intermediate(&unit())?;
    let new = serializer.encode_intermediate(&changed)?;
    let diff = generate_diff(&orig, &new).unwrap();

    let ids = diff
        .entries()
        .iter()
        .map(|entry| entry.field_id)
        .collect::<Vec<_>>();
    assert_eq!(ids, [1, 3]);

    // The nested object only records its own changed field.
    let EntryData::Instance(SerializedInstance::Object(nested)) = &diff.entry(1).unwrap().data else {
        panic!("expected an inline object");
    };
    let nested = nested.borrow();
    assert_eq!(nested.entries().len(), 1);
    assert_eq!(nested.entries()[0].field_id, 1);

    Ok(())
}

#[test]
fn test_arrays_are_recorded_whole() -> anyhow::Result<()> {
    let serializer = serializer();

    let mut changed = unit();
    changed.abilities.push("snipe".into());

    let orig = serializer.encode_intermediate(&unit())?;
    let new = serializer.encode_intermediate(&changed)?;
    let diff = generate_diff(&orig, &new).unwrap();

    let EntryData::Array(elements) = &diff.entry(2).unwrap().data else {
        panic!("expected an array");
    };
    assert_eq!(elements.len(), 2);

    Ok(())
}

#[test]
fn test_type_change_records_everything() -> anyhow::Result<()> {
    let serializer = serializer();

    let orig = serializer.encode_intermediate(&unit())?;
    let new = serializer.encode_intermediate(&Marker { level: 1 })?;
    let diff = generate_diff(&orig, &new).unwrap();

    assert_eq!(diff.type_id(), 1002);
    assert_eq!(diff.entries().len(), 1);

    Ok(())
}

#[test]
fn test_apply_diff() -> anyhow::Result<()> {
    let serializer = serializer();

    let mut changed = unit();
    changed.name = "ranger".into();
    changed.attributes.speed = 3.0;
    changed.abilities = vec!["track".into(), "hide".into()];

    let orig = serializer.encode_intermediate(&unit())?;
    let new = serializer.encode_intermediate(&changed)?;
    let diff = generate_diff(&orig, &new).unwrap();

    let mut target = unit();
    serializer.apply_diff(&mut target, &diff)?;

    assert_eq!(target.name, "ranger");
    assert_eq!(target.attributes.speed, 3.0);
    assert_eq!(target.attributes.armor, 2);
    assert_eq!(target.abilities, ["track", "hide"]);
    assert_eq!(target.level, 1);

    let patched = serializer.encode_intermediate(&target)?;
    assert!(objects_equal(&patched.into_ref(), &new.into_ref()));

    Ok(())
}

#[test]
fn test_apply_diff_of_other_type_fails() -> anyhow::Result<()> {
    let serializer = serializer();

    let diff = serializer.encode_intermediate(&Marker { level: 3 })?;
    let mut target = unit();

    let error = serializer.apply_diff(&mut target, &diff).unwrap_err();
    assert!(matches!(
        error,
        Error::TypeMismatch {
            expected: "Unit",
            found: "Marker"
        }
    ));

    let mut marker = Marker::default();
    serializer.apply_diff(&mut marker, &diff)?;
    assert_eq!(cast::<Marker>(&marker)?.level, 3);

    Ok(())
}

#[test]
fn test_removed_value_is_cleared() -> anyhow::Result<()> {
    let serializer = serializer();

    let full = Slot {
        item: Some(Box::new(Marker { level: 2 })),
        count: 1,
    };
    let emptied = Slot {
        item: None,
        count: 1,
    };

    let orig = serializer.encode_intermediate(&full)?;
    let new = serializer.encode_intermediate(&emptied)?;
    let diff = generate_diff(&orig, &new).unwrap();

    assert!(diff.entries().is_empty());
    assert_eq!(diff.cleared(), [0]);

    // Cleared fields survive persistence.
    let diff = PersistedGraph::from_root(&diff.into_ref()).into_root()?;
    assert_eq!(diff.borrow().cleared(), [0]);

    let mut target = Slot {
        item: Some(Box::new(Marker { level: 2 })),
        count: 1,
    };
    serializer.apply_diff(&mut target, &diff.borrow())?;
    assert!(target.item.is_none());
    assert_eq!(target.count, 1);

    // Setting the value again records it and drops the clear.
    let diff = generate_diff(&new, &orig).unwrap();
    assert!(diff.cleared().is_empty());
    assert!(diff.entry(0).is_some());

    Ok(())
}

#[test]
fn test_undecodable_array_element_keeps_previous_array() -> anyhow::Result<()> {
    let serializer = serializer();

    let mut changed = unit();
    changed.abilities = vec!["track".into(), "hide".into()];
    let orig = serializer.encode_intermediate(&unit())?;
    let new = serializer.encode_intermediate(&changed)?;
    let mut diff = generate_diff(&orig, &new).unwrap();

    // The second element holds a number where a string is expected.
    let number = serializer.encode_intermediate(&Marker { level: 9 })?;
    let number = number.entry(0).unwrap().instances().next().unwrap().clone();
    let mut entry = diff.remove(2).unwrap();
    let EntryData::Array(elements) = &mut entry.data else {
        panic!("expected an array");
    };
    elements[1] = number;
    diff.insert(entry);

    let mut target = unit();
    serializer.apply_diff(&mut target, &diff)?;
    assert_eq!(target.abilities, ["volley"]);

    Ok(())
}
