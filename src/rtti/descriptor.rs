use std::{
    cell::RefCell,
    collections::HashMap,
    marker::PhantomData,
    rc::Rc,
};

use serde::{
    Serialize,
    de::DeserializeOwned,
};

use crate::{
    error::Error,
    rtti::{
        ReflectPtr,
        Reflectable,
        Rtti,
        SharedObject,
        cast,
        cast_box,
        cast_mut,
        field::{
            FieldAccess,
            FieldDescriptor,
            owned_array_get,
            owned_get,
            owned_get_mut,
        },
    },
    serializer::{
        DecodeContext,
        DecodeTarget,
    },
};

/// A deserialization hook, see [`TypeDescriptorBuilder::on_deserialization_started`]
/// and [`TypeDescriptorBuilder::on_deserialization_ended`].
pub type DecodeHook = fn(DecodeTarget<'_>, &DecodeContext) -> Result<(), Error>;

/// Describes a reflectable type: its id, its fields and how to construct it.
pub struct TypeDescriptor {
    id: u32,
    name: &'static str,
    fields: Vec<FieldDescriptor>,
    index: HashMap<u32, usize>,
    new_boxed: fn() -> Box<dyn Reflectable>,
    new_shared: fn() -> SharedObject,
    on_started: Option<DecodeHook>,
    on_ended: Option<DecodeHook>,
}

impl TypeDescriptor {
    /// Starts building the descriptor of `T`.
    pub fn builder<T: Rtti>() -> TypeDescriptorBuilder<T> {
        TypeDescriptorBuilder {
            descriptor: Self {
                id: T::RTTI_ID,
                name: T::RTTI_NAME,
                fields: Vec::new(),
                index: HashMap::new(),
                new_boxed: new_boxed::<T>,
                new_shared: new_shared::<T>,
                on_started: None,
                on_ended: None,
            },
            marker: PhantomData,
        }
    }

    /// The stable type id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Looks up a field by its id.
    pub fn field(&self, id: u32) -> Option<&FieldDescriptor> {
        self.index.get(&id).map(|&index| &self.fields[index])
    }

    /// Constructs a default instance to be owned inline by its parent.
    pub fn new_boxed(&self) -> Box<dyn Reflectable> {
        (self.new_boxed)()
    }

    /// Constructs a default instance to be shared through pointers.
    pub fn new_shared(&self) -> SharedObject {
        (self.new_shared)()
    }

    /// The hook run before the fields of a decoded instance are populated.
    pub fn on_started(&self) -> Option<DecodeHook> {
        self.on_started
    }

    /// The hook run once a decoded instance is fully wired.
    pub fn on_ended(&self) -> Option<DecodeHook> {
        self.on_ended
    }
}

impl std::fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

fn new_boxed<T: Rtti>() -> Box<dyn Reflectable> {
    Box::<T>::default()
}

fn new_shared<T: Rtti>() -> SharedObject {
    SharedObject::new(T::default())
}

fn erase<V: Rtti>(value: &V) -> &(dyn Reflectable + 'static) {
    value
}

fn erase_mut<V: Rtti>(value: &mut V) -> &mut (dyn Reflectable + 'static) {
    value
}

fn encode_plain<V: Serialize>(field: &'static str, value: &V) -> Result<Vec<u8>, Error> {
    rmp_serde::to_vec_named(value).map_err(|source| Error::PlainEncode { field, source })
}

fn decode_plain<V: DeserializeOwned>(owner: &str, field: &str, bytes: &[u8]) -> Option<V> {
    match rmp_serde::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            log::warn!("keeping default of `{owner}::{field}`, stored value does not decode: {err}");
            None
        }
    }
}

fn downcast_pointer<V: Rtti>(value: Option<SharedObject>) -> Result<Option<Rc<RefCell<V>>>, Error> {
    value.map(|shared| shared.try_downcast::<V>()).transpose()
}

/// Builder for [`TypeDescriptor`].
///
/// Fields are declared in encoding order. Every field takes a stable id that must
/// be unique within the type; declaring an id twice panics.
///
/// ```
/// use scene_rtti::rtti::{Rtti, TypeDescriptor};
///
/// #[derive(Default)]
/// struct Health {
///     current: f32,
///     max: f32,
/// }
///
/// impl Rtti for Health {
///     const RTTI_ID: u32 = 1000;
///     const RTTI_NAME: &'static str = "Health";
///
///     fn rtti() -> TypeDescriptor {
///         TypeDescriptor::builder::<Self>()
///             .plain(0, "current", |h| &h.current, |h| &mut h.current)
///             .plain(1, "max", |h| &h.max, |h| &mut h.max)
///             .build()
///     }
/// }
///
/// assert_eq!(Health::rtti().fields().len(), 2);
/// ```
pub struct TypeDescriptorBuilder<T> {
    descriptor: TypeDescriptor,
    marker: PhantomData<fn() -> T>,
}

impl<T: Rtti> TypeDescriptorBuilder<T> {
    fn push(mut self, id: u32, name: &'static str, access: FieldAccess) -> Self {
        assert!(
            !self.descriptor.index.contains_key(&id),
            "field id {} declared twice in `{}`",
            id,
            T::RTTI_NAME
        );
        self.descriptor.index.insert(id, self.descriptor.fields.len());
        self.descriptor
            .fields
            .push(FieldDescriptor::new(id, name, access));
        self
    }

    /// A plain value, stored as its serialized bytes.
    #[must_use]
    pub fn plain<V>(
        self,
        id: u32,
        name: &'static str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> Self
    where
        V: Serialize + DeserializeOwned + 'static,
    {
        self.push(id, name, FieldAccess::Plain {
            get: Box::new(move |object: &dyn Reflectable| {
                encode_plain(name, get(cast::<T>(object)?)).map(Some)
            }),
            set: Box::new(move |object: &mut dyn Reflectable, bytes: &[u8]| {
                if let Some(value) = decode_plain::<V>(T::RTTI_NAME, name, bytes) {
                    *get_mut(cast_mut::<T>(object)?) = value;
                }
                Ok(())
            }),
        })
    }

    /// A plain value read and written through a computed accessor pair.
    ///
    /// Returning `None` from `get` leaves the field out of the encoding.
    #[must_use]
    pub fn plain_with<V>(
        self,
        id: u32,
        name: &'static str,
        get: fn(&T) -> Option<V>,
        set: fn(&mut T, V),
    ) -> Self
    where
        V: Serialize + DeserializeOwned + 'static,
    {
        self.push(id, name, FieldAccess::Plain {
            get: Box::new(move |object: &dyn Reflectable| {
                get(cast::<T>(object)?)
                    .map(|value| encode_plain(name, &value))
                    .transpose()
            }),
            set: Box::new(move |object: &mut dyn Reflectable, bytes: &[u8]| {
                if let Some(value) = decode_plain::<V>(T::RTTI_NAME, name, bytes) {
                    set(cast_mut::<T>(object)?, value);
                }
                Ok(())
            }),
        })
    }

    /// An array of plain values, each stored as its own serialized bytes.
    #[must_use]
    pub fn plain_array<V>(
        self,
        id: u32,
        name: &'static str,
        get: fn(&T) -> &[V],
        get_mut: fn(&mut T) -> &mut Vec<V>,
    ) -> Self
    where
        V: Serialize + DeserializeOwned + 'static,
    {
        self.push(id, name, FieldAccess::PlainArray {
            get: Box::new(move |object: &dyn Reflectable| {
                get(cast::<T>(object)?)
                    .iter()
                    .map(|value| encode_plain(name, value))
                    .collect()
            }),
            set: Box::new(move |object: &mut dyn Reflectable, elements: Vec<&[u8]>| {
                // One undecodable element keeps the whole previous array.
                let values = elements
                    .into_iter()
                    .map(|bytes| decode_plain::<V>(T::RTTI_NAME, name, bytes))
                    .collect::<Option<Vec<_>>>();
                match values {
                    Some(values) => *get_mut(cast_mut::<T>(object)?) = values,
                    None => log::warn!(
                        "keeping previous elements of `{}::{}`",
                        T::RTTI_NAME,
                        name
                    ),
                }
                Ok(())
            }),
        })
    }

    /// A reflectable value owned by `T`, encoded inline.
    #[must_use]
    pub fn reflectable<V: Rtti>(
        self,
        id: u32,
        name: &'static str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> Self {
        self.push(id, name, FieldAccess::Reflectable {
            get: owned_get(move |object| Ok(Some(erase(get(cast::<T>(object)?))))),
            get_mut: owned_get_mut(move |object| {
                Ok(Some(erase_mut(get_mut(cast_mut::<T>(object)?))))
            }),
            set: Box::new(
                move |object: &mut dyn Reflectable, value: Box<dyn Reflectable>| {
                    *get_mut(cast_mut::<T>(object)?) = cast_box::<V>(value)?;
                    Ok(())
                },
            ),
            clear: None,
        })
    }

    /// An optional reflectable value of any registered type, owned by `T`.
    #[must_use]
    pub fn reflectable_dyn(
        self,
        id: u32,
        name: &'static str,
        get: fn(&T) -> &Option<Box<dyn Reflectable>>,
        get_mut: fn(&mut T) -> &mut Option<Box<dyn Reflectable>>,
    ) -> Self {
        self.push(id, name, FieldAccess::Reflectable {
            get: owned_get(move |object| Ok(get(cast::<T>(object)?).as_deref())),
            get_mut: owned_get_mut(move |object| {
                Ok(get_mut(cast_mut::<T>(object)?).as_deref_mut())
            }),
            set: Box::new(
                move |object: &mut dyn Reflectable, value: Box<dyn Reflectable>| {
                    *get_mut(cast_mut::<T>(object)?) = Some(value);
                    Ok(())
                },
            ),
            clear: Some(Box::new(move |object: &mut dyn Reflectable| {
                *get_mut(cast_mut::<T>(object)?) = None;
                Ok(())
            })),
        })
    }

    /// An owned reflectable value reached through computed accessors, for values
    /// living inside enum variants. `None` from `get` leaves the field out.
    #[must_use]
    pub fn reflectable_with<V: Rtti>(
        self,
        id: u32,
        name: &'static str,
        get: fn(&T) -> Option<&V>,
        get_mut: fn(&mut T) -> Option<&mut V>,
        set: fn(&mut T, V),
    ) -> Self {
        self.push(id, name, FieldAccess::Reflectable {
            get: owned_get(move |object| Ok(get(cast::<T>(object)?).map(erase::<V>))),
            get_mut: owned_get_mut(move |object| {
                Ok(get_mut(cast_mut::<T>(object)?).map(erase_mut::<V>))
            }),
            set: Box::new(
                move |object: &mut dyn Reflectable, value: Box<dyn Reflectable>| {
                    set(cast_mut::<T>(object)?, cast_box::<V>(value)?);
                    Ok(())
                },
            ),
            clear: None,
        })
    }

    /// An array of reflectable values owned by `T`, each encoded inline.
    #[must_use]
    pub fn reflectable_array<V: Rtti>(
        self,
        id: u32,
        name: &'static str,
        get: fn(&T) -> &[V],
        get_mut: fn(&mut T) -> &mut Vec<V>,
    ) -> Self {
        self.push(id, name, FieldAccess::ReflectableArray {
            get: owned_array_get(move |object| {
                Ok(Some(get(cast::<T>(object)?).iter().map(erase::<V>).collect()))
            }),
            set: Box::new(
                move |object: &mut dyn Reflectable, values: Vec<Box<dyn Reflectable>>| {
                    let values = values
                        .into_iter()
                        .map(cast_box::<V>)
                        .collect::<Result<Vec<_>, _>>()?;
                    *get_mut(cast_mut::<T>(object)?) = values;
                    Ok(())
                },
            ),
        })
    }

    /// An array of owned reflectable values reached through computed accessors.
    /// `None` from `get` leaves the field out.
    #[must_use]
    pub fn reflectable_array_with<V: Rtti>(
        self,
        id: u32,
        name: &'static str,
        get: fn(&T) -> Option<&[V]>,
        set: fn(&mut T, Vec<V>),
    ) -> Self {
        self.push(id, name, FieldAccess::ReflectableArray {
            get: owned_array_get(move |object| {
                Ok(get(cast::<T>(object)?).map(|values| values.iter().map(erase::<V>).collect()))
            }),
            set: Box::new(
                move |object: &mut dyn Reflectable, values: Vec<Box<dyn Reflectable>>| {
                    let values = values
                        .into_iter()
                        .map(cast_box::<V>)
                        .collect::<Result<Vec<_>, _>>()?;
                    set(cast_mut::<T>(object)?, values);
                    Ok(())
                },
            ),
        })
    }

    /// A shared pointer to a `V`, possibly null.
    #[must_use]
    pub fn pointer<V: Rtti>(
        self,
        id: u32,
        name: &'static str,
        get: fn(&T) -> &Option<Rc<RefCell<V>>>,
        get_mut: fn(&mut T) -> &mut Option<Rc<RefCell<V>>>,
    ) -> Self {
        self.push(id, name, FieldAccess::Pointer {
            get: Box::new(move |object: &dyn Reflectable| {
                Ok(get(cast::<T>(object)?)
                    .clone()
                    .map(|rc| rc as ReflectPtr))
            }),
            set: Box::new(
                move |object: &mut dyn Reflectable, value: Option<SharedObject>| {
                    *get_mut(cast_mut::<T>(object)?) = downcast_pointer::<V>(value)?;
                    Ok(())
                },
            ),
        })
    }

    /// A shared pointer reached through computed accessors.
    #[must_use]
    pub fn pointer_with<V: Rtti>(
        self,
        id: u32,
        name: &'static str,
        get: fn(&T) -> Option<Rc<RefCell<V>>>,
        set: fn(&mut T, Option<Rc<RefCell<V>>>),
    ) -> Self {
        self.push(id, name, FieldAccess::Pointer {
            get: Box::new(move |object: &dyn Reflectable| {
                Ok(get(cast::<T>(object)?).map(|rc| rc as ReflectPtr))
            }),
            set: Box::new(
                move |object: &mut dyn Reflectable, value: Option<SharedObject>| {
                    set(cast_mut::<T>(object)?, downcast_pointer::<V>(value)?);
                    Ok(())
                },
            ),
        })
    }

    /// A shared pointer to an object of any registered type, possibly null.
    #[must_use]
    pub fn pointer_dyn(
        self,
        id: u32,
        name: &'static str,
        get: fn(&T) -> &Option<ReflectPtr>,
        get_mut: fn(&mut T) -> &mut Option<ReflectPtr>,
    ) -> Self {
        self.push(id, name, FieldAccess::Pointer {
            get: Box::new(move |object: &dyn Reflectable| Ok(get(cast::<T>(object)?).clone())),
            set: Box::new(
                move |object: &mut dyn Reflectable, value: Option<SharedObject>| {
                    *get_mut(cast_mut::<T>(object)?) = value.map(SharedObject::into_reflect);
                    Ok(())
                },
            ),
        })
    }

    /// An array of shared pointers to `V`. Null elements are dropped on decode.
    #[must_use]
    pub fn pointer_array<V: Rtti>(
        self,
        id: u32,
        name: &'static str,
        get: fn(&T) -> &[Rc<RefCell<V>>],
        get_mut: fn(&mut T) -> &mut Vec<Rc<RefCell<V>>>,
    ) -> Self {
        self.push(id, name, FieldAccess::PointerArray {
            get: Box::new(move |object: &dyn Reflectable| {
                Ok(get(cast::<T>(object)?)
                    .iter()
                    .map(|rc| rc.clone() as ReflectPtr)
                    .collect())
            }),
            set: Box::new(
                move |object: &mut dyn Reflectable, values: Vec<Option<SharedObject>>| {
                    let mut pointers = Vec::with_capacity(values.len());
                    for value in values {
                        match value {
                            Some(shared) => pointers.push(shared.try_downcast::<V>()?),
                            None => log::debug!(
                                "dropping null element of `{}::{}`",
                                T::RTTI_NAME,
                                name
                            ),
                        }
                    }
                    *get_mut(cast_mut::<T>(object)?) = pointers;
                    Ok(())
                },
            ),
        })
    }

    /// Runs `hook` on every decoded instance before its fields are populated.
    #[must_use]
    pub fn on_deserialization_started(mut self, hook: DecodeHook) -> Self {
        self.descriptor.on_started = Some(hook);
        self
    }

    /// Runs `hook` on every decoded instance once it is fully wired.
    ///
    /// Instances held through pointers (and the root of a decode call) run the
    /// hook after the whole graph of the call is wired. Inline instances run it
    /// as soon as their own subtree is wired.
    #[must_use]
    pub fn on_deserialization_ended(mut self, hook: DecodeHook) -> Self {
        self.descriptor.on_ended = Some(hook);
        self
    }

    /// Finishes the descriptor.
    pub fn build(self) -> TypeDescriptor {
        self.descriptor
    }
}
