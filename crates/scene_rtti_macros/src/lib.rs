use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{
    format_ident,
    quote,
};
use syn::{
    Data,
    DeriveInput,
    Expr,
    Fields,
    LitStr,
    Member,
    parse_macro_input,
};

fn scene_rtti_path() -> syn::Path {
    format_ident!("scene_rtti").into()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Plain,
    Reflectable,
    Pointer,
}

struct TypeAttrs {
    id: Option<Expr>,
    name: Option<LitStr>,
    started: Option<Expr>,
    ended: Option<Expr>,
}

struct FieldAttrs {
    id: Expr,
    name: Option<LitStr>,
    kind: Kind,
    array: bool,
    dynamic: bool,
}

fn parse_type_attrs(input: &DeriveInput) -> syn::Result<TypeAttrs> {
    let mut attrs = TypeAttrs {
        id: None,
        name: None,
        started: None,
        ended: None,
    };

    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("rtti")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                attrs.id = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("name") {
                attrs.name = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("started") {
                attrs.started = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("ended") {
                attrs.ended = Some(meta.value()?.parse()?);
            } else {
                return Err(meta.error("expected `id`, `name`, `started` or `ended`"));
            }
            Ok(())
        })?;
    }

    Ok(attrs)
}

fn parse_field_attrs(field: &syn::Field) -> syn::Result<Option<FieldAttrs>> {
    let Some(attr) = field.attrs.iter().find(|attr| attr.path().is_ident("rtti")) else {
        return Ok(None);
    };

    let mut id = None;
    let mut name = None;
    let mut kind = Kind::Plain;
    let mut array = false;
    let mut dynamic = false;

    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("id") {
            id = Some(meta.value()?.parse()?);
        } else if meta.path.is_ident("name") {
            name = Some(meta.value()?.parse()?);
        } else if meta.path.is_ident("reflectable") {
            kind = Kind::Reflectable;
        } else if meta.path.is_ident("pointer") {
            kind = Kind::Pointer;
        } else if meta.path.is_ident("array") {
            array = true;
        } else if meta.path.is_ident("dynamic") {
            dynamic = true;
        } else {
            return Err(meta.error(
                "expected `id`, `name`, `reflectable`, `pointer`, `array` or `dynamic`",
            ));
        }
        Ok(())
    })?;

    let Some(id) = id else {
        return Err(syn::Error::new_spanned(attr, "reflected fields need an `id`"));
    };

    if dynamic && (array || kind == Kind::Plain) {
        return Err(syn::Error::new_spanned(
            attr,
            "`dynamic` applies to scalar `reflectable` or `pointer` fields",
        ));
    }

    Ok(Some(FieldAttrs {
        id,
        name,
        kind,
        array,
        dynamic,
    }))
}

fn field_call(member: &Member, attrs: &FieldAttrs) -> TokenStream2 {
    let id = &attrs.id;
    let name = match (&attrs.name, member) {
        (Some(name), _) => name.value(),
        (None, Member::Named(ident)) => ident.to_string(),
        (None, Member::Unnamed(index)) => index.index.to_string(),
    };

    let method = match (attrs.kind, attrs.array, attrs.dynamic) {
        (Kind::Plain, false, _) => format_ident!("plain"),
        (Kind::Plain, true, _) => format_ident!("plain_array"),
        (Kind::Reflectable, false, false) => format_ident!("reflectable"),
        (Kind::Reflectable, false, true) => format_ident!("reflectable_dyn"),
        (Kind::Reflectable, true, _) => format_ident!("reflectable_array"),
        (Kind::Pointer, false, false) => format_ident!("pointer"),
        (Kind::Pointer, false, true) => format_ident!("pointer_dyn"),
        (Kind::Pointer, true, _) => format_ident!("pointer_array"),
    };

    let get = if attrs.array {
        quote! { |this| this.#member.as_slice() }
    } else {
        quote! { |this| &this.#member }
    };

    quote! {
        .#method(#id, #name, #get, |this| &mut this.#member)
    }
}

/// Derive macro generating an impl of the trait `Rtti`.
///
/// The type needs `#[rtti(id = ...)]`. Only fields marked with `#[rtti(id = ...)]`
/// are reflected; they are plain values unless marked `reflectable` (owned, encoded
/// inline) or `pointer` (shared). `array` selects the `Vec` variant of a kind, and
/// `dynamic` a `Box<dyn Reflectable>` or `ReflectPtr` field of any registered type.
///
/// Deserialization hooks are set with `started = path` and `ended = path`.
///
/// ```ignore
/// #[derive(Default, Rtti)]
/// #[rtti(id = 1000, name = "Inventory", ended = on_loaded)]
/// struct Inventory {
///     #[rtti(id = 0)]
///     gold: u32,
///     #[rtti(id = 1, reflectable, array)]
///     items: Vec<Item>,
///     #[rtti(id = 2, pointer)]
///     owner: Option<Rc<RefCell<Player>>>,
///     cache: Vec<u8>,
/// }
/// ```
///
/// This does not work for enums or unions.
#[proc_macro_derive(Rtti, attributes(rtti))]
pub fn derive_rtti(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_rtti(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_rtti(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "Rtti can only be derived for structs",
        ));
    };

    let attrs = parse_type_attrs(input)?;
    let Some(id) = attrs.id else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "missing `#[rtti(id = ...)]` on the type",
        ));
    };

    let ident = &input.ident;
    let name = attrs
        .name
        .map_or_else(|| ident.to_string(), |name| name.value());

    let members: Vec<(Member, &syn::Field)> = match &data.fields {
        Fields::Named(fields) => fields
            .named
            .iter()
            .filter_map(|field| field.ident.clone().map(|ident| (Member::Named(ident), field)))
            .collect(),
        Fields::Unnamed(fields) => fields
            .unnamed
            .iter()
            .enumerate()
            .map(|(index, field)| (Member::Unnamed(index.into()), field))
            .collect(),
        Fields::Unit => Vec::new(),
    };

    let mut calls = Vec::new();
    for (member, field) in &members {
        if let Some(field_attrs) = parse_field_attrs(field)? {
            calls.push(field_call(member, &field_attrs));
        }
    }

    let started = attrs
        .started
        .map(|hook| quote! { .on_deserialization_started(#hook) });
    let ended = attrs
        .ended
        .map(|hook| quote! { .on_deserialization_ended(#hook) });

    let krate = scene_rtti_path();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::#krate::rtti::Rtti for #ident #ty_generics #where_clause {
            const RTTI_ID: u32 = #id;
            const RTTI_NAME: &'static str = #name;

            fn rtti() -> ::#krate::rtti::TypeDescriptor {
                ::#krate::rtti::TypeDescriptor::builder::<Self>()
                    #(#calls)*
                    #started
                    #ended
                    .build()
            }
        }
    })
}
