extern crate proc_macro;

use itertools::izip;
use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use std::collections::HashSet;
use syn::{
    parse_macro_input, parse_quote, Attribute, Data, DataEnum, DeriveInput, Fields, Generics,
    Ident, Index, Member, Type,
};

/// Field attributes parsed from `#[wire(...)]` annotations
///
/// * `rename` - Member name used for wire ordering instead of the field name
/// * `skip` - The field is not written and decodes to `Default::default()`
#[derive(Debug, Clone, Default)]
struct FieldAttributes {
    rename: Option<String>,
    skip: bool,
}

/// Parses every `#[wire(...)]` attribute on a field.
///
/// Multiple attributes can be combined: `#[wire(rename = "Id", skip)]`
fn get_field_attributes(attrs: &[Attribute]) -> syn::Result<FieldAttributes> {
    let mut parsed = FieldAttributes::default();
    for attr in attrs {
        if !attr.path().is_ident("wire") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let lit: syn::LitStr = meta.value()?.parse()?;
                parsed.rename = Some(lit.value());
                Ok(())
            } else if meta.path.is_ident("skip") {
                parsed.skip = true;
                Ok(())
            } else {
                Err(meta.error("unknown wire attribute, expected `rename` or `skip`"))
            }
        })?;
    }
    Ok(parsed)
}

/// One struct field as seen by the generated code.
struct WireField {
    /// `self.<member>` access path.
    member: Member,
    ty: Type,
    /// Member name used for ordering.
    wire_name: String,
    skip: bool,
}

/// Collects the fields of a struct, naming tuple members `Item1`, `Item2`, ...
fn collect_fields(fields: &Fields) -> syn::Result<Vec<WireField>> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for (position, field) in fields.iter().enumerate() {
        let attrs = get_field_attributes(&field.attrs)?;
        let (member, default_name) = match &field.ident {
            Some(ident) => (Member::Named(ident.clone()), ident.to_string()),
            None => (
                Member::Unnamed(Index::from(position)),
                format!("Item{}", position + 1),
            ),
        };
        let wire_name = attrs.rename.unwrap_or(default_name);
        if !attrs.skip && !seen.insert(wire_name.clone()) {
            return Err(syn::Error::new_spanned(
                field,
                format!("duplicate wire member name '{}'", wire_name),
            ));
        }
        out.push(WireField {
            member,
            ty: field.ty.clone(),
            wire_name,
            skip: attrs.skip,
        });
    }
    Ok(out)
}

/// Adds `bound` to every type parameter.
fn add_bounds(generics: &Generics, bound: TokenStream2) -> Generics {
    let mut generics = generics.clone();
    let bounds: syn::punctuated::Punctuated<syn::TypeParamBound, syn::Token![+]> =
        parse_quote!(#bound);
    for param in generics.type_params_mut() {
        param.bounds.extend(bounds.iter().cloned());
    }
    generics
}

/// Integer type named by `#[repr(...)]`, `i32` when absent.
fn enum_repr(attrs: &[Attribute]) -> syn::Result<Ident> {
    let mut repr = Ident::new("i32", Span::call_site());
    for attr in attrs {
        if !attr.path().is_ident("repr") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if let Some(ident) = meta.path.get_ident() {
                let name = ident.to_string();
                if matches!(
                    name.as_str(),
                    "u8" | "i8" | "u16" | "i16" | "u32" | "i32" | "u64" | "i64"
                ) {
                    repr = ident.clone();
                }
            }
            // align(N), packed(N)
            if meta.input.peek(syn::token::Paren) {
                let args;
                syn::parenthesized!(args in meta.input);
                args.parse::<TokenStream2>()?;
            }
            Ok(())
        })?;
    }
    Ok(repr)
}

fn check_fieldless(name: &Ident, data: &DataEnum) -> syn::Result<()> {
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                format!(
                    "enum {} has a variant with data; only fieldless enums can derive Encode and Decode",
                    name
                ),
            ));
        }
    }
    Ok(())
}

/// Derive macro for the `Encoder` trait
///
/// Structs get a structural codec: members are written fixed-size first, then
/// bounded, then dynamic, ordered by name within each class. Fieldless enums are
/// written as their `#[repr]` integer (`i32` by default).
///
/// # Supported Attributes
///
/// * `#[wire(rename = "Name")]` - Use the given member name for ordering
/// * `#[wire(skip)]` - Do not write the field
///
/// # Examples
///
/// ```rust,ignore
/// #[derive(Encode)]
/// struct Order {
///     #[wire(rename = "Id")]
///     id: i32,
///     #[wire(skip)]
///     cache: Option<String>,
/// }
/// ```
#[proc_macro_derive(Encode, attributes(wire))]
pub fn derive_encode(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let expanded = match &input.data {
        Data::Struct(s) => collect_fields(&s.fields).map(|fields| encode_struct(&input, &fields)),
        Data::Enum(e) => check_fieldless(&input.ident, e)
            .and_then(|_| enum_repr(&input.attrs))
            .map(|repr| encode_enum(&input, e, &repr)),
        Data::Union(_) => Err(syn::Error::new_spanned(
            &input.ident,
            "Encode cannot be derived for unions",
        )),
    };
    expanded
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn encode_struct(input: &DeriveInput, fields: &[WireField]) -> TokenStream2 {
    let name = &input.ident;
    let name_str = name.to_string();
    let generics = add_bounds(&input.generics, quote!(::rpcwire::Encoder + 'static));
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let wired: Vec<&WireField> = fields.iter().filter(|f| !f.skip).collect();
    let indices: Vec<usize> = (0..wired.len()).collect();
    let members: Vec<&Member> = wired.iter().map(|f| &f.member).collect();
    let types: Vec<&Type> = wired.iter().map(|f| &f.ty).collect();
    let wire_names: Vec<&str> = wired.iter().map(|f| f.wire_name.as_str()).collect();

    let shapes = izip!(&types, &wire_names).map(|(ty, wire_name)| {
        quote! { ::rpcwire::structural::MemberShape::of::<#ty>(#wire_name) }
    });
    let sizes = izip!(&indices, &members).map(|(idx, member)| {
        quote! { #idx => ::rpcwire::Encoder::calculate_size(&self.#member), }
    });
    let encodes = izip!(&indices, &members).map(|(idx, member)| {
        quote! { #idx => ::rpcwire::Encoder::encode(&self.#member, writer), }
    });

    let layout = static_layout(input, quote!(::rpcwire::structural::StructuralEncoder));

    quote! {
        impl #impl_generics ::rpcwire::structural::StructuralEncoder for #name #ty_generics #where_clause {
            const NAME: &'static str = #name_str;

            #layout

            fn members() -> ::std::vec::Vec<::rpcwire::structural::MemberShape> {
                ::std::vec![#(#shapes),*]
            }

            #[allow(unused_variables)]
            fn member_size(&self, index: usize) -> usize {
                match index {
                    #(#sizes)*
                    _ => 0,
                }
            }

            #[allow(unused_variables)]
            fn encode_member(
                &self,
                index: usize,
                writer: &mut ::rpcwire::bytes::BytesMut,
            ) -> ::rpcwire::Result<()> {
                match index {
                    #(#encodes)*
                    _ => ::std::result::Result::Ok(()),
                }
            }
        }

        impl #impl_generics ::rpcwire::Encoder for #name #ty_generics #where_clause {
            const FIXED_SIZE: ::std::option::Option<usize> = ::rpcwire::structural::sum_sizes(
                &[#(<#types as ::rpcwire::Encoder>::FIXED_SIZE),*]
            );
            const MAX_SIZE: ::std::option::Option<usize> = ::rpcwire::structural::sum_sizes(
                &[#(<#types as ::rpcwire::Encoder>::MAX_SIZE),*]
            );
            const KIND: ::rpcwire::CodecKind =
                ::rpcwire::structural::structural_kind(<Self as ::rpcwire::Encoder>::FIXED_SIZE);

            fn calculate_size(&self) -> usize {
                ::rpcwire::structural::calculate_size(self)
            }

            fn encode(&self, writer: &mut ::rpcwire::bytes::BytesMut) -> ::rpcwire::Result<()> {
                ::rpcwire::structural::encode(self, writer)
            }
        }
    }
}

/// `layout()` backed by a per-type static. Generic types keep the shared
/// cache, since a static in a generic impl is shared by every instantiation.
fn static_layout(input: &DeriveInput, structural: TokenStream2) -> TokenStream2 {
    if !input.generics.params.is_empty() {
        return quote! {};
    }
    quote! {
        fn layout() -> ::std::sync::Arc<::rpcwire::structural::StructLayout>
        where
            Self: Sized,
        {
            static LAYOUT: ::rpcwire::once_cell::sync::OnceCell<
                ::std::sync::Arc<::rpcwire::structural::StructLayout>,
            > = ::rpcwire::once_cell::sync::OnceCell::new();
            LAYOUT
                .get_or_init(|| {
                    ::std::sync::Arc::new(::rpcwire::structural::StructLayout::new(
                        <Self as #structural>::NAME,
                        <Self as #structural>::members(),
                    ))
                })
                .clone()
        }
    }
}

fn encode_enum(input: &DeriveInput, data: &DataEnum, repr: &Ident) -> TokenStream2 {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let variants: Vec<&Ident> = data.variants.iter().map(|v| &v.ident).collect();

    quote! {
        impl #impl_generics ::rpcwire::Encoder for #name #ty_generics #where_clause {
            const FIXED_SIZE: ::std::option::Option<usize> = <#repr as ::rpcwire::Encoder>::FIXED_SIZE;
            const KIND: ::rpcwire::CodecKind = ::rpcwire::CodecKind::FixedLayout;

            fn calculate_size(&self) -> usize {
                ::std::mem::size_of::<#repr>()
            }

            fn encode(&self, writer: &mut ::rpcwire::bytes::BytesMut) -> ::rpcwire::Result<()> {
                let value: #repr = match self {
                    #(#name::#variants => #name::#variants as #repr,)*
                };
                ::rpcwire::Encoder::encode(&value, writer)
            }
        }
    }
}

/// Derive macro for the `Decoder` trait
///
/// Reads what `#[derive(Encode)]` writes. Skipped fields are filled with
/// `Default::default()`; an enum discriminant that names no variant is an error.
#[proc_macro_derive(Decode, attributes(wire))]
pub fn derive_decode(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let expanded = match &input.data {
        Data::Struct(s) => collect_fields(&s.fields).map(|fields| decode_struct(&input, &s.fields, &fields)),
        Data::Enum(e) => check_fieldless(&input.ident, e)
            .and_then(|_| enum_repr(&input.attrs))
            .map(|repr| decode_enum(&input, e, &repr)),
        Data::Union(_) => Err(syn::Error::new_spanned(
            &input.ident,
            "Decode cannot be derived for unions",
        )),
    };
    expanded
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn decode_struct(input: &DeriveInput, shape: &Fields, fields: &[WireField]) -> TokenStream2 {
    let name = &input.ident;
    let name_str = name.to_string();
    let generics = add_bounds(
        &input.generics,
        quote!(::rpcwire::Decoder + ::rpcwire::Encoder + 'static),
    );
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let wired: Vec<&WireField> = fields.iter().filter(|f| !f.skip).collect();
    let indices: Vec<usize> = (0..wired.len()).collect();
    let slots: Vec<Ident> = indices.iter().map(|idx| format_ident!("__slot_{}", idx)).collect();
    let types: Vec<&Type> = wired.iter().map(|f| &f.ty).collect();
    let wire_names: Vec<&str> = wired.iter().map(|f| f.wire_name.as_str()).collect();

    let shapes = izip!(&types, &wire_names).map(|(ty, wire_name)| {
        quote! { ::rpcwire::structural::MemberShape::of::<#ty>(#wire_name) }
    });
    let reads = izip!(&indices, &slots, &types).map(|(idx, slot, ty)| {
        quote! { #idx => #slot = ::std::option::Option::Some(<#ty as ::rpcwire::Decoder>::decode(reader)?), }
    });

    let mut next_slot = 0;
    let values: Vec<TokenStream2> = fields
        .iter()
        .map(|field| {
            if field.skip {
                quote! { ::std::default::Default::default() }
            } else {
                let slot = &slots[next_slot];
                let wire_name = &field.wire_name;
                next_slot += 1;
                quote! {
                    #slot.ok_or_else(|| ::rpcwire::structural::missing_member(
                        #wire_name,
                        <Self as ::rpcwire::structural::StructuralDecoder>::NAME,
                    ))?
                }
            }
        })
        .collect();
    let construct = match shape {
        Fields::Named(_) => {
            let members = fields.iter().map(|f| &f.member);
            quote! { Self { #(#members: #values),* } }
        }
        Fields::Unnamed(_) => quote! { Self(#(#values),*) },
        Fields::Unit => quote! { Self },
    };

    let layout = static_layout(input, quote!(::rpcwire::structural::StructuralDecoder));

    quote! {
        impl #impl_generics ::rpcwire::structural::StructuralDecoder for #name #ty_generics #where_clause {
            const NAME: &'static str = #name_str;

            #layout

            fn members() -> ::std::vec::Vec<::rpcwire::structural::MemberShape> {
                ::std::vec![#(#shapes),*]
            }

            #[allow(unused_variables, unused_mut)]
            fn decode_members(
                reader: &mut ::rpcwire::Reader<'_>,
                order: &[usize],
            ) -> ::rpcwire::Result<Self> {
                #(let mut #slots: ::std::option::Option<#types> = ::std::option::Option::None;)*
                for &index in order {
                    match index {
                        #(#reads)*
                        _ => {}
                    }
                }
                ::std::result::Result::Ok(#construct)
            }
        }

        impl #impl_generics ::rpcwire::Decoder for #name #ty_generics #where_clause {
            fn decode(reader: &mut ::rpcwire::Reader<'_>) -> ::rpcwire::Result<Self> {
                ::rpcwire::structural::decode(reader)
            }
        }
    }
}

fn decode_enum(input: &DeriveInput, data: &DataEnum, repr: &Ident) -> TokenStream2 {
    let name = &input.ident;
    let name_str = name.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let variants: Vec<&Ident> = data.variants.iter().map(|v| &v.ident).collect();

    quote! {
        impl #impl_generics ::rpcwire::Decoder for #name #ty_generics #where_clause {
            fn decode(reader: &mut ::rpcwire::Reader<'_>) -> ::rpcwire::Result<Self> {
                let value = <#repr as ::rpcwire::Decoder>::decode(reader)?;
                #(
                    if value == #name::#variants as #repr {
                        return ::std::result::Result::Ok(#name::#variants);
                    }
                )*
                ::std::result::Result::Err(::rpcwire::structural::invalid_enum_value(value as i128, #name_str))
            }
        }
    }
}
