//! Derive macro for `AsCborValue`.
use proc_macro2::TokenStream;
use quote::{format_ident, quote, quote_spanned};
use syn::{
    parse_macro_input, parse_quote, spanned::Spanned, Data, DataEnum, DeriveInput, Fields,
    GenericParam, Generics, Index,
};

/// Derive macro that implements the `AsCborValue` trait.  Using this macro requires
/// that `AsCborValue`, `CborError` and `cbor_type_error` are locally `use`d, along with
/// `alloc::vec` in `no_std` crates.
///
/// Structs (named or tuple) are encoded as a CBOR array holding each field in declaration
/// order; field-less enums are encoded as their `i32` discriminant.
#[proc_macro_derive(AsCborValue)]
pub fn derive_as_cbor_value(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match derive_as_cbor_value_internal(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn derive_as_cbor_value_internal(input: &DeriveInput) -> syn::Result<TokenStream> {
    let name = &input.ident;

    let generics = add_trait_bounds(&input.generics);
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let (from_val, to_val) = match &input.data {
        Data::Struct(data) => (from_val_fields(&data.fields)?, to_val_fields(&data.fields)?),
        Data::Enum(data) => (from_val_enum(data)?, to_val_enum()),
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(input, "AsCborValue cannot be derived for a union"))
        }
    };

    Ok(quote! {
        impl #impl_generics AsCborValue for #name #ty_generics #where_clause {
            fn from_cbor_value(value: ciborium::value::Value) -> Result<Self, CborError> {
                #from_val
            }
            fn to_cbor_value(self) -> Result<ciborium::value::Value, CborError> {
                #to_val
            }
        }
    })
}

/// Add a bound `T: AsCborValue` for every type parameter `T`.
fn add_trait_bounds(generics: &Generics) -> Generics {
    let mut generics = generics.clone();
    for param in &mut generics.params {
        if let GenericParam::Type(ref mut type_param) = *param {
            type_param.bounds.push(parse_quote!(AsCborValue));
        }
    }
    generics
}

/// Generate the prologue shared by both struct flavours: pull an array of exactly `nfields`
/// items out of `value`, binding it to `a`.
fn expect_array(nfields: usize) -> TokenStream {
    quote! {
        let mut a = match value {
            ciborium::value::Value::Array(a) => a,
            _ => return cbor_type_error(&value, "arr"),
        };
        if a.len() != #nfields {
            return Err(CborError::UnexpectedItem("arr", concat!("arr len ", stringify!(#nfields))));
        }
    }
}

/// Generate an expression to convert a struct instance into a `ciborium::value::Value` array,
/// one entry per field in declaration order.
fn to_val_fields(fields: &Fields) -> syn::Result<TokenStream> {
    let recurse: Vec<TokenStream> = match fields {
        Fields::Named(fields) => fields
            .named
            .iter()
            .map(|f| {
                let name = &f.ident;
                quote_spanned! {f.span()=> AsCborValue::to_cbor_value(self.#name)? }
            })
            .collect(),
        Fields::Unnamed(fields) => fields
            .unnamed
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let index = Index::from(i);
                quote_spanned! {f.span()=> AsCborValue::to_cbor_value(self.#index)? }
            })
            .collect(),
        Fields::Unit => {
            return Err(syn::Error::new_spanned(fields, "unit structs have no CBOR encoding"))
        }
    };
    Ok(quote! {
        Ok(ciborium::value::Value::Array(vec![ #(#recurse, )* ]))
    })
}

/// Generate an expression to convert a `ciborium::value::Value` array into a struct instance.
/// Fields are removed from the back of the array to avoid shifting the remaining entries.
fn from_val_fields(fields: &Fields) -> syn::Result<TokenStream> {
    match fields {
        Fields::Named(fields) => {
            let prologue = expect_array(fields.named.len());
            let recurse = fields.named.iter().enumerate().rev().map(|(i, f)| {
                let name = &f.ident;
                let typ = &f.ty;
                quote_spanned! {f.span()=> #name: <#typ>::from_cbor_value(a.remove(#i))? }
            });
            Ok(quote! {
                #prologue
                Ok(Self { #(#recurse, )* })
            })
        }
        Fields::Unnamed(fields) => {
            let prologue = expect_array(fields.unnamed.len());
            let extract = fields.unnamed.iter().enumerate().rev().map(|(i, f)| {
                let typ = &f.ty;
                let varname = format_ident!("field_{}", i);
                quote_spanned! {f.span()=> let #varname = <#typ>::from_cbor_value(a.remove(#i))?; }
            });
            let names = (0..fields.unnamed.len()).map(|i| format_ident!("field_{}", i));
            Ok(quote! {
                #prologue
                #(#extract)*
                Ok(Self( #(#names, )* ))
            })
        }
        Fields::Unit => Err(syn::Error::new_spanned(fields, "unit structs have no CBOR encoding")),
    }
}

/// Generate an expression to convert a field-less enum into its `i32` discriminant.
fn to_val_enum() -> TokenStream {
    quote! {
        let v: ciborium::value::Integer = (self as i32).into();
        Ok(ciborium::value::Value::Integer(v))
    }
}

/// Generate an expression to convert an integer `ciborium::value::Value` back into one of the
/// enum's variants.
fn from_val_enum(data: &DataEnum) -> syn::Result<TokenStream> {
    let mut arms = Vec::new();
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "AsCborValue can only be derived for enums without variant fields",
            ));
        }
        let vname = &variant.ident;
        arms.push(quote_spanned! {variant.span()=>
            x if x == Self::#vname as i32 => Ok(Self::#vname),
        });
    }
    Ok(quote! {
        let v: i32 = match value {
            ciborium::value::Value::Integer(i) => i.try_into().map_err(|_| {
                CborError::OutOfRangeIntegerValue
            })?,
            v => return cbor_type_error(&v, "int"),
        };
        match v {
            #(#arms)*
            _ => Err(CborError::NonEnumValue),
        }
    })
}
