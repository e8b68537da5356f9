use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields};

/// Generates `impl From<Payload> for Enum` for every variant
/// wrapping exactly one unnamed field, so packet structs can be
/// turned into their packet enum with `.into()`.
pub fn derive_from_variants_on(input: &DeriveInput) -> syn::Result<TokenStream> {
    let Data::Enum(en) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "only enums are supported",
        ));
    };

    let enum_ident = &input.ident;

    let impls = en.variants.iter().filter_map(|variant| {
        let Fields::Unnamed(fields) = &variant.fields else {
            return None;
        };
        if fields.unnamed.len() != 1 {
            return None;
        }
        let field = &fields.unnamed[0];
        let variant_ident = &variant.ident;
        let ty = &field.ty;
        Some(quote! {
            impl From<#ty> for #enum_ident {
                fn from(value: #ty) -> Self {
                    Self::#variant_ident(value)
                }
            }
        })
    });

    Ok(quote! {
        #(#impls)*
    })
}
