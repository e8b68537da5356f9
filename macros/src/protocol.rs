//! Implements derives for the protocol Encode and Decode traits.
//!
//! All multi-byte values on the Bedrock wire are little-endian; the
//! `var*` options select the protocol's variable-length integer encodings.

use darling::{FromDeriveInput, FromField, FromMeta, FromVariant};
use proc_macro2::{Ident, Span, TokenStream};
use quote::quote;
use syn::{Data, DataEnum, DataStruct, DeriveInput, Fields};

/// Options to encode a field.
#[derive(Default, Debug, FromField)]
#[darling(attributes(encoding), forward_attrs(allow, doc, cfg))]
#[darling(default)]
pub struct FieldOptions {
    /// Use zigzag varint-encoding for this (32-bit signed) field.
    varint: bool,
    /// Use zigzag varlong-encoding for this (64-bit signed) field.
    varlong: bool,
    /// Use unsigned varint-encoding for this (32-bit) field.
    varuint: bool,
    /// Use unsigned varlong-encoding for this (64-bit) field.
    varulong: bool,
    /// For an option field, prefix the field with a boolean
    /// to determine whether the field is present.
    bool_prefixed: bool,
    /// For a list field, how do we encode the length?
    length_prefix: Option<LengthPrefix>,
}

/// For a list field, how do we encode the length?
#[derive(Debug, FromMeta)]
pub enum LengthPrefix {
    /// Prefix with an unsigned varint.
    #[darling(rename = "varuint")]
    VarUInt,
    /// Prefix with a little-endian u16.
    #[darling(rename = "u16")]
    U16,
    /// Infer the length from the remaining length of the stream.
    ///
    /// Only works for the last field of a packet.
    #[darling(rename = "inferred")]
    Inferred,
}

/// Options to encode an enum.
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(encoding), forward_attrs(allow, doc, cfg))]
struct EnumOptions {
    /// How do we determine the discriminant?
    discriminant: Discriminant,
}

#[derive(Debug, FromMeta)]
enum Discriminant {
    /// Bedrock packet header: an unsigned varint whose low
    /// 10 bits hold the packet ID. Sub-client bits are dropped.
    #[darling(rename = "header")]
    Header,
    /// Prefix the item with an unsigned varint.
    #[darling(rename = "varuint")]
    VarUInt,
    /// Prefix the item with a byte.
    #[darling(rename = "byte")]
    Byte,
}

/// Options to encode an enum variant.
#[derive(Debug, FromVariant)]
#[darling(attributes(encoding), forward_attrs(allow, doc, cfg))]
struct VariantOptions {
    #[darling(default)]
    id: Option<i64>,
    /// Catch-all variant for unrecognized discriminants. The variant's
    /// field must implement `DecodeOther` and `EncodeOther`.
    #[darling(default)]
    other: bool,
}

#[derive(Debug)]
struct FieldInput {
    ident: Ident,
    get: TokenStream,
    options: FieldOptions,
}

#[derive(Debug)]
struct StructInput {
    fields: Vec<FieldInput>,
}

#[derive(Debug)]
struct EnumInput {
    variants: Vec<VariantInput>,
    options: EnumOptions,
}

#[derive(Debug)]
struct VariantInput {
    ident: Ident,
    fields: Vec<FieldInput>,
    bindings: Vec<Ident>,
    options: VariantOptions,
    fields_named: bool,
}

#[derive(Debug)]
enum Input {
    Struct(StructInput),
    Enum(EnumInput),
}

fn encode_field(field: &FieldInput) -> syn::Result<TokenStream> {
    let FieldInput { options, get, .. } = field;
    let num_set = options.bool_prefixed as u32
        + options.varint as u32
        + options.varlong as u32
        + options.varuint as u32
        + options.varulong as u32
        + options.length_prefix.is_some() as u32;
    if num_set > 1 {
        return Err(syn::Error::new(
            Span::call_site(),
            "at most one encoding option can be set",
        ));
    }

    let result = if options.varint {
        quote! {
            encoder.write_var_i32(#get.try_into().unwrap_or(i32::MAX));
        }
    } else if options.varlong {
        quote! {
            encoder.write_var_i64(#get.try_into().unwrap_or(i64::MAX));
        }
    } else if options.varuint {
        quote! {
            encoder.write_var_u32(#get.try_into().unwrap_or(u32::MAX));
        }
    } else if options.varulong {
        quote! {
            encoder.write_var_u64(#get.try_into().unwrap_or(u64::MAX));
        }
    } else if options.bool_prefixed {
        quote! {
            encoder.write_bool(#get.is_some());
            if let Some(val) = &#get {
                crate::protocol::Encode::encode(val, encoder);
            }
        }
    } else if let Some(length_prefix) = &options.length_prefix {
        let encode_length = match length_prefix {
            LengthPrefix::Inferred => quote! {},
            LengthPrefix::VarUInt => quote! {
                encoder.write_var_u32(#get.len().try_into().unwrap_or(u32::MAX));
            },
            LengthPrefix::U16 => quote! {
                encoder.write_u16(#get.len().try_into().unwrap_or(u16::MAX));
            },
        };

        quote! {
            #encode_length
            for item in &#get {
                crate::protocol::Encode::encode(item, encoder);
            }
        }
    } else {
        quote! {
            crate::protocol::Encode::encode(&#get, encoder);
        }
    };
    Ok(result)
}

/// Writes a discriminant known only at runtime, bound to `__id`.
fn write_dynamic_discriminant(discriminant: &Discriminant) -> TokenStream {
    match discriminant {
        Discriminant::Header | Discriminant::VarUInt => quote! {
            encoder.write_var_u32(u32::try_from(__id).unwrap_or(0));
        },
        Discriminant::Byte => quote! {
            encoder.write_u8(u8::try_from(__id).unwrap_or(0));
        },
    }
}

fn encode_variant(variant: &VariantInput, parent: &EnumInput) -> syn::Result<TokenStream> {
    let write_discriminant = if variant.options.other {
        let write = write_dynamic_discriminant(&parent.options.discriminant);
        quote! {
            let __id = crate::protocol::EncodeOther::other_id(__field);
            #write
        }
    } else {
        let Some(id) = variant.options.id else {
            return Err(syn::Error::new_spanned(
                &variant.ident,
                "variant needs either an `id` or the `other` flag",
            ));
        };
        match &parent.options.discriminant {
            Discriminant::Byte => {
                let id = u8::try_from(id).expect("ID overflow");
                quote! {
                    encoder.write_u8(#id);
                }
            }
            Discriminant::Header | Discriminant::VarUInt => {
                let id = u32::try_from(id).expect("ID overflow");
                quote! {
                    encoder.write_var_u32(#id);
                }
            }
        }
    };

    let encode_fields = variant
        .fields
        .iter()
        .map(encode_field)
        .collect::<syn::Result<Vec<_>>>()?;

    Ok(quote! {
        #write_discriminant
        #(#encode_fields)*
    })
}

fn derive_encode_struct(input: &StructInput) -> syn::Result<TokenStream> {
    let encode_fields = input
        .fields
        .iter()
        .map(encode_field)
        .collect::<syn::Result<Vec<_>>>()?;
    Ok(quote! {
        #(#encode_fields)*
    })
}

fn derive_encode_enum(input: &EnumInput) -> syn::Result<TokenStream> {
    let mut match_arms = Vec::new();

    for variant in &input.variants {
        let ident = &variant.ident;
        let bindings = &variant.bindings;
        let encode = encode_variant(variant, input)?;
        let binding = if bindings.is_empty() {
            quote! {}
        } else if !variant.fields_named {
            quote! { (__field) }
        } else {
            quote! {
                { #(#bindings),* }
            }
        };
        match_arms.push(quote! {
            Self::#ident #binding => {
                #encode
            }
        });
    }

    Ok(quote! {
        match self {
            #(#match_arms,)*
        }
    })
}

fn encode(input: &Input, ident: &Ident) -> syn::Result<TokenStream> {
    let encode = match input {
        Input::Struct(s) => derive_encode_struct(s)?,
        Input::Enum(e) => derive_encode_enum(e)?,
    };
    Ok(quote! {
        impl crate::protocol::Encode for #ident {
            fn encode(&self, encoder: &mut crate::protocol::Encoder) {
                #encode
            }
        }
    })
}

fn decode_field(field: &FieldInput) -> TokenStream {
    let FieldInput { options, ident, .. } = field;

    if options.varint {
        quote! {
            let #ident = decoder.read_var_i32()?.try_into()?;
        }
    } else if options.varlong {
        quote! {
            let #ident = decoder.read_var_i64()?.try_into()?;
        }
    } else if options.varuint {
        quote! {
            let #ident = decoder.read_var_u32()?.try_into()?;
        }
    } else if options.varulong {
        quote! {
            let #ident = decoder.read_var_u64()?.try_into()?;
        }
    } else if options.bool_prefixed {
        quote! {
            let is_present = decoder.read_bool()?;
            let #ident = if is_present {
                Some(crate::protocol::Decode::decode(decoder)?)
            } else {
                None
            };
        }
    } else if let Some(length_prefix) = &options.length_prefix {
        let read_length = match length_prefix {
            LengthPrefix::VarUInt => quote! { decoder.read_var_u32()? },
            LengthPrefix::U16 => quote! { decoder.read_u16()? },
            LengthPrefix::Inferred => {
                return quote! {
                    let mut #ident = Vec::new();
                    while !decoder.is_finished() {
                        #ident.push(crate::protocol::Decode::decode(decoder)?);
                    }
                };
            }
        };
        quote! {let #ident = {
            let length = #read_length;
            let mut #ident = Vec::new();
            for _ in 0..length {
                #ident.push(crate::protocol::Decode::decode(decoder)?);
            }
            #ident
        };}
    } else {
        quote! {
            let #ident = crate::protocol::Decode::decode(decoder)?;
        }
    }
}

fn decode_struct(input: &StructInput) -> TokenStream {
    let decode_fields: Vec<_> = input.fields.iter().map(decode_field).collect();

    let init_fields: Vec<_> = input
        .fields
        .iter()
        .map(|FieldInput { ident, .. }| {
            quote! {
                #ident
            }
        })
        .collect();

    quote! {
        #(#decode_fields)*
        Ok(Self {
            #(#init_fields,)*
        })
    }
}

fn decode_variant(input: &VariantInput) -> TokenStream {
    let decode_fields: Vec<_> = input.fields.iter().map(decode_field).collect();

    let init_fields: Vec<_> = input
        .fields
        .iter()
        .map(|FieldInput { ident, .. }| {
            quote! {
                #ident
            }
        })
        .collect();

    let init = if init_fields.is_empty() {
        quote! {}
    } else if !input.fields_named {
        quote! { (#(#init_fields)*) }
    } else {
        quote! {
            {
                #(#init_fields,)*
            }
        }
    };

    let ident = &input.ident;
    quote! {
        #(#decode_fields)*
        Ok(Self::#ident #init)
    }
}

fn decode_enum(input: &EnumInput) -> TokenStream {
    let decode_discriminant = match &input.options.discriminant {
        Discriminant::Header => quote! { decoder.read_var_u32()? & 0x3ff },
        Discriminant::VarUInt => quote! { decoder.read_var_u32()? },
        Discriminant::Byte => quote! { decoder.read_u8()? },
    };

    let mut match_arms = Vec::new();
    let mut fallback = None;
    for variant in &input.variants {
        if variant.options.other {
            let ident = &variant.ident;
            fallback = Some(quote! {
                _ => {
                    let __field = crate::protocol::DecodeOther::decode_other(discriminant, decoder)?;
                    Ok(Self::#ident(__field))
                }
            });
            continue;
        }
        let Some(id) = variant.options.id else {
            continue;
        };
        let decode = decode_variant(variant);
        match_arms.push(quote! {
            #id => {
                #decode
            }
        });
    }

    let fallback = fallback.unwrap_or_else(|| {
        quote! {
            _ => Err(crate::protocol::DecodeError::Other(::anyhow::format_err!("invalid discriminant '{}'", discriminant))),
        }
    });

    quote! {
        let discriminant = i64::from(#decode_discriminant);

        match discriminant {
            #(#match_arms,)*
            #fallback
        }
    }
}

fn decode(input: &Input, derive_input: &DeriveInput) -> TokenStream {
    let ident = &derive_input.ident;
    let imp = match input {
        Input::Struct(s) => decode_struct(s),
        Input::Enum(e) => decode_enum(e),
    };

    quote! {
        impl crate::protocol::Decode for #ident {
            fn decode(decoder: &mut crate::protocol::Decoder) -> ::std::result::Result<Self, crate::protocol::DecodeError> {
                #imp
            }
        }
    }
}

fn get_input(input: &DeriveInput) -> syn::Result<Input> {
    match &input.data {
        Data::Struct(s) => get_struct_input(s).map(Input::Struct),
        Data::Enum(e) => get_enum_input(e, input).map(Input::Enum),
        Data::Union(u) => Err(syn::Error::new_spanned(
            u.union_token,
            "cannot derive Encode/Decode on a union",
        )),
    }
}

fn get_struct_input(s: &DataStruct) -> syn::Result<StructInput> {
    let mut fields = Vec::new();
    match &s.fields {
        Fields::Named(named) => {
            for field in &named.named {
                let options = FieldOptions::from_field(field)?;
                let ident = field.ident.as_ref().unwrap();
                fields.push(FieldInput {
                    get: quote! {
                        self.#ident
                    },
                    options,
                    ident: ident.clone(),
                });
            }
        }
        Fields::Unnamed(unnamed) => {
            return Err(syn::Error::new_spanned(
                &unnamed.unnamed,
                "structs with unnamed fields are unsupported",
            ))
        }
        Fields::Unit => {}
    }

    Ok(StructInput { fields })
}

fn get_enum_input(s: &DataEnum, input: &DeriveInput) -> syn::Result<EnumInput> {
    let options = EnumOptions::from_derive_input(input)?;
    let mut variants = Vec::new();
    let mut has_fallback = false;

    for variant in &s.variants {
        let options = VariantOptions::from_variant(variant)?;
        if options.other {
            if has_fallback {
                return Err(syn::Error::new_spanned(
                    &variant.ident,
                    "only one variant can be marked `other`",
                ));
            }
            if !matches!(&variant.fields, Fields::Unnamed(f) if f.unnamed.len() == 1) {
                return Err(syn::Error::new_spanned(
                    &variant.ident,
                    "the `other` variant must have exactly one unnamed field",
                ));
            }
            has_fallback = true;
        } else if options.id.is_none() {
            return Err(syn::Error::new_spanned(
                &variant.ident,
                "variant needs either an `id` or the `other` flag",
            ));
        }

        let mut bindings = Vec::new();
        let mut fields = Vec::new();

        match &variant.fields {
            Fields::Named(named) => {
                for field in &named.named {
                    let ident = field.ident.as_ref().unwrap();
                    let options = FieldOptions::from_field(field)?;
                    fields.push(FieldInput {
                        get: quote! { (*#ident) },
                        options,
                        ident: ident.clone(),
                    });

                    bindings.push(ident.clone());
                }
            }
            Fields::Unnamed(unnamed) => {
                if unnamed.unnamed.len() > 1 {
                    return Err(syn::Error::new_spanned(
                        &unnamed.unnamed,
                        "more than one unnamed field in a variant is unsupported",
                    ));
                }
                let field = &unnamed.unnamed[0];
                let field_options = FieldOptions::from_field(field)?;
                // The catch-all variant writes its own discriminant,
                // so its body is encoded directly.
                fields.push(FieldInput {
                    get: quote! { (*__field) },
                    options: field_options,
                    ident: Ident::new("__field", Span::call_site()),
                });
                bindings.push(Ident::new("__field", Span::call_site()));
            }
            Fields::Unit => {}
        };

        variants.push(VariantInput {
            ident: variant.ident.clone(),
            fields,
            bindings,
            options,
            fields_named: matches!(variant.fields, Fields::Named(_)),
        });
    }

    Ok(EnumInput { variants, options })
}

pub fn derive_encode_on(derive_input: &DeriveInput) -> syn::Result<TokenStream> {
    let input = get_input(derive_input)?;
    encode(&input, &derive_input.ident)
}

pub fn derive_decode_on(derive_input: &DeriveInput) -> syn::Result<TokenStream> {
    let input = get_input(derive_input)?;
    Ok(decode(&input, derive_input))
}
