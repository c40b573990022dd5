use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::ext::IdentExt;
use syn::{Data, DeriveInput, Fields, LitStr};

pub fn derive_domain_event(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    // Extract #[event(name = "...")] or default to the struct name
    let type_name = extract_type_name(input)?;

    let Data::Struct(data_struct) = &input.data else {
        return Err(syn::Error::new_spanned(
            name,
            "DomainEvent derive: only structs can be domain events",
        ));
    };

    let (field_names, to_payload, from_record) = match &data_struct.fields {
        Fields::Named(fields) => {
            let idents: Vec<_> = fields
                .named
                .iter()
                .filter_map(|field| field.ident.clone())
                .collect();
            let names: Vec<String> = idents.iter().map(|ident| ident.unraw().to_string()).collect();
            let indexes = 0..idents.len();

            let to_payload = quote! {
                ::event_bridge::encode_payload(self)
            };
            let from_record = quote! {
                Ok(Self {
                    #( #idents: record.take(#indexes, #names)?, )*
                })
            };
            (names, to_payload, from_record)
        }
        Fields::Unit => {
            let to_payload = quote! {
                Ok(b"{}".to_vec())
            };
            let from_record = quote! {
                let _ = record;
                Ok(Self)
            };
            (Vec::new(), to_payload, from_record)
        }
        Fields::Unnamed(_) => {
            return Err(syn::Error::new_spanned(
                name,
                "DomainEvent derive: tuple structs have no field names; use named fields",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics ::event_bridge::DomainEvent for #name #ty_generics #where_clause {
            fn type_name(&self) -> &'static str {
                #type_name
            }

            fn to_payload(&self) -> ::std::result::Result<::std::vec::Vec<u8>, ::event_bridge::serde_json::Error> {
                #to_payload
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }

        impl #impl_generics ::event_bridge::EventType for #name #ty_generics #where_clause {
            const TYPE_NAME: &'static str = #type_name;
            const FIELDS: &'static [&'static str] = &[#(#field_names),*];

            fn from_record(
                record: &mut ::event_bridge::Record,
            ) -> ::std::result::Result<Self, ::event_bridge::FieldError> {
                #from_record
            }
        }
    })
}

fn extract_type_name(input: &DeriveInput) -> syn::Result<String> {
    for attr in &input.attrs {
        if !attr.path().is_ident("event") {
            continue;
        }

        let mut type_name = None;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                type_name = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported event attribute, expected `name`"))
            }
        })?;

        if let Some(type_name) = type_name {
            if type_name.is_empty() {
                return Err(syn::Error::new_spanned(attr, "event name cannot be empty"));
            }
            return Ok(type_name);
        }
    }

    Ok(input.ident.unraw().to_string())
}
