//! Proc macros for the Vivaio extension SDK.
//!
//! Provides `#[derive(Content)]`, which implements the content instance
//! trait for a struct embedding an `Item`, and `#[attach]`, which exports an
//! extension's registration function under the symbol names the kernel's
//! loader resolves.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::{format_ident, quote};
use syn::{
    Data, DeriveInput, Fields, FnArg, ItemFn, LitStr, ReturnType, parse_macro_input,
    spanned::Spanned,
};

/// Implements `vivaio_sdk::content::Content`.
///
/// The struct must derive `Serialize` and `Deserialize` and embed an `Item`
/// (flattened) in a field named `item` or marked `#[content(item)]`.
///
/// Struct attributes:
/// - `#[content(hooks)]`: the type implements `Hookable` and is writable
///   through the API.
/// - `#[content(visibility = path::to::fn)]`: replaces the default
///   visibility predicate; the function takes `(&Self, &Caller)`.
///
/// Field attributes:
/// - `#[content(private)]`: the field is stripped from API responses.
/// - `#[content(search)]`: the field is matched by `/api/search`. Private
///   fields cannot be searchable.
///
/// # Example
///
/// ```ignore
/// #[derive(Default, Serialize, Deserialize, Content)]
/// #[content(hooks)]
/// pub struct Post {
///     #[serde(flatten)]
///     pub item: Item,
///     #[content(search)]
///     pub title: String,
///     #[content(private)]
///     pub editor_notes: String,
/// }
/// ```
#[proc_macro_derive(Content, attributes(content))]
pub fn derive_content(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_content(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

#[derive(Default)]
struct ContentOptions {
    hooks: bool,
    visibility: Option<syn::Path>,
}

fn expand_content(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut options = ContentOptions::default();
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("content")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("hooks") {
                options.hooks = true;
                Ok(())
            } else if meta.path.is_ident("visibility") {
                options.visibility = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("unsupported content attribute"))
            }
        })?;
    }

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(
            input.span(),
            "Content can only be derived for structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new(
            input.span(),
            "Content requires a struct with named fields",
        ));
    };

    let mut item_field = None;
    let mut schema = Vec::new();
    let mut private = Vec::new();
    let mut searchable = Vec::new();

    for field in &fields.named {
        let Some(ident) = &field.ident else { continue };

        let mut is_item = false;
        let mut is_private = false;
        let mut is_search = false;
        for attr in field.attrs.iter().filter(|a| a.path().is_ident("content")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("item") {
                    is_item = true;
                    Ok(())
                } else if meta.path.is_ident("private") {
                    is_private = true;
                    Ok(())
                } else if meta.path.is_ident("search") {
                    is_search = true;
                    Ok(())
                } else {
                    Err(meta.error("unsupported content field attribute"))
                }
            })?;
        }

        if is_item || (item_field.is_none() && ident == "item") {
            if is_item && item_field.is_some() {
                return Err(syn::Error::new(
                    field.span(),
                    "only one field may be marked #[content(item)]",
                ));
            }
            item_field = Some(ident.clone());
            continue;
        }

        let serde = serde_field_options(field);
        if serde.skip {
            continue;
        }
        let key = serde
            .rename
            .unwrap_or_else(|| ident.to_string().trim_start_matches("r#").to_string());
        let ty = &field.ty;
        let type_name = quote!(#ty).to_string().replace(' ', "");

        if is_private && is_search {
            return Err(syn::Error::new(
                field.span(),
                "a #[content(private)] field cannot be #[content(search)]",
            ));
        }
        if is_private {
            private.push(key.clone());
        }
        if is_search {
            searchable.push(key.clone());
        }
        schema.push(quote! {
            schema.push(::vivaio_sdk::types::FieldSchema::new(#key, #type_name));
        });
    }

    let Some(item_field) = item_field else {
        return Err(syn::Error::new(
            input.span(),
            "Content requires an `item: Item` field or a field marked #[content(item)]",
        ));
    };

    let hooks_fn = options.hooks.then(|| {
        quote! {
            fn hooks(&mut self) -> ::core::option::Option<&mut dyn ::vivaio_sdk::hooks::Hookable> {
                ::core::option::Option::Some(self)
            }
        }
    });

    let visibility_fn = options.visibility.map(|path| {
        quote! {
            fn visibility(
                &self,
                caller: &::vivaio_sdk::types::Caller,
            ) -> ::vivaio_sdk::types::Visibility {
                #path(self, caller)
            }
        }
    });

    let omitted_fn = (!private.is_empty()).then(|| {
        quote! {
            fn omitted_fields(
                &self,
                _caller: &::vivaio_sdk::types::Caller,
            ) -> ::std::vec::Vec<::std::string::String> {
                ::std::vec![#(::std::string::String::from(#private)),*]
            }
        }
    });

    let search_fn = (!searchable.is_empty()).then(|| {
        quote! {
            fn search_fields(&self) -> ::std::vec::Vec<::std::string::String> {
                ::std::vec![#(::std::string::String::from(#searchable)),*]
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::vivaio_sdk::content::Content for #name #ty_generics #where_clause {
            fn item(&self) -> &::vivaio_sdk::types::Item {
                &self.#item_field
            }

            fn item_mut(&mut self) -> &mut ::vivaio_sdk::types::Item {
                &mut self.#item_field
            }

            fn to_value(&self) -> ::core::result::Result<
                ::vivaio_sdk::serde_json::Value,
                ::vivaio_sdk::serde_json::Error,
            > {
                ::vivaio_sdk::serde_json::to_value(self)
            }

            fn load_value(
                &mut self,
                value: ::vivaio_sdk::serde_json::Value,
            ) -> ::core::result::Result<(), ::vivaio_sdk::serde_json::Error> {
                *self = ::vivaio_sdk::serde_json::from_value(value)?;
                ::core::result::Result::Ok(())
            }

            fn field_schema(&self) -> ::std::vec::Vec<::vivaio_sdk::types::FieldSchema> {
                let mut schema = ::vivaio_sdk::types::Item::field_schema();
                #(#schema)*
                schema
            }

            #hooks_fn
            #visibility_fn
            #omitted_fn
            #search_fn
        }
    })
}

#[derive(Default)]
struct SerdeFieldOptions {
    rename: Option<String>,
    skip: bool,
}

/// Picks `rename` and `skip` out of a field's `#[serde(...)]` attributes,
/// ignoring everything else.
fn serde_field_options(field: &syn::Field) -> SerdeFieldOptions {
    let mut options = SerdeFieldOptions::default();
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("serde")) {
        // Unknown serde options are not ours to validate.
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let lit: LitStr = meta.value()?.parse()?;
                options.rename = Some(lit.value());
            } else if meta.path.is_ident("skip") {
                options.skip = true;
            } else if meta.input.peek(syn::Token![=]) {
                let _: syn::Expr = meta.value()?.parse()?;
            }
            Ok(())
        });
    }
    options
}

/// Marks an extension's registration function.
///
/// The function must take exactly one `&mut dyn Registrar` argument and
/// return nothing. It stays callable as a normal Rust function and is also
/// exported as `vivaio_attach_<crate>`, alongside a generated
/// `vivaio_sdk_version_<crate>` reporting the SDK version the extension was
/// built against. `<crate>` defaults to the compiling crate's name and can
/// be overridden with `#[attach(name = "...")]`.
///
/// # Example
///
/// ```ignore
/// #[attach]
/// pub fn attach(registrar: &mut dyn Registrar) {
///     registrar.register_default::<Post>("Post");
/// }
/// ```
#[proc_macro_attribute]
pub fn attach(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input_fn = parse_macro_input!(item as ItemFn);

    let mut name: Option<String> = None;
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("name") {
            let lit: LitStr = meta.value()?.parse()?;
            name = Some(lit.value());
            Ok(())
        } else {
            Err(meta.error("unsupported attach attribute"))
        }
    });
    parse_macro_input!(attr with parser);

    match expand_attach(input_fn, name) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand_attach(input_fn: ItemFn, name: Option<String>) -> syn::Result<proc_macro2::TokenStream> {
    let sig = &input_fn.sig;
    if sig.inputs.len() != 1 || matches!(sig.inputs.first(), Some(FnArg::Receiver(_))) {
        return Err(syn::Error::new(
            sig.span(),
            "attach functions take exactly one `&mut dyn Registrar` argument",
        ));
    }
    if !matches!(sig.output, ReturnType::Default) {
        return Err(syn::Error::new(
            sig.output.span(),
            "attach functions must not return a value",
        ));
    }
    if sig.asyncness.is_some() {
        return Err(syn::Error::new(
            sig.span(),
            "attach functions must be synchronous",
        ));
    }

    let crate_name = match name {
        Some(n) => n,
        None => std::env::var("CARGO_CRATE_NAME").map_err(|_| {
            syn::Error::new(
                Span::call_site(),
                "CARGO_CRATE_NAME is not set; use #[attach(name = \"...\")]",
            )
        })?,
    };

    let attach_symbol = format!("vivaio_attach_{crate_name}");
    let version_symbol = format!("vivaio_sdk_version_{crate_name}");
    let version_fn = format_ident!("__vivaio_sdk_version_{}", crate_name);

    let attrs = &input_fn.attrs;
    let vis = &input_fn.vis;
    let block = &input_fn.block;

    Ok(quote! {
        #(#attrs)*
        #[unsafe(export_name = #attach_symbol)]
        #vis #sig #block

        #[doc(hidden)]
        #[unsafe(export_name = #version_symbol)]
        pub extern "C" fn #version_fn() -> *const ::std::ffi::c_char {
            ::vivaio_sdk::registrar::SDK_VERSION_CSTR.as_ptr()
        }
    })
}
