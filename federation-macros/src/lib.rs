use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Item, ItemStruct, LitStr};

mod msgs;

use msgs::{
    ERR_CONTAINER_MISSING, ERR_CONTAINER_NAME, ERR_EXPOSE_GENERICS, ERR_EXPOSE_TARGET,
    ERR_MODULE_PREFIX, ERR_UNKNOWN_ARG,
};

const DEFAULT_MODULE: &str = "./Widget";

/// 把 `Mountable` 模块发布为 `container/<module>`，供 `ContainerRegistry::discover()` 提供。
///
/// ```ignore
/// #[widget_federation::expose(container = "notes_widget", module = "./Widget")]
/// struct NotesLog { .. }
/// ```
#[proc_macro_attribute]
pub fn expose(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut container: Option<LitStr> = None;
    let mut module: Option<LitStr> = None;
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("container") {
            container = Some(meta.value()?.parse()?);
            Ok(())
        } else if meta.path.is_ident("module") {
            module = Some(meta.value()?.parse()?);
            Ok(())
        } else {
            Err(meta.error(ERR_UNKNOWN_ARG))
        }
    });
    parse_macro_input!(args with parser);

    let item = match parse_macro_input!(input as Item) {
        Item::Struct(item) => item,
        other => {
            return syn::Error::new_spanned(other, ERR_EXPOSE_TARGET)
                .to_compile_error()
                .into()
        }
    };
    match expand(&item, container, module) {
        Ok(ts) => ts.into(),
        Err(e) => {
            let err = e.to_compile_error();
            quote! { #item #err }.into()
        }
    }
}

fn expand(
    item: &ItemStruct,
    container: Option<LitStr>,
    module: Option<LitStr>,
) -> syn::Result<proc_macro2::TokenStream> {
    if !item.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(&item.generics, ERR_EXPOSE_GENERICS));
    }
    let container =
        container.ok_or_else(|| syn::Error::new_spanned(&item.ident, ERR_CONTAINER_MISSING))?;
    let name = container.value();
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(syn::Error::new_spanned(&container, ERR_CONTAINER_NAME));
    }
    let module = module.unwrap_or_else(|| LitStr::new(DEFAULT_MODULE, container.span()));
    if !module.value().starts_with("./") || module.value().len() <= 2 {
        return Err(syn::Error::new_spanned(&module, ERR_MODULE_PREFIX));
    }

    let ident = &item.ident;
    let create_ident = format_ident!("__expose_{}", ident.to_string().to_lowercase());
    Ok(quote! {
        #item
        #[doc(hidden)]
        const _: () = {
            fn #create_ident() -> ::std::sync::Arc<dyn widget_federation::widget::WidgetFactory> {
                ::std::sync::Arc::new(widget_federation::widget::MountableFactory::<#ident>::new())
            }
            widget_federation::__private::inventory::submit! {
                widget_federation::remote::Exposure {
                    container: #container,
                    module: #module,
                    create: #create_ident,
                }
            }
        };
    })
}
