//! `#[procedure]` expansion
//!
//! Input:
//! ```ignore
//! #[procedure]
//! async fn get_issue(id: u32, ctx: Arc<Session>) -> Result<Issue> {
//!     ctx.issues.get(id).await
//! }
//! ```
//!
//! Generated output:
//! ```ignore
//! fn get_issue() -> Box<dyn prow_server::Procedure<Session>> {
//!     async fn get_issue(id: u32, ctx: Arc<Session>) -> Result<Issue> {
//!         ctx.issues.get(id).await
//!     }
//!
//!     prow_server::from_typed_fn(get_issue)
//! }
//! ```
//!
//! Without a context parameter the factory is generic over the context type
//! and the context is dropped.

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{FnArg, GenericArgument, ItemFn, PathArguments, ReturnType, Type};

pub fn expand(input_fn: ItemFn) -> syn::Result<TokenStream> {
    let sig = &input_fn.sig;

    if sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            sig.fn_token,
            "#[procedure] requires an async fn",
        ));
    }
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &sig.generics,
            "#[procedure] functions cannot be generic",
        ));
    }

    let mut params = Vec::with_capacity(sig.inputs.len());
    for arg in &sig.inputs {
        match arg {
            FnArg::Typed(pat_type) => params.push(pat_type),
            FnArg::Receiver(receiver) => {
                return Err(syn::Error::new_spanned(
                    receiver,
                    "#[procedure] cannot be used on methods",
                ))
            }
        }
    }

    let fn_name = &sig.ident;
    let fn_vis = &input_fn.vis;
    let fn_attrs = &input_fn.attrs;
    let fn_block = &input_fn.block;
    let inner_name = format_ident!("__{}_procedure", fn_name);
    let output = match &sig.output {
        ReturnType::Type(_, ty) => quote! { #ty },
        ReturnType::Default => {
            return Err(syn::Error::new_spanned(
                sig,
                "#[procedure] functions must return a Result",
            ))
        }
    };

    let expanded = match params.as_slice() {
        [] => quote! {
            #(#fn_attrs)*
            #fn_vis fn #fn_name<ProwContext: Send + Sync + 'static>()
                -> ::std::boxed::Box<dyn ::prow_server::Procedure<ProwContext>>
            {
                async fn #inner_name() -> #output #fn_block

                ::prow_server::from_typed_fn(
                    |_input: (), _ctx: ::std::sync::Arc<ProwContext>| #inner_name(),
                )
            }
        },
        [input] => {
            let input_ty = &input.ty;
            quote! {
                #(#fn_attrs)*
                #fn_vis fn #fn_name<ProwContext: Send + Sync + 'static>()
                    -> ::std::boxed::Box<dyn ::prow_server::Procedure<ProwContext>>
                {
                    async fn #inner_name(#input) -> #output #fn_block

                    ::prow_server::from_typed_fn(
                        |input: #input_ty, _ctx: ::std::sync::Arc<ProwContext>| #inner_name(input),
                    )
                }
            }
        }
        [input, ctx] => {
            let context_ty = arc_inner(&ctx.ty).ok_or_else(|| {
                syn::Error::new_spanned(&ctx.ty, "the context parameter must be an Arc<Context>")
            })?;
            quote! {
                #(#fn_attrs)*
                #fn_vis fn #fn_name() -> ::std::boxed::Box<dyn ::prow_server::Procedure<#context_ty>> {
                    async fn #inner_name(#input, #ctx) -> #output #fn_block

                    ::prow_server::from_typed_fn(#inner_name)
                }
            }
        }
        [_, _, extra, ..] => {
            return Err(syn::Error::new_spanned(
                extra,
                "#[procedure] takes at most an input and a context parameter",
            ))
        }
    };

    Ok(expanded)
}

/// `T` of an `Arc<T>` (or `std::sync::Arc<T>`) type
fn arc_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != "Arc" {
        return None;
    }
    match &segment.arguments {
        PathArguments::AngleBracketed(args) if args.args.len() == 1 => match args.args.first()? {
            GenericArgument::Type(inner) => Some(inner),
            _ => None,
        },
        _ => None,
    }
}
