//! `#[derive(Category)]`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{Attribute, DeriveInput, Expr, Lit, LitStr, Meta, parse_macro_input};

/// Implementation of `#[derive(Category)]`.
pub(crate) fn derive_category_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let category = match category_attr(&input.attrs) {
        Ok(Some(lit)) => lit,
        Ok(None) => LitStr::new(&name.to_string(), name.span()),
        Err(err) => return err.to_compile_error().into(),
    };

    if category.value().is_empty() {
        return syn::Error::new_spanned(&category, "category must not be empty")
            .to_compile_error()
            .into();
    }

    let expanded = quote! {
        impl #impl_generics ::ferry::Category for #name #ty_generics #where_clause {
            const CATEGORY: &'static str = #category;
        }
    };

    TokenStream::from(expanded)
}

/// Finds `#[category = "..."]`.
fn category_attr(attrs: &[Attribute]) -> syn::Result<Option<LitStr>> {
    let Some(attr) = attrs.iter().find(|attr| attr.path().is_ident("category")) else {
        return Ok(None);
    };

    if let Meta::NameValue(nv) = &attr.meta {
        if let Expr::Lit(expr_lit) = &nv.value {
            if let Lit::Str(lit) = &expr_lit.lit {
                return Ok(Some(lit.clone()));
            }
        }
    }

    Err(syn::Error::new_spanned(
        attr,
        "expected `#[category = \"...\"]`",
    ))
}
