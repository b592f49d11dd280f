//! Procedural macros for Ferry.
//!
//! Use them through the `macros` feature of the `ferry` crate.

use proc_macro::TokenStream;

mod category;

/// Derive macro for implementing the `Category` trait.
///
/// The category defaults to the type name. Override it with
/// `#[category = "..."]`.
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize, Category)]
/// #[category = "order.created"]
/// struct OrderCreated { id: u64 }
///
/// let (orders, dlq) = emitter.enqueue(Json::<OrderCreated>::declared());
/// ```
#[proc_macro_derive(Category, attributes(category))]
pub fn derive_category(input: TokenStream) -> TokenStream {
    category::derive_category_impl(input)
}
