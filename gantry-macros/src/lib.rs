mod entity;
mod expression;

use proc_macro::TokenStream;
use syn::{Expr, ItemStruct, parse_macro_input};

/// Map a struct to a table.
///
/// Struct attributes: `#[gantry(table = "...", schema = "...", read_only,
/// no_key)]`. Field attributes: `column`, `key`, `generated =
/// "identity"|"computed"`, `sequence = "..."`, `required`, `max_length`,
/// `min_length`, `length(min, max)`, `read_only`, and on navigation fields
/// (`BelongsTo<T>` / `HasMany<T>`) `foreign_key` and `inverse`.
#[proc_macro_derive(Entity, attributes(gantry))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let item: ItemStruct = parse_macro_input!(input as ItemStruct);
    entity::derive_entity(&item).into()
}

/// Build a predicate from Rust expression syntax.
///
/// `Type::property` paths name columns; every other sub-expression is
/// evaluated once, at construction, and binds as a parameter. `NULL` is a
/// keyword: `expr!(User::venue == NULL)` becomes an IS NULL test. String
/// columns support `starts_with`, `ends_with` and `contains`; a collection
/// membership test is written `expr!(ids.contains(User::id))`.
#[proc_macro]
pub fn expr(input: TokenStream) -> TokenStream {
    let expr: Expr = parse_macro_input!(input as Expr);
    expression::decode_predicate(&expr).into()
}

/// Name a column for ordering or configuration: `col!(User::id)` yields the
/// property name.
#[proc_macro]
pub fn col(input: TokenStream) -> TokenStream {
    let expr: Expr = parse_macro_input!(input as Expr);
    expression::decode_column(&expr).into()
}
