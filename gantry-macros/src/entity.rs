use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{
    Expr, ExprLit, Fields, GenericArgument, ItemStruct, Lit, LitInt, LitStr, PathArguments, Type,
    TypePath,
};

/// Property name of a field: the identifier with leading underscores
/// stripped.
pub(crate) fn property_name(ident: &syn::Ident) -> String {
    ident.to_string().trim_start_matches('_').to_string()
}

enum GeneratedAttr {
    None,
    Identity,
    Computed,
    Sequence(String),
}

struct FieldInfo {
    ident: syn::Ident,
    property: String,
    column: String,
    ty: Type,
    nullable: bool,
    key: bool,
    generated: GeneratedAttr,
    read_only: bool,
    required: bool,
    max_length: Option<u32>,
    min_length: Option<u32>,
    /// `Some((related type, is_collection))` for navigation fields.
    navigation: Option<(Type, bool)>,
    foreign_key: Option<String>,
    inverse: Option<String>,
}

struct StructInfo {
    table: Option<String>,
    schema: Option<String>,
    read_only: bool,
    no_key: bool,
}

fn parse_struct_attrs(item: &ItemStruct) -> StructInfo {
    let mut info = StructInfo {
        table: None,
        schema: None,
        read_only: false,
        no_key: false,
    };
    for attr in &item.attrs {
        if !attr.path().is_ident("gantry") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                info.table = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("schema") {
                info.schema = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("read_only") {
                info.read_only = true;
            } else if meta.path.is_ident("no_key") {
                info.no_key = true;
            } else {
                return Err(meta.error("unknown gantry entity attribute"));
            }
            Ok(())
        })
        .unwrap_or_else(|e| panic!("{}", e));
    }
    info
}

/// Detect `BelongsTo<T>` / `HasMany<T>` fields and pull out `T`.
fn navigation_target(ty: &Type) -> Option<(Type, bool)> {
    let Type::Path(TypePath { path, .. }) = ty else {
        return None;
    };
    let segment = path.segments.last()?;
    let collection = match segment.ident.to_string().as_str() {
        "HasMany" => true,
        "BelongsTo" => false,
        _ => return None,
    };
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    args.args.iter().find_map(|a| match a {
        GenericArgument::Type(t) => Some((t.clone(), collection)),
        _ => None,
    })
}

fn is_option(ty: &Type) -> bool {
    matches!(ty, Type::Path(TypePath { path, .. })
        if path.segments.last().is_some_and(|s| s.ident == "Option"))
}

fn parse_length(value: &Expr) -> u32 {
    if let Expr::Lit(ExprLit {
        lit: Lit::Int(v), ..
    }) = value
    {
        return v.base10_parse().unwrap_or_else(|e| panic!("{}", e));
    }
    panic!("length bounds must be integer literals");
}

fn parse_field(field: &syn::Field) -> FieldInfo {
    let ident = field
        .ident
        .clone()
        .expect("Entity can only be derived for structs with named fields");
    let property = property_name(&ident);
    let mut info = FieldInfo {
        property: property.clone(),
        column: property,
        ident,
        ty: field.ty.clone(),
        nullable: is_option(&field.ty),
        key: false,
        generated: GeneratedAttr::None,
        read_only: false,
        required: false,
        max_length: None,
        min_length: None,
        navigation: navigation_target(&field.ty),
        foreign_key: None,
        inverse: None,
    };
    for attr in &field.attrs {
        if !attr.path().is_ident("gantry") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("column") {
                info.column = meta.value()?.parse::<LitStr>()?.value();
            } else if meta.path.is_ident("key") {
                info.key = true;
            } else if meta.path.is_ident("generated") {
                let kind = meta.value()?.parse::<LitStr>()?.value();
                info.generated = match kind.as_str() {
                    "identity" => GeneratedAttr::Identity,
                    "computed" => GeneratedAttr::Computed,
                    other => panic!(
                        "unknown generation kind `{other}`, expected `identity` or `computed`"
                    ),
                };
            } else if meta.path.is_ident("sequence") {
                info.generated = GeneratedAttr::Sequence(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("read_only") {
                info.read_only = true;
            } else if meta.path.is_ident("required") {
                info.required = true;
            } else if meta.path.is_ident("max_length") {
                info.max_length = Some(meta.value()?.parse::<LitInt>()?.base10_parse()?);
            } else if meta.path.is_ident("min_length") {
                info.min_length = Some(meta.value()?.parse::<LitInt>()?.base10_parse()?);
            } else if meta.path.is_ident("length") {
                // length(min, max)
                let content;
                syn::parenthesized!(content in meta.input);
                let bounds =
                    content.parse_terminated(<Expr as syn::parse::Parse>::parse, syn::Token![,])?;
                let mut bounds = bounds.iter();
                info.min_length = bounds.next().map(parse_length);
                info.max_length = bounds.next().map(parse_length);
            } else if meta.path.is_ident("foreign_key") {
                info.foreign_key = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("inverse") {
                info.inverse = Some(meta.value()?.parse::<LitStr>()?.value());
            } else {
                return Err(meta.error("unknown gantry field attribute"));
            }
            Ok(())
        })
        .unwrap_or_else(|e| panic!("{}", e));
    }
    info
}

pub(crate) fn derive_entity(item: &ItemStruct) -> TokenStream {
    let name = &item.ident;
    let entity_name = name.to_string();
    let struct_info = parse_struct_attrs(item);
    let Fields::Named(_) = &item.fields else {
        panic!("Entity can only be derived for structs with named fields");
    };
    let fields: Vec<FieldInfo> = item.fields.iter().map(parse_field).collect();
    let scalars: Vec<&FieldInfo> = fields.iter().filter(|f| f.navigation.is_none()).collect();
    let navigations: Vec<&FieldInfo> = fields.iter().filter(|f| f.navigation.is_some()).collect();

    let table = struct_info.table.unwrap_or_else(|| entity_name.clone());
    let schema = match &struct_info.schema {
        Some(v) => quote!(Some(#v)),
        None => quote!(None),
    };
    let read_only = struct_info.read_only;
    let no_key = struct_info.no_key;

    let property_defs = scalars.iter().map(|f| {
        let property = &f.property;
        let column = &f.column;
        let ty = &f.ty;
        let key = f.key;
        let generated = match &f.generated {
            GeneratedAttr::None => quote!(::gantry::GeneratedKind::None),
            GeneratedAttr::Identity => quote!(::gantry::GeneratedKind::Identity),
            GeneratedAttr::Computed => quote!(::gantry::GeneratedKind::Computed),
            GeneratedAttr::Sequence(s) => quote!(::gantry::GeneratedKind::Sequence(#s)),
        };
        let field_read_only = f.read_only;
        let required = f.required;
        let max_length = match f.max_length {
            Some(v) => quote!(Some(#v)),
            None => quote!(None),
        };
        let min_length = match f.min_length {
            Some(v) => quote!(Some(#v)),
            None => quote!(None),
        };
        let nullable = f.nullable;
        quote! {
            ::gantry::PropertyDef {
                name: #property,
                column: #column,
                prototype: <#ty as ::gantry::AsValue>::prototype(),
                key: #key,
                generated: #generated,
                read_only: #field_read_only,
                required: #required,
                max_length: #max_length,
                min_length: #min_length,
                nullable: #nullable,
            }
        }
    });

    let assign_fns = navigations.iter().map(|f| {
        let fn_name = format_ident!("__gantry_assign_{}", f.ident);
        let field = &f.ident;
        let (related, collection) = f.navigation.as_ref().expect("navigation field");
        if *collection {
            quote! {
                fn #fn_name(parent: &dyn ::std::any::Any, items: Vec<::gantry::ArcRecord>) {
                    let Some(parent) = parent.downcast_ref::<#name>() else {
                        return;
                    };
                    let items: Vec<::std::sync::Arc<#related>> = items
                        .into_iter()
                        .filter_map(|v| v.downcast::<#related>().ok())
                        .collect();
                    let _ = parent.#field.set(items);
                }
            }
        } else {
            quote! {
                fn #fn_name(parent: &dyn ::std::any::Any, items: Vec<::gantry::ArcRecord>) {
                    let Some(parent) = parent.downcast_ref::<#name>() else {
                        return;
                    };
                    let target = items
                        .into_iter()
                        .next()
                        .and_then(|v| v.downcast::<#related>().ok());
                    let _ = parent.#field.set(target);
                }
            }
        }
    });

    let navigation_defs = navigations.iter().map(|f| {
        let fn_name = format_ident!("__gantry_assign_{}", f.ident);
        let property = &f.property;
        let (related, collection) = f.navigation.as_ref().expect("navigation field");
        let kind = if *collection {
            quote!(::gantry::NavigationKind::Collection)
        } else {
            quote!(::gantry::NavigationKind::Reference)
        };
        // Left empty when the relationship is declared fluently; the model
        // resolver rejects navigations that end up without a foreign key.
        let foreign_key = f.foreign_key.clone().unwrap_or_default();
        let inverse = match &f.inverse {
            Some(v) => quote!(Some(#v)),
            None => quote!(None),
        };
        quote! {
            ::gantry::NavigationDef {
                name: #property,
                kind: #kind,
                foreign_key: #foreign_key,
                inverse: #inverse,
                related: <#related as ::gantry::Entity>::descriptor,
                assign: #fn_name,
            }
        }
    });

    let from_row_fields = fields.iter().map(|f| {
        let field = &f.ident;
        if f.navigation.is_some() {
            quote! { #field: ::std::default::Default::default() }
        } else {
            let property = &f.property;
            quote! { #field: ::gantry::from_row_get(#entity_name, row, #property)? }
        }
    });

    let value_of_arms = scalars.iter().map(|f| {
        let field = &f.ident;
        let property = &f.property;
        quote! { #property => Some(::gantry::AsValue::as_value(&self.#field)), }
    });

    let set_value_arms = scalars.iter().map(|f| {
        let field = &f.ident;
        let property = &f.property;
        quote! {
            #property => ::gantry::assign_property(#entity_name, #property, &mut self.#field, value),
        }
    });

    quote! {
        const _: () = {
            fn __gantry_materialize(
                row: &::gantry::RowLabeled,
            ) -> ::gantry::Result<::gantry::ArcRecord> {
                Ok(::std::sync::Arc::new(<#name as ::gantry::Entity>::from_row(row)?))
            }

            fn __gantry_value_of(
                instance: &dyn ::std::any::Any,
                property: &str,
            ) -> Option<::gantry::Value> {
                instance
                    .downcast_ref::<#name>()
                    .and_then(|e| ::gantry::Entity::value_of(e, property))
            }

            #(#assign_fns)*

            impl ::gantry::Entity for #name {
                fn descriptor() -> &'static ::gantry::EntityDescriptor {
                    static DESCRIPTOR: ::std::sync::OnceLock<::gantry::EntityDescriptor> =
                        ::std::sync::OnceLock::new();
                    DESCRIPTOR.get_or_init(|| ::gantry::EntityDescriptor {
                        entity_name: #entity_name,
                        type_id: ::std::any::TypeId::of::<#name>(),
                        table: #table,
                        schema: #schema,
                        read_only: #read_only,
                        no_key: #no_key,
                        properties: vec![#(#property_defs),*],
                        navigations: vec![#(#navigation_defs),*],
                        materialize: __gantry_materialize,
                        value_of: __gantry_value_of,
                    })
                }

                fn from_row(row: &::gantry::RowLabeled) -> ::gantry::Result<Self> {
                    Ok(Self {
                        #(#from_row_fields),*
                    })
                }

                fn value_of(&self, property: &str) -> Option<::gantry::Value> {
                    match property {
                        #(#value_of_arms)*
                        _ => None,
                    }
                }

                fn set_value(
                    &mut self,
                    property: &str,
                    value: ::gantry::Value,
                ) -> ::gantry::Result<()> {
                    match property {
                        #(#set_value_arms)*
                        _ => Err(::gantry::unknown_property(#entity_name, property)),
                    }
                }
            }
        };
    }
}
