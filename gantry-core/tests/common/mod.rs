//! Hand-written entity implementations used by the core tests. The derive
//! macro generates equivalent code; spelling it out here keeps the core
//! crate's tests free of the macro crates.
#![allow(dead_code)]

use gantry_core::{
    AsValue, Entity, EntityDescriptor, GeneratedKind, ModelBuilder, ModelRegistry, PropertyDef,
    Result, RowLabeled, SqlServerDialect, Value, assign_property, from_row_get, unknown_property,
};
use std::any::TypeId;
use std::sync::{Arc, OnceLock};

pub static SQLSERVER: SqlServerDialect = SqlServerDialect;

pub fn registry() -> ModelRegistry {
    ModelRegistry::new(&SQLSERVER, ModelBuilder::default().into_config())
}

pub fn registry_with(f: impl FnOnce(&mut ModelBuilder)) -> ModelRegistry {
    let mut builder = ModelBuilder::default();
    f(&mut builder);
    ModelRegistry::new(&SQLSERVER, builder.into_config())
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub is_active: bool,
}

impl Entity for User {
    fn descriptor() -> &'static EntityDescriptor {
        static DESCRIPTOR: OnceLock<EntityDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| EntityDescriptor {
            entity_name: "User",
            type_id: TypeId::of::<User>(),
            table: "Users",
            schema: Some("dbo"),
            read_only: false,
            no_key: false,
            properties: vec![
                PropertyDef {
                    name: "id",
                    column: "id",
                    prototype: <i32 as AsValue>::prototype(),
                    key: true,
                    generated: GeneratedKind::Identity,
                    read_only: false,
                    required: false,
                    max_length: None,
                    min_length: None,
                    nullable: false,
                },
                PropertyDef {
                    name: "name",
                    column: "username",
                    prototype: <String as AsValue>::prototype(),
                    key: false,
                    generated: GeneratedKind::None,
                    read_only: false,
                    required: true,
                    max_length: Some(50),
                    min_length: Some(2),
                    nullable: false,
                },
                PropertyDef {
                    name: "is_active",
                    column: "is_active",
                    prototype: <bool as AsValue>::prototype(),
                    key: false,
                    generated: GeneratedKind::None,
                    read_only: false,
                    required: false,
                    max_length: None,
                    min_length: None,
                    nullable: false,
                },
            ],
            navigations: vec![],
            materialize: |row| Ok(Arc::new(User::from_row(row)?)),
            value_of: |any, property| {
                any.downcast_ref::<User>().and_then(|e| e.value_of(property))
            },
        })
    }

    fn from_row(row: &RowLabeled) -> Result<Self> {
        Ok(Self {
            id: from_row_get("User", row, "id")?,
            name: from_row_get("User", row, "name")?,
            is_active: from_row_get("User", row, "is_active")?,
        })
    }

    fn value_of(&self, property: &str) -> Option<Value> {
        match property {
            "id" => Some(self.id.as_value()),
            "name" => Some(self.name.as_value()),
            "is_active" => Some(self.is_active.as_value()),
            _ => None,
        }
    }

    fn set_value(&mut self, property: &str, value: Value) -> Result<()> {
        match property {
            "id" => assign_property("User", "id", &mut self.id, value),
            "name" => assign_property("User", "name", &mut self.name, value),
            "is_active" => assign_property("User", "is_active", &mut self.is_active, value),
            _ => Err(unknown_property("User", property)),
        }
    }
}

/// Keyless by annotation; the resolver must find `gadget_id` by the
/// `<TypeName>Id` convention.
#[derive(Debug, Clone, Default)]
pub struct Gadget {
    pub gadget_id: i64,
    pub label: Option<String>,
}

impl Entity for Gadget {
    fn descriptor() -> &'static EntityDescriptor {
        static DESCRIPTOR: OnceLock<EntityDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| EntityDescriptor {
            entity_name: "Gadget",
            type_id: TypeId::of::<Gadget>(),
            table: "Gadgets",
            schema: None,
            read_only: false,
            no_key: false,
            properties: vec![
                PropertyDef {
                    name: "gadget_id",
                    column: "gadget_id",
                    prototype: <i64 as AsValue>::prototype(),
                    key: false,
                    generated: GeneratedKind::None,
                    read_only: false,
                    required: false,
                    max_length: None,
                    min_length: None,
                    nullable: false,
                },
                PropertyDef {
                    name: "label",
                    column: "label",
                    prototype: <String as AsValue>::prototype(),
                    key: false,
                    generated: GeneratedKind::None,
                    read_only: false,
                    required: false,
                    max_length: None,
                    min_length: None,
                    nullable: true,
                },
            ],
            navigations: vec![],
            materialize: |row| Ok(Arc::new(Gadget::from_row(row)?)),
            value_of: |any, property| {
                any.downcast_ref::<Gadget>()
                    .and_then(|e| e.value_of(property))
            },
        })
    }

    fn from_row(row: &RowLabeled) -> Result<Self> {
        Ok(Self {
            gadget_id: from_row_get("Gadget", row, "gadget_id")?,
            label: from_row_get("Gadget", row, "label")?,
        })
    }

    fn value_of(&self, property: &str) -> Option<Value> {
        match property {
            "gadget_id" => Some(self.gadget_id.as_value()),
            "label" => Some(self.label.as_value()),
            _ => None,
        }
    }

    fn set_value(&mut self, property: &str, value: Value) -> Result<()> {
        match property {
            "gadget_id" => assign_property("Gadget", "gadget_id", &mut self.gadget_id, value),
            "label" => assign_property("Gadget", "label", &mut self.label, value),
            _ => Err(unknown_property("Gadget", property)),
        }
    }
}

/// No key and no annotation: resolution must fail unless configured
/// keyless or read-only.
#[derive(Debug, Clone, Default)]
pub struct Widget {
    pub code: String,
}

impl Entity for Widget {
    fn descriptor() -> &'static EntityDescriptor {
        static DESCRIPTOR: OnceLock<EntityDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| EntityDescriptor {
            entity_name: "Widget",
            type_id: TypeId::of::<Widget>(),
            table: "Widgets",
            schema: None,
            read_only: false,
            no_key: false,
            properties: vec![PropertyDef {
                name: "code",
                column: "code",
                prototype: <String as AsValue>::prototype(),
                key: false,
                generated: GeneratedKind::None,
                read_only: false,
                required: false,
                max_length: None,
                min_length: None,
                nullable: false,
            }],
            navigations: vec![],
            materialize: |row| Ok(Arc::new(Widget::from_row(row)?)),
            value_of: |any, property| {
                any.downcast_ref::<Widget>()
                    .and_then(|e| e.value_of(property))
            },
        })
    }

    fn from_row(row: &RowLabeled) -> Result<Self> {
        Ok(Self {
            code: from_row_get("Widget", row, "code")?,
        })
    }

    fn value_of(&self, property: &str) -> Option<Value> {
        match property {
            "code" => Some(self.code.as_value()),
            _ => None,
        }
    }

    fn set_value(&mut self, property: &str, value: Value) -> Result<()> {
        match property {
            "code" => assign_property("Widget", "code", &mut self.code, value),
            _ => Err(unknown_property("Widget", property)),
        }
    }
}
