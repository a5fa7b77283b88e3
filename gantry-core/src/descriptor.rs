use crate::{Result, RowLabeled, Value};
use std::any::{Any, TypeId};
use std::sync::Arc;

/// A materialized entity instance, type-erased for graph loading. Navigation
/// assignment thunks downcast back to the concrete type.
pub type ArcRecord = Arc<dyn Any + Send + Sync>;

/// How a column obtains its value on the database side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratedKind {
    None,
    /// Auto-increment / identity column.
    Identity,
    /// Computed by the database on every write.
    Computed,
    /// Drawn from a named sequence in the INSERT itself.
    Sequence(&'static str),
}

impl GeneratedKind {
    pub fn is_generated(&self) -> bool {
        !matches!(self, GeneratedKind::None)
    }
}

/// Attribute-level description of one mapped scalar property, as emitted by
/// `#[derive(Entity)]`. The model resolver layers fluent configuration on
/// top of these to produce the effective mapping.
#[derive(Debug, Clone)]
pub struct PropertyDef {
    pub name: &'static str,
    pub column: &'static str,
    /// Typed null witnessing the property's value type.
    pub prototype: Value,
    pub key: bool,
    pub generated: GeneratedKind,
    pub read_only: bool,
    pub required: bool,
    pub max_length: Option<u32>,
    pub min_length: Option<u32>,
    /// Whether the Rust field is an `Option`.
    pub nullable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationKind {
    /// Single related instance; the foreign key lives on the owning entity.
    Reference,
    /// Set of related instances; the foreign key lives on the related entity.
    Collection,
}

/// Description of one navigation property, with the type-erased thunks the
/// graph loaders drive. The thunks are generated per entity so no reflection
/// happens per row.
pub struct NavigationDef {
    pub name: &'static str,
    pub kind: NavigationKind,
    /// Foreign key property: on the owner for references, on the related
    /// entity for collections.
    pub foreign_key: &'static str,
    /// Navigation on the related entity pointing back, when declared.
    pub inverse: Option<&'static str>,
    pub related: fn() -> &'static EntityDescriptor,
    /// Store loaded targets into the parent's navigation cell. Ignores a
    /// second assignment for the same parent.
    pub assign: fn(&dyn Any, Vec<ArcRecord>),
}

impl std::fmt::Debug for NavigationDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("foreign_key", &self.foreign_key)
            .field("inverse", &self.inverse)
            .finish()
    }
}

/// Everything `#[derive(Entity)]` knows about a type: table identity,
/// property and navigation definitions, and the erased materialization and
/// value accessors.
#[derive(Debug)]
pub struct EntityDescriptor {
    pub entity_name: &'static str,
    pub type_id: TypeId,
    pub table: &'static str,
    pub schema: Option<&'static str>,
    pub read_only: bool,
    pub no_key: bool,
    pub properties: Vec<PropertyDef>,
    pub navigations: Vec<NavigationDef>,
    /// Materialize an instance from a labeled row.
    pub materialize: fn(&RowLabeled) -> Result<ArcRecord>,
    /// Read a property value from an erased instance.
    pub value_of: fn(&dyn Any, &str) -> Option<Value>,
}

impl EntityDescriptor {
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn navigation(&self, name: &str) -> Option<&NavigationDef> {
        self.navigations.iter().find(|n| n.name == name)
    }
}
