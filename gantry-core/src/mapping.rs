use crate::{EngineError, EntityDescriptor, Result, Value};
use std::any::TypeId;
use std::collections::HashSet;

/// Effective generation strategy of a column, after configuration layering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedOption {
    None,
    Identity,
    Computed,
    Sequence(String),
}

impl GeneratedOption {
    pub fn is_generated(&self) -> bool {
        !matches!(self, GeneratedOption::None)
    }

    pub fn sequence(&self) -> Option<&str> {
        match self {
            GeneratedOption::Sequence(name) => Some(name),
            _ => None,
        }
    }
}

/// Resolved mapping of a single scalar property to its column.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyMapping {
    pub property: String,
    pub column: String,
    pub prototype: Value,
    pub generated: GeneratedOption,
    pub read_only: bool,
    pub required: bool,
    pub max_length: Option<u32>,
    pub min_length: Option<u32>,
    pub nullable: bool,
}

impl PropertyMapping {
    /// Part of an INSERT column list: not identity, not computed, not
    /// read-only. Sequence columns stay (their value expression is the
    /// sequence, not a parameter).
    pub fn is_insertable(&self) -> bool {
        !self.read_only
            && !matches!(
                self.generated,
                GeneratedOption::Identity | GeneratedOption::Computed
            )
    }

    /// Part of an UPDATE SET list: not generated, not read-only. Keys are
    /// excluded separately.
    pub fn is_settable(&self) -> bool {
        !self.read_only && !self.generated.is_generated()
    }
}

/// Resolved single-column relationship.
#[derive(Debug, Clone)]
pub struct ForeignKeyMapping {
    pub navigation: String,
    pub related: &'static EntityDescriptor,
    /// Foreign key property: on the owner for references, on the related
    /// entity for collections.
    pub foreign_key: String,
    pub is_collection: bool,
}

impl PartialEq for ForeignKeyMapping {
    fn eq(&self, other: &Self) -> bool {
        self.navigation == other.navigation
            && self.related.type_id == other.related.type_id
            && self.foreign_key == other.foreign_key
            && self.is_collection == other.is_collection
    }
}

/// Immutable per-entity mapping: one is built per type at first use and
/// cached for the lifetime of the context's model registry.
#[derive(Debug, Clone)]
pub struct EntityMapping {
    pub entity_name: String,
    pub type_id: TypeId,
    pub descriptor: &'static EntityDescriptor,
    pub table: String,
    pub schema: Option<String>,
    pub read_only: bool,
    pub no_key: bool,
    /// Ordered scalar properties.
    pub properties: Vec<PropertyMapping>,
    /// Primary key, as indices into `properties`.
    pub key: Vec<usize>,
    /// Business key used only when no primary key exists.
    pub alternate_key: Vec<usize>,
    pub foreign_keys: Vec<ForeignKeyMapping>,
}

impl PartialEq for EntityMapping {
    fn eq(&self, other: &Self) -> bool {
        self.entity_name == other.entity_name
            && self.type_id == other.type_id
            && self.table == other.table
            && self.schema == other.schema
            && self.read_only == other.read_only
            && self.no_key == other.no_key
            && self.properties == other.properties
            && self.key == other.key
            && self.alternate_key == other.alternate_key
            && self.foreign_keys == other.foreign_keys
    }
}

impl EntityMapping {
    pub fn property(&self, name: &str) -> Option<&PropertyMapping> {
        self.properties.iter().find(|p| p.property == name)
    }

    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.property == name)
    }

    /// Look a property up by its property name or, failing that, its column
    /// name. Explicit-WHERE mutations accept either.
    pub fn property_by_name_or_column(&self, name: &str) -> Option<&PropertyMapping> {
        self.property(name)
            .or_else(|| self.properties.iter().find(|p| p.column == name))
    }

    pub fn has_primary_key(&self) -> bool {
        !self.key.is_empty()
    }

    /// Primary key if present, else the alternate key.
    pub fn effective_key(&self) -> &[usize] {
        if self.key.is_empty() {
            &self.alternate_key
        } else {
            &self.key
        }
    }

    pub fn effective_key_properties(&self) -> impl Iterator<Item = &PropertyMapping> {
        self.effective_key().iter().map(|&i| &self.properties[i])
    }

    /// Whether the whole effective key is database-generated.
    pub fn is_key_generated(&self) -> bool {
        let key = self.effective_key();
        !key.is_empty()
            && key
                .iter()
                .all(|&i| self.properties[i].generated.is_generated())
    }

    pub fn foreign_key(&self, navigation: &str) -> Option<&ForeignKeyMapping> {
        self.foreign_keys
            .iter()
            .find(|fk| fk.navigation == navigation)
    }

    /// Check the structural invariants that must hold for every resolved
    /// mapping. Run once by the resolver before the mapping is published.
    pub fn check_invariants(&self) -> Result<()> {
        let mut columns = HashSet::new();
        for property in &self.properties {
            if !columns.insert(property.column.as_str()) {
                return Err(EngineError::configuration(
                    &self.entity_name,
                    format!("column `{}` is mapped more than once", property.column),
                ));
            }
            if property.generated.is_generated() && property.read_only {
                return Err(EngineError::configuration(
                    &self.entity_name,
                    format!(
                        "property `{}` is both database-generated and read-only; pick one",
                        property.property
                    ),
                ));
            }
        }
        for &i in self.key.iter().chain(&self.alternate_key) {
            if i >= self.properties.len() {
                return Err(EngineError::configuration(
                    &self.entity_name,
                    "key refers to an unmapped property",
                ));
            }
        }
        if self.key.iter().any(|i| self.alternate_key.contains(i)) {
            return Err(EngineError::configuration(
                &self.entity_name,
                "primary key and alternate key must be disjoint",
            ));
        }
        for fk in &self.foreign_keys {
            if fk.foreign_key.is_empty() {
                return Err(EngineError::configuration(
                    &self.entity_name,
                    format!(
                        "navigation `{}` has no foreign key; annotate it or declare the relationship fluently",
                        fk.navigation
                    ),
                ));
            }
            if !fk.is_collection && self.property(&fk.foreign_key).is_none() {
                return Err(EngineError::configuration(
                    &self.entity_name,
                    format!(
                        "foreign key property `{}` of navigation `{}` is not mapped",
                        fk.foreign_key, fk.navigation
                    ),
                ));
            }
            if fk.is_collection && fk.related.property(&fk.foreign_key).is_none() {
                return Err(EngineError::configuration(
                    &self.entity_name,
                    format!(
                        "collection navigation `{}` names `{}` as the foreign key, but `{}` has no such property",
                        fk.navigation, fk.foreign_key, fk.related.entity_name
                    ),
                ));
            }
        }
        Ok(())
    }
}
