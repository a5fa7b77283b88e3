use crate::{EngineError, Entity, EntityMapping, Result, ValidationFailure, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Insert,
    Update,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Insert => "insert",
            MutationKind::Update => "update",
        }
    }
}

/// Check an entity against its mapping before a write. Collects every
/// violation instead of stopping at the first.
pub fn validate_entity<E: Entity>(
    mapping: &EntityMapping,
    entity: &E,
    kind: MutationKind,
) -> Result<()> {
    if mapping.read_only {
        return Err(EngineError::ReadOnly {
            entity: mapping.entity_name.clone(),
            operation: kind.as_str(),
        });
    }
    let mut failures = Vec::new();
    for (index, property) in mapping.properties.iter().enumerate() {
        let skip = match kind {
            MutationKind::Insert => property.generated.is_generated() || property.read_only,
            MutationKind::Update => {
                property.generated.is_generated()
                    || property.read_only
                    || mapping.effective_key().contains(&index)
            }
        };
        if skip {
            continue;
        }
        let value = entity.value_of(&property.property).unwrap_or(Value::Null);
        if property.required && value.is_null() {
            failures.push(ValidationFailure {
                property: property.property.clone(),
                message: "property is required".into(),
            });
            continue;
        }
        if let Value::Varchar(Some(text)) = &value {
            let length = text.chars().count() as u32;
            if let Some(max) = property.max_length {
                if length > max {
                    failures.push(ValidationFailure {
                        property: property.property.clone(),
                        message: format!("length {length} exceeds maximum {max}"),
                    });
                }
            }
            if let Some(min) = property.min_length {
                if length < min {
                    failures.push(ValidationFailure {
                        property: property.property.clone(),
                        message: format!("length {length} is below minimum {min}"),
                    });
                }
            }
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Validation {
            entity: mapping.entity_name.clone(),
            errors: failures,
        })
    }
}
