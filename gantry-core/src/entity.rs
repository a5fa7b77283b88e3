use crate::{AsValue, EngineError, EntityDescriptor, Result, RowLabeled, Value};

/// A type mapped to a table. Implemented by `#[derive(Entity)]`; the derive
/// also registers property metadata and navigation thunks on the descriptor.
pub trait Entity: Send + Sync + Sized + 'static {
    fn descriptor() -> &'static EntityDescriptor;

    /// Materialize from a row whose labels are property names.
    fn from_row(row: &RowLabeled) -> Result<Self>;

    /// Current value of a mapped scalar property, `None` for unknown names.
    fn value_of(&self, property: &str) -> Option<Value>;

    /// Write a value onto a mapped scalar property, converting as needed.
    fn set_value(&mut self, property: &str, value: Value) -> Result<()>;
}

// Support functions the derive expands calls to.

pub fn from_row_get<T: AsValue>(entity: &str, row: &RowLabeled, property: &str) -> Result<T> {
    row.try_get(property).map_err(|e| {
        EngineError::operation(entity, format!("cannot materialize `{property}`: {e}"))
    })
}

pub fn assign_property<T: AsValue>(
    entity: &str,
    property: &str,
    slot: &mut T,
    value: Value,
) -> Result<()> {
    *slot = T::try_from_value(value).map_err(|e| EngineError::KeyAssignment {
        entity: entity.into(),
        property: property.into(),
        message: e.to_string(),
    })?;
    Ok(())
}

pub fn unknown_property(entity: &str, property: &str) -> EngineError {
    EngineError::KeyAssignment {
        entity: entity.into(),
        property: property.into(),
        message: "no such mapped property".into(),
    }
}
