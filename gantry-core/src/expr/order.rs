use crate::{
    Dialect, EngineError, EntityMapping, Result, sql_generator::ROOT_ALIAS, util::separated_by,
};

/// One ORDER BY key: a mapped property and its direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
    pub property: String,
    pub descending: bool,
}

/// Render `(key, direction)` pairs into an ORDER BY list over the root
/// alias, in declared order.
pub fn translate_order(
    keys: &[OrderKey],
    mapping: &EntityMapping,
    dialect: &dyn Dialect,
) -> Result<String> {
    let mut out = String::new();
    let mut error = None;
    separated_by(
        &mut out,
        keys,
        |out, key| {
            let Some(mapped) = mapping.property(&key.property) else {
                error.get_or_insert_with(|| {
                    EngineError::configuration(
                        &mapping.entity_name,
                        format!("order key references unmapped property `{}`", key.property),
                    )
                });
                return;
            };
            out.push_str(ROOT_ALIAS);
            out.push('.');
            dialect.write_identifier(out, &mapped.column);
            if key.descending {
                out.push_str(" DESC");
            }
        },
        ", ",
    );
    match error {
        Some(error) => Err(error),
        None => Ok(out),
    }
}
