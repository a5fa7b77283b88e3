use crate::{Dialect, EngineError, EntityMapping, Result, util::separated_by};

/// Alias of the root table in every generated SELECT.
pub const ROOT_ALIAS: &str = "a";

/// Write the projection list for `mapping` under `table_alias`. Column
/// aliases are property names so rows materialize by property name; a
/// `label_prefix` turns them into `prefix__Property` for joined queries.
pub(crate) fn write_select_columns(
    out: &mut String,
    mapping: &EntityMapping,
    dialect: &dyn Dialect,
    table_alias: &str,
    label_prefix: Option<&str>,
) {
    separated_by(
        out,
        &mapping.properties,
        |out, p| {
            out.push_str(table_alias);
            out.push('.');
            dialect.write_identifier(out, &p.column);
            out.push_str(" AS ");
            match label_prefix {
                Some(prefix) => {
                    dialect.write_identifier(out, &format!("{prefix}__{}", p.property))
                }
                None => dialect.write_identifier(out, &p.property),
            }
        },
        ", ",
    );
}

/// Quoted table name, qualified with the mapping's schema or the dialect's
/// default schema when one applies.
pub(crate) fn qualified_table(mapping: &EntityMapping, dialect: &dyn Dialect) -> String {
    let mut table = String::new();
    let schema = mapping
        .schema
        .as_deref()
        .or_else(|| dialect.default_schema());
    if let Some(schema) = schema {
        dialect.write_identifier(&mut table, schema);
        table.push('.');
    }
    dialect.write_identifier(&mut table, &mapping.table);
    table
}

/// Write `alias.[col] = @prop AND ...` over the effective key. Omitting the
/// alias yields the bare-column form used by UPDATE/DELETE.
pub(crate) fn write_key_predicate(
    out: &mut String,
    mapping: &EntityMapping,
    dialect: &dyn Dialect,
    alias: Option<&str>,
) {
    separated_by(
        out,
        mapping.effective_key_properties(),
        |out, p| {
            if let Some(alias) = alias {
                out.push_str(alias);
                out.push('.');
            }
            dialect.write_identifier(out, &p.column);
            out.push_str(" = ");
            dialect.write_parameter(out, &p.property);
        },
        " AND ",
    );
}

/// The statements a mapping can need, rendered once per mapping and reused
/// for every operation on the entity set.
#[derive(Debug)]
pub struct SqlGenerator {
    pub entity: String,
    /// Quoted, schema-qualified table name.
    pub table: String,
    pub select_all: String,
    pub select_all_distinct: String,
    pub count_all: String,
    pub select_by_id: Option<String>,
    pub insert: Option<String>,
    /// Insert handing back generated keys; `None` when the key is not
    /// generated or the dialect has no returning shape.
    pub insert_returning_id: Option<String>,
    /// `None` when no column remains to SET.
    pub update: Option<String>,
    pub delete_by_id: Option<String>,
    pub is_key_generated: bool,
}

impl SqlGenerator {
    pub fn new(mapping: &EntityMapping, dialect: &dyn Dialect) -> Result<Self> {
        if mapping.properties.is_empty() {
            return Err(EngineError::configuration(
                &mapping.entity_name,
                "entity has no mapped properties",
            ));
        }

        let table = qualified_table(mapping, dialect);

        let mut from = String::new();
        from.push_str(" FROM ");
        from.push_str(&table);
        from.push(' ');
        dialect.write_table_alias(&mut from, ROOT_ALIAS);

        let mut columns = String::new();
        write_select_columns(&mut columns, mapping, dialect, ROOT_ALIAS, None);

        let select_all = format!("SELECT {columns}{from}");
        let select_all_distinct = format!("SELECT DISTINCT {columns}{from}");
        let count_all = format!("SELECT COUNT(*){from}");

        let has_key = !mapping.effective_key().is_empty();
        let select_by_id = has_key.then(|| {
            let mut sql = select_all.clone();
            sql.push_str(" WHERE ");
            write_key_predicate(&mut sql, mapping, dialect, Some(ROOT_ALIAS));
            sql
        });

        let insertable: Vec<_> = mapping
            .properties
            .iter()
            .filter(|p| p.is_insertable())
            .collect();
        let insert = (!mapping.read_only && !insertable.is_empty()).then(|| {
            let mut sql = String::with_capacity(64 + insertable.len() * 24);
            sql.push_str("INSERT INTO ");
            sql.push_str(&table);
            sql.push_str(" (");
            separated_by(
                &mut sql,
                &insertable,
                |out, p| dialect.write_identifier(out, &p.column),
                ",",
            );
            sql.push_str(") VALUES (");
            separated_by(
                &mut sql,
                &insertable,
                |out, p| match p.generated.sequence() {
                    Some(sequence) => dialect.write_sequence_next_value(out, sequence),
                    None => dialect.write_parameter(out, &p.property),
                },
                ",",
            );
            sql.push(')');
            sql
        });

        let is_key_generated = mapping.is_key_generated();
        let insert_returning_id = match (&insert, is_key_generated) {
            (Some(insert), true) => {
                let key_columns: Vec<&str> = mapping
                    .effective_key_properties()
                    .map(|p| p.column.as_str())
                    .collect();
                dialect.insert_returning_id(insert, &mapping.table, &key_columns)
            }
            _ => None,
        };

        let settable: Vec<_> = mapping
            .properties
            .iter()
            .enumerate()
            .filter(|(i, p)| p.is_settable() && !mapping.effective_key().contains(i))
            .map(|(_, p)| p)
            .collect();
        let update = (!mapping.read_only && has_key && !settable.is_empty()).then(|| {
            let mut sql = String::with_capacity(64 + settable.len() * 24);
            sql.push_str("UPDATE ");
            sql.push_str(&table);
            sql.push_str(" SET ");
            separated_by(
                &mut sql,
                &settable,
                |out, p| {
                    dialect.write_identifier(out, &p.column);
                    out.push_str(" = ");
                    dialect.write_parameter(out, &p.property);
                },
                ", ",
            );
            sql.push_str(" WHERE ");
            write_key_predicate(&mut sql, mapping, dialect, None);
            sql
        });

        let delete_by_id = (!mapping.read_only && has_key).then(|| {
            let mut sql = String::new();
            sql.push_str("DELETE FROM ");
            sql.push_str(&table);
            sql.push_str(" WHERE ");
            write_key_predicate(&mut sql, mapping, dialect, None);
            sql
        });

        Ok(Self {
            entity: mapping.entity_name.clone(),
            table,
            select_all,
            select_all_distinct,
            count_all,
            select_by_id,
            insert,
            insert_returning_id,
            update,
            delete_by_id,
            is_key_generated,
        })
    }
}
