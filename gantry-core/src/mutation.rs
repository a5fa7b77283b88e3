use crate::{
    AsValue, Driver, EngineError, Entity, EntitySet, MutationKind, Params, Result,
    TransactionScope, Value, query::scalar_count, sql_generator::qualified_table,
    util::separated_by, validate_entity,
};

/// Contract of an explicit-WHERE mutation. By default exactly one row must
/// be affected; `expected_rows` upgrades to a count-first pre-validation
/// inside a transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct MassMutation {
    pub allow_multiple: bool,
    pub expected_rows: Option<u64>,
}

impl MassMutation {
    pub fn allow_multiple() -> Self {
        Self {
            allow_multiple: true,
            expected_rows: None,
        }
    }

    pub fn expect_rows(expected: u64) -> Self {
        Self {
            allow_multiple: true,
            expected_rows: Some(expected),
        }
    }
}

type Txn<'t, D> = Option<&'t mut TransactionScope<<D as Driver>::Connection>>;

impl<E: Entity, D: Driver> EntitySet<'_, E, D> {
    fn read_only_guard(&self, operation: &'static str) -> Result<()> {
        if self.mapping.read_only {
            return Err(EngineError::ReadOnly {
                entity: self.mapping.entity_name.clone(),
                operation,
            });
        }
        Ok(())
    }

    /// Parameters for the entity's properties selected by `filter`, named by
    /// property name.
    fn entity_params(&self, entity: &E, filter: impl Fn(&crate::PropertyMapping) -> bool) -> Params {
        let mut params = Params::new();
        for property in self.mapping.properties.iter().filter(|p| filter(p)) {
            params.push(
                property.property.clone(),
                entity
                    .value_of(&property.property)
                    .unwrap_or_else(|| property.prototype.as_null()),
            );
        }
        params
    }

    /// Whether the property at `index` participates in an UPDATE SET list:
    /// settable and not part of the effective key.
    fn in_set_list(&self, index: usize) -> bool {
        self.mapping.properties[index].is_settable() && !self.mapping.effective_key().contains(&index)
    }

    fn set_list_params(&self, entity: &E) -> Params {
        let mut params = Params::new();
        for (index, property) in self.mapping.properties.iter().enumerate() {
            if !self.in_set_list(index) {
                continue;
            }
            params.push(
                property.property.clone(),
                entity
                    .value_of(&property.property)
                    .unwrap_or_else(|| property.prototype.as_null()),
            );
        }
        params
    }

    fn key_params_from(&self, entity: &E) -> Params {
        let mut params = Params::new();
        for property in self.mapping.effective_key_properties() {
            params.push(
                property.property.clone(),
                entity
                    .value_of(&property.property)
                    .unwrap_or_else(|| property.prototype.as_null()),
            );
        }
        params
    }

    /// Insert the entity. Returns the affected row count.
    pub async fn insert(&self, entity: &E, txn: Txn<'_, D>) -> Result<u64> {
        validate_entity(&self.mapping, entity, MutationKind::Insert)?;
        let sql = self.generator.insert.as_ref().ok_or_else(|| {
            EngineError::configuration(self.entity_name(), "entity has no insertable columns")
        })?;
        let params = self.entity_params(entity, |p| {
            p.is_insertable() && p.generated.sequence().is_none()
        });
        let command = self.context.command(sql.clone()).with_params(params);
        let result = self
            .context
            .run_execute(self.entity_name(), &command, txn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Insert the entity and hand back its key. Database-generated keys are
    /// read back from the driver and written onto the entity; a key the
    /// database does not generate is simply returned as it is.
    pub async fn insert_returning_id<K: AsValue>(
        &self,
        entity: &mut E,
        txn: Txn<'_, D>,
    ) -> Result<K> {
        validate_entity(&self.mapping, entity, MutationKind::Insert)?;
        let key_properties: Vec<_> = self
            .mapping
            .effective_key_properties()
            .cloned()
            .collect();
        let Some(first_key) = key_properties.first() else {
            return Err(EngineError::configuration(
                self.entity_name(),
                "entity has no key to return",
            ));
        };

        if !self.generator.is_key_generated {
            self.insert(entity, txn).await?;
            let value = entity
                .value_of(&first_key.property)
                .unwrap_or(Value::Null);
            return K::try_from_value(value).map_err(|e| EngineError::KeyAssignment {
                entity: self.entity_name().into(),
                property: first_key.property.clone(),
                message: e.to_string(),
            });
        }

        let sql = self.generator.insert_returning_id.as_ref().ok_or_else(|| {
            EngineError::configuration(
                self.entity_name(),
                format!(
                    "the {} dialect cannot return generated keys",
                    self.context.dialect().name()
                ),
            )
        })?;
        let params = self.entity_params(entity, |p| {
            p.is_insertable() && p.generated.sequence().is_none()
        });
        let dialect = self.context.dialect();

        if dialect.returning_uses_output_parameters() {
            let mut command = self.context.command(sql.clone()).with_params(params);
            for property in &key_properties {
                let db_type = dialect.map_db_type(&property.prototype).ok_or_else(|| {
                    EngineError::configuration(
                        self.entity_name(),
                        format!(
                            "cannot map key property `{}` to a driver type",
                            property.property
                        ),
                    )
                })?;
                command.out_params.push((property.column.clone(), db_type));
            }
            let result = self
                .context
                .run_execute(self.entity_name(), &command, txn)
                .await?;
            let mut first_value = Value::Null;
            for (i, property) in key_properties.iter().enumerate() {
                let value = result
                    .output
                    .get(&property.column)
                    .cloned()
                    .unwrap_or(Value::Null);
                if value.is_null() {
                    return Err(EngineError::operation(
                        self.entity_name(),
                        format!("no generated value returned for key `{}`", property.property),
                    ));
                }
                entity.set_value(&property.property, value.clone())?;
                if i == 0 {
                    first_value = value;
                }
            }
            return K::try_from_value(first_value).map_err(|e| EngineError::KeyAssignment {
                entity: self.entity_name().into(),
                property: first_key.property.clone(),
                message: e.to_string(),
            });
        }

        // Scalar-returning shape: the statement pair yields one row holding
        // the generated key.
        let command = self.context.command(sql.clone()).with_params(params);
        let rows = self
            .context
            .run_query_once(self.entity_name(), &command, txn)
            .await?;
        let value = rows
            .first()
            .and_then(|r| r.values().first())
            .cloned()
            .unwrap_or(Value::Null);
        if value.is_null() {
            return Err(EngineError::operation(
                self.entity_name(),
                "insert returned no generated key",
            ));
        }
        entity.set_value(&first_key.property, value.clone())?;
        K::try_from_value(value).map_err(|e| EngineError::KeyAssignment {
            entity: self.entity_name().into(),
            property: first_key.property.clone(),
            message: e.to_string(),
        })
    }

    /// Update the entity by its key. Zero affected rows is a concurrency
    /// failure.
    pub async fn update(&self, entity: &E, txn: Txn<'_, D>) -> Result<()> {
        validate_entity(&self.mapping, entity, MutationKind::Update)?;
        let sql = self.generator.update.as_ref().ok_or_else(|| {
            EngineError::configuration(self.entity_name(), "entity has no updatable columns")
        })?;
        let mut params = self.set_list_params(entity);
        params.extend(self.key_params_from(entity));
        let command = self.context.command(sql.clone()).with_params(params);
        let result = self
            .context
            .run_execute(self.entity_name(), &command, txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(EngineError::Concurrency {
                entity: self.entity_name().into(),
                operation: "update",
            });
        }
        Ok(())
    }

    /// Delete the entity by its key. Zero affected rows is a concurrency
    /// failure.
    pub async fn delete(&self, entity: &E, txn: Txn<'_, D>) -> Result<()> {
        self.read_only_guard("delete")?;
        self.delete_with(self.key_params_from(entity), txn).await
    }

    /// Delete by a scalar key.
    pub async fn delete_by_id(&self, key: impl Into<Value>, txn: Txn<'_, D>) -> Result<()> {
        self.read_only_guard("delete")?;
        let key_properties: Vec<_> = self.mapping.effective_key_properties().collect();
        let [key_property] = key_properties.as_slice() else {
            return Err(EngineError::configuration(
                self.entity_name(),
                "delete_by_id takes a scalar key only for single-column keys; use delete_by_composite_id",
            ));
        };
        let mut params = Params::new();
        params.push(key_property.property.clone(), key.into());
        self.delete_with(params, txn).await
    }

    /// Delete by a composite key given as property/value pairs. Missing key
    /// components are a configuration error.
    pub async fn delete_by_composite_id(
        &self,
        key: &[(&str, Value)],
        txn: Txn<'_, D>,
    ) -> Result<()> {
        self.read_only_guard("delete")?;
        let params = self.composite_key_params(key)?;
        self.delete_with(params, txn).await
    }

    async fn delete_with(&self, params: Params, txn: Txn<'_, D>) -> Result<()> {
        let sql = self.generator.delete_by_id.as_ref().ok_or_else(|| {
            EngineError::configuration(self.entity_name(), "entity has no key to delete by")
        })?;
        let command = self.context.command(sql.clone()).with_params(params);
        let result = self
            .context
            .run_execute(self.entity_name(), &command, txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(EngineError::Concurrency {
                entity: self.entity_name().into(),
                operation: "delete",
            });
        }
        Ok(())
    }

    /// Update all settable columns from `entity` on the rows matching the
    /// column/value filter.
    pub async fn update_where(
        &self,
        entity: &E,
        filter: &[(&str, Value)],
        contract: MassMutation,
        txn: Txn<'_, D>,
    ) -> Result<u64> {
        validate_entity(&self.mapping, entity, MutationKind::Update)?;
        let dialect = self.context.dialect();
        let table = qualified_table(&self.mapping, dialect);

        let mut params = self.set_list_params(entity);
        let mut sql = format!("UPDATE {table} SET ");
        separated_by(
            &mut sql,
            self.mapping
                .properties
                .iter()
                .enumerate()
                .filter(|(i, _)| self.in_set_list(*i))
                .map(|(_, p)| p),
            |out, p| {
                dialect.write_identifier(out, &p.column);
                out.push_str(" = ");
                dialect.write_parameter(out, &p.property);
            },
            ", ",
        );
        let where_clause = self.build_filter(filter, &mut params)?;
        sql.push_str(" WHERE ");
        sql.push_str(&where_clause);
        self.mass_execute(sql, params, filter, contract, txn, "update")
            .await
    }

    /// Delete the rows matching the column/value filter.
    pub async fn delete_where(
        &self,
        filter: &[(&str, Value)],
        contract: MassMutation,
        txn: Txn<'_, D>,
    ) -> Result<u64> {
        self.read_only_guard("delete")?;
        let table = qualified_table(&self.mapping, self.context.dialect());
        let mut params = Params::new();
        let where_clause = self.build_filter(filter, &mut params)?;
        let sql = format!("DELETE FROM {table} WHERE {where_clause}");
        self.mass_execute(sql, params, filter, contract, txn, "delete")
            .await
    }

    /// Render the explicit WHERE from a column/value map. Every name must
    /// resolve against the mapping; an empty map (the trivially-true WHERE)
    /// is rejected. Values only ever bind as parameters.
    fn build_filter(&self, filter: &[(&str, Value)], params: &mut Params) -> Result<String> {
        if filter.is_empty() {
            return Err(EngineError::configuration(
                self.entity_name(),
                "refusing an empty WHERE; a mass mutation must name at least one column",
            ));
        }
        let dialect = self.context.dialect();
        let mut clause = String::new();
        let mut first = true;
        for (name, value) in filter {
            let Some(property) = self.mapping.property_by_name_or_column(name) else {
                return Err(EngineError::configuration(
                    self.entity_name(),
                    format!("WHERE references unknown column `{name}`"),
                ));
            };
            if !first {
                clause.push_str(" AND ");
            }
            first = false;
            dialect.write_identifier(&mut clause, &property.column);
            if value.is_null() {
                clause.push_str(" IS NULL");
                continue;
            }
            let mut param = property.property.clone();
            while params.contains(&param) {
                param.push_str("_w");
            }
            clause.push_str(" = ");
            dialect.write_parameter(&mut clause, &param);
            params.push(param, value.clone());
        }
        Ok(clause)
    }

    async fn mass_execute(
        &self,
        sql: String,
        params: Params,
        filter: &[(&str, Value)],
        contract: MassMutation,
        txn: Txn<'_, D>,
        operation: &'static str,
    ) -> Result<u64> {
        let command = self.context.command(sql).with_params(params);

        let Some(expected) = contract.expected_rows else {
            let affected = self
                .context
                .run_execute(self.entity_name(), &command, txn)
                .await?
                .rows_affected;
            if !contract.allow_multiple {
                if affected == 0 {
                    return Err(EngineError::Concurrency {
                        entity: self.entity_name().into(),
                        operation,
                    });
                }
                if affected > 1 {
                    return Err(EngineError::operation(
                        self.entity_name(),
                        format!("{operation} affected {affected} rows, expected exactly 1"),
                    ));
                }
            }
            return Ok(affected);
        };

        // Count-first pre-validation. The count and the mutation share a
        // transaction; a mismatch aborts before the mutation runs.
        let mut count_params = Params::new();
        let count_clause = self.build_filter(filter, &mut count_params)?;
        let table = qualified_table(&self.mapping, self.context.dialect());
        let count_sql = format!("SELECT COUNT(*) FROM {table} WHERE {count_clause}");
        let count_command = self.context.command(count_sql).with_params(count_params);

        match txn {
            Some(txn) => {
                let rows = self
                    .context
                    .run_query_once(self.entity_name(), &count_command, Some(&mut *txn))
                    .await?;
                let count = scalar_count(self.entity_name(), &rows)?;
                if count != expected {
                    return Err(EngineError::operation(
                        self.entity_name(),
                        format!("{operation} matches {count} rows, expected {expected}"),
                    ));
                }
                let affected = self
                    .context
                    .run_execute(self.entity_name(), &command, Some(txn))
                    .await?
                    .rows_affected;
                if affected != expected {
                    return Err(EngineError::operation(
                        self.entity_name(),
                        format!("{operation} affected {affected} rows, expected {expected}"),
                    ));
                }
                Ok(affected)
            }
            None => {
                let mut scope = self.context.begin_transaction().await?;
                let result = async {
                    let rows = self
                        .context
                        .run_query_once(self.entity_name(), &count_command, Some(&mut scope))
                        .await?;
                    let count = scalar_count(self.entity_name(), &rows)?;
                    if count != expected {
                        return Err(EngineError::operation(
                            self.entity_name(),
                            format!("{operation} matches {count} rows, expected {expected}"),
                        ));
                    }
                    let affected = self
                        .context
                        .run_execute(self.entity_name(), &command, Some(&mut scope))
                        .await?
                        .rows_affected;
                    if affected != expected {
                        return Err(EngineError::operation(
                            self.entity_name(),
                            format!("{operation} affected {affected} rows, expected {expected}"),
                        ));
                    }
                    Ok(affected)
                }
                .await;
                match result {
                    Ok(affected) => {
                        scope.complete();
                        scope.dispose().await?;
                        Ok(affected)
                    }
                    Err(e) => {
                        // Dispose without complete: rollback.
                        let _ = scope.dispose().await;
                        Err(e)
                    }
                }
            }
        }
    }
}
