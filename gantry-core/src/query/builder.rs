use crate::{
    DbContext, Driver, EngineError, Entity, EntityMapping, OrderKey, Params, Predicate, Result,
    SplitBehavior, SqlCommand, SqlGenerator, TranslateOptions, Value,
    query::{QueryState, QueryStateError, single, split},
    translate_order, translate_predicate,
};
use std::marker::PhantomData;
use std::sync::Arc;

/// The typed gateway for one entity type: fluent queries plus the write
/// operations (the latter live in the mutation executor impl).
pub struct EntitySet<'c, E: Entity, D: Driver> {
    pub(crate) context: &'c DbContext<D>,
    pub(crate) mapping: Arc<EntityMapping>,
    pub(crate) generator: Arc<SqlGenerator>,
    _entity: PhantomData<fn() -> E>,
}

impl<'c, E: Entity, D: Driver> EntitySet<'c, E, D> {
    pub(crate) fn new(context: &'c DbContext<D>) -> Result<Self> {
        Ok(Self {
            context,
            mapping: context.registry().mapping::<E>()?,
            generator: context.registry().generator::<E>()?,
            _entity: PhantomData,
        })
    }

    pub fn mapping(&self) -> &EntityMapping {
        &self.mapping
    }

    pub fn generator(&self) -> &SqlGenerator {
        &self.generator
    }

    /// Start composing a query.
    pub fn query(&self) -> QueryBuilder<'_, 'c, E, D> {
        QueryBuilder {
            set: self,
            state: QueryState::new(self.context.options().identity_resolution),
        }
    }

    /// Fetch one entity by its (single-column) key.
    pub async fn find(&self, key: impl Into<Value>) -> Result<Option<E>> {
        let key_properties: Vec<_> = self.mapping.effective_key_properties().collect();
        let [key_property] = key_properties.as_slice() else {
            return Err(EngineError::configuration(
                &self.mapping.entity_name,
                "find takes a scalar key only for single-column keys; use find_composite",
            ));
        };
        let mut params = Params::new();
        params.push(key_property.property.clone(), key.into());
        self.find_with(params).await
    }

    /// Fetch one entity by a composite key given as property/value pairs.
    pub async fn find_composite(&self, key: &[(&str, Value)]) -> Result<Option<E>> {
        self.find_with(self.composite_key_params(key)?).await
    }

    async fn find_with(&self, params: Params) -> Result<Option<E>> {
        let sql = self.generator.select_by_id.as_ref().ok_or_else(|| {
            EngineError::configuration(&self.mapping.entity_name, "entity has no key to find by")
        })?;
        let command = self.context.command(sql.clone()).with_params(params);
        let rows = self
            .context
            .run_read(&self.mapping.entity_name, &command)
            .await?;
        rows.first().map(E::from_row).transpose()
    }

    /// Build the effective-key parameter map from property/value pairs,
    /// failing on missing or surplus components.
    pub(crate) fn composite_key_params(&self, key: &[(&str, Value)]) -> Result<Params> {
        let mut params = Params::new();
        for mapped in self.mapping.effective_key_properties() {
            let Some((_, value)) = key.iter().find(|(name, _)| *name == mapped.property) else {
                return Err(EngineError::configuration(
                    &self.mapping.entity_name,
                    format!("key component `{}` is missing", mapped.property),
                ));
            };
            params.push(mapped.property.clone(), value.clone());
        }
        for (name, _) in key {
            if !self
                .mapping
                .effective_key_properties()
                .any(|p| p.property == *name)
            {
                return Err(EngineError::configuration(
                    &self.mapping.entity_name,
                    format!("`{name}` is not a key property"),
                ));
            }
        }
        Ok(params)
    }

    pub(crate) fn entity_name(&self) -> &str {
        &self.mapping.entity_name
    }
}

/// Fluent, accumulate-only query surface. Every composing method returns the
/// builder; the async terminals execute it.
pub struct QueryBuilder<'s, 'c, E: Entity, D: Driver> {
    set: &'s EntitySet<'c, E, D>,
    state: QueryState,
}

impl<E: Entity, D: Driver> QueryBuilder<'_, '_, E, D> {
    /// Add a predicate; multiple calls combine with AND.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.state.predicate = Some(match self.state.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Compare strings case-insensitively in this query's predicate.
    pub fn ignore_case(mut self) -> Self {
        self.state.ignore_case = true;
        self
    }

    /// Order by a property, replacing any previous ordering.
    pub fn order_by(mut self, property: impl Into<String>) -> Self {
        self.state.order = vec![OrderKey {
            property: property.into(),
            descending: false,
        }];
        self
    }

    pub fn order_by_desc(mut self, property: impl Into<String>) -> Self {
        self.state.order = vec![OrderKey {
            property: property.into(),
            descending: true,
        }];
        self
    }

    /// Add a subsequent ordering key. Requires a preceding `order_by`.
    pub fn then_by(mut self, property: impl Into<String>) -> Self {
        self.push_then_by(property.into(), false);
        self
    }

    pub fn then_by_desc(mut self, property: impl Into<String>) -> Self {
        self.push_then_by(property.into(), true);
        self
    }

    fn push_then_by(&mut self, property: String, descending: bool) {
        if self.state.order.is_empty() {
            self.state
                .error
                .get_or_insert(QueryStateError::ThenByWithoutOrderBy);
            return;
        }
        self.state.order.push(OrderKey {
            property,
            descending,
        });
    }

    pub fn skip(mut self, count: u64) -> Self {
        self.state.skip = Some(count);
        self
    }

    /// Keep at most `count` rows; `count` must be at least 1.
    pub fn take(mut self, count: u64) -> Self {
        if count == 0 {
            self.state
                .error
                .get_or_insert(QueryStateError::TakeOutOfRange);
            return self;
        }
        self.state.take = Some(count);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.state.distinct = true;
        self
    }

    /// Eagerly load a navigation of the root entity.
    pub fn include(mut self, navigation: impl Into<String>) -> Self {
        self.state.includes.include(navigation);
        self
    }

    /// Eagerly load a navigation under the most recently included one.
    pub fn then_include(mut self, navigation: impl Into<String>) -> Self {
        if !self.state.includes.then_include(navigation) {
            self.state
                .error
                .get_or_insert(QueryStateError::ThenIncludeWithoutInclude);
        }
        self
    }

    /// Resolve each include with a follow-up IN-batched query.
    pub fn as_split_query(mut self) -> Self {
        self.state.split = SplitBehavior::Split;
        self
    }

    /// Resolve all includes in one joined query (the default).
    pub fn as_single_query(mut self) -> Self {
        self.state.split = SplitBehavior::Single;
        self
    }

    /// Disable the identity cache for this execution only.
    pub fn no_identity_resolution(mut self) -> Self {
        self.state.identity_resolution = false;
        self
    }

    fn translate_options(&self) -> TranslateOptions {
        TranslateOptions {
            ignore_case: self.state.ignore_case,
            empty_string_as_null: self.set.context.options().empty_string_as_null,
        }
    }

    /// The ORDER BY keys in effect: the declared ones, or the deterministic
    /// default (first effective-key property) when paging without ordering.
    fn effective_order(&self) -> Result<Vec<OrderKey>> {
        if !self.state.order.is_empty() {
            return Ok(self.state.order.clone());
        }
        if !self.state.uses_paging() {
            return Ok(Vec::new());
        }
        match self.set.mapping.effective_key_properties().next() {
            Some(p) => Ok(vec![OrderKey {
                property: p.property.clone(),
                descending: false,
            }]),
            None => Err(EngineError::configuration(
                self.set.entity_name(),
                "paging requires an ordering, and the entity has no key to order by",
            )),
        }
    }

    fn check_state(&self) -> Result<()> {
        match self.state.error {
            Some(error) => Err(error.into_error(self.set.entity_name())),
            None => Ok(()),
        }
    }

    /// Compose WHERE / ORDER BY / paging onto a statement that selects from
    /// the root table under alias `a`.
    pub(crate) fn append_clauses(&self, sql: &mut String, params: &mut Params) -> Result<()> {
        let mapping = &self.set.mapping;
        let dialect = self.set.context.dialect();
        if let Some(predicate) = &self.state.predicate {
            let translation = translate_predicate(
                predicate,
                mapping,
                dialect,
                self.translate_options(),
                self.set.context.translation_cache(),
            )?;
            sql.push_str(" WHERE ");
            sql.push_str(&translation.fragment);
            params.extend(translation.params);
        }
        let order = self.effective_order()?;
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&translate_order(&order, mapping, dialect)?);
        }
        if self.state.uses_paging() {
            let mut paging = String::new();
            dialect.write_paging(&mut paging, self.state.skip.unwrap_or(0), self.state.take);
            if !paging.is_empty() {
                sql.push(' ');
                sql.push_str(&paging);
            }
        }
        Ok(())
    }

    fn build_select(&self) -> Result<SqlCommand> {
        self.check_state()?;
        let mut sql = if self.state.distinct {
            self.set.generator.select_all_distinct.clone()
        } else {
            self.set.generator.select_all.clone()
        };
        let mut params = Params::new();
        self.append_clauses(&mut sql, &mut params)?;
        Ok(self.set.context.command(sql).with_params(params))
    }

    fn build_count(&self) -> Result<SqlCommand> {
        self.check_state()?;
        let mut sql = self.set.generator.count_all.clone();
        let mut params = Params::new();
        if let Some(predicate) = &self.state.predicate {
            let translation = translate_predicate(
                predicate,
                &self.set.mapping,
                self.set.context.dialect(),
                self.translate_options(),
                self.set.context.translation_cache(),
            )?;
            sql.push_str(" WHERE ");
            sql.push_str(&translation.fragment);
            params.extend(translation.params);
        }
        Ok(self.set.context.command(sql).with_params(params))
    }

    pub(crate) fn set(&self) -> &EntitySet<'_, E, D> {
        self.set
    }

    pub(crate) fn state(&self) -> &QueryState {
        &self.state
    }

    /// All rows matching the current state, include tree resolved.
    pub async fn to_list(self) -> Result<Vec<E>> {
        self.check_state()?;
        if self.state.includes.is_empty() {
            return self.fetch_plain().await;
        }
        match self.state.split {
            SplitBehavior::Single => single::load_single_query(&self).await,
            SplitBehavior::Split => {
                let roots = self.fetch_plain().await?;
                split::load_split(&self, &roots).await?;
                Ok(roots)
            }
        }
    }

    async fn fetch_plain(&self) -> Result<Vec<E>> {
        let command = self.build_select()?;
        let rows = self
            .set
            .context
            .run_read(self.set.entity_name(), &command)
            .await?;
        rows.iter().map(E::from_row).collect()
    }

    /// Top row of the current ordering; error when there is none.
    pub async fn first(self) -> Result<E> {
        let entity = self.set.entity_name().to_string();
        self.first_or_none()
            .await?
            .ok_or_else(|| EngineError::operation(entity, "the query returned no rows"))
    }

    pub async fn first_or_none(mut self) -> Result<Option<E>> {
        self.state.take = Some(1);
        Ok(self.to_list().await?.into_iter().next())
    }

    /// Exactly one row; zero or several is an error.
    pub async fn single(self) -> Result<E> {
        let entity = self.set.entity_name().to_string();
        self.single_or_none()
            .await?
            .ok_or_else(|| EngineError::operation(entity, "the query returned no rows"))
    }

    pub async fn single_or_none(mut self) -> Result<Option<E>> {
        let entity = self.set.entity_name().to_string();
        self.state.take = Some(2);
        let mut rows = self.to_list().await?;
        if rows.len() > 1 {
            return Err(EngineError::operation(
                entity,
                "the query returned more than one row",
            ));
        }
        Ok(rows.pop())
    }

    /// Last row of the current ordering. Requires an explicit `order_by`.
    pub async fn last(self) -> Result<E> {
        let entity = self.set.entity_name().to_string();
        self.last_or_none()
            .await?
            .ok_or_else(|| EngineError::operation(entity, "the query returned no rows"))
    }

    pub async fn last_or_none(mut self) -> Result<Option<E>> {
        if self.state.order.is_empty() {
            return Err(EngineError::operation(
                self.set.entity_name(),
                "last requires an explicit ordering",
            ));
        }
        for key in &mut self.state.order {
            key.descending = !key.descending;
        }
        self.state.take = Some(1);
        Ok(self.to_list().await?.into_iter().next())
    }

    pub async fn any(self) -> Result<bool> {
        Ok(self.count().await? > 0)
    }

    /// `SELECT COUNT(*)` with the predicate, without ordering or paging.
    pub async fn count(self) -> Result<u64> {
        let command = self.build_count()?;
        let rows = self
            .set
            .context
            .run_read(self.set.entity_name(), &command)
            .await?;
        scalar_count(self.set.entity_name(), &rows)
    }
}

pub(crate) fn scalar_count(entity: &str, rows: &[crate::RowLabeled]) -> Result<u64> {
    let value = rows
        .first()
        .and_then(|r| r.values().first())
        .ok_or_else(|| EngineError::operation(entity, "COUNT returned no rows"))?;
    match value {
        Value::Int64(Some(v)) => Ok(*v as u64),
        Value::Int32(Some(v)) => Ok(*v as u64),
        Value::UInt64(Some(v)) => Ok(*v),
        Value::UInt32(Some(v)) => Ok(*v as u64),
        v => Err(EngineError::operation(
            entity,
            format!("COUNT returned a non-integer value: {v:?}"),
        )),
    }
}
