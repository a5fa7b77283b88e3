use crate::{
    ArcRecord, DbContext, Driver, EngineError, Entity, EntityMapping, IdentityCache, KeyValue,
    Predicate, Result, RowLabeled, SqlGenerator, TranslateOptions, Value,
    query::{IncludeNode, builder::QueryBuilder},
    translate_predicate,
};
use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Resolve the include tree with one IN-batched follow-up query per node,
/// assigning navigations into `roots` (and recursively into the loaded
/// entities) through their once-settable cells.
pub(crate) async fn load_split<E: Entity, D: Driver>(
    builder: &QueryBuilder<'_, '_, E, D>,
    roots: &[E],
) -> Result<()> {
    let set = builder.set();
    let state = builder.state();
    if roots.is_empty() || state.includes.is_empty() {
        return Ok(());
    }
    let mut cache = state.identity_resolution.then(IdentityCache::default);

    enum ParentSet {
        Root,
        Loaded(Vec<ArcRecord>),
    }

    struct Work {
        mapping: Arc<EntityMapping>,
        nodes: Vec<IncludeNode>,
        parents: ParentSet,
    }

    let mut queue = VecDeque::new();
    queue.push_back(Work {
        mapping: set.mapping.clone(),
        nodes: state.includes.roots.clone(),
        parents: ParentSet::Root,
    });

    while let Some(work) = queue.pop_front() {
        let parent_any: Vec<&dyn Any> = match &work.parents {
            ParentSet::Root => roots.iter().map(|e| e as &dyn Any).collect(),
            ParentSet::Loaded(items) => items
                .iter()
                .map(|a| -> &dyn Any { a.as_ref() })
                .collect(),
        };
        for node in &work.nodes {
            let loaded = load_node(
                set.context,
                &work.mapping,
                node,
                &parent_any,
                &mut cache,
            )
            .await?;
            if node.children.is_empty() || loaded.instances.is_empty() {
                continue;
            }
            queue.push_back(Work {
                mapping: loaded.mapping,
                nodes: node.children.clone(),
                parents: ParentSet::Loaded(loaded.instances),
            });
        }
    }
    Ok(())
}

struct LoadedLevel {
    mapping: Arc<EntityMapping>,
    instances: Vec<ArcRecord>,
}

/// Load one include node for the given parents and assign the navigation on
/// every parent (childless parents come out loaded-empty).
async fn load_node<D: Driver>(
    context: &DbContext<D>,
    mapping: &EntityMapping,
    node: &IncludeNode,
    parents: &[&dyn Any],
    cache: &mut Option<IdentityCache>,
) -> Result<LoadedLevel> {
    let entity = &mapping.entity_name;
    let Some(fk) = mapping.foreign_key(&node.navigation) else {
        return Err(EngineError::configuration(
            entity,
            format!("include references unknown navigation `{}`", node.navigation),
        ));
    };
    let nav = mapping
        .descriptor
        .navigation(&node.navigation)
        .expect("relationship resolution validated the navigation");
    let related = context.registry().mapping_of(fk.related)?;
    let generator = context.registry().generator_of(fk.related)?;

    let single_key_property = |of: &EntityMapping| -> Result<String> {
        let mut keys = of.effective_key_properties();
        match (keys.next(), keys.next()) {
            (Some(key), None) => Ok(key.property.clone()),
            _ => Err(EngineError::configuration(
                entity,
                format!(
                    "navigation `{}` requires a single-column key on `{}`",
                    node.navigation, of.entity_name
                ),
            )),
        }
    };

    let value_of = mapping.descriptor.value_of;
    let mut instances = Vec::new();

    if fk.is_collection {
        // Children point back through the inverse foreign key.
        let parent_key = single_key_property(mapping)?;
        let values = distinct_values(parents.iter().map(|p| value_of(*p, &parent_key)));
        let rows = query_in(context, &related, &generator, &fk.foreign_key, &values).await?;

        let mut grouped: HashMap<Value, Vec<ArcRecord>> = HashMap::new();
        for row in &rows {
            let Some(group_key) = row.get(&fk.foreign_key).cloned() else {
                continue;
            };
            let instance = resolve_instance(&related, row, cache)?;
            instances.push(instance.clone());
            grouped.entry(group_key).or_default().push(instance);
        }
        for parent in parents {
            let items = value_of(*parent, &parent_key)
                .filter(|v| !v.is_null())
                .and_then(|v| grouped.get(&v).cloned())
                .unwrap_or_default();
            (nav.assign)(*parent, items);
        }
    } else {
        // Parents hold the foreign key; fetch the principals by key.
        let related_key = single_key_property(&related)?;
        let values = distinct_values(parents.iter().map(|p| value_of(*p, &fk.foreign_key)));
        let rows = query_in(context, &related, &generator, &related_key, &values).await?;

        let mut index: HashMap<Value, ArcRecord> = HashMap::new();
        for row in &rows {
            let Some(key) = row.get(&related_key).cloned() else {
                continue;
            };
            let instance = resolve_instance(&related, row, cache)?;
            if !index.contains_key(&key) {
                instances.push(instance.clone());
                index.insert(key, instance);
            }
        }
        for parent in parents {
            let items = value_of(*parent, &fk.foreign_key)
                .filter(|v| !v.is_null())
                .and_then(|v| index.get(&v).cloned())
                .map(|i| vec![i])
                .unwrap_or_default();
            (nav.assign)(*parent, items);
        }
    }

    Ok(LoadedLevel {
        mapping: related,
        instances,
    })
}

/// Non-null foreign-key / key values of the parents, deduplicated in
/// first-seen order.
fn distinct_values(values: impl Iterator<Item = Option<Value>>) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for value in values.flatten() {
        if !value.is_null() && seen.insert(value.clone()) {
            out.push(value);
        }
    }
    out
}

/// Fetch related rows with `property IN (values)`, chunked at the dialect's
/// IN-list cap; chunks concatenate in query order.
async fn query_in<D: Driver>(
    context: &DbContext<D>,
    mapping: &EntityMapping,
    generator: &SqlGenerator,
    property: &str,
    values: &[Value],
) -> Result<Vec<RowLabeled>> {
    let mut rows = Vec::new();
    if values.is_empty() {
        return Ok(rows);
    }
    let cap = context.dialect().max_in_list().max(1);
    for chunk in values.chunks(cap) {
        let list = Value::List(Some(chunk.to_vec()), Box::new(chunk[0].as_null()));
        let predicate = Predicate::in_list(property, list);
        let translation = translate_predicate(
            &predicate,
            mapping,
            context.dialect(),
            TranslateOptions::default(),
            context.translation_cache(),
        )?;
        let sql = format!("{} WHERE {}", generator.select_all, translation.fragment);
        let command = context.command(sql).with_params(translation.params);
        rows.extend(context.run_read(&mapping.entity_name, &command).await?);
    }
    Ok(rows)
}

/// Materialize a related row, going through the identity cache when it is
/// enabled and the entity has a key.
fn resolve_instance(
    mapping: &EntityMapping,
    row: &RowLabeled,
    cache: &mut Option<IdentityCache>,
) -> Result<ArcRecord> {
    let materialize = mapping.descriptor.materialize;
    match cache.as_mut() {
        Some(cache) if !mapping.effective_key().is_empty() => {
            let key = KeyValue(
                mapping
                    .effective_key_properties()
                    .map(|p| row.get(&p.property).cloned().unwrap_or(Value::Null))
                    .collect(),
            );
            if key.is_null() {
                return materialize(row);
            }
            Ok(cache.resolve(mapping.type_id, key, || materialize(row))?.0)
        }
        _ => materialize(row),
    }
}
