use crate::{
    ArcRecord, Dialect, Driver, EngineError, Entity, EntityMapping, IdentityCache, KeyValue,
    Params, Result, RowLabeled,
    query::{IncludeNode, IncludeTree, builder::QueryBuilder},
    sql_generator::{ROOT_ALIAS, qualified_table, write_select_columns},
    util::separated_by,
};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One joined entity block of the single-query plan: the root, or a
/// navigation reached through `parent`.
struct Block {
    alias: String,
    parent: Option<usize>,
    navigation: Option<String>,
    mapping: Arc<EntityMapping>,
}

/// The flattened include tree: SELECT list with `alias__Property` labels,
/// LEFT JOIN chain in depth-first pre-order, and the `split_on` boundaries.
pub struct SingleQueryPlan {
    blocks: Vec<Block>,
    select_columns: String,
    from_joins: String,
    /// First-column alias of every block, in pre-order.
    pub split_on: String,
}

impl SingleQueryPlan {
    pub(crate) fn build(
        registry: &crate::ModelRegistry,
        dialect: &dyn Dialect,
        root: &Arc<EntityMapping>,
        includes: &IncludeTree,
    ) -> Result<Self> {
        if root.effective_key().is_empty() {
            return Err(EngineError::configuration(
                &root.entity_name,
                "eager loading requires a keyed root entity",
            ));
        }
        let mut blocks = vec![Block {
            alias: ROOT_ALIAS.into(),
            parent: None,
            navigation: None,
            mapping: root.clone(),
        }];
        let mut select_columns = String::new();
        write_select_columns(&mut select_columns, root, dialect, ROOT_ALIAS, Some(ROOT_ALIAS));
        let mut from_joins = format!(" FROM {} ", qualified_table(root, dialect));
        dialect.write_table_alias(&mut from_joins, ROOT_ALIAS);

        let mut counter = 0usize;
        let mut stack: Vec<(usize, &IncludeNode)> =
            includes.roots.iter().rev().map(|n| (0, n)).collect();
        while let Some((parent_index, node)) = stack.pop() {
            counter += 1;
            let alias = format!("b{counter}");
            let parent = &blocks[parent_index];
            let block = plan_block(
                registry,
                dialect,
                parent,
                parent_index,
                node,
                alias,
                &mut select_columns,
                &mut from_joins,
            )?;
            blocks.push(block);
            let this_index = blocks.len() - 1;
            for child in node.children.iter().rev() {
                stack.push((this_index, child));
            }
        }

        let mut split_on = String::new();
        separated_by(
            &mut split_on,
            &blocks,
            |out, block| {
                let first = &block.mapping.properties[0];
                out.push_str(&block.alias);
                out.push_str("__");
                out.push_str(&first.property);
            },
            ", ",
        );

        Ok(Self {
            blocks,
            select_columns,
            from_joins,
            split_on,
        })
    }

    pub fn sql(&self, distinct: bool) -> String {
        let mut sql = String::with_capacity(16 + self.select_columns.len() + self.from_joins.len());
        sql.push_str(if distinct {
            "SELECT DISTINCT "
        } else {
            "SELECT "
        });
        sql.push_str(&self.select_columns);
        sql.push_str(&self.from_joins);
        sql
    }
}

#[expect(clippy::too_many_arguments)]
fn plan_block(
    registry: &crate::ModelRegistry,
    dialect: &dyn Dialect,
    parent: &Block,
    parent_index: usize,
    node: &IncludeNode,
    alias: String,
    select_columns: &mut String,
    from_joins: &mut String,
) -> Result<Block> {
    let parent_mapping = &parent.mapping;
    let entity = &parent_mapping.entity_name;
    let Some(fk) = parent_mapping.foreign_key(&node.navigation) else {
        return Err(EngineError::configuration(
            entity,
            format!("include references unknown navigation `{}`", node.navigation),
        ));
    };
    let related = registry.mapping_of(fk.related)?;
    let single_key = |mapping: &EntityMapping, role: &str| -> Result<String> {
        let mut keys = mapping.effective_key_properties();
        match (keys.next(), keys.next()) {
            (Some(key), None) => Ok(key.column.clone()),
            (None, _) => Err(EngineError::configuration(
                entity,
                format!(
                    "navigation `{}` needs a key on the {role} entity",
                    node.navigation
                ),
            )),
            _ => Err(EngineError::configuration(
                entity,
                format!(
                    "navigation `{}` joins through a composite key; only single-column keys are supported",
                    node.navigation
                ),
            )),
        }
    };
    // Reference: parent.<fk col> = child.<principal key col>.
    // Collection: parent.<key col> = child.<inverse fk col>.
    let (parent_column, child_column) = if fk.is_collection {
        let inverse = related.property(&fk.foreign_key).ok_or_else(|| {
            EngineError::configuration(
                entity,
                format!(
                    "navigation `{}` names `{}` as the inverse foreign key, but `{}` has no such property",
                    node.navigation, fk.foreign_key, related.entity_name
                ),
            )
        })?;
        (single_key(parent_mapping, "owning")?, inverse.column.clone())
    } else {
        let own = parent_mapping.property(&fk.foreign_key).ok_or_else(|| {
            EngineError::configuration(
                entity,
                format!(
                    "navigation `{}` names unmapped foreign key property `{}`",
                    node.navigation, fk.foreign_key
                ),
            )
        })?;
        (own.column.clone(), single_key(&related, "related")?)
    };

    select_columns.push_str(", ");
    write_select_columns(select_columns, &related, dialect, &alias, Some(&alias));

    from_joins.push_str(" LEFT JOIN ");
    from_joins.push_str(&qualified_table(&related, dialect));
    from_joins.push(' ');
    dialect.write_table_alias(from_joins, &alias);
    from_joins.push_str(" ON ");
    from_joins.push_str(&parent.alias);
    from_joins.push('.');
    dialect.write_identifier(from_joins, &parent_column);
    from_joins.push_str(" = ");
    from_joins.push_str(&alias);
    from_joins.push('.');
    dialect.write_identifier(from_joins, &child_column);

    Ok(Block {
        alias,
        parent: Some(parent_index),
        navigation: Some(node.navigation.clone()),
        mapping: related,
    })
}

/// Execute the single-query strategy for the builder's state and fix the
/// object graph up from the multi-block rows.
pub(crate) async fn load_single_query<E: Entity, D: Driver>(
    builder: &QueryBuilder<'_, '_, E, D>,
) -> Result<Vec<E>> {
    let set = builder.set();
    let state = builder.state();
    let context = set.context;
    let plan = SingleQueryPlan::build(
        context.registry(),
        context.dialect(),
        &set.mapping,
        &state.includes,
    )?;
    let mut sql = plan.sql(state.distinct);
    let mut params = Params::new();
    builder.append_clauses(&mut sql, &mut params)?;
    log::debug!("single-query include, split on: {}", plan.split_on);
    let command = context.command(sql).with_params(params);
    let rows = context.run_read(set.entity_name(), &command).await?;
    materialize_graph(&plan, &rows, state.identity_resolution)
}

/// Per-block bookkeeping while scanning rows.
struct BlockState {
    labels: Arc<[String]>,
    /// Positions of this block's columns in the full row, from the first row.
    positions: Option<Vec<usize>>,
    instances: Vec<ArcRecord>,
    /// `(scope, key) -> index into instances`; scope is the parent instance
    /// when identity resolution is off.
    index: HashMap<(Option<usize>, KeyValue), usize>,
    edges: Vec<(usize, usize)>,
    edge_set: HashSet<(usize, usize)>,
}

fn block_positions(
    block: &Block,
    row: &RowLabeled,
    entity: &str,
) -> Result<Vec<usize>> {
    block
        .mapping
        .properties
        .iter()
        .map(|p| {
            let label = format!("{}__{}", block.alias, p.property);
            row.labels
                .iter()
                .position(|l| *l == label)
                .ok_or_else(|| {
                    EngineError::operation(
                        entity,
                        format!("joined row is missing column `{label}`"),
                    )
                })
        })
        .collect()
}

fn sub_row(labels: &Arc<[String]>, positions: &[usize], row: &RowLabeled) -> RowLabeled {
    RowLabeled::new(
        labels.clone(),
        positions.iter().map(|&i| row.values[i].clone()).collect(),
    )
}

fn extract_key(mapping: &EntityMapping, values: &RowLabeled) -> KeyValue {
    KeyValue(
        mapping
            .effective_key()
            .iter()
            .map(|&i| values.values[i].clone())
            .collect(),
    )
}

fn materialize_graph<E: Entity>(
    plan: &SingleQueryPlan,
    rows: &[RowLabeled],
    identity_resolution: bool,
) -> Result<Vec<E>> {
    let entity = &plan.blocks[0].mapping.entity_name;
    let mut roots: Vec<E> = Vec::new();
    let mut root_index: HashMap<KeyValue, usize> = HashMap::new();
    let mut cache = identity_resolution.then(IdentityCache::default);
    let mut states: Vec<BlockState> = plan
        .blocks
        .iter()
        .map(|b| BlockState {
            labels: b
                .mapping
                .properties
                .iter()
                .map(|p| p.property.clone())
                .collect::<Vec<_>>()
                .into(),
            positions: None,
            instances: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            edge_set: HashSet::new(),
        })
        .collect();

    // Current instance per block for the row being scanned.
    let mut current: Vec<Option<usize>> = vec![None; plan.blocks.len()];
    for row in rows {
        for (i, block) in plan.blocks.iter().enumerate() {
            if states[i].positions.is_none() {
                states[i].positions = Some(block_positions(block, row, entity)?);
            }
            let values = sub_row(
                &states[i].labels,
                states[i].positions.as_ref().expect("just set"),
                row,
            );
            let key = extract_key(&block.mapping, &values);
            if i == 0 {
                if key.is_null() {
                    current[0] = None;
                    continue;
                }
                let index = match root_index.get(&key) {
                    Some(&index) => index,
                    None => {
                        roots.push(E::from_row(&values)?);
                        root_index.insert(key, roots.len() - 1);
                        roots.len() - 1
                    }
                };
                current[0] = Some(index);
                continue;
            }
            let parent = block.parent.expect("non-root block has a parent");
            let Some(parent_instance) = current[parent] else {
                current[i] = None;
                continue;
            };
            if key.is_null() {
                // Unmatched LEFT JOIN block.
                current[i] = None;
                continue;
            }
            let scope = (!identity_resolution).then_some(parent_instance);
            let state = &mut states[i];
            let index = match state.index.get(&(scope, key.clone())) {
                Some(&index) => index,
                None => {
                    let instance = match cache.as_mut() {
                        Some(cache) => {
                            cache
                                .resolve(block.mapping.type_id, key.clone(), || {
                                    (block.mapping.descriptor.materialize)(&values)
                                })?
                                .0
                        }
                        None => (block.mapping.descriptor.materialize)(&values)?,
                    };
                    state.instances.push(instance);
                    state.index.insert((scope, key), state.instances.len() - 1);
                    state.instances.len() - 1
                }
            };
            current[i] = Some(index);
            if state.edge_set.insert((parent_instance, index)) {
                state.edges.push((parent_instance, index));
            }
        }
    }

    // Wire the navigations. Every parent instance gets an assignment so
    // childless parents come out loaded-empty rather than unloaded.
    for i in 1..plan.blocks.len() {
        let block = &plan.blocks[i];
        let parent_index = block.parent.expect("non-root block has a parent");
        let navigation = block.navigation.as_deref().expect("non-root block");
        let parent_descriptor = plan.blocks[parent_index].mapping.descriptor;
        let nav = parent_descriptor
            .navigation(navigation)
            .expect("navigation validated during planning");
        let mut grouped: HashMap<usize, Vec<usize>> = HashMap::new();
        for &(parent, child) in &states[i].edges {
            grouped.entry(parent).or_default().push(child);
        }
        let parent_count = if parent_index == 0 {
            roots.len()
        } else {
            states[parent_index].instances.len()
        };
        for parent in 0..parent_count {
            let items: Vec<ArcRecord> = grouped
                .get(&parent)
                .map(|children| {
                    children
                        .iter()
                        .map(|&c| states[i].instances[c].clone())
                        .collect()
                })
                .unwrap_or_default();
            if parent_index == 0 {
                (nav.assign)(&roots[parent] as &dyn Any, items);
            } else {
                let instance: &dyn Any = states[parent_index].instances[parent].as_ref();
                (nav.assign)(instance, items);
            }
        }
    }

    Ok(roots)
}
