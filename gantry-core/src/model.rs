use crate::{
    Dialect, EngineError, Entity, EntityDescriptor, EntityMapping, ForeignKeyMapping,
    GeneratedKind, GeneratedOption, NavigationKind, PropertyMapping, Result, SqlGenerator,
};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Fluent overrides for one property. Every `Some` wins over the attribute
/// layer; entries are applied in call order so the last call wins.
#[derive(Default, Debug, Clone)]
struct PropertyOverride {
    column: Option<String>,
    required: Option<bool>,
    max_length: Option<u32>,
    min_length: Option<u32>,
    read_only: Option<bool>,
    generated: Option<GeneratedOption>,
}

#[derive(Debug, Clone)]
struct RelationConfig {
    navigation: String,
    foreign_key: String,
    related: &'static EntityDescriptor,
    collection: bool,
}

/// Accumulated fluent configuration for one entity type.
pub struct EntityConfig {
    descriptor: &'static EntityDescriptor,
    table: Option<String>,
    schema: Option<String>,
    read_only: Option<bool>,
    no_key: bool,
    key: Option<Vec<String>>,
    alternate_key: Option<Vec<String>>,
    properties: Vec<(String, PropertyOverride)>,
    sequences: Vec<(String, String)>,
    relations: Vec<RelationConfig>,
}

impl EntityConfig {
    fn new(descriptor: &'static EntityDescriptor) -> Self {
        Self {
            descriptor,
            table: None,
            schema: None,
            read_only: None,
            no_key: false,
            key: None,
            alternate_key: None,
            properties: Vec::new(),
            sequences: Vec::new(),
            relations: Vec::new(),
        }
    }
}

/// Per-type fluent configuration collected by the context builder.
#[derive(Default)]
pub struct ModelConfig {
    entities: HashMap<TypeId, EntityConfig>,
}

/// Entry point handed to the `model(..)` closure of the context builder.
#[derive(Default)]
pub struct ModelBuilder {
    config: ModelConfig,
}

impl ModelBuilder {
    /// Configure one entity type. May be called repeatedly; later calls
    /// extend the same configuration and win over earlier ones.
    pub fn entity<E: Entity>(&mut self, f: impl FnOnce(&mut EntityBuilder)) -> &mut Self {
        let config = self
            .config
            .entities
            .entry(TypeId::of::<E>())
            .or_insert_with(|| EntityConfig::new(E::descriptor()));
        f(&mut EntityBuilder { config });
        self
    }

    pub fn into_config(self) -> ModelConfig {
        self.config
    }
}

/// Fluent surface for one entity type.
pub struct EntityBuilder<'m> {
    config: &'m mut EntityConfig,
}

impl EntityBuilder<'_> {
    pub fn table(&mut self, name: impl Into<String>) -> &mut Self {
        self.config.table = Some(name.into());
        self
    }

    pub fn schema(&mut self, name: impl Into<String>) -> &mut Self {
        self.config.schema = Some(name.into());
        self
    }

    /// Entity participates only in reads.
    pub fn read_only(&mut self) -> &mut Self {
        self.config.read_only = Some(true);
        self
    }

    /// Entity deliberately has no key; only keyless reads are available.
    pub fn has_no_key(&mut self) -> &mut Self {
        self.config.no_key = true;
        self
    }

    /// Declare the primary key properties, in order.
    pub fn key<I, S>(&mut self, properties: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.key = Some(properties.into_iter().map(Into::into).collect());
        self
    }

    /// Declare the business key used when no primary key exists.
    pub fn alternate_key<I, S>(&mut self, properties: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.alternate_key = Some(properties.into_iter().map(Into::into).collect());
        self
    }

    /// Draw the property's value from a database sequence on insert.
    pub fn sequence(
        &mut self,
        property: impl Into<String>,
        sequence: impl Into<String>,
    ) -> &mut Self {
        self.config
            .sequences
            .push((property.into(), sequence.into()));
        self
    }

    pub fn property(
        &mut self,
        name: impl Into<String>,
        f: impl FnOnce(&mut PropertyBuilder),
    ) -> &mut Self {
        let mut builder = PropertyBuilder {
            config: PropertyOverride::default(),
        };
        f(&mut builder);
        self.config.properties.push((name.into(), builder.config));
        self
    }

    /// One-to-many: `foreign_key` names the property on the related entity
    /// that points back at this one.
    pub fn has_many<R: Entity>(
        &mut self,
        navigation: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> &mut Self {
        self.config.relations.push(RelationConfig {
            navigation: navigation.into(),
            foreign_key: foreign_key.into(),
            related: R::descriptor(),
            collection: true,
        });
        self
    }

    /// Many-to-one: `foreign_key` names the property on this entity holding
    /// the related key.
    pub fn has_one<R: Entity>(
        &mut self,
        navigation: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> &mut Self {
        self.config.relations.push(RelationConfig {
            navigation: navigation.into(),
            foreign_key: foreign_key.into(),
            related: R::descriptor(),
            collection: false,
        });
        self
    }
}

pub struct PropertyBuilder {
    config: PropertyOverride,
}

impl PropertyBuilder {
    pub fn column(&mut self, name: impl Into<String>) -> &mut Self {
        self.config.column = Some(name.into());
        self
    }

    pub fn required(&mut self) -> &mut Self {
        self.config.required = Some(true);
        self
    }

    pub fn optional(&mut self) -> &mut Self {
        self.config.required = Some(false);
        self
    }

    pub fn max_length(&mut self, length: u32) -> &mut Self {
        self.config.max_length = Some(length);
        self
    }

    pub fn min_length(&mut self, length: u32) -> &mut Self {
        self.config.min_length = Some(length);
        self
    }

    /// Shorthand for a `StringLength(min, max)`-style bound.
    pub fn length(&mut self, min: u32, max: u32) -> &mut Self {
        self.config.min_length = Some(min);
        self.config.max_length = Some(max);
        self
    }

    pub fn read_only(&mut self) -> &mut Self {
        self.config.read_only = Some(true);
        self
    }

    pub fn identity(&mut self) -> &mut Self {
        self.config.generated = Some(GeneratedOption::Identity);
        self
    }

    pub fn computed(&mut self) -> &mut Self {
        self.config.generated = Some(GeneratedOption::Computed);
        self
    }
}

/// Merge the attribute layer of `descriptor` with the fluent `config` into
/// the immutable mapping. Pure: resolving the same inputs twice yields
/// structurally equal mappings.
pub(crate) fn resolve_mapping(
    descriptor: &'static EntityDescriptor,
    config: Option<&EntityConfig>,
) -> Result<EntityMapping> {
    let entity = descriptor.entity_name;
    let mut properties: Vec<PropertyMapping> = descriptor
        .properties
        .iter()
        .map(|def| PropertyMapping {
            property: def.name.into(),
            column: def.column.into(),
            prototype: def.prototype.clone(),
            generated: match def.generated {
                GeneratedKind::None => GeneratedOption::None,
                GeneratedKind::Identity => GeneratedOption::Identity,
                GeneratedKind::Computed => GeneratedOption::Computed,
                GeneratedKind::Sequence(name) => GeneratedOption::Sequence(name.into()),
            },
            read_only: def.read_only,
            required: def.required,
            max_length: def.max_length,
            min_length: def.min_length,
            nullable: def.nullable,
        })
        .collect();

    let find = |properties: &[PropertyMapping], name: &str| -> Result<usize> {
        properties
            .iter()
            .position(|p| p.property == name)
            .ok_or_else(|| {
                EngineError::configuration(
                    entity,
                    format!("`{name}` does not name a mapped property"),
                )
            })
    };

    if let Some(config) = config {
        for (name, o) in &config.properties {
            let index = find(&properties, name)?;
            let property = &mut properties[index];
            if let Some(column) = &o.column {
                property.column = column.clone();
            }
            if let Some(required) = o.required {
                property.required = required;
            }
            if let Some(max_length) = o.max_length {
                property.max_length = Some(max_length);
            }
            if let Some(min_length) = o.min_length {
                property.min_length = Some(min_length);
            }
            if let Some(read_only) = o.read_only {
                property.read_only = read_only;
            }
            if let Some(generated) = &o.generated {
                property.generated = generated.clone();
            }
        }
        for (i, (name, sequence)) in config.sequences.iter().enumerate() {
            if let Some((_, first)) = config.sequences[..i].iter().find(|(n, _)| n == name) {
                return Err(EngineError::configuration(
                    entity,
                    format!(
                        "property `{name}` is assigned two sequences (`{first}` and `{sequence}`)"
                    ),
                ));
            }
            let index = find(&properties, name)?;
            properties[index].generated = GeneratedOption::Sequence(sequence.clone());
        }
    }

    let read_only = config
        .and_then(|c| c.read_only)
        .unwrap_or(descriptor.read_only);
    let no_key = config.map(|c| c.no_key).unwrap_or(false) || descriptor.no_key;

    // Key discovery: fluent key, then [key]-annotated properties, then a
    // property named `id`, then `<TypeName>Id`.
    let explicit: Option<&Vec<String>> = config.and_then(|c| c.key.as_ref());
    let annotated: Vec<usize> = descriptor
        .properties
        .iter()
        .enumerate()
        .filter(|(_, d)| d.key)
        .map(|(i, _)| i)
        .collect();
    if no_key && (explicit.is_some() || !annotated.is_empty()) {
        return Err(EngineError::configuration(
            entity,
            "entity is declared keyless but a key is configured",
        ));
    }
    let key: Vec<usize> = if let Some(names) = explicit {
        names
            .iter()
            .map(|n| find(&properties, n))
            .collect::<Result<_>>()?
    } else if !annotated.is_empty() {
        annotated
    } else {
        // Case-insensitive and underscore-insensitive, so `id`, `Id`,
        // `user_id` and `UserId` all satisfy their convention.
        let normalize = |name: &str| name.replace('_', "").to_ascii_lowercase();
        let conventional = |suffix: &str| {
            let suffix = normalize(suffix);
            let matches: Vec<usize> = properties
                .iter()
                .enumerate()
                .filter(|(_, p)| normalize(&p.property) == suffix)
                .map(|(i, _)| i)
                .collect();
            (matches.len() == 1).then_some(matches)
        };
        let type_key = format!("{entity}Id");
        match conventional("id").or_else(|| conventional(&type_key)) {
            Some(key) => key,
            None if read_only || no_key => Vec::new(),
            None => {
                return Err(EngineError::configuration(
                    entity,
                    "no key found: annotate one, configure one, or declare the entity keyless",
                ));
            }
        }
    };

    let alternate_key: Vec<usize> = match config.and_then(|c| c.alternate_key.as_ref()) {
        Some(names) => names
            .iter()
            .map(|n| find(&properties, n))
            .collect::<Result<_>>()?,
        None => Vec::new(),
    };

    // Relationships: attribute-declared navigations first, fluent
    // declarations override by navigation name.
    let mut foreign_keys: Vec<ForeignKeyMapping> = descriptor
        .navigations
        .iter()
        .map(|nav| ForeignKeyMapping {
            navigation: nav.name.into(),
            related: (nav.related)(),
            foreign_key: nav.foreign_key.into(),
            is_collection: nav.kind == NavigationKind::Collection,
        })
        .collect();
    if let Some(config) = config {
        for relation in &config.relations {
            let Some(declared) = descriptor.navigation(&relation.navigation) else {
                return Err(EngineError::configuration(
                    entity,
                    format!(
                        "relationship references unknown navigation `{}`",
                        relation.navigation
                    ),
                ));
            };
            let declared_collection = declared.kind == NavigationKind::Collection;
            if declared_collection != relation.collection {
                return Err(EngineError::configuration(
                    entity,
                    format!(
                        "navigation `{}` is declared as a {} but configured as a {}",
                        relation.navigation,
                        if declared_collection {
                            "collection"
                        } else {
                            "reference"
                        },
                        if relation.collection {
                            "collection"
                        } else {
                            "reference"
                        },
                    ),
                ));
            }
            let mapped = ForeignKeyMapping {
                navigation: relation.navigation.clone(),
                related: relation.related,
                foreign_key: relation.foreign_key.clone(),
                is_collection: relation.collection,
            };
            match foreign_keys
                .iter_mut()
                .find(|fk| fk.navigation == relation.navigation)
            {
                Some(existing) => *existing = mapped,
                None => foreign_keys.push(mapped),
            }
        }
    }

    let mapping = EntityMapping {
        entity_name: entity.into(),
        type_id: descriptor.type_id,
        descriptor,
        table: config
            .and_then(|c| c.table.clone())
            .unwrap_or_else(|| descriptor.table.into()),
        schema: config
            .and_then(|c| c.schema.clone())
            .or_else(|| descriptor.schema.map(Into::into)),
        read_only,
        no_key,
        properties,
        key,
        alternate_key,
        foreign_keys,
    };
    mapping.check_invariants()?;
    Ok(mapping)
}

/// Per-context cache of resolved mappings and their SQL generators. Built
/// lazily at first use of each entity type, immutable afterwards.
pub struct ModelRegistry {
    dialect: &'static dyn Dialect,
    config: ModelConfig,
    mappings: Mutex<HashMap<TypeId, Arc<EntityMapping>>>,
    generators: Mutex<HashMap<TypeId, Arc<SqlGenerator>>>,
}

impl ModelRegistry {
    pub fn new(dialect: &'static dyn Dialect, config: ModelConfig) -> Self {
        Self {
            dialect,
            config,
            mappings: Mutex::new(HashMap::new()),
            generators: Mutex::new(HashMap::new()),
        }
    }

    pub fn dialect(&self) -> &'static dyn Dialect {
        self.dialect
    }

    pub fn mapping<E: Entity>(&self) -> Result<Arc<EntityMapping>> {
        self.mapping_of(E::descriptor())
    }

    pub fn mapping_of(&self, descriptor: &'static EntityDescriptor) -> Result<Arc<EntityMapping>> {
        let mut mappings = self.mappings.lock().expect("model registry poisoned");
        if let Some(mapping) = mappings.get(&descriptor.type_id) {
            return Ok(mapping.clone());
        }
        let mapping = Arc::new(resolve_mapping(
            descriptor,
            self.config.entities.get(&descriptor.type_id),
        )?);
        mappings.insert(descriptor.type_id, mapping.clone());
        Ok(mapping)
    }

    pub fn generator<E: Entity>(&self) -> Result<Arc<SqlGenerator>> {
        self.generator_of(E::descriptor())
    }

    pub fn generator_of(&self, descriptor: &'static EntityDescriptor) -> Result<Arc<SqlGenerator>> {
        let mapping = self.mapping_of(descriptor)?;
        let mut generators = self.generators.lock().expect("model registry poisoned");
        if let Some(generator) = generators.get(&descriptor.type_id) {
            return Ok(generator.clone());
        }
        let generator = Arc::new(SqlGenerator::new(&mapping, self.dialect)?);
        generators.insert(descriptor.type_id, generator.clone());
        Ok(generator)
    }
}
