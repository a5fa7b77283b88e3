use super::predicate::collapses_to_null;
use crate::{
    CompareOp, Dialect, EngineError, EntityMapping, Operand, Params, Predicate, Result, TextMatch,
    TranslationCache, Value, sql_generator::ROOT_ALIAS,
};

/// Translator options that change the emitted fragment. Both participate in
/// the compiled-fragment cache key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranslateOptions {
    pub ignore_case: bool,
    pub empty_string_as_null: bool,
}

/// A translated predicate: the WHERE fragment plus its ordered parameters,
/// named `p0, p1, ...` in appearance order.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub fragment: String,
    pub params: Params,
}

/// Per-parameter value preparation baked in at compile time and re-applied
/// to freshly extracted values on every cache hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum SlotTransform {
    Raw,
    /// Lowercase the bound string (case-insensitive equality).
    Lower,
    /// Escape LIKE metacharacters and wrap in wildcards.
    Like(TextMatch, /* lower: */ bool),
    /// Bind the raw sequence as one list parameter.
    List,
}

impl SlotTransform {
    fn apply(&self, entity: &str, value: Value) -> Result<Value> {
        Ok(match self {
            SlotTransform::Raw => value,
            SlotTransform::Lower => match value {
                Value::Varchar(Some(v)) => Value::Varchar(Some(v.to_lowercase())),
                v => v,
            },
            SlotTransform::Like(op, lower) => {
                let Value::Varchar(Some(pattern)) = value else {
                    return Err(EngineError::configuration(
                        entity,
                        "LIKE pattern must be a non-null string",
                    ));
                };
                let pattern = if *lower {
                    pattern.to_lowercase()
                } else {
                    pattern
                };
                let escaped = escape_like(&pattern);
                Value::Varchar(Some(match op {
                    TextMatch::Contains => format!("%{escaped}%"),
                    TextMatch::StartsWith => format!("{escaped}%"),
                    TextMatch::EndsWith => format!("%{escaped}"),
                }))
            }
            SlotTransform::List => value,
        })
    }
}

/// The dialect-rendered fragment skeleton together with the per-slot value
/// transforms. Never holds bound values; those are re-extracted per query.
#[derive(Debug)]
pub struct CompiledPredicate {
    pub fragment: String,
    pub(crate) slots: Vec<SlotTransform>,
}

/// Escape `\`, `%` and `_` for a LIKE pattern with `ESCAPE '\'`. Already
/// escaped sequences pass through untouched, so the function is idempotent.
pub fn escape_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some('\\' | '%' | '_') => {
                    out.push('\\');
                    out.push(chars.next().expect("peeked"));
                }
                _ => out.push_str("\\\\"),
            },
            '%' | '_' => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// Translate `predicate` against `mapping`, going through `cache` so that
/// predicates sharing a structure compile once.
pub fn translate_predicate(
    predicate: &Predicate,
    mapping: &EntityMapping,
    dialect: &dyn Dialect,
    options: TranslateOptions,
    cache: &TranslationCache,
) -> Result<Translation> {
    let compiled = cache.get_or_compile(mapping, dialect, options, predicate, || {
        compile(predicate, mapping, dialect, options)
    })?;
    let mut values = Vec::with_capacity(compiled.slots.len());
    extract_values(predicate, options, &mut values);
    debug_assert_eq!(values.len(), compiled.slots.len());
    let mut params = Params::new();
    for (i, (slot, value)) in compiled.slots.iter().zip(values).enumerate() {
        params.push(
            format!("p{i}"),
            slot.apply(&mapping.entity_name, value)?,
        );
    }
    Ok(Translation {
        fragment: compiled.fragment.clone(),
        params,
    })
}

struct Compiler<'a> {
    mapping: &'a EntityMapping,
    dialect: &'a dyn Dialect,
    options: TranslateOptions,
    out: String,
    slots: Vec<SlotTransform>,
}

/// Compile the fragment skeleton. Runs on cache misses only.
pub(crate) fn compile(
    predicate: &Predicate,
    mapping: &EntityMapping,
    dialect: &dyn Dialect,
    options: TranslateOptions,
) -> Result<CompiledPredicate> {
    let mut compiler = Compiler {
        mapping,
        dialect,
        options,
        out: String::new(),
        slots: Vec::new(),
    };
    compiler.node(predicate)?;
    Ok(CompiledPredicate {
        fragment: compiler.out,
        slots: compiler.slots,
    })
}

impl Compiler<'_> {
    fn column(&mut self, property: &str) -> Result<()> {
        let Some(mapped) = self.mapping.property(property) else {
            return Err(EngineError::configuration(
                &self.mapping.entity_name,
                format!("predicate references unmapped property `{property}`"),
            ));
        };
        self.out.push_str(ROOT_ALIAS);
        self.out.push('.');
        self.dialect.write_identifier(&mut self.out, &mapped.column);
        Ok(())
    }

    fn parameter(&mut self, transform: SlotTransform) {
        let name = format!("p{}", self.slots.len());
        self.slots.push(transform);
        self.dialect.write_parameter(&mut self.out, &name);
    }

    /// Whether a property maps to a string column, which decides LOWER
    /// wrapping under `ignore_case`.
    fn is_string(&self, property: &str) -> bool {
        self.mapping
            .property(property)
            .is_some_and(|p| matches!(p.prototype, Value::Varchar(..)))
    }

    fn node(&mut self, predicate: &Predicate) -> Result<()> {
        match predicate {
            Predicate::Literal(v) => {
                self.out.push_str(if *v { "1=1" } else { "1=0" });
            }
            Predicate::Column(property) => {
                self.column(property)?;
                self.out.push_str(" = ");
                self.out.push_str(self.dialect.boolean_literal(true));
            }
            Predicate::Not(inner) => match inner.as_ref() {
                Predicate::Column(property) => {
                    self.column(property)?;
                    self.out.push_str(" = ");
                    self.out.push_str(self.dialect.boolean_literal(false));
                }
                Predicate::IsNull { property, negated } => {
                    self.node(&Predicate::IsNull {
                        property: property.clone(),
                        negated: !negated,
                    })?;
                }
                inner => {
                    self.out.push_str("NOT (");
                    self.node(inner)?;
                    self.out.push(')');
                }
            },
            Predicate::And(lhs, rhs) | Predicate::Or(lhs, rhs) => {
                let infix = if matches!(predicate, Predicate::And(..)) {
                    " AND "
                } else {
                    " OR "
                };
                self.out.push('(');
                self.node(lhs)?;
                self.out.push_str(infix);
                self.node(rhs)?;
                self.out.push(')');
            }
            Predicate::Compare {
                op,
                property,
                operand,
            } => match operand {
                Operand::Column(other) => {
                    self.column(property)?;
                    self.out.push(' ');
                    self.out.push_str(op.sql());
                    self.out.push(' ');
                    self.column(other)?;
                }
                Operand::Value(value)
                    if matches!(op, CompareOp::Eq | CompareOp::Ne)
                        && collapses_to_null(value, self.options.empty_string_as_null) =>
                {
                    self.column(property)?;
                    self.out.push_str(if *op == CompareOp::Eq {
                        " IS NULL"
                    } else {
                        " IS NOT NULL"
                    });
                }
                Operand::Value(_) => {
                    let lower = self.options.ignore_case
                        && matches!(op, CompareOp::Eq | CompareOp::Ne)
                        && self.is_string(property);
                    if lower {
                        self.out.push_str("LOWER(");
                        self.column(property)?;
                        self.out.push(')');
                        self.out.push(' ');
                        self.out.push_str(op.sql());
                        self.out.push_str(" LOWER(");
                        self.parameter(SlotTransform::Lower);
                        self.out.push(')');
                    } else {
                        self.column(property)?;
                        self.out.push(' ');
                        self.out.push_str(op.sql());
                        self.out.push(' ');
                        self.parameter(SlotTransform::Raw);
                    }
                }
            },
            Predicate::Match { op, property, .. } => {
                let lower = self.options.ignore_case;
                if lower {
                    self.out.push_str("LOWER(");
                    self.column(property)?;
                    self.out.push_str(") LIKE LOWER(");
                    self.parameter(SlotTransform::Like(*op, true));
                    self.out.push(')');
                } else {
                    self.column(property)?;
                    self.out.push_str(" LIKE ");
                    self.parameter(SlotTransform::Like(*op, false));
                }
                self.out.push_str(" ESCAPE '\\'");
            }
            Predicate::IsNull { property, negated } => {
                self.column(property)?;
                self.out.push_str(if *negated {
                    " IS NOT NULL"
                } else {
                    " IS NULL"
                });
            }
            Predicate::In { property, values } => {
                if values.is_empty() {
                    // Never a raw `IN ()`.
                    self.out.push_str("1=0");
                } else {
                    self.column(property)?;
                    self.out.push_str(" IN ");
                    self.parameter(SlotTransform::List);
                }
            }
        }
        Ok(())
    }
}

/// Collect bound values in the same order `compile` allocates slots.
fn extract_values(predicate: &Predicate, options: TranslateOptions, values: &mut Vec<Value>) {
    match predicate {
        Predicate::Literal(..) | Predicate::Column(..) | Predicate::IsNull { .. } => {}
        Predicate::Not(inner) => extract_values(inner, options, values),
        Predicate::And(lhs, rhs) | Predicate::Or(lhs, rhs) => {
            extract_values(lhs, options, values);
            extract_values(rhs, options, values);
        }
        Predicate::Compare { op, operand, .. } => {
            if let Operand::Value(value) = operand {
                let collapsed = matches!(op, CompareOp::Eq | CompareOp::Ne)
                    && collapses_to_null(value, options.empty_string_as_null);
                if !collapsed {
                    values.push(value.clone());
                }
            }
        }
        Predicate::Match { pattern, .. } => values.push(pattern.clone()),
        Predicate::In {
            values: elements, ..
        } => {
            if !elements.is_empty() {
                values.push(Value::List(
                    Some(elements.clone()),
                    Box::new(
                        elements
                            .first()
                            .map(Value::as_null)
                            .unwrap_or(Value::Null),
                    ),
                ));
            }
        }
    }
}
