use crate::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// The operator with its sides swapped, for `value op column` input.
    pub fn flipped(&self) -> CompareOp {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::Ne => CompareOp::Ne,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextMatch {
    Contains,
    StartsWith,
    EndsWith,
}

/// Right-hand side of a comparison: a bound value or another column of the
/// same entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    Column(String),
}

/// Owned predicate tree over the properties of one entity type. Built by the
/// `expr!` macro or directly through the constructor methods; translated to
/// a parameterized WHERE fragment by the predicate translator.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Constant predicate, e.g. a pre-evaluated boolean expression.
    Literal(bool),
    /// A boolean property used as the whole predicate.
    Column(String),
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Compare {
        op: CompareOp,
        property: String,
        operand: Operand,
    },
    Match {
        op: TextMatch,
        property: String,
        pattern: Value,
    },
    IsNull {
        property: String,
        negated: bool,
    },
    In {
        property: String,
        values: Vec<Value>,
    },
}

impl Predicate {
    pub fn literal(value: bool) -> Self {
        Predicate::Literal(value)
    }

    pub fn column(property: impl Into<String>) -> Self {
        Predicate::Column(property.into())
    }

    pub fn compare(op: CompareOp, property: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            op,
            property: property.into(),
            operand: Operand::Value(value.into()),
        }
    }

    pub fn compare_columns(
        op: CompareOp,
        property: impl Into<String>,
        other: impl Into<String>,
    ) -> Self {
        Predicate::Compare {
            op,
            property: property.into(),
            operand: Operand::Column(other.into()),
        }
    }

    pub fn eq(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(CompareOp::Eq, property, value)
    }

    pub fn ne(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(CompareOp::Ne, property, value)
    }

    pub fn lt(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(CompareOp::Lt, property, value)
    }

    pub fn le(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(CompareOp::Le, property, value)
    }

    pub fn gt(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(CompareOp::Gt, property, value)
    }

    pub fn ge(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(CompareOp::Ge, property, value)
    }

    pub fn is_null(property: impl Into<String>) -> Self {
        Predicate::IsNull {
            property: property.into(),
            negated: false,
        }
    }

    pub fn is_not_null(property: impl Into<String>) -> Self {
        Predicate::IsNull {
            property: property.into(),
            negated: true,
        }
    }

    pub fn contains(property: impl Into<String>, pattern: impl Into<Value>) -> Self {
        Predicate::Match {
            op: TextMatch::Contains,
            property: property.into(),
            pattern: pattern.into(),
        }
    }

    pub fn starts_with(property: impl Into<String>, pattern: impl Into<Value>) -> Self {
        Predicate::Match {
            op: TextMatch::StartsWith,
            property: property.into(),
            pattern: pattern.into(),
        }
    }

    pub fn ends_with(property: impl Into<String>, pattern: impl Into<Value>) -> Self {
        Predicate::Match {
            op: TextMatch::EndsWith,
            property: property.into(),
            pattern: pattern.into(),
        }
    }

    /// Membership test against a bound collection. Lists flatten to their
    /// elements; a single value behaves as a one-element collection.
    pub fn in_list(property: impl Into<String>, values: impl Into<Value>) -> Self {
        Predicate::In {
            property: property.into(),
            values: values.into().into_elements(),
        }
    }

    #[expect(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }
}

/// Structure of a predicate with bound values erased: the compiled-fragment
/// cache key. Two predicates differing only in bound values share a shape;
/// the few value facts that change the emitted SQL (null-collapse, empty IN)
/// are kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Shape {
    Literal(bool),
    Column(String),
    Not(Box<Shape>),
    And(Box<Shape>, Box<Shape>),
    Or(Box<Shape>, Box<Shape>),
    Compare(CompareOp, String, ShapeOperand),
    Match(TextMatch, String),
    IsNull(String, bool),
    In(String, /* empty: */ bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ShapeOperand {
    Column(String),
    Value,
    /// Value that collapses to IS [NOT] NULL under the active options.
    Null,
}

/// Whether a comparison against `value` collapses to a null test.
pub(crate) fn collapses_to_null(value: &Value, empty_string_as_null: bool) -> bool {
    value.is_null() || (empty_string_as_null && value.as_str() == Some(""))
}

impl Predicate {
    pub(crate) fn shape(&self, empty_string_as_null: bool) -> Shape {
        match self {
            Predicate::Literal(v) => Shape::Literal(*v),
            Predicate::Column(p) => Shape::Column(p.clone()),
            Predicate::Not(inner) => Shape::Not(Box::new(inner.shape(empty_string_as_null))),
            Predicate::And(l, r) => Shape::And(
                Box::new(l.shape(empty_string_as_null)),
                Box::new(r.shape(empty_string_as_null)),
            ),
            Predicate::Or(l, r) => Shape::Or(
                Box::new(l.shape(empty_string_as_null)),
                Box::new(r.shape(empty_string_as_null)),
            ),
            Predicate::Compare {
                op,
                property,
                operand,
            } => Shape::Compare(
                *op,
                property.clone(),
                match operand {
                    Operand::Column(c) => ShapeOperand::Column(c.clone()),
                    Operand::Value(v) if collapses_to_null(v, empty_string_as_null) => {
                        ShapeOperand::Null
                    }
                    Operand::Value(_) => ShapeOperand::Value,
                },
            ),
            Predicate::Match { op, property, .. } => Shape::Match(*op, property.clone()),
            Predicate::IsNull { property, negated } => {
                Shape::IsNull(property.clone(), *negated)
            }
            Predicate::In { property, values } => {
                Shape::In(property.clone(), values.is_empty())
            }
        }
    }
}
