//! Registry of comparison operators a leaf may use.
//!
//! Which operators exist and what value each one takes is data held in an
//! [`OperatorSet`]; the parser only consults it. Adding an operator the
//! server learned is one [`OperatorSet::insert`] away.

use std::collections::HashMap;

use odootable_common::Value;

/// Value shape an operator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// A single non-collection value.
    Scalar,
    /// A list (possibly nested).
    List,
    /// Either of the above.
    Any,
}

impl ValueShape {
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ValueShape::Scalar => value.is_scalar(),
            ValueShape::List => value.is_list(),
            ValueShape::Any => value.is_scalar() || value.is_list(),
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            ValueShape::Scalar => "a scalar",
            ValueShape::List => "a list",
            ValueShape::Any => "a scalar or a list",
        }
    }
}

const STANDARD: &[(&str, ValueShape)] = &[
    ("=", ValueShape::Scalar),
    ("!=", ValueShape::Scalar),
    ("<>", ValueShape::Scalar),
    ("=?", ValueShape::Scalar),
    (">", ValueShape::Scalar),
    (">=", ValueShape::Scalar),
    ("<", ValueShape::Scalar),
    ("<=", ValueShape::Scalar),
    ("in", ValueShape::List),
    ("not in", ValueShape::List),
    ("like", ValueShape::Scalar),
    ("ilike", ValueShape::Scalar),
    ("not like", ValueShape::Scalar),
    ("not ilike", ValueShape::Scalar),
    ("=like", ValueShape::Scalar),
    ("=ilike", ValueShape::Scalar),
    ("child_of", ValueShape::Any),
    ("parent_of", ValueShape::Any),
];

/// Recognized operators and the value shape each expects.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorSet {
    shapes: HashMap<String, ValueShape>,
}

impl OperatorSet {
    /// An empty set; nothing parses until operators are added.
    pub fn empty() -> Self {
        Self {
            shapes: HashMap::new(),
        }
    }

    /// The operators an Odoo server understands.
    pub fn standard() -> Self {
        let mut set = Self::empty();
        for (operator, shape) in STANDARD {
            set.insert(operator, *shape);
        }
        set
    }

    /// Register (or redefine) an operator.
    pub fn insert(&mut self, operator: &str, shape: ValueShape) {
        self.shapes.insert(normalize_operator(operator), shape);
    }

    pub fn with(mut self, operator: &str, shape: ValueShape) -> Self {
        self.insert(operator, shape);
        self
    }

    /// Shape expected by an already-normalized operator.
    pub fn shape(&self, operator: &str) -> Option<ValueShape> {
        self.shapes.get(operator).copied()
    }

    pub fn contains(&self, operator: &str) -> bool {
        self.shapes.contains_key(operator)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

impl Default for OperatorSet {
    fn default() -> Self {
        Self::standard()
    }
}

/// Trim, lower-case and collapse inner whitespace: `" NOT   In"` -> `"not in"`.
pub fn normalize_operator(operator: &str) -> String {
    operator
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
