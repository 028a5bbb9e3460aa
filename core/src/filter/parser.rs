//! Stack reduction of flat prefix filters.
//!
//! The input is read from the last element to the first. Leaves are pushed;
//! a logical marker pops as many subtrees as its arity and pushes the
//! combined node. Reading backwards means the top of the stack is always the
//! leftmost complete subtree, so operands come off in document order.

use odootable_common::{OdooTableError, Result, Value};

use super::ast::{FilterNode, Leaf, LogicalKind};
use super::operators::{OperatorSet, normalize_operator};

/// Parser over a configurable operator set.
#[derive(Debug, Clone, Default)]
pub struct FilterParser {
    operators: OperatorSet,
    strict: bool,
}

enum Element {
    Marker(LogicalKind),
    Leaf(Leaf),
}

impl FilterParser {
    pub fn new(operators: OperatorSet) -> Self {
        Self {
            operators,
            strict: false,
        }
    }

    /// Reject inputs that leave more than one tree after reduction instead
    /// of AND-combining them.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn operators(&self) -> &OperatorSet {
        &self.operators
    }

    /// Parse a flat prefix sequence into a single tree.
    pub fn parse(&self, raw: &[serde_json::Value]) -> Result<FilterNode> {
        let mut stack: Vec<FilterNode> = Vec::with_capacity(raw.len());

        for (position, element) in raw.iter().enumerate().rev() {
            match self.classify(element, position)? {
                Element::Leaf(leaf) => stack.push(FilterNode::Leaf(leaf)),
                Element::Marker(kind) => {
                    let arity = kind.arity();
                    if stack.len() < arity {
                        return Err(malformed(format!(
                            "'{}' at position {position} needs {arity} operand(s), found {}",
                            kind.marker(),
                            stack.len()
                        )));
                    }
                    let operands: Vec<FilterNode> = stack.drain(stack.len() - arity..).rev().collect();
                    stack.push(FilterNode::Logical { kind, operands });
                }
            }
        }

        // Remaining trees, leftmost first.
        let mut roots = stack.into_iter().rev();
        let Some(first) = roots.next() else {
            return Err(malformed("empty filter".to_string()));
        };

        if self.strict && roots.len() > 0 {
            return Err(malformed(format!(
                "{} top-level expressions left after reduction, expected 1",
                roots.len() + 1
            )));
        }

        Ok(roots.fold(first, FilterNode::and))
    }

    fn classify(&self, element: &serde_json::Value, position: usize) -> Result<Element> {
        match element {
            serde_json::Value::String(marker) => LogicalKind::from_marker(marker)
                .map(Element::Marker)
                .ok_or_else(|| malformed(format!("unknown logical operator '{marker}' at position {position}"))),
            serde_json::Value::Array(triple) => match triple.as_slice() {
                [field, operator, value] => self.leaf(field, operator, value, position).map(Element::Leaf),
                _ => Err(malformed(format!(
                    "leaf at position {position} has {} element(s), expected 3",
                    triple.len()
                ))),
            },
            other => Err(malformed(format!(
                "expected a logical operator or a [field, operator, value] triple at position {position}, got {other}"
            ))),
        }
    }

    fn leaf(
        &self,
        field: &serde_json::Value,
        operator: &serde_json::Value,
        value: &serde_json::Value,
        position: usize,
    ) -> Result<Leaf> {
        let field = match field.as_str().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                return Err(malformed(format!(
                    "leaf at position {position} needs a field name, got {field}"
                )));
            }
        };

        let Some(operator) = operator.as_str().map(normalize_operator) else {
            return Err(malformed(format!(
                "leaf at position {position} needs an operator string, got {operator}"
            )));
        };

        let Some(shape) = self.operators.shape(&operator) else {
            return Err(malformed(format!(
                "unknown operator '{operator}' in leaf at position {position}"
            )));
        };

        let value = Value::from(value.clone());
        if !shape.accepts(&value) {
            return Err(malformed(format!(
                "operator '{operator}' on '{field}' expects {}, got {}",
                shape.describe(),
                value.type_name()
            )));
        }

        Ok(Leaf {
            field,
            operator,
            value,
        })
    }
}

fn malformed(message: String) -> OdooTableError {
    OdooTableError::MalformedFilter(message)
}

/// Parse with the standard operator set, AND-combining top-level siblings.
pub fn parse(raw: &[serde_json::Value]) -> Result<FilterNode> {
    FilterParser::default().parse(raw)
}
