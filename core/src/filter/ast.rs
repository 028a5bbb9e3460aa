use std::fmt;

use odootable_common::Value;

/// Boolean connective of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalKind {
    And,
    Or,
    Not,
}

impl LogicalKind {
    /// Number of operand subtrees the marker consumes.
    pub fn arity(self) -> usize {
        match self {
            LogicalKind::And | LogicalKind::Or => 2,
            LogicalKind::Not => 1,
        }
    }

    /// Prefix marker as the server spells it.
    pub fn marker(self) -> &'static str {
        match self {
            LogicalKind::And => "&",
            LogicalKind::Or => "|",
            LogicalKind::Not => "!",
        }
    }

    /// Accepts the symbolic markers and their word aliases, any case.
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker.trim() {
            "&" => Some(LogicalKind::And),
            "|" => Some(LogicalKind::Or),
            "!" => Some(LogicalKind::Not),
            word if word.eq_ignore_ascii_case("and") => Some(LogicalKind::And),
            word if word.eq_ignore_ascii_case("or") => Some(LogicalKind::Or),
            word if word.eq_ignore_ascii_case("not") => Some(LogicalKind::Not),
            _ => None,
        }
    }
}

impl fmt::Display for LogicalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalKind::And => write!(f, "AND"),
            LogicalKind::Or => write!(f, "OR"),
            LogicalKind::Not => write!(f, "NOT"),
        }
    }
}

/// A single comparison `(field, operator, value)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub field: String,
    /// Normalized: trimmed, lower case, single spaces.
    pub operator: String,
    pub value: Value,
}

/// Normalized filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    Leaf(Leaf),
    Logical {
        kind: LogicalKind,
        operands: Vec<FilterNode>,
    },
}

impl FilterNode {
    pub fn leaf(field: impl Into<String>, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterNode::Leaf(Leaf {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        })
    }

    pub fn and(left: FilterNode, right: FilterNode) -> Self {
        FilterNode::Logical {
            kind: LogicalKind::And,
            operands: vec![left, right],
        }
    }

    pub fn or(left: FilterNode, right: FilterNode) -> Self {
        FilterNode::Logical {
            kind: LogicalKind::Or,
            operands: vec![left, right],
        }
    }

    pub fn not(operand: FilterNode) -> Self {
        FilterNode::Logical {
            kind: LogicalKind::Not,
            operands: vec![operand],
        }
    }

    /// Number of comparisons in the tree.
    pub fn leaf_count(&self) -> usize {
        match self {
            FilterNode::Leaf(_) => 1,
            FilterNode::Logical { operands, .. } => operands.iter().map(FilterNode::leaf_count).sum(),
        }
    }

    /// Serialize back to the flat prefix form the server expects.
    ///
    /// Every connective is explicit in the output, including the ones the
    /// parser inserted for top-level siblings.
    pub fn to_prefix(&self) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        self.write_prefix(&mut out);
        out
    }

    fn write_prefix(&self, out: &mut Vec<serde_json::Value>) {
        match self {
            FilterNode::Leaf(leaf) => out.push(serde_json::Value::Array(vec![
                serde_json::Value::String(leaf.field.clone()),
                serde_json::Value::String(leaf.operator.clone()),
                serde_json::Value::from(&leaf.value),
            ])),
            FilterNode::Logical { kind, operands } => {
                out.push(serde_json::Value::String(kind.marker().to_string()));
                for operand in operands {
                    operand.write_prefix(out);
                }
            }
        }
    }
}

impl fmt::Display for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterNode::Leaf(leaf) => write!(f, "{} {} {}", leaf.field, leaf.operator, leaf.value),
            FilterNode::Logical {
                kind: LogicalKind::Not,
                operands,
            } => match operands.as_slice() {
                [operand] => write!(f, "NOT ({operand})"),
                _ => write!(f, "NOT (?)"),
            },
            FilterNode::Logical { kind, operands } => {
                let parts: Vec<String> = operands.iter().map(|o| format!("({o})")).collect();
                write!(f, "{}", parts.join(&format!(" {kind} ")))
            }
        }
    }
}
