//! Filter expressions (Odoo domains).
//!
//! A domain is a flat list mixing logical markers (`&`, `|`, `!`) and
//! `[field, operator, value]` leaves in prefix order. [`parse`] reduces it to
//! a [`FilterNode`] tree; [`FilterNode::to_prefix`] turns the tree back into
//! the flat form for the wire.

pub mod ast;
pub mod operators;
pub mod parser;

pub use ast::{FilterNode, Leaf, LogicalKind};
pub use operators::{OperatorSet, ValueShape};
pub use parser::{FilterParser, parse};
