//! odootable - live Odoo tables for document pipelines
//!
//! A block names a server, a model, a domain and a field list. This crate
//! validates the block, reads the matching records through
//! [`odootable_client`] and merges them into a [`TableMatrix`].

pub mod config;
pub mod filter;
pub mod merge;
pub mod resolver;

pub use config::{BlockSpec, GlobalOptions, QueryRequest, RawBlock, parse_block, validate, validate_with};
pub use filter::{FilterNode, FilterParser, LogicalKind, OperatorSet, ValueShape};
pub use merge::{TableMatrix, merge, parse_header_content};
pub use resolver::{BlockInput, Resolution, ResolvedTable, Resolver};

use odootable_client::{QueryClient, RecordSet};
use odootable_common::Result;

/// Run a validated request: one session, every page, released on return.
pub async fn execute(client: &QueryClient, request: &QueryRequest) -> Result<RecordSet> {
    client.fetch(&request.connection, &request.read_call()).await
}
