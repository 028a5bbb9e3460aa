//! Block resolution: raw block -> validated request -> records -> table.
//!
//! Each block runs in its own session. Blocks resolve concurrently up to a
//! parallelism bound and results come back in input order; one block
//! failing never affects another.

use futures::StreamExt;
use odootable_client::QueryClient;
use odootable_common::{OdooTableError, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{GlobalOptions, RawBlock, parse_block};
use crate::filter::FilterParser;
use crate::merge::{TableMatrix, merge, override_header, parse_header_content};

/// One block as found in the document: its options and its text content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockInput {
    pub options: RawBlock,
    pub content: String,
}

impl BlockInput {
    pub fn new(options: RawBlock, content: impl Into<String>) -> Self {
        Self {
            options,
            content: content.into(),
        }
    }
}

/// A table plus the keys the renderer should apply to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTable {
    pub matrix: TableMatrix,
    pub presentation: RawBlock,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Table(ResolvedTable),
    /// The server returned no records; the block produces no element.
    Empty,
}

pub struct Resolver {
    client: QueryClient,
    globals: GlobalOptions,
    parser: FilterParser,
    max_parallel: usize,
}

impl Resolver {
    pub fn new(client: QueryClient) -> Self {
        Self {
            client,
            globals: GlobalOptions::default(),
            parser: FilterParser::default(),
            max_parallel: 4,
        }
    }

    pub fn with_globals(mut self, globals: GlobalOptions) -> Self {
        self.globals = globals;
        self
    }

    pub fn with_parser(mut self, parser: FilterParser) -> Self {
        self.parser = parser;
        self
    }

    /// Bound on blocks resolved at the same time.
    pub fn max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Resolve one block.
    pub async fn resolve(&self, block: &BlockInput) -> Result<Resolution> {
        let options = self.globals.apply(&block.options);
        let spec = parse_block(&options, &self.parser)?;

        // Header problems are known before any network traffic.
        let header_rows = parse_header_content(&block.content);
        override_header(&header_rows)?;

        if let Some(filter) = &spec.request.filter {
            debug!("Resolving {} with {filter}", spec.request.model);
        }

        let records = crate::execute(&self.client, &spec.request).await?;
        if records.is_empty() {
            info!(
                "{} on {} returned no records",
                spec.request.model,
                spec.request.connection.address()
            );
            return Ok(Resolution::Empty);
        }

        let matrix = merge(&spec.request, &records, &header_rows)?;
        info!(
            "Resolved {} on {}: {} row(s)",
            spec.request.model,
            spec.request.connection.address(),
            matrix.rows.len()
        );

        Ok(Resolution::Table(ResolvedTable {
            matrix,
            presentation: spec.presentation,
        }))
    }

    /// Resolve one block, giving up as soon as `cancel` fires.
    ///
    /// Cancelling drops the in-flight session, which releases its channel.
    pub async fn resolve_cancellable(&self, block: &BlockInput, cancel: &CancellationToken) -> Result<Resolution> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(OdooTableError::Cancelled),
            result = self.resolve(block) => result,
        }
    }

    /// Resolve every block, at most `max_parallel` at a time, in input order.
    pub async fn resolve_all(&self, blocks: &[BlockInput], cancel: &CancellationToken) -> Vec<Result<Resolution>> {
        futures::stream::iter(blocks.iter().map(|block| self.resolve_cancellable(block, cancel)))
            .buffered(self.max_parallel)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use odootable_client::{ClientOptions, FaultPoint, MemoryConnector, Record, RetryPolicy};
    use odootable_common::Value;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn memory_server() -> MemoryConnector {
        let server = MemoryConnector::new();
        server.add_user("erp.example.com", "admin", "secret", 2);
        server.add_records(
            "res.partner",
            vec![
                Record::from_iter([("name", Value::from("Azure Interior")), ("email", Value::from("azure@example.com"))]),
                Record::from_iter([("name", Value::from("Deco Addict")), ("email", Value::Bool(false))]),
                Record::from_iter([("name", Value::from("Gemini Furniture"))]),
            ],
        );
        server.add_records("sale.order", Vec::new());
        server
    }

    fn resolver(server: &MemoryConnector) -> Resolver {
        let options = ClientOptions {
            timeout: Duration::from_secs(2),
            page_size: 2,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
        };
        Resolver::new(QueryClient::new(Arc::new(server.clone()), options))
    }

    fn options(value: serde_json::Value) -> RawBlock {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn partner_block(content: &str) -> BlockInput {
        BlockInput::new(
            options(json!({
                "url": "erp.example.com",
                "model": "res.partner",
                "fields": ["name", "email"],
                "login": "admin",
                "password": "secret",
                "caption": "Customers"
            })),
            content,
        )
    }

    fn table(resolution: Resolution) -> ResolvedTable {
        match resolution {
            Resolution::Table(table) => table,
            Resolution::Empty => panic!("expected a table"),
        }
    }

    #[tokio::test]
    async fn test_resolve_block() {
        let server = memory_server();
        let resolved = table(resolver(&server).resolve(&partner_block("")).await.unwrap());

        assert_eq!(resolved.matrix.header, vec!["name", "email"]);
        assert_eq!(resolved.matrix.rows.len(), 3);
        assert_eq!(resolved.matrix.rows[1], vec!["Deco Addict", ""]);
        assert_eq!(resolved.presentation.get("caption"), Some(&json!("Customers")));
        assert_eq!(server.stats().open_channels, 0);
    }

    #[tokio::test]
    async fn test_header_content_overrides_fields() {
        let server = memory_server();
        let resolved = table(
            resolver(&server)
                .resolve(&partner_block("Customer,E-mail\n"))
                .await
                .unwrap(),
        );
        assert_eq!(resolved.matrix.header, vec!["Customer", "E-mail"]);
    }

    #[tokio::test]
    async fn test_two_header_rows_fail_before_connecting() {
        let server = memory_server();
        let err = resolver(&server)
            .resolve(&partner_block("A,B\nC,D\n"))
            .await
            .unwrap_err();

        assert_eq!(err, OdooTableError::TooManyHeaderRows(2));
        assert_eq!(server.stats().connect_calls, 0);
    }

    #[tokio::test]
    async fn test_no_records_is_empty() {
        let server = memory_server();
        let mut block = partner_block("");
        block.options.insert("model".into(), json!("sale.order"));

        let resolution = resolver(&server).resolve(&block).await.unwrap();
        assert_eq!(resolution, Resolution::Empty);
    }

    #[tokio::test]
    async fn test_globals_fill_block() {
        let server = memory_server();
        let globals = GlobalOptions::new(options(json!({
            "url": "erp.example.com",
            "login": "admin",
            "password": "secret",
            "domain": [["name", "ilike", "a"]]
        })));
        let block = BlockInput::new(options(json!({"model": "res.partner", "fields": ["name"]})), "");

        let resolved = table(resolver(&server).with_globals(globals).resolve(&block).await.unwrap());

        assert_eq!(resolved.matrix.header, vec!["name"]);
        assert_eq!(server.last_domain(), Some(vec![json!(["name", "ilike", "a"])]));
    }

    #[tokio::test]
    async fn test_resolve_all_keeps_order_and_isolates_failures() {
        let server = memory_server();
        let mut missing_model = partner_block("");
        missing_model.options.insert("model".into(), json!("no.such.model"));
        let mut bad_config = partner_block("");
        bad_config.options.remove("fields");

        let blocks = vec![partner_block("First,Second"), missing_model, bad_config, partner_block("")];
        let results = resolver(&server)
            .max_parallel(2)
            .resolve_all(&blocks, &CancellationToken::new())
            .await;

        assert_eq!(results.len(), 4);
        match &results[0] {
            Ok(Resolution::Table(t)) => assert_eq!(t.matrix.header, vec!["First", "Second"]),
            other => panic!("unexpected first result: {other:?}"),
        }
        assert_eq!(results[1].as_ref().unwrap_err().kind(), "remote_error");
        assert_eq!(results[2].as_ref().unwrap_err().kind(), "config_error");
        match &results[3] {
            Ok(Resolution::Table(t)) => assert_eq!(t.matrix.header, vec!["name", "email"]),
            other => panic!("unexpected last result: {other:?}"),
        }
        assert_eq!(server.stats().open_channels, 0);
    }

    #[tokio::test]
    async fn test_page_failure_yields_no_table() {
        let server = memory_server();
        server.inject_fault(
            FaultPoint::Page(1),
            OdooTableError::Remote {
                code: 200,
                message: "Access Denied".into(),
            },
        );

        let err = resolver(&server).resolve(&partner_block("")).await.unwrap_err();
        assert_eq!(
            err,
            OdooTableError::Remote {
                code: 200,
                message: "Access Denied".into()
            }
        );
        assert_eq!(server.stats().open_channels, 0);
    }

    #[tokio::test]
    async fn test_cancel_releases_channel() {
        let server = memory_server().with_latency(Duration::from_millis(100));
        let resolver = resolver(&server);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            // Connect has finished, authenticate is still in flight.
            tokio::time::sleep(Duration::from_millis(150)).await;
            trigger.cancel();
        });

        let err = resolver
            .resolve_cancellable(&partner_block(""), &cancel)
            .await
            .unwrap_err();

        assert_eq!(err, OdooTableError::Cancelled);
        let stats = server.stats();
        assert_eq!(stats.connect_calls, 1);
        assert_eq!(stats.open_channels, 0);
    }

    #[tokio::test]
    async fn test_already_cancelled_never_connects() {
        let server = memory_server();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = resolver(&server).resolve_all(&[partner_block("")], &cancel).await;
        assert_eq!(results, vec![Err(OdooTableError::Cancelled)]);
        assert_eq!(server.stats().connect_calls, 0);
    }
}
