//! odootable client library
//!
//! Reads records from an Odoo server for one table block at a time. Every
//! fetch opens its own session, authenticates, pages through the results and
//! releases the session before returning, so concurrent fetches never share
//! credentials or connections.
//!
//! # Example
//!
//! ```no_run
//! use odootable_client::{ClientBuilder, ConnectionSpec, ReadCall, Scheme};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> odootable_common::Result<()> {
//!     let client = ClientBuilder::new().page_size(200).build()?;
//!     let spec = ConnectionSpec::new(Scheme::Http, "erp.example.com", 8069, "prod", "admin", "secret");
//!     let call = ReadCall {
//!         model: "res.partner".into(),
//!         domain: vec![json!(["is_company", "=", true])],
//!         fields: vec!["name".into(), "email".into()],
//!     };
//!
//!     for record in client.fetch(&spec, &call).await? {
//!         println!("{:?}", record.get("name"));
//!     }
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use odootable_common::Result;

pub use connection::{
    AuthToken, Channel, ConnectionSpec, Connector, DEFAULT_PORT, Page, PageRequest, ReadCall, Scheme,
};
pub use jsonrpc::JsonRpcConnector;
#[cfg(any(test, feature = "testing"))]
pub use memory::{FaultPoint, MemoryConnector, MemoryStats};
pub use results::{Record, RecordSet};
pub use retry::RetryPolicy;
pub use session::{Session, SessionState};

mod connection;
mod jsonrpc;
#[cfg(any(test, feature = "testing"))]
mod memory;
mod results;
mod retry;
mod session;

/// Tuning shared by every session a client opens.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Bound on each connect, authenticate and page fetch.
    pub timeout: Duration,
    /// Records requested per page.
    pub page_size: usize,
    pub retry: RetryPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            page_size: 500,
            retry: RetryPolicy::default(),
        }
    }
}

/// Builder for configuring and creating a [`QueryClient`].
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use odootable_client::ClientBuilder;
///
/// let client = ClientBuilder::new()
///     .timeout(Duration::from_secs(10))
///     .max_attempts(5)
///     .build()
///     .unwrap();
/// ```
pub struct ClientBuilder {
    options: ClientOptions,
    connector: Option<Arc<dyn Connector>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            options: ClientOptions::default(),
            connector: None,
        }
    }

    /// Set the per-operation timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Set the number of records requested per page.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.options.page_size = page_size;
        self
    }

    /// Set the total number of attempts for transient failures.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.options.retry.max_attempts = max_attempts.max(1);
        self
    }

    /// Replace the whole retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.options.retry = retry;
        self
    }

    /// Use a specific transport instead of JSON-RPC over HTTP.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn build(self) -> Result<QueryClient> {
        let connector = match self.connector {
            Some(connector) => connector,
            None => Arc::new(JsonRpcConnector::new(self.options.timeout)),
        };
        Ok(QueryClient {
            connector,
            options: self.options,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs read queries, one fresh session per call.
///
/// Cloning is cheap; clones share the connector but never a session.
#[derive(Clone)]
pub struct QueryClient {
    connector: Arc<dyn Connector>,
    options: ClientOptions,
}

impl QueryClient {
    pub fn new(connector: Arc<dyn Connector>, options: ClientOptions) -> Self {
        Self { connector, options }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Connect, authenticate and read every page of `call`.
    ///
    /// Connect and authenticate are retried on transient failures; page
    /// fetches are retried inside the session. The session is released
    /// before this returns, whatever the outcome.
    pub async fn fetch(&self, spec: &ConnectionSpec, call: &ReadCall) -> Result<RecordSet> {
        let policy = self.options.retry;
        let connector = self.connector.as_ref();

        let mut session = policy
            .run("connect", || Session::connect(connector, spec, &self.options))
            .await?;

        let mut attempt = 1;
        let token = loop {
            match session
                .authenticate(&spec.database, &spec.login, spec.password())
                .await
            {
                Ok(token) => break token,
                Err(err) => policy.backoff("authenticate", attempt, err).await?,
            }
            attempt += 1;
        };

        session.query(&token, call).await
    }
}
