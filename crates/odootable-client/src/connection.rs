//! Connection parameters and the transport capability.
//!
//! A transport is anything that can open a [`Channel`] to a server and, over
//! that channel, authenticate and run read calls. The JSON-RPC connector in
//! [`crate::jsonrpc`] is the production implementation; tests plug in
//! scripted ones.

use std::fmt;

use async_trait::async_trait;
use odootable_common::{Result, Value};
use zeroize::Zeroizing;

use crate::results::Record;

/// Default port when a block does not name one.
pub const DEFAULT_PORT: u16 = 80;

/// URL scheme used to reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// Where and as whom to connect.
///
/// The password is wiped from memory when the spec is dropped, so a spec
/// should live no longer than the request that owns it.
#[derive(Clone, PartialEq)]
pub struct ConnectionSpec {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub login: String,
    password: Zeroizing<String>,
}

impl ConnectionSpec {
    pub fn new(
        scheme: Scheme,
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
            database: database.into(),
            login: login.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// `host:port`, used for logging and as the channel address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSpec")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Proof of a successful login, valid for the channel that produced it.
pub struct AuthToken {
    pub database: String,
    pub uid: i64,
    /// User context (language, timezone) sent along with every read.
    pub context: Value,
    secret: Zeroizing<String>,
}

impl AuthToken {
    pub fn new(database: impl Into<String>, uid: i64, secret: impl Into<String>, context: Value) -> Self {
        Self {
            database: database.into(),
            uid,
            context,
            secret: Zeroizing::new(secret.into()),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("database", &self.database)
            .field("uid", &self.uid)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// A read against one model: what the server receives for every page.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadCall {
    pub model: String,
    /// Filter in prefix notation, exactly as it goes on the wire.
    pub domain: Vec<serde_json::Value>,
    pub fields: Vec<String>,
}

/// Window of records requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<Record>,
    /// The server may have more records past this page.
    pub has_more: bool,
}

/// Opens channels to a server.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, spec: &ConnectionSpec) -> Result<Box<dyn Channel>>;
}

/// An open transport channel. Dropping it releases the underlying
/// connection.
#[async_trait]
pub trait Channel: Send {
    async fn authenticate(&mut self, database: &str, login: &str, password: &str) -> Result<AuthToken>;

    async fn call(&mut self, token: &AuthToken, call: &ReadCall, page: PageRequest) -> Result<Page>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let spec = ConnectionSpec::new(Scheme::Http, "erp.local", 8069, "prod", "admin", "hunter2");
        let printed = format!("{spec:?}");

        assert!(printed.contains("erp.local"));
        assert!(!printed.contains("hunter2"));
        assert_eq!(spec.password(), "hunter2");
        assert_eq!(spec.address(), "erp.local:8069");
    }

    #[test]
    fn test_token_debug_hides_secret() {
        let token = AuthToken::new("prod", 2, "hunter2", Value::Null);
        assert!(!format!("{token:?}").contains("hunter2"));
    }
}
