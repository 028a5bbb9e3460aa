//! In-memory connector.
//!
//! Serves records from memory instead of a real server, with scriptable
//! failures at connect, authenticate or any page. Other crates reach it
//! through the `testing` feature.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use odootable_common::{OdooTableError, Result, Value};
use parking_lot::Mutex;

use crate::connection::{AuthToken, Channel, ConnectionSpec, Connector, Page, PageRequest, ReadCall};
use crate::results::Record;

/// Where an injected failure fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    Connect,
    Authenticate,
    /// Zero-based page number of a read.
    Page(usize),
}

/// Call counters, for asserting on retry and release behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub connect_calls: usize,
    pub auth_calls: usize,
    pub page_calls: usize,
    /// Channels handed out and not yet dropped.
    pub open_channels: usize,
}

#[derive(Default)]
struct MemoryServer {
    users: Vec<(String, String, String, i64)>,
    models: HashMap<String, Vec<Record>>,
    faults: Vec<(FaultPoint, OdooTableError)>,
    stats: MemoryStats,
    last_domain: Option<Vec<serde_json::Value>>,
}

impl MemoryServer {
    fn take_fault(&mut self, point: FaultPoint) -> Result<()> {
        match self.faults.iter().position(|(p, _)| *p == point) {
            Some(index) => Err(self.faults.remove(index).1),
            None => Ok(()),
        }
    }
}

/// A connector backed by in-memory tables.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    server: Arc<Mutex<MemoryServer>>,
    latency: Duration,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every operation by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn add_user(&self, database: &str, login: &str, password: &str, uid: i64) {
        self.server
            .lock()
            .users
            .push((database.into(), login.into(), password.into(), uid));
    }

    pub fn add_records(&self, model: &str, records: Vec<Record>) {
        self.server
            .lock()
            .models
            .entry(model.to_string())
            .or_default()
            .extend(records);
    }

    /// Fail the next operation at `point` with `error`. Faults queue up, so
    /// injecting twice fails two operations.
    pub fn inject_fault(&self, point: FaultPoint, error: OdooTableError) {
        self.server.lock().faults.push((point, error));
    }

    pub fn stats(&self) -> MemoryStats {
        self.server.lock().stats
    }

    /// Domain received by the most recent read.
    pub fn last_domain(&self) -> Option<Vec<serde_json::Value>> {
        self.server.lock().last_domain.clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _spec: &ConnectionSpec) -> Result<Box<dyn Channel>> {
        tokio::time::sleep(self.latency).await;

        let mut server = self.server.lock();
        server.stats.connect_calls += 1;
        server.take_fault(FaultPoint::Connect)?;
        server.stats.open_channels += 1;

        Ok(Box::new(MemoryChannel {
            server: Arc::clone(&self.server),
            latency: self.latency,
        }))
    }
}

struct MemoryChannel {
    server: Arc<Mutex<MemoryServer>>,
    latency: Duration,
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn authenticate(&mut self, database: &str, login: &str, password: &str) -> Result<AuthToken> {
        tokio::time::sleep(self.latency).await;

        let mut server = self.server.lock();
        server.stats.auth_calls += 1;
        server.take_fault(FaultPoint::Authenticate)?;

        server
            .users
            .iter()
            .find(|(db, l, p, _)| db == database && l == login && p == password)
            .map(|(_, _, _, uid)| AuthToken::new(database, *uid, password, Value::Null))
            .ok_or_else(|| {
                OdooTableError::Auth(format!(
                    "invalid credentials for '{login}' on database '{database}'"
                ))
            })
    }

    async fn call(&mut self, _token: &AuthToken, call: &ReadCall, page: PageRequest) -> Result<Page> {
        tokio::time::sleep(self.latency).await;

        let mut server = self.server.lock();
        server.stats.page_calls += 1;
        server.last_domain = Some(call.domain.clone());
        server.take_fault(FaultPoint::Page(page.offset / page.limit.max(1)))?;

        let rows = server.models.get(&call.model).ok_or_else(|| OdooTableError::Remote {
            code: 200,
            message: format!("Object {} doesn't exist", call.model),
        })?;

        let records: Vec<Record> = rows
            .iter()
            .skip(page.offset)
            .take(page.limit)
            .map(|row| {
                call.fields
                    .iter()
                    .filter_map(|f| row.get(f).map(|v| (f.clone(), v.clone())))
                    .collect()
            })
            .collect();

        Ok(Page {
            has_more: page.offset + records.len() < rows.len(),
            records,
        })
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        let mut server = self.server.lock();
        server.stats.open_channels = server.stats.open_channels.saturating_sub(1);
    }
}
