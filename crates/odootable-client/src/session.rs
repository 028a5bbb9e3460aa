//! Session lifecycle against one server.
//!
//! A session owns exactly one transport channel. It is created by
//! [`Session::connect`], authenticated once, used for one paginated read and
//! then dropped; dropping releases the channel no matter how the session
//! ended.

use std::future::Future;
use std::time::Duration;

use odootable_common::{OdooTableError, Result};
use tracing::debug;

use crate::ClientOptions;
use crate::connection::{AuthToken, Channel, ConnectionSpec, Connector, Page, PageRequest, ReadCall};
use crate::results::RecordSet;

/// Where a session stands.
///
/// `Disconnected -> Authenticating -> Ready -> Querying -> {Ready, Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Authenticating,
    Ready,
    Querying,
    Failed,
}

/// An open, possibly authenticated channel to the server.
pub struct Session {
    channel: Option<Box<dyn Channel>>,
    state: SessionState,
    address: String,
    options: ClientOptions,
}

impl Session {
    /// Open a channel to the server named by `spec`.
    ///
    /// No retry happens here; callers wrap this in their retry policy.
    pub async fn connect(
        connector: &dyn Connector,
        spec: &ConnectionSpec,
        options: &ClientOptions,
    ) -> Result<Self> {
        let address = spec.address();
        let channel = with_timeout(options.timeout, "connect", connector.connect(spec)).await?;
        debug!("Session opened to {address}");

        Ok(Self {
            channel: Some(channel),
            state: SessionState::Authenticating,
            address,
            options: options.clone(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Log in. Rejected credentials fail the session for good; a dropped
    /// channel leaves it in `Authenticating` so the caller may retry.
    pub async fn authenticate(&mut self, database: &str, login: &str, password: &str) -> Result<AuthToken> {
        self.expect_state(SessionState::Authenticating, "authenticate")?;
        let timeout = self.options.timeout;
        let channel = self.channel_mut()?;

        let outcome = with_timeout(timeout, "authenticate", channel.authenticate(database, login, password)).await;

        match outcome {
            Ok(token) => {
                debug!("Authenticated as uid {} on database '{}'", token.uid, token.database);
                self.state = SessionState::Ready;
                Ok(token)
            }
            Err(err) => {
                if !err.is_transient() {
                    self.state = SessionState::Failed;
                }
                Err(err)
            }
        }
    }

    /// Run `call` and collect every page.
    ///
    /// Pages are fetched at increasing offsets until the server returns an
    /// empty page or says there is nothing more. Transient failures on a page
    /// are retried in place; any failure that survives the retry budget
    /// discards the pages already fetched.
    pub async fn query(&mut self, token: &AuthToken, call: &ReadCall) -> Result<RecordSet> {
        self.expect_state(SessionState::Ready, "query")?;
        self.state = SessionState::Querying;

        match self.collect_pages(token, call).await {
            Ok(records) => {
                self.state = SessionState::Ready;
                Ok(records)
            }
            Err(err) => {
                self.state = SessionState::Failed;
                Err(err)
            }
        }
    }

    async fn collect_pages(&mut self, token: &AuthToken, call: &ReadCall) -> Result<RecordSet> {
        let limit = self.options.page_size.max(1);
        let mut records = RecordSet::default();
        let mut offset = 0;

        loop {
            let page = self.fetch_page(token, call, PageRequest { offset, limit }).await?;
            let fetched = page.records.len();
            debug!(
                "Fetched {fetched} record(s) of {} at offset {offset} from {}",
                call.model, self.address
            );

            records.extend(page.records);
            if fetched == 0 || !page.has_more {
                return Ok(records);
            }
            offset += fetched;
        }
    }

    async fn fetch_page(&mut self, token: &AuthToken, call: &ReadCall, window: PageRequest) -> Result<Page> {
        let policy = self.options.retry;
        let timeout = self.options.timeout;
        let mut attempt = 1;

        loop {
            let channel = self.channel_mut()?;
            let outcome = with_timeout(timeout, "page fetch", channel.call(token, call, window)).await;

            match outcome {
                Ok(page) => return Ok(page),
                Err(err) => {
                    let what = format!("page at offset {}", window.offset);
                    policy.backoff(&what, attempt, err).await?;
                }
            }
            attempt += 1;
        }
    }

    fn expect_state(&self, expected: SessionState, operation: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(OdooTableError::InvalidState(format!(
                "cannot {operation} in state {:?}",
                self.state
            )))
        }
    }

    fn channel_mut(&mut self) -> Result<&mut Box<dyn Channel>> {
        self.channel
            .as_mut()
            .ok_or_else(|| OdooTableError::InvalidState("channel already released".into()))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.channel.take().is_some() {
            debug!("Session to {} released in state {:?}", self.address, self.state);
        }
        self.state = SessionState::Disconnected;
    }
}

/// Bound a transport operation by `timeout`, reporting expiry as a
/// transient connection error.
async fn with_timeout<T>(timeout: Duration, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| OdooTableError::Connection(format!("{what} timed out after {timeout:?}")))?
}
