//! JSON-RPC transport for Odoo.
//!
//! Every call is a POST of a JSON-RPC 2.0 envelope to `/jsonrpc`, naming a
//! service (`common` or `object`), a method and positional arguments. The
//! server answers with either `result` or an `error` object whose `data`
//! carries the exception name and message.

use std::time::Duration;

use async_trait::async_trait;
use odootable_common::{OdooTableError, Result, Value};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::connection::{AuthToken, Channel, ConnectionSpec, Connector, Page, PageRequest, ReadCall};
use crate::results::Record;

/// Opens one HTTP client per channel, so no connection is ever shared
/// between two sessions.
#[derive(Debug, Clone)]
pub struct JsonRpcConnector {
    timeout: Duration,
}

impl JsonRpcConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Connector for JsonRpcConnector {
    async fn connect(&self, spec: &ConnectionSpec) -> Result<Box<dyn Channel>> {
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .user_agent(format!("odootable/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OdooTableError::Connection(format!("Failed to build HTTP client: {e}")))?;

        let mut channel = JsonRpcChannel {
            http,
            url: format!("{}://{}:{}/jsonrpc", spec.scheme.as_str(), spec.host, spec.port),
            next_id: 0,
        };

        // Reachability probe; also tells us what we are talking to.
        let version = channel.rpc("common", "version", json!([])).await?;
        debug!(
            "Connected to {} (server version {})",
            channel.url,
            version
                .get("server_version")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown")
        );

        Ok(Box::new(channel))
    }
}

struct JsonRpcChannel {
    http: reqwest::Client,
    url: String,
    next_id: u64,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: RpcParams<'a>,
    id: u64,
}

#[derive(Debug, Serialize)]
struct RpcParams<'a> {
    service: &'a str,
    method: &'a str,
    args: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<RpcErrorData>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorData {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl RpcError {
    fn is_access_denied(&self) -> bool {
        self.data
            .as_ref()
            .and_then(|d| d.name.as_deref())
            .is_some_and(|name| name.ends_with("AccessDenied"))
    }

    /// The server's own explanation, verbatim.
    fn into_remote(self) -> OdooTableError {
        let message = self
            .data
            .and_then(|d| d.message)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.message);
        OdooTableError::Remote {
            code: self.code,
            message,
        }
    }
}

impl JsonRpcChannel {
    async fn rpc(&mut self, service: &str, method: &str, args: serde_json::Value) -> Result<serde_json::Value> {
        match self.rpc_raw(service, method, args).await? {
            Ok(result) => Ok(result),
            Err(error) => Err(error.into_remote()),
        }
    }

    /// Send one envelope; the inner `Err` is an error reported by the server.
    async fn rpc_raw(
        &mut self,
        service: &str,
        method: &str,
        args: serde_json::Value,
    ) -> Result<std::result::Result<serde_json::Value, RpcError>> {
        self.next_id += 1;
        let request = RpcRequest {
            jsonrpc: "2.0",
            method: "call",
            params: RpcParams { service, method, args },
            id: self.next_id,
        };

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(OdooTableError::Connection(format!("HTTP {status} from {}", self.url)));
        }
        if !status.is_success() {
            return Err(OdooTableError::Remote {
                code: i64::from(status.as_u16()),
                message: format!("HTTP {status} from {}", self.url),
            });
        }

        let body: RpcResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                OdooTableError::Protocol(format!("Invalid JSON-RPC response: {e}"))
            } else {
                transport_error(e)
            }
        })?;

        match (body.result, body.error) {
            (_, Some(error)) => Ok(Err(error)),
            (Some(result), None) => Ok(Ok(result)),
            (None, None) => Ok(Ok(serde_json::Value::Null)),
        }
    }
}

fn transport_error(err: reqwest::Error) -> OdooTableError {
    if err.is_timeout() {
        OdooTableError::Connection(format!("Request timed out: {err}"))
    } else {
        OdooTableError::Connection(format!("Request failed: {err}"))
    }
}

#[async_trait]
impl Channel for JsonRpcChannel {
    async fn authenticate(&mut self, database: &str, login: &str, password: &str) -> Result<AuthToken> {
        let uid = match self
            .rpc_raw("common", "login", json!([database, login, password]))
            .await?
        {
            Ok(result) => result.as_i64(),
            Err(error) if error.is_access_denied() => None,
            Err(error) => return Err(error.into_remote()),
        };

        let Some(uid) = uid.filter(|uid| *uid > 0) else {
            return Err(OdooTableError::Auth(format!(
                "invalid credentials for '{login}' on database '{database}'"
            )));
        };

        let context = self
            .rpc(
                "object",
                "execute_kw",
                json!([database, uid, password, "res.users", "context_get", []]),
            )
            .await?;

        Ok(AuthToken::new(database, uid, password, Value::from(context)))
    }

    async fn call(&mut self, token: &AuthToken, call: &ReadCall, page: PageRequest) -> Result<Page> {
        let kwargs = json!({
            "fields": call.fields,
            "offset": page.offset,
            "limit": page.limit,
            "context": serde_json::Value::from(&token.context),
        });
        let result = self
            .rpc(
                "object",
                "execute_kw",
                json!([
                    token.database,
                    token.uid,
                    token.secret(),
                    call.model,
                    "search_read",
                    [call.domain],
                    kwargs
                ]),
            )
            .await?;

        let serde_json::Value::Array(rows) = result else {
            return Err(OdooTableError::Protocol(format!(
                "search_read on {} returned a non-list result",
                call.model
            )));
        };

        let records = rows
            .into_iter()
            .map(Record::from_json)
            .collect::<Result<Vec<_>>>()?;

        // Servers may cap a page below `limit`, so only an empty page ends the read.
        Ok(Page {
            has_more: !records.is_empty(),
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use crate::{ClientOptions, QueryClient, ReadCall, Scheme};

    /// A JSON-RPC server holding `records` that never returns more than
    /// `cap` rows per `search_read`. Returns its port and a read counter.
    async fn capped_server(records: Vec<serde_json::Value>, cap: usize) -> (u16, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let reads = Arc::new(AtomicUsize::new(0));
        let records = Arc::new(records);

        let counter = Arc::clone(&reads);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, Arc::clone(&records), cap, Arc::clone(&counter)));
            }
        });
        (port, reads)
    }

    async fn serve(mut stream: TcpStream, records: Arc<Vec<serde_json::Value>>, cap: usize, reads: Arc<AtomicUsize>) {
        let mut buf = Vec::new();
        loop {
            let header_end = loop {
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
                if !read_more(&mut stream, &mut buf).await {
                    return;
                }
            };
            let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
            let length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while buf.len() < header_end + length {
                if !read_more(&mut stream, &mut buf).await {
                    return;
                }
            }

            let request: serde_json::Value = serde_json::from_slice(&buf[header_end..header_end + length]).unwrap();
            buf.drain(..header_end + length);

            let body = json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "result": answer(&request["params"], &records, cap, &reads),
            })
            .to_string();
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            );
            if stream.write_all(response.as_bytes()).await.is_err() {
                return;
            }
        }
    }

    async fn read_more(stream: &mut TcpStream, buf: &mut Vec<u8>) -> bool {
        let mut chunk = [0u8; 4096];
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => false,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                true
            }
        }
    }

    fn answer(params: &serde_json::Value, records: &[serde_json::Value], cap: usize, reads: &AtomicUsize) -> serde_json::Value {
        match (params["service"].as_str(), params["method"].as_str()) {
            (Some("common"), Some("version")) => json!({"server_version": "17.0"}),
            (Some("common"), Some("login")) => json!(2),
            _ if params["args"][4] == "search_read" => {
                reads.fetch_add(1, Ordering::SeqCst);
                let kwargs = &params["args"][6];
                let offset = kwargs["offset"].as_u64().unwrap_or(0) as usize;
                let limit = kwargs["limit"].as_u64().unwrap_or(0) as usize;
                json!(records.iter().skip(offset).take(limit.min(cap)).collect::<Vec<_>>())
            }
            _ => json!({"lang": "en_US"}),
        }
    }

    #[tokio::test]
    async fn test_page_cap_below_limit_reads_every_record() {
        let rows = (1..=5)
            .map(|id| json!({"id": id, "name": format!("Partner {id}")}))
            .collect();
        let (port, reads) = capped_server(rows, 2).await;

        let client = QueryClient::new(
            Arc::new(JsonRpcConnector::new(Duration::from_secs(5))),
            ClientOptions {
                page_size: 4,
                ..ClientOptions::default()
            },
        );
        let spec = ConnectionSpec::new(Scheme::Http, "127.0.0.1", port, "prod", "admin", "secret");
        let call = ReadCall {
            model: "res.partner".into(),
            domain: Vec::new(),
            fields: vec!["id".into(), "name".into()],
        };

        let records = client.fetch(&spec, &call).await.unwrap();

        let ids: Vec<i64> = records.iter().filter_map(|r| r.get("id").and_then(Value::as_i64)).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        // 2 + 2 + 1, then the empty page that ends the read.
        assert_eq!(reads.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_request_envelope_shape() {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method: "call",
            params: RpcParams {
                service: "common",
                method: "login",
                args: json!(["prod", "admin", "secret"]),
            },
            id: 1,
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "jsonrpc": "2.0",
                "method": "call",
                "params": {"service": "common", "method": "login", "args": ["prod", "admin", "secret"]},
                "id": 1
            })
        );
    }

    #[test]
    fn test_server_error_message_passed_verbatim() {
        let body: RpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "error": {
                "code": 200,
                "message": "Odoo Server Error",
                "data": {
                    "name": "builtins.ValueError",
                    "message": "Invalid field 'emial' on model 'res.partner'"
                }
            }
        }))
        .unwrap();

        let err = body.error.unwrap().into_remote();
        assert_eq!(
            err,
            OdooTableError::Remote {
                code: 200,
                message: "Invalid field 'emial' on model 'res.partner'".into()
            }
        );
    }

    #[test]
    fn test_access_denied_detected() {
        let error: RpcError = serde_json::from_value(json!({
            "code": 200,
            "message": "Odoo Server Error",
            "data": {"name": "odoo.exceptions.AccessDenied", "message": "Access Denied"}
        }))
        .unwrap();
        assert!(error.is_access_denied());
    }

    #[test]
    fn test_error_without_data_uses_top_level_message() {
        let error: RpcError = serde_json::from_value(json!({"code": 404, "message": "Not Found"})).unwrap();
        assert_eq!(error.into_remote().message(), "Not Found");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connection_error() {
        let connector = JsonRpcConnector::new(Duration::from_millis(500));
        let spec = ConnectionSpec::new(Scheme::Http, "127.0.0.1", 9, "prod", "admin", "secret");

        let err = match connector.connect(&spec).await {
            Ok(_) => panic!("expected connect to fail"),
            Err(e) => e,
        };
        assert!(err.is_transient(), "unexpected error: {err:?}");
    }
}
