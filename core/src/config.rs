//! Block configuration.
//!
//! Turns the raw key/value mapping of one table block into an immutable
//! [`QueryRequest`]. Defaults are filled in first (`database` from the url,
//! `port` 80), then every key is checked. Document-wide defaults are merged
//! in by [`GlobalOptions`] before validation.

use std::collections::HashSet;

use odootable_client::{ConnectionSpec, DEFAULT_PORT, ReadCall, Scheme};
use odootable_common::{OdooTableError, Result, Value};
use serde_json::Map;
use tracing::debug;

use crate::filter::{FilterNode, FilterParser};

/// Raw configuration of one block, as handed over by the document parser.
pub type RawBlock = Map<String, serde_json::Value>;

/// Keys inherited from the generic table-filter convention that this filter
/// accepts and never acts on.
pub const INERT_KEYS: &[&str] = &["include", "include-encoding", "csv-kwargs"];

/// Keys meant for the renderer; carried through untouched.
pub const PRESENTATION_KEYS: &[&str] = &[
    "caption",
    "alignment",
    "width",
    "table-width",
    "header",
    "markdown",
    "pipe_tables",
    "grid_tables",
    "raw_markdown",
];

const QUERY_KEYS: &[&str] = &[
    "url", "database", "port", "model", "domain", "fields", "login", "password", "protocol",
];

/// Everything needed to run one read, validated.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub connection: ConnectionSpec,
    pub model: String,
    /// `None` matches every record.
    pub filter: Option<FilterNode>,
    pub fields: Vec<String>,
}

impl QueryRequest {
    /// The call sent to the server for every page.
    pub fn read_call(&self) -> ReadCall {
        ReadCall {
            model: self.model.clone(),
            domain: self
                .filter
                .as_ref()
                .map(FilterNode::to_prefix)
                .unwrap_or_default(),
            fields: self.fields.clone(),
        }
    }
}

/// A validated block: the query plus whatever the renderer should see.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSpec {
    pub request: QueryRequest,
    pub presentation: RawBlock,
}

/// Validate a raw block with the standard filter parser.
pub fn validate(raw: &RawBlock) -> Result<QueryRequest> {
    validate_with(raw, &FilterParser::default())
}

/// Validate a raw block, parsing its domain with `parser`.
pub fn validate_with(raw: &RawBlock, parser: &FilterParser) -> Result<QueryRequest> {
    let url = required_str(raw, "url")?;
    let (scheme, host) = split_url(url)?;
    let scheme = resolve_scheme(raw, scheme)?;

    let database = match optional_str(raw, "database")? {
        Some(database) => database.to_string(),
        None => host.clone(),
    };
    let port = parse_port(raw.get("port"))?;
    let model = required_str(raw, "model")?.to_string();
    let fields = parse_fields(raw.get("fields"))?;
    let filter = parse_domain(raw.get("domain"), parser)?;
    let login = required_str(raw, "login")?;
    let password = required_str(raw, "password")?;

    Ok(QueryRequest {
        connection: ConnectionSpec::new(scheme, host, port, database, login, password),
        model,
        filter,
        fields,
    })
}

/// Validate a block and split off its presentation keys.
pub fn parse_block(raw: &RawBlock, parser: &FilterParser) -> Result<BlockSpec> {
    let request = validate_with(raw, parser)?;
    let mut presentation = RawBlock::new();

    for (key, value) in raw {
        if PRESENTATION_KEYS.contains(&key.as_str()) {
            presentation.insert(key.clone(), value.clone());
        } else if INERT_KEYS.contains(&key.as_str()) {
            debug!("Ignoring '{key}': external content is not read by odootable blocks");
        } else if !QUERY_KEYS.contains(&key.as_str()) {
            debug!("Ignoring unknown block key '{key}'");
        }
    }

    Ok(BlockSpec {
        request,
        presentation,
    })
}

fn optional_str<'a>(raw: &'a RawBlock, key: &str) -> Result<Option<&'a str>> {
    match raw.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => {
            Err(OdooTableError::config(key, "must not be empty"))
        }
        Some(serde_json::Value::String(s)) => Ok(Some(s.trim())),
        Some(other) => Err(OdooTableError::config(key, format!("expected a string, got {other}"))),
    }
}

fn required_str<'a>(raw: &'a RawBlock, key: &str) -> Result<&'a str> {
    optional_str(raw, key)?.ok_or_else(|| OdooTableError::config(key, "is required"))
}

/// Split an optional `http://`/`https://` prefix off the url.
fn split_url(url: &str) -> Result<(Option<Scheme>, String)> {
    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => match scheme.to_ascii_lowercase().as_str() {
            "http" => (Some(Scheme::Http), rest),
            "https" => (Some(Scheme::Https), rest),
            other => {
                return Err(OdooTableError::config("url", format!("unsupported scheme '{other}'")));
            }
        },
        None => (None, url),
    };

    let host = rest.trim_end_matches('/');
    if host.is_empty() || host.contains('/') {
        return Err(OdooTableError::config(
            "url",
            format!("expected a host name, got '{url}'"),
        ));
    }
    Ok((scheme, host.to_string()))
}

/// `protocol: jsonrpc | jsonrpcs`, reconciled with a scheme given in the url.
fn resolve_scheme(raw: &RawBlock, from_url: Option<Scheme>) -> Result<Scheme> {
    let from_protocol = match optional_str(raw, "protocol")? {
        None => None,
        Some(p) if p.eq_ignore_ascii_case("jsonrpc") => Some(Scheme::Http),
        Some(p) if p.eq_ignore_ascii_case("jsonrpcs") => Some(Scheme::Https),
        Some(p) => {
            return Err(OdooTableError::config(
                "protocol",
                format!("expected 'jsonrpc' or 'jsonrpcs', got '{p}'"),
            ));
        }
    };

    match (from_url, from_protocol) {
        (Some(a), Some(b)) if a != b => Err(OdooTableError::config(
            "protocol",
            format!("conflicts with the {} scheme in 'url'", a.as_str()),
        )),
        (a, b) => Ok(a.or(b).unwrap_or_default()),
    }
}

fn parse_port(raw: Option<&serde_json::Value>) -> Result<u16> {
    let invalid = |detail: String| OdooTableError::config("port", detail);

    let port = match raw {
        None | Some(serde_json::Value::Null) => return Ok(DEFAULT_PORT),
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| invalid(format!("expected a positive integer, got {n}")))?,
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| invalid(format!("expected a positive integer, got '{s}'")))?,
        Some(other) => return Err(invalid(format!("expected a positive integer, got {other}"))),
    };

    match u16::try_from(port) {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(invalid(format!("{port} is outside 1..=65535"))),
    }
}

fn parse_fields(raw: Option<&serde_json::Value>) -> Result<Vec<String>> {
    let items = match raw {
        None | Some(serde_json::Value::Null) => return Err(OdooTableError::config("fields", "is required")),
        Some(serde_json::Value::Array(items)) => items,
        Some(other) => {
            return Err(OdooTableError::config(
                "fields",
                format!("expected a list of field names, got {other}"),
            ));
        }
    };

    if items.is_empty() {
        return Err(OdooTableError::config("fields", "must name at least one field"));
    }

    let mut seen = HashSet::with_capacity(items.len());
    let mut fields = Vec::with_capacity(items.len());
    for item in items {
        let name = match item.as_str().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Err(OdooTableError::config(
                    "fields",
                    format!("expected a field name, got {item}"),
                ));
            }
        };
        if !seen.insert(name) {
            return Err(OdooTableError::config("fields", format!("duplicate field '{name}'")));
        }
        fields.push(name.to_string());
    }
    Ok(fields)
}

fn parse_domain(raw: Option<&serde_json::Value>, parser: &FilterParser) -> Result<Option<FilterNode>> {
    match raw {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Array(items)) if items.is_empty() => Ok(None),
        Some(serde_json::Value::Array(items)) => parser.parse(items).map(Some),
        Some(other) => Err(OdooTableError::MalformedFilter(format!(
            "domain must be a list, got {other}"
        ))),
    }
}

/// Document-wide defaults for every block (the `odootable` metadata entry).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalOptions {
    options: RawBlock,
}

const INHERITED_KEYS: &[&str] = &["port", "login", "password", "model", "fields", "protocol"];

impl GlobalOptions {
    pub fn new(options: RawBlock) -> Self {
        Self { options }
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Fill in what `block` leaves out.
    ///
    /// Block keys always win. A block that names its own `url` but no
    /// `database` keeps defaulting the database to its own url; a block that
    /// inherits the url inherits the global database too. The global domain
    /// is appended to the block's, with numeric strings turned into numbers
    /// since metadata values arrive as text.
    pub fn apply(&self, block: &RawBlock) -> RawBlock {
        let mut merged = block.clone();

        if !merged.contains_key("url")
            && let Some(url) = self.options.get("url")
        {
            merged.insert("url".into(), url.clone());
            if !merged.contains_key("database")
                && let Some(database) = self.options.get("database").or(Some(url))
            {
                merged.insert("database".into(), database.clone());
            }
        }

        for key in INHERITED_KEYS {
            if !merged.contains_key(*key)
                && let Some(value) = self.options.get(*key)
            {
                merged.insert((*key).into(), value.clone());
            }
        }

        if let Some(serde_json::Value::Array(global_domain)) = self.options.get("domain") {
            let mut domain = match merged.remove("domain") {
                Some(serde_json::Value::Array(items)) => items,
                Some(serde_json::Value::Null) | None => Vec::new(),
                Some(other) => {
                    // Leave a malformed block domain for validation to report.
                    merged.insert("domain".into(), other);
                    return merged;
                }
            };
            domain.extend(global_domain.iter().map(coerce_domain_element));
            debug!("Combined domain: {}", serde_json::Value::Array(domain.clone()));
            merged.insert("domain".into(), serde_json::Value::Array(domain));
        }

        merged
    }
}

fn coerce_domain_element(element: &serde_json::Value) -> serde_json::Value {
    match element.as_array().map(Vec::as_slice) {
        Some([field, operator, value]) => serde_json::Value::Array(vec![
            field.clone(),
            operator.clone(),
            serde_json::Value::from(&Value::from(value.clone()).coerce_numeric()),
        ]),
        _ => element.clone(),
    }
}
