//! Stateless HTTP request builder and response parser for the document API.
//!
//! # Design
//! `CloudantClient` holds only configuration and carries no mutable state
//! between calls. Each operation is split into a `build_*` method that
//! produces an `HttpRequest` and a `parse_*` method that consumes an
//! `HttpResponse`. `Cloudant` (see `session`) pairs them with a `Transport`;
//! keeping this half free of I/O makes every URL, header and body checkable
//! in plain unit tests.

use std::collections::BTreeMap;
use std::fmt;

use base64::prelude::*;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{ApplicationError, CloudantError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{AllDocsResponse, BulkDocs, Document, QueryParams, VersionInfo, WriteResult};

/// Characters escaped inside a single path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const DESIGN_PREFIX: &str = "_design/";
const LOCAL_PREFIX: &str = "_local/";

/// Response headers keyed by lower-cased name.
pub type Headers = BTreeMap<String, String>;

/// Synchronous, stateless request builder for the document API.
#[derive(Clone)]
pub struct CloudantClient {
    config: ClientConfig,
    base_url: String,
    authorization: String,
}

// `authorization` encodes the secret; leave it out.
impl fmt::Debug for CloudantClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudantClient")
            .field("config", &self.config)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl CloudantClient {
    pub fn new(config: ClientConfig) -> Self {
        let credentials = format!("{}:{}", config.auth_name, config.auth_secret);
        Self {
            base_url: config.base_url(),
            authorization: format!("Basic {}", BASE64_STANDARD.encode(credentials)),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The bound database, or `NoDatabase`.
    pub fn database(&self) -> Result<&str> {
        self.config.database.as_deref().ok_or(CloudantError::NoDatabase)
    }

    /// An explicit name if given, otherwise the bound database.
    pub fn resolve_database<'a>(&'a self, name: Option<&'a str>) -> Result<&'a str> {
        match name {
            Some(name) => Ok(name),
            None => self.database(),
        }
    }

    // -----------------------------------------------------------------------
    // Generic dispatch
    // -----------------------------------------------------------------------

    /// Build a request for `path` (which starts with `/`, or is empty for the
    /// service root). The body is only attached for POST/PUT/DELETE.
    pub fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<HttpRequest> {
        let body = match body {
            Some(body) if method.accepts_body() => Some(body),
            _ => None,
        };
        let body = body
            .map(serde_json::to_string)
            .transpose()
            .map_err(CloudantError::Serialization)?;
        Ok(self.request_with_body(method, path, body))
    }

    fn request_with_body(&self, method: HttpMethod, path: &str, body: Option<String>) -> HttpRequest {
        let mut headers = vec![("authorization".to_string(), self.authorization.clone())];
        if body.is_some() {
            headers.push(("content-type".to_string(), "application/json".to_string()));
        }
        HttpRequest {
            method,
            url: format!("{}{}", self.base_url, path),
            headers,
            body,
        }
    }

    fn build_json<T: serde::Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        path: &str,
        body: &T,
    ) -> Result<HttpRequest> {
        let body = serde_json::to_string(body).map_err(CloudantError::Serialization)?;
        Ok(self.request_with_body(method, path, Some(body)))
    }

    /// Normalize a JSON response: surface any error document, then enforce a
    /// 2xx status. An empty body parses as `null`.
    pub fn parse_json(&self, response: HttpResponse) -> Result<Value> {
        let value = if response.body.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str::<Value>(&response.body) {
                Ok(value) => value,
                // Proxies answer failures with HTML; report the status instead.
                Err(_) if !response.is_success() => Value::Null,
                Err(e) => return Err(CloudantError::Deserialization(e)),
            }
        };

        let error = application_error(&value);
        if let Some(error) = &error {
            tracing::warn!(
                status = response.status,
                error = %error.error,
                reason = %error.reason,
                "service returned an error document"
            );
        }

        if !response.is_success() {
            return Err(CloudantError::Http {
                status: response.status,
                error,
                body: response.body,
            });
        }
        Ok(value)
    }

    /// HEAD responses carry no body; the result is the header map.
    pub fn parse_headers(&self, response: HttpResponse) -> Result<Headers> {
        check_status(&response)?;
        Ok(response
            .headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect())
    }

    fn parse_as<T: DeserializeOwned>(&self, response: HttpResponse) -> Result<T> {
        let value = self.parse_json(response)?;
        serde_json::from_value(value).map_err(CloudantError::Deserialization)
    }

    // -----------------------------------------------------------------------
    // Server
    // -----------------------------------------------------------------------

    pub fn build_version(&self) -> HttpRequest {
        self.request_with_body(HttpMethod::Get, "", None)
    }

    pub fn parse_version(&self, response: HttpResponse) -> Result<VersionInfo> {
        let value = self.parse_json(response)?;
        let field = |name: &'static str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or(CloudantError::MissingField(name))
        };
        Ok(VersionInfo {
            version: field("version")?,
            build: field("cloudant_build")?,
        })
    }

    pub fn build_list_databases(&self) -> HttpRequest {
        self.request_with_body(HttpMethod::Get, "/_all_dbs", None)
    }

    pub fn parse_list_databases(&self, response: HttpResponse) -> Result<Vec<String>> {
        self.parse_as(response)
    }

    // -----------------------------------------------------------------------
    // Databases
    // -----------------------------------------------------------------------

    pub fn build_create_database(&self, name: Option<&str>) -> Result<HttpRequest> {
        let name = self.resolve_database(name)?;
        Ok(self.request_with_body(HttpMethod::Put, &database_path(name), None))
    }

    pub fn build_delete_database(&self, name: Option<&str>) -> Result<HttpRequest> {
        let name = self.resolve_database(name)?;
        Ok(self.request_with_body(HttpMethod::Delete, &database_path(name), None))
    }

    /// Shared by create and delete: both answer `{"ok": true}`.
    pub fn parse_database_change(&self, response: HttpResponse) -> Result<()> {
        self.parse_json(response)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------------

    /// `POST /{db}` when `key` is `None` (the server assigns the id),
    /// otherwise `PUT /{db}/{key}`. Overwriting needs the current `_rev`
    /// inside `doc`.
    pub fn build_insert_one(&self, doc: &Document, key: Option<&str>) -> Result<HttpRequest> {
        let db = self.database()?;
        match key {
            None => self.build_json(HttpMethod::Post, &database_path(db), doc),
            Some(key) => self.build_json(HttpMethod::Put, &document_path(db, key), doc),
        }
    }

    pub fn build_insert_many(&self, docs: &[Document]) -> Result<HttpRequest> {
        let db = self.database()?;
        let path = format!("{}/_bulk_docs", database_path(db));
        self.build_json(HttpMethod::Post, &path, &BulkDocs { docs })
    }

    pub fn parse_write_result(&self, response: HttpResponse) -> Result<WriteResult> {
        self.parse_as(response)
    }

    /// Per-document outcomes, in request order. Partial failures are left
    /// for the caller to inspect.
    pub fn parse_bulk_results(&self, response: HttpResponse) -> Result<Vec<WriteResult>> {
        self.parse_as(response)
    }

    pub fn build_read_document(&self, key: &str) -> Result<HttpRequest> {
        let db = self.database()?;
        Ok(self.request_with_body(HttpMethod::Get, &document_path(db, key), None))
    }

    pub fn parse_document(&self, response: HttpResponse) -> Result<Document> {
        self.parse_as(response)
    }

    pub fn build_fetch_revision(&self, key: &str) -> Result<HttpRequest> {
        let db = self.database()?;
        Ok(self.request_with_body(HttpMethod::Head, &document_path(db, key), None))
    }

    /// The document's current revision: the ETag with its quotes removed.
    pub fn parse_revision(&self, response: HttpResponse) -> Result<String> {
        let headers = self.parse_headers(response)?;
        let etag = headers.get("etag").ok_or(CloudantError::MissingField("etag"))?;
        Ok(etag.replace('"', ""))
    }

    pub fn build_delete_document(&self, key: &str, rev: &str) -> Result<HttpRequest> {
        let db = self.database()?;
        let query = QueryParams::new().param("rev", rev).to_query_string();
        let path = format!("{}?{query}", document_path(db, key));
        Ok(self.request_with_body(HttpMethod::Delete, &path, None))
    }

    // -----------------------------------------------------------------------
    // Listing and design documents
    // -----------------------------------------------------------------------

    pub fn build_all_docs(&self, name: Option<&str>, params: &QueryParams) -> Result<HttpRequest> {
        let name = self.resolve_database(name)?;
        let mut path = format!("{}/_all_docs", database_path(name));
        if !params.is_empty() {
            path.push('?');
            path.push_str(&params.to_query_string());
        }
        Ok(self.request_with_body(HttpMethod::Get, &path, None))
    }

    pub fn parse_all_docs(&self, response: HttpResponse) -> Result<AllDocsResponse> {
        self.parse_as(response)
    }

    /// `_all_docs` over the `_design` id range with bodies included.
    pub fn build_secondary_indexes(&self) -> Result<HttpRequest> {
        let params = QueryParams::new()
            .start_key("_design")
            .end_key("_design0")
            .include_docs(true);
        self.build_all_docs(None, &params)
    }

    /// Accepts `name` or `_design/name`.
    pub fn build_read_design_document(&self, name: &str) -> Result<HttpRequest> {
        let name = name.strip_prefix(DESIGN_PREFIX).unwrap_or(name);
        self.build_read_document(&format!("{DESIGN_PREFIX}{name}"))
    }
}

fn check_status(response: &HttpResponse) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    Err(CloudantError::Http {
        status: response.status,
        error: None,
        body: response.body.clone(),
    })
}

fn application_error(value: &Value) -> Option<ApplicationError> {
    let error = value.get("error")?;
    Some(ApplicationError {
        error: error.as_str().map_or_else(|| error.to_string(), str::to_string),
        reason: value
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

fn database_path(name: &str) -> String {
    format!("/{}", encode_segment(name))
}

/// Design and local document ids keep the slash after their prefix.
fn document_path(db: &str, id: &str) -> String {
    let id = [DESIGN_PREFIX, LOCAL_PREFIX]
        .into_iter()
        .find_map(|prefix| {
            id.strip_prefix(prefix)
                .map(|rest| format!("{prefix}{}", encode_segment(rest)))
        })
        .unwrap_or_else(|| encode_segment(id));
    format!("{}/{id}", database_path(db))
}
