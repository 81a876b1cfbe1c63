//! Blocking client: `CloudantClient` paired with a `Transport`.
//!
//! # Design
//! Every public operation builds its request(s) with `CloudantClient`, runs
//! them through `send`, and hands the response back to the matching
//! `parse_*`. Nothing is retried and nothing is cached; each call is an
//! independent request. `delete_document` without a revision is the only
//! two-request operation (HEAD for the ETag, then DELETE), and the two are
//! not atomic: a concurrent writer turns the DELETE into a 409.

use serde_json::Value;

use crate::client::{CloudantClient, Headers};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::transport::{Transport, UreqTransport};
use crate::types::{AllDocsResponse, Document, QueryParams, VersionInfo, WriteResult};

/// Client for one Cloudant account.
#[derive(Debug, Clone)]
pub struct Cloudant<T = UreqTransport> {
    client: CloudantClient,
    transport: T,
}

impl Cloudant<UreqTransport> {
    /// `account` defaults to `auth_name`; `database` becomes the default for
    /// database-scoped operations.
    pub fn new(
        auth_name: &str,
        auth_secret: &str,
        account: Option<&str>,
        database: Option<&str>,
    ) -> Self {
        let mut config = ClientConfig::new(auth_name, auth_secret);
        config.account = account.map(str::to_string);
        config.database = database.map(str::to_string);
        Self::from_config(config)
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self::with_transport(config, UreqTransport::new())
    }
}

impl<T: Transport> Cloudant<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self {
            client: CloudantClient::new(config),
            transport,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        self.client.config()
    }

    /// The bound database, or `CloudantError::NoDatabase`.
    pub fn database(&self) -> Result<&str> {
        self.client.database()
    }

    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        tracing::debug!(method = %request.method, url = %request.url, "cloudant request");
        self.transport.execute(request)
    }

    // -----------------------------------------------------------------------
    // Generic verbs
    // -----------------------------------------------------------------------

    /// Dispatch `method` on `path`. HEAD yields the response headers as a
    /// JSON object; every other method yields the parsed body.
    pub fn request(&self, method: HttpMethod, path: &str, body: Option<&Value>) -> Result<Value> {
        let request = self.client.build_request(method, path, body)?;
        let response = self.send(request)?;
        if method == HttpMethod::Head {
            let headers = self.client.parse_headers(response)?;
            return Ok(Value::Object(
                headers.into_iter().map(|(k, v)| (k, Value::String(v))).collect(),
            ));
        }
        self.client.parse_json(response)
    }

    pub fn get(&self, path: &str) -> Result<Value> {
        self.request(HttpMethod::Get, path, None)
    }

    pub fn post(&self, path: &str, body: Option<&Value>) -> Result<Value> {
        self.request(HttpMethod::Post, path, body)
    }

    pub fn put(&self, path: &str, body: Option<&Value>) -> Result<Value> {
        self.request(HttpMethod::Put, path, body)
    }

    pub fn delete(&self, path: &str, body: Option<&Value>) -> Result<Value> {
        self.request(HttpMethod::Delete, path, body)
    }

    pub fn head(&self, path: &str) -> Result<Headers> {
        let request = self.client.build_request(HttpMethod::Head, path, None)?;
        let response = self.send(request)?;
        self.client.parse_headers(response)
    }

    // -----------------------------------------------------------------------
    // Server and databases
    // -----------------------------------------------------------------------

    pub fn version(&self) -> Result<VersionInfo> {
        let response = self.send(self.client.build_version())?;
        self.client.parse_version(response)
    }

    pub fn list_databases(&self) -> Result<Vec<String>> {
        let response = self.send(self.client.build_list_databases())?;
        self.client.parse_list_databases(response)
    }

    pub fn create_database(&self, name: Option<&str>) -> Result<()> {
        let request = self.client.build_create_database(name)?;
        self.client.parse_database_change(self.send(request)?)
    }

    pub fn delete_database(&self, name: Option<&str>) -> Result<()> {
        let request = self.client.build_delete_database(name)?;
        self.client.parse_database_change(self.send(request)?)
    }

    // -----------------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------------

    pub fn insert_one(&self, doc: &Document, key: Option<&str>) -> Result<WriteResult> {
        let request = self.client.build_insert_one(doc, key)?;
        self.client.parse_write_result(self.send(request)?)
    }

    pub fn insert_many(&self, docs: &[Document]) -> Result<Vec<WriteResult>> {
        let request = self.client.build_insert_many(docs)?;
        self.client.parse_bulk_results(self.send(request)?)
    }

    pub fn read_document(&self, key: &str) -> Result<Document> {
        let request = self.client.build_read_document(key)?;
        self.client.parse_document(self.send(request)?)
    }

    /// Current revision of `key`, from a HEAD request.
    pub fn fetch_revision(&self, key: &str) -> Result<String> {
        let request = self.client.build_fetch_revision(key)?;
        self.client.parse_revision(self.send(request)?)
    }

    /// Delete `key` at `rev`, or at its current revision when `rev` is `None`.
    pub fn delete_document(&self, key: &str, rev: Option<&str>) -> Result<WriteResult> {
        let rev = match rev {
            Some(rev) => rev.to_string(),
            None => {
                let rev = self.fetch_revision(key)?;
                tracing::debug!(key, rev = %rev, "resolved current revision");
                rev
            }
        };
        let request = self.client.build_delete_document(key, &rev)?;
        self.client.parse_write_result(self.send(request)?)
    }

    // -----------------------------------------------------------------------
    // Listing and design documents
    // -----------------------------------------------------------------------

    pub fn list_all_documents(
        &self,
        name: Option<&str>,
        params: &QueryParams,
    ) -> Result<AllDocsResponse> {
        let request = self.client.build_all_docs(name, params)?;
        self.client.parse_all_docs(self.send(request)?)
    }

    /// Design documents of the bound database, bodies included.
    pub fn secondary_indexes(&self) -> Result<AllDocsResponse> {
        let request = self.client.build_secondary_indexes()?;
        self.client.parse_all_docs(self.send(request)?)
    }

    pub fn read_design_document(&self, name: &str) -> Result<Document> {
        let request = self.client.build_read_design_document(name)?;
        self.client.parse_document(self.send(request)?)
    }
}
