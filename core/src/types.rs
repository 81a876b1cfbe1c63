//! Response DTOs and query parameters for the document API.
//!
//! # Design
//! Documents stay untyped (`serde_json::Map`): the client only ever looks at
//! `_id` and `_rev`. The envelopes around them are typed so callers do not
//! have to index into `Value`s for `rows`, `id` or `rev`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored document. `_id` and `_rev` are the only reserved keys.
pub type Document = serde_json::Map<String, Value>;

/// Version and build of the service, from `GET /`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub build: String,
}

/// Outcome of a single document write, or one entry of a bulk write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Response of `GET /{db}/_all_docs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllDocsResponse {
    #[serde(default)]
    pub total_rows: u64,
    // Cloudant reports null offsets for some key-filtered queries.
    #[serde(default)]
    pub offset: Option<u64>,
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllDocsRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AllDocsRow {
    /// Revision reported in the row's `value`, if any.
    pub fn rev(&self) -> Option<&str> {
        self.value.as_ref()?.get("rev")?.as_str()
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct BulkDocs<'a> {
    pub docs: &'a [Document],
}

/// Query-string parameters, forwarded in insertion order exactly as given.
///
/// The typed helpers cover the usual `_all_docs` keys; `param` passes
/// anything else through untouched. `startkey`/`endkey` are JSON values on
/// the wire, so the helpers quote them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((name.into(), value.into()));
        self
    }

    pub fn limit(self, limit: u64) -> Self {
        self.param("limit", limit.to_string())
    }

    pub fn skip(self, skip: u64) -> Self {
        self.param("skip", skip.to_string())
    }

    pub fn include_docs(self, include: bool) -> Self {
        self.param("include_docs", include.to_string())
    }

    pub fn start_key(self, key: &str) -> Self {
        self.param("startkey", Value::from(key).to_string())
    }

    pub fn end_key(self, key: &str) -> Self {
        self.param("endkey", Value::from(key).to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// `application/x-www-form-urlencoded` rendering, without the leading `?`.
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}
