//! Blocking client for the Cloudant / CouchDB document API.
//!
//! # Overview
//! `CloudantClient` builds `HttpRequest` values and parses `HttpResponse`
//! values without touching the network (host-does-IO pattern). `Cloudant`
//! pairs it with a `Transport` (ureq by default) and exposes database
//! lifecycle, document CRUD, listing and design-document operations.
//!
//! ```no_run
//! use cloudant::{Cloudant, Document, QueryParams};
//!
//! # fn main() -> cloudant::Result<()> {
//! let db = Cloudant::new("alice", "secret", None, Some("cars"));
//! db.create_database(None)?;
//!
//! let mut car = Document::new();
//! car.insert("make".into(), "Volvo".into());
//! db.insert_one(&car, Some("v70"))?;
//!
//! let rows = db.list_all_documents(None, &QueryParams::new().limit(10))?;
//! db.delete_document("v70", None)?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```
//!
//! # Design
//! - `CloudantClient` holds only configuration; every call is independent.
//! - Database-scoped operations resolve a database name up front and fail
//!   with `CloudantError::NoDatabase` before any request is built.
//! - Error documents are logged through `tracing` and kept on
//!   `CloudantError::Http`.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod transport;
pub mod types;

pub use client::{CloudantClient, Headers};
pub use config::ClientConfig;
pub use error::{ApplicationError, CloudantError, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use session::Cloudant;
pub use transport::{Transport, UreqTransport};
pub use types::{AllDocsResponse, AllDocsRow, Document, QueryParams, VersionInfo, WriteResult};
