//! Client configuration.
//!
//! `ClientConfig` is plain data: credentials, the account whose subdomain
//! hosts the API, and an optional default database. It derives serde traits
//! so applications can load it from whatever source they already use.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_SERVICE_HOST: &str = "cloudant.com";

fn default_service_host() -> String {
    DEFAULT_SERVICE_HOST.to_string()
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub auth_name: String,
    pub auth_secret: String,
    /// Account subdomain. Falls back to `auth_name`; API-key credentials
    /// need it set explicitly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Database used when an operation is not given one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default = "default_service_host")]
    pub service_host: String,
    /// Replaces `https://{account}.{service_host}` entirely, e.g. to reach a
    /// self-hosted CouchDB or the mock server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ClientConfig {
    pub fn new(auth_name: impl Into<String>, auth_secret: impl Into<String>) -> Self {
        Self {
            auth_name: auth_name.into(),
            auth_secret: auth_secret.into(),
            account: None,
            database: None,
            service_host: default_service_host(),
            base_url: None,
        }
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_service_host(mut self, host: impl Into<String>) -> Self {
        self.service_host = host.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// The resolved account name.
    pub fn account(&self) -> &str {
        self.account.as_deref().unwrap_or(&self.auth_name)
    }

    /// Scheme and host every request path is appended to, without a
    /// trailing slash.
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.{}", self.account(), self.service_host),
        }
    }
}

// The secret stays out of logs and panic messages.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("auth_name", &self.auth_name)
            .field("auth_secret", &"<redacted>")
            .field("account", &self.account)
            .field("database", &self.database)
            .field("service_host", &self.service_host)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_defaults_to_auth_name() {
        let config = ClientConfig::new("alice", "s3cret");
        assert_eq!(config.account(), "alice");
        assert_eq!(config.base_url(), "https://alice.cloudant.com");
    }

    #[test]
    fn explicit_account_wins_over_auth_name() {
        let config = ClientConfig::new("apikey-123", "s3cret").with_account("alice");
        assert_eq!(config.account(), "alice");
        assert_eq!(config.base_url(), "https://alice.cloudant.com");
    }

    #[test]
    fn base_url_override_drops_trailing_slash() {
        let config = ClientConfig::new("a", "b").with_base_url("http://127.0.0.1:5984/");
        assert_eq!(config.base_url(), "http://127.0.0.1:5984");
    }

    #[test]
    fn custom_service_host() {
        let config = ClientConfig::new("a", "b").with_service_host("example.net");
        assert_eq!(config.base_url(), "https://a.example.net");
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"auth_name":"alice","auth_secret":"pw","database":"cars"}"#)
                .unwrap();
        assert_eq!(config.account(), "alice");
        assert_eq!(config.database.as_deref(), Some("cars"));
        assert_eq!(config.service_host, DEFAULT_SERVICE_HOST);
    }

    #[test]
    fn debug_redacts_secret() {
        let rendered = format!("{:?}", ClientConfig::new("alice", "hunter2"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
