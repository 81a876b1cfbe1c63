//! Executes `HttpRequest` values against the network.
//!
//! # Design
//! `Transport` is the single I/O seam of the crate. `UreqTransport` is the
//! blocking implementation; it disables ureq's status-as-error behaviour so
//! 4xx/5xx responses come back as data and status interpretation stays in
//! `CloudantClient::parse_*`.

use std::fmt;

use ureq::Agent;

use crate::error::Result;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Performs one HTTP round-trip.
///
/// Implementations return `Ok` for every response that arrived, whatever its
/// status; `Err` means no response was obtained.
pub trait Transport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Blocking transport backed by a pooled `ureq::Agent`.
#[derive(Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }

    /// Use a preconfigured agent (timeouts, proxy, TLS). It must be built
    /// with `http_status_as_error(false)`, otherwise error documents are lost.
    pub fn with_agent(agent: Agent) -> Self {
        Self { agent }
    }
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut response = match (method, body) {
            (HttpMethod::Get, _) => with_headers(self.agent.get(&url), &headers).call()?,
            (HttpMethod::Head, _) => with_headers(self.agent.head(&url), &headers).call()?,
            (HttpMethod::Post, Some(body)) => {
                with_headers(self.agent.post(&url), &headers).send(body.as_bytes())?
            }
            (HttpMethod::Post, None) => with_headers(self.agent.post(&url), &headers).send_empty()?,
            (HttpMethod::Put, Some(body)) => {
                with_headers(self.agent.put(&url), &headers).send(body.as_bytes())?
            }
            (HttpMethod::Put, None) => with_headers(self.agent.put(&url), &headers).send_empty()?,
            (HttpMethod::Delete, Some(body)) => {
                with_headers(self.agent.delete(&url).force_send_body(), &headers)
                    .send(body.as_bytes())?
            }
            (HttpMethod::Delete, None) => with_headers(self.agent.delete(&url), &headers).call()?,
        };

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = if method == HttpMethod::Head {
            String::new()
        } else {
            response.body_mut().read_to_string()?
        };

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}
