//! Transport abstraction and the default blocking HTTP transport.

use super::types::{Method, Request, Response};
use crate::error::Result;
use crate::lock::{LockBridge, ResourceKind};
use reqwest::blocking::{Client, RequestBuilder};
use shared::MalConfig;
use std::time::Duration;
use tracing::debug;

/// Executes requests against the shared connection context
///
/// Implementations take a resource kind from `locks` only while they read or
/// write that part of the shared handle, never across network I/O.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &Request, locks: &LockBridge) -> Result<Response>;
}

const AUTHENTICATED_RESOURCES: &[ResourceKind] = &[ResourceKind::Share, ResourceKind::Cookie];
const ANONYMOUS_RESOURCES: &[ResourceKind] = &[ResourceKind::Share];

/// `reqwest` transport shared by every request of a client
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &MalConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.as_str())
            .gzip(true)
            .build()?;

        Ok(Self { client })
    }

    /// Resource kinds held while a request is prepared on the shared handle
    pub fn resources(request: &Request) -> &'static [ResourceKind] {
        if request.is_authenticated() {
            AUTHENTICATED_RESOURCES
        } else {
            ANONYMOUS_RESOURCES
        }
    }

    /// Build a request on the shared client handle
    fn prepare(&self, request: &Request) -> RequestBuilder {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }
        if let Some(credentials) = &request.credentials {
            builder = builder.basic_auth(&credentials.username, Some(&credentials.password));
        }
        builder
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: &Request, locks: &LockBridge) -> Result<Response> {
        let builder = {
            let _held = locks.acquire(Self::resources(request))?;
            self.prepare(request)
        };

        debug!(url = %request.url, method = ?request.method, "Sending request");

        let response = builder.send()?;
        let status = response.status().as_u16();
        let body = response.bytes()?.to_vec();

        debug!(url = %request.url, status, bytes = body.len(), "Response received");
        Ok(Response { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::Credentials;

    #[test]
    fn test_client_creation() {
        let transport = HttpTransport::new(&MalConfig::default());
        assert!(transport.is_ok());
    }

    #[test]
    fn test_resources_by_authentication() {
        let anonymous = Request::get("https://example.test/image.jpg");
        let authenticated = Request::get("https://example.test/api/anime/search.xml")
            .credentials(Credentials::new("someone", "secret"));

        assert_eq!(HttpTransport::resources(&anonymous), ANONYMOUS_RESOURCES);
        assert_eq!(HttpTransport::resources(&authenticated), AUTHENTICATED_RESOURCES);
    }

}
