//! Catalog service client.
//!
//! [`MalClient`] ties request building, the transport, the deserializer and
//! the store together. [`Transport`] is the seam for anything that can carry
//! a request; [`HttpTransport`] is the default.

pub mod client;
pub mod transport;
pub mod types;

pub use client::{FetchReport, MalClient};
pub use transport::{HttpTransport, Transport};
pub use types::{Credentials, Endpoints, Method, Request, Response};
