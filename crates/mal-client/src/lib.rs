//! Synchronous client library for the MyAnimeList catalog service.
//!
//! This library parses the service's XML list and search feeds into typed
//! records, renders records back into update bodies, and keeps the results
//! in thread-safe ordered collections behind a blocking client.

pub mod api;
pub mod cache;
pub mod deserializer;
pub mod error;
pub mod fields;
pub mod lock;
pub mod notify;
pub mod serializer;
pub mod store;
pub mod text;
pub mod tokens;

pub use api::{Credentials, FetchReport, HttpTransport, MalClient, Request, Response, Transport};
pub use cache::{CacheStats, ResponseCache};
pub use deserializer::{Deserialized, Diagnostic, ItemDeserializer};
pub use error::{ClientError, Result};
pub use fields::{FieldTable, FieldTag};
pub use lock::{LockBridge, ResourceKind};
pub use notify::{Event, Observers, EVENT_BUFFER};
pub use serializer::serialize;
pub use store::{ApplyMode, CatalogStore, Collection};
pub use text::{TextCleaner, Verbatim};
pub use tokens::{NodeKind, Token, XmlTokens};
