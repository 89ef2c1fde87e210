//! Request and response shapes exchanged with the transport.

use shared::{ItemKind, MalConfig};

/// HTTP method of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Basic-auth credentials for the service
///
/// The password is kept out of `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One request for the transport
///
/// Query and form values are raw; the transport encodes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub credentials: Option<Credentials>,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            form: Vec::new(),
            credentials: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(url)
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn form(mut self, key: &str, value: impl Into<String>) -> Self {
        self.form.push((key.to_string(), value.into()));
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        lookup(&self.query, key)
    }

    pub fn form_value(&self, key: &str) -> Option<&str> {
        lookup(&self.form, key)
    }
}

fn lookup<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Status and raw body returned by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text; invalid UTF-8 is replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Builds requests for the service's endpoints
#[derive(Debug, Clone)]
pub struct Endpoints {
    base_url: String,
}

impl Endpoints {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &MalConfig) -> Self {
        Self::new(&config.base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The user's list; anonymous
    pub fn list(&self, kind: ItemKind, username: &str, status: &str) -> Request {
        Request::get(format!("{}/malappinfo.php", self.base_url))
            .query("u", username)
            .query("status", status)
            .query("type", kind.as_str())
    }

    pub fn search(&self, kind: ItemKind, terms: &str) -> Request {
        Request::get(format!("{}/api/{}/search.xml", self.base_url, kind))
            .query("q", terms)
    }

    pub fn update(&self, kind: ItemKind, id: u64, body: String) -> Request {
        Request::post(format!("{}/api/{}list/update/{}.xml", self.base_url, kind, id))
            .form("data", body)
    }

    pub fn add(&self, kind: ItemKind, id: u64, body: String) -> Request {
        Request::post(format!("{}/api/{}list/add/{}.xml", self.base_url, kind, id))
            .form("data", body)
    }
}
