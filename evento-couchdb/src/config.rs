//! Connection and storage settings.
//!
//! [`ConnectionSettings`] describes how to reach the server and which database
//! to use. It deserializes from any serde format so it can live in the
//! application's configuration file. [`StorageSettings`] names the design
//! document and view backing commit stream loads.

use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

/// Default design document holding the commit stream view
pub const DEFAULT_DESIGN_DOC: &str = "event_store";

/// Default view indexing commits by `[streamId, sequence]`
pub const DEFAULT_VIEW_NAME: &str = "commit_stream";

/// Upper bound on rows fetched by a single stream load
///
/// Acts as a soft cap: a stream longer than this only returns its most recent
/// commits. Raise it, or load ranges, until snapshots are available.
pub const DEFAULT_PAGE_LIMIT: u32 = 5000;

pub const DEFAULT_SCHEME: &str = "http";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5984;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Headers sent with every request
    pub default_headers: BTreeMap<String, String>,
    /// Query parameters appended to every request
    pub default_query: BTreeMap<String, String>,
    pub timeout_secs: Option<u64>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_owned(),
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            database: String::default(),
            username: None,
            password: None,
            default_headers: BTreeMap::new(),
            default_query: BTreeMap::new(),
            timeout_secs: None,
        }
    }
}

impl ConnectionSettings {
    pub fn builder(database: impl Into<String>) -> SettingsBuilder {
        SettingsBuilder::new(database)
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some((username.as_str(), password.as_str())),
            _ => None,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Fluent builder for [`ConnectionSettings`]
#[derive(Debug)]
pub struct SettingsBuilder {
    settings: ConnectionSettings,
}

impl SettingsBuilder {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            settings: ConnectionSettings {
                database: database.into(),
                ..ConnectionSettings::default()
            },
        }
    }

    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.settings.scheme = scheme.into();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.settings.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.settings.port = port;
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.settings.username = Some(username.into());
        self.settings.password = Some(password.into());
        self
    }

    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings
            .default_headers
            .insert(name.into(), value.into());
        self
    }

    pub fn default_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.default_query.insert(name.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout_secs = Some(timeout.as_secs());
        self
    }

    pub fn build(self) -> ConnectionSettings {
        self.settings
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub design_doc: String,
    pub view_name: String,
    pub limit: u32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            design_doc: DEFAULT_DESIGN_DOC.to_owned(),
            view_name: DEFAULT_VIEW_NAME.to_owned(),
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl StorageSettings {
    pub fn new(design_doc: impl Into<String>) -> Self {
        Self {
            design_doc: design_doc.into(),
            ..Self::default()
        }
    }

    pub fn view_name(mut self, view_name: impl Into<String>) -> Self {
        self.view_name = view_name.into();
        self
    }

    /// Sets the page limit. Zero is raised to one.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Effective page limit, never zero even when deserialized as such.
    pub fn page_limit(&self) -> u32 {
        self.limit.max(1)
    }
}
