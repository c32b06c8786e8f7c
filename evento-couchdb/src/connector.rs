use crate::{
    client::{Client, Method, Request, Response, TransportError},
    config::ConnectionSettings,
};

/// Read-only handle on one database: a client plus its connection settings.
///
/// Cloning is cheap enough to hand one copy to each adapter.
#[derive(Clone)]
pub struct CouchDbConnector {
    client: Box<dyn Client>,
    settings: ConnectionSettings,
}

impl CouchDbConnector {
    pub fn new<C: Client + 'static>(client: C, settings: ConnectionSettings) -> Self {
        Self {
            client: Box::new(client),
            settings,
        }
    }

    /// Builds an HTTP connector from configuration.
    #[cfg(feature = "http")]
    pub fn connect(settings: ConnectionSettings) -> Self {
        let client = crate::client::UreqClient::new(&settings);
        Self::new(client, settings)
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn database(&self) -> &str {
        &self.settings.database
    }

    /// Request addressed to `/{database}/{identifier}`.
    ///
    /// `_design/` and `_local/` identifiers keep their slash as a path separator.
    pub fn document_request(&self, method: Method, identifier: &str) -> Request {
        let mut segments = vec![self.settings.database.to_owned()];

        match identifier.split_once('/') {
            Some((prefix @ ("_design" | "_local"), name)) => {
                segments.push(prefix.to_owned());
                segments.push(name.to_owned());
            }
            _ => segments.push(identifier.to_owned()),
        }

        Request::new(method, segments)
    }

    pub fn database_request(&self, method: Method) -> Request {
        Request::new(method, [self.settings.database.to_owned()])
    }

    pub fn send(&self, request: Request) -> Result<Response, TransportError> {
        tracing::debug!("{} {}", request.method.as_str(), request.path());

        let response = self.client.send(request)?;

        tracing::debug!("responded with status {}", response.status);

        Ok(response)
    }
}
