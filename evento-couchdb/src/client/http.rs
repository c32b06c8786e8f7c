use base64::Engine as _;

use crate::{
    client::{Client, Request, Response, TransportError},
    config::ConnectionSettings,
};

/// Blocking HTTP transport backed by a shared `ureq` agent.
#[derive(Clone)]
pub struct UreqClient {
    agent: ureq::Agent,
    base_url: String,
    authorization: Option<String>,
    default_headers: Vec<(String, String)>,
    default_query: Vec<(String, String)>,
}

impl UreqClient {
    pub fn new(settings: &ConnectionSettings) -> Self {
        let mut builder = ureq::AgentBuilder::new();

        if let Some(timeout) = settings.timeout() {
            builder = builder.timeout(timeout);
        }

        let authorization = settings.credentials().map(|(username, password)| {
            let token = base64::engine::general_purpose::STANDARD
                .encode(format!("{username}:{password}"));
            format!("Basic {token}")
        });

        Self {
            agent: builder.build(),
            base_url: settings.base_url(),
            authorization,
            default_headers: settings
                .default_headers
                .iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
            default_query: settings
                .default_query
                .iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
        }
    }

    fn url(&self, request: &Request) -> String {
        let path = request
            .segments
            .iter()
            .map(|segment| encode_segment(segment))
            .collect::<Vec<_>>()
            .join("/");

        format!("{}/{path}", self.base_url)
    }
}

impl Client for UreqClient {
    fn send(&self, request: Request) -> Result<Response, TransportError> {
        let url = self.url(&request);
        let mut req = self
            .agent
            .request(request.method.as_str(), &url)
            .set("Accept", "application/json");

        for (name, value) in &self.default_headers {
            req = req.set(name, value);
        }

        if let Some(authorization) = &self.authorization {
            req = req.set("Authorization", authorization);
        }

        for (name, value) in self.default_query.iter().chain(request.query.iter()) {
            req = req.query(name, value);
        }

        let result = match &request.body {
            Some(body) => req
                .set("Content-Type", "application/json")
                .send_string(&body.to_string()),
            None => req.call(),
        };

        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(err)) => return Err(TransportError(err.to_string())),
        };

        into_response(response)
    }
}

fn into_response(response: ureq::Response) -> Result<Response, TransportError> {
    let status = response.status();
    let headers = response
        .headers_names()
        .into_iter()
        .filter_map(|name| {
            let value = response.header(&name)?.to_owned();
            Some((name, value))
        })
        .collect();

    let body = response
        .into_string()
        .map_err(|err| TransportError(err.to_string()))?;

    Ok(Response {
        status,
        headers,
        body,
    })
}

/// Percent-encodes everything outside RFC 3986 unreserved characters.
fn encode_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());

    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(char::from(byte))
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }

    encoded
}
