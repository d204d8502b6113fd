//! The resolution service boundary.
//!
//! A [`Resolver`] turns a [`ResolveRequest`] into an [`Envelope`]. Failures
//! never escape as errors: they travel inside the envelope, exactly like a
//! remote error message would. Nothing here retries.

use std::time::Duration;

use reqwest::blocking::Client;

use crate::request::ResolveRequest;
use crate::symbols::{Envelope, ResolutionResult};

pub trait Resolver {
    fn resolve(&self, request: &ResolveRequest) -> Envelope;
}

impl<F> Resolver for F
where
    F: Fn(&ResolveRequest) -> Envelope,
{
    fn resolve(&self, request: &ResolveRequest) -> Envelope {
        self(request)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("{status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// HTTP client for the resolver service
#[derive(Debug, Clone)]
pub struct HttpResolver {
    endpoint: String,
    client: Client,
}

impl HttpResolver {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ResolveError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::with_client(endpoint, client))
    }

    pub fn with_client(endpoint: impl Into<String>, client: Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }

    /// Perform one request; non-success statuses become [`ResolveError::Status`]
    pub fn fetch(&self, request: &ResolveRequest) -> Result<ResolutionResult, ResolveError> {
        let url = request.endpoint_url(&self.endpoint);
        log::debug!("[xrefmark] GET {url}");

        let response = self.client.get(&url).send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(ResolveError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(request.decode_result(&body)?)
    }

    /// Answer a raw request message, as received from a page
    pub fn handle_message(&self, message: &serde_json::Value) -> Envelope {
        match ResolveRequest::from_message(message) {
            Ok(request) => self.resolve(&request),
            Err(err) => Envelope::err(err.to_string()),
        }
    }
}

impl Resolver for HttpResolver {
    fn resolve(&self, request: &ResolveRequest) -> Envelope {
        log::info!("[xrefmark] Using endpoint: {}", self.endpoint);
        let fetched = self.fetch(request);
        if let Err(err) = &fetched {
            log::warn!("[xrefmark] ERROR while resolving reference for {request:?}: {err}");
        }
        into_envelope(fetched)
    }
}

fn into_envelope(fetched: Result<ResolutionResult, ResolveError>) -> Envelope {
    match fetched {
        Ok(result) => Envelope::ok(result),
        Err(err) => Envelope::err(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{EnvelopeError, SymbolList};
    use serde_json::json;

    #[test]
    fn closures_act_as_resolvers() {
        let resolver = |request: &ResolveRequest| {
            Envelope::err(format!("no {} today", request.kind()))
        };
        let request = ResolveRequest::Commit {
            slug: "o/r".to_string(),
            commit: "c".to_string(),
        };

        assert_eq!(
            resolver.resolve(&request).into_result(),
            Err(EnvelopeError::Remote("no commit today".to_string()))
        );
    }

    #[test]
    fn unsupported_messages_come_back_as_error_envelopes() {
        let resolver = HttpResolver::with_client("http://127.0.0.1:9/resolve/", Client::new());

        let envelope = resolver.handle_message(&json!({"type": "tree", "slug": "o/r"}));

        assert_eq!(envelope, Envelope::err("Unsupported message type: tree"));
    }

    #[test]
    fn status_errors_become_error_envelopes() {
        let err = ResolveError::Status {
            status: 404,
            body: "no such commit".to_string(),
        };

        let envelope = into_envelope(Err(err));

        assert_eq!(envelope, Envelope::err("404: no such commit"));
    }

    #[test]
    fn decode_errors_become_error_envelopes() {
        let err = serde_json::from_str::<SymbolList>("{").unwrap_err();

        let envelope = into_envelope(Err(err.into()));

        assert!(envelope.result.is_none());
        assert!(envelope.error.unwrap().starts_with("invalid response body:"));
    }

    #[test]
    fn results_become_result_envelopes() {
        let envelope = into_envelope(Ok(ResolutionResult::File(SymbolList::default())));

        assert_eq!(
            envelope.into_result(),
            Ok(ResolutionResult::File(SymbolList::default()))
        );
    }
}
