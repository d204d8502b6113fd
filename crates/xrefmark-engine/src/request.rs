use serde::{Deserialize, Serialize};
use urlencoding::encode;

use crate::epoch::Epoch;
use crate::symbols::{DiffSymbols, ResolutionResult, SymbolList};

/// What to resolve: one file at a commit, a whole commit, or a pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResolveRequest {
    Blob {
        slug: String,
        commit: String,
        path: String,
    },
    Commit {
        slug: String,
        commit: String,
    },
    Pr {
        slug: String,
        id: String,
        base: String,
        old: String,
        new: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Unsupported message type: {0}")]
    Unsupported(String),
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl ResolveRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveRequest::Blob { .. } => "blob",
            ResolveRequest::Commit { .. } => "commit",
            ResolveRequest::Pr { .. } => "pr",
        }
    }

    /// Full resolver URL for this request under `endpoint`, which is expected
    /// to end with a slash.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        let query = match self {
            ResolveRequest::Blob { slug, commit, path } => format!(
                "slug={}&commit={}&path={}",
                encode(slug),
                encode(commit),
                encode(path)
            ),
            ResolveRequest::Commit { slug, commit } => {
                format!("slug={}&commit={}", encode(slug), encode(commit))
            }
            ResolveRequest::Pr {
                slug,
                id,
                base,
                old,
                new,
            } => format!(
                "slug={}&id={}&base={}&old={}&new={}",
                encode(slug),
                encode(id),
                encode(base),
                encode(old),
                encode(new)
            ),
        };
        format!("{endpoint}{}?{query}", self.kind())
    }

    /// Decode a resolver response body into the result shape this request
    /// kind produces.
    pub fn decode_result(&self, body: &str) -> Result<ResolutionResult, serde_json::Error> {
        Ok(match self {
            ResolveRequest::Blob { .. } | ResolveRequest::Commit { .. } => {
                ResolutionResult::File(serde_json::from_str::<SymbolList>(body)?)
            }
            ResolveRequest::Pr { .. } => {
                ResolutionResult::Diff(serde_json::from_str::<DiffSymbols>(body)?)
            }
        })
    }

    /// Parse a request message, reporting unknown `type`s by name
    pub fn from_message(message: &serde_json::Value) -> Result<Self, RequestError> {
        let kind = match message.get("type") {
            Some(serde_json::Value::String(kind)) => kind.clone(),
            Some(other) => other.to_string(),
            None => "undefined".to_string(),
        };
        if !matches!(kind.as_str(), "blob" | "commit" | "pr") {
            return Err(RequestError::Unsupported(kind));
        }
        Ok(serde_json::from_value(message.clone())?)
    }
}

/// A request tagged with the epoch it was issued in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampedRequest {
    pub epoch: Epoch,
    #[serde(flatten)]
    pub request: ResolveRequest,
}
