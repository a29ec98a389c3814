use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApaaiError {
    /// The service answered with a non-2xx status.
    #[error("APAAI {method} {path} -> {status}{}", detail_suffix(.body))]
    Http {
        method: String,
        path: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("APAAI {method} {path} failed: {source}")]
    Transport {
        method: String,
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to decode response of {method} {path}: {source}")]
    Decode {
        method: String,
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Approval for action {action_id} timed out after {}s", .elapsed.as_secs_f64())]
    ApprovalTimeout { action_id: String, elapsed: Duration },

    #[error("Action {action_id} was rejected")]
    ApprovalRejected { action_id: String },

    #[error("Approval handler failed: {0}")]
    Approval(String),

    #[error("Invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("Invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ApaaiError {
    /// HTTP status of a non-2xx response, if this error carries one.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            ApaaiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ApaaiError::ApprovalTimeout { .. })
    }
}

fn detail_suffix(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        String::new()
    } else {
        format!(" :: {body}")
    }
}

/// Failure of a gated run: either the accountability layer itself, or the
/// caller's execute function.
///
/// `Execution` displays exactly like the wrapped error so callers see the
/// original message.
#[derive(Debug, Error)]
pub enum GateError<E> {
    #[error(transparent)]
    Decision(#[from] ApaaiError),

    #[error("{0}")]
    Execution(E),
}

impl<E> GateError<E> {
    /// Returns the execute function's error, if that is what failed.
    pub fn into_execution(self) -> Option<E> {
        match self {
            GateError::Execution(e) => Some(e),
            GateError::Decision(_) => None,
        }
    }

    pub fn as_decision(&self) -> Option<&ApaaiError> {
        match self {
            GateError::Decision(e) => Some(e),
            GateError::Execution(_) => None,
        }
    }
}
