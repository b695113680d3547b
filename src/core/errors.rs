//! Error types for the ARM compatibility analysis engine.
//!
//! Every fallible operation in the engine returns [`Result`], whose error
//! variants correspond to the error kinds named in the design: input
//! validation, forge lookup failures, content decoding, registry failures,
//! and internal aggregation failures.

use std::io;

use thiserror::Error;

/// Main result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Comprehensive error type for all engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The input URL or configuration value was malformed.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Human-readable description of what was wrong.
        message: String,
    },

    /// The code forge reported that the repository does not exist.
    #[error("repository not found: {owner}/{repo}")]
    RepoNotFound {
        /// Repository owner/org.
        owner: String,
        /// Repository name.
        repo: String,
    },

    /// The code forge reported that the requested branch does not exist.
    #[error("branch '{branch}' not found for {owner}/{repo}")]
    BranchNotFound {
        /// Repository owner/org.
        owner: String,
        /// Repository name.
        repo: String,
        /// Branch that was requested.
        branch: String,
    },

    /// The code forge returned a non-success response that isn't one of the
    /// more specific kinds above (auth failure, rate limit, transport error).
    #[error("forge API error: {message}")]
    ForgeApiError {
        /// Human-readable description.
        message: String,
        /// HTTP status code, if the failure came from a response.
        status: Option<u16>,
    },

    /// File content could not be decoded into text.
    #[error("failed to decode content for {path}: {message}")]
    DecodeError {
        /// Path of the file that failed to decode.
        path: String,
        /// Human-readable description.
        message: String,
    },

    /// A package or container registry call failed. This variant is only
    /// ever constructed and consumed inside the registry clients; per the
    /// propagation policy, callers see a `compatibility=unknown` finding
    /// instead of this error.
    #[error("registry error: {message}")]
    RegistryError {
        /// Human-readable description.
        message: String,
    },

    /// An aggregator raised an unexpected error. Caught by the orchestrator
    /// and turned into an empty, erroring slot for that analyzer.
    #[error("internal error: {message}")]
    InternalError {
        /// Human-readable description.
        message: String,
    },

    /// I/O error (reading a config file, archive extraction, etc).
    #[error("I/O error: {message}")]
    Io {
        /// Human-readable description.
        message: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable description.
        message: String,
    },

    /// Serialization/deserialization error (JSON or YAML payloads).
    #[error("serialization error: {message}")]
    Serialization {
        /// Human-readable description.
        message: String,
    },
}

impl EngineError {
    /// Build an [`EngineError::InvalidInput`].
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Build an [`EngineError::RepoNotFound`].
    pub fn repo_not_found(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self::RepoNotFound {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Build an [`EngineError::BranchNotFound`].
    pub fn branch_not_found(
        owner: impl Into<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self::BranchNotFound {
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
        }
    }

    /// Build an [`EngineError::ForgeApiError`].
    pub fn forge_api(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::ForgeApiError {
            message: message.into(),
            status,
        }
    }

    /// Build an [`EngineError::DecodeError`].
    pub fn decode(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DecodeError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Build an [`EngineError::RegistryError`].
    pub fn registry(message: impl Into<String>) -> Self {
        Self::RegistryError {
            message: message.into(),
        }
    }

    /// Build an [`EngineError::InternalError`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Build an [`EngineError::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns `true` for the error kinds that are terminal for an entire
    /// analysis (InvalidInput, RepoNotFound, BranchNotFound) per the
    /// propagation policy.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput { .. } | Self::RepoNotFound { .. } | Self::BranchNotFound { .. }
        )
    }
}

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            message: "I/O operation failed".to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: format!("JSON error: {err}"),
        }
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: format!("YAML error: {err}"),
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        Self::ForgeApiError {
            message: err.to_string(),
            status: err.status().map(|s| s.as_u16()),
        }
    }
}

/// Result extension trait for attaching additional context to an error's
/// message without losing the original variant's kind.
pub trait ResultExt<T> {
    /// Add context computed lazily (only on the error path).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Add static context.
    fn context(self, msg: &'static str) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<EngineError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let ctx = f();
            prefix_message(e.into(), ctx)
        })
    }

    fn context(self, msg: &'static str) -> Result<T> {
        self.map_err(|e| prefix_message(e.into(), msg.to_string()))
    }
}

fn prefix_message(err: EngineError, ctx: String) -> EngineError {
    match err {
        EngineError::InternalError { message } => EngineError::InternalError {
            message: format!("{ctx}: {message}"),
        },
        EngineError::ForgeApiError { message, status } => EngineError::ForgeApiError {
            message: format!("{ctx}: {message}"),
            status,
        },
        EngineError::RegistryError { message } => EngineError::RegistryError {
            message: format!("{ctx}: {message}"),
        },
        EngineError::Config { message } => EngineError::Config {
            message: format!("{ctx}: {message}"),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = EngineError::invalid_input("bad url");
        assert!(matches!(err, EngineError::InvalidInput { .. }));
        assert!(err.is_terminal());

        let err = EngineError::registry("timeout");
        assert!(!err.is_terminal());
    }

    #[test]
    fn test_context_prefixing() {
        let result: std::result::Result<(), EngineError> =
            Err(EngineError::internal("boom")).context("fetching tree");
        match result {
            Err(EngineError::InternalError { message }) => {
                assert_eq!(message, "fetching tree: boom");
            }
            _ => panic!("expected InternalError"),
        }
    }

    #[test]
    fn test_terminal_classification() {
        assert!(EngineError::repo_not_found("acme", "widgets").is_terminal());
        assert!(EngineError::branch_not_found("acme", "widgets", "main").is_terminal());
        assert!(!EngineError::decode("foo.tf", "bad utf8").is_terminal());
    }
}
