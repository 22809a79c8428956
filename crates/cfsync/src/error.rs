//! Error taxonomy
//!
//! Every fallible operation in the library returns [Error]. Provider failures keep their own
//! type ([ProviderError]) so that callers can branch on [ProviderErrorKind] instead of matching
//! on service messages.
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cyclic stack dependency: {description}")]
    CyclicDependency { description: String },

    #[error("Invalid dependency graph: {0}")]
    InvalidDependencyGraph(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Stack {stack} failed: {reason}")]
    StackActionFailed { stack: String, reason: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Invalid encrypted value: {0}")]
    InvalidEncryptedValue(String),

    #[error("IO error on {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Generic(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn template(message: impl Into<String>) -> Self {
        Error::Template(message.into())
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig(message.into())
    }

    pub(crate) fn stack_failed(stack: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::StackActionFailed {
            stack: stack.into(),
            reason: reason.into(),
        }
    }

    /// The provider discriminator, if this error came from the provider
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            Error::Provider(err) => Some(err.kind()),
            _ => None,
        }
    }
}

/// Classification of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The service reported that an update would not change anything
    NoUpdateRequired,
    /// The stack does not (or no longer) exist
    NotFound,
    /// The request was rate limited and may be retried
    Throttled,
    Other,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderErrorKind::NoUpdateRequired => f.write_str("no update required"),
            ProviderErrorKind::NotFound => f.write_str("not found"),
            ProviderErrorKind::Throttled => f.write_str("throttled"),
            ProviderErrorKind::Other => f.write_str("provider error"),
        }
    }
}

/// Wrapped service error
#[derive(thiserror::Error, Debug)]
#[error("{kind} in {operation}: {message}")]
pub struct ProviderError {
    kind: ProviderErrorKind,
    operation: String,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    pub fn new(
        kind: ProviderErrorKind,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_no_update_required(&self) -> bool {
        self.kind == ProviderErrorKind::NoUpdateRequired
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ProviderErrorKind::NotFound
    }

    pub fn is_throttled(&self) -> bool {
        self.kind == ProviderErrorKind::Throttled
    }
}
