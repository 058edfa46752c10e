use std::fmt;

pub mod categories;

pub use categories::ErrorCategory;

/// Error surfaced by the engine's public API.
///
/// Collaborator traits return `anyhow::Result`; failures crossing the
/// engine boundary are wrapped here so callers can distinguish a sync
/// timeout from an ordinary upstream failure.
#[derive(Debug)]
pub struct ActivityError {
    pub category: ErrorCategory,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ActivityError {
    pub fn with_category(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors for common error types
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::Timeout, message)
    }

    pub fn event_source(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::EventSource, message)
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::Store, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::NotFound, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::Rejected, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::InternalError, message)
    }
}

impl fmt::Display for ActivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

impl std::error::Error for ActivityError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// Convert anyhow::Error to ActivityError
impl From<anyhow::Error> for ActivityError {
    fn from(err: anyhow::Error) -> Self {
        // anyhow::Error already contains the full error chain, so we just use its
        // string representation
        Self::internal_error(err.to_string())
    }
}
