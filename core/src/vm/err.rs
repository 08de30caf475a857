use crate::error::{Level, TilangErrorExt};
use crate::location::{Location, Span};

/// Failure while executing a compiled kernel or touching host storage.
#[derive(Debug, Clone)]
pub struct RuntimeError {
    level: Level,
    message: String,
    issuer: String,
    location: Option<Location>,
    span: Option<Span>,
}

impl RuntimeError {
    pub fn with(
        level: Level,
        message: String,
        issuer: String,
        location: Option<Location>,
        span: Option<Span>,
    ) -> Self {
        RuntimeError {
            level,
            message,
            issuer,
            location,
            span,
        }
    }

    pub fn new(message: impl Into<String>, issuer: &str) -> Self {
        Self::with(Level::Error, message.into(), issuer.to_string(), None, None)
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RuntimeError {}

impl TilangErrorExt for RuntimeError {
    fn level(&self) -> Level {
        self.level
    }

    fn message(&self) -> String {
        self.message.clone()
    }

    fn issuer(&self) -> String {
        self.issuer.clone()
    }

    fn span(&self) -> Option<Span> {
        self.span.clone()
    }

    fn location(&self) -> Option<Location> {
        self.location.clone()
    }
}
