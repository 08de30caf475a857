use std::fmt;

use crate::analyzers::DiagnosticKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level_str = match self {
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        };
        write!(f, "{}", level_str)
    }
}

/// Common surface of every error raised by the compiler and the executor.
///
/// Errors travel as `Box<dyn TilangErrorExt>` across the public API. The
/// `message` is the exact user-facing text; `issuer` names the pass that
/// raised it (e.g. `tilang.lower.compare`).
pub trait TilangErrorExt {
    fn level(&self) -> Level;
    fn message(&self) -> String;
    fn issuer(&self) -> String;
    fn span(&self) -> Option<crate::location::Span>;
    fn location(&self) -> Option<crate::location::Location>;

    /// Diagnostic category for errors raised while compiling kernels.
    fn kind(&self) -> Option<DiagnosticKind> {
        None
    }
}

impl<E: TilangErrorExt + 'static> From<E> for Box<dyn TilangErrorExt> {
    fn from(error: E) -> Self {
        Box::new(error)
    }
}

impl fmt::Debug for dyn TilangErrorExt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loc_str = match self.location() {
            Some(loc) => loc.to_string(),
            None => "unknown".to_string(),
        };
        let span_str = match self.span() {
            Some(span) => span.to_string(),
            None => "span:none".to_string(),
        };

        write!(
            f,
            "TILANG | {} | {} | {} | {} | {}",
            self.level(),
            loc_str,
            self.issuer(),
            span_str,
            self.message()
        )
    }
}

impl fmt::Display for dyn TilangErrorExt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location() {
            Some(loc) => write!(f, "{} (at {})", self.message(), loc),
            None => write!(f, "{}", self.message()),
        }
    }
}
