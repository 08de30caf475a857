use crate::analyzers::DiagnosticKind;
use crate::ast::Rule;
use crate::error::{Level, TilangErrorExt};
use crate::location::{Location, Span};

/// Which stage of the front end rejected the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxCause {
    /// Nothing but blank lines and comments.
    EmptyScript,
    /// Indentation or bracket nesting the layout pass could not close.
    Layout,
    /// The grammar rejected the input; `expected` names the rules that would have matched.
    Grammar { expected: Vec<String> },
    /// A parse tree missing a piece the AST builder needs.
    Malformed,
}

#[derive(Debug, Clone)]
pub struct SyntaxError {
    cause: SyntaxCause,
    message: String,
    issuer: String,
    location: Option<Location>,
    span: Option<Span>,
}

impl SyntaxError {
    pub fn empty_script(issuer: String, location: Option<Location>) -> Self {
        SyntaxError {
            cause: SyntaxCause::EmptyScript,
            message: "The provided script contains no statements.".to_string(),
            issuer,
            location,
            span: None,
        }
    }

    pub fn layout(message: &str, issuer: String, location: Location) -> Self {
        SyntaxError {
            cause: SyntaxCause::Layout,
            message: message.to_string(),
            issuer,
            location: Some(location),
            span: None,
        }
    }

    /// Wrap a pest failure, keeping the rules it expected at the failing position.
    pub fn grammar(error: &pest::error::Error<Rule>, issuer: String, file: &str) -> Self {
        let (line, column) = match error.line_col {
            pest::error::LineColLocation::Pos(pos) => pos,
            pest::error::LineColLocation::Span(start, _) => start,
        };
        let expected = match &error.variant {
            pest::error::ErrorVariant::ParsingError { positives, .. } => {
                positives.iter().map(|rule| format!("{:?}", rule)).collect()
            }
            pest::error::ErrorVariant::CustomError { .. } => Vec::new(),
        };
        SyntaxError {
            cause: SyntaxCause::Grammar { expected },
            message: format!("invalid syntax: {}", error.variant.message()),
            issuer,
            location: Some(Location::new(file.to_string(), line, column)),
            span: None,
        }
    }

    pub fn malformed(message: String, issuer: String, location: Option<Location>, span: Option<Span>) -> Self {
        SyntaxError {
            cause: SyntaxCause::Malformed,
            message,
            issuer,
            location,
            span,
        }
    }

    pub fn cause(&self) -> &SyntaxCause {
        &self.cause
    }
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(loc) = &self.location {
            write!(f, "{} (at {}:{}:{})", self.message, loc.file, loc.line, loc.column)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for SyntaxError {}

impl TilangErrorExt for SyntaxError {
    fn level(&self) -> Level {
        Level::Error
    }

    fn kind(&self) -> Option<DiagnosticKind> {
        Some(DiagnosticKind::Syntax)
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
