use crate::ast::AstNode;
use crate::error::{Level, TilangErrorExt};
use crate::location::{Location, Span};

pub const IN_NOT_SUPPORTED: &str = "\"In\" is not supported in Taichi kernels.";
pub const IS_NOT_SUPPORTED: &str = "\"Is\" is not supported in Taichi kernels.";
pub const STATIC_ELEMENT_ASSIGN: &str = "Static assign cannot be used on elements in arrays";
pub const RECREATING_VARIABLES: &str = "Recreating variables is not allowed";
pub const RETURN_IN_RUNTIME_CONTROL: &str = "Return inside non-static if/for is not supported";

/// Category of a compile-time diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    UnsupportedConstruct,
    IllegalRebind,
    IllegalStaticMutation,
    UndefinedName,
    TypeMismatch,
    InvalidCall,
    InvalidArgument,
    RecursionLimit,
    Syntax,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DiagnosticKind::UnsupportedConstruct => "unsupported-construct",
            DiagnosticKind::IllegalRebind => "illegal-rebind",
            DiagnosticKind::IllegalStaticMutation => "illegal-static-mutation",
            DiagnosticKind::UndefinedName => "undefined-name",
            DiagnosticKind::TypeMismatch => "type-mismatch",
            DiagnosticKind::InvalidCall => "invalid-call",
            DiagnosticKind::InvalidArgument => "invalid-argument",
            DiagnosticKind::RecursionLimit => "recursion-limit",
            DiagnosticKind::Syntax => "syntax",
        };
        write!(f, "{}", name)
    }
}

/// Error raised while registering or lowering a kernel.
#[derive(Debug, Clone)]
pub struct KernelSyntaxError {
    kind: DiagnosticKind,
    level: Level,
    message: String,
    issuer: String,
    location: Option<Location>,
    span: Option<Span>,
}

impl KernelSyntaxError {
    pub fn with(
        kind: DiagnosticKind,
        level: Level,
        message: String,
        issuer: String,
        location: Option<Location>,
        span: Option<Span>,
    ) -> Self {
        KernelSyntaxError {
            kind,
            level,
            message,
            issuer,
            location,
            span,
        }
    }

    /// Error-level diagnostic pointing at `node`.
    pub fn at(kind: DiagnosticKind, message: impl Into<String>, issuer: &str, node: &AstNode) -> Self {
        Self::with(
            kind,
            if kind == DiagnosticKind::RecursionLimit { Level::Critical } else { Level::Error },
            message.into(),
            issuer.to_string(),
            node.location.clone(),
            node.span.clone(),
        )
    }

    pub fn diagnostic_kind(&self) -> DiagnosticKind {
        self.kind
    }
}

impl std::fmt::Display for KernelSyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(loc) = &self.location {
            write!(f, "{} at {}", self.message, loc)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for KernelSyntaxError {}

impl TilangErrorExt for KernelSyntaxError {
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

    fn kind(&self) -> Option<DiagnosticKind> {
        Some(self.kind)
    }
}
