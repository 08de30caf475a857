//! Resolution of parameter and return annotations into `ParamKind`.
//!
//! Annotations are matched structurally on the AST; they never run through
//! lowering, so registering a kernel does not depend on globals.

use crate::analyzers::{DiagnosticKind, KernelSyntaxError};
use crate::ast::{AstNode, AstNodeKind};
use crate::ir::value::DataType;
use crate::vm::field::Layout;

use super::ParamKind;

const ISSUER: &str = "tilang.registry.annotation";

fn unsupported(node: &AstNode) -> KernelSyntaxError {
    KernelSyntaxError::at(
        DiagnosticKind::InvalidArgument,
        format!("Unsupported type annotation '{}'", describe(node)),
        ISSUER,
        node,
    )
}

fn describe(node: &AstNode) -> String {
    match &node.kind {
        AstNodeKind::Identifier { name } => name.clone(),
        AstNodeKind::Attribute { object, name } => format!("{}.{}", describe(object), name),
        AstNodeKind::Call { callee, .. } => format!("{}(...)", describe(callee)),
        other => other.to_string(),
    }
}

pub(crate) fn resolve_param(annotation: Option<&AstNode>) -> Result<ParamKind, KernelSyntaxError> {
    let Some(node) = annotation else {
        return Ok(ParamKind::Untyped);
    };
    match &node.kind {
        AstNodeKind::Identifier { name } => match name.as_str() {
            "template" => Ok(ParamKind::Template),
            "any_arr" => Ok(ParamKind::ExternalArray { element_dim: None, layout: None }),
            "sparse_matrix_builder" => Ok(ParamKind::SparseMatrixBuilder),
            other => DataType::from_name(other).map(ParamKind::Scalar).ok_or_else(|| unsupported(node)),
        },
        AstNodeKind::Call { callee, args, keywords } => {
            let name = callee.as_identifier().ok_or_else(|| unsupported(node))?;
            match name {
                "template" | "sparse_matrix_builder" if !args.is_empty() || !keywords.is_empty() => {
                    Err(KernelSyntaxError::at(
                        DiagnosticKind::InvalidArgument,
                        format!("'{}()' takes no arguments", name),
                        ISSUER,
                        node,
                    ))
                }
                "template" => Ok(ParamKind::Template),
                "sparse_matrix_builder" => Ok(ParamKind::SparseMatrixBuilder),
                "any_arr" => resolve_any_arr(node, args, keywords),
                _ => Err(unsupported(node)),
            }
        }
        _ => Err(unsupported(node)),
    }
}

fn resolve_any_arr(
    node: &AstNode,
    args: &[AstNode],
    keywords: &[crate::ast::Keyword],
) -> Result<ParamKind, KernelSyntaxError> {
    if !args.is_empty() {
        return Err(KernelSyntaxError::at(
            DiagnosticKind::InvalidArgument,
            "any_arr() only accepts the keyword arguments 'element_dim' and 'layout'",
            ISSUER,
            node,
        ));
    }
    let mut element_dim = None;
    let mut layout = None;
    for kw in keywords {
        match (kw.name.as_str(), &kw.value.kind) {
            ("element_dim", AstNodeKind::Integer { value }) if (0..=2).contains(value) => {
                element_dim = Some(*value as usize);
            }
            ("layout", AstNodeKind::Attribute { object, name })
                if object.as_identifier() == Some("Layout") =>
            {
                layout = Some(match name.as_str() {
                    "AOS" => Layout::AOS,
                    "SOA" => Layout::SOA,
                    _ => return Err(unsupported(&kw.value)),
                });
            }
            _ => {
                return Err(KernelSyntaxError::at(
                    DiagnosticKind::InvalidArgument,
                    format!("Invalid any_arr() argument '{}'", kw.name),
                    ISSUER,
                    &kw.value,
                ));
            }
        }
    }
    Ok(ParamKind::ExternalArray { element_dim, layout })
}

pub(crate) fn resolve_return(annotation: Option<&AstNode>) -> Result<Option<DataType>, KernelSyntaxError> {
    let Some(node) = annotation else {
        return Ok(None);
    };
    match &node.kind {
        AstNodeKind::None => Ok(None),
        AstNodeKind::Identifier { name } => DataType::from_name(name).map(Some).ok_or_else(|| unsupported(node)),
        _ => Err(unsupported(node)),
    }
}
