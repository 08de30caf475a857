//! file: core/src/analyzers/unsupported.rs
//! description: rejection of constructs kernels never accept.
//!
//! The walk runs over a kernel or function body before any of it is
//! lowered, so an unsupported construct fails the compilation even when it
//! sits in a branch that static evaluation would discard.

use crate::ast::{AstNode, AstNodeKind, CompareOperator};

use super::err::{
    DiagnosticKind, IN_NOT_SUPPORTED, IS_NOT_SUPPORTED, KernelSyntaxError, STATIC_ELEMENT_ASSIGN,
};

const ISSUER: &str = "tilang.analyzers.unsupported";

/// Fails on the first `in`/`is` operator of a comparison chain.
pub fn check_compare_ops(ops: &[CompareOperator], node: &AstNode) -> Result<(), KernelSyntaxError> {
    for op in ops {
        if op.is_membership() {
            return Err(KernelSyntaxError::at(
                DiagnosticKind::UnsupportedConstruct,
                IN_NOT_SUPPORTED,
                ISSUER,
                node,
            ));
        }
        if op.is_identity() {
            return Err(KernelSyntaxError::at(
                DiagnosticKind::UnsupportedConstruct,
                IS_NOT_SUPPORTED,
                ISSUER,
                node,
            ));
        }
    }
    Ok(())
}

/// A static assignment may only bind plain names.
pub fn check_static_assign_targets(target: &AstNode) -> Result<(), KernelSyntaxError> {
    match &target.kind {
        AstNodeKind::Identifier { .. } => Ok(()),
        AstNodeKind::Tuple { elements } | AstNodeKind::List { elements } => {
            elements.iter().try_for_each(check_static_assign_targets)
        }
        _ => Err(KernelSyntaxError::at(
            DiagnosticKind::IllegalStaticMutation,
            STATIC_ELEMENT_ASSIGN,
            ISSUER,
            target,
        )),
    }
}

/// Walks every statement of `body` in source order.
pub fn check_body(body: &[AstNode]) -> Result<(), KernelSyntaxError> {
    body.iter().try_for_each(check_node)
}

fn check_node(node: &AstNode) -> Result<(), KernelSyntaxError> {
    match &node.kind {
        AstNodeKind::Compare { ops, .. } => check_compare_ops(ops, node)?,
        AstNodeKind::Assign { target, value } if value.is_static_marker() => {
            check_static_assign_targets(target)?
        }
        // Nested definitions are checked when they are called.
        AstNodeKind::FunctionDef { .. } => return Ok(()),
        _ => {}
    }

    let mut result = Ok(());
    node.for_each_child(|child| {
        if result.is_ok() {
            result = check_node(child);
        }
    });
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::generate_ast_from_source;
    use crate::script::Script;
    use crate::TilangErrorExt;

    fn body_of(src: &str) -> Vec<AstNode> {
        let root = generate_ast_from_source(&Script::from_source("t.ti", src)).expect("parse");
        let AstNodeKind::Script { body } = root.kind else { panic!("no script") };
        let AstNodeKind::FunctionDef { body, .. } = body.into_iter().next().expect("def").kind else {
            panic!("no def")
        };
        body
    }

    #[test]
    fn membership_in_dead_branch_is_still_rejected() {
        let body = body_of("def f(a, b):\n    if static(False):\n        c = a in b\n");
        let err = check_body(&body).unwrap_err();
        assert_eq!(err.diagnostic_kind(), DiagnosticKind::UnsupportedConstruct);
        assert_eq!(err.message(), IN_NOT_SUPPORTED);
    }

    #[test]
    fn identity_compare_has_its_own_message() {
        let body = body_of("def f(a, b):\n    c = a is not b\n");
        let err = check_body(&body).unwrap_err();
        assert_eq!(err.message(), IS_NOT_SUPPORTED);
    }

    #[test]
    fn static_assign_into_element_is_rejected() {
        let body = body_of("def f():\n    a = static([1, 2, 3])\n    a[0] = static(2)\n");
        let err = check_body(&body).unwrap_err();
        assert_eq!(err.diagnostic_kind(), DiagnosticKind::IllegalStaticMutation);
        assert_eq!(err.location().map(|l| l.line), Some(3));
    }

    #[test]
    fn plain_static_assign_passes() {
        let body = body_of("def f(a, b):\n    x, y = static(a, b)\n    z = a < b\n");
        assert!(check_body(&body).is_ok());
    }
}
