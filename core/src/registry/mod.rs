//! file: core/src/registry/mod.rs
//! description: kernel/function registry.
//!
//! Every top-level `def` becomes a `FunctionDescriptor`: `@kernel` defs are
//! compiled entry points, `@func` defs and undecorated (host) defs are
//! inlined at their call sites. Descriptors are immutable once registered.

mod annotation;

use std::collections::HashMap;
use std::sync::Arc;

use crate::analyzers::{DiagnosticKind, KernelSyntaxError};
use crate::ast::{AstNode, AstNodeKind};
use crate::ir::value::DataType;
use crate::location::{Location, Span};
use crate::vm::field::Layout;

const ISSUER: &str = "tilang.registry";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionRole {
    Kernel,
    Func,
    Host,
}

impl std::fmt::Display for FunctionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionRole::Kernel => write!(f, "kernel"),
            FunctionRole::Func => write!(f, "func"),
            FunctionRole::Host => write!(f, "host function"),
        }
    }
}

/// Closed set of parameter annotations.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    Scalar(DataType),
    Template,
    /// `None` members accept whatever the passed array has.
    ExternalArray {
        element_dim: Option<usize>,
        layout: Option<Layout>,
    },
    SparseMatrixBuilder,
    Untyped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDescriptor {
    pub name: String,
    pub kind: ParamKind,
}

#[derive(Debug, Clone)]
pub struct FunctionDescriptor {
    pub name: String,
    pub role: FunctionRole,
    pub params: Vec<ParamDescriptor>,
    pub ret: Option<DataType>,
    pub body: Vec<AstNode>,
    pub location: Option<Location>,
    pub span: Option<Span>,
}

#[derive(Debug, Default)]
pub struct Registry {
    functions: HashMap<String, Arc<FunctionDescriptor>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a `FunctionDef` node, replacing any previous definition
    /// with the same name.
    pub fn register(&mut self, def: &AstNode) -> Result<Arc<FunctionDescriptor>, KernelSyntaxError> {
        let AstNodeKind::FunctionDef { name, decorators, params, returns, body } = &def.kind else {
            return Err(KernelSyntaxError::at(
                DiagnosticKind::InvalidCall,
                "Only function definitions can be registered",
                ISSUER,
                def,
            ));
        };

        let role = role_from_decorators(decorators, def)?;
        let mut resolved = Vec::with_capacity(params.len());
        for param in params {
            let kind = annotation::resolve_param(param.annotation.as_ref())?;
            if role == FunctionRole::Kernel && kind == ParamKind::Untyped {
                return Err(KernelSyntaxError::at(
                    DiagnosticKind::InvalidArgument,
                    format!("Kernel parameter '{}' needs a type annotation", param.name),
                    ISSUER,
                    def,
                ));
            }
            resolved.push(ParamDescriptor { name: param.name.clone(), kind });
        }
        let ret = annotation::resolve_return(returns.as_deref())?;

        let descriptor = Arc::new(FunctionDescriptor {
            name: name.clone(),
            role,
            params: resolved,
            ret,
            body: body.clone(),
            location: def.location.clone(),
            span: def.span.clone(),
        });
        if self.functions.insert(name.clone(), descriptor.clone()).is_some() {
            log::warn!("[registry] redefinition of '{}' replaces the previous one", name);
        }
        log::debug!("[registry] registered {} '{}' ({} params)", role, name, descriptor.params.len());
        Ok(descriptor)
    }

    pub fn get(&self, name: &str) -> Option<Arc<FunctionDescriptor>> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Names of all registered kernels, sorted.
    pub fn kernel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .functions
            .values()
            .filter(|d| d.role == FunctionRole::Kernel)
            .map(|d| d.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

fn role_from_decorators(decorators: &[String], def: &AstNode) -> Result<FunctionRole, KernelSyntaxError> {
    let mut role = FunctionRole::Host;
    for decorator in decorators {
        role = match decorator.as_str() {
            "kernel" => FunctionRole::Kernel,
            "func" => FunctionRole::Func,
            other => {
                return Err(KernelSyntaxError::at(
                    DiagnosticKind::InvalidArgument,
                    format!("Unsupported decorator '@{}'", other),
                    ISSUER,
                    def,
                ));
            }
        };
    }
    Ok(role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::generate_ast_from_source;
    use crate::script::Script;

    fn register_all(src: &str) -> Result<Registry, KernelSyntaxError> {
        let root = generate_ast_from_source(&Script::from_source("t.ti", src)).expect("parse");
        let AstNodeKind::Script { body } = root.kind else { panic!("no script") };
        let mut registry = Registry::new();
        for def in &body {
            registry.register(def)?;
        }
        Ok(registry)
    }

    #[test]
    fn annotations_resolve_to_param_kinds() {
        let registry = register_all(
            "@kernel\ndef k(a: i32, b: template(), c: any_arr(element_dim=2, layout=Layout.SOA), d: sparse_matrix_builder()) -> f32:\n    pass\n",
        )
        .unwrap();
        let k = registry.get("k").unwrap();
        assert_eq!(k.role, FunctionRole::Kernel);
        assert_eq!(k.ret, Some(DataType::F32));
        let kinds: Vec<ParamKind> = k.params.iter().map(|p| p.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                ParamKind::Scalar(DataType::I32),
                ParamKind::Template,
                ParamKind::ExternalArray { element_dim: Some(2), layout: Some(Layout::SOA) },
                ParamKind::SparseMatrixBuilder,
            ]
        );
    }

    #[test]
    fn roles_follow_decorators() {
        let registry = register_all("@func\ndef f(x):\n    pass\ndef h(x):\n    pass\n@lang.kernel\ndef k():\n    pass\n").unwrap();
        assert_eq!(registry.get("f").unwrap().role, FunctionRole::Func);
        assert_eq!(registry.get("h").unwrap().role, FunctionRole::Host);
        assert_eq!(registry.kernel_names(), vec!["k".to_string()]);
    }

    #[test]
    fn kernel_parameters_need_annotations() {
        let err = register_all("@kernel\ndef k(x):\n    pass\n").unwrap_err();
        assert_eq!(err.diagnostic_kind(), DiagnosticKind::InvalidArgument);
    }

    #[test]
    fn unknown_decorator_is_rejected() {
        assert!(register_all("@gpu\ndef k():\n    pass\n").is_err());
    }
}
