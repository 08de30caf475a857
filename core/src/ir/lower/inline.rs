//! file: core/src/ir/lower/inline.rs
//! description: inlining of `@func` and host function calls.
//!
//! Calls never survive into the IR: the callee body is lowered in place
//! in a fresh frame. `@func` parameters are passed by value (copied into
//! new locals) unless annotated `template()`; host function parameters
//! bind the caller's values as they are.

use std::collections::HashMap;

use crate::analyzers::{DiagnosticKind, check_body};
use crate::ast::{AstNode, Keyword};
use crate::registry::{FunctionRole, ParamKind};

use super::lowering_context::{LowerResult, LoweringContext, error};
use super::operand::{Binding, Operand};
use super::scope::{Frame, FrameRole};
use super::static_value::StaticValue;

impl<'a> LoweringContext<'a> {
    pub(crate) fn inline_call(
        &mut self,
        name: &str,
        args: &[AstNode],
        keywords: &[Keyword],
        node: &AstNode,
    ) -> LowerResult<Operand> {
        let Some(desc) = self.registry.get(name) else {
            return Err(error(
                DiagnosticKind::UndefinedName,
                format!("Function '{}' is not defined", name),
                node,
            ));
        };
        let role = match desc.role {
            FunctionRole::Kernel => {
                return Err(error(
                    DiagnosticKind::InvalidCall,
                    format!("Kernel '{}' cannot be called from another kernel or function", name),
                    node,
                ));
            }
            FunctionRole::Func => FrameRole::Func,
            FunctionRole::Host => FrameRole::Host,
        };
        if self.inline_depth >= self.config.max_inline_depth {
            return Err(error(
                DiagnosticKind::RecursionLimit,
                format!("Maximum inline depth {} exceeded while inlining '{}'", self.config.max_inline_depth, name),
                node,
            ));
        }
        if args.len() > desc.params.len() {
            return Err(error(
                DiagnosticKind::InvalidCall,
                format!("{}() takes {} argument(s) but {} were given", name, desc.params.len(), args.len()),
                node,
            ));
        }

        let mut positional = Vec::with_capacity(args.len());
        for arg in args {
            positional.push(self.lower_expr(arg)?);
        }
        let mut named: HashMap<&str, Operand> = HashMap::new();
        for kw in keywords {
            if !desc.params.iter().any(|p| p.name == kw.name) {
                return Err(error(
                    DiagnosticKind::InvalidCall,
                    format!("{}() got an unexpected keyword argument '{}'", name, kw.name),
                    node,
                ));
            }
            let value = self.lower_expr(&kw.value)?;
            named.insert(kw.name.as_str(), value);
        }

        let mut bound = Vec::with_capacity(desc.params.len());
        let mut positional = positional.into_iter();
        for param in &desc.params {
            let value = match positional.next() {
                Some(v) => {
                    if named.contains_key(param.name.as_str()) {
                        return Err(error(
                            DiagnosticKind::InvalidCall,
                            format!("{}() got multiple values for argument '{}'", name, param.name),
                            node,
                        ));
                    }
                    v
                }
                None => named.remove(param.name.as_str()).ok_or_else(|| {
                    error(
                        DiagnosticKind::InvalidCall,
                        format!("{}() missing argument '{}'", name, param.name),
                        node,
                    )
                })?,
            };
            let binding = match (role, &param.kind, value) {
                (_, ParamKind::Template, value) => match value.into_static() {
                    Some(v) => Binding::Static(v),
                    None => {
                        return Err(error(
                            DiagnosticKind::InvalidArgument,
                            format!("Template argument '{}' of '{}' must be a compile-time value", param.name, name),
                            node,
                        ));
                    }
                },
                (FrameRole::Func, ParamKind::Scalar(dtype), value) => {
                    let value = self.cast_operand(value, *dtype, node)?;
                    Binding::Runtime(self.new_var(value, node)?)
                }
                (FrameRole::Func, _, Operand::Static(v))
                    if !v.is_numeric() && !matches!(v, StaticValue::Matrix(_)) =>
                {
                    Binding::Static(v)
                }
                (FrameRole::Func, _, value @ Operand::Tuple(_)) => match value.into_static() {
                    Some(v) => Binding::Static(v),
                    None => {
                        return Err(error(
                            DiagnosticKind::TypeMismatch,
                            format!("Argument '{}' of '{}' cannot be a runtime tuple", param.name, name),
                            node,
                        ));
                    }
                },
                (FrameRole::Func, _, value) => Binding::Runtime(self.new_var(value, node)?),
                (_, _, Operand::Static(v)) => Binding::Static(v),
                (_, _, value) => Binding::Runtime(self.new_var(value, node)?),
            };
            bound.push((param.name.clone(), binding));
        }

        if role == FrameRole::Func {
            check_body(&desc.body)?;
        }
        log::trace!("[lower] inlining {} '{}' at depth {}", desc.role, name, self.inline_depth + 1);

        let mut frame = Frame::new(name, role);
        for (param, binding) in bound {
            frame.table.insert(&param, binding);
        }
        let caller = std::mem::replace(&mut self.frame, frame);
        self.inline_depth += 1;
        let result = self.lower_block(&desc.body);
        self.inline_depth -= 1;
        let callee = std::mem::replace(&mut self.frame, caller);
        result?;
        Ok(callee.return_value.unwrap_or(Operand::Static(StaticValue::None)))
    }
}
