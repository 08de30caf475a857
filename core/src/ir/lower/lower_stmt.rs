//! file: core/src/ir/lower/lower_stmt.rs
//! description: statement lowering.
//!
//! Statements either emit IR (runtime control flow, stores) or are
//! evaluated away at compile time (`static` conditions and loops). Every
//! block opens its own scope; variables first assigned in both arms of a
//! runtime `if` with the same type are merged into the enclosing scope.

use crate::analyzers::err::{RECREATING_VARIABLES, RETURN_IN_RUNTIME_CONTROL, STATIC_ELEMENT_ASSIGN};
use crate::analyzers::{DiagnosticKind, check_static_assign_targets};
use crate::ast::{AstNode, AstNodeKind, BinaryOperator};
use crate::ir::op::{GlobalRef, IROp};
use crate::ir::value::{DataType, Value};

use super::lower_expr::static_ints;
use super::lowering_context::{LowerMode, LowerResult, LoweringContext, error};
use super::operand::{Binding, Operand, Place, Var};
use super::scope::{Flow, FrameRole, LoopContext, LoopKind, Scope};
use super::static_eval;
use super::static_value::{Builtin, StaticValue};

fn static_to_value(value: &StaticValue) -> Option<Value> {
    match value {
        StaticValue::Int(i) => Some(Value::Int(*i)),
        StaticValue::Bool(b) => Some(Value::Int(*b as i64)),
        StaticValue::Float(f) => Some(Value::Float(*f)),
        _ => None,
    }
}

fn value_to_static(value: Value) -> StaticValue {
    match value {
        Value::Int(i) => StaticValue::Int(i),
        Value::Float(f) => StaticValue::Float(f),
    }
}

impl<'a> LoweringContext<'a> {
    /// Lowers statements in order, stopping after a compile-time `return`.
    pub fn lower_block(&mut self, body: &[AstNode]) -> LowerResult<Flow> {
        for stmt in body {
            if self.lower_stmt(stmt)? == Flow::Returned {
                return Ok(Flow::Returned);
            }
        }
        Ok(Flow::Normal)
    }

    fn lower_scoped_block(&mut self, body: &[AstNode]) -> LowerResult<(Flow, Scope)> {
        self.frame.table.enter_scope();
        let flow = self.lower_block(body);
        let scope = self.frame.table.exit_scope();
        Ok((flow?, scope))
    }

    pub fn lower_stmt(&mut self, stmt: &AstNode) -> LowerResult<Flow> {
        match &stmt.kind {
            AstNodeKind::Assign { target, value } if value.is_static_marker() => {
                self.lower_static_assign(target, value)?;
            }
            AstNodeKind::Assign { target, value } => {
                let value = self.lower_expr(value)?;
                self.assign_target(target, value)?;
            }
            AstNodeKind::AugAssign { target, op, value } => self.lower_aug_assign(target, *op, value, stmt)?,
            AstNodeKind::If { condition, body, orelse } => return self.lower_if(condition, body, orelse, stmt),
            AstNodeKind::For { targets, iter, body } => return self.lower_for(targets, iter, body, stmt),
            AstNodeKind::While { condition, body } => self.lower_while(condition, body, stmt)?,
            AstNodeKind::Return { value } => return self.lower_return(value.as_deref(), stmt),
            AstNodeKind::Break => self.lower_break(stmt)?,
            AstNodeKind::Continue => self.lower_continue(stmt)?,
            AstNodeKind::Pass => {}
            AstNodeKind::ExprStmt { expr } => {
                self.lower_expr(expr)?;
            }
            AstNodeKind::FunctionDef { name, .. } => {
                return Err(error(
                    DiagnosticKind::UnsupportedConstruct,
                    format!("Nested function definitions are not supported ('{}')", name),
                    stmt,
                ));
            }
            other => {
                return Err(error(
                    DiagnosticKind::Syntax,
                    format!("'{}' is not a statement", other),
                    stmt,
                ));
            }
        }
        Ok(Flow::Normal)
    }

    // ------- assignment -------

    fn lower_static_assign(&mut self, target: &AstNode, value: &AstNode) -> LowerResult<()> {
        check_static_assign_targets(target)?;
        let value = self.lower_expr(value)?;
        let Some(value) = value.into_static() else {
            return Err(error(DiagnosticKind::TypeMismatch, "static() must produce a compile-time value", target));
        };
        self.bind_static_targets(target, value)
    }

    fn bind_static_targets(&mut self, target: &AstNode, value: StaticValue) -> LowerResult<()> {
        match &target.kind {
            AstNodeKind::Identifier { name } => {
                if self.mode == LowerMode::Script {
                    self.frame.table.insert_root(name, Binding::Static(value));
                    return Ok(());
                }
                let visible_runtime = matches!(self.frame.table.lookup(name), Some(Binding::Runtime(_)));
                if visible_runtime || self.frame.table.exists_in_current_scope(name) {
                    return Err(error(DiagnosticKind::IllegalRebind, RECREATING_VARIABLES, target));
                }
                self.bind(name, Binding::Static(value));
                Ok(())
            }
            AstNodeKind::Tuple { elements } | AstNodeKind::List { elements } => {
                let items = static_eval::iterate(&value).map_err(|m| error(DiagnosticKind::TypeMismatch, m, target))?;
                if items.len() != elements.len() {
                    return Err(error(
                        DiagnosticKind::TypeMismatch,
                        format!("Cannot unpack {} values into {} targets", items.len(), elements.len()),
                        target,
                    ));
                }
                for (element, item) in elements.iter().zip(items) {
                    self.bind_static_targets(element, item)?;
                }
                Ok(())
            }
            _ => Err(error(DiagnosticKind::IllegalStaticMutation, STATIC_ELEMENT_ASSIGN, target)),
        }
    }

    /// Splits `value` into one operand per unpacking target.
    fn unpack(&mut self, value: Operand, count: usize, node: &AstNode) -> LowerResult<Vec<Operand>> {
        let items: Vec<Operand> = match value {
            Operand::Tuple(items) => items,
            Operand::Static(v) => static_eval::iterate(&v)
                .map_err(|m| error(DiagnosticKind::TypeMismatch, m, node))?
                .into_iter()
                .map(Operand::Static)
                .collect(),
            Operand::Matrix(m) if m.rows == 1 || m.cols == 1 => {
                m.entries.into_iter().map(|(reg, dtype)| Operand::Scalar { reg, dtype }).collect()
            }
            other => {
                return Err(error(
                    DiagnosticKind::TypeMismatch,
                    format!("Cannot unpack a {}", other.describe()),
                    node,
                ));
            }
        };
        if items.len() != count {
            return Err(error(
                DiagnosticKind::TypeMismatch,
                format!("Cannot unpack {} values into {} targets", items.len(), count),
                node,
            ));
        }
        Ok(items)
    }

    fn assign_target(&mut self, target: &AstNode, value: Operand) -> LowerResult<()> {
        match &target.kind {
            AstNodeKind::Identifier { name } => self.assign_name(name, value, target),
            AstNodeKind::Tuple { elements } | AstNodeKind::List { elements } => {
                let items = self.unpack(value, elements.len(), target)?;
                for (element, item) in elements.iter().zip(items) {
                    self.assign_target(element, item)?;
                }
                Ok(())
            }
            AstNodeKind::Subscript { object, indices } if self.mode == LowerMode::Script => {
                self.script_store(object, indices, value, target)
            }
            AstNodeKind::Subscript { object, indices } => {
                let base = self.place_base(object)?;
                let idx = self.lower_indices(indices)?;
                let place = self.subscript_place(base, idx, target)?;
                self.store_place(&place, value, target)
            }
            other => Err(error(
                DiagnosticKind::UnsupportedConstruct,
                format!("Cannot assign to '{}'", other),
                target,
            )),
        }
    }

    fn assign_name(&mut self, name: &str, value: Operand, node: &AstNode) -> LowerResult<()> {
        if self.mode == LowerMode::Script {
            let Some(value) = value.into_static() else {
                return Err(error(DiagnosticKind::TypeMismatch, "Script-level values must be compile-time values", node));
            };
            self.frame.table.insert_root(name, Binding::Static(value));
            return Ok(());
        }
        match self.frame.table.lookup(name).cloned() {
            Some(Binding::Runtime(var)) => return self.store_place(&var.as_place(), value, node),
            Some(Binding::Static(_)) => {
                return Err(error(DiagnosticKind::IllegalRebind, RECREATING_VARIABLES, node));
            }
            None => {}
        }
        let binding = match value {
            Operand::Static(v) if !v.is_numeric() && !matches!(v, StaticValue::Matrix(_)) => Binding::Static(v),
            tuple @ Operand::Tuple(_) => match tuple.into_static() {
                Some(v) => Binding::Static(v),
                None => {
                    return Err(error(
                        DiagnosticKind::TypeMismatch,
                        format!("A tuple holding runtime values cannot be bound to '{}'; unpack it instead", name),
                        node,
                    ));
                }
            },
            other => Binding::Runtime(self.new_var(other, node)?),
        };
        self.bind(name, binding);
        Ok(())
    }

    fn script_store(&mut self, object: &AstNode, indices: &[AstNode], value: Operand, node: &AstNode) -> LowerResult<()> {
        let container = self.lower_expr(object)?;
        let idx = self.lower_indices(indices)?;
        match container {
            Operand::Static(StaticValue::Field(field)) => {
                let Some(ints) = static_ints(&idx) else {
                    return Err(error(DiagnosticKind::TypeMismatch, "Field indices must be integers", node));
                };
                let Some(value) = value.as_static().and_then(static_to_value) else {
                    return Err(error(
                        DiagnosticKind::TypeMismatch,
                        format!("Cannot store a {} into a field", value.describe()),
                        node,
                    ));
                };
                field
                    .set(&ints, value.cast(field.dtype()))
                    .map_err(|e| error(DiagnosticKind::InvalidArgument, e.to_string(), node))
            }
            Operand::Static(_) => Err(error(DiagnosticKind::IllegalStaticMutation, STATIC_ELEMENT_ASSIGN, node)),
            other => Err(error(
                DiagnosticKind::TypeMismatch,
                format!("A {} cannot be indexed", other.describe()),
                node,
            )),
        }
    }

    fn lower_aug_assign(&mut self, target: &AstNode, op: BinaryOperator, value: &AstNode, node: &AstNode) -> LowerResult<()> {
        if self.mode == LowerMode::Script {
            return self.script_aug_assign(target, op, value, node);
        }
        let place = match &target.kind {
            AstNodeKind::Identifier { name } => match self.lookup(name) {
                Some(Binding::Runtime(var)) => var.as_place(),
                Some(Binding::Static(_)) => {
                    return Err(error(
                        DiagnosticKind::IllegalStaticMutation,
                        format!("Compile-time value '{}' cannot be modified", name),
                        target,
                    ));
                }
                None => {
                    return Err(error(
                        DiagnosticKind::UndefinedName,
                        format!("Name '{}' is not defined", name),
                        target,
                    ));
                }
            },
            AstNodeKind::Subscript { object, indices } => {
                let base = self.place_base(object)?;
                let idx = self.lower_indices(indices)?;
                self.subscript_place(base, idx, target)?
            }
            other => {
                return Err(error(
                    DiagnosticKind::UnsupportedConstruct,
                    format!("Cannot assign to '{}'", other),
                    target,
                ));
            }
        };
        let rhs = self.lower_expr(value)?;
        if let Place::Sparse { arg, row, col } = place {
            if op != BinaryOperator::Add {
                return Err(error(
                    DiagnosticKind::UnsupportedConstruct,
                    "Sparse matrix builder elements can only be updated with +=",
                    node,
                ));
            }
            let (reg, dtype) = self.scalar(rhs, node)?;
            let src = self.cast_reg(reg, dtype, self.config.default_float, node)?;
            self.emit(IROp::SparseAdd { arg, row, col, src }, node)?;
            return Ok(());
        }
        let current = self.load_place(&place, node)?;
        let updated = self.lower_binary(op, current, rhs, node)?;
        self.store_place(&place, updated, node)
    }

    fn script_aug_assign(&mut self, target: &AstNode, op: BinaryOperator, value: &AstNode, node: &AstNode) -> LowerResult<()> {
        let rhs = self.lower_expr(value)?;
        let Some(rhs) = rhs.into_static() else {
            return Err(error(DiagnosticKind::TypeMismatch, "Script-level values must be compile-time values", node));
        };
        match &target.kind {
            AstNodeKind::Identifier { name } => {
                let Some(Binding::Static(current)) = self.lookup(name) else {
                    return Err(error(
                        DiagnosticKind::UndefinedName,
                        format!("Name '{}' is not defined", name),
                        target,
                    ));
                };
                let updated =
                    static_eval::binary(op, &current, &rhs).map_err(|m| error(DiagnosticKind::TypeMismatch, m, node))?;
                self.frame.table.insert_root(name, Binding::Static(updated));
                Ok(())
            }
            AstNodeKind::Subscript { object, indices } => {
                let container = self.lower_expr(object)?;
                let idx = self.lower_indices(indices)?;
                let Operand::Static(StaticValue::Field(field)) = container else {
                    return Err(error(
                        DiagnosticKind::IllegalStaticMutation,
                        "Only field elements can be updated at script level",
                        target,
                    ));
                };
                let Some(ints) = static_ints(&idx) else {
                    return Err(error(DiagnosticKind::TypeMismatch, "Field indices must be integers", node));
                };
                let current = field.get(&ints).map_err(|e| error(DiagnosticKind::InvalidArgument, e.to_string(), node))?;
                let updated = static_eval::binary(op, &value_to_static(current), &rhs)
                    .map_err(|m| error(DiagnosticKind::TypeMismatch, m, node))?;
                let Some(updated) = static_to_value(&updated) else {
                    return Err(error(DiagnosticKind::TypeMismatch, "Field elements must stay numeric", node));
                };
                field
                    .set(&ints, updated.cast(field.dtype()))
                    .map_err(|e| error(DiagnosticKind::InvalidArgument, e.to_string(), node))
            }
            other => Err(error(
                DiagnosticKind::UnsupportedConstruct,
                format!("Cannot assign to '{}'", other),
                target,
            )),
        }
    }

    // ------- if -------

    fn lower_if(&mut self, condition: &AstNode, body: &[AstNode], orelse: &[AstNode], node: &AstNode) -> LowerResult<Flow> {
        let cond = self.lower_expr(condition)?;
        if let Some(value) = cond.as_static() {
            let taken = if static_eval::truthy(value) { body } else { orelse };
            let (flow, _) = self.lower_scoped_block(taken)?;
            return Ok(flow);
        }

        let (reg, dtype) = self.scalar(cond, condition)?;
        let cond = self.truth_reg(reg, dtype, condition)?;
        let else_label = self.ir.new_label("if_else");
        let end_label = self.ir.new_label("if_end");
        self.emit_branch(IROp::BrFalse { cond, target: 0 }, &else_label, node)?;

        self.frame.runtime_depth += 1;
        let then_arm = self.lower_scoped_block(body);
        let then_arm = then_arm.and_then(|(_, then_scope)| {
            self.emit_branch(IROp::Jump { target: 0 }, &end_label, node)?;
            self.emit_label(&else_label, node)?;
            let else_start = self.ir.len();
            let (_, else_scope) = self.lower_scoped_block(orelse)?;
            self.emit_label(&end_label, node)?;
            Ok((then_scope, else_scope, else_start))
        });
        self.frame.runtime_depth -= 1;
        let (then_scope, else_scope, else_start) = then_arm?;

        self.merge_arm_variables(then_scope, else_scope, else_start);
        Ok(Flow::Normal)
    }

    /// Publishes variables both arms created with the same layout, rewriting
    /// the else arm to use the then arm's local slots.
    fn merge_arm_variables(&mut self, then_scope: Scope, mut else_scope: Scope, else_start: usize) {
        let mut names: Vec<String> = then_scope.keys().cloned().collect();
        names.sort();
        for name in names {
            let (Some(Binding::Runtime(then_var)), Some(Binding::Runtime(else_var))) =
                (then_scope.get(&name), else_scope.remove(&name))
            else {
                continue;
            };
            if !then_var.same_layout(&else_var) || self.frame.table.lookup(&name).is_some() {
                continue;
            }
            for (from, to) in else_var.locals().into_iter().zip(then_var.locals()) {
                self.ir.rename_local(else_start, from, to);
            }
            log::trace!("[lower] merged '{}' from both arms of an if", name);
            self.bind(&name, Binding::Runtime(then_var.clone()));
        }
    }

    // ------- loops -------

    fn lower_for(&mut self, targets: &[String], iter: &AstNode, body: &[AstNode], node: &AstNode) -> LowerResult<Flow> {
        if iter.is_static_marker() || self.mode == LowerMode::Script {
            let iterable = self.lower_expr(iter)?;
            let Some(iterable) = iterable.into_static() else {
                return Err(error(DiagnosticKind::TypeMismatch, "A static for loop needs a compile-time iterable", iter));
            };
            return self.lower_static_for(targets, &iterable, body, node);
        }

        if let AstNodeKind::Call { callee, args, keywords } = &iter.kind {
            let builtin = match callee.as_identifier().and_then(|n| self.lookup(n)) {
                Some(Binding::Static(StaticValue::Builtin(b))) => Some(b),
                _ => None,
            };
            if !keywords.is_empty() && builtin.is_some() {
                return Err(error(DiagnosticKind::InvalidCall, "Loop ranges take no keyword arguments", iter));
            }
            match builtin {
                Some(Builtin::Range) => return self.lower_range_for(targets, args, body, node),
                Some(Builtin::NdRange) => return self.lower_ndrange_for(targets, args, body, node),
                _ => {}
            }
        }

        let iterable = self.lower_expr(iter)?;
        let (target, shape_len) = match &iterable {
            Operand::Static(StaticValue::Field(field)) => (GlobalRef::Field(self.ir.intern_field(field)), field.shape().len()),
            Operand::Static(StaticValue::NdArray(array)) => (GlobalRef::Arg(array.arg), array.ndim),
            other => {
                return Err(error(
                    DiagnosticKind::UnsupportedConstruct,
                    format!("Cannot loop over a {} at runtime; use static() to unroll the loop", other.describe()),
                    iter,
                ));
            }
        };
        if targets.len() != shape_len {
            return Err(error(
                DiagnosticKind::TypeMismatch,
                format!("A loop over a {}-D container needs {} index variables, got {}", shape_len, shape_len, targets.len()),
                node,
            ));
        }
        let index_locals: Vec<usize> = targets.iter().map(|_| self.ir.alloc_local(DataType::I32)).collect();
        let header = self.emit(IROp::StructFor { target, index_locals: index_locals.clone(), end: 0 }, node)?;
        let bindings = targets
            .iter()
            .zip(&index_locals)
            .map(|(name, &local)| (name.as_str(), Var::Scalar { local, dtype: DataType::I32 }))
            .collect();
        self.lower_loop_body(LoopKind::StructFor, bindings, body, header, node)?;
        Ok(Flow::Normal)
    }

    fn lower_static_for(&mut self, targets: &[String], iterable: &StaticValue, body: &[AstNode], node: &AstNode) -> LowerResult<Flow> {
        let items = static_eval::iterate(iterable).map_err(|m| error(DiagnosticKind::TypeMismatch, m, node))?;
        self.frame.loops.push(LoopContext { kind: LoopKind::Static, break_label: None, continue_label: None });
        let result = self.unroll(targets, items, body, node);
        self.frame.loops.pop();
        result
    }

    fn unroll(&mut self, targets: &[String], items: Vec<StaticValue>, body: &[AstNode], node: &AstNode) -> LowerResult<Flow> {
        for item in items {
            self.frame.table.enter_scope();
            let flow = self.bind_loop_item(targets, item, node).and_then(|_| self.lower_block(body));
            self.frame.table.exit_scope();
            if flow? == Flow::Returned {
                return Ok(Flow::Returned);
            }
        }
        Ok(Flow::Normal)
    }

    fn bind_loop_item(&mut self, targets: &[String], item: StaticValue, node: &AstNode) -> LowerResult<()> {
        if let [target] = targets {
            self.bind(target, Binding::Static(item));
            return Ok(());
        }
        let parts = static_eval::iterate(&item).map_err(|m| error(DiagnosticKind::TypeMismatch, m, node))?;
        if parts.len() != targets.len() {
            return Err(error(
                DiagnosticKind::TypeMismatch,
                format!("Cannot unpack {} values into {} loop variables", parts.len(), targets.len()),
                node,
            ));
        }
        for (target, part) in targets.iter().zip(parts) {
            self.bind(target, Binding::Static(part));
        }
        Ok(())
    }

    fn int_bound(&mut self, arg: &AstNode) -> LowerResult<(crate::ir::op::Register, DataType)> {
        let bound = self.lower_expr(arg)?;
        let (reg, dtype) = self.scalar(bound, arg)?;
        if !dtype.is_int() {
            return Err(error(
                DiagnosticKind::TypeMismatch,
                format!("Loop bounds must be integers, found {}", dtype),
                arg,
            ));
        }
        Ok((reg, dtype))
    }

    fn lower_range_for(&mut self, targets: &[String], args: &[AstNode], body: &[AstNode], node: &AstNode) -> LowerResult<Flow> {
        let [target] = targets else {
            return Err(error(DiagnosticKind::TypeMismatch, "A range loop takes exactly one loop variable", node));
        };
        let (begin, end) = match args {
            [stop] => {
                let end = self.int_bound(stop)?;
                let begin = self.const_reg(Value::Int(0), node)?;
                ((begin, end.1), end)
            }
            [start, stop] => (self.int_bound(start)?, self.int_bound(stop)?),
            [_, _, _] => {
                return Err(error(
                    DiagnosticKind::UnsupportedConstruct,
                    "range() with a step is only supported in static loops",
                    node,
                ));
            }
            _ => return Err(error(DiagnosticKind::InvalidCall, "range() takes 1 or 2 arguments in a loop", node)),
        };
        let dtype = DataType::promote(begin.1, end.1);
        let local = self.ir.alloc_local(dtype);
        let header = self.emit(IROp::RangeFor { local, begin: begin.0, end_reg: end.0, end: 0 }, node)?;
        self.lower_loop_body(LoopKind::RangeFor, vec![(target.as_str(), Var::Scalar { local, dtype })], body, header, node)?;
        Ok(Flow::Normal)
    }

    /// `for i, j in ndrange(a, b)` as nested range loops; each bound is
    /// `n` or a `(begin, end)` pair.
    fn lower_ndrange_for(&mut self, targets: &[String], args: &[AstNode], body: &[AstNode], node: &AstNode) -> LowerResult<Flow> {
        if targets.len() != args.len() {
            return Err(error(
                DiagnosticKind::TypeMismatch,
                format!("ndrange() with {} dimensions needs {} loop variables, got {}", args.len(), args.len(), targets.len()),
                node,
            ));
        }
        let mut headers = Vec::with_capacity(args.len());
        let mut bindings = Vec::with_capacity(args.len());
        for (target, arg) in targets.iter().zip(args) {
            let ((begin, tb), (end_reg, te)) = match &arg.kind {
                AstNodeKind::Tuple { elements } | AstNodeKind::List { elements } if elements.len() == 2 => {
                    (self.int_bound(&elements[0])?, self.int_bound(&elements[1])?)
                }
                _ => {
                    let end = self.int_bound(arg)?;
                    (((self.const_reg(Value::Int(0), node)?), end.1), end)
                }
            };
            let dtype = DataType::promote(tb, te);
            let local = self.ir.alloc_local(dtype);
            headers.push(self.emit(IROp::RangeFor { local, begin, end_reg, end: 0 }, node)?);
            bindings.push((target.as_str(), Var::Scalar { local, dtype }));
        }
        let Some(&innermost) = headers.last() else {
            return Err(error(DiagnosticKind::InvalidCall, "ndrange() takes at least one dimension", node));
        };
        self.lower_loop_body(LoopKind::RangeFor, bindings, body, innermost, node)?;
        for &header in headers.iter().rev().skip(1) {
            let end = self.emit(IROp::EndFor, node)?;
            self.ir.patch_loop_end(header, end);
        }
        Ok(Flow::Normal)
    }

    /// Lowers a loop body after its header op, then closes it with `EndFor`.
    fn lower_loop_body(
        &mut self,
        kind: LoopKind,
        bindings: Vec<(&str, Var)>,
        body: &[AstNode],
        header: usize,
        node: &AstNode,
    ) -> LowerResult<()> {
        let continue_label = self.ir.new_label("for_continue");
        self.frame.loops.push(LoopContext { kind, break_label: None, continue_label: Some(continue_label.clone()) });
        self.frame.runtime_depth += 1;
        self.frame.table.enter_scope();
        for (name, var) in bindings {
            self.bind(name, Binding::Runtime(var));
        }
        let result = self.lower_block(body);
        self.frame.table.exit_scope();
        self.frame.runtime_depth -= 1;
        self.frame.loops.pop();
        result?;
        self.emit_label(&continue_label, node)?;
        let end = self.emit(IROp::EndFor, node)?;
        self.ir.patch_loop_end(header, end);
        Ok(())
    }

    fn lower_while(&mut self, condition: &AstNode, body: &[AstNode], node: &AstNode) -> LowerResult<()> {
        let top = self.ir.new_label("while_top");
        let exit = self.ir.new_label("while_exit");
        self.emit_label(&top, node)?;
        let cond = self.lower_expr(condition)?;
        if let Some(value) = cond.as_static() {
            if !static_eval::truthy(value) {
                return Ok(());
            }
        } else {
            let (reg, dtype) = self.scalar(cond, condition)?;
            let cond = self.truth_reg(reg, dtype, condition)?;
            self.emit_branch(IROp::BrFalse { cond, target: 0 }, &exit, node)?;
        }

        self.frame.loops.push(LoopContext {
            kind: LoopKind::While,
            break_label: Some(exit.clone()),
            continue_label: Some(top.clone()),
        });
        self.frame.runtime_depth += 1;
        let result = self.lower_scoped_block(body);
        self.frame.runtime_depth -= 1;
        self.frame.loops.pop();
        result?;
        self.emit_branch(IROp::Jump { target: 0 }, &top, node)?;
        self.emit_label(&exit, node)
    }

    fn lower_break(&mut self, node: &AstNode) -> LowerResult<()> {
        let Some(ctx) = self.frame.loops.last() else {
            return Err(error(DiagnosticKind::Syntax, "'break' outside loop", node));
        };
        match (&ctx.kind, &ctx.break_label) {
            (LoopKind::While, Some(label)) => {
                let label = label.clone();
                self.emit_branch(IROp::Jump { target: 0 }, &label, node)?;
                Ok(())
            }
            _ => Err(error(
                DiagnosticKind::UnsupportedConstruct,
                "'break' is only supported inside while loops",
                node,
            )),
        }
    }

    fn lower_continue(&mut self, node: &AstNode) -> LowerResult<()> {
        let Some(ctx) = self.frame.loops.last() else {
            return Err(error(DiagnosticKind::Syntax, "'continue' not properly in loop", node));
        };
        match &ctx.continue_label {
            Some(label) => {
                let label = label.clone();
                self.emit_branch(IROp::Jump { target: 0 }, &label, node)?;
                Ok(())
            }
            None => Err(error(
                DiagnosticKind::UnsupportedConstruct,
                "'continue' is not supported inside static loops",
                node,
            )),
        }
    }

    // ------- return -------

    fn lower_return(&mut self, value: Option<&AstNode>, node: &AstNode) -> LowerResult<Flow> {
        match self.frame.role {
            FrameRole::Kernel => {
                match (value, self.ir.ret) {
                    (Some(value), Some(ret)) => {
                        let operand = self.lower_expr(value)?;
                        let (reg, dtype) = self.scalar(operand, value)?;
                        let src = self.cast_reg(reg, dtype, ret, value)?;
                        self.emit(IROp::Ret { src }, node)?;
                    }
                    (None, None) => {
                        self.emit(IROp::Halt, node)?;
                    }
                    (Some(_), None) => {
                        return Err(error(
                            DiagnosticKind::TypeMismatch,
                            "A kernel without a return type annotation cannot return a value",
                            node,
                        ));
                    }
                    (None, Some(ret)) => {
                        return Err(error(
                            DiagnosticKind::TypeMismatch,
                            format!("A kernel returning {} must return a value", ret),
                            node,
                        ));
                    }
                }
                Ok(if self.frame.runtime_depth == 0 { Flow::Returned } else { Flow::Normal })
            }
            FrameRole::Func | FrameRole::Host => {
                if self.frame.runtime_depth > 0 {
                    return Err(error(DiagnosticKind::UnsupportedConstruct, RETURN_IN_RUNTIME_CONTROL, node));
                }
                let result = match value {
                    Some(value) => self.lower_expr(value)?,
                    None => Operand::Static(StaticValue::None),
                };
                self.frame.return_value = Some(result);
                Ok(Flow::Returned)
            }
            FrameRole::Script => Err(error(DiagnosticKind::Syntax, "'return' outside function", node)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_values_convert_to_numbers() {
        assert_eq!(static_to_value(&StaticValue::Bool(true)), Some(Value::Int(1)));
        assert_eq!(static_to_value(&StaticValue::Float(0.5)), Some(Value::Float(0.5)));
        assert_eq!(static_to_value(&StaticValue::Str("a".into())), None);
        assert_eq!(value_to_static(Value::Int(4)), StaticValue::Int(4));
    }
}
