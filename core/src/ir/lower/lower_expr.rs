//! file: core/src/ir/lower/lower_expr.rs
//! description: expression lowering.
//!
//! Every expression lowers to an `Operand`. Subtrees whose inputs are all
//! static fold to `Operand::Static` and emit nothing; anything touching a
//! runtime value emits typed IR ops.

use crate::analyzers::err::STATIC_ELEMENT_ASSIGN;
use crate::analyzers::{DiagnosticKind, check_compare_ops};
use crate::ast::{AstNode, AstNodeKind, BinaryOperator, BoolOperator, CompareOperator, UnaryOperator};
use crate::ir::op::{BinOp, GlobalRef, IROp, Register, UnOp};
use crate::ir::value::{DataType, Value};
use crate::vm::field::Layout;

use super::lowering_context::{LowerMode, LowerResult, LoweringContext, error};
use super::operand::{Binding, Operand, Place, RtMatrix};
use super::static_eval;
use super::static_value::{Builtin, StaticValue};
use super::{cmp_bin_op, to_bin_op};

/// Root of an assignable or indexable expression.
pub(crate) enum PlaceBase {
    Place(Place),
    Value(Operand),
}

fn is_static_container(value: &StaticValue) -> bool {
    matches!(
        value,
        StaticValue::Tuple(_)
            | StaticValue::List(_)
            | StaticValue::Str(_)
            | StaticValue::Range { .. }
            | StaticValue::NdRange(_)
            | StaticValue::Matrix(_)
    )
}

fn flatten(operands: Vec<Operand>) -> Vec<Operand> {
    let mut out = Vec::with_capacity(operands.len());
    for operand in operands {
        match operand {
            Operand::Tuple(items) => out.extend(flatten(items)),
            Operand::Static(StaticValue::Tuple(items)) => {
                out.extend(flatten(items.into_iter().map(Operand::Static).collect()))
            }
            other => out.push(other),
        }
    }
    out
}

pub(crate) fn static_ints(indices: &[Operand]) -> Option<Vec<i64>> {
    flatten(indices.to_vec())
        .iter()
        .map(|op| match op {
            Operand::Static(v @ (StaticValue::Int(_) | StaticValue::Bool(_))) => v.as_int(),
            _ => None,
        })
        .collect()
}

/// Row-major entry offset of `indices` in a `rows x cols` matrix.
fn matrix_offset(rows: usize, cols: usize, indices: &[i64]) -> Option<usize> {
    let pick = |i: i64, n: usize| if i >= 0 && (i as usize) < n { Some(i as usize) } else { None };
    match indices {
        [i] if cols == 1 => pick(*i, rows),
        [i] if rows == 1 => pick(*i, cols),
        [i, j] => Some(pick(*i, rows)? * cols + pick(*j, cols)?),
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
    pub fn lower_expr(&mut self, node: &AstNode) -> LowerResult<Operand> {
        match &node.kind {
            AstNodeKind::Integer { value } => Ok(Operand::Static(StaticValue::Int(*value))),
            AstNodeKind::Float { value } => Ok(Operand::Static(StaticValue::Float(*value))),
            AstNodeKind::Bool { value } => Ok(Operand::Static(StaticValue::Bool(*value))),
            AstNodeKind::String { value } => Ok(Operand::Static(StaticValue::Str(value.clone()))),
            AstNodeKind::None => Ok(Operand::Static(StaticValue::None)),
            AstNodeKind::Identifier { name } => self.lower_name(name, node),
            AstNodeKind::List { elements } => self.lower_sequence(elements, true),
            AstNodeKind::Tuple { elements } => self.lower_sequence(elements, false),
            AstNodeKind::BinaryOp { left, op, right } => {
                let l = self.lower_expr(left)?;
                let r = self.lower_expr(right)?;
                self.lower_binary(*op, l, r, node)
            }
            AstNodeKind::UnaryOp { op, expr } => {
                let operand = self.lower_expr(expr)?;
                self.lower_unary(*op, operand, node)
            }
            AstNodeKind::Compare { left, ops, comparators } => self.lower_compare(left, ops, comparators, node),
            AstNodeKind::BoolOp { op, values } => self.lower_bool_op(*op, values, node),
            AstNodeKind::IfExp { condition, body, orelse } => self.lower_if_exp(condition, body, orelse, node),
            AstNodeKind::Call { callee, args, keywords } => self.lower_call(callee, args, keywords, node),
            AstNodeKind::Subscript { object, indices } => {
                let base = self.place_base(object)?;
                let idx = self.lower_indices(indices)?;
                self.read_subscript(base, idx, node)
            }
            AstNodeKind::Attribute { object, name } => self.lower_attribute(object, name, node),
            AstNodeKind::FormatString { parts } => {
                let pieces = self.format_string_pieces(parts)?;
                self.pieces_to_static(pieces, node)
            }
            other => Err(error(
                DiagnosticKind::UnsupportedConstruct,
                format!("'{}' is not an expression", other),
                node,
            )),
        }
    }

    fn lower_name(&mut self, name: &str, node: &AstNode) -> LowerResult<Operand> {
        match self.lookup(name) {
            Some(Binding::Runtime(var)) => self.load_var(&var, node),
            Some(Binding::Static(value)) => Ok(Operand::Static(value)),
            None => Err(error(
                DiagnosticKind::UndefinedName,
                format!("Name '{}' is not defined", name),
                node,
            )),
        }
    }

    fn lower_sequence(&mut self, elements: &[AstNode], is_list: bool) -> LowerResult<Operand> {
        let mut items = Vec::with_capacity(elements.len());
        for element in elements {
            items.push(self.lower_expr(element)?);
        }
        if items.iter().all(Operand::is_static) {
            let values: Vec<StaticValue> = items.into_iter().filter_map(Operand::into_static).collect();
            return Ok(Operand::Static(if is_list { StaticValue::List(values) } else { StaticValue::Tuple(values) }));
        }
        Ok(Operand::Tuple(items))
    }

    pub(crate) fn lower_indices(&mut self, indices: &[AstNode]) -> LowerResult<Vec<Operand>> {
        indices.iter().map(|i| self.lower_expr(i)).collect()
    }

    // ------- arithmetic -------

    pub fn lower_binary(&mut self, op: BinaryOperator, l: Operand, r: Operand, node: &AstNode) -> LowerResult<Operand> {
        let is_matrix = |o: &Operand| matches!(o, Operand::Matrix(_) | Operand::Static(StaticValue::Matrix(_)));
        match (l, r) {
            (Operand::Static(a), Operand::Static(b)) => static_eval::binary(op, &a, &b)
                .map(Operand::Static)
                .map_err(|m| error(DiagnosticKind::TypeMismatch, m, node)),
            (l, r) if is_matrix(&l) || is_matrix(&r) => self.matrix_binary(op, l, r, node),
            (l, Operand::Static(StaticValue::Int(exp))) if op == BinaryOperator::Pow && exp >= 0 => {
                let base = self.scalar(l, node)?;
                let reg = self.pow_by_squaring(base, exp as u64, node)?;
                Ok(Operand::Scalar { reg, dtype: base.1 })
            }
            (l, r) => {
                let a = self.scalar(l, node)?;
                let b = self.scalar(r, node)?;
                let (reg, dtype) = self.scalar_binary(op, a, b, node)?;
                Ok(Operand::Scalar { reg, dtype })
            }
        }
    }

    pub(crate) fn scalar_binary(
        &mut self,
        op: BinaryOperator,
        a: (Register, DataType),
        b: (Register, DataType),
        node: &AstNode,
    ) -> LowerResult<(Register, DataType)> {
        let Some(bin) = to_bin_op(op) else {
            return Err(error(
                DiagnosticKind::TypeMismatch,
                format!("Operator '{}' requires matrix operands", op.symbol()),
                node,
            ));
        };
        let dtype = match op {
            BinaryOperator::Div if a.1.is_int() && b.1.is_int() => self.config.default_float,
            _ if op.is_bitwise() && !(a.1.is_int() && b.1.is_int()) => {
                return Err(error(
                    DiagnosticKind::TypeMismatch,
                    format!("Operator '{}' requires integer operands, got {} and {}", op.symbol(), a.1, b.1),
                    node,
                ));
            }
            _ => DataType::promote(a.1, b.1),
        };
        let reg = self.binary_reg(bin, a, b, dtype, node)?;
        Ok((reg, dtype))
    }

    /// `base ** exp` as a chain of multiplications.
    fn pow_by_squaring(&mut self, base: (Register, DataType), exp: u64, node: &AstNode) -> LowerResult<Register> {
        let dtype = base.1;
        let mut result: Option<Register> = None;
        let mut square = base.0;
        let mut e = exp;
        while e > 0 {
            if e & 1 == 1 {
                result = Some(match result {
                    None => square,
                    Some(acc) => self.binary_reg(BinOp::Mul, (acc, dtype), (square, dtype), dtype, node)?,
                });
            }
            e >>= 1;
            if e > 0 {
                square = self.binary_reg(BinOp::Mul, (square, dtype), (square, dtype), dtype, node)?;
            }
        }
        match result {
            Some(reg) => Ok(reg),
            None => self.const_reg(Value::Int(1).cast(dtype), node),
        }
    }

    fn matrix_binary(&mut self, op: BinaryOperator, l: Operand, r: Operand, node: &AstNode) -> LowerResult<Operand> {
        if op == BinaryOperator::MatMul {
            let a = self.matrix(l, node)?;
            let b = self.matrix(r, node)?;
            if a.cols != b.rows {
                return Err(error(
                    DiagnosticKind::TypeMismatch,
                    format!("Cannot multiply a {}x{} matrix by a {}x{} matrix", a.rows, a.cols, b.rows, b.cols),
                    node,
                ));
            }
            let mut entries = Vec::with_capacity(a.rows * b.cols);
            for row in 0..a.rows {
                for col in 0..b.cols {
                    let mut acc: Option<(Register, DataType)> = None;
                    for k in 0..a.cols {
                        let prod = self.scalar_binary(
                            BinaryOperator::Mul,
                            a.entries[row * a.cols + k],
                            b.entries[k * b.cols + col],
                            node,
                        )?;
                        acc = Some(match acc {
                            None => prod,
                            Some(sum) => self.scalar_binary(BinaryOperator::Add, sum, prod, node)?,
                        });
                    }
                    match acc {
                        Some(entry) => entries.push(entry),
                        None => entries.push((self.const_reg(Value::Int(0), node)?, self.config.default_int)),
                    }
                }
            }
            return Ok(Operand::Matrix(RtMatrix { rows: a.rows, cols: b.cols, entries, is_vector: b.is_vector }));
        }

        let as_matrix = |ctx: &mut Self, o: Operand| -> LowerResult<Result<RtMatrix, (Register, DataType)>> {
            match o {
                Operand::Matrix(_) | Operand::Static(StaticValue::Matrix(_)) => Ok(Ok(ctx.matrix(o, node)?)),
                other => Ok(Err(ctx.scalar(other, node)?)),
            }
        };
        let lm = as_matrix(self, l)?;
        let rm = as_matrix(self, r)?;
        let (rows, cols, is_vector) = match (&lm, &rm) {
            (Ok(a), Ok(b)) => {
                if (a.rows, a.cols) != (b.rows, b.cols) {
                    return Err(error(
                        DiagnosticKind::TypeMismatch,
                        format!(
                            "Matrix shapes {}x{} and {}x{} do not match for '{}'",
                            a.rows, a.cols, b.rows, b.cols, op.symbol()
                        ),
                        node,
                    ));
                }
                (a.rows, a.cols, a.is_vector)
            }
            (Ok(a), Err(_)) | (Err(_), Ok(a)) => (a.rows, a.cols, a.is_vector),
            (Err(_), Err(_)) => {
                return Err(error(DiagnosticKind::TypeMismatch, "Expected a matrix operand", node));
            }
        };
        let pick = |side: &Result<RtMatrix, (Register, DataType)>, i: usize| match side {
            Ok(m) => m.entries[i],
            Err(s) => *s,
        };
        let mut entries = Vec::with_capacity(rows * cols);
        for i in 0..rows * cols {
            let (a, b) = (pick(&lm, i), pick(&rm, i));
            entries.push(self.scalar_binary(op, a, b, node)?);
        }
        Ok(Operand::Matrix(RtMatrix { rows, cols, entries, is_vector }))
    }

    pub fn lower_unary(&mut self, op: UnaryOperator, operand: Operand, node: &AstNode) -> LowerResult<Operand> {
        match operand {
            Operand::Static(v) => static_eval::unary(op, &v)
                .map(Operand::Static)
                .map_err(|m| error(DiagnosticKind::TypeMismatch, m, node)),
            Operand::Matrix(m) if matches!(op, UnaryOperator::Plus | UnaryOperator::Minus) => {
                let mut entries = Vec::with_capacity(m.entries.len());
                for (reg, dtype) in m.entries.iter().copied() {
                    match self.lower_unary(op, Operand::Scalar { reg, dtype }, node)? {
                        Operand::Scalar { reg, dtype } => entries.push((reg, dtype)),
                        other => entries.push(self.scalar(other, node)?),
                    }
                }
                Ok(Operand::Matrix(RtMatrix { entries, ..m }))
            }
            other => {
                let (src, dtype) = self.scalar(other, node)?;
                let (un, result_type) = match op {
                    UnaryOperator::Plus => return Ok(Operand::Scalar { reg: src, dtype }),
                    UnaryOperator::Minus => (UnOp::Neg, dtype),
                    UnaryOperator::Not => (UnOp::Not, DataType::I32),
                    UnaryOperator::Invert if dtype.is_int() => (UnOp::BitNot, dtype),
                    UnaryOperator::Invert => {
                        return Err(error(
                            DiagnosticKind::TypeMismatch,
                            format!("Operator '~' requires an integer operand, got {}", dtype),
                            node,
                        ));
                    }
                };
                let dest = self.ir.alloc_reg();
                self.emit(IROp::Unary { op: un, dest, src, dtype }, node)?;
                Ok(Operand::Scalar { reg: dest, dtype: result_type })
            }
        }
    }

    // ------- comparisons and logic -------

    fn compare_pair(&mut self, op: CompareOperator, l: Operand, r: Operand, node: &AstNode) -> LowerResult<Operand> {
        if let (Operand::Static(a), Operand::Static(b)) = (&l, &r) {
            return static_eval::compare(op, a, b)
                .map(|v| Operand::Static(StaticValue::Bool(v)))
                .map_err(|m| error(DiagnosticKind::TypeMismatch, m, node));
        }
        let a = self.scalar(l, node)?;
        let b = self.scalar(r, node)?;
        let Some(bin) = cmp_bin_op(op) else {
            return Err(error(
                DiagnosticKind::UnsupportedConstruct,
                format!("Operator '{}' is not supported", op.symbol()),
                node,
            ));
        };
        let dtype = DataType::promote(a.1, b.1);
        let reg = self.binary_reg(bin, a, b, dtype, node)?;
        Ok(Operand::Scalar { reg, dtype: DataType::I32 })
    }

    /// `a < b < c` lowers to `(a < b) and (b < c)`: every operand is
    /// evaluated once, left to right, stopping at the first false pair.
    fn lower_compare(
        &mut self,
        left: &AstNode,
        ops: &[CompareOperator],
        comparators: &[AstNode],
        node: &AstNode,
    ) -> LowerResult<Operand> {
        check_compare_ops(ops, node)?;
        let mut lhs = self.lower_expr(left)?;
        if let ([op], [right]) = (ops, comparators) {
            let rhs = self.lower_expr(right)?;
            return self.compare_pair(*op, lhs, rhs, node);
        }

        let end_label = self.ir.new_label("cmp_end");
        let mut result_local: Option<usize> = None;
        let last = ops.len().saturating_sub(1);
        for (i, (op, right)) in ops.iter().zip(comparators).enumerate() {
            let rhs = self.lower_expr(right)?;
            let pair = self.compare_pair(*op, lhs, rhs.clone(), node)?;
            lhs = rhs;
            match pair {
                Operand::Static(v) if static_eval::truthy(&v) => continue,
                Operand::Static(_) => match result_local {
                    None => return Ok(Operand::Static(StaticValue::Bool(false))),
                    Some(local) => {
                        let zero = self.const_reg(Value::Int(0), node)?;
                        self.emit(IROp::SLocal { src: zero, local_index: local }, node)?;
                        break;
                    }
                },
                other => {
                    let (reg, _) = self.scalar(other, node)?;
                    let local = match result_local {
                        Some(local) => local,
                        None => {
                            let local = self.ir.alloc_local(DataType::I32);
                            result_local = Some(local);
                            local
                        }
                    };
                    self.emit(IROp::SLocal { src: reg, local_index: local }, node)?;
                    if i < last {
                        self.emit_branch(IROp::BrFalse { cond: reg, target: 0 }, &end_label, node)?;
                    }
                }
            }
        }
        match result_local {
            None => Ok(Operand::Static(StaticValue::Bool(true))),
            Some(local) => {
                self.emit_label(&end_label, node)?;
                self.load_place(&Place::Local { local, dtype: DataType::I32 }, node)
            }
        }
    }

    fn lower_bool_op(&mut self, op: BoolOperator, values: &[AstNode], node: &AstNode) -> LowerResult<Operand> {
        let end_label = self.ir.new_label("bool_end");
        let mut result_local: Option<usize> = None;
        for (i, value) in values.iter().enumerate() {
            let is_last = i + 1 == values.len();
            match self.lower_expr(value)? {
                Operand::Static(v) => {
                    let truth = static_eval::truthy(&v);
                    let decisive = match op {
                        BoolOperator::And => !truth,
                        BoolOperator::Or => truth,
                    };
                    if !decisive && !is_last {
                        continue;
                    }
                    let Some(local) = result_local else {
                        return Ok(Operand::Static(v));
                    };
                    let reg = self.const_reg(Value::Int(truth as i64), node)?;
                    self.emit(IROp::SLocal { src: reg, local_index: local }, node)?;
                    break;
                }
                other => {
                    let (reg, dtype) = self.scalar(other, node)?;
                    let truth = self.truth_reg(reg, dtype, node)?;
                    let local = match result_local {
                        Some(local) => local,
                        None => {
                            let local = self.ir.alloc_local(DataType::I32);
                            result_local = Some(local);
                            local
                        }
                    };
                    self.emit(IROp::SLocal { src: truth, local_index: local }, node)?;
                    if !is_last {
                        let branch = match op {
                            BoolOperator::And => IROp::BrFalse { cond: truth, target: 0 },
                            BoolOperator::Or => IROp::BrTrue { cond: truth, target: 0 },
                        };
                        self.emit_branch(branch, &end_label, node)?;
                    }
                }
            }
        }
        match result_local {
            None => Ok(Operand::Static(StaticValue::None)),
            Some(local) => {
                self.emit_label(&end_label, node)?;
                self.load_place(&Place::Local { local, dtype: DataType::I32 }, node)
            }
        }
    }

    fn lower_if_exp(
        &mut self,
        condition: &AstNode,
        body: &AstNode,
        orelse: &AstNode,
        node: &AstNode,
    ) -> LowerResult<Operand> {
        let cond = self.lower_expr(condition)?;
        if let Operand::Static(v) = &cond {
            return if static_eval::truthy(v) { self.lower_expr(body) } else { self.lower_expr(orelse) };
        }
        let (c, _) = self.scalar(cond, condition)?;
        let on_true = self.lower_expr(body)?;
        let on_false = self.lower_expr(orelse)?;
        self.select(c, on_true, on_false, node)
    }

    fn select(&mut self, cond: Register, on_true: Operand, on_false: Operand, node: &AstNode) -> LowerResult<Operand> {
        let is_matrix = |o: &Operand| matches!(o, Operand::Matrix(_) | Operand::Static(StaticValue::Matrix(_)));
        if is_matrix(&on_true) || is_matrix(&on_false) {
            let a = self.matrix(on_true, node)?;
            let b = self.matrix(on_false, node)?;
            if (a.rows, a.cols) != (b.rows, b.cols) {
                return Err(error(DiagnosticKind::TypeMismatch, "Both branches must have the same shape", node));
            }
            let mut entries = Vec::with_capacity(a.entries.len());
            for (x, y) in a.entries.iter().zip(&b.entries) {
                if let Operand::Scalar { reg, dtype } =
                    self.select(cond, Operand::Scalar { reg: x.0, dtype: x.1 }, Operand::Scalar { reg: y.0, dtype: y.1 }, node)?
                {
                    entries.push((reg, dtype));
                }
            }
            return Ok(Operand::Matrix(RtMatrix { entries, ..a }));
        }
        let (t, tt) = self.scalar(on_true, node)?;
        let (f, ft) = self.scalar(on_false, node)?;
        let dtype = DataType::promote(tt, ft);
        let on_true = self.cast_reg(t, tt, dtype, node)?;
        let on_false = self.cast_reg(f, ft, dtype, node)?;
        let dest = self.ir.alloc_reg();
        self.emit(IROp::Select { dest, cond, on_true, on_false }, node)?;
        Ok(Operand::Scalar { reg: dest, dtype })
    }

    // ------- calls and attributes -------

    fn lower_call(
        &mut self,
        callee: &AstNode,
        args: &[AstNode],
        keywords: &[crate::ast::Keyword],
        node: &AstNode,
    ) -> LowerResult<Operand> {
        if let AstNodeKind::Attribute { object, name } = &callee.kind {
            if name == "format" {
                let pieces = self.format_method_pieces(object, args, node)?;
                return self.pieces_to_static(pieces, node);
            }
        }
        match self.lower_expr(callee)? {
            Operand::Static(StaticValue::Builtin(builtin)) => self.call_builtin(builtin, args, keywords, node),
            Operand::Static(StaticValue::Function(name)) => self.inline_call(&name, args, keywords, node),
            Operand::Static(StaticValue::DataType(dtype)) => {
                let [arg] = args else {
                    return Err(error(
                        DiagnosticKind::InvalidCall,
                        format!("{}() takes exactly one argument", dtype),
                        node,
                    ));
                };
                let value = self.lower_expr(arg)?;
                self.cast_operand(value, dtype, node)
            }
            other => Err(error(
                DiagnosticKind::InvalidCall,
                format!("A {} is not callable", other.describe()),
                node,
            )),
        }
    }

    fn lower_attribute(&mut self, object: &AstNode, name: &str, node: &AstNode) -> LowerResult<Operand> {
        let value = self.lower_expr(object)?;
        let attr = match (&value, name) {
            (Operand::Static(StaticValue::Builtin(Builtin::Layout)), "AOS") => StaticValue::Layout(Layout::AOS),
            (Operand::Static(StaticValue::Builtin(Builtin::Layout)), "SOA") => StaticValue::Layout(Layout::SOA),
            (Operand::Static(StaticValue::Field(f)), "shape") => {
                StaticValue::Tuple(f.shape().iter().map(|d| StaticValue::Int(*d as i64)).collect())
            }
            (Operand::Static(StaticValue::Field(f)), "dtype") => StaticValue::DataType(f.dtype()),
            (Operand::Static(StaticValue::NdArray(a)), "dtype") => StaticValue::DataType(a.dtype),
            (Operand::Static(StaticValue::Matrix(m)), "n") => StaticValue::Int(m.rows as i64),
            (Operand::Static(StaticValue::Matrix(m)), "m") => StaticValue::Int(m.cols as i64),
            (Operand::Matrix(m), "n") => StaticValue::Int(m.rows as i64),
            (Operand::Matrix(m), "m") => StaticValue::Int(m.cols as i64),
            _ => {
                return Err(error(
                    DiagnosticKind::UnsupportedConstruct,
                    format!("Attribute '{}' is not supported on a {}", name, value.describe()),
                    node,
                ));
            }
        };
        Ok(Operand::Static(attr))
    }

    /// Converts `value` to `dtype`: host conversion for statics, `Cast`
    /// ops for runtime values.
    pub(crate) fn cast_operand(&mut self, value: Operand, dtype: DataType, node: &AstNode) -> LowerResult<Operand> {
        match value {
            Operand::Static(v) if v.is_numeric() => {
                let converted = if dtype.is_int() {
                    match v.as_f64() {
                        Some(f) if matches!(v, StaticValue::Float(_)) => {
                            log::warn!("[lower] casting static {} to {} truncates", f, dtype);
                            Value::Float(f).cast(dtype)
                        }
                        _ => Value::Int(v.as_int().unwrap_or(0)).cast(dtype),
                    }
                } else {
                    Value::Float(v.as_f64().unwrap_or(0.0)).cast(dtype)
                };
                Ok(Operand::Static(value_to_static(converted)))
            }
            Operand::Matrix(_) | Operand::Static(StaticValue::Matrix(_)) => {
                let m = self.matrix(value, node)?;
                let mut entries = Vec::with_capacity(m.entries.len());
                for (reg, from) in m.entries.iter().copied() {
                    entries.push((self.cast_reg(reg, from, dtype, node)?, dtype));
                }
                Ok(Operand::Matrix(RtMatrix { entries, ..m }))
            }
            other => {
                let (reg, from) = self.scalar(other, node)?;
                let reg = self.cast_reg(reg, from, dtype, node)?;
                Ok(Operand::Scalar { reg, dtype })
            }
        }
    }

    // ------- subscripts and places -------

    /// Resolves the object of a subscript without loading matrix-valued
    /// places, so `x[i, j][0, 0]` touches a single element.
    pub(crate) fn place_base(&mut self, node: &AstNode) -> LowerResult<PlaceBase> {
        match &node.kind {
            AstNodeKind::Identifier { name } => {
                if let Some(Binding::Runtime(var)) = self.lookup(name) {
                    return Ok(PlaceBase::Place(var.as_place()));
                }
            }
            AstNodeKind::Subscript { object, indices } => {
                let base = self.place_base(object)?;
                let idx = self.lower_indices(indices)?;
                let static_container =
                    matches!(&base, PlaceBase::Value(Operand::Static(v)) if is_static_container(v));
                if static_container || matches!(&base, PlaceBase::Value(Operand::Tuple(_) | Operand::Matrix(_))) {
                    return self.read_subscript(base, idx, node).map(PlaceBase::Value);
                }
                return Ok(PlaceBase::Place(self.subscript_place(base, idx, node)?));
            }
            _ => {}
        }
        Ok(PlaceBase::Value(self.lower_expr(node)?))
    }

    pub(crate) fn read_subscript(&mut self, base: PlaceBase, idx: Vec<Operand>, node: &AstNode) -> LowerResult<Operand> {
        match &base {
            PlaceBase::Value(Operand::Static(container)) if is_static_container(container) => {
                let values: Option<Vec<StaticValue>> = idx.iter().cloned().map(Operand::into_static).collect();
                let Some(values) = values else {
                    return Err(error(
                        DiagnosticKind::TypeMismatch,
                        format!("A static {} can only be indexed with compile-time values", container.type_name()),
                        node,
                    ));
                };
                return static_eval::index(container, &values)
                    .map(Operand::Static)
                    .map_err(|m| error(DiagnosticKind::InvalidArgument, m, node));
            }
            PlaceBase::Value(Operand::Static(StaticValue::Field(field))) if self.mode == LowerMode::Script => {
                let Some(ints) = static_ints(&idx) else {
                    return Err(error(DiagnosticKind::TypeMismatch, "Field indices must be integers", node));
                };
                return field
                    .get(&ints)
                    .map(|v| Operand::Static(value_to_static(v)))
                    .map_err(|e| error(DiagnosticKind::InvalidArgument, e.to_string(), node));
            }
            PlaceBase::Value(Operand::Matrix(m)) => {
                let entry = static_ints(&idx).and_then(|ints| matrix_offset(m.rows, m.cols, &ints));
                let Some(offset) = entry else {
                    return Err(error(
                        DiagnosticKind::InvalidArgument,
                        format!("Invalid index into a {}x{} matrix; indices must be in-range constants", m.rows, m.cols),
                        node,
                    ));
                };
                let (reg, dtype) = m.entries[offset];
                return Ok(Operand::Scalar { reg, dtype });
            }
            PlaceBase::Value(Operand::Tuple(items)) => {
                let picked = match static_ints(&idx).as_deref() {
                    Some([i]) if *i >= 0 => items.get(*i as usize).cloned(),
                    Some([i]) => items.len().checked_sub(i.unsigned_abs() as usize).and_then(|k| items.get(k).cloned()),
                    _ => None,
                };
                return picked.ok_or_else(|| {
                    error(DiagnosticKind::InvalidArgument, "Tuple index must be an in-range constant", node)
                });
            }
            _ => {}
        }
        let place = self.subscript_place(base, idx, node)?;
        self.load_place(&place, node)
    }

    pub(crate) fn index_regs(&mut self, idx: Vec<Operand>, node: &AstNode) -> LowerResult<Vec<Register>> {
        let mut regs = Vec::with_capacity(idx.len());
        for operand in flatten(idx) {
            let (reg, dtype) = self.scalar(operand, node)?;
            if !dtype.is_int() {
                return Err(error(
                    DiagnosticKind::TypeMismatch,
                    format!("Indices must be integers, found {}", dtype),
                    node,
                ));
            }
            regs.push(reg);
        }
        Ok(regs)
    }

    pub(crate) fn subscript_place(&mut self, base: PlaceBase, idx: Vec<Operand>, node: &AstNode) -> LowerResult<Place> {
        match base {
            PlaceBase::Place(Place::Matrix { rows, cols, entries, .. }) => {
                let offset = static_ints(&idx).and_then(|ints| matrix_offset(rows, cols, &ints));
                offset.and_then(|o| entries.get(o).cloned()).ok_or_else(|| {
                    error(
                        DiagnosticKind::InvalidArgument,
                        format!("Invalid index into a {}x{} matrix; indices must be in-range constants", rows, cols),
                        node,
                    )
                })
            }
            PlaceBase::Place(_) => Err(error(DiagnosticKind::TypeMismatch, "Scalar values cannot be indexed", node)),
            PlaceBase::Value(Operand::Static(StaticValue::Field(field))) => {
                let indices = self.index_regs(idx, node)?;
                if indices.len() != field.shape().len() {
                    return Err(error(
                        DiagnosticKind::InvalidArgument,
                        format!("A {}-D field was indexed with {} indices", field.shape().len(), indices.len()),
                        node,
                    ));
                }
                let slot = self.ir.intern_field(&field);
                Ok(Place::Global { target: GlobalRef::Field(slot), indices, element: 0, dtype: field.dtype() })
            }
            PlaceBase::Value(Operand::Static(StaticValue::NdArray(array))) => {
                let indices = self.index_regs(idx, node)?;
                if indices.len() != array.ndim {
                    return Err(error(
                        DiagnosticKind::InvalidArgument,
                        format!("A {}-D array was indexed with {} indices", array.ndim, indices.len()),
                        node,
                    ));
                }
                let target = GlobalRef::Arg(array.arg);
                if array.element_shape.is_empty() {
                    return Ok(Place::Global { target, indices, element: 0, dtype: array.dtype });
                }
                let rows = array.element_shape[0];
                let cols = array.element_shape.get(1).copied().unwrap_or(1);
                let entries = (0..rows * cols)
                    .map(|element| Place::Global { target, indices: indices.clone(), element, dtype: array.dtype })
                    .collect();
                Ok(Place::Matrix { rows, cols, entries, is_vector: array.element_shape.len() == 1 })
            }
            PlaceBase::Value(Operand::Static(StaticValue::SparseBuilder { arg })) => {
                let indices = self.index_regs(idx, node)?;
                let &[row, col] = indices.as_slice() else {
                    return Err(error(
                        DiagnosticKind::InvalidArgument,
                        format!("A sparse matrix builder takes 2 indices, got {}", indices.len()),
                        node,
                    ));
                };
                Ok(Place::Sparse { arg, row, col })
            }
            PlaceBase::Value(Operand::Static(value)) if is_static_container(&value) => {
                Err(error(DiagnosticKind::IllegalStaticMutation, STATIC_ELEMENT_ASSIGN, node))
            }
            PlaceBase::Value(other) => Err(error(
                DiagnosticKind::TypeMismatch,
                format!("A {} cannot be indexed", other.describe()),
                node,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_offsets_are_row_major() {
        assert_eq!(matrix_offset(2, 3, &[1, 2]), Some(5));
        assert_eq!(matrix_offset(3, 1, &[2]), Some(2));
        assert_eq!(matrix_offset(2, 2, &[2, 0]), None);
        assert_eq!(matrix_offset(2, 2, &[0]), None);
    }

    #[test]
    fn tuple_indices_flatten() {
        let idx = vec![Operand::Static(StaticValue::Tuple(vec![StaticValue::Int(1), StaticValue::Int(2)]))];
        assert_eq!(static_ints(&idx), Some(vec![1, 2]));
        assert_eq!(static_ints(&[Operand::Static(StaticValue::Float(1.0))]), None);
    }
}
