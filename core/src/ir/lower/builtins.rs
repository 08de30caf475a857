//! file: core/src/ir/lower/builtins.rs
//! description: builtin calls and formatted printing.

use crate::analyzers::DiagnosticKind;
use crate::ast::{AstNode, AstNodeKind, CompareOperator, FormatPart, Keyword};
use crate::ir::op::{BinOp, IROp, PrintPart, UnOp};
use crate::ir::value::{DataType, Value};
use crate::vm::field::Field;

use super::lowering_context::{LowerMode, LowerResult, LoweringContext, error};
use super::operand::{Operand, RtMatrix};
use super::static_eval;
use super::static_value::{Builtin, StaticMatrix, StaticValue, render_matrix};

/// One piece of formatted output.
pub(crate) enum FmtPiece {
    Text(String),
    Value(Operand),
}

enum Slot {
    Text(String),
    Arg(usize),
}

/// Splits a `str.format` template into literal text and argument slots.
/// Format specs after `:` are accepted and ignored.
fn parse_format_template(template: &str) -> Result<Vec<Slot>, String> {
    let mut slots = Vec::new();
    let mut text = String::new();
    let mut next_auto = 0;
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                text.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                text.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => field.push(ch),
                        None => return Err("Single '{' encountered in format string".to_string()),
                    }
                }
                let name = field.split(':').next().unwrap_or("").trim();
                let index = if name.is_empty() {
                    next_auto += 1;
                    next_auto - 1
                } else {
                    name.parse::<usize>().map_err(|_| format!("Unsupported format field '{{{}}}'", field))?
                };
                if !text.is_empty() {
                    slots.push(Slot::Text(std::mem::take(&mut text)));
                }
                slots.push(Slot::Arg(index));
            }
            '}' => return Err("Single '}' encountered in format string".to_string()),
            other => text.push(other),
        }
    }
    if !text.is_empty() {
        slots.push(Slot::Text(text));
    }
    Ok(slots)
}

fn keyword<'k>(keywords: &'k [Keyword], name: &str) -> Option<&'k AstNode> {
    keywords.iter().find(|k| k.name == name).map(|k| &k.value)
}

impl<'a> LoweringContext<'a> {
    fn expect_args<'n>(&self, builtin: Builtin, args: &'n [AstNode], range: std::ops::RangeInclusive<usize>, node: &AstNode) -> LowerResult<&'n [AstNode]> {
        if range.contains(&args.len()) {
            return Ok(args);
        }
        let expected = if range.start() == range.end() {
            range.start().to_string()
        } else {
            format!("{} to {}", range.start(), range.end())
        };
        Err(error(
            DiagnosticKind::InvalidCall,
            format!("{}() takes {} argument(s), got {}", builtin.name(), expected, args.len()),
            node,
        ))
    }

    fn static_arg(&mut self, arg: &AstNode, what: &str) -> LowerResult<StaticValue> {
        self.lower_expr(arg)?.into_static().ok_or_else(|| {
            error(DiagnosticKind::TypeMismatch, format!("{} must be a compile-time value", what), arg)
        })
    }

    fn static_int_arg(&mut self, arg: &AstNode, what: &str) -> LowerResult<i64> {
        match self.static_arg(arg, what)? {
            StaticValue::Int(i) => Ok(i),
            StaticValue::Bool(b) => Ok(b as i64),
            other => Err(error(
                DiagnosticKind::TypeMismatch,
                format!("{} must be an integer, found {}", what, other.type_name()),
                arg,
            )),
        }
    }

    pub(crate) fn call_builtin(
        &mut self,
        builtin: Builtin,
        args: &[AstNode],
        keywords: &[Keyword],
        node: &AstNode,
    ) -> LowerResult<Operand> {
        if !matches!(builtin, Builtin::Print | Builtin::Field | Builtin::AnyArr | Builtin::Matrix | Builtin::Vector) {
            if let Some(k) = keywords.first() {
                return Err(error(
                    DiagnosticKind::InvalidCall,
                    format!("{}() got an unexpected keyword argument '{}'", builtin.name(), k.name),
                    node,
                ));
            }
        }
        match builtin {
            Builtin::Static => self.call_static(args, node),
            Builtin::Range => {
                let args = self.expect_args(builtin, args, 1..=3, node)?;
                let mut bounds = Vec::with_capacity(args.len());
                for arg in args {
                    bounds.push(self.static_int_arg(arg, "range() bound")?);
                }
                let (start, stop, step) = match *bounds.as_slice() {
                    [stop] => (0, stop, 1),
                    [start, stop] => (start, stop, 1),
                    [start, stop, step] => (start, stop, step),
                    _ => (0, 0, 1),
                };
                if step == 0 {
                    return Err(error(DiagnosticKind::InvalidArgument, "range() arg 3 must not be zero", node));
                }
                Ok(Operand::Static(StaticValue::Range { start, stop, step }))
            }
            Builtin::NdRange => {
                let mut bounds = Vec::with_capacity(args.len());
                for arg in args {
                    let bound = match self.static_arg(arg, "ndrange() bound")? {
                        StaticValue::Tuple(pair) | StaticValue::List(pair) => match pair.as_slice() {
                            [a, b] => a.as_int().zip(b.as_int()),
                            _ => None,
                        },
                        other => other.as_int().map(|n| (0, n)),
                    };
                    bounds.push(bound.ok_or_else(|| {
                        error(DiagnosticKind::InvalidArgument, "ndrange() bounds must be ints or (begin, end) pairs", arg)
                    })?);
                }
                Ok(Operand::Static(StaticValue::NdRange(bounds)))
            }
            Builtin::Matrix | Builtin::Vector => self.call_matrix(builtin, args, keywords, node),
            Builtin::Subscript => {
                let Some((first, rest)) = args.split_first() else {
                    return Err(error(DiagnosticKind::InvalidCall, "subscript() needs a value to index", node));
                };
                let base = self.place_base(first)?;
                let idx = self.lower_indices(rest)?;
                self.read_subscript(base, idx, node)
            }
            Builtin::Cast => {
                let args = self.expect_args(builtin, args, 2..=2, node)?;
                let value = self.lower_expr(&args[0])?;
                let dtype = match self.static_arg(&args[1], "cast() type")? {
                    StaticValue::DataType(t) => t,
                    other => {
                        return Err(error(
                            DiagnosticKind::InvalidArgument,
                            format!("cast() expects a type, found {}", other.type_name()),
                            &args[1],
                        ));
                    }
                };
                self.cast_operand(value, dtype, node)
            }
            Builtin::TiFloat | Builtin::TiInt => {
                let args = self.expect_args(builtin, args, 1..=1, node)?;
                let value = self.lower_expr(&args[0])?;
                let dtype = if builtin == Builtin::TiFloat { self.config.default_float } else { self.config.default_int };
                self.cast_operand(value, dtype, node)
            }
            Builtin::Float | Builtin::Int => {
                let args = self.expect_args(builtin, args, 1..=1, node)?;
                match self.lower_expr(&args[0])? {
                    Operand::Static(v) if v.is_numeric() => Ok(Operand::Static(match builtin {
                        Builtin::Float => StaticValue::Float(v.as_f64().unwrap_or(0.0)),
                        _ => StaticValue::Int(match v {
                            StaticValue::Float(f) => f.trunc() as i64,
                            other => other.as_int().unwrap_or(0),
                        }),
                    })),
                    value => {
                        let dtype = if builtin == Builtin::Float { self.config.default_float } else { self.config.default_int };
                        self.cast_operand(value, dtype, node)
                    }
                }
            }
            Builtin::Abs => {
                let args = self.expect_args(builtin, args, 1..=1, node)?;
                match self.lower_expr(&args[0])? {
                    Operand::Static(StaticValue::Float(f)) => Ok(Operand::Static(StaticValue::Float(f.abs()))),
                    Operand::Static(v) if v.as_int().is_some() => {
                        Ok(Operand::Static(StaticValue::Int(v.as_int().unwrap_or(0).wrapping_abs())))
                    }
                    value => {
                        let (src, dtype) = self.scalar(value, node)?;
                        let dest = self.ir.alloc_reg();
                        self.emit(IROp::Unary { op: UnOp::Abs, dest, src, dtype }, node)?;
                        Ok(Operand::Scalar { reg: dest, dtype })
                    }
                }
            }
            Builtin::Min | Builtin::Max => self.call_min_max(builtin, args, node),
            Builtin::Len => {
                let args = self.expect_args(builtin, args, 1..=1, node)?;
                match self.lower_expr(&args[0])? {
                    Operand::Static(v) => static_eval::len(&v)
                        .map(|n| Operand::Static(StaticValue::Int(n)))
                        .map_err(|m| error(DiagnosticKind::TypeMismatch, m, node)),
                    Operand::Matrix(m) => Ok(Operand::Static(StaticValue::Int(m.rows as i64))),
                    Operand::Tuple(items) => Ok(Operand::Static(StaticValue::Int(items.len() as i64))),
                    other => Err(error(
                        DiagnosticKind::TypeMismatch,
                        format!("A {} has no len()", other.describe()),
                        node,
                    )),
                }
            }
            Builtin::Field => self.call_field(args, keywords, node),
            Builtin::AnyArr => {
                let element_dim = match keyword(keywords, "element_dim") {
                    Some(k) => Some(self.static_int_arg(k, "element_dim")? as usize),
                    None => None,
                };
                let layout = match keyword(keywords, "layout") {
                    Some(k) => match self.static_arg(k, "layout")? {
                        StaticValue::Layout(l) => Some(l),
                        other => {
                            return Err(error(
                                DiagnosticKind::InvalidArgument,
                                format!("layout must be Layout.AOS or Layout.SOA, found {}", other.type_name()),
                                k,
                            ));
                        }
                    },
                    None => None,
                };
                Ok(Operand::Static(StaticValue::ArraySpec { element_dim, layout }))
            }
            Builtin::Template => Ok(Operand::Static(StaticValue::Template)),
            Builtin::SparseMatrixBuilder => Ok(Operand::Static(StaticValue::SparseBuilderSpec)),
            Builtin::Print => self.lower_print(args, keywords, node),
            Builtin::Layout => Err(error(DiagnosticKind::InvalidCall, "Layout is not callable", node)),
        }
    }

    /// `static(x)` yields `x`; `static(a, b)` yields the tuple `(a, b)`.
    fn call_static(&mut self, args: &[AstNode], node: &AstNode) -> LowerResult<Operand> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.static_arg(arg, "The argument of static()")?);
        }
        match values.len() {
            0 => Err(error(DiagnosticKind::InvalidCall, "static() takes at least one argument", node)),
            1 => Ok(Operand::Static(values.remove(0))),
            _ => Ok(Operand::Static(StaticValue::Tuple(values))),
        }
    }

    fn call_matrix(&mut self, builtin: Builtin, args: &[AstNode], keywords: &[Keyword], node: &AstNode) -> LowerResult<Operand> {
        let args = self.expect_args(builtin, args, 1..=1, node)?;
        let dtype = match keyword(keywords, "dt") {
            Some(k) => match self.static_arg(k, "dt")? {
                StaticValue::DataType(t) => Some(t),
                other => {
                    return Err(error(
                        DiagnosticKind::InvalidArgument,
                        format!("dt must be a type, found {}", other.type_name()),
                        k,
                    ));
                }
            },
            None => None,
        };
        let rows_of = |operand: Operand| -> Vec<Operand> {
            match operand {
                Operand::Tuple(items) => items,
                Operand::Static(StaticValue::List(items) | StaticValue::Tuple(items)) => {
                    items.into_iter().map(Operand::Static).collect()
                }
                other => vec![other],
            }
        };
        let outer = rows_of(self.lower_expr(&args[0])?);
        let is_vector = builtin == Builtin::Vector
            || outer.iter().all(|r| {
                !matches!(r, Operand::Tuple(_) | Operand::Static(StaticValue::List(_) | StaticValue::Tuple(_)))
            });
        let rows: Vec<Vec<Operand>> = if is_vector { outer.into_iter().map(|e| vec![e]).collect() } else { outer.into_iter().map(rows_of).collect() };
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if rows.is_empty() || cols == 0 || rows.iter().any(|r| r.len() != cols) {
            return Err(error(
                DiagnosticKind::InvalidArgument,
                format!("{}() needs a non-empty rectangular list of numbers", builtin.name()),
                node,
            ));
        }
        let entries: Vec<Operand> = rows.into_iter().flatten().collect();
        let row_count = entries.len() / cols;
        if entries.iter().all(|e| matches!(e, Operand::Static(v) if v.is_numeric())) {
            let entries = entries
                .into_iter()
                .filter_map(Operand::into_static)
                .map(|v| match (dtype, v.as_f64()) {
                    (Some(t), Some(f)) if t.is_float() => StaticValue::Float(Value::Float(f).cast(t).as_f64()),
                    (Some(t), _) => StaticValue::Int(Value::Float(v.as_f64().unwrap_or(0.0)).cast(t).as_i64()),
                    (None, _) => v,
                })
                .collect();
            return Ok(Operand::Static(StaticValue::Matrix(StaticMatrix { rows: row_count, cols, entries, is_vector })));
        }
        let mut regs = Vec::with_capacity(entries.len());
        for entry in entries {
            let (reg, from) = self.scalar(entry, node)?;
            match dtype {
                Some(to) => regs.push((self.cast_reg(reg, from, to, node)?, to)),
                None => regs.push((reg, from)),
            }
        }
        Ok(Operand::Matrix(RtMatrix { rows: row_count, cols, entries: regs, is_vector }))
    }

    fn call_min_max(&mut self, builtin: Builtin, args: &[AstNode], node: &AstNode) -> LowerResult<Operand> {
        if args.len() < 2 {
            return Err(error(
                DiagnosticKind::InvalidCall,
                format!("{}() takes at least 2 arguments, got {}", builtin.name(), args.len()),
                node,
            ));
        }
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.lower_expr(arg)?);
        }
        if values.iter().all(|v| matches!(v, Operand::Static(s) if s.is_numeric())) {
            let mut best: Option<StaticValue> = None;
            for v in values.into_iter().filter_map(Operand::into_static) {
                best = Some(match best {
                    None => v,
                    Some(b) => {
                        let better = if builtin == Builtin::Min { CompareOperator::Lt } else { CompareOperator::Gt };
                        let take = static_eval::compare(better, &v, &b)
                            .map_err(|m| error(DiagnosticKind::TypeMismatch, m, node))?;
                        if take { v } else { b }
                    }
                });
            }
            return Ok(Operand::Static(best.unwrap_or(StaticValue::None)));
        }
        let op = if builtin == Builtin::Min { BinOp::Min } else { BinOp::Max };
        let mut iter = values.into_iter();
        let mut acc = match iter.next() {
            Some(first) => self.scalar(first, node)?,
            None => return Ok(Operand::Static(StaticValue::None)),
        };
        for v in iter {
            let next = self.scalar(v, node)?;
            let dtype = DataType::promote(acc.1, next.1);
            acc = (self.binary_reg(op, acc, next, dtype, node)?, dtype);
        }
        Ok(Operand::Scalar { reg: acc.0, dtype: acc.1 })
    }

    /// `field(dtype, shape=(n, m))`; only available outside kernels.
    fn call_field(&mut self, args: &[AstNode], keywords: &[Keyword], node: &AstNode) -> LowerResult<Operand> {
        if self.mode != LowerMode::Script {
            return Err(error(
                DiagnosticKind::InvalidCall,
                "field() can only be called at script level",
                node,
            ));
        }
        let dtype_node = args.first().or_else(|| keyword(keywords, "dtype"));
        let shape_node = args.get(1).or_else(|| keyword(keywords, "shape"));
        let (Some(dtype_node), Some(shape_node)) = (dtype_node, shape_node) else {
            return Err(error(DiagnosticKind::InvalidCall, "field() needs a dtype and a shape", node));
        };
        let dtype = match self.static_arg(dtype_node, "field() dtype")? {
            StaticValue::DataType(t) => t,
            other => {
                return Err(error(
                    DiagnosticKind::InvalidArgument,
                    format!("field() dtype must be a type, found {}", other.type_name()),
                    dtype_node,
                ));
            }
        };
        let dims = match self.static_arg(shape_node, "field() shape")? {
            StaticValue::Tuple(items) | StaticValue::List(items) => items.iter().map(StaticValue::as_int).collect(),
            other => other.as_int().map(|n| vec![n]),
        };
        let shape: Vec<usize> = match dims {
            Some(dims) if dims.iter().all(|d| *d > 0) => dims.into_iter().map(|d| d as usize).collect(),
            _ => {
                return Err(error(
                    DiagnosticKind::InvalidArgument,
                    "field() shape must be positive integers",
                    shape_node,
                ));
            }
        };
        log::debug!("[lower] new field {} {:?}", dtype, shape);
        Ok(Operand::Static(StaticValue::Field(Field::new(dtype, &shape))))
    }

    // ------- formatting -------

    pub(crate) fn format_string_pieces(&mut self, parts: &[FormatPart]) -> LowerResult<Vec<FmtPiece>> {
        let mut pieces = Vec::with_capacity(parts.len());
        for part in parts {
            pieces.push(match part {
                FormatPart::Literal(text) => FmtPiece::Text(text.clone()),
                FormatPart::Expr(expr) => FmtPiece::Value(self.lower_expr(expr)?),
            });
        }
        Ok(pieces)
    }

    pub(crate) fn format_method_pieces(
        &mut self,
        template: &AstNode,
        args: &[AstNode],
        node: &AstNode,
    ) -> LowerResult<Vec<FmtPiece>> {
        let StaticValue::Str(text) = self.static_arg(template, "A format string")? else {
            return Err(error(DiagnosticKind::TypeMismatch, "format() is only supported on strings", node));
        };
        let slots = parse_format_template(&text).map_err(|m| error(DiagnosticKind::InvalidArgument, m, node))?;
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.lower_expr(arg)?);
        }
        let mut pieces = Vec::with_capacity(slots.len());
        for slot in slots {
            match slot {
                Slot::Text(t) => pieces.push(FmtPiece::Text(t)),
                Slot::Arg(i) => {
                    let value = values.get(i).cloned().ok_or_else(|| {
                        error(
                            DiagnosticKind::InvalidArgument,
                            format!("Replacement index {} out of range for {} argument(s)", i, args.len()),
                            node,
                        )
                    })?;
                    pieces.push(FmtPiece::Value(value));
                }
            }
        }
        Ok(pieces)
    }

    pub(crate) fn pieces_to_static(&mut self, pieces: Vec<FmtPiece>, node: &AstNode) -> LowerResult<Operand> {
        let mut text = String::new();
        for piece in pieces {
            match piece {
                FmtPiece::Text(t) => text.push_str(&t),
                FmtPiece::Value(Operand::Static(v)) => text.push_str(&v.render()),
                FmtPiece::Value(_) => {
                    return Err(error(
                        DiagnosticKind::UnsupportedConstruct,
                        "Formatted strings with runtime values are only supported inside print",
                        node,
                    ));
                }
            }
        }
        Ok(Operand::Static(StaticValue::Str(text)))
    }

    fn push_operand(&mut self, parts: &mut Vec<PrintPart>, operand: Operand, node: &AstNode) -> LowerResult<()> {
        match operand {
            Operand::Static(v) => parts.push(PrintPart::Literal(v.render())),
            Operand::Scalar { reg, dtype } => parts.push(PrintPart::Value { reg, dtype }),
            Operand::Matrix(m) => {
                // Placeholders are swapped for register parts below.
                let text = render_matrix(m.rows, m.cols, m.is_vector, |i| format!("\u{0}{}\u{0}", i));
                for (i, chunk) in text.split('\u{0}').enumerate() {
                    if i % 2 == 0 {
                        parts.push(PrintPart::Literal(chunk.to_string()));
                    } else if let Some((reg, dtype)) = chunk.parse::<usize>().ok().and_then(|e| m.entries.get(e).copied()) {
                        parts.push(PrintPart::Value { reg, dtype });
                    }
                }
            }
            Operand::Tuple(items) => {
                parts.push(PrintPart::Literal("(".to_string()));
                let n = items.len();
                for (i, item) in items.into_iter().enumerate() {
                    if i > 0 {
                        parts.push(PrintPart::Literal(", ".to_string()));
                    }
                    self.push_operand(parts, item, node)?;
                }
                parts.push(PrintPart::Literal(if n == 1 { ",)" } else { ")" }.to_string()));
            }
        }
        Ok(())
    }

    fn lower_print(&mut self, args: &[AstNode], keywords: &[Keyword], node: &AstNode) -> LowerResult<Operand> {
        let sep = match keyword(keywords, "sep") {
            Some(k) => match self.static_arg(k, "sep")? {
                StaticValue::Str(s) => s,
                other => other.render(),
            },
            None => " ".to_string(),
        };
        let mut parts: Vec<PrintPart> = Vec::new();
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                parts.push(PrintPart::Literal(sep.clone()));
            }
            let pieces = match &arg.kind {
                AstNodeKind::FormatString { parts } => self.format_string_pieces(parts)?,
                AstNodeKind::Call { callee, args: fargs, .. } => match &callee.kind {
                    AstNodeKind::Attribute { object, name } if name == "format" => {
                        self.format_method_pieces(object, fargs, arg)?
                    }
                    _ => vec![FmtPiece::Value(self.lower_expr(arg)?)],
                },
                _ => vec![FmtPiece::Value(self.lower_expr(arg)?)],
            };
            for piece in pieces {
                match piece {
                    FmtPiece::Text(t) => parts.push(PrintPart::Literal(t)),
                    FmtPiece::Value(v) => self.push_operand(&mut parts, v, arg)?,
                }
            }
        }

        let mut merged: Vec<PrintPart> = Vec::with_capacity(parts.len());
        for part in parts {
            if let PrintPart::Literal(next) = &part {
                if next.is_empty() {
                    continue;
                }
                if let Some(PrintPart::Literal(prev)) = merged.last_mut() {
                    prev.push_str(next);
                    continue;
                }
            }
            merged.push(part);
        }

        if self.mode == LowerMode::Script {
            let line: String = merged
                .iter()
                .map(|p| match p {
                    PrintPart::Literal(s) => s.as_str(),
                    PrintPart::Value { .. } => "",
                })
                .collect();
            match self.script_sink {
                Some(sink) => sink.print(&line),
                None => log::info!("{}", line),
            }
        } else {
            self.emit(IROp::Print { parts: merged }, node)?;
        }
        Ok(Operand::Static(StaticValue::None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::field::Layout;

    fn render(slots: &[Slot]) -> String {
        slots
            .iter()
            .map(|s| match s {
                Slot::Text(t) => t.clone(),
                Slot::Arg(i) => format!("<{}>", i),
            })
            .collect()
    }

    #[test]
    fn format_templates_number_their_slots() {
        let slots = parse_format_template("a[0]={}, a[5]={}").unwrap();
        assert_eq!(render(&slots), "a[0]=<0>, a[5]=<1>");
        let slots = parse_format_template("{1}{0} {{x}} {:.2f}").unwrap();
        assert_eq!(render(&slots), "<1><0> {x} <0>");
        assert!(parse_format_template("oops {").is_err());
    }

    #[test]
    fn layout_values_render() {
        assert_eq!(StaticValue::Layout(Layout::SOA).render(), "Layout.SOA");
    }
}
