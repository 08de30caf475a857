use crate::location;

use super::kind::{AstNodeKind, FormatPart};

#[derive(Clone, PartialEq)]
pub struct AstNode {
    id: usize,
    pub kind: AstNodeKind,
    pub location: Option<location::Location>,
    pub span: Option<location::Span>,
}

impl AstNode {
    fn create_id() -> usize {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static COUNTER: AtomicUsize = AtomicUsize::new(1);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    }

    pub fn new(
        node_type: AstNodeKind,
        location: Option<location::Location>,
        span: Option<location::Span>,
    ) -> Self {
        AstNode {
            id: Self::create_id(),
            kind: node_type,
            location,
            span,
        }
    }

    pub fn get_id(&self) -> usize {
        self.id
    }
    pub fn get_kind(&self) -> &AstNodeKind {
        &self.kind
    }
    pub fn get_location(&self) -> Option<&crate::location::Location> {
        self.location.as_ref()
    }
    pub fn get_span(&self) -> Option<&crate::location::Span> {
        self.span.as_ref()
    }

    /// Name of a bare identifier node.
    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            AstNodeKind::Identifier { name } => Some(name.as_str()),
            _ => None,
        }
    }

    /// True for `static(...)` calls, whose arguments are resolved at compile time.
    pub fn is_static_marker(&self) -> bool {
        match &self.kind {
            AstNodeKind::Call { callee, .. } => callee.as_identifier() == Some("static"),
            _ => false,
        }
    }

    /// Calls `visit` on every direct child node.
    pub fn for_each_child<F: FnMut(&AstNode)>(&self, mut visit: F) {
        match &self.kind {
            AstNodeKind::Script { body } => body.iter().for_each(visit),
            AstNodeKind::FunctionDef { params, returns, body, .. } => {
                for p in params {
                    if let Some(a) = &p.annotation {
                        visit(a);
                    }
                }
                if let Some(r) = returns {
                    visit(r);
                }
                body.iter().for_each(visit);
            }
            AstNodeKind::Assign { target, value } | AstNodeKind::AugAssign { target, value, .. } => {
                visit(target);
                visit(value);
            }
            AstNodeKind::If { condition, body, orelse } => {
                visit(condition);
                body.iter().for_each(&mut visit);
                orelse.iter().for_each(visit);
            }
            AstNodeKind::For { iter, body, .. } => {
                visit(iter);
                body.iter().for_each(visit);
            }
            AstNodeKind::While { condition, body } => {
                visit(condition);
                body.iter().for_each(visit);
            }
            AstNodeKind::Return { value } => {
                if let Some(v) = value {
                    visit(v);
                }
            }
            AstNodeKind::ExprStmt { expr } => visit(expr),
            AstNodeKind::BinaryOp { left, right, .. } => {
                visit(left);
                visit(right);
            }
            AstNodeKind::UnaryOp { expr, .. } => visit(expr),
            AstNodeKind::Compare { left, comparators, .. } => {
                visit(left);
                comparators.iter().for_each(visit);
            }
            AstNodeKind::BoolOp { values, .. } => values.iter().for_each(visit),
            AstNodeKind::IfExp { condition, body, orelse } => {
                visit(condition);
                visit(body);
                visit(orelse);
            }
            AstNodeKind::Call { callee, args, keywords } => {
                visit(callee);
                args.iter().for_each(&mut visit);
                keywords.iter().for_each(|k| visit(&k.value));
            }
            AstNodeKind::Subscript { object, indices } => {
                visit(object);
                indices.iter().for_each(visit);
            }
            AstNodeKind::Attribute { object, .. } => visit(object),
            AstNodeKind::FormatString { parts } => {
                for part in parts {
                    if let FormatPart::Expr(e) = part {
                        visit(e);
                    }
                }
            }
            AstNodeKind::List { elements } | AstNodeKind::Tuple { elements } => {
                elements.iter().for_each(visit)
            }
            AstNodeKind::Break
            | AstNodeKind::Continue
            | AstNodeKind::Pass
            | AstNodeKind::Identifier { .. }
            | AstNodeKind::String { .. }
            | AstNodeKind::Integer { .. }
            | AstNodeKind::Float { .. }
            | AstNodeKind::Bool { .. }
            | AstNodeKind::None => {}
        }
    }
}

use std::fmt;

impl fmt::Display for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn walk(node: &AstNode, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
            for _ in 0..indent {
                write!(f, "  ")?;
            }
            let detail = match &node.kind {
                AstNodeKind::FunctionDef { name, decorators, .. } => {
                    format!(" {} [{}]", name, decorators.join(", "))
                }
                AstNodeKind::BinaryOp { op, .. } | AstNodeKind::AugAssign { op, .. } => {
                    format!(" {}", op.symbol())
                }
                AstNodeKind::UnaryOp { op, .. } => format!(" {:?}", op),
                AstNodeKind::Compare { ops, .. } => {
                    let syms: Vec<&str> = ops.iter().map(|o| o.symbol()).collect();
                    format!(" {}", syms.join(" "))
                }
                AstNodeKind::BoolOp { op, .. } => format!(" {:?}", op),
                AstNodeKind::For { targets, .. } => format!(" {}", targets.join(", ")),
                AstNodeKind::Attribute { name, .. } => format!(" .{}", name),
                AstNodeKind::Identifier { name } => format!(" {}", name),
                AstNodeKind::String { value } => format!(" {:?}", value),
                AstNodeKind::Integer { value } => format!(" {}", value),
                AstNodeKind::Float { value } => format!(" {}", value),
                AstNodeKind::Bool { value } => format!(" {}", value),
                _ => String::new(),
            };
            match &node.location {
                Some(loc) => writeln!(f, "{}{} @{}:{}", node.kind, detail, loc.line, loc.column)?,
                None => writeln!(f, "{}{}", node.kind, detail)?,
            }
            let mut result = Ok(());
            node.for_each_child(|child| {
                if result.is_ok() {
                    result = walk(child, f, indent + 1);
                }
            });
            result
        }
        walk(self, f, 0)
    }
}

impl fmt::Debug for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
