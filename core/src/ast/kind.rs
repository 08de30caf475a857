//! file: core/src/ast/kind.rs
//! description: AST node kind definitions and operator enums.
//!
//! Defines `AstNodeKind` along with the binary, unary, comparison and
//! boolean operator enums. These are shared by parsing, the diagnostics
//! walk and lowering.
//!
use super::node::AstNode;

/// Arithmetic and bitwise binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,      // +
    Sub,      // -
    Mul,      // *
    Div,      // /
    FloorDiv, // //
    Mod,      // %
    Pow,      // **
    LShift,   // <<
    RShift,   // >>
    BitOr,    // |
    BitXor,   // ^
    BitAnd,   // &
    MatMul,   // @
}

impl BinaryOperator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => BinaryOperator::Add,
            "-" => BinaryOperator::Sub,
            "*" => BinaryOperator::Mul,
            "/" => BinaryOperator::Div,
            "//" => BinaryOperator::FloorDiv,
            "%" => BinaryOperator::Mod,
            "**" => BinaryOperator::Pow,
            "<<" => BinaryOperator::LShift,
            ">>" => BinaryOperator::RShift,
            "|" => BinaryOperator::BitOr,
            "^" => BinaryOperator::BitXor,
            "&" => BinaryOperator::BitAnd,
            "@" => BinaryOperator::MatMul,
            _ => return None,
        })
    }

    /// Operator of an augmented assignment token such as `+=`.
    pub fn from_augmented(symbol: &str) -> Option<Self> {
        symbol.strip_suffix('=').and_then(Self::from_symbol)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::FloorDiv => "//",
            BinaryOperator::Mod => "%",
            BinaryOperator::Pow => "**",
            BinaryOperator::LShift => "<<",
            BinaryOperator::RShift => ">>",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitXor => "^",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::MatMul => "@",
        }
    }

    pub fn is_bitwise(&self) -> bool {
        matches!(
            self,
            BinaryOperator::LShift
                | BinaryOperator::RShift
                | BinaryOperator::BitOr
                | BinaryOperator::BitXor
                | BinaryOperator::BitAnd
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Plus,   // +
    Minus,  // -
    Not,    // not
    Invert, // ~
}

/// Operators that may appear in a comparison chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOperator {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CompareOperator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let normalized: Vec<&str> = symbol.split_whitespace().collect();
        Some(match normalized.as_slice() {
            ["=="] => CompareOperator::Eq,
            ["!="] => CompareOperator::NotEq,
            ["<"] => CompareOperator::Lt,
            ["<="] => CompareOperator::LtE,
            [">"] => CompareOperator::Gt,
            [">="] => CompareOperator::GtE,
            ["in"] => CompareOperator::In,
            ["not", "in"] => CompareOperator::NotIn,
            ["is"] => CompareOperator::Is,
            ["is", "not"] => CompareOperator::IsNot,
            _ => return None,
        })
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOperator::Eq => "==",
            CompareOperator::NotEq => "!=",
            CompareOperator::Lt => "<",
            CompareOperator::LtE => "<=",
            CompareOperator::Gt => ">",
            CompareOperator::GtE => ">=",
            CompareOperator::In => "in",
            CompareOperator::NotIn => "not in",
            CompareOperator::Is => "is",
            CompareOperator::IsNot => "is not",
        }
    }

    pub fn is_membership(&self) -> bool {
        matches!(self, CompareOperator::In | CompareOperator::NotIn)
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, CompareOperator::Is | CompareOperator::IsNot)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolOperator {
    And,
    Or,
}

/// One piece of a formatted string: literal text or an embedded expression.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatPart {
    Literal(String),
    Expr(AstNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub annotation: Option<AstNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub name: String,
    pub value: AstNode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AstNodeKind {
    Script { body: Vec<AstNode> },

    FunctionDef {
        name: String,
        decorators: Vec<String>,
        params: Vec<Parameter>,
        returns: Option<Box<AstNode>>,
        body: Vec<AstNode>,
    },

    Assign { target: Box<AstNode>, value: Box<AstNode> },
    AugAssign { target: Box<AstNode>, op: BinaryOperator, value: Box<AstNode> },
    If { condition: Box<AstNode>, body: Vec<AstNode>, orelse: Vec<AstNode> },
    For { targets: Vec<String>, iter: Box<AstNode>, body: Vec<AstNode> },
    While { condition: Box<AstNode>, body: Vec<AstNode> },
    Return { value: Option<Box<AstNode>> },
    Break,
    Continue,
    Pass,
    ExprStmt { expr: Box<AstNode> },

    BinaryOp { left: Box<AstNode>, op: BinaryOperator, right: Box<AstNode> },
    UnaryOp { op: UnaryOperator, expr: Box<AstNode> },
    Compare { left: Box<AstNode>, ops: Vec<CompareOperator>, comparators: Vec<AstNode> },
    BoolOp { op: BoolOperator, values: Vec<AstNode> },
    IfExp { condition: Box<AstNode>, body: Box<AstNode>, orelse: Box<AstNode> },
    Call { callee: Box<AstNode>, args: Vec<AstNode>, keywords: Vec<Keyword> },
    Subscript { object: Box<AstNode>, indices: Vec<AstNode> },
    Attribute { object: Box<AstNode>, name: String },
    FormatString { parts: Vec<FormatPart> },

    Identifier { name: String },
    String { value: String },
    Integer { value: i64 },
    Float { value: f64 },
    Bool { value: bool },
    List { elements: Vec<AstNode> },
    Tuple { elements: Vec<AstNode> },
    None,
}

impl AstNodeKind {
    pub fn is_expression(&self) -> bool {
        !matches!(
            self,
            AstNodeKind::Script { .. }
                | AstNodeKind::FunctionDef { .. }
                | AstNodeKind::Assign { .. }
                | AstNodeKind::AugAssign { .. }
                | AstNodeKind::If { .. }
                | AstNodeKind::For { .. }
                | AstNodeKind::While { .. }
                | AstNodeKind::Return { .. }
                | AstNodeKind::Break
                | AstNodeKind::Continue
                | AstNodeKind::Pass
                | AstNodeKind::ExprStmt { .. }
        )
    }
}

use std::fmt;

impl fmt::Display for AstNodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AstNodeKind::Script { .. } => "Script",
            AstNodeKind::FunctionDef { .. } => "FunctionDef",
            AstNodeKind::Assign { .. } => "Assign",
            AstNodeKind::AugAssign { .. } => "AugAssign",
            AstNodeKind::If { .. } => "If",
            AstNodeKind::For { .. } => "For",
            AstNodeKind::While { .. } => "While",
            AstNodeKind::Return { .. } => "Return",
            AstNodeKind::Break => "Break",
            AstNodeKind::Continue => "Continue",
            AstNodeKind::Pass => "Pass",
            AstNodeKind::ExprStmt { .. } => "ExprStmt",
            AstNodeKind::BinaryOp { .. } => "BinaryOp",
            AstNodeKind::UnaryOp { .. } => "UnaryOp",
            AstNodeKind::Compare { .. } => "Compare",
            AstNodeKind::BoolOp { .. } => "BoolOp",
            AstNodeKind::IfExp { .. } => "IfExp",
            AstNodeKind::Call { .. } => "Call",
            AstNodeKind::Subscript { .. } => "Subscript",
            AstNodeKind::Attribute { .. } => "Attribute",
            AstNodeKind::FormatString { .. } => "FormatString",
            AstNodeKind::Identifier { .. } => "Identifier",
            AstNodeKind::String { .. } => "String",
            AstNodeKind::Integer { .. } => "Integer",
            AstNodeKind::Float { .. } => "Float",
            AstNodeKind::Bool { .. } => "Bool",
            AstNodeKind::List { .. } => "List",
            AstNodeKind::Tuple { .. } => "Tuple",
            AstNodeKind::None => "None",
        };
        write!(f, "{}", name)
    }
}
