//! file: core/src/ast/mod.rs
//! description: source front-end.
//!
//! `generate_ast_from_source` runs the layout pass, parses the result with
//! the `pest` grammar and builds the `AstNode` tree consumed by lowering.

pub mod err;
pub mod expr;
pub mod kind;
pub mod layout;
pub mod node;
pub mod rules;
pub mod stmt;

use pest::Parser;

pub use crate::error::TilangErrorExt;
pub use kind::{
    AstNodeKind, BinaryOperator, BoolOperator, CompareOperator, FormatPart, Keyword, Parameter,
    UnaryOperator,
};
pub use node::AstNode;
pub use rules::{Rule, RulesParser};

use crate::location::Location;
use crate::script::Script;

/// Parse a script into its `Script` root node.
pub fn generate_ast_from_source(script: &Script) -> Result<AstNode, Box<dyn TilangErrorExt>> {
    if script.is_empty() {
        return Err(Box::new(err::SyntaxError::empty_script(
            "tilang.ast.generate_ast_from_source".into(),
            Some(Location::new(script.name.clone(), 1, 1)),
        )));
    }

    let text = layout::apply_layout(script)?;
    let mut pairs =
        RulesParser::parse(Rule::program, &text).map_err(|e| syntax_error_from_pest(e, script))?;

    let program = match pairs.next() {
        Some(p) => p,
        None => {
            return Err(Box::new(err::SyntaxError::malformed(
                "Parser produced no program.".into(),
                "tilang.ast.generate_ast_from_source".into(),
                None,
                None,
            )));
        }
    };
    let ast = stmt::parse_program_rule(program, script)?;
    log::debug!("parsed {}", script.name);
    Ok(ast)
}

pub(crate) fn syntax_error_from_pest(
    error: pest::error::Error<Rule>,
    script: &Script,
) -> Box<dyn TilangErrorExt> {
    Box::new(err::SyntaxError::grammar(&error, "tilang.ast.parser".into(), &script.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> AstNode {
        generate_ast_from_source(&Script::from_source("t.ti", src)).expect("source should parse")
    }

    fn first_stmt_of_def(root: &AstNode) -> &AstNode {
        match &root.kind {
            AstNodeKind::Script { body } => match &body[0].kind {
                AstNodeKind::FunctionDef { body, .. } => &body[0],
                other => panic!("expected def, got {}", other),
            },
            other => panic!("expected script, got {}", other),
        }
    }

    #[test]
    fn decorated_kernel_with_annotations() {
        let root = parse("@kernel\ndef foo(x: i32, a: template()) -> i32:\n    return x + 1\n");
        let AstNodeKind::Script { body } = &root.kind else { panic!("no script") };
        let AstNodeKind::FunctionDef { name, decorators, params, returns, .. } = &body[0].kind else {
            panic!("no def")
        };
        assert_eq!(name, "foo");
        assert_eq!(decorators, &vec!["kernel".to_string()]);
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "x");
        assert!(returns.is_some());
    }

    #[test]
    fn chained_comparison_is_one_node() {
        let root = parse("def f(a, b):\n    c = a < b > a\n");
        let AstNodeKind::Assign { value, .. } = &first_stmt_of_def(&root).kind else { panic!() };
        let AstNodeKind::Compare { ops, comparators, .. } = &value.kind else { panic!() };
        assert_eq!(ops, &vec![CompareOperator::Lt, CompareOperator::Gt]);
        assert_eq!(comparators.len(), 2);
    }

    #[test]
    fn not_in_and_is_not_parse_as_operators() {
        let root = parse("def f(a, b):\n    c = a not in b\n    d = a is not b\n");
        let AstNodeKind::Script { body } = &root.kind else { panic!() };
        let AstNodeKind::FunctionDef { body, .. } = &body[0].kind else { panic!() };
        let AstNodeKind::Assign { value, .. } = &body[0].kind else { panic!() };
        assert!(matches!(&value.kind, AstNodeKind::Compare { ops, .. } if ops == &vec![CompareOperator::NotIn]));
        let AstNodeKind::Assign { value, .. } = &body[1].kind else { panic!() };
        assert!(matches!(&value.kind, AstNodeKind::Compare { ops, .. } if ops == &vec![CompareOperator::IsNot]));
    }

    #[test]
    fn power_binds_tighter_than_unary_minus() {
        let root = parse("def f(x):\n    y = -x ** 2\n");
        let AstNodeKind::Assign { value, .. } = &first_stmt_of_def(&root).kind else { panic!() };
        let AstNodeKind::UnaryOp { op, expr } = &value.kind else { panic!("expected unary") };
        assert_eq!(*op, UnaryOperator::Minus);
        assert!(matches!(&expr.kind, AstNodeKind::BinaryOp { op: BinaryOperator::Pow, .. }));
    }

    #[test]
    fn tuple_targets_and_aug_assign() {
        let root = parse("def f(x):\n    a, b = x, 1\n    a //= 2\n");
        let AstNodeKind::Script { body } = &root.kind else { panic!() };
        let AstNodeKind::FunctionDef { body, .. } = &body[0].kind else { panic!() };
        let AstNodeKind::Assign { target, value } = &body[0].kind else { panic!() };
        assert!(matches!(&target.kind, AstNodeKind::Tuple { elements } if elements.len() == 2));
        assert!(matches!(&value.kind, AstNodeKind::Tuple { elements } if elements.len() == 2));
        assert!(matches!(&body[1].kind, AstNodeKind::AugAssign { op: BinaryOperator::FloorDiv, .. }));
    }

    #[test]
    fn elif_nests_into_orelse() {
        let root = parse("def f(x):\n    if x:\n        pass\n    elif x > 1:\n        pass\n    else:\n        pass\n");
        let AstNodeKind::If { orelse, .. } = &first_stmt_of_def(&root).kind else { panic!() };
        assert_eq!(orelse.len(), 1);
        let AstNodeKind::If { orelse: inner, .. } = &orelse[0].kind else { panic!() };
        assert!(matches!(inner[0].kind, AstNodeKind::Pass));
    }

    #[test]
    fn fstring_and_format_become_format_strings() {
        let root = parse("def f(a):\n    print(f'a={a[0]}!', 'b={}'.format(a[1]))\n");
        let AstNodeKind::ExprStmt { expr } = &first_stmt_of_def(&root).kind else { panic!() };
        let AstNodeKind::Call { args, .. } = &expr.kind else { panic!() };
        let AstNodeKind::FormatString { parts } = &args[0].kind else { panic!() };
        assert_eq!(parts.len(), 3);
        let FormatPart::Expr(inner) = &parts[1] else { panic!() };
        assert_eq!(inner.location.as_ref().map(|l| (l.line, l.column)), Some((2, 16)));
        assert!(matches!(&args[1].kind, AstNodeKind::FormatString { parts } if parts.len() == 2));
    }

    #[test]
    fn keyword_arguments_are_collected() {
        let root = parse("def f(x: any_arr(element_dim=2, layout=Layout.AOS)):\n    pass\n");
        let AstNodeKind::Script { body } = &root.kind else { panic!() };
        let AstNodeKind::FunctionDef { params, .. } = &body[0].kind else { panic!() };
        let Some(ann) = &params[0].annotation else { panic!() };
        let AstNodeKind::Call { keywords, .. } = &ann.kind else { panic!() };
        assert_eq!(keywords.len(), 2);
        assert_eq!(keywords[1].name, "layout");
    }

    #[test]
    fn syntax_error_reports_location() {
        let err = generate_ast_from_source(&Script::from_source("t.ti", "def f(x):\n    y = = 1\n")).unwrap_err();
        assert!(err.message().starts_with("invalid syntax"));
        assert_eq!(err.location().map(|l| l.line), Some(2));
    }

    #[test]
    fn grammar_errors_list_expected_rules() {
        let script = Script::from_source("t.ti", "x = = 1\n");
        let text = layout::apply_layout(&script).expect("layout");
        let Err(pest_err) = RulesParser::parse(Rule::program, &text) else {
            panic!("grammar should reject the assignment");
        };
        let err = err::SyntaxError::grammar(&pest_err, "test".into(), "t.ti");
        let err::SyntaxCause::Grammar { expected } = err.cause() else {
            panic!("expected a grammar cause, got {:?}", err.cause());
        };
        assert!(!expected.is_empty());
        assert_eq!(err.location().map(|l| l.line), Some(1));
    }

    #[test]
    fn blank_script_is_reported_as_empty() {
        let err = generate_ast_from_source(&Script::from_source("t.ti", "  \n\n")).unwrap_err();
        assert_eq!(err.message(), "The provided script contains no statements.");
    }
}
