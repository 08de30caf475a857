//! file: core/src/ast/stmt.rs
//! description: parsing helpers for function definitions and statements.
//!
//! This module turns the `program`, `function_def` and statement rules of
//! the `pest`-generated `RulesParser` into `AstNode` structures. Every node
//! carries the `Location`/`Span` produced by the `rules` helpers so lowering
//! diagnostics can point back into the source file.
//!
use crate::{
    ast::{
        AstNode, AstNodeKind, BinaryOperator, Parameter, Rule, TilangErrorExt,
        expr::{parse_expression_list_rule, parse_expression_rule},
        rules,
    },
    script,
};

type ParseResult = Result<AstNode, Box<dyn TilangErrorExt>>;

/// Parse the root `program` rule into a `Script` node.
pub(crate) fn parse_program_rule(
    pair: pest::iterators::Pair<Rule>,
    script: &script::Script,
) -> ParseResult {
    let (inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let mut body = Vec::new();
    for item in inner_pairs {
        match item.as_rule() {
            Rule::EOI => break,
            Rule::function_def => body.push(parse_function_def_rule(item, script)?),
            _ => body.push(parse_statement_rule(item, script)?),
        }
    }
    Ok(AstNode::new(AstNodeKind::Script { body }, location, span))
}

/// Parse a `def`, including its decorators, parameter annotations and
/// optional `->` return annotation.
fn parse_function_def_rule(
    pair: pest::iterators::Pair<Rule>,
    script: &script::Script,
) -> ParseResult {
    let (inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);

    let mut decorators = Vec::new();
    let mut name = None;
    let mut params = Vec::new();
    let mut returns = None;
    let mut body = Vec::new();

    for part in inner_pairs {
        match part.as_rule() {
            Rule::decorator => decorators.push(parse_decorator_rule(part, script)?),
            Rule::identifier => name = Some(part.as_str().to_string()),
            Rule::parameters => {
                for param in part.into_inner() {
                    params.push(parse_parameter_rule(param, script)?);
                }
            }
            Rule::return_annotation => {
                let (mut ann_inner, ann_loc, ann_span) = rules::get_data_from_rule(&part, script);
                let expr = rules::fetch_next_pair(&mut ann_inner, &ann_loc, &ann_span)?;
                returns = Some(Box::new(parse_expression_rule(expr, script)?));
            }
            Rule::block => body = parse_block_rule(part, script)?,
            other => {
                return Err(rules::unexpected(
                    &part,
                    script,
                    format!("Unexpected rule {:?} in function definition.", other),
                    "tilang.ast.stmt.parse_function_def_rule",
                ));
            }
        }
    }

    let name = match name {
        Some(n) => n,
        None => {
            return Err(Box::new(crate::ast::err::SyntaxError::malformed(
                "Function definition is missing a name.".into(),
                "tilang.ast.stmt.parse_function_def_rule".into(),
                location,
                span,
            )));
        }
    };

    Ok(AstNode::new(
        AstNodeKind::FunctionDef {
            name,
            decorators,
            params,
            returns,
            body,
        },
        location,
        span,
    ))
}

/// `@kernel` and `@lang.kernel` both yield `kernel`.
fn parse_decorator_rule(
    pair: pest::iterators::Pair<Rule>,
    script: &script::Script,
) -> Result<String, Box<dyn TilangErrorExt>> {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let expr_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let expr = parse_expression_rule(expr_pair, script)?;
    match expr.kind {
        AstNodeKind::Identifier { name } | AstNodeKind::Attribute { name, .. } => Ok(name),
        _ => Err(rules::unexpected(
            &pair,
            script,
            "Decorators must be plain names.".into(),
            "tilang.ast.stmt.parse_decorator_rule",
        )),
    }
}

fn parse_parameter_rule(
    pair: pest::iterators::Pair<Rule>,
    script: &script::Script,
) -> Result<Parameter, Box<dyn TilangErrorExt>> {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let name = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?
        .as_str()
        .to_string();
    let annotation = match inner_pairs.next() {
        Some(ann) => Some(parse_expression_rule(ann, script)?),
        None => None,
    };
    Ok(Parameter { name, annotation })
}

fn parse_block_rule(
    pair: pest::iterators::Pair<Rule>,
    script: &script::Script,
) -> Result<Vec<AstNode>, Box<dyn TilangErrorExt>> {
    pair.into_inner()
        .map(|stmt| parse_statement_rule(stmt, script))
        .collect()
}

fn parse_statement_rule(
    pair: pest::iterators::Pair<Rule>,
    script: &script::Script,
) -> ParseResult {
    match pair.as_rule() {
        Rule::if_stmt => parse_if_rule(pair, script),
        Rule::for_stmt => parse_for_rule(pair, script),
        Rule::while_stmt => parse_while_rule(pair, script),
        Rule::return_stmt => parse_return_rule(pair, script),
        Rule::assign_stmt => parse_assign_rule(pair, script),
        Rule::aug_assign_stmt => parse_aug_assign_rule(pair, script),
        Rule::expr_stmt => {
            let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
            let list = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
            Ok(AstNode::new(
                AstNodeKind::ExprStmt {
                    expr: Box::new(parse_expression_list_rule(list, script)?),
                },
                location,
                span,
            ))
        }
        Rule::pass_stmt | Rule::break_stmt | Rule::continue_stmt => {
            let kind = match pair.as_rule() {
                Rule::pass_stmt => AstNodeKind::Pass,
                Rule::break_stmt => AstNodeKind::Break,
                _ => AstNodeKind::Continue,
            };
            Ok(AstNode::new(
                kind,
                rules::get_location_from_pair(&pair, script),
                rules::get_span_from_pair(&pair, script),
            ))
        }
        other => Err(rules::unexpected(
            &pair,
            script,
            format!("Unexpected statement rule {:?}.", other),
            "tilang.ast.stmt.parse_statement_rule",
        )),
    }
}

fn parse_if_rule(pair: pest::iterators::Pair<Rule>, script: &script::Script) -> ParseResult {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let cond_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let condition = parse_expression_rule(cond_pair, script)?;
    let body_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let body = parse_block_rule(body_pair, script)?;

    let mut elifs = Vec::new();
    let mut orelse = Vec::new();
    for clause in inner_pairs {
        match clause.as_rule() {
            Rule::elif_clause => {
                let (mut c_inner, c_loc, c_span) = rules::get_data_from_rule(&clause, script);
                let c_cond = rules::fetch_next_pair(&mut c_inner, &c_loc, &c_span)?;
                let c_body = rules::fetch_next_pair(&mut c_inner, &c_loc, &c_span)?;
                elifs.push((
                    parse_expression_rule(c_cond, script)?,
                    parse_block_rule(c_body, script)?,
                    c_loc,
                    c_span,
                ));
            }
            Rule::else_clause => {
                let (mut c_inner, c_loc, c_span) = rules::get_data_from_rule(&clause, script);
                let c_body = rules::fetch_next_pair(&mut c_inner, &c_loc, &c_span)?;
                orelse = parse_block_rule(c_body, script)?;
            }
            other => {
                return Err(rules::unexpected(
                    &clause,
                    script,
                    format!("Unexpected rule {:?} in if statement.", other),
                    "tilang.ast.stmt.parse_if_rule",
                ));
            }
        }
    }

    // `elif` chains nest as `If` nodes in the else branch.
    for (c_cond, c_body, c_loc, c_span) in elifs.into_iter().rev() {
        orelse = vec![AstNode::new(
            AstNodeKind::If {
                condition: Box::new(c_cond),
                body: c_body,
                orelse,
            },
            c_loc,
            c_span,
        )];
    }

    Ok(AstNode::new(
        AstNodeKind::If {
            condition: Box::new(condition),
            body,
            orelse,
        },
        location,
        span,
    ))
}

fn parse_for_rule(pair: pest::iterators::Pair<Rule>, script: &script::Script) -> ParseResult {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let targets_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let targets: Vec<String> = targets_pair
        .into_inner()
        .map(|p| p.as_str().to_string())
        .collect();
    let iter_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let iter = parse_expression_rule(iter_pair, script)?;
    let body_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let body = parse_block_rule(body_pair, script)?;

    Ok(AstNode::new(
        AstNodeKind::For {
            targets,
            iter: Box::new(iter),
            body,
        },
        location,
        span,
    ))
}

fn parse_while_rule(pair: pest::iterators::Pair<Rule>, script: &script::Script) -> ParseResult {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let cond_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let body_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    Ok(AstNode::new(
        AstNodeKind::While {
            condition: Box::new(parse_expression_rule(cond_pair, script)?),
            body: parse_block_rule(body_pair, script)?,
        },
        location,
        span,
    ))
}

fn parse_return_rule(pair: pest::iterators::Pair<Rule>, script: &script::Script) -> ParseResult {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let value = match inner_pairs.next() {
        Some(list) => Some(Box::new(parse_expression_list_rule(list, script)?)),
        None => None,
    };
    Ok(AstNode::new(AstNodeKind::Return { value }, location, span))
}

fn parse_assign_rule(pair: pest::iterators::Pair<Rule>, script: &script::Script) -> ParseResult {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let target_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let value_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    Ok(AstNode::new(
        AstNodeKind::Assign {
            target: Box::new(parse_expression_list_rule(target_pair, script)?),
            value: Box::new(parse_expression_list_rule(value_pair, script)?),
        },
        location,
        span,
    ))
}

fn parse_aug_assign_rule(pair: pest::iterators::Pair<Rule>, script: &script::Script) -> ParseResult {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let target_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let op_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let value_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;

    let op = BinaryOperator::from_augmented(op_pair.as_str()).ok_or_else(|| {
        rules::unexpected(
            &op_pair,
            script,
            format!("Invalid augmented assignment operator '{}'.", op_pair.as_str()),
            "tilang.ast.stmt.parse_aug_assign_rule",
        )
    })?;

    Ok(AstNode::new(
        AstNodeKind::AugAssign {
            target: Box::new(parse_expression_rule(target_pair, script)?),
            op,
            value: Box::new(parse_expression_rule(value_pair, script)?),
        },
        location,
        span,
    ))
}
