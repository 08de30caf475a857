use pest::Parser;

use crate::{
    ast::{
        AstNode, AstNodeKind, BinaryOperator, BoolOperator, CompareOperator, FormatPart, Keyword,
        Rule, RulesParser, TilangErrorExt, UnaryOperator, rules,
    },
    script,
};

type ParseResult = Result<AstNode, Box<dyn TilangErrorExt>>;

pub(crate) fn parse_expression_rule(
    pair: pest::iterators::Pair<Rule>,
    script: &script::Script,
) -> ParseResult {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let body_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let body = parse_or_expression_rule(body_pair, script)?;

    // `body if condition else orelse`
    match inner_pairs.next() {
        None => Ok(body),
        Some(cond_pair) => {
            let condition = parse_or_expression_rule(cond_pair, script)?;
            let else_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
            let orelse = parse_expression_rule(else_pair, script)?;
            Ok(AstNode::new(
                AstNodeKind::IfExp {
                    condition: Box::new(condition),
                    body: Box::new(body),
                    orelse: Box::new(orelse),
                },
                location,
                span,
            ))
        }
    }
}

/// Items of an `expression_list` pair, in source order.
pub(crate) fn parse_expression_list_items(
    pair: pest::iterators::Pair<Rule>,
    script: &script::Script,
) -> Result<Vec<AstNode>, Box<dyn TilangErrorExt>> {
    pair.into_inner()
        .map(|p| parse_expression_rule(p, script))
        .collect()
}

/// A single expression, or a `Tuple` when the list has several items or a
/// trailing comma.
pub(crate) fn parse_expression_list_rule(
    pair: pest::iterators::Pair<Rule>,
    script: &script::Script,
) -> ParseResult {
    let location = rules::get_location_from_pair(&pair, script);
    let span = rules::get_span_from_pair(&pair, script);
    let trailing_comma = pair.as_str().trim_end().ends_with(',');
    let mut items = parse_expression_list_items(pair, script)?;
    if items.len() == 1 && !trailing_comma {
        return Ok(items.remove(0));
    }
    Ok(AstNode::new(AstNodeKind::Tuple { elements: items }, location, span))
}

fn parse_or_expression_rule(pair: pest::iterators::Pair<Rule>, script: &script::Script) -> ParseResult {
    parse_bool_chain(pair, script, BoolOperator::Or, parse_and_expression_rule)
}

fn parse_and_expression_rule(pair: pest::iterators::Pair<Rule>, script: &script::Script) -> ParseResult {
    parse_bool_chain(pair, script, BoolOperator::And, parse_not_expression_rule)
}

fn parse_bool_chain(
    pair: pest::iterators::Pair<Rule>,
    script: &script::Script,
    op: BoolOperator,
    operand: fn(pest::iterators::Pair<Rule>, &script::Script) -> ParseResult,
) -> ParseResult {
    let (inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let mut values = inner_pairs
        .map(|p| operand(p, script))
        .collect::<Result<Vec<_>, _>>()?;
    if values.len() == 1 {
        return Ok(values.remove(0));
    }
    Ok(AstNode::new(AstNodeKind::BoolOp { op, values }, location, span))
}

fn parse_not_expression_rule(pair: pest::iterators::Pair<Rule>, script: &script::Script) -> ParseResult {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let first = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    match first.as_rule() {
        Rule::not_op => {
            let operand_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
            Ok(AstNode::new(
                AstNodeKind::UnaryOp {
                    op: UnaryOperator::Not,
                    expr: Box::new(parse_not_expression_rule(operand_pair, script)?),
                },
                location,
                span,
            ))
        }
        Rule::comparison => parse_comparison_rule(first, script),
        other => Err(rules::unexpected(
            &first,
            script,
            format!("Unexpected rule {:?} in negation.", other),
            "tilang.ast.expr.parse_not_expression_rule",
        )),
    }
}

fn parse_comparison_rule(pair: pest::iterators::Pair<Rule>, script: &script::Script) -> ParseResult {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let left_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let left = parse_bit_or_rule(left_pair, script)?;

    let mut ops = Vec::new();
    let mut comparators = Vec::new();
    while let Some(op_pair) = inner_pairs.next() {
        let op = CompareOperator::from_symbol(op_pair.as_str()).ok_or_else(|| {
            rules::unexpected(
                &op_pair,
                script,
                format!("Invalid comparison operator '{}'.", op_pair.as_str()),
                "tilang.ast.expr.parse_comparison_rule",
            )
        })?;
        let right_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
        ops.push(op);
        comparators.push(parse_bit_or_rule(right_pair, script)?);
    }

    if ops.is_empty() {
        return Ok(left);
    }
    Ok(AstNode::new(
        AstNodeKind::Compare {
            left: Box::new(left),
            ops,
            comparators,
        },
        location,
        span,
    ))
}

/// Left-associative level whose operator is a bare literal in the grammar.
fn parse_fixed_operator_chain(
    pair: pest::iterators::Pair<Rule>,
    script: &script::Script,
    op: BinaryOperator,
    operand: fn(pest::iterators::Pair<Rule>, &script::Script) -> ParseResult,
) -> ParseResult {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let first = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let mut node = operand(first, script)?;
    for right_pair in inner_pairs {
        let right = operand(right_pair, script)?;
        node = AstNode::new(
            AstNodeKind::BinaryOp {
                left: Box::new(node),
                op,
                right: Box::new(right),
            },
            location.clone(),
            span.clone(),
        );
    }
    Ok(node)
}

/// Left-associative level with explicit operator pairs between operands.
fn parse_operator_chain(
    pair: pest::iterators::Pair<Rule>,
    script: &script::Script,
    operand: fn(pest::iterators::Pair<Rule>, &script::Script) -> ParseResult,
    issuer: &str,
) -> ParseResult {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let first = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let mut node = operand(first, script)?;

    while let Some(op_pair) = inner_pairs.next() {
        let op = BinaryOperator::from_symbol(op_pair.as_str()).ok_or_else(|| {
            rules::unexpected(
                &op_pair,
                script,
                format!("Invalid binary operator '{}'.", op_pair.as_str()),
                issuer,
            )
        })?;
        let right_pair = match inner_pairs.next() {
            Some(rp) => rp,
            None => {
                return Err(rules::unexpected(
                    &op_pair,
                    script,
                    "Missing right-hand operand for binary operator.".into(),
                    issuer,
                ));
            }
        };
        let right = operand(right_pair, script)?;
        node = AstNode::new(
            AstNodeKind::BinaryOp {
                left: Box::new(node),
                op,
                right: Box::new(right),
            },
            rules::get_location_from_pair(&op_pair, script),
            rules::get_span_from_pair(&op_pair, script),
        );
    }

    Ok(node)
}

fn parse_bit_or_rule(pair: pest::iterators::Pair<Rule>, script: &script::Script) -> ParseResult {
    parse_fixed_operator_chain(pair, script, BinaryOperator::BitOr, parse_bit_xor_rule)
}

fn parse_bit_xor_rule(pair: pest::iterators::Pair<Rule>, script: &script::Script) -> ParseResult {
    parse_fixed_operator_chain(pair, script, BinaryOperator::BitXor, parse_bit_and_rule)
}

fn parse_bit_and_rule(pair: pest::iterators::Pair<Rule>, script: &script::Script) -> ParseResult {
    parse_fixed_operator_chain(pair, script, BinaryOperator::BitAnd, parse_shift_rule)
}

fn parse_shift_rule(pair: pest::iterators::Pair<Rule>, script: &script::Script) -> ParseResult {
    parse_operator_chain(pair, script, parse_arith_rule, "tilang.ast.expr.parse_shift_rule")
}

fn parse_arith_rule(pair: pest::iterators::Pair<Rule>, script: &script::Script) -> ParseResult {
    parse_operator_chain(pair, script, parse_term_rule, "tilang.ast.expr.parse_arith_rule")
}

fn parse_term_rule(pair: pest::iterators::Pair<Rule>, script: &script::Script) -> ParseResult {
    parse_operator_chain(pair, script, parse_factor_rule, "tilang.ast.expr.parse_term_rule")
}

fn parse_factor_rule(pair: pest::iterators::Pair<Rule>, script: &script::Script) -> ParseResult {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let first = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    match first.as_rule() {
        Rule::unary_op => {
            let op = match first.as_str() {
                "+" => UnaryOperator::Plus,
                "-" => UnaryOperator::Minus,
                "~" => UnaryOperator::Invert,
                other => {
                    return Err(rules::unexpected(
                        &first,
                        script,
                        format!("Invalid unary operator '{}'.", other),
                        "tilang.ast.expr.parse_factor_rule",
                    ));
                }
            };
            let operand_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
            let operand = parse_factor_rule(operand_pair, script)?;
            Ok(AstNode::new(
                AstNodeKind::UnaryOp {
                    op,
                    expr: Box::new(operand),
                },
                location,
                span,
            ))
        }
        Rule::power => parse_power_rule(first, script),
        other => Err(rules::unexpected(
            &first,
            script,
            format!("Unexpected rule {:?} in factor.", other),
            "tilang.ast.expr.parse_factor_rule",
        )),
    }
}

fn parse_power_rule(pair: pest::iterators::Pair<Rule>, script: &script::Script) -> ParseResult {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let base_pair = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let base = parse_postfix_rule(base_pair, script)?;
    match inner_pairs.next() {
        None => Ok(base),
        Some(exp_pair) => {
            let exponent = parse_factor_rule(exp_pair, script)?;
            Ok(AstNode::new(
                AstNodeKind::BinaryOp {
                    left: Box::new(base),
                    op: BinaryOperator::Pow,
                    right: Box::new(exponent),
                },
                location,
                span,
            ))
        }
    }
}

fn parse_postfix_rule(pair: pest::iterators::Pair<Rule>, script: &script::Script) -> ParseResult {
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&pair, script);
    let primary = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    let mut node = parse_primary_rule(primary, script)?;

    for suffix in inner_pairs {
        let suffix_location = rules::get_location_from_pair(&suffix, script);
        let suffix_span = rules::get_span_from_pair(&suffix, script);
        node = match suffix.as_rule() {
            Rule::call_suffix => {
                let mut args = Vec::new();
                let mut keywords = Vec::new();
                for arg in suffix.clone().into_inner() {
                    match arg.as_rule() {
                        Rule::keyword_arg => {
                            let mut kw_inner = arg.clone().into_inner();
                            let name_pair = rules::fetch_next_pair(&mut kw_inner, &suffix_location, &suffix_span)?;
                            let value_pair = rules::fetch_next_pair(&mut kw_inner, &suffix_location, &suffix_span)?;
                            keywords.push(Keyword {
                                name: name_pair.as_str().to_string(),
                                value: parse_expression_rule(value_pair, script)?,
                            });
                        }
                        _ => {
                            if !keywords.is_empty() {
                                return Err(rules::unexpected(
                                    &arg,
                                    script,
                                    "Positional argument follows keyword argument.".into(),
                                    "tilang.ast.expr.parse_postfix_rule",
                                ));
                            }
                            args.push(parse_expression_rule(arg, script)?);
                        }
                    }
                }
                build_call(node, args, keywords, location.clone(), suffix_span, &suffix, script)?
            }
            Rule::subscript_suffix => {
                let mut sub_inner = suffix.clone().into_inner();
                let list = rules::fetch_next_pair(&mut sub_inner, &suffix_location, &suffix_span)?;
                AstNode::new(
                    AstNodeKind::Subscript {
                        object: Box::new(node),
                        indices: parse_expression_list_items(list, script)?,
                    },
                    location.clone(),
                    suffix_span,
                )
            }
            Rule::attribute_suffix => {
                let mut attr_inner = suffix.clone().into_inner();
                let name = rules::fetch_next_pair(&mut attr_inner, &suffix_location, &suffix_span)?;
                AstNode::new(
                    AstNodeKind::Attribute {
                        object: Box::new(node),
                        name: name.as_str().to_string(),
                    },
                    location.clone(),
                    suffix_span,
                )
            }
            other => {
                return Err(rules::unexpected(
                    &suffix,
                    script,
                    format!("Unsupported postfix operator {:?}.", other),
                    "tilang.ast.expr.parse_postfix_rule",
                ));
            }
        };
    }

    Ok(node)
}

/// Builds a call node; `'...'.format(...)` becomes a `FormatString`.
fn build_call(
    callee: AstNode,
    args: Vec<AstNode>,
    keywords: Vec<Keyword>,
    location: Option<crate::location::Location>,
    span: Option<crate::location::Span>,
    suffix: &pest::iterators::Pair<Rule>,
    script: &script::Script,
) -> ParseResult {
    if let AstNodeKind::Attribute { object, name } = &callee.kind {
        if let (AstNodeKind::String { value }, "format") = (&object.kind, name.as_str()) {
            if !keywords.is_empty() {
                return Err(rules::unexpected(
                    suffix,
                    script,
                    "Keyword arguments are not supported in str.format.".into(),
                    "tilang.ast.expr.build_call",
                ));
            }
            let parts = split_format_template(value, args).map_err(|message| {
                rules::unexpected(suffix, script, message, "tilang.ast.expr.build_call")
            })?;
            return Ok(AstNode::new(AstNodeKind::FormatString { parts }, location, span));
        }
    }

    Ok(AstNode::new(
        AstNodeKind::Call {
            callee: Box::new(callee),
            args,
            keywords,
        },
        location,
        span,
    ))
}

fn parse_primary_rule(pair: pest::iterators::Pair<Rule>, script: &script::Script) -> ParseResult {
    let location = rules::get_location_from_pair(&pair, script);
    let span = rules::get_span_from_pair(&pair, script);
    let text = pair.as_str();

    let kind = match pair.as_rule() {
        Rule::identifier => AstNodeKind::Identifier { name: text.to_string() },
        Rule::integer => {
            let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                Some(hex) => i64::from_str_radix(hex, 16),
                None => text.parse::<i64>(),
            };
            let value = parsed.map_err(|e| {
                rules::unexpected(
                    &pair,
                    script,
                    format!("Invalid integer literal '{}': {}", text, e),
                    "tilang.ast.expr.parse_primary_rule",
                )
            })?;
            AstNodeKind::Integer { value }
        }
        Rule::float => {
            let value = text.parse::<f64>().map_err(|e| {
                rules::unexpected(
                    &pair,
                    script,
                    format!("Invalid float literal '{}': {}", text, e),
                    "tilang.ast.expr.parse_primary_rule",
                )
            })?;
            AstNodeKind::Float { value }
        }
        Rule::boolean => AstNodeKind::Bool { value: text == "True" },
        Rule::none => AstNodeKind::None,
        Rule::string => AstNodeKind::String {
            value: unescape(strip_quotes(text)),
        },
        Rule::fstring => {
            return parse_fstring(&pair, script);
        }
        Rule::list_display => {
            let elements = pair
                .clone()
                .into_inner()
                .map(|p| parse_expression_rule(p, script))
                .collect::<Result<Vec<_>, _>>()?;
            AstNodeKind::List { elements }
        }
        Rule::paren_expr => {
            return match pair.clone().into_inner().next() {
                Some(list) => parse_expression_list_rule(list, script),
                None => Ok(AstNode::new(AstNodeKind::Tuple { elements: Vec::new() }, location, span)),
            };
        }
        other => {
            return Err(rules::unexpected(
                &pair,
                script,
                format!("Unexpected primary expression {:?}.", other),
                "tilang.ast.expr.parse_primary_rule",
            ));
        }
    };

    Ok(AstNode::new(kind, location, span))
}

fn strip_quotes(text: &str) -> &str {
    if text.len() >= 2 {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Splits a `str.format` template into literal text and positional arguments.
/// Supports `{}`, `{N}`, `{{` and `}}`.
fn split_format_template(template: &str, args: Vec<AstNode>) -> Result<Vec<FormatPart>, String> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut next_auto = 0usize;
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => field.push(ch),
                        None => return Err("Unterminated replacement field in format string.".into()),
                    }
                }
                let index = if field.trim().is_empty() {
                    next_auto += 1;
                    next_auto - 1
                } else {
                    field
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| format!("Unsupported replacement field '{{{}}}'.", field))?
                };
                let arg = args
                    .get(index)
                    .cloned()
                    .ok_or_else(|| format!("Replacement index {} out of range for format arguments.", index))?;
                if !literal.is_empty() {
                    parts.push(FormatPart::Literal(std::mem::take(&mut literal)));
                }
                parts.push(FormatPart::Expr(arg));
            }
            '}' => return Err("Single '}' encountered in format string.".into()),
            _ => literal.push(c),
        }
    }
    if !literal.is_empty() {
        parts.push(FormatPart::Literal(literal));
    }
    Ok(parts)
}

/// Parses `f'...'`. Embedded expressions are re-parsed with padding so their
/// locations point at the script text.
fn parse_fstring(pair: &pest::iterators::Pair<Rule>, script: &script::Script) -> ParseResult {
    let location = rules::get_location_from_pair(pair, script);
    let span = rules::get_span_from_pair(pair, script);
    let (line, column) = pair.as_span().start_pos().line_col();

    // Skip the `f` prefix and the opening quote.
    let body: Vec<char> = strip_quotes(&pair.as_str()[1..]).chars().collect();
    let body_column = column + 2;

    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0usize;
    while i < body.len() {
        let c = body[i];
        if c == '{' && body.get(i + 1) == Some(&'{') {
            literal.push('{');
            i += 2;
            continue;
        }
        if c == '}' && body.get(i + 1) == Some(&'}') {
            literal.push('}');
            i += 2;
            continue;
        }
        if c == '}' {
            return Err(rules::unexpected(
                pair,
                script,
                "f-string: single '}' is not allowed".into(),
                "tilang.ast.expr.parse_fstring",
            ));
        }
        if c != '{' {
            literal.push(c);
            i += 1;
            continue;
        }

        // Find the matching close brace, skipping nested brackets and strings.
        let start = i + 1;
        let mut depth = 0i32;
        let mut quote: Option<char> = None;
        let mut end = None;
        let mut j = start;
        while j < body.len() {
            let ch = body[j];
            match quote {
                Some(q) if ch == q => quote = None,
                Some(_) => {}
                None => match ch {
                    '\'' | '"' => quote = Some(ch),
                    '(' | '[' | '{' => depth += 1,
                    ')' | ']' => depth -= 1,
                    '}' if depth == 0 => {
                        end = Some(j);
                        break;
                    }
                    '}' => depth -= 1,
                    _ => {}
                },
            }
            j += 1;
        }
        let end = end.ok_or_else(|| {
            rules::unexpected(
                pair,
                script,
                "f-string: expecting '}'".into(),
                "tilang.ast.expr.parse_fstring",
            )
        })?;

        let source: String = body[start..end].iter().collect();
        if source.trim().is_empty() {
            return Err(rules::unexpected(
                pair,
                script,
                "f-string: empty expression not allowed".into(),
                "tilang.ast.expr.parse_fstring",
            ));
        }
        let padded = format!(
            "{}{}{}",
            "\n".repeat(line.saturating_sub(1)),
            " ".repeat(body_column + start - 1),
            source
        );
        let expr = parse_padded_expression(&padded, script)?;
        if !literal.is_empty() {
            parts.push(FormatPart::Literal(unescape(&std::mem::take(&mut literal))));
        }
        parts.push(FormatPart::Expr(expr));
        i = end + 1;
    }
    if !literal.is_empty() {
        parts.push(FormatPart::Literal(unescape(&literal)));
    }

    Ok(AstNode::new(AstNodeKind::FormatString { parts }, location, span))
}

fn parse_padded_expression(text: &str, script: &script::Script) -> ParseResult {
    let mut pairs = RulesParser::parse(Rule::standalone_expression, text)
        .map_err(|e| super::syntax_error_from_pest(e, script))?;
    let standalone = match pairs.next() {
        Some(p) => p,
        None => {
            return Err(Box::new(crate::ast::err::SyntaxError::malformed(
                "Format field produced no expression.".into(),
                "tilang.ast.expr.parse_padded_expression".into(),
                None,
                None,
            )));
        }
    };
    let (mut inner_pairs, location, span) = rules::get_data_from_rule(&standalone, script);
    let expr = rules::fetch_next_pair(&mut inner_pairs, &location, &span)?;
    parse_expression_rule(expr, script)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> AstNode {
        AstNode::new(AstNodeKind::Identifier { name: name.into() }, None, None)
    }

    #[test]
    fn format_template_uses_positional_and_escaped_braces() {
        let parts = split_format_template("a={}, b={0} {{x}}", vec![ident("a")]).unwrap();
        assert_eq!(parts.len(), 5);
        assert!(matches!(&parts[0], FormatPart::Literal(s) if s == "a="));
        assert!(matches!(&parts[2], FormatPart::Literal(s) if s == ", b="));
        assert!(matches!(&parts[4], FormatPart::Literal(s) if s == " {x}"));
    }

    #[test]
    fn format_template_rejects_missing_argument() {
        let err = split_format_template("{} {}", vec![ident("a")]).unwrap_err();
        assert!(err.contains("out of range"));
    }

    #[test]
    fn unescape_handles_common_sequences() {
        assert_eq!(unescape(r"a\nb\\c\'"), "a\nb\\c'");
    }
}
