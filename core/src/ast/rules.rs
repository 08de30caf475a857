use pest_derive::Parser;

use crate::location;

#[derive(Parser)]
#[grammar = "ast/grammar.pest"]

pub struct RulesParser;

pub(crate) fn fetch_next_pair<'a>(
    pairs: &mut pest::iterators::Pairs<'a, Rule>,
    location: &Option<location::Location>,
    span: &Option<location::Span>,
) -> Result<pest::iterators::Pair<'a, Rule>, Box<dyn crate::TilangErrorExt>> {
    match pairs.next() {
        Some(pair) => Ok(pair),
        None => Err(Box::new(crate::ast::err::SyntaxError::malformed(
            "Expected more inner pairs but found none.".into(),
            "tilang.ast.rules.fetch_next_pair".into(),
            location.clone(),
            span.clone(),
        ))),
    }
}

pub(crate) fn get_data_from_rule<'a>(
    rule: &pest::iterators::Pair<'a, Rule>,
    script: &crate::script::Script,
) -> (
    pest::iterators::Pairs<'a, Rule>,
    Option<crate::location::Location>,
    Option<crate::location::Span>,
) {
    let inner_rules = rule.clone().into_inner();
    let span = get_span_from_pair(rule, script);
    let location = get_location_from_pair(rule, script);
    (inner_rules, location, span)
}

pub fn get_location_from_pair(
    rule: &pest::iterators::Pair<Rule>,
    script: &crate::script::Script,
) -> Option<crate::location::Location> {
    Some(location::Location::from_position(
        &script.name,
        rule.as_span().start_pos(),
    ))
}

pub fn get_span_from_pair(
    rule: &pest::iterators::Pair<Rule>,
    script: &crate::script::Script,
) -> Option<crate::location::Span> {
    Some(location::Span::from_pest(&script.name, rule.as_span()))
}

/// Syntax error anchored at `pair`, raised by the builder named `issuer`.
pub(crate) fn unexpected(
    pair: &pest::iterators::Pair<Rule>,
    script: &crate::script::Script,
    message: String,
    issuer: &str,
) -> Box<dyn crate::TilangErrorExt> {
    Box::new(crate::ast::err::SyntaxError::malformed(
        message,
        issuer.to_string(),
        get_location_from_pair(pair, script),
        get_span_from_pair(pair, script),
    ))
}
