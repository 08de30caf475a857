//! file: core/src/ast/layout.rs
//! description: indentation layout pass.
//!
//! Kernel sources are indentation structured. Before the `pest` grammar sees
//! them, this pass rewrites every logical line so block structure becomes
//! explicit: a line ending in `:` gets a trailing `{`, simple statements get
//! a trailing `;`, and each dedent appends `}` to the last significant line.
//! Comments are dropped. Line numbers and the columns of existing text are
//! preserved, so parser locations still point into the script text.

use crate::ast::err::SyntaxError;
use crate::location::Location;
use crate::script::Script;

const ISSUER: &str = "tilang.ast.layout";

struct LineScan {
    code: String,
    depth: i64,
}

/// Strip a trailing `#` comment and track bracket nesting across the line.
fn scan_line(line: &str, mut depth: i64) -> LineScan {
    let mut code = String::with_capacity(line.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in line.chars() {
        if let Some(q) = quote {
            code.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '#' => break,
            '\'' | '"' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
        code.push(ch);
    }

    LineScan { code, depth }
}

fn indent_width(line: &str) -> usize {
    let mut width = 0usize;
    for ch in line.chars() {
        match ch {
            ' ' => width += 1,
            '\t' => width += 8 - (width % 8),
            _ => break,
        }
    }
    width
}

fn layout_error(script: &Script, message: &str, line: usize, column: usize) -> SyntaxError {
    SyntaxError::layout(message, ISSUER.to_string(), Location::new(script.name.clone(), line, column))
}

/// Rewrite indentation structure into explicit `{`, `}` and `;` delimiters.
pub fn apply_layout(script: &Script) -> Result<String, SyntaxError> {
    let lines: Vec<&str> = script.content.lines().collect();
    let mut out: Vec<String> = vec![String::new(); lines.len()];

    let mut indents: Vec<usize> = vec![0];
    let mut depth: i64 = 0;
    let mut pending_block = false;
    let mut last_significant: Option<usize> = None;

    for (i, raw) in lines.iter().enumerate() {
        let continuing = depth > 0;
        let scan = scan_line(raw, depth);

        if !continuing {
            if scan.code.trim().is_empty() {
                continue;
            }
            let indent = indent_width(&scan.code);
            let top = *indents.last().unwrap_or(&0);
            if pending_block {
                if indent <= top {
                    return Err(layout_error(script, "expected an indented block", i + 1, indent + 1));
                }
                indents.push(indent);
                pending_block = false;
            } else {
                if indent > top {
                    return Err(layout_error(script, "unexpected indent", i + 1, indent + 1));
                }
                while indent < *indents.last().unwrap_or(&0) {
                    indents.pop();
                    if let Some(j) = last_significant {
                        out[j].push_str(" }");
                    }
                }
                if indent != *indents.last().unwrap_or(&0) {
                    return Err(layout_error(
                        script,
                        "unindent does not match any outer indentation level",
                        i + 1,
                        indent + 1,
                    ));
                }
            }
        }

        if scan.depth < 0 {
            return Err(layout_error(script, "unmatched closing bracket", i + 1, 1));
        }

        out[i] = scan.code.trim_end().to_string();
        depth = scan.depth;

        if depth == 0 {
            if out[i].ends_with(':') {
                out[i].push_str(" {");
                pending_block = true;
            } else {
                out[i].push(';');
            }
            last_significant = Some(i);
        }
    }

    if depth > 0 {
        return Err(layout_error(script, "unexpected end of file inside brackets", lines.len(), 1));
    }
    if pending_block {
        return Err(layout_error(script, "expected an indented block", lines.len(), 1));
    }
    while indents.len() > 1 {
        indents.pop();
        if let Some(j) = last_significant {
            out[j].push_str(" }");
        }
    }

    let mut text = out.join("\n");
    text.push('\n');
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::err::SyntaxCause;
    use crate::error::TilangErrorExt;

    fn layout(src: &str) -> String {
        apply_layout(&Script::from_source("t.ti", src)).expect("layout should succeed")
    }

    #[test]
    fn blocks_become_braces() {
        let text = layout("def f(x):\n    if x:\n        return 1\n    return 0\n");
        assert_eq!(text, "def f(x): {\n    if x: {\n        return 1; }\n    return 0; }\n");
    }

    #[test]
    fn comments_and_blank_lines_are_dropped() {
        let text = layout("a = 1  # one\n\n# note\nb = '#not a comment'\n");
        assert_eq!(text, "a = 1;\n\n\nb = '#not a comment';\n");
    }

    #[test]
    fn bracket_continuation_spans_lines() {
        let text = layout("def f(a,\n      b):\n    pass\n");
        assert_eq!(text, "def f(a,\n      b): {\n    pass; }\n");
    }

    #[test]
    fn inconsistent_dedent_is_rejected() {
        let err = apply_layout(&Script::from_source("t.ti", "if x:\n    a = 1\n  b = 2\n")).unwrap_err();
        assert_eq!(err.message(), "unindent does not match any outer indentation level");
        assert_eq!(err.location().map(|l| l.line), Some(3));
        assert_eq!(err.cause(), &SyntaxCause::Layout);
    }
}
