/// cli/src/output.rs
/// Output utilities for the CLI
/// description: styled lines, diagnostic reports and the tables printed
/// after `run` and `check`.

use std::io::{self, Write};

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Table};
use console::{Style, Term};
use tilang_core::{Field, KernelIr, Level, Program, TilangErrorExt, Value, generate_error_report};

/// Fields longer than this are shown truncated.
const MAX_FIELD_VALUES: usize = 16;

/// Styles for different output elements
pub struct FormatStyle {
    pub title: Style,
    pub info: Style,
    pub warning: Style,
    pub error: Style,
    pub success: Style,
}

impl Default for FormatStyle {
    fn default() -> Self {
        FormatStyle {
            title: Style::new().bold().underlined(),
            info: Style::new().cyan(),
            warning: Style::new().yellow(),
            error: Style::new().red().bold(),
            success: Style::new().green().bold(),
        }
    }
}

#[derive(Debug)]
pub struct OutputError {
    message: String,
}

impl From<io::Error> for OutputError {
    fn from(e: io::Error) -> Self {
        OutputError {
            message: format!("write output: {}", e),
        }
    }
}

impl std::fmt::Display for OutputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl TilangErrorExt for OutputError {
    fn level(&self) -> Level {
        Level::Error
    }

    fn message(&self) -> String {
        self.message.clone()
    }

    fn issuer(&self) -> String {
        "tilang.cli.output".to_string()
    }

    fn span(&self) -> Option<tilang_core::Span> {
        None
    }

    fn location(&self) -> Option<tilang_core::Location> {
        None
    }
}

pub type OutputResult = Result<(), OutputError>;

/// Printer that writes formatted lines into any `Write`.
pub struct FormattedOutputHandler<T: Write> {
    out: T,
    formatting: FormatStyle,
}

impl FormattedOutputHandler<Term> {
    pub fn stdout() -> Self {
        FormattedOutputHandler::new(Term::stdout())
    }

    pub fn stderr() -> Self {
        FormattedOutputHandler::new(Term::stderr())
    }
}

impl<T: Write> FormattedOutputHandler<T> {
    pub fn new(out: T) -> Self {
        FormattedOutputHandler { out, formatting: FormatStyle::default() }
    }

    pub fn with_formatting(mut self, formatting: FormatStyle) -> Self {
        self.formatting = formatting;
        self
    }

    /// Write a single line, styled when `style` is given.
    pub fn line(&mut self, text: &str, style: Option<&Style>) -> OutputResult {
        match style {
            Some(s) => writeln!(self.out, "{}", s.apply_to(text))?,
            None => writeln!(self.out, "{}", text)?,
        }
        Ok(())
    }

    pub fn title(&mut self, text: &str) -> OutputResult {
        let style = self.formatting.title.clone();
        self.line(text, Some(&style))
    }

    pub fn success(&mut self, text: &str) -> OutputResult {
        let style = self.formatting.success.clone();
        self.line(text, Some(&style))
    }

    pub fn message(&mut self, text: &str) -> OutputResult {
        self.line(text, None)
    }

    /// Diagnostic report, colored by level.
    pub fn report(&mut self, error: &dyn TilangErrorExt) -> OutputResult {
        let style = match error.level() {
            Level::Info => self.formatting.info.clone(),
            Level::Warning => self.formatting.warning.clone(),
            Level::Error | Level::Critical => self.formatting.error.clone(),
        };
        self.line(&generate_error_report(error), Some(&style))
    }

    pub fn value(&mut self, kernel: &str, value: &Value) -> OutputResult {
        let style = self.formatting.info.clone();
        self.line(&format!("{} returned {}", kernel, value), Some(&style))
    }

    pub fn ir(&mut self, ir: &KernelIr) -> OutputResult {
        self.title(&format!("kernel {}", ir.name))?;
        write!(self.out, "{}", ir)?;
        Ok(())
    }

    pub fn ir_json(&mut self, ir: &KernelIr) -> OutputResult {
        let text = serde_json::to_string_pretty(ir).map_err(|e| OutputError {
            message: format!("serialize IR: {}", e),
        })?;
        writeln!(self.out, "{}", text)?;
        Ok(())
    }

    /// One table row per field: name, dtype, shape and (leading) contents.
    pub fn fields(&mut self, fields: &[(String, Field)]) -> OutputResult {
        if fields.is_empty() {
            return self.message("no fields");
        }
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["field", "dtype", "shape", "values"]);
        for (name, field) in fields {
            table.add_row(vec![
                Cell::new(name),
                Cell::new(field.dtype()),
                Cell::new(format!("{:?}", field.shape())),
                Cell::new(render_values(field)),
            ]);
        }
        writeln!(self.out, "{}", table)?;
        Ok(())
    }

    pub fn kernels(&mut self, program: &Program) -> OutputResult {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL).set_header(vec!["kernel", "params", "compiled"]);
        for name in program.kernel_names() {
            let arity = program.kernel_arity(&name).unwrap_or(0);
            let compiled = program.kernel_ir(&name).len();
            table.add_row(vec![Cell::new(&name), Cell::new(arity), Cell::new(compiled)]);
        }
        writeln!(self.out, "{}", table)?;
        Ok(())
    }

    pub fn into_inner(self) -> T {
        self.out
    }
}

fn render_values(field: &Field) -> String {
    let values = field.to_vec();
    let shown: Vec<String> = values
        .iter()
        .take(MAX_FIELD_VALUES)
        .map(|v| v.render(field.dtype()))
        .collect();
    if values.len() > MAX_FIELD_VALUES {
        format!("{} ... ({} total)", shown.join(", "), values.len())
    } else {
        shown.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilang_core::DataType;

    fn plain() -> FormattedOutputHandler<Vec<u8>> {
        let none = || Style::new().force_styling(false);
        FormattedOutputHandler::new(Vec::new()).with_formatting(FormatStyle {
            title: none(),
            info: none(),
            warning: none(),
            error: none(),
            success: none(),
        })
    }

    #[test]
    fn long_fields_are_truncated() {
        let field = Field::new(DataType::I32, &[20]);
        let text = render_values(&field);
        assert!(text.ends_with("... (20 total)"), "{}", text);
    }

    #[test]
    fn field_table_lists_names_and_values() {
        let field = Field::new(DataType::F32, &[2]);
        field.set(&[1], Value::Float(0.5)).expect("in range");
        let mut out = plain();
        out.fields(&[("weights".to_string(), field)]).expect("write");
        let text = String::from_utf8(out.into_inner()).expect("utf8");
        assert!(text.contains("weights"));
        assert!(text.contains("0.0, 0.5"));
        assert!(text.contains("f32"));
    }

    #[test]
    fn returned_values_are_labelled() {
        let mut out = plain();
        out.value("foo", &Value::Int(3)).expect("write");
        assert_eq!(String::from_utf8(out.into_inner()).expect("utf8"), "foo returned 3\n");
    }
}
