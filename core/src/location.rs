#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct Location {
    /// Name of the script the location points into.
    pub file: String,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column number.
    pub column: usize,
}

impl Location {
    pub fn new(file: String, line: usize, column: usize) -> Self {
        Self { file, line, column }
    }

    /// Location of a `pest` position inside the script named `file`.
    pub fn from_position(file: &str, pos: pest::Position<'_>) -> Self {
        let (line, column) = pos.line_col();
        Self::new(file.to_string(), line, column)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct Span {
    pub start: Location,
    pub end: Location,
}

impl Span {
    pub fn new(start: Location, end: Location) -> Self {
        Self { start, end }
    }

    pub fn from_pest(file: &str, span: pest::Span<'_>) -> Self {
        Self::new(
            Location::from_position(file, span.start_pos()),
            Location::from_position(file, span.end_pos()),
        )
    }

    /// Smallest span covering both `self` and `other`.
    pub fn merge(&self, other: &Span) -> Span {
        let start = if (other.start.line, other.start.column) < (self.start.line, self.start.column) {
            other.start.clone()
        } else {
            self.start.clone()
        };
        let end = if (other.end.line, other.end.column) > (self.end.line, self.end.column) {
            other.end.clone()
        } else {
            self.end.clone()
        };
        Span { start, end }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.start, self.end)
    }
}
