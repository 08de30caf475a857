use std::sync::{Mutex, PoisonError};

/// Destination of kernel `print` output, one call per printed line.
pub trait PrintSink: Send + Sync {
    fn print(&self, line: &str);
}

pub struct StdoutSink;

impl PrintSink for StdoutSink {
    fn print(&self, line: &str) {
        println!("{}", line);
    }
}

/// Collects printed lines in memory.
#[derive(Default)]
pub struct BufferSink {
    lines: Mutex<Vec<String>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl PrintSink for BufferSink {
    fn print(&self, line: &str) {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).push(line.to_string());
    }
}
