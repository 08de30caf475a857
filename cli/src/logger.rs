//! Minimal `log` backend for the CLI: one styled line per record on stderr.

use console::{Style, Term};
use log::{Level, LevelFilter, Log, Metadata, Record};

struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

impl ConsoleLogger {
    fn style(level: Level) -> Style {
        match level {
            Level::Error => Style::new().red().bold(),
            Level::Warn => Style::new().yellow(),
            Level::Info => Style::new().cyan(),
            Level::Debug => Style::new().dim(),
            Level::Trace => Style::new().dim().italic(),
        }
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = Self::style(record.level()).apply_to(format!("{:<5}", record.level()));
        let _ = Term::stderr().write_line(&format!("{} {}", tag, record.args()));
    }

    fn flush(&self) {
        let _ = Term::stderr().flush();
    }
}

/// Level from `TILANG_LOG` when set, otherwise from the `-v` count.
pub fn level_filter(verbosity: u8, env: Option<&str>) -> LevelFilter {
    if let Some(level) = env.and_then(|raw| raw.trim().parse::<LevelFilter>().ok()) {
        return level;
    }
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

pub fn init(verbosity: u8) {
    let env = std::env::var("TILANG_LOG").ok();
    let level = level_filter(verbosity, env.as_deref());
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_wins_over_flags() {
        assert_eq!(level_filter(2, Some("info")), LevelFilter::Info);
        assert_eq!(level_filter(0, Some("nonsense")), LevelFilter::Warn);
        assert_eq!(level_filter(1, None), LevelFilter::Debug);
        assert_eq!(level_filter(3, None), LevelFilter::Trace);
    }
}
