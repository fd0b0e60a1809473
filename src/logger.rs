use std::io::Write;
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warn,
    Error,
}

#[derive(Clone, Debug)]
pub struct LogLine {
    pub level: LogLevel,
    pub text: String,
    pub at: Instant,
}

/// User-facing progress log. Lines go to the writer and are mirrored to
/// `tracing`; the history is kept so callers can inspect what was reported.
pub struct Reporter<'a> {
    out: &'a mut dyn Write,
    lines: Vec<LogLine>,
}

impl<'a> Reporter<'a> {
    pub fn new(out: &'a mut dyn Write) -> Self {
        Self {
            out,
            lines: Vec::new(),
        }
    }

    pub fn log(&mut self, level: LogLevel, msg: impl Into<String>) {
        let text = msg.into();

        match level {
            LogLevel::Info | LogLevel::Success => tracing::info!("{text}"),
            LogLevel::Warn => tracing::warn!("{text}"),
            LogLevel::Error => tracing::error!("{text}"),
        }

        let _ = match level {
            LogLevel::Warn => writeln!(self.out, "warning: {text}"),
            LogLevel::Error => writeln!(self.out, "error: {text}"),
            LogLevel::Info | LogLevel::Success => writeln!(self.out, "{text}"),
        };

        self.lines.push(LogLine {
            level,
            text,
            at: Instant::now(),
        });
    }

    pub fn lines(&self) -> &[LogLine] {
        &self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_plain_and_prefixed_lines() {
        let mut buf = Vec::new();
        {
            let mut r = Reporter::new(&mut buf);
            r.log(LogLevel::Success, "Test passed");
            r.log(LogLevel::Warn, "budget exhausted");
            assert_eq!(r.lines().len(), 2);
            assert_eq!(r.lines()[1].level, LogLevel::Warn);
        }
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "Test passed\nwarning: budget exhausted\n"
        );
    }
}
