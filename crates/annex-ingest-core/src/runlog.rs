use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Local;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn label(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// Append-only run log, passed explicitly into each pipeline stage.
///
/// Events go to the log file; warnings and errors are echoed to stderr so
/// a console run surfaces problems without tailing the file.
pub struct RunLog {
    file: Option<File>,
}

impl RunLog {
    /// Open `path` for appending, creating it if needed.
    pub fn to_file(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Some(file) })
    }

    /// A log that records nothing. Used by tests.
    pub fn disabled() -> Self {
        Self { file: None }
    }

    pub fn debug<M: fmt::Display>(&self, msg: M) {
        self.write(Level::Debug, &msg.to_string());
    }

    pub fn info<M: fmt::Display>(&self, msg: M) {
        self.write(Level::Info, &msg.to_string());
    }

    pub fn warn<M: fmt::Display>(&self, msg: M) {
        self.write(Level::Warn, &msg.to_string());
    }

    pub fn error<M: fmt::Display>(&self, msg: M) {
        self.write(Level::Error, &msg.to_string());
    }

    fn write(&self, level: Level, msg: &str) {
        if let Some(mut file) = self.file.as_ref() {
            let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
            // A log write failing must not take the pipeline down with it.
            let _ = writeln!(file, "{} {:5} {}", stamp, level.label(), msg);
        }
        if level >= Level::Warn {
            eprintln!("{}: {}", level.label().to_lowercase(), msg);
        }
    }
}
