use crate::document::parser::ParseError;
use std::{fmt, path::PathBuf};

/// A parse attempt that failed for a reason other than going stale.
#[derive(Debug, Clone)]
pub struct ParseFailure {
    pub version: u64,
    pub file_path: Option<PathBuf>,
    pub error: ParseError,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file_path {
            Some(path) => write!(
                f,
                "{} (version {}): {}",
                path.display(),
                self.version,
                self.error
            ),
            None => write!(f, "version {}: {}", self.version, self.error),
        }
    }
}

/// Out-of-band sink for parse failures. Failures never reach callers of the controller.
pub trait ErrorReporter: Send + Sync + 'static {
    fn report(&self, failure: &ParseFailure);
}

/// Writes failures to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, failure: &ParseFailure) {
        log::error!("parse failed for {failure}");
    }
}
