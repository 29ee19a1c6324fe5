//! The destination for decoded job output.

use crate::error::Result;
use crate::types::Dir;
use regex::Regex;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Patterns used to recognise result lines ("file:line:col" and friends).
#[derive(Clone, Debug)]
pub struct ResultPatterns {
    file_regex: Regex,
    line_regex: Option<Regex>,
    base_dir: Option<Dir>,
}

impl ResultPatterns {
    pub fn new(file_regex: &str, line_regex: &str, base_dir: Option<Dir>) -> Result<Self> {
        let line_regex = match line_regex {
            "" => None,
            pattern => Some(Regex::new(pattern)?),
        };
        Ok(Self {
            file_regex: Regex::new(file_regex)?,
            line_regex,
            base_dir,
        })
    }

    pub fn base_dir(&self) -> Option<&Dir> {
        self.base_dir.as_ref()
    }

    /// Number of result lines in `text`.
    ///
    /// A line matching the file pattern is a result. A line matching only the
    /// line pattern is a result when some earlier line named a file.
    pub fn count_results(&self, text: &str) -> usize {
        let mut seen_file = false;
        text.lines()
            .filter(|line| {
                if self.file_regex.is_match(line) {
                    seen_file = true;
                    true
                } else {
                    seen_file
                        && self
                            .line_regex
                            .as_ref()
                            .map_or(false, |regex| regex.is_match(line))
                }
            })
            .count()
    }
}

/// Append-only text destination owned by the consumer context.
///
/// Implementations are only ever called from the supervisor actor, never
/// concurrently.
pub trait OutputSink: Send {
    /// Starts a fresh output for a new run.
    fn reset(&mut self, patterns: ResultPatterns);
    fn append(&mut self, text: &str);
    /// Number of recognisable results in the current output.
    fn count_results(&self) -> usize;
    fn status_message(&mut self, message: &str);
    /// Puts the cursor back at the start so result navigation begins at the top.
    fn reset_cursor(&mut self);
}

#[derive(Debug, Default)]
struct Buffer {
    text: String,
    patterns: Option<ResultPatterns>,
    cursor: usize,
    status: Option<String>,
}

/// In-memory sink. Clones share the same buffer, so a host can keep one
/// clone for reading while the supervisor owns another.
#[derive(Clone, Debug, Default)]
pub struct BufferSink {
    inner: Arc<Mutex<Buffer>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Buffer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contents(&self) -> String {
        self.lock().text.clone()
    }

    pub fn cursor(&self) -> usize {
        self.lock().cursor
    }

    pub fn last_status(&self) -> Option<String> {
        self.lock().status.clone()
    }

    pub fn base_dir(&self) -> Option<Dir> {
        self.lock()
            .patterns
            .as_ref()
            .and_then(|patterns| patterns.base_dir().cloned())
    }
}

impl OutputSink for BufferSink {
    fn reset(&mut self, patterns: ResultPatterns) {
        let mut buffer = self.lock();
        buffer.text.clear();
        buffer.cursor = 0;
        buffer.patterns = Some(patterns);
    }

    fn append(&mut self, text: &str) {
        let mut buffer = self.lock();
        buffer.text.push_str(text);
        // the cursor follows the output, like a panel scrolled to the end
        buffer.cursor = buffer.text.len();
    }

    fn count_results(&self) -> usize {
        let buffer = self.lock();
        buffer
            .patterns
            .as_ref()
            .map_or(0, |patterns| patterns.count_results(&buffer.text))
    }

    fn status_message(&mut self, message: &str) {
        self.lock().status = Some(message.to_string());
    }

    fn reset_cursor(&mut self) {
        self.lock().cursor = 0;
    }
}
