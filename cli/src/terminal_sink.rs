use rakelib::{BufferSink, OutputSink, ResultPatterns};
use std::io::{self, Write};

/// Writes build output straight to stdout while keeping a copy for
/// result counting. Status messages go to stderr.
#[derive(Default)]
pub struct TerminalSink {
    buffer: BufferSink,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputSink for TerminalSink {
    fn reset(&mut self, patterns: ResultPatterns) {
        self.buffer.reset(patterns);
    }

    fn append(&mut self, text: &str) {
        self.buffer.append(text);
        let mut stdout = io::stdout().lock();
        // a closed stdout is not worth stopping the build for
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    fn count_results(&self) -> usize {
        self.buffer.count_results()
    }

    fn status_message(&mut self, message: &str) {
        eprintln!("\n{}", message);
    }

    fn reset_cursor(&mut self) {
        self.buffer.reset_cursor();
    }
}
