// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Normal, quiet (CI) and JSON-lines modes for progress, results and errors.

use serde::Serialize;
use std::time::Instant;

/// How command results reach the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Progress lines, warnings and timed results
    Normal,
    /// Final results and errors only
    Quiet,
    /// One JSON object per line
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Writes command feedback in the selected [`OutputMode`].
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing the current command.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Seconds since [`Output::start_timer`], or `None` if never started.
    pub fn elapsed_secs(&self) -> Option<f64> {
        self.start_time.map(|t| t.elapsed().as_secs_f64())
    }

    /// Intermediate step; dropped outside normal mode.
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print the final result of a command.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => match self.elapsed_secs() {
                Some(secs) => println!("{message} ({secs:.1}s)"),
                None => println!("{message}"),
            },
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => self.emit("success", message, Stream::Stdout),
        }
    }

    /// Print a non-fatal warning (suppressed in quiet mode).
    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => eprintln!("Warning: {message}"),
            OutputMode::Quiet => {}
            OutputMode::Json => self.emit("warning", message, Stream::Stderr),
        }
    }

    /// Print one result record: `line` for people, `value` as a JSON line.
    pub fn record<T: Serialize>(&self, value: &T, line: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => println!("{line}"),
            OutputMode::Json => {
                if let Ok(json) = serde_json::to_string(value) {
                    println!("{json}");
                }
            }
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => self.emit("error", message, Stream::Stderr),
        }
    }

    fn emit(&self, event: &str, message: &str, stream: Stream) {
        let Some(json) = self.event_json(event, message) else {
            return;
        };
        match stream {
            Stream::Stdout => println!("{json}"),
            Stream::Stderr => eprintln!("{json}"),
        }
    }

    fn event_json(&self, event: &str, message: &str) -> Option<String> {
        let event = JsonEvent {
            event,
            message,
            duration_secs: self.elapsed_secs(),
        };
        serde_json::to_string(&event).ok()
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}
