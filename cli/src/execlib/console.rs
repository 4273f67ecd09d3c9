use std::io::Write;
use std::sync::{Mutex, PoisonError};

use termcolor::{self, ColorChoice, ColorSpec, StandardStream, WriteColor};
use tracing::{event, Level};

use storage::Console;

fn get_colour_choice() -> termcolor::ColorChoice {
    if atty::is(atty::Stream::Stdout) {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

/// The system console, on the standard output.  Exec messages are
/// shown in a different colour from the launcher's own.
pub struct StdoutConsole {
    stream: Mutex<StandardStream>,
    log_messages: bool,
}

impl StdoutConsole {
    pub fn new(log_messages: bool) -> StdoutConsole {
        StdoutConsole {
            stream: Mutex::new(StandardStream::stdout(get_colour_choice())),
            log_messages,
        }
    }

    fn emit(&self, colour: termcolor::Color, text: &str) {
        let mut stream = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(colour));
        if let Err(e) = stream.set_color(&spec) {
            event!(Level::ERROR, "Failed to select colour {:?}: {}", spec, e);
        }
        let written = writeln!(stream, "{text}").and_then(|()| stream.flush());
        if let Err(e) = written {
            event!(Level::ERROR, "Failed to write to the console: {}", e);
        }
        if let Err(e) = stream.reset() {
            event!(Level::ERROR, "Failed to reset terminal: {}", e);
        }
    }

    /// A message from the launcher rather than from the exec.
    pub fn announce(&self, text: &str) {
        self.emit(termcolor::Color::Yellow, text);
    }
}

impl Console for StdoutConsole {
    fn send_read_only_message(&self, text: &str) {
        if self.log_messages {
            event!(Level::INFO, "console: {text}");
        }
        self.emit(termcolor::Color::Green, text);
    }
}
