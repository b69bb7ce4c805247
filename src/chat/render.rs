//! Output rendering for the chat application.
//!
//! This module provides a trait-based rendering abstraction so the session logic can be
//! exercised without a terminal.  The default implementation writes to stdout with optional
//! ANSI styling.

use std::io::{self, Stdout, Write};

/// ANSI escape code for dim text (used for notices and suggestions).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for bold text (used for headings).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering chat output.
pub trait Renderer: Send {
    /// Print a chunk of reply text.
    ///
    /// This is called incrementally as fragments stream in.
    fn print_text(&mut self, text: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when the text printed so far is void and the reply restarts.
    fn print_restart(&mut self) {
        self.print_info("\n[retrying]");
    }

    /// Called when a reply is complete.
    fn finish_response(&mut self);

    /// Called when the reply is interrupted by the user.
    fn print_interrupted(&mut self);

    /// Print the greeting shown before the first message.
    fn print_welcome(&mut self, welcome: &str, suggestions: &[&str]) {
        self.print_info(welcome);
        for suggestion in suggestions {
            self.print_info(&format!("  - {suggestion}"));
        }
    }
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
        }
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_text(&mut self, text: &str) {
        print!("{text}");
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        if self.use_color {
            eprintln!("\n{ANSI_RED}Error:{ANSI_RESET} {error}");
        } else {
            eprintln!("\nError: {error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        if self.use_color {
            println!("{ANSI_DIM}{info}{ANSI_RESET}");
        } else {
            println!("{info}");
        }
    }

    fn finish_response(&mut self) {
        println!();
        self.flush();
    }

    fn print_interrupted(&mut self) {
        println!("\n[interrupted]");
        self.flush();
    }

    fn print_welcome(&mut self, welcome: &str, suggestions: &[&str]) {
        if self.use_color {
            println!("{ANSI_BOLD}Start a Conversation{ANSI_RESET}");
        } else {
            println!("Start a Conversation");
        }
        println!("{welcome}");
        println!();
        self.print_info("Try asking:");
        for suggestion in suggestions {
            self.print_info(&format!("  - {suggestion}"));
        }
        println!();
    }
}
