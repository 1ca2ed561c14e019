//! Terminal styling for CLI output.
//!
//! Styles apply only when the stream they are printed to is a terminal, so
//! piped output and `--json` runs stay plain.

use is_terminal::IsTerminal;
use owo_colors::OwoColorize;

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn is_terminal(self) -> bool {
        match self {
            Stream::Stdout => std::io::stdout().is_terminal(),
            Stream::Stderr => std::io::stderr().is_terminal(),
        }
    }
}

/// Apply `style` to `text` when `stream` is a terminal.
fn paint<F>(stream: Stream, text: &str, style: F) -> String
where
    F: FnOnce(&str) -> String,
{
    if stream.is_terminal() {
        style(text)
    } else {
        text.to_string()
    }
}

/// Left-align `msg` in `width` columns before styling, so escape codes do not skew padding.
pub fn pad_left<F>(msg: &str, width: usize, style: F) -> String
where
    F: FnOnce(&str) -> String,
{
    style(&format!("{:<width$}", msg))
}

fn labelled(label: &str, msg: &str, style: fn(&str) -> String) -> String {
    format!("{} {}", paint(Stream::Stderr, label, style), msg)
}

pub fn error(msg: &str) -> String {
    labelled("error:", msg, |s| s.red().bold().to_string())
}

pub fn warning(msg: &str) -> String {
    labelled("warning:", msg, |s| s.yellow().bold().to_string())
}

pub fn success(msg: &str) -> String {
    paint(Stream::Stdout, msg, |s| s.green().to_string())
}

pub fn dim(msg: &str) -> String {
    paint(Stream::Stdout, msg, |s| s.dimmed().to_string())
}

pub fn header(msg: &str) -> String {
    paint(Stream::Stdout, msg, |s| s.bold().blue().to_string())
}

pub fn path(msg: &str) -> String {
    paint(Stream::Stdout, msg, |s| s.underline().to_string())
}

/// Counts and coordinates.
pub fn number(msg: &str) -> String {
    paint(Stream::Stdout, msg, |s| s.cyan().to_string())
}

/// Archive progress line for stderr, e.g. `archiving  42.0%`.
pub fn progress(ratio: f64) -> String {
    let percent = format!("{:>5.1}%", ratio * 100.0);
    format!(
        "{} {}",
        paint(Stream::Stderr, "archiving", |s| s.yellow().to_string()),
        paint(Stream::Stderr, &percent, |s| s.bold().to_string())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_left_pads_before_styling() {
        let padded = pad_left("ok", 5, |s| format!("[{}]", s));
        assert_eq!(padded, "[ok   ]");
    }

    #[test]
    fn test_progress_mentions_percentage() {
        assert!(progress(0.5).contains("50.0%"));
        assert!(progress(1.0).contains("100.0%"));
    }
}
