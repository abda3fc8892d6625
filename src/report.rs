//! Operator-visible record of every command sent and the reply it got.

use std::io::{self, Write};

use crossterm::queue;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

/// Receives one call per command exchange, in protocol order.
pub trait Reporter {
    fn exchange(&mut self, sent: &str, received: &str) -> io::Result<()>;
}

/// Writes `SentCmd: <sent> ||  Received: <received>` lines, texts untouched.
pub struct PlainReporter<W: Write> {
    out: W,
}

impl<W: Write> PlainReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl PlainReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Reporter for PlainReporter<W> {
    fn exchange(&mut self, sent: &str, received: &str) -> io::Result<()> {
        writeln!(self.out, "SentCmd: {sent} ||  Received: {received}")?;
        self.out.flush()
    }
}

/// Same line layout as [`PlainReporter`] with colored labels for terminals.
pub struct StyledReporter<W: Write> {
    out: W,
}

impl<W: Write> StyledReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl StyledReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Reporter for StyledReporter<W> {
    fn exchange(&mut self, sent: &str, received: &str) -> io::Result<()> {
        queue!(
            self.out,
            SetForegroundColor(Color::Cyan),
            Print("SentCmd: "),
            ResetColor,
            Print(sent),
            SetForegroundColor(Color::DarkGrey),
            Print(" ||  "),
            SetForegroundColor(Color::Green),
            Print("Received: "),
            ResetColor,
            Print(received),
            Print("\n"),
        )?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_line_keeps_texts_verbatim() {
        let mut reporter = PlainReporter::new(Vec::new());
        reporter.exchange("RAT 1000 UM", "\u{2}00S\u{3}").unwrap();
        reporter.exchange("RUN", "").unwrap();
        let text = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(
            text,
            "SentCmd: RAT 1000 UM ||  Received: \u{2}00S\u{3}\nSentCmd: RUN ||  Received: \n"
        );
    }

    #[test]
    fn styled_line_contains_both_texts() {
        let mut reporter = StyledReporter::new(Vec::new());
        reporter.exchange("DIR INF", "00I").unwrap();
        let text = String::from_utf8(reporter.out).unwrap();
        assert!(text.contains("SentCmd: "));
        assert!(text.contains("DIR INF"));
        assert!(text.contains("00I"));
        assert!(text.ends_with('\n'));
    }
}
