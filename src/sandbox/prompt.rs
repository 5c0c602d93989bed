/// Interactive operator decisions during sandbox resolution
use crate::config::types::CONFIRMATION_TOKEN;
use std::io::{BufRead, Write};

/// What the operator wants after the isolation primitive came up missing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackChoice {
    Retry,
    ProceedUnsandboxed,
    Abort,
}

pub trait DecisionPrompt {
    fn choose_fallback(&mut self, reason: &str) -> FallbackChoice;

    /// The raw line the operator typed; `None` on EOF.
    fn confirm_unsandboxed(&mut self) -> Option<String>;
}

/// Line-oriented prompt over any reader/writer pair (stdin/stderr in the CLI).
pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

impl<R: BufRead, W: Write> DecisionPrompt for TerminalPrompt<R, W> {
    fn choose_fallback(&mut self, reason: &str) -> FallbackChoice {
        let _ = writeln!(self.output, "Sandbox unavailable: {}", reason);
        loop {
            let _ = write!(
                self.output,
                "[r]etry detection, proceed [u]nsandboxed, or [a]bort? "
            );
            let _ = self.output.flush();

            let Some(line) = self.read_line() else {
                return FallbackChoice::Abort;
            };
            match line.trim().to_ascii_lowercase().as_str() {
                "r" | "retry" => return FallbackChoice::Retry,
                "u" | "unsandboxed" => return FallbackChoice::ProceedUnsandboxed,
                "a" | "abort" => return FallbackChoice::Abort,
                other => {
                    let _ = writeln!(self.output, "Unrecognized choice '{}'", other);
                }
            }
        }
    }

    fn confirm_unsandboxed(&mut self) -> Option<String> {
        let _ = writeln!(
            self.output,
            "WARNING: untrusted code will run directly on this host with your privileges."
        );
        let _ = write!(
            self.output,
            "Type '{}' to continue: ",
            CONFIRMATION_TOKEN
        );
        let _ = self.output.flush();
        self.read_line()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_choices_parsed() {
        let mut prompt = TerminalPrompt::new(Cursor::new("x\nU\n"), Vec::new());
        assert_eq!(prompt.choose_fallback("missing"), FallbackChoice::ProceedUnsandboxed);
        let shown = String::from_utf8(prompt.output).unwrap();
        assert!(shown.contains("Unrecognized choice 'x'"));
    }

    #[test]
    fn test_eof_aborts() {
        let mut prompt = TerminalPrompt::new(Cursor::new(""), Vec::new());
        assert_eq!(prompt.choose_fallback("missing"), FallbackChoice::Abort);
        assert_eq!(prompt.confirm_unsandboxed(), None);
    }

    #[test]
    fn test_confirmation_line_returned_verbatim() {
        let mut prompt = TerminalPrompt::new(Cursor::new("I UNDERSTAND THE RISKS\r\n"), Vec::new());
        assert_eq!(prompt.confirm_unsandboxed().as_deref(), Some(CONFIRMATION_TOKEN));
    }
}
