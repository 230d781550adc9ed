use std::io::{self, BufRead, Write};

/// Modal alert/confirmation surface used by the trackers.
pub trait Prompt {
    fn alert(&self, title: &str, message: &str);

    fn confirm(&self, title: &str, message: &str) -> bool;
}

/// Alerts go to stderr; confirmations read a `y`/`yes` answer from stdin.
pub struct TerminalPrompt {
    assume_yes: bool,
}

impl TerminalPrompt {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl Prompt for TerminalPrompt {
    fn alert(&self, title: &str, message: &str) {
        eprintln!("{title}: {message}");
    }

    fn confirm(&self, title: &str, message: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        eprint!("{title}: {message} [y/N] ");
        let _ = io::stderr().flush();
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read confirmation");
                false
            }
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
pub use scripted::ScriptedPrompt;
