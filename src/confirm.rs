//! Operator prompts. Every destructive stage goes through
//! [`ConfirmationGate::confirm`] with a literal token; two-valued questions go
//! through [`ConfirmationGate::ask_yes_no`].

use crate::error::FixError;
use dialoguer::console::{style, Term};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input};
use std::fmt::Display;
use std::io::{self, BufRead, IsTerminal, Stdin, Stdout, Write};

/// How typed input is compared with the expected token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Exact,
    IgnoreAsciiCase,
}

/// Comparison mode is fixed per kind of action, never per call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Destructive,
    Informational,
}

impl ActionKind {
    pub fn match_mode(self) -> MatchMode {
        match self {
            ActionKind::Destructive => MatchMode::Exact,
            ActionKind::Informational => MatchMode::IgnoreAsciiCase,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YesNo {
    Yes,
    No,
}

pub fn token_matches(input: &str, expected: &str, mode: MatchMode) -> bool {
    let input = input.trim();
    match mode {
        MatchMode::Exact => input == expected,
        MatchMode::IgnoreAsciiCase => input.eq_ignore_ascii_case(expected),
    }
}

pub fn parse_yes_no(input: &str) -> Option<YesNo> {
    let mode = ActionKind::Informational.match_mode();
    if token_matches(input, "y", mode) || token_matches(input, "yes", mode) {
        Some(YesNo::Yes)
    } else if token_matches(input, "n", mode) || token_matches(input, "no", mode) {
        Some(YesNo::No)
    } else {
        None
    }
}

/// Reads answers line by line from `input`, or through dialoguer prompts
/// when attached to a terminal.
pub struct ConfirmationGate<I, O> {
    input: I,
    output: O,
    terminal: bool,
}

impl ConfirmationGate<io::StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        let stdin: Stdin = io::stdin();
        let terminal = stdin.is_terminal() && io::stdout().is_terminal();
        Self {
            input: stdin.lock(),
            output: io::stdout(),
            terminal,
        }
    }
}

impl<I: BufRead, O: Write> ConfirmationGate<I, O> {
    pub fn new(input: I, output: O) -> Self {
        Self {
            input,
            output,
            terminal: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn say(&mut self, message: impl Display) -> Result<(), FixError> {
        writeln!(self.output, "{message}")?;
        self.output.flush()?;
        Ok(())
    }

    /// `None` means the input stream is closed.
    fn read_line(&mut self) -> Result<Option<String>, FixError> {
        write!(self.output, "> ")?;
        self.output.flush()?;
        let mut line = String::new();
        let read = self.input.read_line(&mut line)?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }

    /// Blocks until the operator types one line. Only the literal `token`
    /// grants; anything else, including a closed input, denies.
    pub fn confirm(&mut self, token: &str, kind: ActionKind) -> Result<Decision, FixError> {
        let mode = kind.match_mode();
        let hint = match mode {
            MatchMode::Exact => " This is case-sensitive.",
            MatchMode::IgnoreAsciiCase => "",
        };
        self.say(style(format!(
            "Type \"{token}\" to confirm.{hint} Type anything else to cancel."
        ))
        .cyan())?;
        let answer = if self.terminal {
            self.output.flush()?;
            let line = Input::<String>::with_theme(&ColorfulTheme::default())
                .with_prompt("Confirm")
                .allow_empty(true)
                .interact_text_on(&Term::stdout())?;
            Some(line)
        } else {
            self.read_line()?
        };
        let decision = match answer {
            Some(line) if token_matches(&line, token, mode) => Decision::Granted,
            _ => Decision::Denied,
        };
        tracing::debug!(token, ?decision, "confirmation gate");
        Ok(decision)
    }

    /// Re-prompts until the answer is one of y/yes/n/no (any case).
    pub fn ask_yes_no(&mut self, question: &str) -> Result<YesNo, FixError> {
        if self.terminal {
            self.output.flush()?;
            let yes = Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(question)
                .interact_on(&Term::stdout())?;
            return Ok(if yes { YesNo::Yes } else { YesNo::No });
        }
        self.say(format!("{question} (y/n)"))?;
        loop {
            let Some(line) = self.read_line()? else {
                return Ok(YesNo::No);
            };
            match parse_yes_no(&line) {
                Some(answer) => return Ok(answer),
                None => self.say(style("Invalid input. Type in \"y\" or \"n\"").red())?,
            }
        }
    }

    #[cfg(test)]
    pub fn into_output(self) -> O {
        self.output
    }
}
