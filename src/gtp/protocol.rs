//! GTP command formatting and response framing.
//!
//! Wire format: one command per line. A response starts with `=` (success)
//! or `?` (failure), optionally followed by the numeric command id, and is
//! terminated by an empty line.

use crate::error::{Result, SyncError};
use crate::game::{Color, Komi, Move, Point};
use std::collections::HashSet;
use std::fmt;

/// Batch play command understood by GoGui-compatible engines.
pub const GOGUI_PLAY_SEQUENCE: &str = "gogui-play_sequence";

/// Older spelling of the batch play command.
pub const PLAY_SEQUENCE: &str = "play_sequence";

/// Multi-step undo taking a count argument.
pub const GG_UNDO: &str = "gg-undo";

pub const UNDO: &str = "undo";

pub const KOMI: &str = "komi";

/// A single GTP command line (without the trailing newline).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: &'static str,
    pub args: Vec<String>,
}

impl Command {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            args: Vec::new(),
        }
    }

    fn arg(mut self, arg: impl ToString) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn boardsize(size: usize) -> Self {
        Self::new("boardsize").arg(size)
    }

    pub fn clear_board() -> Self {
        Self::new("clear_board")
    }

    pub fn komi(komi: Komi) -> Self {
        Self::new(KOMI).arg(komi)
    }

    pub fn play(mv: &Move) -> Self {
        Self::new("play").arg(mv.to_gtp())
    }

    /// Batch play under the given command name (`gogui-play_sequence` or
    /// `play_sequence`).
    pub fn play_sequence(name: &'static str, moves: &[Move]) -> Self {
        moves
            .iter()
            .fold(Self::new(name), |cmd, mv| cmd.arg(mv.to_gtp()))
    }

    pub fn undo() -> Self {
        Self::new(UNDO)
    }

    pub fn gg_undo(count: usize) -> Self {
        Self::new(GG_UNDO).arg(count)
    }

    pub fn genmove(color: Color) -> Self {
        Self::new("genmove").arg(color.as_gtp())
    }

    pub fn list_commands() -> Self {
        Self::new("list_commands")
    }

    pub fn quit() -> Self {
        Self::new("quit")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// A complete engine response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Success(String),
    Failure(String),
}

impl Response {
    /// Convert into the response text, mapping `?` answers to
    /// [`SyncError::Command`].
    pub fn into_result(self, command: &str) -> Result<String> {
        match self {
            Response::Success(text) => Ok(text),
            Response::Failure(message) => Err(SyncError::Command {
                command: command.to_string(),
                message,
            }),
        }
    }
}

/// Whether a raw line is noise preceding a response (blank or comment).
pub fn is_preamble(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.starts_with('#')
}

/// Parse the lines of one response block, without the terminating empty line.
pub fn parse_response(lines: &[String]) -> Result<Response> {
    let first = lines
        .first()
        .ok_or_else(|| SyncError::Protocol("empty response".to_string()))?;
    let first = first.trim_end_matches('\r');

    let (success, rest) = match first.chars().next() {
        Some('=') => (true, &first[1..]),
        Some('?') => (false, &first[1..]),
        _ => {
            return Err(SyncError::Protocol(format!(
                "response must start with `=` or `?`, got `{}`",
                first
            )))
        }
    };

    // Optional command id directly after the status character.
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());

    let mut text = rest.trim().to_string();
    for line in &lines[1..] {
        text.push('\n');
        text.push_str(line.trim_end_matches('\r'));
    }
    let text = text.trim().to_string();

    Ok(if success {
        Response::Success(text)
    } else {
        Response::Failure(text)
    })
}

/// Command names from a `list_commands` response.
pub fn parse_list_commands(text: &str) -> HashSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a `genmove` answer for `color`. `None` means the engine resigned.
pub fn parse_genmove(text: &str, color: Color, size: usize) -> Result<Option<Move>> {
    let vertex = text.trim();
    if vertex.eq_ignore_ascii_case("resign") {
        Ok(None)
    } else if vertex.eq_ignore_ascii_case("pass") {
        Ok(Some(Move::pass(color)))
    } else {
        Ok(Some(Move::play(color, Point::parse(vertex, size)?)))
    }
}
