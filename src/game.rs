//! Position model consumed by the synchronizer.
//!
//! Moves are stored in application order. Vertices use GTP notation: column
//! letters `A..Z` without `I`, rows counted from 1 at the bottom.

use crate::error::{Result, SyncError};
use std::fmt;
use std::str::FromStr;

/// Largest board GTP vertices can address.
pub const MAX_BOARD_SIZE: usize = 25;

const COLUMNS: &[u8] = b"ABCDEFGHJKLMNOPQRSTUVWXYZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Black,
    White,
}

impl Color {
    pub fn other(self) -> Self {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    /// Lower-case form used as a GTP argument.
    pub fn as_gtp(self) -> &'static str {
        match self {
            Color::Black => "b",
            Color::White => "w",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Black => write!(f, "B"),
            Color::White => write!(f, "W"),
        }
    }
}

impl FromStr for Color {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "b" | "black" => Ok(Color::Black),
            "w" | "white" => Ok(Color::White),
            _ => Err(SyncError::InvalidMove(format!("unknown color `{}`", s))),
        }
    }
}

/// A board intersection, 0-based with row 0 at the bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub col: u8,
    pub row: u8,
}

impl Point {
    pub fn new(col: u8, row: u8) -> Self {
        Self { col, row }
    }

    pub fn is_on_board(&self, size: usize) -> bool {
        (self.col as usize) < size && (self.row as usize) < size
    }

    /// Parse a GTP vertex such as `D4` or `q16` for a board of `size`.
    pub fn parse(text: &str, size: usize) -> Result<Self> {
        let invalid = || SyncError::InvalidMove(format!("bad vertex `{}` for size {}", text, size));

        let upper = text.trim().to_ascii_uppercase();
        let mut chars = upper.chars();
        let letter = chars.next().ok_or_else(invalid)?;
        let col = COLUMNS
            .iter()
            .position(|&c| c as char == letter)
            .ok_or_else(invalid)?;
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let row: usize = digits.parse().map_err(|_| invalid())?;

        if col >= size || row == 0 || row > size {
            return Err(invalid());
        }

        Ok(Self::new(col as u8, (row - 1) as u8))
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match COLUMNS.get(self.col as usize) {
            Some(&letter) => write!(f, "{}{}", letter as char, self.row as usize + 1),
            None => write!(f, "?{}", self.row as usize + 1),
        }
    }
}

/// A stone placement or a pass (`point == None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move {
    pub color: Color,
    pub point: Option<Point>,
}

impl Move {
    pub fn play(color: Color, point: Point) -> Self {
        Self {
            color,
            point: Some(point),
        }
    }

    pub fn pass(color: Color) -> Self {
        Self { color, point: None }
    }

    /// Parse `B D4`, `w pass` or the compact `B:D4` form.
    pub fn parse(text: &str, size: usize) -> Result<Self> {
        let (color, vertex) = text
            .trim()
            .split_once(|c: char| c == ':' || c.is_whitespace())
            .ok_or_else(|| {
                SyncError::InvalidMove(format!("expected `<color> <vertex>`, got `{}`", text))
            })?;
        let color: Color = color.parse()?;
        let vertex = vertex.trim();

        if vertex.eq_ignore_ascii_case("pass") {
            Ok(Self::pass(color))
        } else {
            Ok(Self::play(color, Point::parse(vertex, size)?))
        }
    }

    /// Arguments of a GTP `play` command, e.g. `b D4`.
    pub fn to_gtp(&self) -> String {
        format!("{} {}", self.color.as_gtp(), self.vertex())
    }

    fn vertex(&self) -> String {
        match self.point {
            Some(p) => p.to_string(),
            None => "pass".to_string(),
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.color, self.vertex())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Komi(pub f64);

impl fmt::Display for Komi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-only view of the authoritative game state.
pub trait PositionSource {
    fn size(&self) -> usize;

    fn move_count(&self) -> usize;

    fn move_at(&self, index: usize) -> Move;

    fn komi(&self) -> Option<Komi> {
        None
    }

    /// Snapshot of every move, read once per synchronization.
    fn moves(&self) -> Vec<Move> {
        (0..self.move_count()).map(|i| self.move_at(i)).collect()
    }
}

/// Owned position: board size, optional komi and the moves played so far.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    size: usize,
    komi: Option<Komi>,
    moves: Vec<Move>,
}

impl Position {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            komi: None,
            moves: Vec::new(),
        }
    }

    pub fn with_komi(mut self, komi: Komi) -> Self {
        self.komi = Some(komi);
        self
    }

    pub fn with_moves(mut self, moves: impl IntoIterator<Item = Move>) -> Self {
        self.moves.extend(moves);
        self
    }

    /// Build a position from move texts such as `["B:D4", "W:Q16"]`.
    pub fn from_texts<S: AsRef<str>>(size: usize, texts: &[S]) -> Result<Self> {
        if size == 0 || size > MAX_BOARD_SIZE {
            return Err(SyncError::InvalidMove(format!(
                "board size {} out of range 1..={}",
                size, MAX_BOARD_SIZE
            )));
        }
        let moves = texts
            .iter()
            .map(|t| Move::parse(t.as_ref(), size))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(size).with_moves(moves))
    }

    pub fn play(&mut self, mv: Move) {
        self.moves.push(mv);
    }

    pub fn undo(&mut self) -> Option<Move> {
        self.moves.pop()
    }

    pub fn truncate(&mut self, len: usize) {
        self.moves.truncate(len);
    }

    pub fn set_komi(&mut self, komi: Option<Komi>) {
        self.komi = komi;
    }

    pub fn as_slice(&self) -> &[Move] {
        &self.moves
    }
}

impl PositionSource for Position {
    fn size(&self) -> usize {
        self.size
    }

    fn move_count(&self) -> usize {
        self.moves.len()
    }

    fn move_at(&self, index: usize) -> Move {
        self.moves[index]
    }

    fn komi(&self) -> Option<Komi> {
        self.komi
    }

    fn moves(&self) -> Vec<Move> {
        self.moves.clone()
    }
}
