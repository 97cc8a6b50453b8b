//! gtp-sync: keeps a GTP engine's board consistent with a local game.
//!
//! The [`Synchronizer`] remembers which moves the engine has confirmed and,
//! when the local position changes, sends only the undo and play commands
//! needed to reach it.

pub mod config;
pub mod error;
pub mod game;
pub mod gtp;
pub mod sync;

pub use config::{Config, EngineConfig, SyncOptions};
pub use error::{Result, SyncError};
pub use game::{Color, Komi, Move, Point, Position, PositionSource};
pub use gtp::{Capabilities, EngineProcess, GtpTransport};
pub use sync::Synchronizer;
