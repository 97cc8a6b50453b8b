//! Engine transport abstraction.
//!
//! The synchronizer only talks to an engine through [`GtpTransport`]: send a
//! command line, get the response text or an error.

use async_trait::async_trait;

use crate::error::Result;
use crate::gtp::protocol::{GG_UNDO, GOGUI_PLAY_SEQUENCE, KOMI, PLAY_SEQUENCE, UNDO};

bitflags::bitflags! {
    /// Optional commands the engine advertised.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Capabilities: u8 {
        const UNDO = 1 << 0;
        const GG_UNDO = 1 << 1;
        const GOGUI_PLAY_SEQUENCE = 1 << 2;
        const PLAY_SEQUENCE = 1 << 3;
        const KOMI = 1 << 4;
    }
}

impl Capabilities {
    pub fn any_undo(self) -> bool {
        self.intersects(Capabilities::UNDO | Capabilities::GG_UNDO)
    }

    /// Name of the batch play command to use, preferring the GoGui spelling.
    pub fn play_sequence_command(self) -> Option<&'static str> {
        if self.contains(Capabilities::GOGUI_PLAY_SEQUENCE) {
            Some(GOGUI_PLAY_SEQUENCE)
        } else if self.contains(Capabilities::PLAY_SEQUENCE) {
            Some(PLAY_SEQUENCE)
        } else {
            None
        }
    }
}

#[async_trait]
pub trait GtpTransport: Send {
    /// Send one command line and wait for its response text.
    async fn send(&mut self, command: &str) -> Result<String>;

    fn is_supported(&self, name: &str) -> bool;

    /// False once the engine process is known to be gone.
    fn is_alive(&self) -> bool {
        true
    }

    fn capabilities(&self) -> Capabilities {
        [
            (UNDO, Capabilities::UNDO),
            (GG_UNDO, Capabilities::GG_UNDO),
            (GOGUI_PLAY_SEQUENCE, Capabilities::GOGUI_PLAY_SEQUENCE),
            (PLAY_SEQUENCE, Capabilities::PLAY_SEQUENCE),
            (KOMI, Capabilities::KOMI),
        ]
        .into_iter()
        .filter(|(name, _)| self.is_supported(name))
        .fold(Capabilities::empty(), |acc, (_, flag)| acc | flag)
    }
}
