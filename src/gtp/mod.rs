//! Go Text Protocol plumbing.
//!
//! - `protocol`: command lines and response framing
//! - `transport`: the [`GtpTransport`] trait and capability flags
//! - `process`: subprocess engine implementation

pub mod process;
pub mod protocol;
pub mod transport;

pub use process::EngineProcess;
pub use protocol::{parse_genmove, Command, Response};
pub use transport::{Capabilities, GtpTransport};
