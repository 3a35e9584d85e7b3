//! Device sessions over an interactive remote shell.
//!
//! A [`DeviceSession`] composes the pieces of the CLI automation engine:
//! the transport bridge that turns an SSH channel into a duplex text
//! stream, the timeout-bounded token reader, prompt detection and
//! derivation, the operating-mode machine, and the engine itself with the
//! connect / paste / run / persist operations.
//!
//! Sessions are strictly sequential: every write is followed by one read
//! that waits for the prompt framing the command's output. Nothing in a
//! session is shared across tasks.

pub use engine::{DeviceSession, SessionOptions};
pub use modes::Mode;
pub use prompts::PromptSet;
pub use transport::{ShellTransport, TransportSecurity};

mod engine;
mod modes;
mod prompts;
mod reader;
mod transport;
