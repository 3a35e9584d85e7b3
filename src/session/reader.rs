//! Timeout-bounded token reading.
//!
//! Prompts are the only framing mechanism the shell stream offers, so every
//! read accumulates chunks until one of a set of trigger substrings appears
//! in the growing buffer. The deadline applies per chunk: data arriving
//! restarts the wait, silence for a full deadline ends the read.

use std::time::Duration;

use log::trace;
use tokio::sync::mpsc::Receiver;
use tokio::time::timeout;

/// Why a read ended without matching a trigger.
///
/// Both carry the partial buffer accumulated so far. `Closed` is distinct
/// from `TimedOut`: the remote side ended the stream, which some call sites
/// tolerate (final read after a command that closes the channel).
#[derive(Debug)]
pub(crate) enum ReadError {
    TimedOut { partial: String },
    Closed { partial: String },
}

/// Reads chunks until the buffer contains any of the trigger substrings,
/// then returns the buffer up to and including that point.
///
/// Triggers must be non-empty; any one of them ending the read is
/// sufficient and no ordering among them is implied.
pub(crate) async fn read_until(
    rx: &mut Receiver<String>,
    deadline: Duration,
    triggers: &[&str],
) -> Result<String, ReadError> {
    debug_assert!(
        !triggers.is_empty() && triggers.iter().all(|t| !t.is_empty()),
        "read triggers must be non-empty"
    );

    let mut buffer = String::new();
    loop {
        match timeout(deadline, rx.recv()).await {
            Err(_) => return Err(ReadError::TimedOut { partial: buffer }),
            Ok(None) => return Err(ReadError::Closed { partial: buffer }),
            Ok(Some(chunk)) => {
                trace!("read chunk: {chunk:?}");
                buffer.push_str(&chunk);
                if triggers.iter().any(|t| buffer.contains(t)) {
                    return Ok(buffer);
                }
            }
        }
    }
}
