//! Error types for SSH sessions and fleet execution.
//!
//! This module defines all errors that can occur while driving a device's
//! command line over SSH: transport setup, prompt detection, privilege
//! escalation, configuration paste and commit, plus the inventory errors
//! that abort a run before any worker starts.

use thiserror::Error;
use tokio::sync::mpsc::error::SendError;

/// Errors that can occur during a device session or fleet run.
#[derive(Error, Debug)]
pub enum SessionError {
    /// No bytes arrived within the read deadline.
    ///
    /// The transport is forcibly closed when this is raised; any write after
    /// that point fails with a transport error. The partial buffer read so
    /// far is attached for diagnostics.
    #[error("read timed out waiting for {waiting_for:?}")]
    Timeout {
        waiting_for: String,
        partial: String,
    },

    /// The shell stream ended before a trigger was found.
    ///
    /// Distinct from [`SessionError::Timeout`]: the remote side closed the
    /// channel. Call sites that expect the channel to close (final read
    /// after an exit command) tolerate this explicitly.
    #[error("channel closed while waiting for {waiting_for:?}")]
    ChannelClosed {
        waiting_for: String,
        partial: String,
    },

    /// The initial output did not match the family's prompt detection
    /// pattern. Fatal for the session.
    #[error("cant detect prompt, seen: {seen:?}")]
    PromptDetect { seen: String },

    /// The privilege escalation dialog did not complete.
    #[error("privilege escalation failed: {0}")]
    LoginFailure(String),

    /// A pasted configuration line was rejected by the device.
    ///
    /// The paste is aborted but the session stays usable for inspection.
    #[error("invalid configuration statement: {line:?}")]
    ConfigError { line: String, output: String },

    /// A commit did not produce the expected success phrase.
    ///
    /// For rollback-capable families `rollback_ok` records whether the
    /// rollback that was attempted afterwards succeeded; families without
    /// rollback leave it unset.
    #[error("commit failed: {reason} (rollback_ok: {rollback_ok:?})")]
    CommitFailed {
        reason: String,
        rollback_ok: Option<bool>,
    },

    /// The inventory names a device family this crate does not support.
    #[error("unknown device family: {0:?}")]
    UnknownFamily(String),

    /// The host inventory document could not be decoded.
    #[error("invalid inventory: {0}")]
    Inventory(#[from] serde_yaml::Error),

    /// An error occurred in the async-ssh2-tokio library.
    #[error("ssh error: {0}")]
    Ssh(#[from] async_ssh2_tokio::Error),

    /// An error occurred in the russh library.
    #[error("russh error: {0}")]
    Russh(#[from] russh::Error),

    /// Failed to send data to the shell I/O task.
    #[error("cant write to the ssh connection: {0}")]
    Send(#[from] SendError<String>),

    /// Reading a payload file from disk failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A state the session machinery should never reach.
    #[error("internal error: {0}")]
    Internal(String),
}
