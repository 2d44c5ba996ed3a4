//! Error types for device sessions, command execution, and batch runs.
//!
//! This module defines all errors that can occur while connecting to an
//! access point, driving its interactive shell, and orchestrating a batch.

use thiserror::Error;
use tokio::sync::mpsc::error::SendError;

/// Errors that can occur during device sessions and batch orchestration.
#[derive(Error, Debug)]
pub enum RebootError {
    /// The remote side refused or dropped the connection.
    ///
    /// This covers refused connections, sessions dropped during the login
    /// handshake, and streams that end under an ordinary command.
    #[error("connection refused or closed")]
    ConnectionClosed,

    /// No login prompt arrived within the connect timeout.
    #[error("no login prompt within {0} seconds")]
    ConnectTimeout(u64),

    /// Authentication was accepted but the shell prompt never appeared.
    ///
    /// Distinct from [`RebootError::ConnectTimeout`] so callers can tell a
    /// dead host apart from a shell that is wedged after login.
    #[error("no shell prompt within {0} seconds")]
    ShellPromptTimeout(u64),

    /// Command execution timed out.
    ///
    /// The command did not complete within the configured timeout period.
    /// The error contains the partial output received before the timeout.
    #[error("command timeout: {0}")]
    CommandTimeout(String),

    /// The device returned to its prompt without acknowledging the command.
    ///
    /// The error contains the text the device printed instead of the
    /// acknowledgement token.
    #[error("command rejected: {0}")]
    CommandRejected(String),

    /// The connection dropped while waiting for a command acknowledgement.
    ///
    /// After a reboot command this may simply be the device going down, but
    /// without a positive acknowledgement the outcome is unknown.
    #[error("connection closed")]
    AmbiguousDisconnect,

    /// A command was issued on a session that is not authenticated.
    #[error("not connected")]
    NotConnected,

    /// The inventory file produced no usable device addresses.
    #[error("no valid device addresses in {0}")]
    NoValidAddresses(String),

    /// The operator cancelled the run.
    #[error("cancelled by user")]
    Cancelled,

    /// A scripted session fixture could not be parsed.
    #[error("malformed session script: {0}")]
    InvalidScript(String),

    /// The transport failed outside the SSH protocol itself.
    #[error("transport error: {0}")]
    Transport(String),

    /// An error occurred in the russh library.
    #[error("russh error: {0}")]
    Ssh(#[from] russh::Error),

    /// An I/O error occurred reading local files or streams.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to send data through the session channel.
    #[error("failed to send data: {0}")]
    ChannelSend(#[from] SendError<String>),
}
