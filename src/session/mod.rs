//! Interactive shell sessions against access points.
//!
//! This module owns everything between a device address and a classified
//! command outcome: opening the login-and-shell byte stream, driving the
//! vendor authentication handshake, and executing commands with
//! class-specific termination rules.
//!
//! # Main Components
//!
//! - [`SessionClient`] - one device's interactive shell connection
//! - [`SessionState`] - handshake progress, forward-only
//! - [`CommandClass`] / [`CommandResult`] - command classification
//! - [`ShellStream`] / [`TransportKind`] - the byte stream seam and the
//!   transports that provide it
//! - [`ShellScript`] / [`ScriptBook`] - scripted sessions for tests

use serde::{Deserialize, Serialize};

use crate::error::RebootError;

pub use client::SessionClient;
pub use script::{ScriptBook, ScriptStep, SentLog, ShellScript};
pub use transport::{ShellStream, TransportKind};

/// Handshake progress for one session.
///
/// State only moves forward, from `Unconnected` through the two prompt
/// waits to `Authenticated`, or diverts to `Failed`. It never regresses,
/// and `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unconnected,
    AwaitingAuthPrompt,
    AwaitingShellPrompt,
    Authenticated,
    Failed,
}

/// Termination semantics for one command.
///
/// Reboot-class commands are acknowledged with an explicit token before the
/// device drops the session; ordinary commands run to the next shell
/// prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    Reboot,
    Ordinary,
}

/// The outcome of one command invocation. Produced fresh per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub succeeded: bool,
    pub raw_output: String,
    pub failure_reason: Option<String>,
}

impl CommandResult {
    pub fn success(raw_output: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            raw_output: raw_output.into(),
            failure_reason: None,
        }
    }

    /// A failed invocation: `raw_output` keeps whatever the device said,
    /// `reason` explains the classification.
    pub fn failure(raw_output: impl Into<String>, reason: &RebootError) -> Self {
        Self {
            succeeded: false,
            raw_output: raw_output.into(),
            failure_reason: Some(reason.to_string()),
        }
    }
}

mod client;
mod script;
mod transport;
