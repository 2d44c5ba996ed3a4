use std::time::Duration;

use log::{debug, trace};

use crate::config::{Credentials, DeviceTarget, Timeouts};
use crate::error::RebootError;
use crate::matcher::{MatchEvent, PromptMatcher, scrub_output};
use crate::profile::DeviceProfile;

use super::transport::{ShellStream, TransportKind};
use super::{CommandClass, CommandResult, SessionState};

/// What the device offered first during the login handshake.
enum AuthReply {
    LoginPrompt,
    PasswordPrompt,
    HostKeyConfirm,
}

/// Maps an auth-phase match event onto the prompt kind it represents.
///
/// Both auth pattern lists put the vendor login prompt at index 0 and the
/// two generic password prompts at 1 and 2; only the initial list carries
/// the host key question after those.
fn classify_auth(event: MatchEvent, connect_secs: u64) -> Result<AuthReply, RebootError> {
    match event {
        MatchEvent::Pattern { index: 0, .. } => Ok(AuthReply::LoginPrompt),
        MatchEvent::Pattern { index: 1 | 2, .. } => Ok(AuthReply::PasswordPrompt),
        MatchEvent::Pattern { .. } => Ok(AuthReply::HostKeyConfirm),
        MatchEvent::Eof { .. } => Err(RebootError::ConnectionClosed),
        MatchEvent::TimedOut { .. } => Err(RebootError::ConnectTimeout(connect_secs)),
    }
}

fn clean(text: &str) -> String {
    scrub_output(text).trim().to_string()
}

/// One device's interactive shell session.
///
/// Owns the transport stream, the prompt matcher, and the handshake state
/// for a single device. Created per device, driven to `Authenticated`
/// through [`SessionClient::connect`], used for commands, then dropped;
/// a client is never reused across devices.
pub struct SessionClient {
    target: DeviceTarget,
    credentials: Credentials,
    profile: DeviceProfile,
    timeouts: Timeouts,
    stream: Option<ShellStream>,
    matcher: PromptMatcher,
    state: SessionState,
}

impl SessionClient {
    pub fn new(
        target: DeviceTarget,
        credentials: Credentials,
        profile: DeviceProfile,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            target,
            credentials,
            profile,
            timeouts,
            stream: None,
            matcher: PromptMatcher::new(),
            state: SessionState::Unconnected,
        }
    }

    pub fn target(&self) -> &DeviceTarget {
        &self.target
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Authenticated && self.stream.is_some()
    }

    /// Opens the transport and drives the login handshake to a shell
    /// prompt.
    ///
    /// On any failure the session lands in `Failed` with the stream torn
    /// down; the client cannot be connected again.
    pub async fn connect(&mut self, transport: &TransportKind) -> Result<(), RebootError> {
        debug!("[{}] connecting", self.target);
        self.state = SessionState::AwaitingAuthPrompt;
        match transport
            .open(&self.target, &self.credentials.username, self.timeouts.connect)
            .await
        {
            Ok(stream) => self.stream = Some(stream),
            Err(err) => {
                self.state = SessionState::Failed;
                return Err(err);
            }
        }
        match self.handshake().await {
            Ok(()) => {
                self.state = SessionState::Authenticated;
                debug!("[{}] authenticated", self.target);
                Ok(())
            }
            Err(err) => {
                debug!("[{}] handshake failed: {err}", self.target);
                self.state = SessionState::Failed;
                self.disconnect().await;
                Err(err)
            }
        }
    }

    /// The login dialogue: prompt dispatch, credentials, shell prompt.
    ///
    /// Exactly one password line is sent per attempt, whichever prompt
    /// branch was taken.
    async fn handshake(&mut self) -> Result<(), RebootError> {
        let connect_secs = self.timeouts.connect.as_secs();
        let stream = self.stream.as_mut().ok_or(RebootError::NotConnected)?;

        let initial = [
            self.profile.login_prompt.as_str(),
            self.profile.password_prompt.as_str(),
            self.profile.password_prompt_caps.as_str(),
            self.profile.host_key_prompt.as_str(),
        ];
        let event = self
            .matcher
            .expect(stream.chunks_mut(), &initial, self.timeouts.connect)
            .await;
        let vendor_login = match classify_auth(event, connect_secs)? {
            AuthReply::LoginPrompt => true,
            AuthReply::PasswordPrompt => false,
            AuthReply::HostKeyConfirm => {
                debug!("[{}] confirming host key", self.target);
                stream.send_line("yes").await?;
                // The retry list omits the host key question; it cannot
                // recur within one attempt.
                let retry = [
                    self.profile.login_prompt.as_str(),
                    self.profile.password_prompt.as_str(),
                    self.profile.password_prompt_caps.as_str(),
                ];
                let event = self
                    .matcher
                    .expect(stream.chunks_mut(), &retry, self.timeouts.connect)
                    .await;
                matches!(classify_auth(event, connect_secs)?, AuthReply::LoginPrompt)
            }
        };

        if vendor_login {
            debug!("[{}] vendor login prompt, sending username", self.target);
            stream.send_line(&self.credentials.username).await?;
            let event = self
                .matcher
                .expect(
                    stream.chunks_mut(),
                    &[self.profile.login_password_prompt.as_str()],
                    self.timeouts.connect,
                )
                .await;
            match event {
                MatchEvent::Pattern { .. } => {}
                MatchEvent::Eof { .. } => return Err(RebootError::ConnectionClosed),
                MatchEvent::TimedOut { .. } => {
                    return Err(RebootError::ConnectTimeout(connect_secs));
                }
            }
        } else {
            debug!("[{}] password prompt", self.target);
        }
        trace!("[{}] sending password", self.target);
        stream.send_line(&self.credentials.password).await?;

        self.state = SessionState::AwaitingShellPrompt;
        let event = self
            .matcher
            .expect(
                stream.chunks_mut(),
                &[self.profile.shell_prompt.as_str()],
                self.timeouts.shell_prompt,
            )
            .await;
        match event {
            MatchEvent::Pattern { .. } => Ok(()),
            MatchEvent::Eof { .. } => Err(RebootError::ConnectionClosed),
            MatchEvent::TimedOut { .. } => Err(RebootError::ShellPromptTimeout(
                self.timeouts.shell_prompt.as_secs(),
            )),
        }
    }

    /// Sends one command line and classifies its outcome.
    ///
    /// Failures the device itself reports, rejection, disconnect, or
    /// silence, come back as a failed [`CommandResult`]; `Err` is reserved
    /// for contract violations and a dead write side.
    pub async fn execute(
        &mut self,
        command: &str,
        class: CommandClass,
        budget: Duration,
    ) -> Result<CommandResult, RebootError> {
        if self.state != SessionState::Authenticated {
            return Err(RebootError::NotConnected);
        }
        let stream = self.stream.as_mut().ok_or(RebootError::NotConnected)?;
        debug!("[{}] sending command: {command}", self.target);
        stream.send_line(command).await?;

        match class {
            CommandClass::Reboot => {
                let patterns = [
                    self.profile.ack_token.as_str(),
                    self.profile.shell_prompt.as_str(),
                ];
                let event = self.matcher.expect(stream.chunks_mut(), &patterns, budget).await;
                match event {
                    MatchEvent::Pattern { index: 0, .. } => {
                        debug!("[{}] command acknowledged", self.target);
                        Ok(CommandResult::success(self.profile.ack_token.clone()))
                    }
                    MatchEvent::Pattern { before, .. } => {
                        let output = clean(&before);
                        debug!("[{}] command rejected: {output}", self.target);
                        let reason = RebootError::CommandRejected(output.clone());
                        Ok(CommandResult::failure(output, &reason))
                    }
                    // The stream may have dropped because the device went
                    // down for its reboot, but without the acknowledgement
                    // token the outcome is unknown. Treated as failure.
                    MatchEvent::Eof { .. } => Ok(CommandResult::failure(
                        "connection closed",
                        &RebootError::AmbiguousDisconnect,
                    )),
                    MatchEvent::TimedOut { before } => {
                        let partial = clean(&before);
                        Ok(CommandResult::failure(
                            partial.clone(),
                            &RebootError::CommandTimeout(partial),
                        ))
                    }
                }
            }
            CommandClass::Ordinary => {
                let patterns = [self.profile.shell_prompt.as_str()];
                let event = self.matcher.expect(stream.chunks_mut(), &patterns, budget).await;
                match event {
                    MatchEvent::Pattern { before, .. } => {
                        Ok(CommandResult::success(clean(&before)))
                    }
                    MatchEvent::Eof { before } => Ok(CommandResult::failure(
                        clean(&before),
                        &RebootError::ConnectionClosed,
                    )),
                    MatchEvent::TimedOut { before } => {
                        let partial = clean(&before);
                        Ok(CommandResult::failure(
                            partial.clone(),
                            &RebootError::CommandTimeout(partial),
                        ))
                    }
                }
            }
        }
    }

    /// Releases the session, politely when the stream is still alive.
    ///
    /// Safe to call at any point and more than once; only the first call
    /// with a live stream does any work.
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            debug!("[{}] disconnecting", self.target);
            stream.close(&self.profile.exit_command).await;
        }
    }
}
