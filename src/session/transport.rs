//! Login-and-shell transports behind one byte stream seam.
//!
//! Every transport yields a [`ShellStream`]: a paired outbound/inbound
//! channel pumped by an internal I/O task. The session layer only ever
//! talks to the channels, so the same handshake and command code runs
//! against a spawned `ssh` process, an in-process SSH session, or a
//! scripted replay.

use std::borrow::Cow;
use std::io::{ErrorKind, Read, Write};
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use portable_pty::{ChildKiller, CommandBuilder, PtySize, native_pty_system};
use russh::client::{self, Handle};
use russh::keys::PublicKey;
use russh::{ChannelMsg, Disconnect, Preferred};
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::config::{self, DeviceTarget};
use crate::error::RebootError;

use super::script::ScriptBook;

/// How the underlying transport is torn down when the stream closes.
enum Shutdown {
    /// Nothing beyond the channels to release.
    None,
    /// Kill the spawned ssh client process.
    Child(Box<dyn ChildKiller + Send + Sync>),
    /// Disconnect the in-process SSH session.
    Ssh(Handle<AcceptAllHostKeys>),
}

/// One open interactive session: an outbound line channel, an inbound
/// chunk channel, and the teardown handle for whatever is behind them.
pub struct ShellStream {
    sender: Sender<String>,
    receiver: Receiver<String>,
    shutdown: Shutdown,
    closed: bool,
}

impl ShellStream {
    fn new(sender: Sender<String>, receiver: Receiver<String>, shutdown: Shutdown) -> Self {
        Self {
            sender,
            receiver,
            shutdown,
            closed: false,
        }
    }

    /// A stream over bare channels with no transport behind it.
    pub(crate) fn from_parts(sender: Sender<String>, receiver: Receiver<String>) -> Self {
        Self::new(sender, receiver, Shutdown::None)
    }

    /// Sends one line, appending the newline the remote shell expects.
    pub async fn send_line(&self, line: &str) -> Result<(), RebootError> {
        self.sender.send(format!("{line}\n")).await?;
        Ok(())
    }

    pub(crate) fn chunks_mut(&mut self) -> &mut Receiver<String> {
        &mut self.receiver
    }

    /// Closes the stream: best-effort polite exit, then transport teardown.
    ///
    /// Safe to call multiple times; only the first call does anything, and
    /// no failure during teardown escapes.
    pub async fn close(&mut self, exit_command: &str) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.receiver.close();
        if self.sender.send(format!("{exit_command}\n")).await.is_err() {
            debug!("exit command not deliverable, stream already down");
        }
        // Give the remote shell a moment to process the exit.
        tokio::time::sleep(Duration::from_millis(100)).await;
        match mem::replace(&mut self.shutdown, Shutdown::None) {
            Shutdown::None => {}
            Shutdown::Child(mut killer) => {
                if let Err(err) = killer.kill() {
                    debug!("failed to kill ssh process: {err}");
                }
            }
            Shutdown::Ssh(handle) => {
                if let Err(err) = handle.disconnect(Disconnect::ByApplication, "", "en").await {
                    debug!("ssh disconnect error: {err:?}");
                }
            }
        }
    }
}

/// Which transport opens device sessions.
#[derive(Debug, Clone)]
pub enum TransportKind {
    /// Spawn the local `ssh` client under a pseudo-terminal.
    ///
    /// Password prompts and host key questions arrive in-band on the PTY,
    /// which is what the login handshake models. This is the default.
    System,
    /// In-process SSH via russh with none-authentication.
    ///
    /// For devices whose whole login dialogue runs inside the shell. Host
    /// keys are accepted without prompting on this transport.
    Ssh,
    /// Replay canned scripts instead of reaching the network.
    Scripted(ScriptBook),
}

impl TransportKind {
    /// Opens a session to `target` as `username`.
    ///
    /// `connect_timeout` bounds transport establishment for the in-process
    /// SSH variant; the system variant reports connection problems in-band
    /// through the spawned client's output instead.
    pub async fn open(
        &self,
        target: &DeviceTarget,
        username: &str,
        connect_timeout: Duration,
    ) -> Result<ShellStream, RebootError> {
        match self {
            TransportKind::System => open_system(target, username),
            TransportKind::Ssh => open_russh(target, username, connect_timeout).await,
            TransportKind::Scripted(book) => book.open(&target.host),
        }
    }
}

/// Spawns `ssh -p <port> <user>@<host>` under a PTY and pumps it.
fn open_system(target: &DeviceTarget, username: &str) -> Result<ShellStream, RebootError> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows: 24,
            cols: 80,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|err| RebootError::Transport(err.to_string()))?;

    let mut command = CommandBuilder::new("ssh");
    command.arg("-p");
    command.arg(target.port.to_string());
    command.arg(format!("{username}@{}", target.host));

    let mut child = pair
        .slave
        .spawn_command(command)
        .map_err(|err| RebootError::Transport(err.to_string()))?;
    let killer = child.clone_killer();
    debug!("{target} spawned ssh client under pty");

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(256);
    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(256);

    let mut reader = pair
        .master
        .try_clone_reader()
        .map_err(|err| RebootError::Transport(err.to_string()))?;
    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                    if inbound_tx.blocking_send(chunk).is_err() {
                        break;
                    }
                }
                Err(ref err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(ref err) if err.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(5));
                    continue;
                }
                Err(_) => break,
            }
        }
    });

    let mut writer = pair
        .master
        .take_writer()
        .map_err(|err| RebootError::Transport(err.to_string()))?;
    tokio::task::spawn_blocking(move || {
        while let Some(data) = outbound_rx.blocking_recv() {
            if writer.write_all(data.as_bytes()).is_err() {
                break;
            }
            let _ = writer.flush();
        }
    });

    // Reap the child so it cannot linger as a zombie after exit or kill.
    tokio::task::spawn_blocking(move || {
        let _ = child.wait();
    });

    Ok(ShellStream::new(
        outbound_tx,
        inbound_rx,
        Shutdown::Child(killer),
    ))
}

/// Connects with russh, opens a shell channel, and pumps it.
async fn open_russh(
    target: &DeviceTarget,
    username: &str,
    connect_timeout: Duration,
) -> Result<ShellStream, RebootError> {
    let ssh_config = Arc::new(client::Config {
        inactivity_timeout: Some(Duration::from_secs(60)),
        preferred: compat_preferred(),
        ..Default::default()
    });

    let mut session = tokio::time::timeout(
        connect_timeout,
        client::connect(
            ssh_config,
            (target.host.as_str(), target.port),
            AcceptAllHostKeys,
        ),
    )
    .await
    .map_err(|_| RebootError::ConnectTimeout(connect_timeout.as_secs()))??;
    debug!("{target} transport established");

    let auth = session.authenticate_none(username).await?;
    if !auth.success() {
        return Err(RebootError::Transport(
            "server refused session-layer login; use the system transport for password prompts"
                .to_string(),
        ));
    }

    let mut channel = session.channel_open_session().await?;
    channel.request_pty(false, "xterm", 800, 600, 0, 0, &[]).await?;
    channel.request_shell(false).await?;
    debug!("{target} shell request successful");

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(256);
    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(256);

    let io_addr = target.to_string();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(data) = outbound_rx.recv() => {
                    if let Err(err) = channel.data(data.as_bytes()).await {
                        debug!("{io_addr} failed to send data to shell: {err:?}");
                        break;
                    }
                },
                Some(msg) = channel.wait() => {
                    match msg {
                        ChannelMsg::Data { ref data } => {
                            if let Ok(text) = std::str::from_utf8(data)
                                && inbound_tx.send(text.to_string()).await.is_err() {
                                    debug!("{io_addr} shell output receiver dropped");
                                    break;
                                }
                        }
                        ChannelMsg::ExitStatus { exit_status } => {
                            debug!("{io_addr} shell exited with status {exit_status}");
                            let _ = channel.eof().await;
                            break;
                        }
                        ChannelMsg::Eof => {
                            debug!("{io_addr} shell sent eof");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }
        debug!("{io_addr} session io task ended");
    });

    Ok(ShellStream::new(
        outbound_tx,
        inbound_rx,
        Shutdown::Ssh(session),
    ))
}

/// Accepts any server host key.
///
/// Used only by the in-process transport, which targets devices whose keys
/// churn on every factory reset.
#[derive(Debug, Clone)]
pub struct AcceptAllHostKeys;

impl client::Handler for AcceptAllHostKeys {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Permissive algorithm preferences for aged embedded SSH servers.
fn compat_preferred() -> Preferred {
    Preferred {
        kex: Cow::Borrowed(config::COMPAT_KEX_ORDER),
        key: Cow::Borrowed(config::COMPAT_KEY_TYPES),
        cipher: Cow::Borrowed(config::COMPAT_CIPHERS),
        mac: Cow::Borrowed(config::COMPAT_MAC_ALGORITHMS),
        compression: Cow::Borrowed(config::COMPAT_COMPRESSION_ALGORITHMS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_line_appends_newline() {
        let (outbound_tx, mut sent) = mpsc::channel(8);
        let (_inbound_tx, inbound_rx) = mpsc::channel::<String>(8);
        let stream = ShellStream::from_parts(outbound_tx, inbound_rx);
        stream.send_line("get uptime").await.expect("send line");
        assert_eq!(sent.recv().await, Some("get uptime\n".to_string()));
    }

    #[tokio::test]
    async fn close_sends_one_exit_and_is_idempotent() {
        let (outbound_tx, mut sent) = mpsc::channel(8);
        let (_inbound_tx, inbound_rx) = mpsc::channel::<String>(8);
        let mut stream = ShellStream::from_parts(outbound_tx, inbound_rx);
        stream.close("exit").await;
        stream.close("exit").await;
        assert_eq!(sent.recv().await, Some("exit\n".to_string()));
        assert!(sent.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_survives_a_dead_peer() {
        let (outbound_tx, sent) = mpsc::channel::<String>(8);
        let (_inbound_tx, inbound_rx) = mpsc::channel::<String>(8);
        drop(sent);
        let mut stream = ShellStream::from_parts(outbound_tx, inbound_rx);
        // Both calls must return without error even though nothing listens.
        stream.close("exit").await;
        stream.close("exit").await;
    }

    #[test]
    fn compat_preferences_cover_legacy_kex_and_keys() {
        let preferred = compat_preferred();
        assert!(preferred.kex.contains(&russh::kex::DH_G1_SHA1));
        assert!(
            preferred
                .key
                .contains(&russh::keys::Algorithm::Dsa)
        );
    }
}
