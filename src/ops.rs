//! Device operations built on top of an authenticated session.
//!
//! # Main Components
//!
//! - [`initiate_reboot`] - issue the profile's reboot command
//! - [`gather_info`] - collect the profile's diagnostic fields

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::error::RebootError;
use crate::session::{CommandClass, CommandResult, SessionClient};

/// Placeholder recorded for a diagnostic field whose command failed.
pub const NOT_AVAILABLE: &str = "Not available";

/// Issues the profile's reboot command with the extended acknowledgement
/// budget.
///
/// Exactly one command is sent. Devices act on the first reboot-family
/// command they accept, so retrying alternative spellings against a device
/// that may already be going down is never safe.
pub async fn initiate_reboot(client: &mut SessionClient) -> Result<CommandResult, RebootError> {
    let command = client.profile().reboot_command.clone();
    let budget = client.timeouts().reboot;
    debug!("[{}] initiating reboot", client.target());
    client.execute(&command, CommandClass::Reboot, budget).await
}

/// Collects the profile's diagnostic fields over ordinary commands.
///
/// Every configured field gets an entry: a field whose command failed is
/// recorded as [`NOT_AVAILABLE`] instead of being dropped, so consumers
/// can rely on the shape of the map.
pub async fn gather_info(client: &mut SessionClient) -> BTreeMap<String, String> {
    let fields = client.profile().info_fields.clone();
    let ack_token = client.profile().ack_token.clone();
    let budget = client.timeouts().command;

    let mut info = BTreeMap::new();
    for field in fields {
        let value = match client
            .execute(&field.command, CommandClass::Ordinary, budget)
            .await
        {
            Ok(result) if result.succeeded => field.rule.apply(&result.raw_output, &ack_token),
            Ok(result) => {
                warn!(
                    "[{}] '{}' failed: {}",
                    client.target(),
                    field.command,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
                NOT_AVAILABLE.to_string()
            }
            Err(err) => {
                warn!("[{}] '{}' failed: {err}", client.target(), field.command);
                NOT_AVAILABLE.to_string()
            }
        };
        info.insert(field.name, value);
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Credentials, DeviceTarget, Timeouts};
    use crate::profile::DeviceProfile;
    use crate::session::{ScriptBook, ScriptStep, ShellScript, TransportKind};
    use std::time::Duration;

    fn emit(data: &str) -> ScriptStep {
        ScriptStep::Emit {
            data: data.to_string(),
        }
    }

    fn await_line(line: &str) -> ScriptStep {
        ScriptStep::AwaitLine {
            line: line.to_string(),
        }
    }

    async fn connected_client(host: &str, mut dialogue: Vec<ScriptStep>) -> (SessionClient, ScriptBook) {
        let mut steps = vec![
            emit("password: "),
            await_line("sp-admin"),
            emit("\r\nrkscli: "),
        ];
        steps.append(&mut dialogue);
        let book = ScriptBook::new();
        book.insert(host, ShellScript::new(steps));
        let transport = TransportKind::Scripted(book.clone());
        let timeouts = Timeouts {
            connect: Duration::from_millis(400),
            shell_prompt: Duration::from_millis(300),
            command: Duration::from_millis(150),
            reboot: Duration::from_millis(400),
            pacing: Duration::from_millis(1),
        };
        let mut client = SessionClient::new(
            DeviceTarget::new(host, 22),
            Credentials::new("admin", "sp-admin"),
            DeviceProfile::ruckus(),
            timeouts,
        );
        client.connect(&transport).await.expect("connect");
        (client, book)
    }

    #[tokio::test]
    async fn reboot_sends_the_single_canonical_command() {
        let (mut client, book) =
            connected_client("10.0.3.1", vec![await_line("reboot"), emit("OK\r\n")]).await;
        let result = initiate_reboot(&mut client).await.expect("reboot");
        assert!(result.succeeded);
        assert_eq!(book.sent_lines("10.0.3.1"), ["sp-admin", "reboot"]);
    }

    #[tokio::test]
    async fn info_fields_are_extracted_per_rule() {
        let dialogue = vec![
            await_line("get device-name"),
            emit("get device-name\r\nDevice Name: lobby-ap-3\r\nOK\r\n\r\nrkscli: "),
            await_line("get uptime"),
            emit("get uptime\r\nUptime: 12 days 3 hours\r\nOK\r\n\r\nrkscli: "),
            await_line("get version"),
            emit("get version\r\nVersion: 9.8.3.0.19\r\nOK\r\n\r\nrkscli: "),
            await_line("get system-info"),
            emit("get system-info\r\nSerial# 501234567890\r\nModel: ZF7363\r\nOK\r\n\r\nrkscli: "),
        ];
        let (mut client, _book) = connected_client("10.0.3.2", dialogue).await;
        let info = gather_info(&mut client).await;
        assert_eq!(info["hostname"], "lobby-ap-3");
        assert_eq!(info["uptime"], "12 days 3 hours");
        assert_eq!(info["version"], "9.8.3.0.19");
        assert_eq!(
            info["system"],
            "get system-info\nSerial# 501234567890\nModel: ZF7363\nOK"
        );
    }

    #[tokio::test]
    async fn failed_fields_are_recorded_not_dropped() {
        // Only the first field answers; the script then goes quiet.
        let dialogue = vec![
            await_line("get device-name"),
            emit("get device-name\r\nDevice Name: lobby-ap-3\r\nOK\r\n\r\nrkscli: "),
        ];
        let (mut client, _book) = connected_client("10.0.3.3", dialogue).await;
        let info = gather_info(&mut client).await;
        assert_eq!(info["hostname"], "lobby-ap-3");
        assert_eq!(info["uptime"], NOT_AVAILABLE);
        assert_eq!(info["version"], NOT_AVAILABLE);
        assert_eq!(info["system"], NOT_AVAILABLE);
        assert_eq!(info.len(), 4);
    }
}
