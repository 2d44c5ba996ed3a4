//! Predefined device profiles.
//!
//! A profile bundles everything vendor-specific about one family of access
//! points: the login dialogue markers, the shell prompt, the reboot command
//! and its acknowledgement token, and the diagnostic command set with the
//! text-extraction rule for each field. The session and batch layers are
//! profile-agnostic; they read every vendor string from here.

use serde::{Deserialize, Serialize};

/// Built-in profile names supported by this crate.
pub const BUILTIN_PROFILES: &[&str] = &["ruckus"];

/// How one diagnostic field is extracted from raw command output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractRule {
    /// The whole output, trimmed.
    Trimmed,
    /// The rest of the line after the first occurrence of the label.
    AfterLabel(String),
    /// The second output line with the label stripped from it.
    ///
    /// Shells that echo a heading line before the value use this shape.
    SecondLine(String),
    /// The text between the label and the trailing acknowledgement token.
    BetweenLabelAndAck(String),
}

impl ExtractRule {
    /// Applies the rule to `output`.
    ///
    /// A rule whose anchor text is absent falls back to the trimmed whole
    /// output rather than failing; extraction is best-effort cosmetics on
    /// top of a command that already succeeded.
    pub fn apply(&self, output: &str, ack_token: &str) -> String {
        match self {
            ExtractRule::Trimmed => output.trim().to_string(),
            ExtractRule::AfterLabel(label) => match output.find(label.as_str()) {
                Some(pos) => {
                    let rest = &output[pos + label.len()..];
                    let line = rest.lines().next().unwrap_or(rest);
                    line.trim().to_string()
                }
                None => output.trim().to_string(),
            },
            ExtractRule::SecondLine(label) => match output.lines().nth(1) {
                Some(line) => {
                    let stripped = match line.find(label.as_str()) {
                        Some(pos) => &line[pos + label.len()..],
                        None => line,
                    };
                    stripped.trim().to_string()
                }
                None => output.trim().to_string(),
            },
            ExtractRule::BetweenLabelAndAck(label) => match output.find(label.as_str()) {
                Some(pos) => {
                    let rest = &output[pos + label.len()..];
                    let value = match rest.find(ack_token) {
                        Some(end) => &rest[..end],
                        None => rest,
                    };
                    value.trim().to_string()
                }
                None => output.trim().to_string(),
            },
        }
    }
}

/// One diagnostic field: its name, the command that produces it, and the
/// rule that pulls the value out of the raw output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoField {
    pub name: String,
    pub command: String,
    pub rule: ExtractRule,
}

/// Vendor-specific strings and commands for one device family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub name: String,
    pub vendor: String,
    /// Prompt the vendor shell prints when it wants a username in-band.
    pub login_prompt: String,
    /// Secondary password prompt printed after the username is accepted.
    pub login_password_prompt: String,
    /// Generic lowercase password prompt.
    pub password_prompt: String,
    /// Generic capitalized password prompt.
    pub password_prompt_caps: String,
    /// Host key confirmation question from the underlying ssh client.
    pub host_key_prompt: String,
    /// Marker the authenticated shell prints when ready for a command.
    pub shell_prompt: String,
    /// Token acknowledging a privileged command.
    pub ack_token: String,
    /// The single canonical reboot command.
    pub reboot_command: String,
    /// Polite exit command sent on disconnect.
    pub exit_command: String,
    pub info_fields: Vec<InfoField>,
}

impl DeviceProfile {
    /// Profile for Ruckus ZoneFlex access points and their `rkscli` shell.
    pub fn ruckus() -> Self {
        Self {
            name: "ruckus".to_string(),
            vendor: "Ruckus".to_string(),
            login_prompt: "Please login:".to_string(),
            login_password_prompt: "password :".to_string(),
            password_prompt: "password:".to_string(),
            password_prompt_caps: "Password:".to_string(),
            host_key_prompt: "Are you sure you want to continue connecting".to_string(),
            shell_prompt: "rkscli:".to_string(),
            ack_token: "OK".to_string(),
            reboot_command: "reboot".to_string(),
            exit_command: "exit".to_string(),
            info_fields: vec![
                InfoField {
                    name: "hostname".to_string(),
                    command: "get device-name".to_string(),
                    rule: ExtractRule::AfterLabel("Device Name:".to_string()),
                },
                InfoField {
                    name: "uptime".to_string(),
                    command: "get uptime".to_string(),
                    rule: ExtractRule::BetweenLabelAndAck("Uptime:".to_string()),
                },
                InfoField {
                    name: "version".to_string(),
                    command: "get version".to_string(),
                    rule: ExtractRule::SecondLine("Version:".to_string()),
                },
                InfoField {
                    name: "system".to_string(),
                    command: "get system-info".to_string(),
                    rule: ExtractRule::Trimmed,
                },
            ],
        }
    }

    /// Looks up a built-in profile by name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "ruckus" => Some(Self::ruckus()),
            _ => None,
        }
    }
}
