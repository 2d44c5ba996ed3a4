//! Inventory file parsing and validation.
//!
//! An inventory lists one device address per line. Blank lines and `#`
//! comments are skipped, and a line's first comma-separated field is taken
//! as the candidate so that unedited CSV exports keep working. Candidates
//! must be IPv4 or IPv6 literals; anything else is excluded with a warning
//! that names its line number. Only an inventory with zero valid addresses
//! is an error.

use std::net::IpAddr;
use std::path::Path;

use log::warn;

use crate::error::RebootError;

/// One rejected inventory line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryWarning {
    /// 1-based line number in the source file.
    pub line: usize,
    /// The candidate text that failed to parse.
    pub entry: String,
}

/// Validated device addresses plus the lines that were rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    pub addresses: Vec<String>,
    pub warnings: Vec<InventoryWarning>,
}

impl Inventory {
    /// Parses inventory text without touching the filesystem.
    pub fn parse(text: &str) -> Self {
        let mut inventory = Inventory::default();
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let candidate = trimmed.split(',').next().unwrap_or(trimmed).trim();
            match candidate.parse::<IpAddr>() {
                Ok(_) => inventory.addresses.push(candidate.to_string()),
                Err(_) => {
                    warn!("inventory line {line}: invalid address {candidate:?}");
                    inventory.warnings.push(InventoryWarning {
                        line,
                        entry: candidate.to_string(),
                    });
                }
            }
        }
        inventory
    }

    /// Reads and parses an inventory file.
    ///
    /// Returns [`RebootError::NoValidAddresses`] when nothing usable
    /// survives validation; individual bad lines only produce warnings.
    pub fn load(path: &Path) -> Result<Self, RebootError> {
        let text = std::fs::read_to_string(path)?;
        let inventory = Self::parse(&text);
        if inventory.addresses.is_empty() {
            return Err(RebootError::NoValidAddresses(path.display().to_string()));
        }
        Ok(inventory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_lines_survive_and_bad_line_is_cited() {
        let inventory = Inventory::parse("10.0.0.1\nnot-an-ip\n10.0.0.2\n");
        assert_eq!(inventory.addresses, ["10.0.0.1", "10.0.0.2"]);
        assert_eq!(
            inventory.warnings,
            [InventoryWarning {
                line: 2,
                entry: "not-an-ip".to_string()
            }]
        );
    }

    #[test]
    fn blank_lines_and_comments_are_skipped_silently() {
        let inventory = Inventory::parse("# lab access points\n\n192.168.1.10\n   \n# done\n");
        assert_eq!(inventory.addresses, ["192.168.1.10"]);
        assert!(inventory.warnings.is_empty());
    }

    #[test]
    fn first_csv_field_is_taken() {
        let inventory = Inventory::parse("10.1.1.1,lobby,floor-1\n10.1.1.2, attic\n");
        assert_eq!(inventory.addresses, ["10.1.1.1", "10.1.1.2"]);
    }

    #[test]
    fn ipv6_literals_are_accepted() {
        let inventory = Inventory::parse("fe80::1\n2001:db8::42\n");
        assert_eq!(inventory.addresses, ["fe80::1", "2001:db8::42"]);
    }

    #[test]
    fn hostnames_are_rejected() {
        let inventory = Inventory::parse("ap-lobby.example.net\n10.0.0.7\n");
        assert_eq!(inventory.addresses, ["10.0.0.7"]);
        assert_eq!(inventory.warnings.len(), 1);
        assert_eq!(inventory.warnings[0].line, 1);
    }

    #[test]
    fn inclusion_is_exactly_valid_noncomment_nonblank() {
        let text = "10.0.0.1\n# 10.0.0.2\n\n999.1.1.1\n10.0.0.3,note\n";
        let inventory = Inventory::parse(text);
        assert_eq!(inventory.addresses, ["10.0.0.1", "10.0.0.3"]);
        assert_eq!(inventory.warnings.len(), 1);
        assert_eq!(inventory.warnings[0].entry, "999.1.1.1");
    }

    #[test]
    fn empty_input_yields_empty_inventory() {
        let inventory = Inventory::parse("");
        assert!(inventory.addresses.is_empty());
        assert!(inventory.warnings.is_empty());
    }
}
