//! # apreboot - Access Point Reboot Automation
//!
//! `apreboot` reboots and queries wireless access points over their
//! interactive SSH shells. Rather than driving a management API, it talks
//! to each device the way an operator would: waiting for its login
//! prompts, answering them, and reading command output straight off the
//! terminal stream. Devices whose only management surface is a vendor
//! shell (such as the Ruckus `rkscli`) can be automated this way.
//!
//! ## Features
//!
//! - **Login Handshake State Machine**: Dispatches on whichever prompt the
//!   device offers first (vendor login, generic password, host key
//!   question) and sends exactly one password per attempt
//! - **Command Classification**: Reboot-class commands wait for an
//!   explicit acknowledgement token; ordinary commands run to the next
//!   shell prompt
//! - **Diagnostics Collection**: Hostname, uptime, version, and system
//!   info gathered per device with field-specific extraction rules
//! - **Sequential Batch Orchestration**: One device at a time, paced
//!   apart, tolerating per-device failure without aborting the run
//! - **Pluggable Reporting**: Batch progress and results flow through an
//!   injected reporter, so console output and tests share one code path
//! - **Maximum Compatibility**: The in-process SSH transport offers legacy
//!   key exchange and cipher algorithms for old firmware
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use apreboot::batch::BatchRunner;
//! use apreboot::config::{Credentials, DeviceTarget};
//! use apreboot::report::ConsoleReporter;
//! use apreboot::session::TransportKind;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = BatchRunner::new(
//!         Credentials::new("admin", "sp-admin"),
//!         TransportKind::System,
//!     );
//!     let targets = vec![
//!         DeviceTarget::new("192.168.1.20", 22),
//!         DeviceTarget::new("192.168.1.21", 22),
//!     ];
//!     let mut reporter = ConsoleReporter::new(false);
//!     let report = runner.run(&targets, &mut reporter).await?;
//!     println!(
//!         "{}/{} devices rebooted",
//!         report.success_count(),
//!         report.total_count()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`session::SessionClient`] - one device's login handshake and command
//!   execution
//! - [`batch::BatchRunner`] - sequential orchestration across many devices
//! - [`report::ResultReporter`] - injected reporting capability
//! - [`profile::DeviceProfile`] - vendor-specific prompts and commands
//! - [`error::RebootError`] - error taxonomy for sessions and batch runs

pub mod batch;
pub mod config;
pub mod error;
pub mod inventory;
pub mod matcher;
pub mod ops;
pub mod profile;
pub mod report;
pub mod session;
