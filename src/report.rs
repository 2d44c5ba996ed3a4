//! Batch results and result reporting.
//!
//! The orchestrator never prints. It emits events through the
//! [`ResultReporter`] capability it was handed, so the same batch logic
//! drives the interactive console, machine-readable output, and tests.
//!
//! # Main Components
//!
//! - [`DeviceResult`] / [`BatchReport`]: the per-device and per-run outcome
//!   records
//! - [`ResultReporter`]: the injected reporting capability
//! - [`ConsoleReporter`]: human-facing implementation, simple or verbose
//! - [`RecordingReporter`]: in-memory implementation for assertions

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use owo_colors::OwoColorize;
use serde::Serialize;

use crate::inventory::InventoryWarning;

/// Outcome status for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Success,
    Failed,
}

/// Outcome record for one device. Immutable once appended to a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceResult {
    pub host: String,
    pub status: DeviceStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<BTreeMap<String, String>>,
}

impl DeviceResult {
    pub fn success(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            status: DeviceStatus::Success,
            message: message.into(),
            info: None,
        }
    }

    pub fn failed(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            status: DeviceStatus::Failed,
            message: message.into(),
            info: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == DeviceStatus::Success
    }
}

/// Ordered per-device outcomes for one run. Order equals input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub results: Vec<DeviceResult>,
}

impl BatchReport {
    pub fn push(&mut self, result: DeviceResult) {
        self.results.push(result);
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.results.iter().filter(|r| !r.succeeded()).count()
    }

    pub fn total_count(&self) -> usize {
        self.results.len()
    }
}

/// Reporting capability injected into the batch orchestrator.
pub trait ResultReporter {
    /// A run over `total` devices is starting.
    fn batch_started(&mut self, total: usize);

    /// An inventory line was rejected during validation.
    fn inventory_warning(&mut self, warning: &InventoryWarning);

    /// Work on one device is starting.
    fn device_started(&mut self, host: &str);

    /// One device finished with the given result.
    fn device_finished(&mut self, result: &DeviceResult);

    /// Asks the operator a yes/no question. `Ok(false)` means declined.
    fn confirm(&mut self, prompt: &str) -> io::Result<bool>;

    /// The run is over; render the final tally.
    fn summary(&mut self, report: &BatchReport);
}

/// Human-facing reporter.
///
/// Simple mode prints one line per device; verbose mode adds gathered info
/// fields and an aligned result listing at the end. With
/// `progress_to_stderr` set, everything goes to stderr so stdout can carry
/// machine-readable output.
#[derive(Debug, Clone)]
pub struct ConsoleReporter {
    verbose: bool,
    progress_to_stderr: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            progress_to_stderr: false,
        }
    }

    pub fn with_stderr_progress(verbose: bool) -> Self {
        Self {
            verbose,
            progress_to_stderr: true,
        }
    }

    fn emit(&self, text: &str) {
        if self.progress_to_stderr {
            eprintln!("{text}");
        } else {
            println!("{text}");
        }
    }

    fn emit_partial(&self, text: &str) {
        if self.progress_to_stderr {
            eprint!("{text}");
            let _ = io::stderr().flush();
        } else {
            print!("{text}");
            let _ = io::stdout().flush();
        }
    }
}

impl ResultReporter for ConsoleReporter {
    fn batch_started(&mut self, total: usize) {
        if total == 1 {
            return;
        }
        self.emit(&format!("Found {total} device addresses"));
    }

    fn inventory_warning(&mut self, warning: &InventoryWarning) {
        self.emit(&format!(
            "{} line {}: invalid address {:?}",
            "●".yellow(),
            warning.line,
            warning.entry
        ));
    }

    fn device_started(&mut self, host: &str) {
        if self.verbose {
            self.emit(&format!("Processing {host}"));
        } else {
            self.emit_partial(&format!("Rebooting {host}... "));
        }
    }

    fn device_finished(&mut self, result: &DeviceResult) {
        if self.verbose {
            let glyph = if result.succeeded() {
                "●".green().to_string()
            } else {
                "●".red().to_string()
            };
            self.emit(&format!("{glyph} {}: {}", result.host, result.message));
            if let Some(info) = &result.info {
                for (field, value) in info {
                    self.emit(&format!("    {field}: {value}"));
                }
            }
        } else if result.succeeded() {
            self.emit(&format!("{}", "OK!".green()));
        } else {
            self.emit(&format!("{} {}", "FAILED:".red(), result.message));
        }
    }

    fn confirm(&mut self, prompt: &str) -> io::Result<bool> {
        self.emit_partial(&format!("{prompt} [y/N]: "));
        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;
        let answer = answer.trim();
        Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
    }

    fn summary(&mut self, report: &BatchReport) {
        if self.verbose && report.total_count() > 1 {
            let width = report
                .results
                .iter()
                .map(|r| r.host.len())
                .max()
                .unwrap_or(0);
            self.emit("");
            for result in &report.results {
                let status = match result.status {
                    DeviceStatus::Success => "success".green().to_string(),
                    DeviceStatus::Failed => "failed ".red().to_string(),
                };
                self.emit(&format!(
                    "{:width$}  {status}  {}",
                    result.host, result.message
                ));
            }
        }
        self.emit(&format!(
            "{}/{} devices rebooted successfully",
            report.success_count(),
            report.total_count()
        ));
    }
}

/// Reporter event captured by [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReporterEvent {
    BatchStarted { total: usize },
    InventoryWarning { line: usize, entry: String },
    DeviceStarted { host: String },
    DeviceFinished { host: String, succeeded: bool },
    Confirmed { prompt: String, answer: bool },
    Summary { success: usize, total: usize },
}

/// In-memory reporter for tests: records every event and answers every
/// confirmation with a preset reply.
#[derive(Debug, Clone)]
pub struct RecordingReporter {
    events: Arc<Mutex<Vec<ReporterEvent>>>,
    confirm_answer: bool,
}

impl RecordingReporter {
    pub fn new(confirm_answer: bool) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            confirm_answer,
        }
    }

    pub fn events(&self) -> Vec<ReporterEvent> {
        self.events.lock().map(|g| g.clone()).unwrap_or_default()
    }

    fn record(&self, event: ReporterEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}

impl ResultReporter for RecordingReporter {
    fn batch_started(&mut self, total: usize) {
        self.record(ReporterEvent::BatchStarted { total });
    }

    fn inventory_warning(&mut self, warning: &InventoryWarning) {
        self.record(ReporterEvent::InventoryWarning {
            line: warning.line,
            entry: warning.entry.clone(),
        });
    }

    fn device_started(&mut self, host: &str) {
        self.record(ReporterEvent::DeviceStarted {
            host: host.to_string(),
        });
    }

    fn device_finished(&mut self, result: &DeviceResult) {
        self.record(ReporterEvent::DeviceFinished {
            host: result.host.clone(),
            succeeded: result.succeeded(),
        });
    }

    fn confirm(&mut self, prompt: &str) -> io::Result<bool> {
        self.record(ReporterEvent::Confirmed {
            prompt: prompt.to_string(),
            answer: self.confirm_answer,
        });
        Ok(self.confirm_answer)
    }

    fn summary(&mut self, report: &BatchReport) {
        self.record(ReporterEvent::Summary {
            success: report.success_count(),
            total: report.total_count(),
        });
    }
}
