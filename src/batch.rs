//! Sequential batch orchestration over many devices.
//!
//! One device is driven to completion before the next is touched; there is
//! no cross-device concurrency to reason about. Per-device failures are
//! folded into that device's result and never abort the batch, so a run
//! over a partly dead fleet still produces a complete report.
//!
//! # Main Components
//!
//! - [`BatchRunner`] - drives the device loop and owns shared settings
//! - [`BatchOptions`] / [`ConfirmPolicy`] - what to do per device and when
//!   to ask the operator
//! - [`CancelFlag`] - cooperative interrupt checked at batch checkpoints

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};
use tokio::time::sleep;

use crate::config::{Credentials, DeviceTarget, Timeouts};
use crate::error::RebootError;
use crate::ops;
use crate::profile::DeviceProfile;
use crate::report::{BatchReport, DeviceResult, ResultReporter};
use crate::session::{SessionClient, TransportKind};

/// When the operator is asked before a reboot is issued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfirmPolicy {
    /// One confirmation up front covering the whole batch. Declining
    /// aborts the run with no devices touched.
    #[default]
    PerBatch,
    /// One confirmation per device, asked after connecting. Declining
    /// skips that device only.
    PerDevice,
    /// No confirmation at all.
    SkipAll,
}

/// Cooperative cancellation shared between the signal handler and the
/// batch loop. Once set it stays set.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run behavior switches.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub confirm: ConfirmPolicy,
    /// Collect diagnostic fields before rebooting.
    pub gather_info: bool,
    /// Collect diagnostics only and never issue the reboot command.
    pub query_only: bool,
}

/// Drives a batch of devices strictly one after another.
///
/// Credentials, profile, and timeouts are shared read-only across the
/// whole run; each device gets its own [`SessionClient`] that is dropped
/// before the next device is contacted.
pub struct BatchRunner {
    pub credentials: Credentials,
    pub profile: DeviceProfile,
    pub timeouts: Timeouts,
    pub transport: TransportKind,
    pub options: BatchOptions,
    pub cancel: CancelFlag,
}

impl BatchRunner {
    pub fn new(credentials: Credentials, transport: TransportKind) -> Self {
        Self {
            credentials,
            profile: DeviceProfile::ruckus(),
            timeouts: Timeouts::default(),
            transport,
            options: BatchOptions::default(),
            cancel: CancelFlag::new(),
        }
    }

    /// Processes every target in order and returns one result per target.
    ///
    /// `Err` is reserved for run-level aborts: a declined batch
    /// confirmation, an interrupt, or a reporter whose prompt I/O failed.
    /// Device-side problems come back inside the report.
    pub async fn run(
        &self,
        targets: &[DeviceTarget],
        reporter: &mut dyn ResultReporter,
    ) -> Result<BatchReport, RebootError> {
        reporter.batch_started(targets.len());

        if self.options.confirm == ConfirmPolicy::PerBatch && !self.options.query_only {
            let prompt = format!(
                "This will reboot {} access point(s) and temporarily disconnect \
                 their wireless clients. Continue?",
                targets.len()
            );
            if !reporter.confirm(&prompt)? {
                return Err(RebootError::Cancelled);
            }
        }

        let mut report = BatchReport::default();
        for (index, target) in targets.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(RebootError::Cancelled);
            }
            reporter.device_started(&target.host);
            let result = self.process_device(target, reporter).await?;
            reporter.device_finished(&result);
            report.push(result);

            if index + 1 < targets.len() {
                debug!("pacing {:?} before next device", self.timeouts.pacing);
                sleep(self.timeouts.pacing).await;
            }
        }

        reporter.summary(&report);
        Ok(report)
    }

    /// One device, start to finish. The session is released on every
    /// path, including a mid-device interrupt.
    async fn process_device(
        &self,
        target: &DeviceTarget,
        reporter: &mut dyn ResultReporter,
    ) -> Result<DeviceResult, RebootError> {
        let mut client = SessionClient::new(
            target.clone(),
            self.credentials.clone(),
            self.profile.clone(),
            self.timeouts,
        );
        let outcome = self.drive_device(&mut client, &target.host, reporter).await;
        client.disconnect().await;
        outcome
    }

    async fn drive_device(
        &self,
        client: &mut SessionClient,
        host: &str,
        reporter: &mut dyn ResultReporter,
    ) -> Result<DeviceResult, RebootError> {
        if let Err(err) = client.connect(&self.transport).await {
            warn!("[{host}] connection failed: {err}");
            return Ok(DeviceResult::failed(host, "Connection failed"));
        }

        let info = if self.options.gather_info || self.options.query_only {
            Some(ops::gather_info(client).await)
        } else {
            None
        };

        if self.options.query_only {
            let mut result = DeviceResult::success(host, "Information collected");
            result.info = info;
            return Ok(result);
        }

        if self.cancel.is_cancelled() {
            return Err(RebootError::Cancelled);
        }

        if self.options.confirm == ConfirmPolicy::PerDevice {
            let prompt = format!(
                "This will reboot the access point at {host} and temporarily \
                 disconnect its clients. Continue?"
            );
            if !reporter.confirm(&prompt)? {
                let mut result = DeviceResult::failed(host, "Reboot cancelled by user");
                result.info = info;
                return Ok(result);
            }
        }

        let mut result = match ops::initiate_reboot(client).await {
            Ok(ack) if ack.succeeded => DeviceResult::success(host, "Reboot initiated successfully"),
            Ok(_) => DeviceResult::failed(host, "Failed to initiate reboot"),
            Err(err) => DeviceResult::failed(host, format!("Error: {err}")),
        };
        result.info = info;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{DeviceStatus, RecordingReporter, ReporterEvent};
    use crate::session::{ScriptBook, ScriptStep, ShellScript};
    use std::time::{Duration, Instant};

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

    fn auth_then(mut dialogue: Vec<ScriptStep>) -> ShellScript {
        let mut steps = vec![
            emit("password: "),
            await_line("sp-admin"),
            emit("\r\nrkscli: "),
        ];
        steps.append(&mut dialogue);
        ShellScript::new(steps)
    }

    fn rebootable() -> ShellScript {
        auth_then(vec![await_line("reboot"), emit("OK\r\n")])
    }

    fn test_timeouts() -> Timeouts {
        Timeouts {
            connect: Duration::from_millis(400),
            shell_prompt: Duration::from_millis(300),
            command: Duration::from_millis(150),
            reboot: Duration::from_millis(400),
            pacing: Duration::from_millis(1),
        }
    }

    fn runner(book: &ScriptBook) -> BatchRunner {
        let mut runner = BatchRunner::new(
            Credentials::new("admin", "sp-admin"),
            TransportKind::Scripted(book.clone()),
        );
        runner.timeouts = test_timeouts();
        runner
    }

    fn targets(hosts: &[&str]) -> Vec<DeviceTarget> {
        hosts.iter().map(|host| DeviceTarget::new(*host, 22)).collect()
    }

    #[tokio::test]
    async fn one_result_per_device_in_input_order() {
        let book = ScriptBook::new();
        book.insert("10.1.0.1", rebootable());
        book.insert(
            "10.1.0.2",
            auth_then(vec![
                await_line("reboot"),
                emit("reboot\r\nUnrecognized command\r\nrkscli: "),
            ]),
        );
        book.insert("10.1.0.3", ShellScript::new(vec![ScriptStep::Close]));

        let mut reporter = RecordingReporter::new(true);
        let report = runner(&book)
            .run(&targets(&["10.1.0.1", "10.1.0.2", "10.1.0.3"]), &mut reporter)
            .await
            .expect("run");

        let hosts: Vec<_> = report.results.iter().map(|r| r.host.as_str()).collect();
        assert_eq!(hosts, ["10.1.0.1", "10.1.0.2", "10.1.0.3"]);
        assert_eq!(report.results[0].message, "Reboot initiated successfully");
        assert_eq!(report.results[0].status, DeviceStatus::Success);
        assert_eq!(report.results[1].message, "Failed to initiate reboot");
        assert_eq!(report.results[2].message, "Connection failed");
        assert_eq!(report.success_count(), 1);
        assert_eq!(report.failure_count(), 2);

        let events = reporter.events();
        assert_eq!(events[0], ReporterEvent::BatchStarted { total: 3 });
        assert!(matches!(events[1], ReporterEvent::Confirmed { .. }));
        assert_eq!(
            events.last(),
            Some(&ReporterEvent::Summary {
                success: 1,
                total: 3
            })
        );
    }

    #[tokio::test]
    async fn declined_batch_confirmation_touches_no_device() {
        let book = ScriptBook::new();
        book.insert("10.1.1.1", rebootable());

        let mut reporter = RecordingReporter::new(false);
        let err = runner(&book)
            .run(&targets(&["10.1.1.1"]), &mut reporter)
            .await
            .expect_err("must abort");
        assert!(matches!(err, RebootError::Cancelled));
        assert!(book.sent_lines("10.1.1.1").is_empty());
        assert!(
            !reporter
                .events()
                .iter()
                .any(|e| matches!(e, ReporterEvent::DeviceStarted { .. }))
        );
    }

    #[tokio::test]
    async fn per_device_decline_skips_that_device_without_aborting() {
        let book = ScriptBook::new();
        book.insert("10.1.2.1", rebootable());

        let mut reporter = RecordingReporter::new(false);
        let mut runner = runner(&book);
        runner.options.confirm = ConfirmPolicy::PerDevice;
        let report = runner
            .run(&targets(&["10.1.2.1"]), &mut reporter)
            .await
            .expect("run completes");

        assert_eq!(report.results[0].message, "Reboot cancelled by user");
        assert_eq!(report.results[0].status, DeviceStatus::Failed);
        let sent = book.sent_lines("10.1.2.1");
        assert!(!sent.contains(&"reboot".to_string()));
        assert!(sent.contains(&"exit".to_string()));
    }

    #[tokio::test]
    async fn query_only_skips_confirmation_and_reboot() {
        let book = ScriptBook::new();
        book.insert(
            "10.1.3.1",
            auth_then(vec![
                await_line("get device-name"),
                emit("get device-name\r\nDevice Name: closet-ap\r\nOK\r\n\r\nrkscli: "),
                await_line("get uptime"),
                emit("get uptime\r\nUptime: 4 days\r\nOK\r\n\r\nrkscli: "),
                await_line("get version"),
                emit("get version\r\nVersion: 9.8.3\r\nOK\r\n\r\nrkscli: "),
                await_line("get system-info"),
                emit("get system-info\r\nModel: ZF7363\r\nOK\r\n\r\nrkscli: "),
            ]),
        );

        let mut reporter = RecordingReporter::new(true);
        let mut runner = runner(&book);
        runner.options.query_only = true;
        let report = runner
            .run(&targets(&["10.1.3.1"]), &mut reporter)
            .await
            .expect("run");

        let result = &report.results[0];
        assert_eq!(result.message, "Information collected");
        assert!(result.succeeded());
        let info = result.info.as_ref().expect("info map");
        assert_eq!(info["hostname"], "closet-ap");
        assert!(
            !reporter
                .events()
                .iter()
                .any(|e| matches!(e, ReporterEvent::Confirmed { .. }))
        );
        assert!(!book.sent_lines("10.1.3.1").contains(&"reboot".to_string()));
    }

    #[tokio::test]
    async fn devices_are_paced_apart() {
        let book = ScriptBook::new();
        book.set_fallback(rebootable());

        let mut reporter = RecordingReporter::new(true);
        let mut runner = runner(&book);
        runner.timeouts.pacing = Duration::from_millis(50);
        let started = Instant::now();
        let report = runner
            .run(&targets(&["10.1.4.1", "10.1.4.2", "10.1.4.3"]), &mut reporter)
            .await
            .expect("run");
        // Two pacing gaps for three devices; none after the last.
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(report.success_count(), 3);
    }

    #[tokio::test]
    async fn interrupt_mid_device_aborts_and_still_disconnects() {
        let book = ScriptBook::new();
        book.insert(
            "10.1.5.1",
            ShellScript::new(vec![
                ScriptStep::Pause { ms: 60 },
                emit("password: "),
                await_line("sp-admin"),
                emit("\r\nrkscli: "),
            ]),
        );

        let mut reporter = RecordingReporter::new(true);
        let runner = runner(&book);
        let cancel = runner.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel.cancel();
        });

        let err = runner
            .run(&targets(&["10.1.5.1"]), &mut reporter)
            .await
            .expect_err("must abort");
        assert!(matches!(err, RebootError::Cancelled));
        // The open session was still released politely.
        assert!(book.sent_lines("10.1.5.1").contains(&"exit".to_string()));
        assert!(
            !reporter
                .events()
                .iter()
                .any(|e| matches!(e, ReporterEvent::DeviceFinished { .. }))
        );
    }

    #[tokio::test]
    async fn preset_interrupt_aborts_before_any_device() {
        let book = ScriptBook::new();
        book.insert("10.1.6.1", rebootable());

        let mut reporter = RecordingReporter::new(true);
        let runner = runner(&book);
        runner.cancel.cancel();
        let err = runner
            .run(&targets(&["10.1.6.1"]), &mut reporter)
            .await
            .expect_err("must abort");
        assert!(matches!(err, RebootError::Cancelled));
        assert!(book.sent_lines("10.1.6.1").is_empty());
    }
}
