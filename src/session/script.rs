use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::RebootError;

use super::transport::ShellStream;

/// One step of a scripted session dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Emit text on the session's output.
    Emit { data: String },
    /// Block until the client sends exactly this line (line ending
    /// stripped); any other lines received meanwhile are logged and
    /// skipped.
    AwaitLine { line: String },
    /// End the output stream, as a remote disconnect would.
    Close,
    /// Wait before the next step.
    Pause { ms: u64 },
}

/// Lines a scripted session received from the client, line endings
/// stripped. Shared so assertions can read it after the run.
#[derive(Debug, Clone, Default)]
pub struct SentLog(Arc<Mutex<Vec<String>>>);

impl SentLog {
    fn push(&self, line: String) {
        if let Ok(mut guard) = self.0.lock() {
            guard.push(line);
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.0.lock().map(|guard| guard.clone()).unwrap_or_default()
    }
}

/// A canned prompt/response dialogue replayed as a live session stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellScript {
    steps: Vec<ScriptStep>,
}

impl ShellScript {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self { steps }
    }

    /// Parses a script from JSONL, one step per line, blank lines skipped.
    pub fn from_jsonl(text: &str) -> Result<Self, RebootError> {
        let mut steps = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let step: ScriptStep = serde_json::from_str(line)
                .map_err(|err| RebootError::InvalidScript(format!("line {}: {err}", index + 1)))?;
            steps.push(step);
        }
        Ok(Self { steps })
    }

    /// Runs the dialogue on a background task and hands back the stream.
    ///
    /// After the last step the session stays open, absorbing and logging
    /// client lines, until a `Close` step ended it or the client hangs up.
    pub(crate) fn spawn(self, log: SentLog) -> ShellStream {
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(256);
        let (inbound_tx, inbound_rx) = mpsc::channel::<String>(256);

        tokio::spawn(async move {
            let mut inbound = Some(inbound_tx);
            for step in self.steps {
                match step {
                    ScriptStep::Emit { data } => {
                        if let Some(tx) = &inbound
                            && tx.send(data).await.is_err()
                        {
                            break;
                        }
                    }
                    ScriptStep::AwaitLine { line } => {
                        let mut matched = false;
                        while let Some(received) = outbound_rx.recv().await {
                            let received =
                                received.trim_end_matches(['\r', '\n']).to_string();
                            log.push(received.clone());
                            if received == line {
                                matched = true;
                                break;
                            }
                        }
                        if !matched {
                            return;
                        }
                    }
                    ScriptStep::Close => {
                        inbound = None;
                    }
                    ScriptStep::Pause { ms } => {
                        tokio::time::sleep(Duration::from_millis(ms)).await;
                    }
                }
            }
            while let Some(received) = outbound_rx.recv().await {
                log.push(received.trim_end_matches(['\r', '\n']).to_string());
            }
        });

        ShellStream::from_parts(outbound_tx, inbound_rx)
    }
}

/// Scripts for a set of hosts, plus the log of what each host received.
///
/// Cloning shares the underlying registries, so a copy given to the
/// transport still feeds the logs the test holds.
#[derive(Debug, Clone, Default)]
pub struct ScriptBook {
    scripts: Arc<Mutex<HashMap<String, ShellScript>>>,
    logs: Arc<Mutex<HashMap<String, SentLog>>>,
    fallback: Arc<Mutex<Option<ShellScript>>>,
}

impl ScriptBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the script replayed when `host` connects.
    pub fn insert(&self, host: impl Into<String>, script: ShellScript) {
        if let Ok(mut guard) = self.scripts.lock() {
            guard.insert(host.into(), script);
        }
    }

    /// Script used for hosts without a dedicated entry.
    pub fn set_fallback(&self, script: ShellScript) {
        if let Ok(mut guard) = self.fallback.lock() {
            *guard = Some(script);
        }
    }

    /// Every line `host`'s session received, in order.
    pub fn sent_lines(&self, host: &str) -> Vec<String> {
        self.logs
            .lock()
            .ok()
            .and_then(|guard| guard.get(host).map(|log| log.lines()))
            .unwrap_or_default()
    }

    pub(crate) fn open(&self, host: &str) -> Result<ShellStream, RebootError> {
        let script = self
            .scripts
            .lock()
            .ok()
            .and_then(|guard| guard.get(host).cloned())
            .or_else(|| self.fallback.lock().ok().and_then(|guard| guard.clone()));
        let Some(script) = script else {
            return Err(RebootError::InvalidScript(format!(
                "no script for host {host}"
            )));
        };
        let log = SentLog::default();
        if let Ok(mut guard) = self.logs.lock() {
            guard.insert(host.to_string(), log.clone());
        }
        Ok(script.spawn(log))
    }
}
