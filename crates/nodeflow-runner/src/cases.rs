//! Graph test cases
//!
//! A test case is a JSON file named `test_*.json` holding a graph and the
//! node to start it from. A case passes when its run finishes, at least one
//! assertion node reported success, and no node failed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use nodeflow_engine::{
    EngineConfig, MessageKind, NodeRegistry, RunStatus, RunSupervisor, VecEventSink, WorkflowEvent,
    WorkflowGraph,
};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, RunnerError};

const CASE_PREFIX: &str = "test_";
const CASE_EXTENSION: &str = "json";

/// One graph test case file
#[derive(Debug, Clone, Deserialize)]
pub struct GraphTestCase {
    pub graph_data: WorkflowGraph,
    #[serde(deserialize_with = "deserialize_start_id")]
    pub start_node_id: String,
}

fn deserialize_start_id<'de, D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid start_node_id {}", other))),
    }
}

impl GraphTestCase {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| RunnerError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| RunnerError::json(path, e))
    }
}

/// Test case files in `dir`, sorted by name
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| RunnerError::io(dir, e))?;
    let mut cases = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| RunnerError::io(dir, e))?.path();
        let is_case = path.is_file()
            && path.extension().is_some_and(|ext| ext == CASE_EXTENSION)
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(CASE_PREFIX));
        if is_case {
            cases.push(path);
        }
    }
    cases.sort();
    Ok(cases)
}

/// Verdict for one case
#[derive(Debug, Clone, PartialEq)]
pub struct CaseReport {
    pub name: String,
    pub status: Option<RunStatus>,
    pub assertions_passed: usize,
    pub assertions_failed: usize,
    /// Setup errors, node failures and timeouts
    pub problems: Vec<String>,
}

impl CaseReport {
    fn new(name: String) -> Self {
        Self {
            name,
            status: None,
            assertions_passed: 0,
            assertions_failed: 0,
            problems: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == Some(RunStatus::Finished)
            && self.assertions_passed > 0
            && self.assertions_failed == 0
            && self.problems.is_empty()
    }

    /// Tally assertion messages and node failures of one run
    fn absorb(&mut self, events: &[WorkflowEvent]) {
        for event in events {
            match event {
                WorkflowEvent::NodeMessage {
                    kind: MessageKind::Test,
                    payload,
                    ..
                } => match payload.get("status").and_then(Value::as_str) {
                    Some("SUCCESS") => self.assertions_passed += 1,
                    _ => self.assertions_failed += 1,
                },
                WorkflowEvent::NodeFailed {
                    node_id,
                    node_type,
                    error,
                    ..
                } => self
                    .problems
                    .push(format!("{} {} failed: {}", node_type, node_id, error)),
                _ => {}
            }
        }
    }
}

/// Runs test cases, each in a fresh session
pub struct CaseRunner {
    registry: Arc<NodeRegistry>,
    config: EngineConfig,
    timeout: Duration,
}

impl CaseRunner {
    pub fn new(registry: Arc<NodeRegistry>, config: EngineConfig, timeout: Duration) -> Self {
        Self {
            registry,
            config,
            timeout,
        }
    }

    pub async fn run_file(&self, path: &Path) -> CaseReport {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        match GraphTestCase::load(path) {
            Ok(case) => self.run_case(name, &case).await,
            Err(e) => {
                let mut report = CaseReport::new(name);
                report.problems.push(e.to_string());
                report
            }
        }
    }

    pub async fn run_case(&self, name: String, case: &GraphTestCase) -> CaseReport {
        let sink = Arc::new(VecEventSink::new());
        let session = RunSupervisor::with_config(Arc::clone(&self.registry), sink.clone(), self.config.clone());
        let mut report = CaseReport::new(name);
        let run_id = format!("test_run_{}", report.name);

        let run = session.run(&case.graph_data, &case.start_node_id, Some(run_id.clone()));
        match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(outcome)) => report.status = Some(outcome.status),
            Ok(Err(e)) => report.problems.push(e.to_string()),
            Err(_) => {
                session.stop_all().await;
                report.status = Some(RunStatus::Stopped);
                report
                    .problems
                    .push(format!("Timed out after {:?}", self.timeout));
            }
        }
        session.shutdown().await;

        report.absorb(&sink.events_for_run(&run_id));
        log::debug!("Case {}: {:?}", report.name, report);
        report
    }
}

/// Run every case in `dir`, print a line per case and a summary.
pub async fn run_directory(runner: &CaseRunner, dir: &Path) -> Result<Vec<CaseReport>> {
    let files = discover(dir)?;
    if files.is_empty() {
        log::warn!("No {}*.{} files in {}", CASE_PREFIX, CASE_EXTENSION, dir.display());
    }

    let mut reports = Vec::with_capacity(files.len());
    for file in &files {
        let report = runner.run_file(file).await;
        if report.passed() {
            println!("PASS {} ({} assertion(s))", report.name, report.assertions_passed);
        } else {
            println!("FAIL {}", report.name);
            if report.assertions_passed == 0 && report.problems.is_empty() {
                println!("    no assertion reported success");
            }
            if report.assertions_failed > 0 {
                println!("    {} assertion(s) failed", report.assertions_failed);
            }
            for problem in &report.problems {
                println!("    {}", problem);
            }
        }
        reports.push(report);
    }

    let failed = reports.iter().filter(|r| !r.passed()).count();
    println!("{} passed, {} failed", reports.len() - failed, failed);
    if failed > 0 {
        return Err(RunnerError::TestFailures {
            failed,
            total: reports.len(),
        });
    }
    Ok(reports)
}
