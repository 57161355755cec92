//! Recording fakes for pipeline tests.
//!
//! Both fakes keep an ordered call log so tests can assert on the exact
//! sequence of scanner and provider interactions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::check_run::{CheckRef, CheckRun, CheckRunUpdate, PullRequest};
use crate::ecosystem::Ecosystem;
use crate::error::{CheckError, Result};
use crate::finding::Finding;
use crate::provider::{CheckRunClient, CheckRunClientFactory};
use crate::scanner::{ScanSession, Scanner, Submission};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanCall {
    Submit {
        project: String,
        ecosystem: Ecosystem,
        path: PathBuf,
    },
    Wait,
    Fetch(Ecosystem),
}

#[derive(Default)]
struct ScanState {
    calls: Vec<ScanCall>,
    findings: HashMap<Ecosystem, Vec<Finding>>,
    fail_submit: Option<Ecosystem>,
    fail_wait: bool,
    fail_fetch: Option<Ecosystem>,
}

/// Scanner that records calls and serves canned findings.
#[derive(Clone, Default)]
pub struct RecordingScanner {
    state: Arc<Mutex<ScanState>>,
}

impl RecordingScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_findings(self, ecosystem: Ecosystem, findings: Vec<Finding>) -> Self {
        self.lock().findings.insert(ecosystem, findings);
        self
    }

    pub fn failing_submit(self, ecosystem: Ecosystem) -> Self {
        self.lock().fail_submit = Some(ecosystem);
        self
    }

    pub fn failing_wait(self) -> Self {
        self.lock().fail_wait = true;
        self
    }

    pub fn failing_fetch(self, ecosystem: Ecosystem) -> Self {
        self.lock().fail_fetch = Some(ecosystem);
        self
    }

    pub fn calls(&self) -> Vec<ScanCall> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScanState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Scanner for RecordingScanner {
    fn session(&self, project: &str) -> Box<dyn ScanSession> {
        Box::new(RecordingSession {
            scanner: self.clone(),
            project: project.to_string(),
            submitted: 0,
        })
    }
}

struct RecordingSession {
    scanner: RecordingScanner,
    project: String,
    submitted: usize,
}

#[async_trait]
impl ScanSession for RecordingSession {
    async fn submit_manifest(&mut self, ecosystem: Ecosystem, path: &Path) -> Result<Submission> {
        let mut state = self.scanner.lock();
        state.calls.push(ScanCall::Submit {
            project: self.project.clone(),
            ecosystem,
            path: path.to_path_buf(),
        });
        if state.fail_submit == Some(ecosystem) {
            return Err(CheckError::Scanner(format!(
                "submission of {} rejected",
                ecosystem.manifest()
            )));
        }
        self.submitted += 1;
        Ok(Submission {
            ecosystem,
            query_id: format!("query-{}", self.submitted),
        })
    }

    async fn wait_for_query(&mut self) -> Result<()> {
        let mut state = self.scanner.lock();
        state.calls.push(ScanCall::Wait);
        if state.fail_wait {
            return Err(CheckError::QueryTimeout {
                query_id: format!("query-{}", self.submitted),
                polls: 1,
            });
        }
        Ok(())
    }

    async fn fetch(&mut self, ecosystem: Ecosystem) -> Result<Vec<Finding>> {
        let mut state = self.scanner.lock();
        state.calls.push(ScanCall::Fetch(ecosystem));
        if state.fail_fetch == Some(ecosystem) {
            return Err(CheckError::Scanner(format!("no results for {ecosystem}")));
        }
        Ok(state.findings.get(&ecosystem).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Create {
        name: String,
        head_sha: String,
        target_url: String,
    },
    Update {
        id: i64,
        update: CheckRunUpdate,
    },
    MarkErrored {
        id: i64,
        name: String,
        summary: String,
        error: String,
    },
}

/// Provider that records calls. Check-run ids start at 1.
#[derive(Default)]
pub struct RecordingProvider {
    calls: Mutex<Vec<ProviderCall>>,
    create_failures: AtomicUsize,
    fail_update: bool,
    next_id: AtomicI64,
    installations: Mutex<Vec<u64>>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` create calls.
    pub fn failing_creates(self, n: usize) -> Self {
        self.create_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn failing_update(mut self) -> Self {
        self.fail_update = true;
        self
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Installation ids handed out through [`CheckRunClientFactory`].
    pub fn installations(&self) -> Vec<u64> {
        self.installations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn record(&self, call: ProviderCall) {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);
    }
}

#[async_trait]
impl CheckRunClient for RecordingProvider {
    async fn create_check_run(
        &self,
        _pull: &PullRequest,
        name: &str,
        check_ref: &CheckRef,
        target_url: &str,
    ) -> Result<CheckRun> {
        self.record(ProviderCall::Create {
            name: name.to_string(),
            head_sha: check_ref.head_sha.clone(),
            target_url: target_url.to_string(),
        });
        let remaining = self.create_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.create_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(CheckError::Provider("check run creation refused".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CheckRun {
            id,
            name: name.to_string(),
        })
    }

    async fn update_check_run(
        &self,
        _pull: &PullRequest,
        check_run_id: i64,
        update: &CheckRunUpdate,
    ) -> Result<()> {
        self.record(ProviderCall::Update {
            id: check_run_id,
            update: update.clone(),
        });
        if self.fail_update {
            return Err(CheckError::Provider("check run update refused".to_string()));
        }
        Ok(())
    }

    async fn mark_check_run_errored(
        &self,
        _pull: &PullRequest,
        check_run_id: i64,
        name: &str,
        summary: &str,
        error: &str,
    ) -> Result<()> {
        self.record(ProviderCall::MarkErrored {
            id: check_run_id,
            name: name.to_string(),
            summary: summary.to_string(),
            error: error.to_string(),
        });
        Ok(())
    }
}

/// Shares one recorder across every installation.
pub struct RecordingProviderFactory(pub Arc<RecordingProvider>);

impl CheckRunClientFactory for RecordingProviderFactory {
    fn for_installation(&self, installation_id: u64) -> Arc<dyn CheckRunClient> {
        self.0
            .installations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(installation_id);
        self.0.clone()
    }
}
