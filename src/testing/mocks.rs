//! Scripted test doubles

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::checkpoint::{Checkpoint, CheckpointStorage};
use crate::collaborator::{CollaboratorError, CompletionRequest, LanguageModelCollaborator};
use crate::error::Result;
use crate::sandbox::{ExecutionResult, ExitStatus, Sandbox};

/// Collaborator that replays a scripted queue of responses.
///
/// An exhausted script is a permanent failure, which makes a test that
/// consumes more completions than it scripted fail loudly.
#[derive(Default)]
pub struct MockCollaborator {
    script: Mutex<VecDeque<std::result::Result<String, CollaboratorError>>>,
}

impl MockCollaborator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: impl Into<String>) {
        self.script.lock().unwrap().push_back(Ok(response.into()));
    }

    pub fn push_failure(&self, error: CollaboratorError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModelCollaborator for MockCollaborator {
    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> std::result::Result<String, CollaboratorError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(CollaboratorError::Permanent(
                    "mock script exhausted".to_string(),
                ))
            })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Sandbox that replays scripted execution results without running code.
#[derive(Default)]
pub struct MockSandbox {
    results: Mutex<VecDeque<ExecutionResult>>,
}

impl MockSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_result(&self, result: ExecutionResult) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn push_stdout(&self, stdout: impl Into<String>) {
        self.push_result(ExecutionResult {
            stdout: stdout.into(),
            stderr: String::new(),
            exit: ExitStatus::Success,
            duration: Duration::from_millis(5),
            timed_out: false,
        });
    }

    pub fn push_timeout(&self) {
        self.push_result(ExecutionResult::timed_out(Duration::from_secs(2)));
    }
}

#[async_trait]
impl Sandbox for MockSandbox {
    async fn execute(&self, _code: &str, _timeout: Duration) -> ExecutionResult {
        self.results.lock().unwrap().pop_front().unwrap_or_else(|| {
            ExecutionResult::spawn_failure("mock sandbox script exhausted".to_string())
        })
    }
}

/// In-memory checkpoint storage.
#[derive(Default)]
pub struct InMemoryCheckpointStorage {
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
}

impl InMemoryCheckpointStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, run_id: &str) -> Option<Checkpoint> {
        self.checkpoints.lock().unwrap().get(run_id).cloned()
    }

    /// The single stored checkpoint, for tests that run one goal.
    pub fn only(&self) -> Option<Checkpoint> {
        let map = self.checkpoints.lock().unwrap();
        if map.len() == 1 {
            map.values().next().cloned()
        } else {
            None
        }
    }
}

#[async_trait]
impl CheckpointStorage for InMemoryCheckpointStorage {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.checkpoints
            .lock()
            .unwrap()
            .insert(checkpoint.run_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self.checkpoints.lock().unwrap().get(run_id).cloned())
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.checkpoints.lock().unwrap().keys().cloned().collect())
    }
}
