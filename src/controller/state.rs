//! Run state values
//!
//! All mutable run state lives in `RunState` and is threaded explicitly
//! through the loop; nothing reads ambient state. The whole value is what
//! gets persisted as a checkpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checkpoint::Checkpoint;
use crate::error::{Error, Result};
use crate::evaluator::Verdict;
use crate::proposer::Candidate;
use crate::sandbox::ExecutionResult;

/// One full iteration: candidate, execution outcome, and verdict.
/// Append-only; never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub iteration: u32,
    /// `None` when the proposal itself failed.
    pub candidate: Option<Candidate>,
    /// `None` when no candidate reached the sandbox.
    pub execution: Option<ExecutionResult>,
    pub verdict: Verdict,
    pub timestamp: DateTime<Utc>,
}

impl Attempt {
    /// An attempt that consumed an iteration without reaching the sandbox.
    pub fn unexecuted(iteration: u32, candidate: Option<Candidate>, reason: &str) -> Self {
        Self {
            iteration,
            candidate,
            execution: None,
            verdict: Verdict::Failure {
                reason: reason.to_string(),
                insight: None,
            },
            timestamp: Utc::now(),
        }
    }
}

/// Where a run ended, if it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    #[default]
    InProgress,
    Succeeded,
    Exhausted,
    Interrupted,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The final attempt succeeded; `history` includes it.
    Success {
        attempt: Attempt,
        history: Vec<Attempt>,
    },
    /// Every iteration in the budget was spent without success.
    Exhausted { history: Vec<Attempt> },
    /// The user interrupted the run; only completed attempts are kept.
    Interrupted { history: Vec<Attempt> },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn history(&self) -> &[Attempt] {
        match self {
            Outcome::Success { history, .. }
            | Outcome::Exhausted { history }
            | Outcome::Interrupted { history } => history,
        }
    }
}

/// Full mutable state of one run.
#[derive(Debug, Clone)]
pub struct RunState {
    pub run_id: String,
    pub goal: String,
    pub attempts: Vec<Attempt>,
    /// Count of fully completed iterations.
    pub iteration: u32,
}

impl RunState {
    pub fn new(goal: &str) -> Self {
        Self {
            run_id: format!("run-{}", Uuid::new_v4()),
            goal: goal.trim().to_string(),
            attempts: Vec::new(),
            iteration: 0,
        }
    }

    /// Rebuild state from a checkpoint. The attempts/iteration invariant is
    /// validated here because a checkpoint is the one input we did not
    /// produce in this process.
    pub fn from_checkpoint(checkpoint: Checkpoint) -> Result<Self> {
        if checkpoint.attempts.len() != checkpoint.iteration as usize {
            return Err(Error::Checkpoint(format!(
                "corrupt checkpoint: {} attempts recorded but iteration is {}",
                checkpoint.attempts.len(),
                checkpoint.iteration
            )));
        }
        if checkpoint.goal.trim().is_empty() {
            return Err(Error::Checkpoint("checkpoint has no goal".to_string()));
        }
        Ok(Self {
            run_id: checkpoint.run_id,
            goal: checkpoint.goal,
            attempts: checkpoint.attempts,
            iteration: checkpoint.iteration,
        })
    }

    /// Append a completed attempt. The attempt must carry the next
    /// iteration index; anything else is a logic error upstream.
    pub fn record(&mut self, attempt: Attempt) {
        debug_assert_eq!(attempt.iteration, self.iteration + 1);
        self.iteration = attempt.iteration;
        self.attempts.push(attempt);
    }

    pub fn to_checkpoint(&self, terminal: TerminalState) -> Checkpoint {
        Checkpoint {
            run_id: self.run_id.clone(),
            goal: self.goal.clone(),
            attempts: self.attempts.clone(),
            iteration: self.iteration,
            terminal,
            updated_at: Utc::now(),
        }
    }

    pub fn last_attempt(&self) -> Option<&Attempt> {
        self.attempts.last()
    }
}
