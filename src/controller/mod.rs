//! Refinement controller
//!
//! The core state machine: propose, execute, evaluate, learn, checkpoint,
//! repeat. Strictly sequential within a run. Every iteration appends
//! exactly one attempt; the checkpoint on disk always reflects exactly the
//! attempts that completed their full cycle.

pub mod state;

pub use state::{Attempt, Outcome, RunState, TerminalState};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::checkpoint::{Checkpoint, CheckpointStorage};
use crate::collaborator::LanguageModelCollaborator;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::evaluator::{Evaluator, Verdict};
use crate::knowledge::{Insight, KnowledgeStore};
use crate::proposer::{ContextLimits, Proposer, ProposalError};
use crate::sandbox::{shim, Sandbox};

pub struct RefinementController {
    proposer: Proposer,
    evaluator: Evaluator,
    sandbox: Arc<dyn Sandbox>,
    knowledge: KnowledgeStore,
    checkpoints: Arc<dyn CheckpointStorage>,
    sandbox_timeout: Duration,
    insight_limit: usize,
    interrupt: Arc<AtomicBool>,
}

impl RefinementController {
    pub fn new(
        collaborator: Arc<dyn LanguageModelCollaborator>,
        sandbox: Arc<dyn Sandbox>,
        knowledge: KnowledgeStore,
        checkpoints: Arc<dyn CheckpointStorage>,
        settings: &Settings,
    ) -> Self {
        let limits = ContextLimits {
            max_attempts: settings.context_attempts,
            char_budget: settings.context_char_budget,
        };
        Self {
            proposer: Proposer::new(Arc::clone(&collaborator), settings.retry, limits),
            evaluator: Evaluator::new(collaborator, settings.retry),
            sandbox,
            knowledge,
            checkpoints,
            sandbox_timeout: settings.sandbox_timeout,
            insight_limit: settings.insight_limit,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked at attempt boundaries; set it from a signal handler to
    /// stop the run after the in-flight work is abandoned.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Drive the loop for a fresh goal.
    pub async fn run(&mut self, goal: &str, max_iterations: u32) -> Result<Outcome> {
        Settings::validate_run(goal, max_iterations)?;
        let state = RunState::new(goal);
        self.run_from(state, max_iterations).await
    }

    /// Resume a checkpointed run. Completed iterations are never re-run;
    /// the loop continues at `checkpoint.iteration + 1`. A run that
    /// already succeeded is returned as-is without spending iterations.
    pub async fn resume(&mut self, checkpoint: Checkpoint, max_iterations: u32) -> Result<Outcome> {
        if checkpoint.terminal == TerminalState::Succeeded {
            let state = RunState::from_checkpoint(checkpoint)?;
            let attempt = state
                .last_attempt()
                .cloned()
                .ok_or_else(|| Error::Checkpoint("succeeded run has no attempts".to_string()))?;
            info!("run {} already succeeded; nothing to resume", state.run_id);
            return Ok(Outcome::Success {
                attempt,
                history: state.attempts,
            });
        }

        let state = RunState::from_checkpoint(checkpoint)?;
        Settings::validate_run(&state.goal, max_iterations)?;
        info!(
            "resuming run {} at iteration {}",
            state.run_id,
            state.iteration + 1
        );
        self.run_from(state, max_iterations).await
    }

    async fn run_from(&mut self, mut state: RunState, max_iterations: u32) -> Result<Outcome> {
        info!("goal: {}", state.goal);

        while state.iteration < max_iterations {
            if self.interrupted() {
                return self.finish_interrupted(&state).await;
            }

            let iteration = state.iteration + 1;
            info!("iteration {iteration} of {max_iterations}");

            let attempt = self.run_iteration(&state, iteration).await;
            match attempt {
                Some(attempt) => {
                    let succeeded = attempt.verdict.is_success();
                    self.learn_from(&state.goal, &attempt);
                    state.record(attempt);
                    self.write_checkpoint(
                        &state,
                        if succeeded {
                            TerminalState::Succeeded
                        } else if state.iteration == max_iterations {
                            TerminalState::Exhausted
                        } else {
                            TerminalState::InProgress
                        },
                    )
                    .await;

                    if succeeded {
                        let attempt = state.last_attempt().expect("attempt just recorded").clone();
                        info!("goal achieved at iteration {}", state.iteration);
                        return Ok(Outcome::Success {
                            attempt,
                            history: state.attempts,
                        });
                    }
                }
                // In-flight work was abandoned; nothing is persisted for it.
                None => return self.finish_interrupted(&state).await,
            }
        }

        info!(
            "iteration budget exhausted after {} attempts",
            state.attempts.len()
        );
        Ok(Outcome::Exhausted {
            history: state.attempts,
        })
    }

    /// One full proposer -> sandbox -> evaluator cycle. Returns `None` only
    /// when an interrupt arrived mid-cycle, in which case the partial
    /// attempt is discarded.
    async fn run_iteration(&self, state: &RunState, iteration: u32) -> Option<Attempt> {
        let insights = self.knowledge.query(&state.goal, self.insight_limit);

        let candidate = match self
            .proposer
            .propose(&state.goal, &state.attempts, &insights)
            .await
        {
            Ok(candidate) => candidate,
            Err(ProposalError::Collaborator(e)) => {
                warn!("proposal failed beyond retry budget: {e}");
                return Some(Attempt::unexecuted(iteration, None, "proposal-failed"));
            }
            Err(ProposalError::EmptyCandidate { raw }) => {
                warn!("collaborator reply contained no executable code");
                let candidate = crate::proposer::Candidate {
                    code: String::new(),
                    rationale: raw.trim().to_string(),
                };
                return Some(Attempt::unexecuted(
                    iteration,
                    Some(candidate),
                    "empty-candidate",
                ));
            }
        };

        if candidate.code.trim().is_empty() {
            return Some(Attempt::unexecuted(
                iteration,
                Some(candidate),
                "empty-candidate",
            ));
        }

        let runnable = shim::ensure_entrypoint(&candidate.code, &state.goal);
        let execution = self.sandbox.execute(&runnable, self.sandbox_timeout).await;

        if self.interrupted() {
            return None;
        }

        let verdict = self
            .evaluator
            .evaluate(&state.goal, &candidate, &execution)
            .await;

        Some(Attempt {
            iteration,
            candidate: Some(candidate),
            execution: Some(execution),
            verdict,
            timestamp: chrono::Utc::now(),
        })
    }

    /// Upsert the failure insight, best effort. A store write failure is
    /// logged and the run continues without the lesson.
    fn learn_from(&mut self, goal: &str, attempt: &Attempt) {
        if let Verdict::Failure {
            insight: Some(text),
            ..
        } = &attempt.verdict
        {
            let insight = Insight::new(text.clone(), goal, attempt.iteration, "failure-lesson");
            if let Err(e) = self.knowledge.upsert(insight) {
                warn!("could not persist insight: {e}");
            }
        }
    }

    /// Checkpoint write failures degrade the run to non-resumable but do
    /// not abort it.
    async fn write_checkpoint(&self, state: &RunState, terminal: TerminalState) {
        let checkpoint = state.to_checkpoint(terminal);
        if let Err(e) = self.checkpoints.save(&checkpoint).await {
            warn!("could not write checkpoint: {e}");
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }

    async fn finish_interrupted(&self, state: &RunState) -> Result<Outcome> {
        warn!(
            "run interrupted after {} completed iterations",
            state.iteration
        );
        self.write_checkpoint(state, TerminalState::Interrupted).await;
        Ok(Outcome::Interrupted {
            history: state.attempts.clone(),
        })
    }
}
