//! Evaluator: classifies an attempt into an explicit verdict
//!
//! Classification is total: whatever the collaborator returns (or fails to
//! return), exactly one `Verdict` comes out. Goals with an exactly
//! checkable answer (first-N primes, Fibonacci prefixes) are verified
//! locally and never reach the collaborator.

mod exact;

pub use exact::exact_check;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::collaborator::{CompletionRequest, LanguageModelCollaborator};
use crate::proposer::Candidate;
use crate::retry::{with_retry, RetryPolicy};
use crate::sandbox::ExecutionResult;

/// Outcome of judging one attempt. Tagged, never a bare string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum Verdict {
    Success {
        summary: String,
    },
    Failure {
        reason: String,
        #[serde(default)]
        insight: Option<String>,
    },
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Success { .. })
    }

    pub fn inconclusive() -> Self {
        Verdict::Failure {
            reason: "evaluation-inconclusive".to_string(),
            insight: None,
        }
    }
}

pub struct Evaluator {
    collaborator: Arc<dyn LanguageModelCollaborator>,
    retry: RetryPolicy,
}

impl Evaluator {
    pub fn new(collaborator: Arc<dyn LanguageModelCollaborator>, retry: RetryPolicy) -> Self {
        Self { collaborator, retry }
    }

    /// Judge a candidate against its execution result. Never fails: a
    /// collaborator error or malformed reply degrades to a Failure verdict.
    pub async fn evaluate(
        &self,
        goal: &str,
        candidate: &Candidate,
        result: &ExecutionResult,
    ) -> Verdict {
        if result.timed_out {
            return Verdict::Failure {
                reason: "execution timed out".to_string(),
                insight: Some(
                    "the program must terminate well within the time limit; avoid unbounded loops"
                        .to_string(),
                ),
            };
        }

        if let Some(verdict) = exact_check(goal, result) {
            debug!("goal verified locally, skipping collaborator");
            return verdict;
        }

        let prompt = build_judgment_prompt(goal, candidate, result);
        let request = CompletionRequest::new(prompt)
            .with_system(
                "You judge whether a program's output satisfies a goal. \
                 Respond with a single JSON object and nothing else.",
            )
            .with_temperature(0.0)
            .with_max_tokens(512);

        let collaborator = Arc::clone(&self.collaborator);
        let response = match with_retry(self.retry, "evaluation", move || {
            let collaborator = Arc::clone(&collaborator);
            let request = request.clone();
            async move { collaborator.complete(request).await }
        })
        .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("evaluation collaborator failed: {e}; defaulting to failure");
                return Verdict::inconclusive();
            }
        };

        parse_verdict(&response)
    }
}

fn build_judgment_prompt(goal: &str, candidate: &Candidate, result: &ExecutionResult) -> String {
    let exit = match &result.exit {
        crate::sandbox::ExitStatus::Success => "0".to_string(),
        crate::sandbox::ExitStatus::Error(code) => code.to_string(),
        crate::sandbox::ExitStatus::Killed => "killed".to_string(),
    };
    format!(
        "GOAL:\n{}\n\nCANDIDATE CODE:\n{}\n\nRATIONALE:\n{}\n\n\
         EXECUTION: exit status {}, elapsed {:?}\nSTDOUT:\n{}\nSTDERR:\n{}\n\n\
         Did the execution output satisfy the goal? Reply with exactly one JSON object:\n\
         {{\"verdict\": \"success\", \"summary\": \"...\"}}\n\
         or\n\
         {{\"verdict\": \"failure\", \"reason\": \"...\", \"insight\": \"one reusable lesson for the next attempt\"}}",
        goal.trim(),
        candidate.code,
        candidate.rationale,
        exit,
        result.duration,
        result.stdout,
        result.stderr,
    )
}

/// Parse a collaborator reply into a verdict at the boundary.
///
/// Tries a JSON object first (anywhere in the reply), then a labeled
/// `VERDICT:` line, and otherwise defaults to an inconclusive failure so
/// the loop never stalls.
pub fn parse_verdict(response: &str) -> Verdict {
    if let Some(json) = first_json_object(response) {
        if let Ok(verdict) = serde_json::from_str::<Verdict>(&json) {
            return verdict;
        }
    }

    for line in response.lines() {
        let lower = line.trim().to_lowercase();
        if let Some(rest) = lower.strip_prefix("verdict:") {
            let rest = rest.trim();
            if rest.starts_with("success") {
                return Verdict::Success {
                    summary: "collaborator judged the output correct".to_string(),
                };
            }
            if rest.starts_with("failure") {
                return Verdict::Failure {
                    reason: "collaborator judged the output incorrect".to_string(),
                    insight: None,
                };
            }
        }
    }

    warn!("could not parse verdict from collaborator reply");
    Verdict::inconclusive()
}

fn first_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(text[start..=end].to_string())
    } else {
        None
    }
}
