//! Proposer: turns a goal plus accumulated history into a candidate
//!
//! Context assembly is deterministic and bounded: the most recent attempts
//! (newest first) and the top-K insights are rendered into a prompt,
//! trimmed oldest-attempt-first and least-relevant-insight-first until the
//! character budget holds. The collaborator's reply must contain a fenced
//! code block; prose around it becomes the rationale.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{debug, info};

use crate::collaborator::{
    CollaboratorError, CompletionRequest, LanguageModelCollaborator,
};
use crate::controller::Attempt;
use crate::evaluator::Verdict;
use crate::knowledge::Insight;
use crate::retry::{with_retry, RetryPolicy};

/// A proposed solution for one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub code: String,
    pub rationale: String,
}

/// Why a proposal round produced no candidate.
#[derive(Error, Debug)]
pub enum ProposalError {
    /// The collaborator failed beyond the retry budget.
    #[error("collaborator unavailable: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// The collaborator answered, but no executable code could be
    /// extracted. Consumes an iteration as an `empty-candidate` failure.
    #[error("no executable code in response")]
    EmptyCandidate { raw: String },
}

/// Limits on the assembled context.
#[derive(Debug, Clone, Copy)]
pub struct ContextLimits {
    /// Most recent attempts included, newest first.
    pub max_attempts: usize,
    /// Character budget for the whole prompt body.
    pub char_budget: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            char_budget: 12_000,
        }
    }
}

const OUTPUT_CONTRACT: &str = "You are writing a short Python program that solves the user's goal.\n\
    REQUIREMENTS:\n\
    1) Use ONLY the Python standard library.\n\
    2) Return ONLY a Python fenced code block (```python ... ```); a short rationale before it is allowed.\n\
    3) When run, the program must print ONLY the final answer via print(...).\n\
    4) No input() calls. No external packages. No network access.\n";

pub struct Proposer {
    collaborator: Arc<dyn LanguageModelCollaborator>,
    retry: RetryPolicy,
    limits: ContextLimits,
}

impl Proposer {
    pub fn new(
        collaborator: Arc<dyn LanguageModelCollaborator>,
        retry: RetryPolicy,
        limits: ContextLimits,
    ) -> Self {
        Self {
            collaborator,
            retry,
            limits,
        }
    }

    /// Ask the collaborator for a candidate given the goal, prior attempts,
    /// and the insights retrieved for this goal.
    pub async fn propose(
        &self,
        goal: &str,
        history: &[Attempt],
        insights: &[Insight],
    ) -> Result<Candidate, ProposalError> {
        let prompt = self.build_prompt(goal, history, insights);
        debug!("proposer prompt is {} chars", prompt.len());

        let request = CompletionRequest::new(prompt)
            .with_system(
                "Follow the output contract strictly. Return a Python code block that runs as-is.",
            )
            .with_temperature(0.7);

        let collaborator = Arc::clone(&self.collaborator);
        let response = with_retry(self.retry, "proposal", move || {
            let collaborator = Arc::clone(&collaborator);
            let request = request.clone();
            async move { collaborator.complete(request).await }
        })
        .await?;

        match extract_code(&response) {
            Some(code) => {
                info!("proposal produced {} bytes of code", code.len());
                Ok(Candidate {
                    rationale: strip_code_blocks(&response),
                    code,
                })
            }
            None => Err(ProposalError::EmptyCandidate { raw: response }),
        }
    }

    /// Deterministic bounded context: contract, insights, then attempts
    /// newest first, trimmed to the budget.
    fn build_prompt(&self, goal: &str, history: &[Attempt], insights: &[Insight]) -> String {
        let mut insight_lines: Vec<String> = insights
            .iter()
            .map(|i| format!("- {}", i.text.trim()))
            .collect();

        let mut attempt_blocks: Vec<String> = history
            .iter()
            .rev()
            .take(self.limits.max_attempts)
            .map(render_attempt)
            .collect();

        loop {
            let prompt = assemble_prompt(goal, &insight_lines, &attempt_blocks);
            if prompt.len() <= self.limits.char_budget {
                return prompt;
            }
            // Oldest attempt first, then least-relevant insight.
            if attempt_blocks.len() > 1 {
                attempt_blocks.pop();
            } else if !insight_lines.is_empty() {
                insight_lines.pop();
            } else if !attempt_blocks.is_empty() {
                attempt_blocks.pop();
            } else {
                return prompt;
            }
        }
    }
}

fn assemble_prompt(goal: &str, insight_lines: &[String], attempt_blocks: &[String]) -> String {
    let mut prompt = String::from(OUTPUT_CONTRACT);
    if !insight_lines.is_empty() {
        prompt.push_str("\nKnown helpful strategies:\n");
        prompt.push_str(&insight_lines.join("\n"));
        prompt.push('\n');
    }
    if !attempt_blocks.is_empty() {
        prompt.push_str("\nPrevious attempts, newest first. Fix what went wrong:\n");
        prompt.push_str(&attempt_blocks.join("\n"));
        prompt.push('\n');
    }
    prompt.push_str("\nGOAL:\n");
    prompt.push_str(goal.trim());
    prompt
}

fn render_attempt(attempt: &Attempt) -> String {
    let mut block = format!("--- attempt {} ---\n", attempt.iteration);
    match &attempt.verdict {
        Verdict::Success { summary } => {
            block.push_str(&format!("verdict: success ({summary})\n"));
        }
        Verdict::Failure { reason, insight } => {
            block.push_str(&format!("verdict: failure ({reason})\n"));
            if let Some(insight) = insight {
                block.push_str(&format!("lesson: {insight}\n"));
            }
        }
    }
    if let Some(execution) = &attempt.execution {
        if !execution.stdout.trim().is_empty() {
            block.push_str(&format!("stdout: {}\n", excerpt(&execution.stdout, 400)));
        }
        if !execution.stderr.trim().is_empty() {
            block.push_str(&format!("stderr: {}\n", excerpt(&execution.stderr, 400)));
        }
        if execution.timed_out {
            block.push_str("note: execution timed out and was killed\n");
        }
    }
    block
}

fn excerpt(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= max {
        return trimmed.to_string();
    }
    let mut end = max;
    while end > 0 && !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

fn python_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```python\s*\n(.*?)```").expect("valid regex"))
}

fn generic_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```\s*\n(.*?)```").expect("valid regex"))
}

/// Extract the best code block from a collaborator response.
///
/// Prefers the longest ```python block; falls back to generic fenced
/// blocks that look like Python, then to harvesting bare code lines from
/// an unfenced reply.
pub fn extract_code(response: &str) -> Option<String> {
    let longest = |re: &Regex| {
        re.captures_iter(response)
            .map(|c| c[1].to_string())
            .max_by_key(|code| code.len())
    };

    if let Some(code) = longest(python_block_regex()) {
        let trimmed = code.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }

    if let Some(code) = longest(generic_block_regex()) {
        let trimmed = code.trim();
        if !trimmed.is_empty() && looks_like_python(trimmed) {
            return Some(trimmed.to_string());
        }
    }

    if !response.contains("```") {
        return harvest_bare_lines(response);
    }

    None
}

/// Collect code from an unfenced reply: everything from the first line
/// that opens a Python statement onwards, minus trailing prose.
fn harvest_bare_lines(response: &str) -> Option<String> {
    const OPENERS: &[&str] = &["import ", "from ", "def ", "class ", "print(", "#"];

    let lines: Vec<&str> = response.lines().collect();
    let start = lines.iter().position(|line| {
        let trimmed = line.trim_start();
        OPENERS.iter().any(|opener| trimmed.starts_with(opener))
    })?;

    let mut end = lines.len();
    while end > start {
        let line = lines[end - 1];
        let trimmed = line.trim();
        let code_like = trimmed.is_empty()
            || line.starts_with(char::is_whitespace)
            || OPENERS.iter().any(|o| trimmed.starts_with(o))
            || trimmed.contains('=')
            || trimmed.starts_with("for ")
            || trimmed.starts_with("while ")
            || trimmed.starts_with("if ")
            || trimmed.starts_with("return ")
            || trimmed.ends_with(':')
            || trimmed.ends_with(')');
        if code_like {
            break;
        }
        end -= 1;
    }

    let code = lines[start..end].join("\n");
    let trimmed = code.trim();
    if !trimmed.is_empty() && looks_like_python(trimmed) {
        Some(trimmed.to_string())
    } else {
        None
    }
}

fn looks_like_python(code: &str) -> bool {
    code.contains("def ") || code.contains("import ") || code.contains("print")
}

fn strip_code_blocks(response: &str) -> String {
    let without_python = python_block_regex().replace_all(response, "");
    generic_block_regex()
        .replace_all(&without_python, "")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_python_block() {
        let response = "Here is the plan.\n```python\nprint(42)\n```\n";
        assert_eq!(extract_code(response).unwrap(), "print(42)");
    }

    #[test]
    fn test_extract_prefers_longest_python_block() {
        let response =
            "```python\nprint(1)\n```\ntext\n```python\nfor i in range(3):\n    print(i)\n```";
        assert!(extract_code(response).unwrap().contains("range(3)"));
    }

    #[test]
    fn test_extract_generic_block_needs_python_shape() {
        let looks_pythonic = "```\nimport math\nprint(math.pi)\n```";
        assert!(extract_code(looks_pythonic).is_some());

        let prose = "```\njust some words here\n```";
        assert!(extract_code(prose).is_none());
    }

    #[test]
    fn test_extract_none_for_prose_only() {
        assert!(extract_code("I cannot write code for that.").is_none());
    }

    #[test]
    fn test_extract_harvests_unfenced_code_lines() {
        let response = "Here is a simple approach:\n\
                        def find_primes(n):\n    \
                            primes = []\n    \
                            return primes\n\
                        print(find_primes(5))\n\
                        This should work for your goal.";
        let code = extract_code(response).unwrap();
        assert!(code.starts_with("def find_primes"));
        assert!(code.ends_with("print(find_primes(5))"));
        assert!(!code.contains("simple approach"));
        assert!(!code.contains("should work"));
    }

    #[test]
    fn test_harvest_skipped_when_reply_has_fences() {
        // A fenced reply that yields no block must not fall through to
        // line harvesting of the surrounding prose.
        let response = "```text\nno code here\n```\nimport os is what I would use.";
        assert!(extract_code(response).is_none());
    }

    #[test]
    fn test_rationale_excludes_code() {
        let response = "Use a sieve.\n```python\nprint(42)\n```";
        let rationale = strip_code_blocks(response);
        assert_eq!(rationale, "Use a sieve.");
    }

    #[test]
    fn test_excerpt_caps_length() {
        let long = "a".repeat(500);
        let short = excerpt(&long, 100);
        assert!(short.len() <= 104);
        assert!(short.ends_with("..."));
    }

    #[test]
    fn test_prompt_trims_to_budget() {
        use crate::testing::mocks::MockCollaborator;
        use chrono::Utc;

        let attempts: Vec<Attempt> = (1..=4)
            .map(|i| Attempt {
                iteration: i,
                candidate: Some(Candidate {
                    code: "print(1)".to_string(),
                    rationale: String::new(),
                }),
                execution: Some(crate::sandbox::ExecutionResult {
                    stdout: "x".repeat(300),
                    stderr: String::new(),
                    exit: crate::sandbox::ExitStatus::Success,
                    duration: std::time::Duration::from_millis(5),
                    timed_out: false,
                }),
                verdict: Verdict::Failure {
                    reason: "wrong output".to_string(),
                    insight: None,
                },
                timestamp: Utc::now(),
            })
            .collect();

        let proposer = Proposer::new(
            Arc::new(MockCollaborator::new()),
            RetryPolicy::default(),
            ContextLimits {
                max_attempts: 3,
                char_budget: 900,
            },
        );

        let prompt = proposer.build_prompt("some goal", &attempts, &[]);
        assert!(prompt.len() <= 900);
        // Newest attempt survives the trim.
        assert!(prompt.contains("attempt 4"));
        assert!(prompt.contains("GOAL:"));
    }
}
