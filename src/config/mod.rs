//! Run configuration
//!
//! A `Settings` value carries every knob the pipeline needs; components
//! never read environment variables or ambient state themselves.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Supported language-model vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    OpenAi,
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "openai" | "gpt" => Ok(Provider::OpenAi),
            other => Err(Error::Config(format!(
                "unknown provider '{other}' (expected 'anthropic' or 'openai')"
            ))),
        }
    }
}

/// Pipeline settings with defaults suitable for small goals.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Which vendor backs the collaborator interface.
    pub provider: Provider,
    /// Model override; each vendor client has its own default.
    pub model: Option<String>,
    /// Wall-clock budget for one sandbox execution.
    pub sandbox_timeout: Duration,
    /// Per-stream capture cap in bytes.
    pub sandbox_output_cap: usize,
    /// Interpreter used to run candidates.
    pub interpreter: String,
    /// Bounded retry policy for collaborator calls.
    pub retry: RetryPolicy,
    /// How many recent attempts go into the proposer context.
    pub context_attempts: usize,
    /// How many insights are retrieved per iteration.
    pub insight_limit: usize,
    /// Character budget for the assembled proposer context.
    pub context_char_budget: usize,
    /// Directory holding checkpoints and the knowledge store.
    pub state_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: Provider::Anthropic,
            model: None,
            sandbox_timeout: Duration::from_secs(30),
            sandbox_output_cap: 64 * 1024,
            interpreter: "python3".to_string(),
            retry: RetryPolicy::default(),
            context_attempts: 3,
            insight_limit: 5,
            context_char_budget: 12_000,
            state_dir: default_state_dir(),
        }
    }
}

impl Settings {
    /// Build settings from the environment, with defaults for anything
    /// unset. Invalid values are configuration errors.
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();

        if let Ok(provider) = std::env::var("SISYPHUS_PROVIDER") {
            settings.provider = provider.parse()?;
        }
        if let Ok(model) = std::env::var("SISYPHUS_MODEL") {
            settings.model = Some(model);
        }
        if let Ok(timeout) = std::env::var("SISYPHUS_SANDBOX_TIMEOUT") {
            let secs: u64 = timeout.parse().map_err(|_| {
                Error::Config(format!("invalid SISYPHUS_SANDBOX_TIMEOUT '{timeout}'"))
            })?;
            settings.sandbox_timeout = Duration::from_secs(secs);
        }
        if let Ok(interpreter) = std::env::var("SISYPHUS_INTERPRETER") {
            settings.interpreter = interpreter;
        }
        if let Ok(dir) = std::env::var("SISYPHUS_STATE_DIR") {
            settings.state_dir = PathBuf::from(dir);
        }

        Ok(settings)
    }

    /// Reject goals and budgets the loop cannot run with.
    pub fn validate_run(goal: &str, max_iterations: u32) -> Result<()> {
        if goal.trim().is_empty() {
            return Err(Error::Config("goal must not be empty".to_string()));
        }
        if max_iterations == 0 {
            return Err(Error::Config(
                "max iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.state_dir.join("checkpoints")
    }

    pub fn knowledge_path(&self) -> PathBuf {
        self.state_dir.join("knowledge.jsonl")
    }
}

fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sisyphus")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("anthropic".parse::<Provider>().unwrap(), Provider::Anthropic);
        assert_eq!("Claude".parse::<Provider>().unwrap(), Provider::Anthropic);
        assert_eq!("openai".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert!("gemini".parse::<Provider>().is_err());
    }

    #[test]
    fn test_validate_run_rejects_blank_goal() {
        assert!(Settings::validate_run("   \n", 3).is_err());
        assert!(Settings::validate_run("find primes", 0).is_err());
        assert!(Settings::validate_run("find primes", 1).is_ok());
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.interpreter, "python3");
        assert_eq!(settings.insight_limit, 5);
        assert!(settings.sandbox_timeout >= Duration::from_secs(1));
    }
}
