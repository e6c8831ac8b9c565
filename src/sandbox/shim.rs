//! Entry-point shim for candidates that define functions but never run them
//!
//! A candidate that only defines `def solve(n): ...` produces no output, so
//! nothing can be judged. When a candidate has no `__main__` guard and no
//! `print`, we append a guard that calls the most plausible entry function,
//! passing the first integer from the goal when one exists.

use regex::Regex;
use std::sync::OnceLock;

/// Function names that suggest an entry point, in preference order.
const ENTRY_HINTS: &[&str] = &["main", "find", "get", "calculate", "solve"];

fn function_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"def\s+(\w+)\s*\(([^)]*)\)\s*:").expect("valid regex"))
}

fn goal_number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("valid regex"))
}

/// Return runnable code, appending a `__main__` guard if needed.
pub fn ensure_entrypoint(code: &str, goal: &str) -> String {
    if code.contains("__main__") || code.contains("print(") {
        return code.to_string();
    }

    let functions: Vec<(String, bool)> = function_regex()
        .captures_iter(code)
        .map(|c| (c[1].to_string(), !c[2].trim().is_empty()))
        .collect();
    if functions.is_empty() {
        return code.to_string();
    }

    let (name, takes_args) = select_entry(&functions);
    let call = if takes_args {
        match goal_number_regex().find(goal) {
            Some(n) => format!("{name}({})", n.as_str()),
            None => format!("{name}()"),
        }
    } else {
        format!("{name}()")
    };

    format!("{code}\n\nif __name__ == \"__main__\":\n    print({call})\n")
}

fn select_entry(functions: &[(String, bool)]) -> (String, bool) {
    for hint in ENTRY_HINTS {
        if let Some(found) = functions
            .iter()
            .find(|(name, _)| name.to_lowercase().contains(hint))
        {
            return found.clone();
        }
    }
    // Fall back to the last definition, matching how people structure
    // helper-then-driver scripts.
    functions.last().cloned().expect("non-empty")
}
