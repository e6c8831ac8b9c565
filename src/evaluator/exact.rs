//! Local exact checks for goals with a verifiable answer
//!
//! When the goal asks for the first N primes or the first N Fibonacci
//! numbers, the output can be verified without a model. Anything else
//! returns `None` and goes to the collaborator.

use regex::Regex;
use std::sync::OnceLock;

use crate::sandbox::ExecutionResult;

use super::Verdict;

fn primes_goal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)first\s+(\d+)\s+primes?").expect("valid regex"))
}

fn fibonacci_goal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)first\s+(\d+)\s+fibonacci").expect("valid regex"))
}

fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+").expect("valid regex"))
}

/// Largest N verified locally. Larger goals go to the collaborator so the
/// check stays cheap and cannot stall the loop.
const MAX_EXACT_N: usize = 1000;

/// Verify the execution output exactly when the goal allows it.
pub fn exact_check(goal: &str, result: &ExecutionResult) -> Option<Verdict> {
    if !result.exit.success() {
        return None;
    }

    if let Some(captures) = primes_goal_regex().captures(goal) {
        let n: usize = captures[1].parse().ok()?;
        if n == 0 || n > MAX_EXACT_N {
            return None;
        }
        return Some(check_prefix(
            &result.stdout,
            &first_n_primes(n),
            "primes",
        ));
    }

    if let Some(captures) = fibonacci_goal_regex().captures(goal) {
        let n: usize = captures[1].parse().ok()?;
        if n == 0 || n > MAX_EXACT_N {
            return None;
        }
        return check_fibonacci_prefix(&result.stdout, n);
    }

    None
}

// Prefix match, like the exact checks people write by hand: trailing
// numbers after a correct answer (timings, counters) do not fail it.
fn check_prefix(stdout: &str, expected: &[u64], label: &str) -> Verdict {
    let numbers = extract_numbers(stdout);
    if numbers.len() >= expected.len() && numbers[..expected.len()] == *expected {
        Verdict::Success {
            summary: format!("output begins with the first {} {label}", expected.len()),
        }
    } else {
        Verdict::Failure {
            reason: format!("output does not match the first {} {label}", expected.len()),
            insight: Some(format!(
                "verify the sequence against known {label}; the first values must be {:?}, \
                 and print only the requested values",
                &expected[..expected.len().min(5)]
            )),
        }
    }
}

// Both 0-based and 1-based Fibonacci conventions are accepted. `None`
// when the expected terms do not fit in u64 (N >= ~94).
fn check_fibonacci_prefix(stdout: &str, n: usize) -> Option<Verdict> {
    let numbers = extract_numbers(stdout);
    let from_zero = fibonacci(n, 0, 1)?;
    let from_one = fibonacci(n, 1, 1)?;
    if numbers.len() >= n && (numbers[..n] == from_zero || numbers[..n] == from_one) {
        Some(Verdict::Success {
            summary: format!("output begins with a valid {n}-term Fibonacci prefix"),
        })
    } else {
        Some(Verdict::Failure {
            reason: format!("output does not begin with {n} Fibonacci numbers"),
            insight: Some(
                "the sequence must start 0, 1, 1, 2, 3 (or 1, 1, 2, 3, 5) with each term the sum of the previous two"
                    .to_string(),
            ),
        })
    }
}

fn extract_numbers(text: &str) -> Vec<u64> {
    number_regex()
        .find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

fn first_n_primes(n: usize) -> Vec<u64> {
    let mut primes = Vec::with_capacity(n);
    let mut candidate: u64 = 2;
    while primes.len() < n {
        if is_prime(candidate) {
            primes.push(candidate);
        }
        candidate += 1;
    }
    primes
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }
    let mut factor = 5;
    let mut step = 2;
    while factor * factor <= n {
        if n % factor == 0 {
            return false;
        }
        factor += step;
        step = 6 - step;
    }
    true
}

fn fibonacci(n: usize, first: u64, second: u64) -> Option<Vec<u64>> {
    let mut sequence = Vec::with_capacity(n);
    let (mut a, mut b) = (first, second);
    for _ in 0..n {
        sequence.push(a);
        let next = a.checked_add(b)?;
        a = b;
        b = next;
    }
    Some(sequence)
}
