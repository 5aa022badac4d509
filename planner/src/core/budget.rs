//! Time budget helpers for per-step deadlines.

use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};

/// Deadline for a step started at `start`, if a limit is configured.
pub fn step_deadline(start: Instant, limit: Option<Duration>) -> Option<Instant> {
    limit.and_then(|limit| start.checked_add(limit))
}

/// True once `now` is past the deadline. No deadline never expires.
pub fn deadline_passed(deadline: Option<Instant>, now: Instant) -> bool {
    deadline.is_some_and(|deadline| now > deadline)
}

/// Return the remaining time budget until the provided deadline.
pub fn remaining_budget(deadline: Instant) -> Result<Duration> {
    let remaining = deadline
        .checked_duration_since(Instant::now())
        .unwrap_or(Duration::from_secs(0));
    if remaining.is_zero() {
        return Err(anyhow!("step deadline already passed"));
    }
    Ok(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_limit_means_no_deadline() {
        let start = Instant::now();
        assert_eq!(step_deadline(start, None), None);
        assert!(!deadline_passed(None, start + Duration::from_secs(3600)));
    }

    #[test]
    fn deadline_passes_after_limit() {
        let start = Instant::now();
        let deadline = step_deadline(start, Some(Duration::from_millis(10)));
        assert!(!deadline_passed(deadline, start + Duration::from_millis(5)));
        assert!(deadline_passed(deadline, start + Duration::from_millis(11)));
    }

    #[test]
    fn remaining_budget_errors_when_expired() {
        let expired = Instant::now() - Duration::from_millis(1);
        assert!(remaining_budget(expired).is_err());
        let remaining =
            remaining_budget(Instant::now() + Duration::from_secs(5)).expect("remaining");
        assert!(remaining <= Duration::from_secs(5));
    }
}
