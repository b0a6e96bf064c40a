//! Unit state and the attempt-bounded resume rule shared by actions and steps

pub use condition_types::ConditionState as State;

/// Attempts allowed for a single step
pub const STEP_MAX_ATTEMPTS: u32 = 3;

/// Attempts allowed for an action, one more than a step since a step failure
/// consumes an action attempt too
pub const ACTION_MAX_ATTEMPTS: u32 = 4;

/// A unit ran out of attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptsExhausted {
    pub attempts: u32,
    pub max_attempts: u32,
}

/// Decide whether a unit in `state` with `attempts` recorded should run.
///
/// Returns `Ok(false)` for a unit that already succeeded, `Ok(true)` when it
/// should run (again) and `Err` once the attempt budget is spent. A failed
/// unit is treated like an interrupted one.
pub fn should_resume(
    state: State,
    attempts: u32,
    max_attempts: u32,
) -> Result<bool, AttemptsExhausted> {
    match state {
        State::Succeeded => Ok(false),
        State::Pending => Ok(true),
        State::Active | State::Failed if attempts <= max_attempts => Ok(true),
        State::Active | State::Failed => Err(AttemptsExhausted {
            attempts,
            max_attempts,
        }),
    }
}

/// A unit of work that can be resumed after an interruption
pub trait Resumable {
    /// Attempt budget for this kind of unit
    const MAX_ATTEMPTS: u32;

    fn state(&self) -> State;

    fn attempts(&self) -> u32;

    fn should_resume(&self) -> Result<bool, AttemptsExhausted> {
        should_resume(self.state(), self.attempts(), Self::MAX_ATTEMPTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_succeeded_is_never_resumed() {
        for attempts in [0, 1, 10] {
            assert_eq!(should_resume(State::Succeeded, attempts, 3), Ok(false));
        }
    }

    #[test]
    fn test_pending_is_resumed() {
        assert_eq!(should_resume(State::Pending, 0, 3), Ok(true));
    }

    #[test]
    fn test_active_within_budget() {
        assert_eq!(should_resume(State::Active, 1, 3), Ok(true));
        assert_eq!(should_resume(State::Active, 3, 3), Ok(true));
        assert_eq!(
            should_resume(State::Active, 4, 3),
            Err(AttemptsExhausted {
                attempts: 4,
                max_attempts: 3
            })
        );
    }

    #[test]
    fn test_failed_follows_active_rule() {
        assert_eq!(should_resume(State::Failed, 2, ACTION_MAX_ATTEMPTS), Ok(true));
        assert!(should_resume(State::Failed, 5, ACTION_MAX_ATTEMPTS).is_err());
    }
}
