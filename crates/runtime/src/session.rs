//! Session authorization state machine.
//!
//! Tracks consecutive `Unauthorized` responses and decides when the local
//! session must be revoked. Transitions are pure; the caller performs the
//! returned [`Action`].

use crate::Error;

/// Consecutive unauthorized responses that revoke the session.
pub const REVOKE_THRESHOLD: u8 = 3;

/// Authorization health of the client session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No outstanding failures.
    #[default]
    Active,
    /// Some consecutive unauthorized responses, below the threshold.
    Degraded { failures: u8 },
    /// Credentials and caches were purged. Left by a success or a new token.
    Revoked,
}

/// How a request to the server ended, as far as the session is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The server answered successfully.
    Success,
    /// The server answered 403.
    Unauthorized,
    /// Any other failure: network, decoding, other status codes.
    Failed,
}

impl Outcome {
    pub fn of<T>(result: &crate::Result<T>) -> Self {
        match result {
            Ok(_) => Outcome::Success,
            Err(e) => Outcome::from(e),
        }
    }
}

impl From<&Error> for Outcome {
    fn from(e: &Error) -> Self {
        if e.is_unauthorized() {
            Outcome::Unauthorized
        } else {
            Outcome::Failed
        }
    }
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    /// Purge the token and caches, reset the view and notify the user.
    Revoke,
}

impl SessionState {
    /// Resume a session that had `failures` consecutive unauthorized responses.
    pub fn resume(failures: u8) -> Self {
        match failures {
            n if n > 0 && n < REVOKE_THRESHOLD => SessionState::Degraded { failures: n },
            _ => SessionState::Active,
        }
    }

    /// Current consecutive failure count. Revocation resets it to zero.
    pub fn fail_count(self) -> u8 {
        match self {
            SessionState::Degraded { failures } => failures,
            SessionState::Active | SessionState::Revoked => 0,
        }
    }

    pub fn is_revoked(self) -> bool {
        self == SessionState::Revoked
    }

    pub fn on_outcome(self, outcome: Outcome) -> (SessionState, Action) {
        match (self, outcome) {
            (_, Outcome::Success) => (SessionState::Active, Action::None),
            (state, Outcome::Failed) => (state, Action::None),
            (SessionState::Revoked, Outcome::Unauthorized) => (SessionState::Revoked, Action::None),
            (state, Outcome::Unauthorized) => {
                let failures = state.fail_count() + 1;
                if failures >= REVOKE_THRESHOLD {
                    (SessionState::Revoked, Action::Revoke)
                } else {
                    (SessionState::Degraded { failures }, Action::None)
                }
            }
        }
    }

    /// A new token was supplied.
    pub fn on_token_installed(self) -> SessionState {
        SessionState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(outcomes: &[Outcome]) -> (SessionState, Vec<Action>) {
        outcomes
            .iter()
            .fold((SessionState::Active, Vec::new()), |(state, mut actions), o| {
                let (next, action) = state.on_outcome(*o);
                actions.push(action);
                (next, actions)
            })
    }

    #[test]
    fn three_unauthorized_revoke_once() {
        use Outcome::Unauthorized as U;
        let (state, actions) = run(&[U, U, U, U]);
        assert_eq!(state, SessionState::Revoked);
        assert_eq!(
            actions,
            [Action::None, Action::None, Action::Revoke, Action::None]
        );
        assert_eq!(state.fail_count(), 0);
    }

    #[test]
    fn degraded_counts_failures() {
        let (state, _) = run(&[Outcome::Unauthorized, Outcome::Unauthorized]);
        assert_eq!(state, SessionState::Degraded { failures: 2 });
        assert_eq!(state.fail_count(), 2);
    }

    #[test]
    fn success_resets_from_any_state() {
        let (state, _) = run(&[Outcome::Unauthorized, Outcome::Unauthorized, Outcome::Success]);
        assert_eq!(state, SessionState::Active);

        let (next, action) = SessionState::Revoked.on_outcome(Outcome::Success);
        assert_eq!(next, SessionState::Active);
        assert_eq!(action, Action::None);
    }

    #[test]
    fn transport_failures_do_not_count() {
        use Outcome::{Failed as F, Unauthorized as U};
        let (state, actions) = run(&[U, F, F, U, F]);
        assert_eq!(state, SessionState::Degraded { failures: 2 });
        assert!(actions.iter().all(|a| *a == Action::None));
    }

    #[test]
    fn resumed_session_keeps_counting() {
        let state = SessionState::resume(2);
        assert_eq!(state, SessionState::Degraded { failures: 2 });
        assert_eq!(state.on_outcome(Outcome::Unauthorized).1, Action::Revoke);
        assert_eq!(SessionState::resume(0), SessionState::Active);
    }

    #[test]
    fn new_token_reactivates() {
        assert_eq!(SessionState::Revoked.on_token_installed(), SessionState::Active);
    }

    #[test]
    fn outcome_classifies_errors() {
        assert_eq!(Outcome::from(&Error::Unauthorized), Outcome::Unauthorized);
        assert_eq!(Outcome::from(&Error::Network("reset".into())), Outcome::Failed);
        assert_eq!(
            Outcome::from(&Error::Rejected {
                status: 500,
                message: String::new()
            }),
            Outcome::Failed
        );
        assert_eq!(Outcome::of(&Ok::<(), Error>(())), Outcome::Success);
    }
}
