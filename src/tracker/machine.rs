//! Pure state-transition logic for tracked payments.
//!
//! [`step`] has no side effects and no clock: it maps (current observable
//! fields, one input) to the next observable fields. The scheduler and the
//! registry feed it and act on the verdict.

use super::session::SessionState;
use crate::verify::{RemoteStatus, StatusReport};

/// One input fed into the state machine for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A successful verification answer.
    Report(StatusReport),
    /// The session's wall-clock deadline elapsed.
    DeadlineExceeded,
    /// The caller reported an unrecoverable provider error.
    Failure,
}

/// Result of applying one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// State after the transition.
    pub next: SessionState,
    /// Confirmations after the transition.
    pub confirmations: u64,
    /// Required confirmations after the transition.
    pub required_confirmations: u64,
    /// Whether any observable field changed. Drives event emission: equal
    /// states with a moved confirmation count still count as changed.
    pub changed: bool,
}

/// Apply one input to a session's observable fields.
///
/// Terminal states absorb every input: the verdict echoes the current
/// fields with `changed = false`. Confirmations never decrease while the
/// session is non-terminal; a lower report is clamped to the current count.
#[must_use]
pub fn step(
    state: SessionState,
    confirmations: u64,
    required_confirmations: u64,
    input: &Input,
) -> Verdict {
    if state.is_terminal() {
        return Verdict {
            next: state,
            confirmations,
            required_confirmations,
            changed: false,
        };
    }

    match input {
        Input::DeadlineExceeded => Verdict {
            next: SessionState::Expired,
            confirmations,
            required_confirmations,
            changed: true,
        },
        Input::Failure => Verdict {
            next: SessionState::Failed,
            confirmations,
            required_confirmations,
            changed: true,
        },
        Input::Report(report) => apply_report(state, confirmations, required_confirmations, report),
    }
}

fn apply_report(
    state: SessionState,
    confirmations: u64,
    required_confirmations: u64,
    report: &StatusReport,
) -> Verdict {
    let new_confirmations = confirmations.max(report.confirmations);
    // The Verification Authority is authoritative for the threshold when it
    // reports one; zero means "not reported".
    let new_required = if report.required_confirmations > 0 {
        report.required_confirmations
    } else {
        required_confirmations
    };

    let next = match report.status {
        RemoteStatus::Expired => SessionState::Expired,
        RemoteStatus::Error => SessionState::Failed,
        RemoteStatus::Confirmed => SessionState::Confirmed,
        RemoteStatus::Pending | RemoteStatus::PaidUnconfirmed => {
            if new_confirmations >= new_required {
                // May skip PaidUnconfirmed entirely.
                SessionState::Confirmed
            } else if report.status == RemoteStatus::PaidUnconfirmed {
                SessionState::PaidUnconfirmed
            } else {
                // A pending answer never regresses a session that already
                // saw the payment.
                state
            }
        }
    };

    Verdict {
        next,
        confirmations: new_confirmations,
        required_confirmations: new_required,
        changed: next != state
            || new_confirmations != confirmations
            || new_required != required_confirmations,
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn report(status: RemoteStatus, confirmations: u64, required: u64) -> Input {
        Input::Report(StatusReport::new(status, confirmations, required))
    }

    #[test]
    fn test_pending_stays_pending_without_payment() {
        let verdict = step(
            SessionState::Pending,
            0,
            2,
            &report(RemoteStatus::Pending, 0, 2),
        );
        assert_eq!(verdict.next, SessionState::Pending);
        assert!(!verdict.changed);
    }

    #[test]
    fn test_pending_to_paid_unconfirmed() {
        let verdict = step(
            SessionState::Pending,
            0,
            2,
            &report(RemoteStatus::PaidUnconfirmed, 1, 2),
        );
        assert_eq!(verdict.next, SessionState::PaidUnconfirmed);
        assert_eq!(verdict.confirmations, 1);
        assert!(verdict.changed);
    }

    #[test]
    fn test_pending_skips_straight_to_confirmed() {
        let verdict = step(
            SessionState::Pending,
            0,
            2,
            &report(RemoteStatus::PaidUnconfirmed, 2, 2),
        );
        assert_eq!(verdict.next, SessionState::Confirmed);
    }

    #[test]
    fn test_paid_unconfirmed_counts_up() {
        let verdict = step(
            SessionState::PaidUnconfirmed,
            1,
            3,
            &report(RemoteStatus::PaidUnconfirmed, 2, 3),
        );
        assert_eq!(verdict.next, SessionState::PaidUnconfirmed);
        assert_eq!(verdict.confirmations, 2);
        // Same state, moved counter: still an observable change.
        assert!(verdict.changed);
    }

    #[test]
    fn test_paid_unconfirmed_to_confirmed() {
        let verdict = step(
            SessionState::PaidUnconfirmed,
            1,
            2,
            &report(RemoteStatus::Confirmed, 2, 2),
        );
        assert_eq!(verdict.next, SessionState::Confirmed);
        assert!(verdict.changed);
    }

    #[test]
    fn test_confirmation_overshoot_is_legal() {
        let verdict = step(
            SessionState::Pending,
            0,
            2,
            &report(RemoteStatus::Confirmed, 3, 2),
        );
        assert_eq!(verdict.next, SessionState::Confirmed);
        assert_eq!(verdict.confirmations, 3);
    }

    #[test]
    fn test_confirmations_never_decrease() {
        let verdict = step(
            SessionState::PaidUnconfirmed,
            2,
            5,
            &report(RemoteStatus::PaidUnconfirmed, 1, 5),
        );
        assert_eq!(verdict.confirmations, 2);
        assert!(!verdict.changed);
    }

    #[test]
    fn test_pending_answer_never_regresses_paid_session() {
        let verdict = step(
            SessionState::PaidUnconfirmed,
            1,
            2,
            &report(RemoteStatus::Pending, 0, 2),
        );
        assert_eq!(verdict.next, SessionState::PaidUnconfirmed);
        assert_eq!(verdict.confirmations, 1);
    }

    #[test]
    fn test_authority_threshold_is_authoritative() {
        let verdict = step(
            SessionState::Pending,
            0,
            10,
            &report(RemoteStatus::PaidUnconfirmed, 2, 2),
        );
        // The registered threshold of 10 yields to the authority's 2.
        assert_eq!(verdict.required_confirmations, 2);
        assert_eq!(verdict.next, SessionState::Confirmed);
    }

    #[test]
    fn test_unreported_threshold_keeps_registered_value() {
        let verdict = step(
            SessionState::Pending,
            0,
            2,
            &report(RemoteStatus::PaidUnconfirmed, 1, 0),
        );
        assert_eq!(verdict.required_confirmations, 2);
        assert_eq!(verdict.next, SessionState::PaidUnconfirmed);
    }

    #[test]
    fn test_deadline_exceeded_expires_non_terminal() {
        for state in [SessionState::Pending, SessionState::PaidUnconfirmed] {
            let verdict = step(state, 1, 2, &Input::DeadlineExceeded);
            assert_eq!(verdict.next, SessionState::Expired);
            assert!(verdict.changed);
        }
    }

    #[test]
    fn test_remote_expired_maps_to_expired() {
        let verdict = step(
            SessionState::PaidUnconfirmed,
            1,
            2,
            &report(RemoteStatus::Expired, 1, 2),
        );
        assert_eq!(verdict.next, SessionState::Expired);
    }

    #[test]
    fn test_remote_error_maps_to_failed() {
        let verdict = step(
            SessionState::Pending,
            0,
            2,
            &report(RemoteStatus::Error, 0, 2),
        );
        assert_eq!(verdict.next, SessionState::Failed);
    }

    #[test]
    fn test_terminal_states_absorb_everything() {
        let inputs = [
            report(RemoteStatus::Confirmed, 99, 2),
            Input::DeadlineExceeded,
            Input::Failure,
        ];
        for state in [
            SessionState::Confirmed,
            SessionState::Expired,
            SessionState::Failed,
        ] {
            for input in &inputs {
                let verdict = step(state, 3, 2, input);
                assert_eq!(verdict.next, state);
                assert_eq!(verdict.confirmations, 3);
                assert!(!verdict.changed);
            }
        }
    }

    fn arb_status() -> impl Strategy<Value = RemoteStatus> {
        prop_oneof![
            Just(RemoteStatus::Pending),
            Just(RemoteStatus::PaidUnconfirmed),
            Just(RemoteStatus::Confirmed),
            Just(RemoteStatus::Expired),
            Just(RemoteStatus::Error),
        ]
    }

    fn arb_input() -> impl Strategy<Value = Input> {
        prop_oneof![
            (arb_status(), 0u64..20, 0u64..10)
                .prop_map(|(s, c, r)| Input::Report(StatusReport::new(s, c, r))),
            Just(Input::DeadlineExceeded),
            Just(Input::Failure),
        ]
    }

    proptest! {
        #[test]
        fn prop_confirmations_monotonic_until_terminal(inputs in prop::collection::vec(arb_input(), 1..40)) {
            let mut state = SessionState::Pending;
            let mut confirmations = 0u64;
            let mut required = 2u64;

            for input in &inputs {
                let verdict = step(state, confirmations, required, input);
                if !state.is_terminal() {
                    prop_assert!(verdict.confirmations >= confirmations);
                }
                state = verdict.next;
                confirmations = verdict.confirmations;
                required = verdict.required_confirmations;
            }
        }

        #[test]
        fn prop_terminal_states_are_absorbing(inputs in prop::collection::vec(arb_input(), 1..40)) {
            let mut state = SessionState::Pending;
            let mut confirmations = 0u64;
            let mut required = 2u64;
            let mut terminal: Option<SessionState> = None;

            for input in &inputs {
                let verdict = step(state, confirmations, required, input);
                if let Some(t) = terminal {
                    prop_assert_eq!(verdict.next, t);
                    prop_assert!(!verdict.changed);
                } else if verdict.next.is_terminal() {
                    terminal = Some(verdict.next);
                }
                state = verdict.next;
                confirmations = verdict.confirmations;
                required = verdict.required_confirmations;
            }
        }
    }
}
