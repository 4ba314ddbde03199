//! Per-session driver: polling cadence and expiry deadline.
//!
//! Each live session is owned by exactly one tokio task. The task is the
//! single writer for that session, which serializes all transitions, and it
//! races every wait against the expiry deadline and the cancellation signal.
//! The `biased` select ordering puts the deadline ahead of an in-flight
//! verification result, so expiry wins a same-instant race and a session is
//! never reported confirmed after its deadline.

use super::machine::{self, Input};
use super::registry::Inner;
use super::session::{Session, SessionState};
use crate::error::{Error, Result};
use crate::event::{PaymentEvent, PaymentEventsSender};
use crate::tracker::PaymentId;
use crate::verify::{StatusReport, VerificationClient};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

/// Why the driver stopped.
#[derive(Debug)]
enum StopReason {
    /// The registry tore the session down (cancel, failure report, or
    /// engine shutdown); the map entry is already gone.
    Cancelled,
    /// The session reached a terminal state under this driver.
    Terminal(SessionState),
}

/// What ended the wait for the next poll.
enum Armed {
    Cancelled,
    Deadline,
    Poll,
}

/// What ended an outstanding verification query.
enum Polled {
    Cancelled,
    Deadline,
    Result(Result<StatusReport>),
}

pub(crate) struct Driver<C> {
    id: PaymentId,
    session: Arc<Mutex<Session>>,
    deadline: Instant,
    client: Arc<C>,
    events: PaymentEventsSender,
    cancel_rx: watch::Receiver<bool>,
    force_rx: mpsc::Receiver<()>,
    permits: Arc<Semaphore>,
    query_timeout: Duration,
    pending_interval: Duration,
    unconfirmed_interval: Duration,
    inner: Weak<Inner<C>>,
}

impl<C: VerificationClient> Driver<C> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: PaymentId,
        session: Arc<Mutex<Session>>,
        deadline: Instant,
        client: Arc<C>,
        events: PaymentEventsSender,
        cancel_rx: watch::Receiver<bool>,
        force_rx: mpsc::Receiver<()>,
        permits: Arc<Semaphore>,
        query_timeout: Duration,
        pending_interval: Duration,
        unconfirmed_interval: Duration,
        inner: Weak<Inner<C>>,
    ) -> Self {
        Self {
            id,
            session,
            deadline,
            client,
            events,
            cancel_rx,
            force_rx,
            permits,
            query_timeout,
            pending_interval,
            unconfirmed_interval,
            inner,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!(payment = %self.id, "session driver started");

        match self.drive().await {
            StopReason::Cancelled => {
                debug!(payment = %self.id, "session driver stopped after teardown");
            }
            StopReason::Terminal(state) => {
                if let Some(inner) = self.inner.upgrade() {
                    inner.remove(&self.id);
                }
                debug!(payment = %self.id, %state, "session driver stopped in terminal state");
            }
        }
    }

    async fn drive(&mut self) -> StopReason {
        loop {
            let interval = self.arm_interval();

            let armed = tokio::select! {
                biased;
                _ = self.cancel_rx.changed() => Armed::Cancelled,
                () = time::sleep_until(self.deadline) => Armed::Deadline,
                _ = self.force_rx.recv() => Armed::Poll,
                () = time::sleep(interval) => Armed::Poll,
            };

            match armed {
                Armed::Cancelled => return StopReason::Cancelled,
                Armed::Deadline => return self.expire(),
                Armed::Poll => {}
            }

            {
                let mut session = self.session.lock();
                session.poll_in_flight = true;
                session.last_poll_at = Some(Instant::now());
            }

            let polled = tokio::select! {
                biased;
                _ = self.cancel_rx.changed() => Polled::Cancelled,
                // Expiry wins over an in-flight result; the late response
                // is discarded.
                () = time::sleep_until(self.deadline) => Polled::Deadline,
                result = Self::query(&self.client, &self.id, &self.permits, self.query_timeout) => {
                    Polled::Result(result)
                }
            };

            self.session.lock().poll_in_flight = false;

            match polled {
                Polled::Cancelled => return StopReason::Cancelled,
                Polled::Deadline => return self.expire(),
                Polled::Result(result) => {
                    // Force requests issued while the query was outstanding
                    // are satisfied by the result that just arrived.
                    while self.force_rx.try_recv().is_ok() {}

                    match result {
                        Ok(report) => {
                            let state =
                                apply_input(&self.session, &self.events, &Input::Report(report));
                            if state.is_terminal() {
                                return StopReason::Terminal(state);
                            }
                        }
                        Err(e) => {
                            debug!(payment = %self.id, error = %e, "verification query failed, retrying on cadence");
                            let _ = self.events.send(PaymentEvent::PollFailed {
                                payment_id: self.id.clone(),
                                error: e.to_string(),
                            });
                        }
                    }
                }
            }
        }
    }

    fn expire(&self) -> StopReason {
        self.session.lock().poll_in_flight = false;
        let state = apply_input(&self.session, &self.events, &Input::DeadlineExceeded);
        StopReason::Terminal(state)
    }

    /// Cadence for the session's current state. Recomputed before every
    /// wait, so entering `PaidUnconfirmed` re-arms at the faster cadence
    /// immediately instead of waiting out the slow period.
    fn arm_interval(&self) -> Duration {
        let mut session = self.session.lock();
        let interval = match session.state {
            SessionState::PaidUnconfirmed => self.unconfirmed_interval,
            _ => self.pending_interval,
        };
        session.next_poll_interval = interval;
        interval
    }

    async fn query(
        client: &C,
        id: &PaymentId,
        permits: &Semaphore,
        query_timeout: Duration,
    ) -> Result<StatusReport> {
        let _permit = permits
            .acquire()
            .await
            .map_err(|_| Error::Verification("query pool closed".to_string()))?;

        debug!(payment = %id, "dispatching verification query");
        match time::timeout(query_timeout, client.check_status(id)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Verification(format!(
                "verification query timed out after {}s",
                query_timeout.as_secs()
            ))),
        }
    }
}

/// Apply one input to a session and emit the resulting event.
///
/// The lock is held across the transition and the broadcast send, so
/// subscribers observe a session's events in the order they were applied.
pub(crate) fn apply_input(
    session: &Mutex<Session>,
    events: &PaymentEventsSender,
    input: &Input,
) -> SessionState {
    let mut session = session.lock();
    let previous = session.state;

    if previous.is_terminal() {
        warn!(payment = %session.id, state = %previous, "ignoring input for terminal session");
        return previous;
    }

    let verdict = machine::step(
        previous,
        session.confirmations,
        session.required_confirmations,
        input,
    );

    session.state = verdict.next;
    session.confirmations = verdict.confirmations;
    session.required_confirmations = verdict.required_confirmations;
    if verdict.next.is_terminal() {
        session.poll_in_flight = false;
        info!(
            payment = %session.id,
            state = %verdict.next,
            confirmations = verdict.confirmations,
            "payment session reached terminal state"
        );
    } else if verdict.changed {
        debug!(
            payment = %session.id,
            previous = %previous,
            next = %verdict.next,
            confirmations = verdict.confirmations,
            "payment session updated"
        );
    }

    if verdict.changed {
        let _ = events.send(PaymentEvent::StateChanged {
            payment_id: session.id.clone(),
            previous,
            next: verdict.next,
            confirmations: verdict.confirmations,
            required_confirmations: verdict.required_confirmations,
        });
    }

    verdict.next
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::event::create_event_channel;
    use crate::verify::RemoteStatus;

    fn test_session() -> Arc<Mutex<Session>> {
        Arc::new(Mutex::new(Session::new(
            PaymentId::new("P1"),
            2,
            Instant::now() + Duration::from_secs(900),
            Duration::from_secs(60),
        )))
    }

    #[tokio::test]
    async fn test_apply_input_emits_state_changed() {
        let session = test_session();
        let (tx, mut rx) = create_event_channel(16);

        let state = apply_input(
            &session,
            &tx,
            &Input::Report(StatusReport::new(RemoteStatus::PaidUnconfirmed, 1, 2)),
        );
        assert_eq!(state, SessionState::PaidUnconfirmed);

        match rx.recv().await.expect("should receive") {
            PaymentEvent::StateChanged {
                previous,
                next,
                confirmations,
                ..
            } => {
                assert_eq!(previous, SessionState::Pending);
                assert_eq!(next, SessionState::PaidUnconfirmed);
                assert_eq!(confirmations, 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_apply_input_silent_when_nothing_changed() {
        let session = test_session();
        let (tx, mut rx) = create_event_channel(16);

        let state = apply_input(
            &session,
            &tx,
            &Input::Report(StatusReport::new(RemoteStatus::Pending, 0, 2)),
        );
        assert_eq!(state, SessionState::Pending);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_apply_input_ignores_terminal_session() {
        let session = test_session();
        let (tx, mut rx) = create_event_channel(16);

        apply_input(&session, &tx, &Input::DeadlineExceeded);
        assert!(rx.try_recv().is_ok());

        // A confirming report after expiry is discarded.
        let state = apply_input(
            &session,
            &tx,
            &Input::Report(StatusReport::new(RemoteStatus::Confirmed, 5, 2)),
        );
        assert_eq!(state, SessionState::Expired);
        assert!(rx.try_recv().is_err());
        assert!(!session.lock().poll_in_flight);
    }
}
