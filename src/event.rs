//! Engine event system.
//!
//! State changes are fanned out to subscribers (UI, logging) over a
//! broadcast channel so that a slow subscriber never blocks the polling
//! scheduler. For a single payment, events are delivered in the order the
//! transitions were applied; across payments no ordering is guaranteed.

use crate::tracker::{PaymentId, SessionState};
use tokio::sync::broadcast;

/// Events emitted by the tracking engine.
#[derive(Debug, Clone)]
pub enum PaymentEvent {
    /// An observable field of a session changed.
    ///
    /// `previous` and `next` may be equal when only the confirmation count
    /// moved, letting subscribers refresh counters.
    StateChanged {
        /// Payment whose session changed.
        payment_id: PaymentId,
        /// State before the transition.
        previous: SessionState,
        /// State after the transition.
        next: SessionState,
        /// Confirmations after the transition.
        confirmations: u64,
        /// Required confirmations after the transition.
        required_confirmations: u64,
    },

    /// A verification query failed. Non-fatal: the session is unchanged and
    /// the query is retried on the normal cadence.
    PollFailed {
        /// Payment whose query failed.
        payment_id: PaymentId,
        /// Description of the failure.
        error: String,
    },

    /// The session was cancelled by the caller before reaching a terminal
    /// state.
    Cancelled {
        /// Payment whose session was cancelled.
        payment_id: PaymentId,
    },
}

impl PaymentEvent {
    /// The payment this event concerns.
    #[must_use]
    pub fn payment_id(&self) -> &PaymentId {
        match self {
            Self::StateChanged { payment_id, .. }
            | Self::PollFailed { payment_id, .. }
            | Self::Cancelled { payment_id } => payment_id,
        }
    }
}

/// Channel for receiving engine events.
pub type PaymentEventsChannel = broadcast::Receiver<PaymentEvent>;

/// Sender for engine events.
pub type PaymentEventsSender = broadcast::Sender<PaymentEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel(buffer: usize) -> (PaymentEventsSender, PaymentEventsChannel) {
    broadcast::channel(buffer)
}

/// Receiver filtered down to a single payment's events.
#[derive(Debug)]
pub struct PaymentEvents {
    id: PaymentId,
    rx: PaymentEventsChannel,
}

impl PaymentEvents {
    pub(crate) fn new(id: PaymentId, rx: PaymentEventsChannel) -> Self {
        Self { id, rx }
    }

    /// The payment this receiver is filtered to.
    #[must_use]
    pub fn payment_id(&self) -> &PaymentId {
        &self.id
    }

    /// Receive the next event for this payment, skipping events for other
    /// payments.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is closed or this receiver lagged
    /// behind the broadcast buffer.
    pub async fn recv(&mut self) -> Result<PaymentEvent, broadcast::error::RecvError> {
        loop {
            let event = self.rx.recv().await?;
            if event.payment_id() == &self.id {
                return Ok(event);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_filtered_receiver_skips_other_payments() {
        let (tx, rx) = create_event_channel(16);
        let mut events = PaymentEvents::new(PaymentId::new("P1"), rx);

        tx.send(PaymentEvent::Cancelled {
            payment_id: PaymentId::new("P2"),
        })
        .expect("should send");
        tx.send(PaymentEvent::Cancelled {
            payment_id: PaymentId::new("P1"),
        })
        .expect("should send");

        let event = events.recv().await.expect("should receive");
        assert_eq!(event.payment_id(), &PaymentId::new("P1"));
    }
}
