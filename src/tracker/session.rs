//! Session entity: one tracked payment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Opaque payment identifier, unique among live sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PaymentId(String);

impl PaymentId {
    /// Create a payment identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PaymentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PaymentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Lifecycle state of a tracked payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No payment seen yet.
    Pending,
    /// Payment seen, awaiting confirmations.
    PaidUnconfirmed,
    /// Payment reached the required confirmation count. Terminal.
    Confirmed,
    /// The payment window elapsed before confirmation. Terminal.
    Expired,
    /// The caller reported an unrecoverable provider error. Terminal.
    Failed,
}

impl SessionState {
    /// Whether this state admits no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Expired | Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::PaidUnconfirmed => "paid_unconfirmed",
            Self::Confirmed => "confirmed",
            Self::Expired => "expired",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One tracked payment.
///
/// Mutated only by the state machine in response to poll results, expiry,
/// or a caller-reported failure; all mutation happens under the session's
/// mutex, never across an await point.
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) id: PaymentId,
    pub(crate) state: SessionState,
    pub(crate) confirmations: u64,
    pub(crate) required_confirmations: u64,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) deadline: Instant,
    pub(crate) last_poll_at: Option<Instant>,
    pub(crate) next_poll_interval: Duration,
    pub(crate) poll_in_flight: bool,
}

impl Session {
    pub(crate) fn new(
        id: PaymentId,
        required_confirmations: u64,
        deadline: Instant,
        initial_interval: Duration,
    ) -> Self {
        Self {
            id,
            state: SessionState::Pending,
            confirmations: 0,
            required_confirmations,
            created_at: Utc::now(),
            deadline,
            last_poll_at: None,
            next_poll_interval: initial_interval,
            poll_in_flight: false,
        }
    }

    /// The payment identifier.
    #[must_use]
    pub fn id(&self) -> &PaymentId {
        &self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Confirmations accumulated so far.
    #[must_use]
    pub fn confirmations(&self) -> u64 {
        self.confirmations
    }

    /// Confirmations required for this payment.
    #[must_use]
    pub fn required_confirmations(&self) -> u64 {
        self.required_confirmations
    }

    /// When the session was registered.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time left until the expiry deadline.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Point-in-time view for UI rendering.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            payment_id: self.id.clone(),
            state: self.state,
            confirmations: self.confirmations,
            required_confirmations: self.required_confirmations,
            remaining_secs: self.remaining().as_secs(),
        }
    }
}

/// Synchronous view of a session for initial UI render and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Payment identifier.
    pub payment_id: PaymentId,
    /// Current state.
    pub state: SessionState,
    /// Confirmations accumulated so far.
    pub confirmations: u64,
    /// Confirmations required.
    pub required_confirmations: u64,
    /// Seconds left until expiry.
    pub remaining_secs: u64,
}
