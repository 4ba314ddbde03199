//! Contract with the external Verification Authority.
//!
//! The engine never talks to a blockchain itself. It asks a
//! [`VerificationClient`] "what is the current status of payment P?" and
//! interprets the answer. The transport behind the client (HTTP RPC, wallet
//! daemon, ...) is an external concern.

use crate::error::Result;
use crate::tracker::PaymentId;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Status reported by the Verification Authority for one payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    /// No payment seen yet.
    Pending,
    /// Payment seen but below the confirmation threshold.
    PaidUnconfirmed,
    /// Payment fully confirmed.
    Confirmed,
    /// The authority considers the payment window closed.
    Expired,
    /// The authority reports the payment as unrecoverably errored.
    Error,
}

/// One answer from the Verification Authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Reported payment status.
    pub status: RemoteStatus,
    /// Confirmations accumulated so far.
    #[serde(default)]
    pub confirmations: u64,
    /// Confirmations the authority requires for this payment. Zero means
    /// "not reported"; the session keeps its registered threshold.
    #[serde(default)]
    pub required_confirmations: u64,
}

impl StatusReport {
    /// Convenience constructor.
    #[must_use]
    pub fn new(status: RemoteStatus, confirmations: u64, required_confirmations: u64) -> Self {
        Self {
            status,
            confirmations,
            required_confirmations,
        }
    }
}

/// Client for the external Verification Authority.
///
/// `check_status` must be an idempotent read: safe to call repeatedly, with
/// no assumption that any prior call succeeded. The engine bounds each call
/// with its configured query timeout and retries failures on the normal
/// polling cadence.
pub trait VerificationClient: Send + Sync + 'static {
    /// Query the authority for the current status of `payment_id`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Verification`] if the query fails or the
    /// answer is malformed. Such failures are transient from the engine's
    /// point of view.
    fn check_status(
        &self,
        payment_id: &PaymentId,
    ) -> impl Future<Output = Result<StatusReport>> + Send;
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_status_wire_names() {
        let json = serde_json::to_string(&RemoteStatus::PaidUnconfirmed).expect("should encode");
        assert_eq!(json, "\"paid_unconfirmed\"");

        let status: RemoteStatus = serde_json::from_str("\"confirmed\"").expect("should decode");
        assert_eq!(status, RemoteStatus::Confirmed);
    }

    #[test]
    fn test_report_missing_counts_default_to_zero() {
        let report: StatusReport =
            serde_json::from_str(r#"{"status":"pending"}"#).expect("should decode");
        assert_eq!(report.status, RemoteStatus::Pending);
        assert_eq!(report.confirmations, 0);
        assert_eq!(report.required_confirmations, 0);
    }
}
