//! Confirmation-tracking engine for asynchronous, externally verified
//! cryptocurrency payments.
//!
//! The engine tracks each in-flight payment from registration to a terminal
//! outcome (`Confirmed`, `Expired`, or `Failed`) without blocking the
//! caller while the underlying transaction accumulates confirmations. It
//! decides when and how often to query a Verification Authority, interprets
//! the answers through a pure state machine, enforces a per-session expiry
//! deadline, and fans out structured events to subscribers. Rendering,
//! payment origination, and the verification transport are all external
//! collaborators.
//!
//! # Example
//!
//! ```no_run
//! use payment_tracker::{
//!     PaymentId, RemoteStatus, Result, SessionRegistry, StatusReport, TrackerConfig,
//!     VerificationClient,
//! };
//! use std::future::Future;
//!
//! struct RpcClient;
//!
//! impl VerificationClient for RpcClient {
//!     fn check_status(
//!         &self,
//!         _payment_id: &PaymentId,
//!     ) -> impl Future<Output = Result<StatusReport>> + Send {
//!         async { Ok(StatusReport::new(RemoteStatus::Pending, 0, 2)) }
//!     }
//! }
//!
//! # async fn run() -> Result<()> {
//! let registry = SessionRegistry::new(TrackerConfig::default(), RpcClient)?;
//! let handle = registry.register("payment-123", 2, None)?;
//!
//! let mut events = handle.subscribe();
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod tracker;
pub mod verify;

pub use config::TrackerConfig;
pub use error::{Error, Result};
pub use event::{PaymentEvent, PaymentEvents, PaymentEventsChannel, PaymentEventsSender};
pub use tracker::{PaymentId, SessionHandle, SessionRegistry, SessionSnapshot, SessionState};
pub use verify::{RemoteStatus, StatusReport, VerificationClient};
