//! Payment confirmation tracking.
//!
//! One registry owns many concurrent sessions; each session is driven by a
//! single task that decides when to poll the Verification Authority and
//! when to give up.
//!
//! # Control flow
//!
//! ```text
//! register(id, required, ttl)
//!        │
//!        ▼
//! ┌──────────────────┐    per session    ┌─────────────────────────┐
//! │ SessionRegistry  │──── spawns ──────▶│ driver task             │
//! └──────────────────┘                   │  poll timer ── query ──▶│ StateMachine
//!        ▲                               │  expiry deadline ──────▶│   │
//!        │ cancel / force_check /        └─────────────────────────┘   │
//!        │ report_failure                                              ▼
//!        │                                               events (StateChanged,
//!        └── terminal state removes session ◀──────────── PollFailed, Cancelled)
//! ```
//!
//! A terminal state (`Confirmed`, `Expired`, `Failed`) stops the driver and
//! removes the session; expiry beats a simultaneously arriving confirmation.

mod machine;
mod registry;
mod scheduler;
mod session;

pub use machine::{step, Input, Verdict};
pub use registry::{SessionHandle, SessionRegistry};
pub use session::{PaymentId, SessionSnapshot, SessionState};
