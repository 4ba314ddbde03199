//! Session registry: the engine's public API surface.
//!
//! Owns the set of live sessions and, for each one, the driver task that
//! polls the Verification Authority and watches the expiry deadline. The
//! registry is exclusively responsible for starting and stopping drivers,
//! so a torn-down session can never leave an orphaned timer behind.

use super::machine::Input;
use super::scheduler::{apply_input, Driver};
use super::session::{Session, SessionSnapshot};
use crate::config::TrackerConfig;
use crate::error::{Error, Result};
use crate::event::{
    create_event_channel, PaymentEvent, PaymentEvents, PaymentEventsChannel, PaymentEventsSender,
};
use crate::tracker::PaymentId;
use crate::verify::VerificationClient;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub(crate) struct Inner<C> {
    config: TrackerConfig,
    client: Arc<C>,
    sessions: Mutex<HashMap<PaymentId, SessionEntry>>,
    events: PaymentEventsSender,
    query_permits: Arc<Semaphore>,
}

impl<C> Inner<C> {
    pub(crate) fn remove(&self, id: &PaymentId) {
        self.sessions.lock().remove(id);
    }
}

struct SessionEntry {
    session: Arc<Mutex<Session>>,
    cancel_tx: watch::Sender<bool>,
    force_tx: mpsc::Sender<()>,
}

/// Handle to one registered session, returned by [`SessionRegistry::register`].
#[derive(Debug)]
pub struct SessionHandle {
    id: PaymentId,
    session: Arc<Mutex<Session>>,
    events: PaymentEventsSender,
}

impl SessionHandle {
    /// The payment this handle tracks.
    #[must_use]
    pub fn id(&self) -> &PaymentId {
        &self.id
    }

    /// Synchronous point-in-time view of the session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().snapshot()
    }

    /// Subscribe to this payment's events.
    #[must_use]
    pub fn subscribe(&self) -> PaymentEvents {
        PaymentEvents::new(self.id.clone(), self.events.subscribe())
    }
}

/// Registry of live payment sessions.
///
/// Cheap to clone; clones share the same session set and event channel.
pub struct SessionRegistry<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for SessionRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: VerificationClient> SessionRegistry<C> {
    /// Create a registry with the given configuration and verification
    /// client.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: TrackerConfig, client: C) -> Result<Self> {
        config.validate()?;
        let (events, _) = create_event_channel(config.event_buffer);
        let query_permits = Arc::new(Semaphore::new(config.max_concurrent_queries));

        info!(
            pending_poll_secs = config.pending_poll_secs,
            unconfirmed_poll_secs = config.unconfirmed_poll_secs,
            max_concurrent_queries = config.max_concurrent_queries,
            "payment session registry initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                client: Arc::new(client),
                sessions: Mutex::new(HashMap::new()),
                events,
                query_permits,
            }),
        })
    }

    /// Begin tracking a payment.
    ///
    /// Starts the polling scheduler and the expiry timer for the session.
    /// `ttl` defaults to the configured session time-to-live when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateSession`] if the identifier is already
    /// tracked, or [`Error::Config`] if `required_confirmations` or the
    /// ttl is zero.
    pub fn register(
        &self,
        id: impl Into<PaymentId>,
        required_confirmations: u64,
        ttl: Option<Duration>,
    ) -> Result<SessionHandle> {
        let id = id.into();
        if required_confirmations == 0 {
            return Err(Error::Config(
                "required_confirmations must be positive".to_string(),
            ));
        }
        let ttl = ttl.unwrap_or_else(|| self.inner.config.default_ttl());
        if ttl.is_zero() {
            return Err(Error::Config("session ttl must be positive".to_string()));
        }

        let deadline = Instant::now() + ttl;
        let session = Arc::new(Mutex::new(Session::new(
            id.clone(),
            required_confirmations,
            deadline,
            self.inner.config.pending_interval(),
        )));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        // Capacity 1: a force request while one is queued or in flight is
        // coalesced, never duplicated.
        let (force_tx, force_rx) = mpsc::channel(1);

        {
            let mut sessions = self.inner.sessions.lock();
            if sessions.contains_key(&id) {
                return Err(Error::DuplicateSession(id));
            }
            sessions.insert(
                id.clone(),
                SessionEntry {
                    session: Arc::clone(&session),
                    cancel_tx,
                    force_tx,
                },
            );
        }

        let driver = Driver::new(
            id.clone(),
            Arc::clone(&session),
            deadline,
            Arc::clone(&self.inner.client),
            self.inner.events.clone(),
            cancel_rx,
            force_rx,
            Arc::clone(&self.inner.query_permits),
            self.inner.config.query_timeout(),
            self.inner.config.pending_interval(),
            self.inner.config.unconfirmed_interval(),
            Arc::downgrade(&self.inner),
        );
        tokio::spawn(driver.run());

        info!(
            payment = %id,
            required_confirmations,
            ttl_secs = ttl.as_secs(),
            "payment session registered"
        );

        Ok(SessionHandle {
            id,
            session,
            events: self.inner.events.clone(),
        })
    }

    /// Synchronous point-in-time view of a session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSession`] if the payment is not tracked.
    pub fn snapshot(&self, id: &PaymentId) -> Result<SessionSnapshot> {
        let sessions = self.inner.sessions.lock();
        let entry = sessions
            .get(id)
            .ok_or_else(|| Error::UnknownSession(id.clone()))?;
        let snapshot = entry.session.lock().snapshot();
        Ok(snapshot)
    }

    /// Subscribe to events for all tracked payments.
    #[must_use]
    pub fn subscribe(&self) -> PaymentEventsChannel {
        self.inner.events.subscribe()
    }

    /// Subscribe to events for a single payment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSession`] if the payment is not tracked.
    pub fn subscribe_payment(&self, id: &PaymentId) -> Result<PaymentEvents> {
        let sessions = self.inner.sessions.lock();
        if !sessions.contains_key(id) {
            return Err(Error::UnknownSession(id.clone()));
        }
        Ok(PaymentEvents::new(id.clone(), self.inner.events.subscribe()))
    }

    /// Request an immediate out-of-band verification check.
    ///
    /// Respects the in-flight guard: a forced check while a query is
    /// already outstanding is coalesced into it rather than duplicated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSession`] if the payment is not tracked.
    pub fn force_check(&self, id: &PaymentId) -> Result<()> {
        let sessions = self.inner.sessions.lock();
        let entry = sessions
            .get(id)
            .ok_or_else(|| Error::UnknownSession(id.clone()))?;

        debug!(payment = %id, "out-of-band verification check requested");
        match entry.force_tx.try_send(()) {
            // Full: a check is already queued or in flight; coalesce.
            // Closed: the driver is stopping; the session is on its way out.
            Ok(()) | Err(mpsc::error::TrySendError::Full(()) | mpsc::error::TrySendError::Closed(())) => {
                Ok(())
            }
        }
    }

    /// Stop tracking a payment before it reaches a terminal state.
    ///
    /// Stops the scheduler and expiry timer, removes the session, and emits
    /// one `Cancelled` event. Idempotent: cancelling an identifier that is
    /// not tracked is a no-op. Effective immediately for future scheduling;
    /// a verification response already in flight is discarded on arrival.
    pub fn cancel(&self, id: &PaymentId) {
        let entry = self.inner.sessions.lock().remove(id);
        let Some(entry) = entry else {
            debug!(payment = %id, "cancel for untracked payment ignored");
            return;
        };

        let _ = entry.cancel_tx.send(true);
        entry.session.lock().poll_in_flight = false;
        let _ = self.inner.events.send(PaymentEvent::Cancelled {
            payment_id: id.clone(),
        });
        info!(payment = %id, "payment session cancelled");
    }

    /// Report an unrecoverable payment-provider error for a session.
    ///
    /// This is the only path into the `Failed` state; transient
    /// verification failures never escalate on their own. The transition is
    /// terminal: the driver is stopped and the session removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSession`] if the payment is not tracked.
    pub fn report_failure(&self, id: &PaymentId, reason: impl Into<String>) -> Result<()> {
        let entry = self
            .inner
            .sessions
            .lock()
            .remove(id)
            .ok_or_else(|| Error::UnknownSession(id.clone()))?;

        let _ = entry.cancel_tx.send(true);
        warn!(payment = %id, reason = %reason.into(), "unrecoverable provider error reported");
        apply_input(&entry.session, &self.inner.events, &Input::Failure);
        Ok(())
    }

    /// Snapshots of all live sessions, in no particular order.
    #[must_use]
    pub fn list_active(&self) -> Vec<SessionSnapshot> {
        self.inner
            .sessions
            .lock()
            .values()
            .map(|entry| entry.session.lock().snapshot())
            .collect()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    /// Whether any sessions are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.sessions.lock().is_empty()
    }

    /// Cancel every live session. For process teardown.
    pub fn shutdown(&self) {
        let ids: Vec<PaymentId> = self.inner.sessions.lock().keys().cloned().collect();
        for id in &ids {
            self.cancel(id);
        }
        if !ids.is_empty() {
            info!(count = ids.len(), "registry shut down, all sessions cancelled");
        }
    }
}
