//! Trigger record: a started listener plus its response forwarder.
//!
//! The forwarder thread turns listener [`LogEvent`]s into [`TriggerResponse`]s
//! on the caller's bounded response channel. Sends block while the caller is
//! behind, but a close always interrupts them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::error::{ListenerError, TriggerResult};

use super::events::{LogEvent, TriggerResponse};
use super::listener::EventListener;

/// Identity of a trigger record.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerIdentity {
    pub trigger_id: String,
    pub workflow_id: String,
    /// Capability id stamped on every response.
    pub trigger_type: String,
}

struct Forwarder {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// A registered log-event trigger.
///
/// Owned by the capability store; only the store's owner starts or closes it.
pub struct LogEventTrigger {
    identity: TriggerIdentity,
    listener: Box<dyn EventListener>,
    forwarder: Mutex<Option<Forwarder>>,
    forwarded: Arc<AtomicU64>,
}

impl std::fmt::Debug for LogEventTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogEventTrigger")
            .field("identity", &self.identity)
            .field("listener", &self.listener.name())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl LogEventTrigger {
    /// Wraps a started listener and spawns the response forwarder.
    ///
    /// On failure the listener is closed before returning.
    pub fn spawn(
        identity: TriggerIdentity,
        listener: Box<dyn EventListener>,
        events: Receiver<LogEvent>,
        response_capacity: usize,
    ) -> TriggerResult<(Arc<Self>, Receiver<TriggerResponse>)> {
        let (responses_tx, responses_rx) = bounded(response_capacity.max(1));
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let forwarded = Arc::new(AtomicU64::new(0));

        let worker_identity = identity.clone();
        let worker_forwarded = Arc::clone(&forwarded);
        let spawned = thread::Builder::new()
            .name(format!("logevent-trigger-{}", identity.trigger_id))
            .spawn(move || {
                forward_loop(&worker_identity, &events, &stop_rx, &responses_tx, &worker_forwarded);
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                if let Err(close_err) = listener.close() {
                    warn!(trigger_id = %identity.trigger_id, error = %close_err, "failed to close listener after spawn failure");
                }
                return Err(ListenerError::Spawn {
                    message: e.to_string(),
                }
                .into());
            }
        };

        let trigger = Arc::new(Self {
            identity,
            listener,
            forwarder: Mutex::new(Some(Forwarder { stop_tx, handle })),
            forwarded,
        });
        Ok((trigger, responses_rx))
    }

    #[must_use]
    pub fn trigger_id(&self) -> &str {
        &self.identity.trigger_id
    }

    #[must_use]
    pub fn workflow_id(&self) -> &str {
        &self.identity.workflow_id
    }

    #[must_use]
    pub fn identity(&self) -> &TriggerIdentity {
        &self.identity
    }

    /// Number of responses delivered to the response channel.
    #[must_use]
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.forwarder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Closes the listener, then stops the forwarder, which disconnects the
    /// response channel once drained.
    ///
    /// Idempotent. If the listener fails to close, the trigger keeps running.
    /// A forwarder that panicked has already released its channel, so the
    /// trigger still counts as closed.
    pub fn close(&self) -> TriggerResult<()> {
        let mut forwarder = self.forwarder.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(running) = forwarder.as_ref() else {
            return Ok(());
        };
        debug!(trigger_id = %self.identity.trigger_id, running = !running.handle.is_finished(), "closing trigger");

        self.listener.close()?;

        if let Some(Forwarder { stop_tx, handle }) = forwarder.take() {
            drop(stop_tx);
            if handle.join().is_err() {
                warn!(trigger_id = %self.identity.trigger_id, "response forwarder panicked");
            }
        }
        info!(
            trigger_id = %self.identity.trigger_id,
            workflow_id = %self.identity.workflow_id,
            forwarded = self.forwarded(),
            "trigger closed"
        );
        Ok(())
    }
}

impl Drop for LogEventTrigger {
    fn drop(&mut self) {
        // Best-effort: the last holder went away without closing.
        let forwarder = self
            .forwarder
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Forwarder { stop_tx, handle }) = forwarder {
            drop(stop_tx);
            if let Err(e) = self.listener.close() {
                warn!(trigger_id = %self.identity.trigger_id, error = %e, "failed to close listener on drop");
            }
            // Do not join here; the forwarder exits on its own once stopped.
            drop(handle);
        }
    }
}

fn forward_loop(
    identity: &TriggerIdentity,
    events: &Receiver<LogEvent>,
    stop_rx: &Receiver<()>,
    responses: &Sender<TriggerResponse>,
    forwarded: &AtomicU64,
) {
    loop {
        let log = select! {
            recv(stop_rx) -> _ => return,
            recv(events) -> msg => match msg {
                Ok(log) => log,
                // Listener dropped its sender.
                Err(_) => return,
            },
        };

        let response =
            match TriggerResponse::from_log(&identity.trigger_type, &identity.trigger_id, &log) {
                Ok(response) => response,
                Err(e) => {
                    warn!(trigger_id = %identity.trigger_id, log_id = %log.id(), error = %e, "dropping undecodable log");
                    continue;
                }
            };

        select! {
            send(responses, response) -> res => {
                if res.is_err() {
                    // Every receiver is gone.
                    return;
                }
                forwarded.fetch_add(1, Ordering::Relaxed);
            }
            recv(stop_rx) -> _ => return,
        }
    }
}
