//! Listener seam between the trigger service and a chain.
//!
//! A [`ListenerFactory`] builds one [`EventListener`] per registration plus the
//! channel it emits [`LogEvent`]s on. The service starts the listener, and the
//! trigger record forwards its events to the caller.

use crossbeam_channel::Receiver;

use crate::config::{MultiContractConfig, ServiceConfig};
use crate::error::TriggerResult;

use super::context::RegistrationContext;
use super::events::LogEvent;

/// Everything a factory needs to build a listener for one registration.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy)]
pub struct ListenerSpec<'a> {
    pub trigger_id: &'a str,
    pub workflow_id: &'a str,
    pub config: &'a MultiContractConfig,
    pub service: &'a ServiceConfig,
}

/// A running (or startable) chain event listener.
pub trait EventListener: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Begins producing events. May block on network setup; should give up
    /// once `ctx` is done.
    fn start(&self, ctx: &RegistrationContext) -> TriggerResult<()>;

    /// Stops producing events and releases resources.
    ///
    /// On error the listener must be left running so the caller can retry.
    fn close(&self) -> TriggerResult<()>;
}

/// Builds listeners for registrations.
pub trait ListenerFactory: Send + Sync {
    /// Builds a listener (not yet started) and the channel it emits on.
    fn new_listener(
        &self,
        spec: &ListenerSpec<'_>,
    ) -> TriggerResult<(Box<dyn EventListener>, Receiver<LogEvent>)>;
}
