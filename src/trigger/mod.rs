//! Log-event triggers.
//!
//! - `events`: registration requests, observed logs and trigger responses
//! - `listener`: the seam between the service and a chain
//! - `poller`: a polling listener over a [`ContractReader`]
//! - `record`: a running trigger and its response forwarder
//! - `service`: registration, unregistration and service lifecycle

pub mod context;
pub mod events;
pub mod listener;
pub mod poller;
pub mod record;
pub mod service;

pub use context::RegistrationContext;
pub use events::{LogEvent, RequestMetadata, TriggerEvent, TriggerRegistrationRequest, TriggerResponse};
pub use listener::{EventListener, ListenerFactory, ListenerSpec};
pub use poller::{ContractReader, InMemoryContractReader, PollingListener, PollingListenerFactory};
pub use record::{LogEventTrigger, TriggerIdentity};
pub use service::{
    CapabilityInfo, CapabilityType, ServiceState, TriggerService, TriggerStore, SERVICE_NAME,
};
