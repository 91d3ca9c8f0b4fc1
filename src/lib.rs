//! # logevent - contract log-event trigger capability
//!
//! Registers workflow triggers that fire on smart-contract log events. Each
//! registration is keyed by a caller-supplied trigger id and built at most
//! once, however many callers race to register it.
//!
//! ## Core Concepts
//!
//! - **Capability store**: keyed store of running triggers with at-most-once construction
//! - **Normalizer**: accepts the current multi-contract config or the deprecated
//!   single-contract config and always yields the multi-contract shape
//! - **Listener**: chain event source behind the [`trigger::ListenerFactory`] seam
//! - **Trigger service**: registration, unregistration and lifecycle
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use logevent::trigger::{
//!     InMemoryContractReader, PollingListenerFactory, RegistrationContext,
//!     TriggerRegistrationRequest, TriggerService,
//! };
//! use logevent::{ServiceConfig, Value};
//!
//! let reader = Arc::new(InMemoryContractReader::new());
//! let service = TriggerService::new(
//!     ServiceConfig::new("evm", "11155111"),
//!     Arc::new(PollingListenerFactory::new(reader)),
//! )?;
//! service.start()?;
//!
//! let config = Value::from(serde_json::json!({
//!     "contractName": "Foo",
//!     "contractAddress": "0xabc",
//!     "contractEventName": "Transfer",
//!     "contractReaderConfig": { "contracts": { "Foo": {} } }
//! }));
//! let req = TriggerRegistrationRequest::new("trigger-1", "workflow-1")
//!     .with_config(config.into_map()?);
//! let responses = service.register_trigger(&RegistrationContext::new(), &req)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod config;
pub mod error;
pub mod value;

// Normalization and storage
pub mod normalize;
pub mod store;

// Triggers
pub mod trigger;

// Re-export primary types at crate root for convenience
pub use config::{ContractConfig, LegacyContractConfig, MultiContractConfig, ServiceConfig};
pub use error::{
    ConfigError, ListenerError, RegistrationStage, StoreError, TriggerError, TriggerResult,
    ValidationError, ValueError,
};
pub use normalize::{normalize, NormalizedConfig};
pub use store::{CapabilityStore, InMemoryCapabilityStore, ShardedCapabilityStore};
pub use trigger::{TriggerRegistrationRequest, TriggerResponse, TriggerService};
pub use value::{Value, ValueMap};
