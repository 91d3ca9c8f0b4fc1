//! Configuration types.
//!
//! `trigger` holds the per-registration shapes (current and legacy);
//! `service` holds the capability-wide settings.

/// Capability-level settings.
pub mod service;
/// Per-registration trigger config shapes.
pub mod trigger;

pub use service::{ServiceConfig, DEFAULT_RESPONSE_BUFFER_SIZE};
pub use trigger::{ContractConfig, LegacyContractConfig, MultiContractConfig};
