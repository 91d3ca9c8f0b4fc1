//! Keyed capability store.
//!
//! Maps trigger ids to running trigger records with at-most-once construction.
//! `InMemoryCapabilityStore` serializes all registrations behind one lock;
//! `ShardedCapabilityStore` stripes construction by key.

mod memory;
mod sharded;
mod traits;

pub use memory::InMemoryCapabilityStore;
pub use sharded::{ShardedCapabilityStore, DEFAULT_STRIPES};
pub use traits::{CapabilityStore, Constructor};
