//! Registration requests and the events flowing out of a trigger.
//!
//! Listeners emit [`LogEvent`]s; the trigger record wraps each one in a
//! [`TriggerResponse`] on the caller-facing response channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValueError;
use crate::value::{Value, ValueMap};

/// Workflow metadata attached to a registration request.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetadata {
    pub workflow_id: String,
    #[serde(default)]
    pub workflow_owner: String,
    #[serde(default)]
    pub workflow_name: String,
}

/// A request to register (or unregister) a trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerRegistrationRequest {
    /// Caller-supplied id, unique per registration.
    pub trigger_id: String,
    /// Workflow the trigger belongs to.
    pub metadata: RequestMetadata,
    /// Raw trigger config; required for registration, ignored on unregistration.
    pub config: Option<ValueMap>,
}

impl TriggerRegistrationRequest {
    /// A request without config (sufficient for unregistration).
    #[must_use]
    pub fn new(trigger_id: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        Self {
            trigger_id: trigger_id.into(),
            metadata: RequestMetadata {
                workflow_id: workflow_id.into(),
                ..RequestMetadata::default()
            },
            config: None,
        }
    }

    /// Attach a raw config.
    #[must_use]
    pub fn with_config(mut self, config: ValueMap) -> Self {
        self.config = Some(config);
        self
    }
}

/// A contract log observed by a listener.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub contract_name: String,
    pub contract_address: String,
    pub event_name: String,
    pub block_number: u64,
    pub tx_hash: String,
    pub log_index: u32,
    /// Decoded event fields.
    #[serde(default)]
    pub data: Value,
}

impl LogEvent {
    /// Stable id of the log: `{txHash}-{logIndex}`.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}-{}", self.tx_hash, self.log_index)
    }

    /// Chain position used for ordering and de-duplication.
    #[must_use]
    pub const fn position(&self) -> (u64, u32) {
        (self.block_number, self.log_index)
    }
}

/// The event part of a trigger response.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    /// Capability id of the emitting trigger type.
    pub trigger_type: String,
    pub id: String,
    pub outputs: Value,
}

/// A response delivered on a trigger's response channel.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub event_id: Uuid,
    pub trigger_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: TriggerEvent,
}

impl TriggerResponse {
    /// Wraps a log as a response of `trigger_type`.
    pub fn from_log(
        trigger_type: &str,
        trigger_id: &str,
        log: &LogEvent,
    ) -> Result<Self, ValueError> {
        Ok(Self {
            event_id: Uuid::new_v4(),
            trigger_id: trigger_id.to_string(),
            timestamp: Utc::now(),
            event: TriggerEvent {
                trigger_type: trigger_type.to_string(),
                id: log.id(),
                outputs: Value::wrap(log)?,
            },
        })
    }
}
