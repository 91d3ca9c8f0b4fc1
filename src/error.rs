//! Error types for the log-event trigger capability.
//!
//! All errors are strongly typed using thiserror so callers can match on the
//! specific failure. Configuration defects are never retryable; listener
//! failures leave the trigger id unregistered so the caller may try again.

use std::fmt;

use thiserror::Error;

/// Errors narrowing a dynamic [`Value`](crate::value::Value) to a concrete type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("Wrong value type: expected {expected}, got {actual}")]
    WrongType {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Value conversion failed: {message}")]
    Conversion {
        message: String,
    },
}

/// Errors produced while normalizing a raw trigger configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config has an explicit but empty 'contracts' field; refusing to fall back to legacy detection")]
    MalformedExplicitNullContracts,

    #[error("config is neither a valid multi-log trigger config nor a legacy single-log trigger config: {reason}")]
    NoValidConfigShapeFound {
        reason: String,
    },

    #[error("legacy trigger config field '{field}' must be {expected}, got {actual}")]
    LegacyFieldTypeMismatch {
        field: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("legacy contractReaderConfig has no entry at contracts.{contract_name}")]
    LegacyContractNotFoundInReaderConfig {
        contract_name: String,
    },

    #[error("failed to parse service config: {message}")]
    ServiceConfigParse {
        message: String,
    },

    #[error("failed to read service config {path}: {message}")]
    ServiceConfigIo {
        path: String,
        message: String,
    },
}

/// Errors validating a normalized configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("at least one contract is required")]
    EmptyContracts,

    #[error("contract #{index}: '{field}' cannot be empty")]
    EmptyContractField {
        index: usize,
        field: &'static str,
    },

    #[error("contract '{contract}' must watch at least one event")]
    NoEventNames {
        contract: String,
    },

    #[error("contract '{contract}' has an empty event name")]
    EmptyEventName {
        contract: String,
    },

    #[error("contract '{contract}' lists event '{event}' more than once")]
    DuplicateEventName {
        contract: String,
        event: String,
    },

    #[error("invalid service config field '{field}': {reason}")]
    InvalidServiceConfig {
        field: &'static str,
        reason: String,
    },
}

/// Errors raised by the capability store itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("poisoned lock: {context}")]
    Poisoned {
        context: &'static str,
    },
}

/// Errors raised by event listeners and the chain readers behind them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ListenerError {
    #[error("listener {listener} failed to start: {message}")]
    StartFailed {
        listener: String,
        message: String,
    },

    #[error("listener {listener} failed to close: {message}")]
    CloseFailed {
        listener: String,
        message: String,
    },

    #[error("listener {listener} already started")]
    AlreadyStarted {
        listener: String,
    },

    #[error("contract reader error: {message}")]
    Reader {
        message: String,
    },

    #[error("failed to spawn worker thread: {message}")]
    Spawn {
        message: String,
    },
}

/// The stage of registration at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationStage {
    /// Legacy detection and migration.
    Normalize,
    /// Typed config validation.
    Validate,
    /// Listener construction and start.
    Construct,
}

impl fmt::Display for RegistrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Normalize => "normalize",
            Self::Validate => "validate",
            Self::Construct => "construct",
        };
        f.write_str(s)
    }
}

/// Top-level error type for the trigger capability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("registration cancelled: {reason}")]
    Cancelled {
        reason: String,
    },

    #[error("triggerId {trigger_id} not found")]
    TriggerNotFound {
        trigger_id: String,
    },

    #[error("config is required to register log event trigger {trigger_id}")]
    MissingConfig {
        trigger_id: String,
    },

    #[error("cannot create new trigger since {service} has been stopped")]
    ServiceStopped {
        service: String,
    },

    #[error("{service} cannot transition: {reason}")]
    Lifecycle {
        service: String,
        reason: String,
    },

    #[error("register trigger {trigger_id} failed at {stage}: {source}")]
    Registration {
        trigger_id: String,
        stage: RegistrationStage,
        #[source]
        source: Box<TriggerError>,
    },

    #[error("error closing trigger {trigger_id} (chainID {chain_id}): {source}")]
    Unregistration {
        trigger_id: String,
        chain_id: String,
        #[source]
        source: Box<TriggerError>,
    },

    #[error("{count} trigger(s) failed to close: {messages:?}")]
    Shutdown {
        count: usize,
        messages: Vec<String>,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl TriggerError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Wraps `self` with the trigger id and registration stage.
    #[must_use]
    pub fn at_stage(self, trigger_id: impl Into<String>, stage: RegistrationStage) -> Self {
        Self::Registration {
            trigger_id: trigger_id.into(),
            stage,
            source: Box::new(self),
        }
    }

    /// Strips registration/unregistration context and returns the underlying error.
    #[must_use]
    pub fn innermost(&self) -> &Self {
        match self {
            Self::Registration { source, .. } | Self::Unregistration { source, .. } => {
                source.innermost()
            }
            other => other,
        }
    }

    /// Returns the underlying config error, if this is one.
    #[must_use]
    pub fn as_config(&self) -> Option<&ConfigError> {
        match self.innermost() {
            Self::Config(e) => Some(e),
            _ => None,
        }
    }

    /// Returns true if this is a config or validation defect.
    #[must_use]
    pub fn is_config_defect(&self) -> bool {
        matches!(
            self.innermost(),
            Self::Config(_) | Self::Validation(_) | Self::MissingConfig { .. }
        )
    }

    /// Returns true if the trigger id was not registered.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self.innermost(), Self::TriggerNotFound { .. })
    }

    /// Returns true if this error is retryable.
    ///
    /// Config defects never change on retry. Listener start failures and
    /// cancellations leave the key absent, so the caller may register again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self.innermost() {
            Self::Listener(e) => !matches!(e, ListenerError::AlreadyStarted { .. }),
            Self::Cancelled { .. } => true,
            _ => false,
        }
    }
}

/// Result type alias for trigger operations.
pub type TriggerResult<T> = Result<T, TriggerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_messages() {
        let err = ConfigError::NoValidConfigShapeFound {
            reason: "no valid legacy trigger config found".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("neither a valid multi-log"));
        assert!(msg.contains("no valid legacy"));

        let err = ConfigError::LegacyFieldTypeMismatch {
            field: "contractName",
            expected: "string",
            actual: "int",
        };
        assert!(err.to_string().contains("contractName"));
    }

    #[test]
    fn test_registration_wraps_context() {
        let err = TriggerError::from(ConfigError::MalformedExplicitNullContracts)
            .at_stage("trigger-1", RegistrationStage::Normalize);
        let msg = err.to_string();
        assert!(msg.contains("trigger-1"));
        assert!(msg.contains("normalize"));
        assert_eq!(
            err.as_config(),
            Some(&ConfigError::MalformedExplicitNullContracts)
        );
        assert!(err.is_config_defect());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_listener_failures_are_retryable() {
        let err: TriggerError = ListenerError::StartFailed {
            listener: "poller".to_string(),
            message: "dial tcp: connection refused".to_string(),
        }
        .into();
        assert!(err.is_retryable());
        assert!(err
            .at_stage("t", RegistrationStage::Construct)
            .is_retryable());
    }

    #[test]
    fn test_not_found() {
        let err = TriggerError::TriggerNotFound {
            trigger_id: "missing".to_string(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "triggerId missing not found");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(RegistrationStage::Validate.to_string(), "validate");
        assert_eq!(RegistrationStage::Construct.to_string(), "construct");
    }
}
