//! Trigger config normalization.
//!
//! Accepts either the current multi-contract config or the deprecated
//! single-contract config and always yields the multi-contract shape. Legacy
//! configs are rewritten into a new document; the input is never mutated.
//!
//! Detection order:
//! 1. the document parses as a non-empty [`MultiContractConfig`]: accepted as-is;
//! 2. it parses but is empty while an explicit `contracts` key is present:
//!    rejected, without trying legacy detection;
//! 3. otherwise the top-level map, then every `*TriggerConfig` key, is tested
//!    for the legacy shape.

use tracing::{debug, info};

use crate::config::{ContractConfig, LegacyContractConfig, MultiContractConfig};
use crate::error::ConfigError;
use crate::value::{Value, ValueMap};

/// Suffix of top-level keys that may hold a legacy trigger config.
pub const LEGACY_KEY_SUFFIX: &str = "TriggerConfig";

/// Output of [`normalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedConfig {
    /// The normalized document, including every preserved top-level field.
    pub document: ValueMap,
    /// Typed view of the contracts in `document`.
    pub config: MultiContractConfig,
    /// True if the input was a legacy config.
    pub migrated: bool,
    /// Top-level key the legacy config was found under, if not the root.
    pub legacy_key: Option<String>,
}

/// Where a legacy config was found.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegacyMatch<'a> {
    /// `None` when the root map itself is the legacy config.
    pub key: Option<&'a str>,
    /// The matched legacy block.
    pub block: &'a ValueMap,
}

/// Normalizes `raw` into the multi-contract shape.
pub fn normalize(raw: &ValueMap) -> Result<NormalizedConfig, ConfigError> {
    let root = Value::Map(raw.clone());

    match root.unwrap_to::<MultiContractConfig>() {
        Ok(config) if !config.is_empty() => {
            debug!(contracts = config.contracts.len(), "config already in multi-log format");
            return Ok(NormalizedConfig {
                document: raw.clone(),
                config,
                migrated: false,
                legacy_key: None,
            });
        }
        Ok(_) if raw.contains_key("contracts") => {
            return Err(ConfigError::MalformedExplicitNullContracts);
        }
        Ok(_) => debug!("config has no contracts, checking for legacy format"),
        Err(e) => debug!(error = %e, "config is not multi-log format, checking for legacy format"),
    }

    let found = detect_legacy_shape(raw).ok_or_else(|| ConfigError::NoValidConfigShapeFound {
        reason: "no valid legacy trigger config found".to_string(),
    })?;

    info!(
        legacy_key = found.key.unwrap_or("<root>"),
        "config appears to be legacy single-log trigger format, attempting conversion"
    );

    let legacy = parse_legacy(found.block)?;
    let contract = convert_legacy(&legacy)?;

    let mut document: ValueMap = raw
        .iter()
        .filter(|(key, _)| !key.ends_with(LEGACY_KEY_SUFFIX))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let contract_value = Value::wrap(&contract).map_err(|e| ConfigError::NoValidConfigShapeFound {
        reason: format!("failed to wrap converted config: {e}"),
    })?;
    document.insert("contracts".to_string(), Value::List(vec![contract_value]));

    let config = MultiContractConfig {
        contracts: vec![contract],
    };

    info!(
        contracts = config.contracts.len(),
        contract_names = ?config.contract_names(),
        "converted legacy config to multi-log format"
    );

    Ok(NormalizedConfig {
        document,
        config,
        migrated: true,
        legacy_key: found.key.map(ToString::to_string),
    })
}

/// Finds a legacy trigger config in `raw`.
///
/// The root map is checked first; then keys ending in `TriggerConfig`, in key
/// order. The first map carrying all four legacy keys wins.
#[must_use]
pub fn detect_legacy_shape(raw: &ValueMap) -> Option<LegacyMatch<'_>> {
    if is_legacy_shape(raw) {
        return Some(LegacyMatch {
            key: None,
            block: raw,
        });
    }

    raw.iter()
        .filter(|(key, _)| key.ends_with(LEGACY_KEY_SUFFIX))
        .find_map(|(key, value)| match value {
            Value::Map(block) if is_legacy_shape(block) => Some(LegacyMatch {
                key: Some(key.as_str()),
                block,
            }),
            _ => None,
        })
}

/// Presence check only; types are checked by [`parse_legacy`].
#[must_use]
pub fn is_legacy_shape(map: &ValueMap) -> bool {
    LegacyContractConfig::REQUIRED_KEYS
        .iter()
        .all(|key| map.contains_key(*key))
}

/// Typed extraction of a legacy block.
pub fn parse_legacy(block: &ValueMap) -> Result<LegacyContractConfig, ConfigError> {
    Ok(LegacyContractConfig {
        contract_name: legacy_str(block, "contractName")?.to_string(),
        contract_address: legacy_str(block, "contractAddress")?.to_string(),
        contract_event_name: legacy_str(block, "contractEventName")?.to_string(),
        contract_reader_config: legacy_field(block, "contractReaderConfig")?
            .as_map()
            .map_err(|_| mismatch(block, "contractReaderConfig", "an object"))?
            .clone(),
    })
}

/// Converts a legacy config into one multi-contract entry.
pub fn convert_legacy(legacy: &LegacyContractConfig) -> Result<ContractConfig, ConfigError> {
    let reader_config = legacy
        .contract_reader_config
        .get("contracts")
        .and_then(|contracts| contracts.lookup(&[legacy.contract_name.as_str()]))
        .and_then(|entry| entry.as_map().ok())
        .ok_or_else(|| ConfigError::LegacyContractNotFoundInReaderConfig {
            contract_name: legacy.contract_name.clone(),
        })?;

    Ok(ContractConfig {
        contract_name: legacy.contract_name.clone(),
        contract_address: legacy.contract_address.clone(),
        contract_event_names: vec![legacy.contract_event_name.clone()],
        contract_reader_config: reader_config.clone(),
    })
}

fn legacy_field<'a>(block: &'a ValueMap, field: &'static str) -> Result<&'a Value, ConfigError> {
    block.get(field).ok_or(ConfigError::LegacyFieldTypeMismatch {
        field,
        expected: "present",
        actual: "missing",
    })
}

fn legacy_str<'a>(block: &'a ValueMap, field: &'static str) -> Result<&'a str, ConfigError> {
    legacy_field(block, field)?
        .as_str()
        .map_err(|_| mismatch(block, field, "a string"))
}

fn mismatch(block: &ValueMap, field: &'static str, expected: &'static str) -> ConfigError {
    ConfigError::LegacyFieldTypeMismatch {
        field,
        expected,
        actual: block.get(field).map_or("missing", Value::type_name),
    }
}
