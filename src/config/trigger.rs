//! Per-workflow trigger configuration shapes.
//!
//! `MultiContractConfig` is the canonical shape. `LegacyContractConfig` is the
//! deprecated single-contract shape that the normalizer migrates.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ValidationError;
use crate::value::ValueMap;

/// Canonical multi-contract log trigger configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiContractConfig {
    /// Contracts to watch, in declaration order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub contracts: Vec<ContractConfig>,
}

/// One watched contract.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractConfig {
    pub contract_name: String,
    pub contract_address: String,
    pub contract_event_names: Vec<String>,
    /// Opaque reader configuration for this contract.
    #[serde(default)]
    pub contract_reader_config: ValueMap,
}

/// Deprecated single-contract, single-event trigger configuration.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyContractConfig {
    pub contract_name: String,
    pub contract_address: String,
    pub contract_event_name: String,
    /// Legacy layout: `contracts.<contract_name>.*`.
    pub contract_reader_config: ValueMap,
}

impl LegacyContractConfig {
    /// Keys a map must carry to be treated as a legacy trigger config.
    pub const REQUIRED_KEYS: [&'static str; 4] = [
        "contractName",
        "contractAddress",
        "contractEventName",
        "contractReaderConfig",
    ];
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl MultiContractConfig {
    /// Returns true if no contracts are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Contract names in declaration order.
    #[must_use]
    pub fn contract_names(&self) -> Vec<&str> {
        self.contracts.iter().map(|c| c.contract_name.as_str()).collect()
    }

    /// Checks the config is usable for listener construction.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.contracts.is_empty() {
            return Err(ValidationError::EmptyContracts);
        }
        for (index, contract) in self.contracts.iter().enumerate() {
            contract.validate(index)?;
        }
        Ok(())
    }
}

impl ContractConfig {
    fn validate(&self, index: usize) -> Result<(), ValidationError> {
        if self.contract_name.trim().is_empty() {
            return Err(ValidationError::EmptyContractField {
                index,
                field: "contractName",
            });
        }
        if self.contract_address.trim().is_empty() {
            return Err(ValidationError::EmptyContractField {
                index,
                field: "contractAddress",
            });
        }
        if self.contract_event_names.is_empty() {
            return Err(ValidationError::NoEventNames {
                contract: self.contract_name.clone(),
            });
        }

        let mut seen = HashSet::with_capacity(self.contract_event_names.len());
        for event in &self.contract_event_names {
            if event.trim().is_empty() {
                return Err(ValidationError::EmptyEventName {
                    contract: self.contract_name.clone(),
                });
            }
            if !seen.insert(event.as_str()) {
                return Err(ValidationError::DuplicateEventName {
                    contract: self.contract_name.clone(),
                    event: event.clone(),
                });
            }
        }
        Ok(())
    }
}
