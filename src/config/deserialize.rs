// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles probe endpoint lists and the environment map.

use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::EnvironmentConfig;
use crate::types::EnvironmentName;

pub fn deserialize_endpoints<'de, D>(deserializer: D) -> Result<NonEmpty<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<String> = Vec::deserialize(deserializer)?;
    if let Some(bad) = values.iter().find(|e| !e.starts_with('/')) {
        return Err(serde::de::Error::custom(format!(
            "health endpoint must start with '/': {bad:?}"
        )));
    }
    NonEmpty::from_vec(values)
        .ok_or_else(|| serde::de::Error::custom("at least one health endpoint is required"))
}

pub fn deserialize_environments<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<EnvironmentName, EnvironmentConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let map: BTreeMap<EnvironmentName, EnvironmentConfig> = BTreeMap::deserialize(deserializer)?;
    if map.is_empty() {
        return Err(serde::de::Error::custom(
            "at least one environment is required",
        ));
    }
    Ok(map)
}
