//! Human-readable durations (`"300s"`, `"5m"`, `"1m30s"`)

use std::time::Duration;

use serde::{Deserialize, Deserializer, de};

/// Deserialize a duration string through `duration_str`
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    duration_str::parse(&raw).map_err(|e| de::Error::custom(format!("invalid duration '{raw}': {e}")))
}
