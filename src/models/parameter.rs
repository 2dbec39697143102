//! Parameter reading models
//!
//! The service-info endpoint reports each row with a numeric `parameterId`
//! and uses `0` for plain informational rows, so the id is deserialized
//! tolerantly: number or string, with `0`/empty mapped to absent. Rows
//! without an id get a title-derived key (see [`crate::normalize`]).

use serde::{Deserialize, Deserializer, Serialize};

/// One raw parameter row as returned by the vendor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawParameter {
    #[serde(default, deserialize_with = "parameter_id")]
    pub parameter_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(rename = "displayValue")]
    pub value: String,
    #[serde(default)]
    pub raw_value: Option<serde_json::Value>,
}

/// A normalized sensor reading, tagged with its category and stable key.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub key: String,
    pub parameter_id: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_value: Option<serde_json::Value>,
    pub category_id: String,
}

/// Accept `parameterId` as number or string; `0`, `""` and `null` mean absent.
fn parameter_id<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(de)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::Number(n)) => {
            if n.as_u64() == Some(0) {
                None
            } else {
                Some(n.to_string())
            }
        }
        Some(serde_json::Value::String(s)) => {
            if s.is_empty() || s == "0" {
                None
            } else {
                Some(s)
            }
        }
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "unexpected parameterId: {}",
                other
            )))
        }
    })
}
