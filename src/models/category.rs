//! Service-info category models

use serde::{Deserialize, Serialize};

/// A vendor-defined grouping of related telemetry parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub category_id: String,
    pub name: String,
}
