//! Inventory API models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A server asset as recorded in the inventory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub vendor: String,
    pub model: String,
    #[serde(default)]
    pub serial: String,
    pub facility_code: String,

    /// BMC endpoint and credentials
    pub bmc_address: String,
    #[serde(default)]
    pub bmc_username: String,
    #[serde(default)]
    pub bmc_password: String,
}

/// A component as reported by the inventory or the device itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    /// Component slug, e.g. "bios", "bmc", "nic"
    pub slug: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub serial: String,

    /// Currently installed firmware version, if known
    #[serde(default)]
    pub firmware_installed: String,
}

/// A firmware artifact applicable to a component
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentFirmwareVersion {
    pub id: Uuid,
    pub component: String,
    pub vendor: String,
    #[serde(default)]
    pub models: Vec<String>,
    pub version: String,
    pub filename: String,
    pub url: String,
    pub checksum: String,
}

/// A named, versioned collection of firmware
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentFirmwareSet {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub component_firmware: Vec<ComponentFirmwareVersion>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Generic list envelope returned by the inventory API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub records: Vec<T>,
    #[serde(default)]
    pub total_record_count: usize,
}

/// Generic single-record envelope returned by the inventory API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordResponse<T> {
    pub record: T,
}

impl ComponentFirmwareVersion {
    /// Returns true when this firmware applies to the given vendor and model.
    ///
    /// Matching is case-insensitive; an empty model list matches any model.
    pub fn applies_to(&self, vendor: &str, model: &str) -> bool {
        if !self.vendor.eq_ignore_ascii_case(vendor) {
            return false;
        }

        self.models.is_empty() || self.models.iter().any(|m| m.eq_ignore_ascii_case(model))
    }
}
