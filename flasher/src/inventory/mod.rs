//! Asset inventory access

pub mod fleetdb;
pub mod memory;
pub mod resolve;

use async_trait::async_trait;
use fleetdb_client::{Asset, ComponentFirmwareSet};
use thiserror::Error;
use uuid::Uuid;

use crate::models::firmware::Firmware;

pub use resolve::resolve_firmware;

/// Inventory errors
#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("inventory request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("inventory returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid inventory url: {0}")]
    Url(#[from] url::ParseError),

    #[error("no applicable firmware: {0}")]
    NoFirmware(String),
}

/// Asset and firmware lookups
#[async_trait]
pub trait Inventory: Send + Sync {
    async fn asset_by_id(&self, id: Uuid) -> Result<Asset, InventoryError>;

    /// Firmware published for a device vendor and model
    async fn firmware_by_device_vendor_model(
        &self,
        vendor: &str,
        model: &str,
    ) -> Result<Vec<Firmware>, InventoryError>;

    async fn firmware_set_by_id(&self, id: Uuid) -> Result<ComponentFirmwareSet, InventoryError>;
}
