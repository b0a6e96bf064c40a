//! In-memory inventory for dry runs and tests

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use fleetdb_client::{Asset, ComponentFirmwareSet};
use uuid::Uuid;

use crate::inventory::{Inventory, InventoryError};
use crate::models::firmware::Firmware;

#[derive(Default)]
pub struct MemoryInventory {
    assets: RwLock<HashMap<Uuid, Asset>>,
    firmware: RwLock<Vec<Firmware>>,
    sets: RwLock<HashMap<Uuid, ComponentFirmwareSet>>,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_asset(&self, asset: Asset) {
        self.assets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(asset.id, asset);
    }

    pub fn add_firmware(&self, firmware: Firmware) {
        self.firmware
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(firmware);
    }

    pub fn add_firmware_set(&self, set: ComponentFirmwareSet) {
        self.sets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(set.id, set);
    }
}

#[async_trait]
impl Inventory for MemoryInventory {
    async fn asset_by_id(&self, id: Uuid) -> Result<Asset, InventoryError> {
        let assets = self.assets.read().unwrap_or_else(|e| e.into_inner());
        match assets.get(&id) {
            Some(asset) => Ok(asset.clone()),
            // Dry runs accept any asset id
            None if assets.is_empty() => Ok(Asset {
                id,
                vendor: "simulated".to_string(),
                model: "simulated".to_string(),
                facility_code: "sandbox".to_string(),
                ..Default::default()
            }),
            None => Err(InventoryError::NotFound {
                kind: "asset",
                id: id.to_string(),
            }),
        }
    }

    async fn firmware_by_device_vendor_model(
        &self,
        vendor: &str,
        model: &str,
    ) -> Result<Vec<Firmware>, InventoryError> {
        let firmware = self.firmware.read().unwrap_or_else(|e| e.into_inner());
        Ok(firmware
            .iter()
            .filter(|fw| fw.applies_to(vendor, model))
            .cloned()
            .collect())
    }

    async fn firmware_set_by_id(&self, id: Uuid) -> Result<ComponentFirmwareSet, InventoryError> {
        self.sets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
            .ok_or_else(|| InventoryError::NotFound {
                kind: "firmware set",
                id: id.to_string(),
            })
    }
}
