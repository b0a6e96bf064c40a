//! Resolves the firmware a task installs

use std::collections::HashSet;

use condition_types::FirmwareInstallParameters;
use fleetdb_client::{Asset, Component};
use tracing::debug;

use crate::inventory::{Inventory, InventoryError};
use crate::models::firmware::{from_spec, sort_by_install_order, Firmware};

/// Firmware selected for a device
#[derive(Debug, Clone, Default)]
pub struct ResolvedFirmware {
    /// In install order, at most one per component
    pub firmwares: Vec<Firmware>,
    /// Components that had firmware but are absent from the device
    pub dropped: Vec<String>,
}

/// Select the firmware to install on `asset`.
///
/// An explicit firmware list wins over a firmware set, which wins over the
/// firmware published for the device vendor and model. Only components the
/// device reports are kept.
pub async fn resolve_firmware(
    inventory: &dyn Inventory,
    asset: &Asset,
    params: &FirmwareInstallParameters,
    components: &[Component],
) -> Result<ResolvedFirmware, InventoryError> {
    let candidates: Vec<Firmware> = if !params.firmwares.is_empty() {
        params.firmwares.iter().map(from_spec).collect()
    } else if let Some(set_id) = params.firmware_set_id {
        let set = inventory.firmware_set_by_id(set_id).await?;
        debug!(firmware_set = %set.name, "Resolving firmware from set");
        set.component_firmware
            .into_iter()
            .filter(|fw| fw.applies_to(&asset.vendor, &asset.model))
            .collect()
    } else {
        inventory
            .firmware_by_device_vendor_model(&asset.vendor, &asset.model)
            .await?
    };

    let present: HashSet<String> = components.iter().map(|c| c.slug.to_lowercase()).collect();
    let mut seen = HashSet::new();
    let mut resolved = ResolvedFirmware::default();

    for fw in candidates {
        let slug = fw.component.to_lowercase();
        if !present.contains(&slug) {
            resolved.dropped.push(fw.component.clone());
            continue;
        }
        if seen.insert(slug) {
            resolved.firmwares.push(fw);
        }
    }

    if resolved.firmwares.is_empty() {
        return Err(InventoryError::NoFirmware(format!(
            "asset {} ({} {})",
            asset.id, asset.vendor, asset.model
        )));
    }

    sort_by_install_order(&mut resolved.firmwares);
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::memory::MemoryInventory;
    use condition_types::FirmwareSpec;
    use fleetdb_client::ComponentFirmwareSet;
    use uuid::Uuid;

    fn asset() -> Asset {
        Asset {
            id: Uuid::new_v4(),
            vendor: "Dell".to_string(),
            model: "R640".to_string(),
            ..Default::default()
        }
    }

    fn component(slug: &str) -> Component {
        Component {
            slug: slug.to_string(),
            ..Default::default()
        }
    }

    fn firmware(component: &str, models: &[&str]) -> Firmware {
        Firmware {
            id: Uuid::new_v4(),
            component: component.to_string(),
            vendor: "dell".to_string(),
            models: models.iter().map(|m| m.to_string()).collect(),
            version: "2.0".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_vendor_model_lookup_sorted_and_filtered() {
        let inventory = MemoryInventory::new();
        inventory.add_firmware(firmware("nic", &[]));
        inventory.add_firmware(firmware("bios", &["r640"]));
        inventory.add_firmware(firmware("bios", &["r6515"]));
        inventory.add_firmware(firmware("gpu", &[]));

        let resolved = resolve_firmware(
            &inventory,
            &asset(),
            &FirmwareInstallParameters::default(),
            &[component("BIOS"), component("nic")],
        )
        .await
        .unwrap();

        let order: Vec<_> = resolved.firmwares.iter().map(|f| f.component.as_str()).collect();
        assert_eq!(order, vec!["bios", "nic"]);
        assert_eq!(resolved.dropped, vec!["gpu".to_string()]);
    }

    #[tokio::test]
    async fn test_explicit_list_wins_over_set() {
        let inventory = MemoryInventory::new();
        let set_id = Uuid::new_v4();
        inventory.add_firmware_set(ComponentFirmwareSet {
            id: set_id,
            name: "r640-latest".to_string(),
            component_firmware: vec![firmware("bios", &[])],
            created_at: None,
            updated_at: None,
        });

        let params = FirmwareInstallParameters {
            firmware_set_id: Some(set_id),
            firmwares: vec![FirmwareSpec {
                id: Uuid::new_v4(),
                component: "bmc".to_string(),
                vendor: "dell".to_string(),
                models: vec![],
                version: "7.0".to_string(),
                filename: "bmc.bin".to_string(),
                url: "https://firmware.example/bmc.bin".to_string(),
                checksum: String::new(),
            }],
            ..Default::default()
        };

        let resolved = resolve_firmware(&inventory, &asset(), &params, &[component("bmc"), component("bios")])
            .await
            .unwrap();
        assert_eq!(resolved.firmwares.len(), 1);
        assert_eq!(resolved.firmwares[0].component, "bmc");
    }

    #[tokio::test]
    async fn test_nothing_applicable_is_an_error() {
        let inventory = MemoryInventory::new();
        inventory.add_firmware(firmware("psu", &[]));

        let err = resolve_firmware(
            &inventory,
            &asset(),
            &FirmwareInstallParameters::default(),
            &[component("bios")],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, InventoryError::NoFirmware(_)));
    }
}
