//! Firmware model and install precedence

use condition_types::FirmwareSpec;

/// Firmware resolved for installation
pub type Firmware = fleetdb_client::ComponentFirmwareVersion;

/// Components in the order their firmware is installed.
///
/// The BMC goes first since later installs go through it.
pub const INSTALL_ORDER: &[&str] = &[
    "bmc",
    "bios",
    "cpld",
    "backplane-expander",
    "storage-controller",
    "nic",
    "drive",
    "disk",
    "psu",
];

/// Position of a component in the install order; unknown components sort last
pub fn install_rank(component: &str) -> usize {
    INSTALL_ORDER
        .iter()
        .position(|slug| slug.eq_ignore_ascii_case(component))
        .unwrap_or(INSTALL_ORDER.len())
}

/// Stable sort by install precedence
pub fn sort_by_install_order(firmwares: &mut [Firmware]) {
    firmwares.sort_by_key(|fw| install_rank(&fw.component));
}

/// Convert an inline firmware from a task request
pub fn from_spec(spec: &FirmwareSpec) -> Firmware {
    Firmware {
        id: spec.id,
        component: spec.component.clone(),
        vendor: spec.vendor.clone(),
        models: spec.models.clone(),
        version: spec.version.clone(),
        filename: spec.filename.clone(),
        url: spec.url.clone(),
        checksum: spec.checksum.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn firmware(component: &str) -> Firmware {
        Firmware {
            id: Uuid::new_v4(),
            component: component.to_string(),
            vendor: "dell".to_string(),
            models: vec![],
            version: "1.0".to_string(),
            filename: format!("{}.bin", component),
            url: format!("https://firmware.example/{}.bin", component),
            checksum: String::new(),
        }
    }

    #[test]
    fn test_sort_by_install_order() {
        let mut firmwares = vec![
            firmware("nic"),
            firmware("gpu"),
            firmware("BIOS"),
            firmware("bmc"),
            firmware("fpga"),
        ];
        sort_by_install_order(&mut firmwares);

        let order: Vec<_> = firmwares.iter().map(|f| f.component.as_str()).collect();
        assert_eq!(order, vec!["bmc", "BIOS", "nic", "gpu", "fpga"]);
    }
}
