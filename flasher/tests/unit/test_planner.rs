//! Planner unit tests

use condition_types::InstallMethod;
use flasher::models::firmware::Firmware;
use flasher::models::state::State;
use flasher::models::step::StepName;
use flasher::planner::{compose_steps, plan_action, ActionParams, PlanError};
use uuid::Uuid;

fn reqs(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn firmware(component: &str) -> Firmware {
    Firmware {
        id: Uuid::new_v4(),
        component: component.to_string(),
        version: "1.0.0".to_string(),
        ..Default::default()
    }
}

#[test]
fn test_compose_upload_initiate_install() {
    let plan = compose_steps(
        InstallMethod::OutOfBand,
        "bios",
        &reqs(&["uploadInitiateInstall", "installStatus"]),
        false,
        true,
    )
    .unwrap();

    assert_eq!(
        plan.steps,
        vec![
            StepName::PowerOnServer,
            StepName::CheckInstalledFirmware,
            StepName::DownloadFirmware,
            StepName::UploadFirmwareInitiateInstall,
            StepName::PollInstallStatus,
        ]
    );
    assert!(!plan.requires_host_power_off);
}

#[test]
fn test_compose_power_off_host_never_powers_on() {
    let plan = compose_steps(
        InstallMethod::OutOfBand,
        "bmc",
        &reqs(&[
            "powerOffHost",
            "upload",
            "uploadStatus",
            "installUploaded",
            "installStatus",
            "resetBMCPostInstall",
        ]),
        true,
        true,
    )
    .unwrap();

    assert!(!plan.steps.contains(&StepName::PowerOnServer));
    assert_eq!(
        plan.steps,
        vec![
            StepName::CheckInstalledFirmware,
            StepName::DownloadFirmware,
            StepName::PreInstallResetBmc,
            StepName::PowerOffServer,
            StepName::UploadFirmware,
            StepName::PollUploadStatus,
            StepName::InstallUploadedFirmware,
            StepName::PollInstallStatus,
        ]
    );
    assert!(plan.requires_host_power_off);
    assert!(plan.bmc_reset_post_install);
    assert!(!plan.bmc_reset_on_install_failure);
}

#[test]
fn test_compose_in_band_has_no_host_power_steps() {
    let plan = compose_steps(
        InstallMethod::InBand,
        "nic",
        &reqs(&["powerOffHost", "uploadInitiateInstall", "installStatus"]),
        false,
        true,
    )
    .unwrap();

    assert!(!plan.steps.contains(&StepName::PowerOnServer));
    assert!(!plan.steps.contains(&StepName::PowerOffServer));
    assert_eq!(plan.steps[0], StepName::CheckInstalledFirmware);
}

#[test]
fn test_compose_is_deterministic() {
    let requirements = reqs(&["upload", "uploadStatus", "installUploaded", "installStatus"]);
    let first = compose_steps(InstallMethod::OutOfBand, "cpld", &requirements, false, true).unwrap();
    let second = compose_steps(InstallMethod::OutOfBand, "cpld", &requirements, false, true).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_compose_errors() {
    assert_eq!(
        compose_steps(InstallMethod::OutOfBand, "bios", &[], false, true),
        Err(PlanError::NoInstallSteps {
            component: "bios".to_string()
        })
    );

    assert_eq!(
        compose_steps(
            InstallMethod::OutOfBand,
            "bios",
            &reqs(&["upload", "flashViaJtag"]),
            false,
            true
        ),
        Err(PlanError::ConstantNotSupported("flashViaJtag".to_string()))
    );

    // Flags alone do not make an install procedure
    assert!(matches!(
        compose_steps(
            InstallMethod::OutOfBand,
            "bios",
            &reqs(&["powerOffHost", "resetBMCPostInstall"]),
            false,
            true
        ),
        Err(PlanError::NoInstallSteps { .. })
    ));
}

#[test]
fn test_plan_action_first_last_bracket() {
    let task_id = Uuid::new_v4();
    let requirements = reqs(&["powerOffHost", "uploadInitiateInstall", "installStatus"]);

    let params = |index| ActionParams {
        task_id,
        method: InstallMethod::OutOfBand,
        index,
        count: 3,
        force_install: true,
        reset_bmc_before_install: true,
    };

    let first = plan_action(&params(0), firmware("bmc"), &requirements).unwrap();
    let middle = plan_action(&params(1), firmware("bios"), &requirements).unwrap();
    let last = plan_action(&params(2), firmware("nic"), &requirements).unwrap();

    assert!(first.first && !first.last);
    assert!(first.bmc_reset_pre_install);
    assert!(first.host_power_off_pre_install);
    assert!(first.step_names().contains(&StepName::PreInstallResetBmc));
    assert!(first.step_names().contains(&StepName::PowerOffServer));

    assert!(!middle.first && !middle.last);
    assert!(!middle.bmc_reset_pre_install);
    assert!(!middle.host_power_off_pre_install);
    assert!(!middle.step_names().contains(&StepName::PreInstallResetBmc));
    // The host stays off from the first action, nothing powers it back on
    assert!(!middle.step_names().contains(&StepName::PowerOffServer));
    assert!(!middle.step_names().contains(&StepName::PowerOnServer));
    assert!(!last.step_names().contains(&StepName::PowerOffServer));

    assert!(last.last);
    assert!(last.force_install);

    assert_eq!(first.id, format!("{}-bmc-0", task_id));
    assert_eq!(first.state, State::Pending);
    assert!(first.steps.iter().all(|s| s.handler.is_none() && s.attempts == 0));
}
