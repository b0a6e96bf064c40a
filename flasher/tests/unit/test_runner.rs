//! Task runner tests against the simulated device

use std::sync::Arc;

use condition_types::{Fault, StatusValue};
use tokio_util::sync::CancellationToken;

use flasher::device::simulated::SimulatedDevice;
use flasher::device::PowerState;
use flasher::errors::TaskError;
use flasher::models::state::State;
use flasher::models::step::StepName;
use flasher::models::task::Task;
use flasher::outofband::OutOfBandHandler;
use flasher::runner::run_task;
use flasher::status::{status_key, StatusPublisher};
use flasher::store::memory::MemoryKv;
use flasher::store::StatusKv;

use crate::helpers::{collaborators, component, firmware_spec, handler_options, request, worker, FACILITY};

fn device() -> Arc<SimulatedDevice> {
    Arc::new(SimulatedDevice::new(vec![
        component("bios", "2.0.0"),
        component("nic", "1.0.0"),
        component("bmc", "5.1"),
    ]))
}

fn handler(device: Arc<SimulatedDevice>, kv: Arc<MemoryKv>) -> OutOfBandHandler {
    OutOfBandHandler::new(
        worker(),
        collaborators(device),
        StatusPublisher::new(kv, worker()),
        handler_options(),
    )
}

#[tokio::test]
async fn test_installs_only_outdated_firmware() {
    let device = device();
    let kv = Arc::new(MemoryKv::new());
    let mut task = Task::from(request(vec![
        firmware_spec("nic", "1.1.0"),
        firmware_spec("bios", "2.0.0"),
    ]));

    let ctx = CancellationToken::new();
    run_task(&ctx, &mut task, &mut handler(device.clone(), kv.clone()))
        .await
        .unwrap();

    assert_eq!(task.state, State::Succeeded);

    // bios installs before nic
    let components: Vec<&str> = task.actions_planned.iter().map(|a| a.component()).collect();
    assert_eq!(components, vec!["bios", "nic"]);
    assert!(task.actions_planned.iter().all(|a| a.state == State::Succeeded));

    // bios was already current, nothing after the version check ran
    let bios = &task.actions_planned[0];
    let check = bios
        .steps
        .iter()
        .position(|s| s.name == StepName::CheckInstalledFirmware)
        .unwrap();
    assert_eq!(bios.steps[check].state, State::Succeeded);
    assert!(bios.steps[check + 1..].iter().all(|s| s.state == State::Pending));

    let nic = &task.actions_planned[1];
    assert!(nic.steps.iter().all(|s| s.state == State::Succeeded && s.attempts == 1));

    let calls = device.calls();
    assert!(calls.contains(&"upload_and_initiate:nic".to_string()));
    assert!(!calls.contains(&"upload_and_initiate:bios".to_string()));
    assert_eq!(calls.last().map(String::as_str), Some("close"));
    assert!(!device.is_open());

    let entry = kv.get(&status_key(FACILITY, task.id)).await.unwrap().unwrap();
    let value: StatusValue = serde_json::from_slice(&entry.value).unwrap();
    assert_eq!(value.state, State::Succeeded);
    assert_eq!(value.target, task.asset_id().to_string());
}

#[tokio::test]
async fn test_components_missing_from_device_are_dropped() {
    let device = device();
    let mut task = Task::from(request(vec![
        firmware_spec("nic", "1.1.0"),
        firmware_spec("gpu", "9.0"),
    ]));

    run_task(
        &CancellationToken::new(),
        &mut task,
        &mut handler(device, Arc::new(MemoryKv::new())),
    )
    .await
    .unwrap();

    assert_eq!(task.firmwares_planned.len(), 1);
    assert_eq!(task.firmwares_planned[0].component, "nic");
    assert!(task
        .status
        .records
        .iter()
        .any(|r| r.msg.contains("gpu")));
}

#[tokio::test]
async fn test_fault_fails_task_at_named_phase() {
    let device = device();
    let mut request = request(vec![firmware_spec("nic", "1.1.0")]);
    request.fault = Some(Fault {
        fail_at: Some("PlanActions".to_string()),
        ..Default::default()
    });
    let mut task = Task::from(request);

    let result = run_task(
        &CancellationToken::new(),
        &mut task,
        &mut handler(device.clone(), Arc::new(MemoryKv::new())),
    )
    .await;

    assert!(matches!(result, Err(TaskError::FaultInjected(ref phase)) if phase == "PlanActions"));
    assert_eq!(task.state, State::Failed);
    assert!(task.info.contains("PlanActions"));
    assert!(task.actions_planned.is_empty());
    assert!(!device.is_open());
}

#[tokio::test]
async fn test_failed_install_fails_task() {
    let device = Arc::new(
        SimulatedDevice::new(vec![component("nic", "1.0.0")]).with_failing_component("nic"),
    );
    let mut task = Task::from(request(vec![firmware_spec("nic", "1.1.0")]));

    let result = run_task(
        &CancellationToken::new(),
        &mut task,
        &mut handler(device, Arc::new(MemoryKv::new())),
    )
    .await;

    assert!(matches!(result, Err(TaskError::Action { ref component, .. }) if component == "nic"));
    assert_eq!(task.state, State::Failed);
    assert_eq!(task.actions_planned[0].state, State::Failed);
    assert!(task.actions_planned[0]
        .steps
        .iter()
        .any(|s| s.name == StepName::UploadFirmwareInitiateInstall && s.state == State::Failed));
}

#[tokio::test]
async fn test_terminal_task_is_rejected() {
    let mut task = Task::from(request(vec![firmware_spec("nic", "1.1.0")]));
    task.set_state(State::Succeeded);

    let result = run_task(
        &CancellationToken::new(),
        &mut task,
        &mut handler(device(), Arc::new(MemoryKv::new())),
    )
    .await;

    assert!(matches!(result, Err(TaskError::Terminal(State::Succeeded))));
    assert!(task.status.is_empty());
}

#[tokio::test]
async fn test_initial_power_off_is_restored() {
    let device = Arc::new(
        SimulatedDevice::new(vec![component("bios", "1.0"), component("nic", "1.0")])
            .with_power_state(PowerState::Off),
    );
    let mut task = Task::from(request(vec![
        firmware_spec("bios", "1.1"),
        firmware_spec("nic", "1.1"),
    ]));

    run_task(
        &CancellationToken::new(),
        &mut task,
        &mut handler(device.clone(), Arc::new(MemoryKv::new())),
    )
    .await
    .unwrap();

    assert_eq!(task.data.host_power_state_initial, Some(PowerState::Off));
    assert_eq!(device.current_power_state(), PowerState::Off);

    let calls = device.calls();
    let powered_on = calls.iter().position(|c| c == "power_on").unwrap();
    let powered_off = calls.iter().rposition(|c| c == "power_off").unwrap();
    assert!(powered_off > powered_on);
}

#[tokio::test]
async fn test_host_powered_off_once_and_back_on() {
    let device = Arc::new(
        SimulatedDevice::new(vec![component("bios", "1.0"), component("nic", "1.0")])
            .with_default_install_steps(&["powerOffHost", "uploadInitiateInstall", "installStatus"]),
    );
    let mut task = Task::from(request(vec![
        firmware_spec("bios", "1.1"),
        firmware_spec("nic", "1.1"),
    ]));

    run_task(
        &CancellationToken::new(),
        &mut task,
        &mut handler(device.clone(), Arc::new(MemoryKv::new())),
    )
    .await
    .unwrap();

    assert_eq!(task.state, State::Succeeded);
    assert_eq!(task.data.host_power_state_initial, Some(PowerState::On));

    let bios = &task.actions_planned[0];
    let nic = &task.actions_planned[1];
    assert!(bios.host_power_off_pre_install);
    assert!(bios.step_names().contains(&StepName::PowerOffServer));
    assert!(!nic.host_power_off_pre_install);
    assert!(!nic.step_names().contains(&StepName::PowerOffServer));
    assert!(!nic.step_names().contains(&StepName::PowerOnServer));

    let calls = device.calls();
    let power_changes: Vec<&str> = calls
        .iter()
        .map(String::as_str)
        .filter(|c| *c == "power_on" || *c == "power_off")
        .collect();
    assert_eq!(power_changes, vec!["power_off", "power_on"]);

    // Both installs ran with the host off
    let powered_off = calls.iter().position(|c| c == "power_off").unwrap();
    let powered_on = calls.iter().position(|c| c == "power_on").unwrap();
    let nic_install = calls.iter().position(|c| c == "upload_and_initiate:nic").unwrap();
    assert!(powered_off < nic_install && nic_install < powered_on);

    assert_eq!(device.current_power_state(), PowerState::On);
}
