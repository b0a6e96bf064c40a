//! Task model

use chrono::{DateTime, Utc};
use condition_types::{Fault, FirmwareInstallParameters, TaskRequest};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::PowerState;
use crate::models::action::Action;
use crate::models::firmware::Firmware;
use crate::models::state::State;

/// Human readable progress entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMsg {
    pub ts: DateTime<Utc>,
    pub msg: String,
}

/// Append-only progress trail
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    #[serde(default)]
    pub records: Vec<StatusMsg>,
}

impl StatusRecord {
    /// Append a message unless it repeats the last one
    pub fn append(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        if self.records.last().is_some_and(|last| last.msg == msg) {
            return;
        }

        self.records.push(StatusMsg {
            ts: Utc::now(),
            msg,
        });
    }

    pub fn last(&self) -> Option<&str> {
        self.records.last().map(|r| r.msg.as_str())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// State a handler carries across phases and restarts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskData {
    /// Host power state observed when the task first initialized
    #[serde(default)]
    pub host_power_state_initial: Option<PowerState>,

    /// Host power cycles performed on behalf of this task
    #[serde(default)]
    pub host_power_cycles: u32,
}

/// One firmware install job for one device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub state: State,
    pub status: StatusRecord,

    /// Error detail of the last failure
    #[serde(default)]
    pub info: String,

    pub parameters: FirmwareInstallParameters,

    #[serde(default)]
    pub fault: Option<Fault>,

    /// Firmware to install, in install order
    #[serde(default)]
    pub firmwares_planned: Vec<Firmware>,

    #[serde(default)]
    pub actions_planned: Vec<Action>,

    #[serde(default)]
    pub data: TaskData,

    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub span_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a pending task
    pub fn new(id: Uuid, parameters: FirmwareInstallParameters) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: State::Pending,
            status: StatusRecord::default(),
            info: String::new(),
            parameters,
            fault: None,
            firmwares_planned: Vec::new(),
            actions_planned: Vec::new(),
            data: TaskData::default(),
            trace_id: None,
            span_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn asset_id(&self) -> Uuid {
        self.parameters.asset_id
    }

    /// Move to a new state
    pub fn set_state(&mut self, state: State) {
        self.state = state;
        self.updated_at = Utc::now();
    }

    /// Record progress on the status trail
    pub fn append_status(&mut self, msg: impl Into<String>) {
        self.status.append(msg);
        self.updated_at = Utc::now();
    }
}

impl From<TaskRequest> for Task {
    fn from(request: TaskRequest) -> Self {
        let mut task = Task::new(request.id, request.parameters);
        task.fault = request.fault;
        task.trace_id = request.trace_id;
        task.span_id = request.span_id;
        task.created_at = request.created_at;
        task
    }
}
