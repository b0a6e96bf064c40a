//! Install procedure constants reported by devices

use std::str::FromStr;

use crate::models::step::StepName;
use crate::planner::PlanError;

/// One requirement of a device's firmware install procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallRequirement {
    Upload,
    UploadStatus,
    InstallUploaded,
    UploadInitiateInstall,
    InstallStatus,
    PowerOffHost,
    ResetBmcPostInstall,
    ResetBmcOnInstallFailure,
}

impl InstallRequirement {
    /// Step implementing this requirement; flag-only requirements have none
    pub fn step_name(&self) -> Option<StepName> {
        match self {
            InstallRequirement::Upload => Some(StepName::UploadFirmware),
            InstallRequirement::UploadStatus => Some(StepName::PollUploadStatus),
            InstallRequirement::InstallUploaded => Some(StepName::InstallUploadedFirmware),
            InstallRequirement::UploadInitiateInstall => {
                Some(StepName::UploadFirmwareInitiateInstall)
            }
            InstallRequirement::InstallStatus => Some(StepName::PollInstallStatus),
            InstallRequirement::PowerOffHost
            | InstallRequirement::ResetBmcPostInstall
            | InstallRequirement::ResetBmcOnInstallFailure => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstallRequirement::Upload => "upload",
            InstallRequirement::UploadStatus => "uploadStatus",
            InstallRequirement::InstallUploaded => "installUploaded",
            InstallRequirement::UploadInitiateInstall => "uploadInitiateInstall",
            InstallRequirement::InstallStatus => "installStatus",
            InstallRequirement::PowerOffHost => "powerOffHost",
            InstallRequirement::ResetBmcPostInstall => "resetBMCPostInstall",
            InstallRequirement::ResetBmcOnInstallFailure => "resetBMCOnInstallFailure",
        }
    }
}

impl FromStr for InstallRequirement {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(InstallRequirement::Upload),
            "uploadStatus" => Ok(InstallRequirement::UploadStatus),
            "installUploaded" => Ok(InstallRequirement::InstallUploaded),
            "uploadInitiateInstall" => Ok(InstallRequirement::UploadInitiateInstall),
            "installStatus" => Ok(InstallRequirement::InstallStatus),
            "powerOffHost" => Ok(InstallRequirement::PowerOffHost),
            "resetBMCPostInstall" => Ok(InstallRequirement::ResetBmcPostInstall),
            "resetBMCOnInstallFailure" => Ok(InstallRequirement::ResetBmcOnInstallFailure),
            other => Err(PlanError::ConstantNotSupported(other.to_string())),
        }
    }
}
