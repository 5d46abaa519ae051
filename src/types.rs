use serde::{Deserialize, Serialize};

/// One step of the account update workflow, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    CreateUpdate,
    UpdateTrips,
    UpdateVehicles,
    FinalizeUpdate,
}

impl Step {
    pub fn as_str(&self) -> &str {
        match self {
            Step::CreateUpdate => "create-update",
            Step::UpdateTrips => "update-trips",
            Step::UpdateVehicles => "update-vehicles",
            Step::FinalizeUpdate => "finalize-update",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
