use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::store::PrivacyError;
use crate::core::tooling::diagnostics::commands;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: CommandStatus,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

impl ExecutionOutcome {
    pub fn success(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            details,
        }
    }

    pub fn failure(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Failure,
            message: message.into(),
            details,
        }
    }

    pub fn user_error(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::UserError,
            message: message.into(),
            details,
        }
    }

    /// Maps an engine error onto an outcome: typed store errors are the
    /// caller's to fix, anything else is an internal failure.
    #[must_use]
    pub fn from_error(err: &anyhow::Error) -> Self {
        if let Some(privacy) = err.downcast_ref::<PrivacyError>() {
            let mut details = json!({
                "code": privacy.code(),
                "reason": privacy.reason(),
            });
            if let Some(hint) = privacy.hint() {
                details["hint"] = json!(hint);
            }
            return Self::user_error(privacy.to_string(), details);
        }
        Self::failure(
            format!("{err:#}"),
            json!({
                "code": commands::GENERIC,
                "reason": "internal_error",
            }),
        )
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Ok
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CommandStatus {
    Ok,
    UserError,
    Failure,
}

impl CommandStatus {
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::UserError => 1,
            Self::Failure => 2,
        }
    }
}
