#![deny(clippy::all)]

mod core;

pub mod api;

pub use crate::core::commands::{
    execute, format_status_message, list_services, to_json_response, PrivacyAction,
    PrivacyRequest, DEFAULT_LANGUAGE,
};
pub use crate::core::config::context::{CommandContext, CommandGroup, CommandInfo};
pub use crate::core::config::{Config, GlobalOptions, LoggingConfig};
pub use crate::core::runtime::effects::{SharedEffects, SystemEffects};
pub use crate::core::runtime::process::RunOutput;
pub use crate::core::store::PrivacyError;
pub use crate::core::tooling::diagnostics::commands as diag_commands;
pub use crate::core::tooling::outcome::{CommandStatus, ExecutionOutcome};
