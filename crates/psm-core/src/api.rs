// Intended public API surface for `psm-core`.
//
// The CLI and embedders go through these re-exports; everything under
// `crate::core` is free to move.

pub use crate::core::commands::{
    execute, format_status_message, list_services, to_json_response, PrivacyAction,
    PrivacyRequest, DEFAULT_LANGUAGE,
};
pub use crate::core::config::context::{CommandContext, CommandGroup, CommandInfo};
pub use crate::core::config::{
    Config, GlobalOptions, LoggingConfig, DARWIN_VERSION_ENV, LOG_DEST_ENV, LOG_FILTER_ENV,
    ROOT_ENV,
};
pub use crate::core::runtime::apps::SystemAppResolver;
pub use crate::core::runtime::effects::{
    AppResolver, Effects, HostInfo, LaunchControl, SharedEffects, SystemEffects, UserDirectory,
};
pub use crate::core::runtime::process::{run_command, RunOutput};
pub use crate::core::store::access::{
    upsert_statement, AccessSession, AccessSessionOptions, MutationOutcome, SessionEnv,
};
pub use crate::core::store::daemon::{DaemonController, DaemonState};
pub use crate::core::store::locator::{
    select_flag_file, PrivilegeContext, StoreBackend, StoreLayout, StoreLocator,
};
pub use crate::core::store::location::{with_location_session, LocationEnv, LocationSession};
pub use crate::core::store::preferences::{
    edit_preferences, global_flag, set_global_flag, PlistFormat, PreferenceFile,
    PreferenceRecord,
};
pub use crate::core::store::schema::create_access_store;
pub use crate::core::store::PrivacyError;
pub use crate::core::tooling::outcome::{CommandStatus, ExecutionOutcome};
