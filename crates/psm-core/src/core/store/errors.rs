use std::path::PathBuf;

use psm_domain::ScopeClass;

use crate::core::tooling::diagnostics::{access, daemon, identity, locator, schema, service};

/// Errors surfaced by the permission-store engine.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PrivacyError {
    #[error("[PSM201] permission denied: {reason}")]
    PermissionDenied { reason: String },
    #[error("[PSM202] will not create an access database for the root user")]
    RootStoreRefused,
    #[error("[PSM301] invalid username supplied: {user}")]
    InvalidUser { user: String },
    #[error("[PSM302] permission store not found: {reason}")]
    StoreNotFound { reason: String },
    #[error("[PSM303] no {scope_class} access database is open for {scope}")]
    StoreNotOpen {
        scope_class: ScopeClass,
        scope: String,
    },
    #[error("[PSM101] invalid service provided: {key}")]
    UnknownService { key: String },
    #[error("[PSM102] service '{service}' does not exist on Darwin {darwin} (requires {required})")]
    ServiceUnsupported {
        service: String,
        darwin: u32,
        required: u32,
    },
    #[error("[PSM103] {backend} is not supported on Darwin {darwin} (requires {required})")]
    UnsupportedOs {
        backend: &'static str,
        darwin: u32,
        required: u32,
    },
    #[error("[PSM401] failed to create access database at {}: {reason}", path.display())]
    SchemaCreationFailed { path: PathBuf, reason: String },
    #[error("[PSM501] unable to repair permissions on {}: {reason}", path.display())]
    PermissionRepairFailed { path: PathBuf, reason: String },
    #[error("[PSM502] failed to {action} the location daemon: {reason}")]
    DaemonControlFailed { action: &'static str, reason: String },
    #[error("[PSM503] a location session is already open in this process")]
    NestedSession,
    #[error("[PSM601] application not found: {query}")]
    AppNotFound { query: String },
    #[error("[PSM602] bundle identifier '{bundle_id}' has no vendor component")]
    MalformedBundleId { bundle_id: String },
    #[error("[PSM603] hardware UUID unavailable: {reason}")]
    HardwareIdentityUnavailable { reason: String },
}

impl PrivacyError {
    pub(crate) fn denied(reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(reason: impl Into<String>) -> Self {
        Self::StoreNotFound {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied { .. } => access::PERMISSION_DENIED,
            Self::RootStoreRefused => access::ROOT_STORE_REFUSED,
            Self::InvalidUser { .. } => locator::INVALID_USER,
            Self::StoreNotFound { .. } => locator::STORE_NOT_FOUND,
            Self::StoreNotOpen { .. } => locator::STORE_NOT_OPEN,
            Self::UnknownService { .. } => service::UNKNOWN,
            Self::ServiceUnsupported { .. } => service::UNSUPPORTED,
            Self::UnsupportedOs { .. } => service::UNSUPPORTED_OS,
            Self::SchemaCreationFailed { .. } => schema::CREATION_FAILED,
            Self::PermissionRepairFailed { .. } => daemon::REPAIR_FAILED,
            Self::DaemonControlFailed { .. } => daemon::CONTROL_FAILED,
            Self::NestedSession => daemon::NESTED_SESSION,
            Self::AppNotFound { .. } => identity::APP_NOT_FOUND,
            Self::MalformedBundleId { .. } => identity::MALFORMED_BUNDLE_ID,
            Self::HardwareIdentityUnavailable { .. } => identity::HARDWARE_UNAVAILABLE,
        }
    }

    /// Short machine-readable tag used in JSON details.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::PermissionDenied { .. } => "permission_denied",
            Self::RootStoreRefused => "root_store_refused",
            Self::InvalidUser { .. } => "invalid_user",
            Self::StoreNotFound { .. } => "store_not_found",
            Self::StoreNotOpen { .. } => "store_not_open",
            Self::UnknownService { .. } => "unknown_service",
            Self::ServiceUnsupported { .. } => "service_unsupported",
            Self::UnsupportedOs { .. } => "unsupported_os",
            Self::SchemaCreationFailed { .. } => "schema_creation_failed",
            Self::PermissionRepairFailed { .. } => "permission_repair_failed",
            Self::DaemonControlFailed { .. } => "daemon_control_failed",
            Self::NestedSession => "nested_session",
            Self::AppNotFound { .. } => "app_not_found",
            Self::MalformedBundleId { .. } => "malformed_bundle_id",
            Self::HardwareIdentityUnavailable { .. } => "hardware_identity_unavailable",
        }
    }

    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::PermissionDenied { .. } => Some("Re-run the command as root (e.g. with sudo)."),
            Self::RootStoreRefused => Some(
                "Use `--user NAME` to change another user's permissions, or pass `--forceroot` to really create root's own database.",
            ),
            Self::InvalidUser { .. } => Some("Check the account name with `dscl . -list /Users`."),
            Self::UnknownService { .. } => Some("Run `psm services` to list the known services."),
            Self::AppNotFound { .. } => Some(
                "Pass a bundle identifier (com.apple.Safari) or the path to the .app bundle.",
            ),
            Self::NestedSession => Some("Close the current location session before opening another."),
            _ => None,
        }
    }
}
