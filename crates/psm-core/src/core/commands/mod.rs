//! Request-level entry points used by the CLI.

mod output;

use std::path::Path;

use anyhow::{Context, Result};
use psm_domain::{
    lookup_service, AppIdentity, Client, DarwinVersion, Scope, ServiceDescriptor, SERVICES,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

pub use output::{format_status_message, to_json_response};

use crate::core::config::context::{CommandContext, CommandGroup, CommandInfo};
use crate::core::store::access::{
    AccessSession, AccessSessionOptions, MutationOutcome, SessionEnv,
};
use crate::core::store::location::{with_location_session, LocationEnv};
use crate::core::store::PrivacyError;
use crate::core::tooling::diagnostics::{commands, service};
use crate::core::tooling::outcome::ExecutionOutcome;

pub const DEFAULT_LANGUAGE: &str = "English";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyAction {
    Add,
    Enable,
    Remove,
    Disable,
}

impl PrivacyAction {
    #[must_use]
    pub fn group(self) -> CommandGroup {
        match self {
            Self::Add => CommandGroup::Add,
            Self::Enable => CommandGroup::Enable,
            Self::Remove => CommandGroup::Remove,
            Self::Disable => CommandGroup::Disable,
        }
    }

    fn grants(self) -> bool {
        matches!(self, Self::Add | Self::Enable)
    }

    /// Diagnostic code reported with a successful run.
    fn code(self) -> &'static str {
        match self {
            Self::Add | Self::Enable => commands::ADD,
            Self::Remove => commands::REMOVE,
            Self::Disable => commands::DISABLE,
        }
    }

    fn past_tense(self) -> &'static str {
        match self {
            Self::Add | Self::Enable => "granted",
            Self::Remove => "removed",
            Self::Disable => "denied",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct PrivacyRequest {
    pub action: PrivacyAction,
    pub service: String,
    pub apps: Vec<String>,
    pub user: Option<String>,
    pub template: bool,
    pub language: String,
    pub force_root: bool,
    /// Treat applications as filesystem paths instead of resolving bundles.
    pub admin: bool,
}

impl PrivacyRequest {
    #[must_use]
    pub fn new(action: PrivacyAction, service: impl Into<String>) -> Self {
        Self {
            action,
            service: service.into(),
            apps: Vec::new(),
            user: None,
            template: false,
            language: DEFAULT_LANGUAGE.to_string(),
            force_root: false,
            admin: false,
        }
    }

    /// Identifies the command for status lines, e.g. `psm add contacts`.
    #[must_use]
    pub fn info(&self) -> CommandInfo {
        let name = lookup_service(&self.service).map_or("unknown", |descriptor| descriptor.key);
        CommandInfo::new(self.action.group(), name)
    }
}

/// Runs one add/enable/remove/disable request.
///
/// Store errors come back as user-error outcomes; only unexpected failures are
/// returned as `Err`.
///
/// # Errors
/// Returns an error when something outside the permission-store taxonomy fails.
pub fn execute(ctx: &CommandContext<'_>, request: &PrivacyRequest) -> Result<ExecutionOutcome> {
    match run(ctx, request) {
        Ok(outcome) => Ok(outcome),
        Err(err) if err.downcast_ref::<PrivacyError>().is_some() => {
            debug!(error = %format!("{err:#}"), "request rejected");
            Ok(ExecutionOutcome::from_error(&err))
        }
        Err(err) => Err(err),
    }
}

fn run(ctx: &CommandContext<'_>, request: &PrivacyRequest) -> Result<ExecutionOutcome> {
    let descriptor = lookup_service(&request.service).ok_or_else(|| PrivacyError::UnknownService {
        key: request.service.clone(),
    })?;
    let darwin = ctx.darwin_version()?;
    // Removal stays possible so rows left behind by a newer OS can be cleaned up.
    if request.action != PrivacyAction::Remove && !descriptor.available_on(darwin.major()) {
        return Err(PrivacyError::ServiceUnsupported {
            service: descriptor.key.to_string(),
            darwin: darwin.major(),
            required: descriptor.min_darwin,
        }
        .into());
    }
    if descriptor.is_location() {
        run_location(ctx, descriptor, request, darwin)
    } else {
        run_access(ctx, descriptor, request, darwin)
    }
}

fn scope_for(ctx: &CommandContext<'_>, request: &PrivacyRequest) -> Result<Scope> {
    if request.template {
        return Ok(Scope::template(request.language.clone()));
    }
    match &request.user {
        Some(user) => Ok(Scope::user(user.clone())),
        None => Ok(Scope::user(ctx.users().current_user()?)),
    }
}

fn resolve_apps(ctx: &CommandContext<'_>, apps: &[String]) -> Result<Vec<AppIdentity>> {
    apps.iter()
        .map(|app| {
            ctx.apps()
                .resolve(app)
                .with_context(|| format!("resolving application '{app}'"))
        })
        .collect()
}

fn no_applications(descriptor: &ServiceDescriptor) -> ExecutionOutcome {
    ExecutionOutcome::user_error(
        format!("no applications given for service '{}'", descriptor.key),
        json!({
            "code": service::NO_APPLICATIONS,
            "reason": "no_applications",
            "hint": "Name one or more applications after the service.",
        }),
    )
}

fn run_access(
    ctx: &CommandContext<'_>,
    descriptor: &'static ServiceDescriptor,
    request: &PrivacyRequest,
    darwin: DarwinVersion,
) -> Result<ExecutionOutcome> {
    if request.apps.is_empty() {
        return Ok(no_applications(descriptor));
    }
    let clients: Vec<Client> = if request.admin {
        let cwd = std::env::current_dir().context("failed to read the working directory")?;
        request
            .apps
            .iter()
            .map(|app| Client::path(Path::new(app), &cwd))
            .collect()
    } else {
        resolve_apps(ctx, &request.apps)?
            .into_iter()
            .map(|identity| Client::bundle_id(identity.bundle_id))
            .collect()
    };

    let scope = scope_for(ctx, request)?;
    let env = SessionEnv {
        layout: ctx.layout(),
        users: ctx.users(),
        host: ctx.host(),
        privilege: ctx.privilege(),
        darwin,
    };
    let options = AccessSessionOptions {
        force_root: request.force_root,
        default_service: Some(descriptor.key.to_string()),
    };
    let mut session = AccessSession::open(&env, scope.clone(), &options)?;
    let mut applied = Vec::with_capacity(clients.len());
    for client in &clients {
        let outcome = match request.action {
            PrivacyAction::Add | PrivacyAction::Enable => session.insert(client, None)?,
            PrivacyAction::Remove => session.remove(client, None)?,
            PrivacyAction::Disable => session.disable(client, None)?,
        };
        if outcome == MutationOutcome::Applied {
            applied.push(client.as_column());
        }
    }
    let store = if descriptor.scope_class() == psm_domain::ScopeClass::Root {
        Some(session.global_path().display().to_string())
    } else {
        session.local_path().map(|path| path.display().to_string())
    };
    session.close();

    Ok(ExecutionOutcome::success(
        format!(
            "{} {} for {} ({})",
            request.action.past_tense(),
            descriptor.key,
            applied.join(", "),
            scope
        ),
        json!({
            "code": request.action.code(),
            "service": descriptor.key,
            "action": request.action,
            "scope": scope,
            "clients": applied,
            "store": store,
        }),
    ))
}

fn run_location(
    ctx: &CommandContext<'_>,
    descriptor: &'static ServiceDescriptor,
    request: &PrivacyRequest,
    darwin: DarwinVersion,
) -> Result<ExecutionOutcome> {
    let apps = resolve_apps(ctx, &request.apps)?;
    let env = LocationEnv {
        layout: ctx.layout(),
        users: ctx.users(),
        host: ctx.host(),
        launch: ctx.launch(),
        privilege: ctx.privilege(),
        darwin,
    };
    let action = request.action;
    with_location_session(env, |session| {
        if apps.is_empty() {
            return session.set_enabled(action.grants());
        }
        for app in &apps {
            match action {
                PrivacyAction::Add | PrivacyAction::Enable => session.insert(app)?,
                PrivacyAction::Remove => session.remove(app)?,
                PrivacyAction::Disable => session.disable(app)?,
            }
        }
        Ok(())
    })?;

    if apps.is_empty() {
        let state = if action.grants() { "enabled" } else { "disabled" };
        return Ok(ExecutionOutcome::success(
            format!("{state} {} globally", descriptor.key),
            json!({
                "code": action.code(),
                "service": descriptor.key,
                "action": action,
                "global": action.grants(),
            }),
        ));
    }
    let bundle_ids: Vec<&str> = apps.iter().map(|app| app.bundle_id.as_str()).collect();
    Ok(ExecutionOutcome::success(
        format!(
            "{} {} for {}",
            action.past_tense(),
            descriptor.key,
            bundle_ids.join(", ")
        ),
        json!({
            "code": action.code(),
            "service": descriptor.key,
            "action": action,
            "clients": bundle_ids,
        }),
    ))
}

/// Lists the service catalog with availability on the running OS.
///
/// # Errors
/// Returns an error if the OS version cannot be determined.
pub fn list_services(ctx: &CommandContext<'_>) -> Result<ExecutionOutcome> {
    let darwin = ctx.darwin_version()?;
    let services: Vec<_> = SERVICES
        .iter()
        .map(|descriptor| {
            json!({
                "key": descriptor.key,
                "service_name": descriptor.service_name(),
                "scope": descriptor.scope_class(),
                "min_darwin": descriptor.min_darwin,
                "available": descriptor.available_on(darwin.major()),
                "summary": descriptor.summary,
            })
        })
        .collect();
    let available = SERVICES
        .iter()
        .filter(|descriptor| descriptor.available_on(darwin.major()))
        .count();
    Ok(ExecutionOutcome::success(
        format!("{available} of {} services available on {darwin}", SERVICES.len()),
        json!({
            "code": commands::SERVICES,
            "darwin": darwin.major(),
            "services": services,
        }),
    ))
}
