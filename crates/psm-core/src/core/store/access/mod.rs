//! Sessions over the relational access-control databases.
//!
//! A session holds up to two connections: the machine-wide store (only when
//! the process is elevated) and the per-user or template store of its scope.

mod mutate;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use nix::unistd::{access, AccessFlags};
use psm_domain::{
    lookup_service, DarwinVersion, Scope, ScopeClass, SchemaGeneration, ServiceDescriptor,
};
use rusqlite::Connection;
use tracing::{debug, info, warn};

pub use mutate::{upsert_statement, MutationOutcome};

use super::locator::{PrivilegeContext, StoreLayout, StoreLocator};
use super::schema::{create_access_store, detect_generation};
use super::PrivacyError;
use crate::core::runtime::effects::{HostInfo, UserDirectory};

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a session needs from its surroundings.
#[derive(Clone, Copy)]
pub struct SessionEnv<'a> {
    pub layout: &'a StoreLayout,
    pub users: &'a dyn UserDirectory,
    pub host: &'a dyn HostInfo,
    pub privilege: PrivilegeContext,
    pub darwin: DarwinVersion,
}

impl<'a> SessionEnv<'a> {
    fn locator(&self) -> StoreLocator<'a> {
        StoreLocator::new(self.layout, self.users, self.host, self.privilege)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccessSessionOptions {
    /// Allow creating and using root's own per-user store.
    pub force_root: bool,
    /// Service used when a mutation names none.
    pub default_service: Option<String>,
}

pub struct AccessSession {
    scope: Scope,
    darwin: DarwinVersion,
    generation: SchemaGeneration,
    default_service: Option<&'static ServiceDescriptor>,
    global_path: PathBuf,
    local_path: Option<PathBuf>,
    global: Option<Connection>,
    local: Option<Connection>,
    local_refused: bool,
}

impl AccessSession {
    /// Opens the connections `scope` calls for, creating missing stores.
    ///
    /// # Errors
    /// Fails fast on an unsupported OS, a scope needing elevation the process
    /// lacks, an unwritable per-user store, or a refused root store.
    pub fn open(env: &SessionEnv<'_>, scope: Scope, options: &AccessSessionOptions) -> Result<Self> {
        let generation =
            SchemaGeneration::for_darwin(env.darwin).ok_or(PrivacyError::UnsupportedOs {
                backend: "the access-control database",
                darwin: env.darwin.major(),
                required: psm_domain::generation::MIN_ACCESS_CONTROL_DARWIN,
            })?;
        let default_service = options
            .default_service
            .as_deref()
            .map(access_service)
            .transpose()?;
        if scope == Scope::Global {
            env.privilege.require("modify permissions for all users")?;
        }

        let locator = env.locator();
        let global_path = env.layout.global_access_store();
        info!(path = %global_path.display(), "global permissions for all users");
        let global = if env.privilege.is_elevated() {
            if !global_path.exists() {
                create_access_store(&global_path, generation)?;
            }
            Some(open_connection(&global_path, generation)?)
        } else {
            debug!("not elevated; global access database left closed");
            None
        };

        let mut local_refused = false;
        let (local_path, local) = match &scope {
            Scope::Global => (None, None),
            scope if scope.is_root_user() && !options.force_root => {
                if default_service.is_some_and(|service| service.scope_class() == ScopeClass::Local)
                {
                    return Err(PrivacyError::RootStoreRefused.into());
                }
                local_refused = true;
                (None, None)
            }
            scope => {
                let path = locator.access_store(scope)?;
                info!(path = %path.display(), "local permissions for {scope}");
                if !path.exists() {
                    create_access_store(&path, generation)?;
                }
                ensure_writable(&path, scope)?;
                let conn = open_connection(&path, generation)?;
                (Some(path), Some(conn))
            }
        };

        Ok(Self {
            scope,
            darwin: env.darwin,
            generation,
            default_service,
            global_path,
            local_path,
            global,
            local,
            local_refused,
        })
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    #[must_use]
    pub fn darwin(&self) -> DarwinVersion {
        self.darwin
    }

    #[must_use]
    pub fn generation(&self) -> SchemaGeneration {
        self.generation
    }

    #[must_use]
    pub fn global_path(&self) -> &Path {
        &self.global_path
    }

    #[must_use]
    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }

    #[must_use]
    pub fn has_connection(&self, class: ScopeClass) -> bool {
        match class {
            ScopeClass::Root => self.global.is_some(),
            ScopeClass::Local => self.local.is_some(),
        }
    }

    /// Connection holding `class` services.
    pub(crate) fn connection(&mut self, class: ScopeClass) -> Result<&mut Connection, PrivacyError> {
        match class {
            ScopeClass::Root => self.global.as_mut().ok_or_else(|| {
                PrivacyError::denied("must be root to modify the global access database")
            }),
            ScopeClass::Local if self.local_refused => Err(PrivacyError::RootStoreRefused),
            ScopeClass::Local => self.local.as_mut().ok_or_else(|| PrivacyError::StoreNotOpen {
                scope_class: class,
                scope: self.scope.to_string(),
            }),
        }
    }

    /// Releases both connections. Safe to call repeatedly.
    pub fn close(&mut self) {
        for (label, conn) in [("global", self.global.take()), ("local", self.local.take())] {
            if let Some(conn) = conn {
                if let Err((_, err)) = conn.close() {
                    warn!(connection = label, error = %err, "failed to close access database");
                }
            }
        }
    }
}

impl Drop for AccessSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Looks up a relational service by key.
pub(crate) fn access_service(key: &str) -> Result<&'static ServiceDescriptor, PrivacyError> {
    lookup_service(key)
        .filter(|descriptor| descriptor.service_name().is_some())
        .ok_or_else(|| PrivacyError::UnknownService {
            key: key.to_string(),
        })
}

fn ensure_writable(path: &Path, scope: &Scope) -> Result<(), PrivacyError> {
    access(path, AccessFlags::W_OK).map_err(|errno| {
        PrivacyError::denied(format!(
            "you do not have permission to modify the access database of {scope} ({errno})"
        ))
    })
}

fn open_connection(path: &Path, generation: SchemaGeneration) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open access database at {}", path.display()))?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout for access database")?;
    match detect_generation(&conn) {
        Ok(Some(found)) if found != generation => warn!(
            path = %path.display(),
            ?found,
            expected = ?generation,
            "access table layout does not match the running OS"
        ),
        Ok(_) => {}
        Err(err) => debug!(path = %path.display(), error = %err, "could not inspect access table"),
    }
    Ok(conn)
}

#[cfg(test)]
mod tests;
