//! Editing sessions over the location daemon's preference files.
//!
//! The daemon caches its preferences and only rereads them on start, so a
//! session stops it on open and restarts it on close, whatever happened in
//! between. One session may be open per process at a time.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use psm_domain::{generation::MIN_LOCATION_DARWIN, AppIdentity, DarwinVersion, Scope};
use tracing::{info, warn};

use super::daemon::{DaemonController, DaemonState};
use super::locator::{PrivilegeContext, StoreBackend, StoreLayout, StoreLocator};
use super::preferences::{
    disable_client, edit_preferences, insert_client, remove_client, set_global_flag,
};
use super::PrivacyError;
use crate::core::runtime::effects::{HostInfo, LaunchControl, UserDirectory};

static SESSION_OPEN: AtomicBool = AtomicBool::new(false);

struct SessionGuard;

impl SessionGuard {
    fn acquire() -> Result<Self, PrivacyError> {
        SESSION_OPEN
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self)
            .map_err(|_| PrivacyError::NestedSession)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        SESSION_OPEN.store(false, Ordering::Release);
    }
}

#[derive(Clone, Copy)]
pub struct LocationEnv<'a> {
    pub layout: &'a StoreLayout,
    pub users: &'a dyn UserDirectory,
    pub host: &'a dyn HostInfo,
    pub launch: &'a dyn LaunchControl,
    pub privilege: PrivilegeContext,
    pub darwin: DarwinVersion,
}

impl<'a> LocationEnv<'a> {
    fn locator(&self) -> StoreLocator<'a> {
        StoreLocator::new(self.layout, self.users, self.host, self.privilege)
    }
}

pub struct LocationSession<'a> {
    env: LocationEnv<'a>,
    clients: PathBuf,
    daemon: DaemonController<'a>,
    _guard: SessionGuard,
}

impl<'a> LocationSession<'a> {
    /// Checks privilege and OS support, then stops the daemon.
    ///
    /// # Errors
    /// `PermissionDenied`, `UnsupportedOs` and `NestedSession` before the daemon
    /// is touched; `PermissionRepairFailed` or `DaemonControlFailed` from the stop.
    pub fn open(env: LocationEnv<'a>) -> Result<Self> {
        env.privilege.require("modify location services")?;
        if env.darwin.major() < MIN_LOCATION_DARWIN {
            return Err(PrivacyError::UnsupportedOs {
                backend: "location services",
                darwin: env.darwin.major(),
                required: MIN_LOCATION_DARWIN,
            }
            .into());
        }
        let guard = SessionGuard::acquire()?;
        let clients = env.locator().locate(&Scope::Global, StoreBackend::LocationClients)?;
        let mut daemon = DaemonController::new(env.launch, &env.layout.location_dir());
        daemon.stop()?;
        info!(path = %clients.display(), "modifying service 'location'");
        Ok(Self {
            env,
            clients,
            daemon,
            _guard: guard,
        })
    }

    #[must_use]
    pub fn daemon_state(&self) -> DaemonState {
        self.daemon.state()
    }

    pub fn insert(&mut self, app: &AppIdentity) -> Result<()> {
        info!(bundle_id = %app.bundle_id, "inserting into service 'location'");
        edit_preferences(&self.clients, |entries| Ok(insert_client(entries, app)?))?;
        info!(bundle_id = %app.bundle_id, "inserted");
        Ok(())
    }

    pub fn remove(&mut self, app: &AppIdentity) -> Result<()> {
        info!(bundle_id = %app.bundle_id, "removing from service 'location'");
        let existed = edit_preferences(&self.clients, |entries| {
            Ok(remove_client(entries, &app.bundle_id))
        })?;
        info!(bundle_id = %app.bundle_id, existed, "removed");
        Ok(())
    }

    pub fn disable(&mut self, app: &AppIdentity) -> Result<()> {
        info!(bundle_id = %app.bundle_id, "disabling in service 'location'");
        edit_preferences(&self.clients, |entries| Ok(disable_client(entries, app)?))?;
        info!(bundle_id = %app.bundle_id, "disabled");
        Ok(())
    }

    /// Flips the machine-wide location switch.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        let path = self
            .env
            .locator()
            .locate(&Scope::Global, StoreBackend::LocationFlag)?;
        set_global_flag(&path, enabled, self.env.darwin)?;
        info!(enabled, "global location services updated");
        Ok(())
    }

    /// Restarts the daemon. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        self.daemon.start()
    }
}

impl Drop for LocationSession<'_> {
    fn drop(&mut self) {
        if self.daemon.state() == DaemonState::Stopped {
            if let Err(err) = self.daemon.start() {
                warn!(error = %err, "failed to restart the location daemon");
            }
        }
    }
}

/// Runs `body` inside a location session, restarting the daemon afterwards
/// even when `body` fails. The body's error wins over a restart error.
pub fn with_location_session<T>(
    env: LocationEnv<'_>,
    body: impl FnOnce(&mut LocationSession<'_>) -> Result<T>,
) -> Result<T> {
    let mut session = LocationSession::open(env)?;
    let result = body(&mut session);
    let closed = session.close();
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) | (Err(err), Ok(())) => Err(err),
        (Err(err), Err(restart)) => {
            warn!(error = %restart, "location daemon restart also failed");
            Err(err)
        }
    }
}
