//! Start/stop control of the location daemon around preference edits.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use super::PrivacyError;
use crate::core::runtime::effects::LaunchControl;
use crate::core::runtime::process::RunOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonState {
    Running,
    Stopped,
}

pub struct DaemonController<'a> {
    launch: &'a dyn LaunchControl,
    store_dir: PathBuf,
    state: DaemonState,
}

impl<'a> DaemonController<'a> {
    /// A controller for a daemon assumed to be running, owning `store_dir`.
    #[must_use]
    pub fn new(launch: &'a dyn LaunchControl, store_dir: &Path) -> Self {
        Self {
            launch,
            store_dir: store_dir.to_path_buf(),
            state: DaemonState::Running,
        }
    }

    #[must_use]
    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// Repairs ownership of the store directory, then unloads the daemon.
    ///
    /// # Errors
    /// `PermissionRepairFailed` or `DaemonControlFailed`; the state stays
    /// `Running` on either.
    pub fn stop(&mut self) -> Result<()> {
        if self.state == DaemonState::Stopped {
            return Ok(());
        }
        self.repair_ownership()?;
        let output = self.launch.stop()?;
        check("stop", &output)?;
        self.state = DaemonState::Stopped;
        info!("stopped the location daemon; it will be restarted when editing completes");
        Ok(())
    }

    /// Reloads the daemon after a best-effort ownership repair.
    pub fn start(&mut self) -> Result<()> {
        if self.state == DaemonState::Running {
            return Ok(());
        }
        if let Err(err) = self.repair_ownership() {
            warn!(error = %err, "continuing to restart the location daemon");
        }
        let output = self.launch.start()?;
        check("start", &output)?;
        self.state = DaemonState::Running;
        info!("restarted the location daemon");
        Ok(())
    }

    fn repair_ownership(&self) -> Result<()> {
        let output = self.launch.repair_ownership(&self.store_dir).map_err(|err| {
            PrivacyError::PermissionRepairFailed {
                path: self.store_dir.clone(),
                reason: format!("{err:#}"),
            }
        })?;
        if !output.success() {
            return Err(PrivacyError::PermissionRepairFailed {
                path: self.store_dir.clone(),
                reason: format!("exit code {}: {}", output.code, output.combined()),
            }
            .into());
        }
        Ok(())
    }
}

fn check(action: &'static str, output: &RunOutput) -> Result<(), PrivacyError> {
    if output.success() {
        Ok(())
    } else {
        Err(PrivacyError::DaemonControlFailed {
            action,
            reason: format!("exit code {}: {}", output.code, output.combined()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::testing::FakeLaunch;

    fn privacy(err: &anyhow::Error) -> Option<&PrivacyError> {
        err.downcast_ref::<PrivacyError>()
    }

    #[test]
    fn stop_then_start_round_trips() -> Result<()> {
        let launch = FakeLaunch::default();
        let mut daemon = DaemonController::new(&launch, Path::new("/var/db/locationd"));
        assert_eq!(daemon.state(), DaemonState::Running);
        daemon.stop()?;
        assert_eq!(daemon.state(), DaemonState::Stopped);
        daemon.stop()?;
        daemon.start()?;
        assert_eq!(daemon.state(), DaemonState::Running);
        assert_eq!(
            launch.calls(),
            vec![
                "chown /var/db/locationd",
                "stop",
                "chown /var/db/locationd",
                "start"
            ]
        );
        Ok(())
    }

    #[test]
    fn ownership_failure_keeps_the_daemon_running() {
        let launch = FakeLaunch::default().failing_chown();
        let mut daemon = DaemonController::new(&launch, Path::new("/var/db/locationd"));
        let err = daemon.stop().unwrap_err();
        assert!(matches!(
            privacy(&err),
            Some(PrivacyError::PermissionRepairFailed { .. })
        ));
        assert_eq!(daemon.state(), DaemonState::Running);
        assert_eq!(launch.calls(), vec!["chown /var/db/locationd"]);
    }

    #[test]
    fn non_zero_exits_are_fatal() {
        let launch = FakeLaunch::default().failing_stop();
        let mut daemon = DaemonController::new(&launch, Path::new("/db"));
        let err = daemon.stop().unwrap_err();
        assert!(matches!(
            privacy(&err),
            Some(PrivacyError::DaemonControlFailed { action: "stop", .. })
        ));
        assert_eq!(daemon.state(), DaemonState::Running);
    }

    #[test]
    fn start_ignores_repair_failures_but_not_load_failures() -> Result<()> {
        let launch = FakeLaunch::default();
        let failing = FakeLaunch::default().failing_chown().failing_start();
        let mut daemon = DaemonController::new(&launch, Path::new("/db"));
        daemon.stop()?;
        daemon.launch = &failing;
        let err = daemon.start().unwrap_err();
        assert!(matches!(
            privacy(&err),
            Some(PrivacyError::DaemonControlFailed { action: "start", .. })
        ));
        assert_eq!(daemon.state(), DaemonState::Stopped);
        assert_eq!(failing.calls(), vec!["chown /db", "start"]);
        Ok(())
    }
}
