//! In-memory collaborators for engine tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use psm_domain::{AppIdentity, DarwinVersion};

use super::PrivacyError;
use crate::core::runtime::effects::{
    AppResolver, Effects, HostInfo, LaunchControl, SharedEffects, UserDirectory,
};
use crate::core::runtime::process::RunOutput;

pub(crate) struct FakeHost {
    darwin: u32,
    elevated: bool,
    uuid: Option<String>,
}

impl FakeHost {
    pub(crate) fn new(darwin: u32, elevated: bool) -> Self {
        Self {
            darwin,
            elevated,
            uuid: None,
        }
    }

    pub(crate) fn with_uuid(mut self, uuid: &str) -> Self {
        self.uuid = Some(uuid.to_string());
        self
    }
}

impl HostInfo for FakeHost {
    fn darwin_version(&self) -> Result<DarwinVersion> {
        Ok(DarwinVersion::new(self.darwin))
    }

    fn is_elevated(&self) -> bool {
        self.elevated
    }

    fn hardware_uuid(&self) -> Result<String> {
        self.uuid.clone().ok_or_else(|| {
            PrivacyError::HardwareIdentityUnavailable {
                reason: "no uuid configured".into(),
            }
            .into()
        })
    }
}

pub(crate) struct FakeUsers {
    current: String,
    homes: HashMap<String, PathBuf>,
}

impl FakeUsers {
    pub(crate) fn new(current: &str) -> Self {
        Self {
            current: current.to_string(),
            homes: HashMap::new(),
        }
    }

    pub(crate) fn with_home(mut self, name: &str, home: PathBuf) -> Self {
        self.homes.insert(name.to_string(), home);
        self
    }
}

impl UserDirectory for FakeUsers {
    fn home_dir(&self, name: &str) -> Option<PathBuf> {
        self.homes.get(name).cloned()
    }

    fn current_user(&self) -> Result<String> {
        Ok(self.current.clone())
    }
}

#[derive(Default)]
pub(crate) struct FakeApps {
    known: HashMap<String, AppIdentity>,
}

impl FakeApps {
    /// Registers `bundle_id` as `/Applications/<last component>.app`.
    pub(crate) fn with_app(mut self, bundle_id: &str) -> Self {
        let name = bundle_id.rsplit('.').next().unwrap_or(bundle_id).to_string();
        let identity = AppIdentity {
            bundle_id: bundle_id.to_string(),
            bundle_path: PathBuf::from(format!("/Applications/{name}.app")),
            executable: name.clone(),
            name: name.clone(),
        };
        self.known.insert(bundle_id.to_string(), identity.clone());
        self.known.insert(name, identity);
        self
    }
}

impl AppResolver for FakeApps {
    fn resolve(&self, query: &str) -> Result<AppIdentity> {
        self.known.get(query).cloned().ok_or_else(|| {
            PrivacyError::AppNotFound {
                query: query.to_string(),
            }
            .into()
        })
    }
}

/// Records every launch-control call; exit codes are configurable per verb.
#[derive(Default)]
pub(crate) struct FakeLaunch {
    calls: Mutex<Vec<String>>,
    stop_code: i32,
    start_code: i32,
    chown_code: i32,
}

impl FakeLaunch {
    pub(crate) fn failing_stop(mut self) -> Self {
        self.stop_code = 1;
        self
    }

    pub(crate) fn failing_start(mut self) -> Self {
        self.start_code = 1;
        self
    }

    pub(crate) fn failing_chown(mut self) -> Self {
        self.chown_code = 1;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    fn record(&self, call: String, code: i32) -> Result<RunOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        Ok(RunOutput {
            code,
            stdout: String::new(),
            stderr: if code == 0 { String::new() } else { "simulated failure".into() },
        })
    }
}

impl LaunchControl for FakeLaunch {
    fn stop(&self) -> Result<RunOutput> {
        self.record("stop".into(), self.stop_code)
    }

    fn start(&self) -> Result<RunOutput> {
        self.record("start".into(), self.start_code)
    }

    fn repair_ownership(&self, dir: &Path) -> Result<RunOutput> {
        self.record(format!("chown {}", dir.display()), self.chown_code)
    }
}

pub(crate) struct FakeEffects {
    pub(crate) host: FakeHost,
    pub(crate) users: FakeUsers,
    pub(crate) apps: FakeApps,
    pub(crate) launch: Arc<FakeLaunch>,
}

impl FakeEffects {
    pub(crate) fn new(darwin: u32, elevated: bool) -> Self {
        Self {
            host: FakeHost::new(darwin, elevated),
            users: FakeUsers::new("admin"),
            apps: FakeApps::default(),
            launch: Arc::new(FakeLaunch::default()),
        }
    }

    pub(crate) fn shared(self) -> SharedEffects {
        Arc::new(self)
    }
}

impl Effects for FakeEffects {
    fn host(&self) -> &dyn HostInfo {
        &self.host
    }

    fn users(&self) -> &dyn UserDirectory {
        &self.users
    }

    fn apps(&self) -> &dyn AppResolver {
        &self.apps
    }

    fn launch(&self) -> &dyn LaunchControl {
        self.launch.as_ref()
    }
}
