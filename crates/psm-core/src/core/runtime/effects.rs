use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use psm_domain::{AppIdentity, DarwinVersion};

use super::apps::SystemAppResolver;
use super::process::{run_command, RunOutput};
use crate::core::store::PrivacyError;

const IOREG: &str = "/usr/sbin/ioreg";
const LAUNCHCTL: &str = "/bin/launchctl";
const CHOWN: &str = "/usr/sbin/chown";
const LOCATIOND_LAUNCH_PLIST: &str = "/System/Library/LaunchDaemons/com.apple.locationd.plist";
const LOCATIOND_OWNER: &str = "_locationd:_locationd";

/// Facts about the running machine and process.
pub trait HostInfo: Send + Sync {
    fn darwin_version(&self) -> Result<DarwinVersion>;
    fn is_elevated(&self) -> bool;
    fn hardware_uuid(&self) -> Result<String>;
}

pub trait UserDirectory: Send + Sync {
    /// Home directory from the user database, `None` when the account is unknown.
    fn home_dir(&self, name: &str) -> Option<PathBuf>;
    fn current_user(&self) -> Result<String>;
}

pub trait AppResolver: Send + Sync {
    /// Resolves a bundle identifier, `.app` path or short name.
    fn resolve(&self, query: &str) -> Result<AppIdentity>;
}

/// Process control for the location daemon.
pub trait LaunchControl: Send + Sync {
    fn stop(&self) -> Result<RunOutput>;
    fn start(&self) -> Result<RunOutput>;
    fn repair_ownership(&self, dir: &Path) -> Result<RunOutput>;
}

pub trait Effects: Send + Sync {
    fn host(&self) -> &dyn HostInfo;
    fn users(&self) -> &dyn UserDirectory;
    fn apps(&self) -> &dyn AppResolver;
    fn launch(&self) -> &dyn LaunchControl;
}

pub type SharedEffects = Arc<dyn Effects>;

pub struct SystemEffects {
    host: Arc<SystemHost>,
    users: Arc<SystemUsers>,
    apps: Arc<SystemAppResolver>,
    launch: Arc<SystemLaunchControl>,
}

impl SystemEffects {
    #[must_use]
    pub fn new() -> Self {
        Self {
            host: Arc::new(SystemHost),
            users: Arc::new(SystemUsers),
            apps: Arc::new(SystemAppResolver::with_default_search_dirs()),
            launch: Arc::new(SystemLaunchControl),
        }
    }

    #[must_use]
    pub fn shared() -> SharedEffects {
        Arc::new(Self::new())
    }
}

impl Default for SystemEffects {
    fn default() -> Self {
        Self::new()
    }
}

impl Effects for SystemEffects {
    fn host(&self) -> &dyn HostInfo {
        self.host.as_ref()
    }

    fn users(&self) -> &dyn UserDirectory {
        self.users.as_ref()
    }

    fn apps(&self) -> &dyn AppResolver {
        self.apps.as_ref()
    }

    fn launch(&self) -> &dyn LaunchControl {
        self.launch.as_ref()
    }
}

struct SystemHost;

impl HostInfo for SystemHost {
    fn darwin_version(&self) -> Result<DarwinVersion> {
        let uts = nix::sys::utsname::uname().context("could not acquire the OS version")?;
        DarwinVersion::parse_release(&uts.release().to_string_lossy())
    }

    fn is_elevated(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }

    fn hardware_uuid(&self) -> Result<String> {
        let args = ["-rd1", "-c", "IOPlatformExpertDevice"].map(String::from);
        let output = run_command(IOREG, &args).map_err(|err| {
            PrivacyError::HardwareIdentityUnavailable {
                reason: format!("{err:#}"),
            }
        })?;
        if !output.success() {
            return Err(PrivacyError::HardwareIdentityUnavailable {
                reason: format!("ioreg exited with {}: {}", output.code, output.combined()),
            }
            .into());
        }
        Ok(parse_platform_uuid(&output.stdout)?)
    }
}

/// Extracts the value of the single `IOPlatformUUID` line of `ioreg` output.
pub(crate) fn parse_platform_uuid(ioreg: &str) -> Result<String, PrivacyError> {
    let lines: Vec<&str> = ioreg.lines().filter(|line| line.contains("UUID")).collect();
    let [line] = lines.as_slice() else {
        return Err(PrivacyError::HardwareIdentityUnavailable {
            reason: format!("expected one UUID line, found {}", lines.len()),
        });
    };
    line.split_once("= \"")
        .map(|(_, value)| value.trim().trim_end_matches('"').to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| PrivacyError::HardwareIdentityUnavailable {
            reason: format!("malformed UUID line: {}", line.trim()),
        })
}

struct SystemUsers;

impl UserDirectory for SystemUsers {
    fn home_dir(&self, name: &str) -> Option<PathBuf> {
        nix::unistd::User::from_name(name)
            .ok()
            .flatten()
            .map(|user| user.dir)
            .filter(|dir| dir.is_absolute())
    }

    fn current_user(&self) -> Result<String> {
        let uid = nix::unistd::getuid();
        if let Some(user) = nix::unistd::User::from_uid(uid)
            .with_context(|| format!("failed to look up uid {uid}"))?
        {
            return Ok(user.name);
        }
        std::env::var("USER").with_context(|| format!("no user database entry for uid {uid}"))
    }
}

struct SystemLaunchControl;

impl SystemLaunchControl {
    fn launchctl(verb: &str) -> Result<RunOutput> {
        let args = [verb, LOCATIOND_LAUNCH_PLIST].map(String::from);
        run_command(LAUNCHCTL, &args)
    }
}

impl LaunchControl for SystemLaunchControl {
    fn stop(&self) -> Result<RunOutput> {
        Self::launchctl("unload")
    }

    fn start(&self) -> Result<RunOutput> {
        Self::launchctl("load")
    }

    fn repair_ownership(&self, dir: &Path) -> Result<RunOutput> {
        let args = vec![
            "-R".to_string(),
            LOCATIOND_OWNER.to_string(),
            dir.display().to_string(),
        ];
        run_command(CHOWN, &args)
    }
}
