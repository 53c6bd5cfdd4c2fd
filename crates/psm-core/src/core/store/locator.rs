//! Maps scopes onto permission-store files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use psm_domain::Scope;
use tracing::debug;

use super::PrivacyError;
use crate::core::runtime::effects::{HostInfo, UserDirectory};

/// Location of the access database relative to a home directory.
pub const ACCESS_DB_RELATIVE: &str = "Library/Application Support/com.apple.TCC/TCC.db";
const GLOBAL_ACCESS_DB: &str = "/Library/Application Support/com.apple.TCC/TCC.db";
const TEMPLATE_ROOT: &str = "/System/Library/User Template";
const USERS_ROOT: &str = "/Users";
const LOCATIOND_DIR: &str = "/var/db/locationd";
const LOCATION_CLIENTS_FILE: &str = "clients.plist";
const BY_HOST_DIR: &str = "Library/Preferences/ByHost";
const FLAG_PREFIX: &str = "com.apple.locationd.";
const FLAG_SUFFIX: &str = ".plist";

/// Fixed system paths, resolved under a configurable filesystem root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn system() -> Self {
        Self::new(PathBuf::from("/"))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn under(&self, absolute: &str) -> PathBuf {
        self.root.join(absolute.trim_start_matches('/'))
    }

    #[must_use]
    pub fn global_access_store(&self) -> PathBuf {
        self.under(GLOBAL_ACCESS_DB)
    }

    #[must_use]
    pub fn template_access_store(&self, language: &str) -> PathBuf {
        self.under(TEMPLATE_ROOT)
            .join(format!("{language}.lproj"))
            .join(ACCESS_DB_RELATIVE)
    }

    #[must_use]
    pub fn users_root(&self) -> PathBuf {
        self.under(USERS_ROOT)
    }

    #[must_use]
    pub fn location_dir(&self) -> PathBuf {
        self.under(LOCATIOND_DIR)
    }

    #[must_use]
    pub fn location_clients(&self) -> PathBuf {
        self.location_dir().join(LOCATION_CLIENTS_FILE)
    }

    #[must_use]
    pub fn location_by_host_dir(&self) -> PathBuf {
        self.location_dir().join(BY_HOST_DIR)
    }
}

/// Effective privilege, captured once when a session is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivilegeContext {
    elevated: bool,
}

impl PrivilegeContext {
    #[must_use]
    pub fn capture(host: &dyn HostInfo) -> Self {
        Self {
            elevated: host.is_elevated(),
        }
    }

    #[must_use]
    pub const fn elevated() -> Self {
        Self { elevated: true }
    }

    #[must_use]
    pub const fn unprivileged() -> Self {
        Self { elevated: false }
    }

    #[must_use]
    pub const fn is_elevated(self) -> bool {
        self.elevated
    }

    /// Fails with `PermissionDenied` unless elevated.
    pub fn require(self, action: &str) -> Result<(), PrivacyError> {
        if self.elevated {
            Ok(())
        } else {
            Err(PrivacyError::denied(format!("must be root to {action}")))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// The relational access-control database.
    AccessControl,
    /// The per-application location authorizations.
    LocationClients,
    /// The per-host file holding the global location switch.
    LocationFlag,
}

pub struct StoreLocator<'a> {
    layout: &'a StoreLayout,
    users: &'a dyn UserDirectory,
    host: &'a dyn HostInfo,
    privilege: PrivilegeContext,
}

impl<'a> StoreLocator<'a> {
    #[must_use]
    pub fn new(
        layout: &'a StoreLayout,
        users: &'a dyn UserDirectory,
        host: &'a dyn HostInfo,
        privilege: PrivilegeContext,
    ) -> Self {
        Self {
            layout,
            users,
            host,
            privilege,
        }
    }

    /// Absolute path of the store backing `scope` in `backend`.
    ///
    /// # Errors
    /// `InvalidUser`, `PermissionDenied` or `StoreNotFound` per scope.
    pub fn locate(&self, scope: &Scope, backend: StoreBackend) -> Result<PathBuf> {
        match backend {
            StoreBackend::AccessControl => self.access_store(scope),
            StoreBackend::LocationClients | StoreBackend::LocationFlag
                if *scope != Scope::Global =>
            {
                Err(PrivacyError::not_found(format!(
                    "location preferences are machine-wide; {scope} has none"
                ))
                .into())
            }
            StoreBackend::LocationClients => Ok(self.layout.location_clients()),
            StoreBackend::LocationFlag => self.location_flag_file(),
        }
    }

    pub fn access_store(&self, scope: &Scope) -> Result<PathBuf> {
        match scope {
            Scope::Global => Ok(self.layout.global_access_store()),
            Scope::Template(language) => {
                self.privilege.require("modify the user template")?;
                Ok(self.layout.template_access_store(language))
            }
            Scope::User(name) => Ok(self.user_home(name)?.join(ACCESS_DB_RELATIVE)),
        }
    }

    fn user_home(&self, name: &str) -> Result<PathBuf, PrivacyError> {
        if let Some(home) = self.users.home_dir(name) {
            return Ok(home);
        }
        // Accounts missing from the user database may still have a home folder.
        let fallback = self.layout.users_root().join(name);
        if !name.is_empty() && fallback.is_dir() {
            debug!(user = name, home = %fallback.display(), "using conventional home directory");
            return Ok(fallback);
        }
        Err(PrivacyError::InvalidUser {
            user: name.to_string(),
        })
    }

    /// Per-host preference file holding the global location switch.
    pub fn location_flag_file(&self) -> Result<PathBuf> {
        let uuid = self.host.hardware_uuid()?;
        let dir = self.layout.location_by_host_dir();
        let expected = dir.join(flag_file_name(&uuid));
        if expected.is_file() {
            return Ok(expected);
        }
        debug!(expected = %expected.display(), "location preferences not at expected path; scanning");
        let listing = list_file_names(&dir)?;
        Ok(select_flag_file(&dir, &uuid, &listing)?)
    }
}

fn flag_file_name(id: &str) -> String {
    format!("{FLAG_PREFIX}{id}{FLAG_SUFFIX}")
}

fn list_file_names(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(PrivacyError::not_found(format!(
            "no location preferences directory at {}",
            dir.display()
        ))
        .into());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Picks the per-host location file for `uuid` out of a directory listing.
///
/// Candidates are `com.apple.locationd.<ID>.plist` with a dot-free `<ID>`. A lone
/// candidate wins outright; several are narrowed by matching `<ID>` against the
/// UUID or one of its hyphen-separated segments, in either letter case, and
/// must narrow to exactly one.
pub fn select_flag_file(dir: &Path, uuid: &str, listing: &[String]) -> Result<PathBuf, PrivacyError> {
    let mut candidates: Vec<&str> = listing
        .iter()
        .filter_map(|name| name.strip_prefix(FLAG_PREFIX)?.strip_suffix(FLAG_SUFFIX))
        .filter(|id| !id.is_empty() && !id.contains('.'))
        .collect();
    candidates.sort_unstable();
    match candidates.as_slice() {
        [] => Err(PrivacyError::not_found(format!(
            "no location preferences found in {}",
            dir.display()
        ))),
        [only] => Ok(dir.join(flag_file_name(only))),
        many => {
            let matching: Vec<&&str> = many.iter().filter(|id| uuid_matches(uuid, id)).collect();
            match matching.as_slice() {
                [id] => Ok(dir.join(flag_file_name(id))),
                [] => Err(PrivacyError::not_found(format!(
                    "{} location preference files in {} and none match hardware UUID {uuid}",
                    many.len(),
                    dir.display()
                ))),
                ambiguous => Err(PrivacyError::not_found(format!(
                    "ambiguous location preferences in {}: {} files match hardware UUID {uuid}",
                    dir.display(),
                    ambiguous.len()
                ))),
            }
        }
    }
}

fn uuid_matches(uuid: &str, id: &str) -> bool {
    let same = |part: &str| part == id || part.to_lowercase() == id || part.to_uppercase() == id;
    same(uuid) || uuid.split('-').any(same)
}
