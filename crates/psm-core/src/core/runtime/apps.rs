//! Application identity lookup over `.app` bundles on disk.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use psm_domain::AppIdentity;
use tracing::debug;

use super::effects::AppResolver;
use crate::core::store::PrivacyError;

const SYSTEM_APP_DIRS: [&str; 4] = [
    "/Applications",
    "/Applications/Utilities",
    "/System/Applications",
    "/System/Applications/Utilities",
];

/// Resolves applications by path, bundle identifier or short name.
pub struct SystemAppResolver {
    search_dirs: Vec<PathBuf>,
}

impl SystemAppResolver {
    #[must_use]
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs }
    }

    #[must_use]
    pub fn with_default_search_dirs() -> Self {
        let mut dirs: Vec<PathBuf> = SYSTEM_APP_DIRS.iter().map(PathBuf::from).collect();
        if let Some(home) = dirs_next::home_dir() {
            dirs.push(home.join("Applications"));
        }
        Self::new(dirs)
    }

    fn bundles(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.search_dirs
            .iter()
            .filter_map(|dir| fs::read_dir(dir).ok())
            .flat_map(|entries| entries.filter_map(|entry| entry.ok().map(|e| e.path())))
            .filter(|path| is_app_bundle(path))
    }

    fn by_name(&self, name: &str) -> Option<PathBuf> {
        self.bundles().find(|path| {
            path.file_stem()
                .and_then(|stem| stem.to_str())
                .is_some_and(|stem| stem.eq_ignore_ascii_case(name))
        })
    }

    fn by_bundle_id(&self, bundle_id: &str) -> Option<AppIdentity> {
        self.bundles()
            .filter_map(|path| read_bundle(&path).ok())
            .find(|identity| identity.bundle_id.eq_ignore_ascii_case(bundle_id))
    }
}

impl AppResolver for SystemAppResolver {
    fn resolve(&self, query: &str) -> Result<AppIdentity> {
        let trimmed = query.trim().trim_end_matches('/');
        let as_path = Path::new(trimmed);
        if is_app_bundle(as_path) {
            return read_bundle(as_path);
        }
        if let Some(path) = self.by_name(trimmed) {
            debug!(query, path = %path.display(), "resolved application by name");
            return read_bundle(&path);
        }
        if trimmed.contains('.') && !trimmed.contains('/') {
            if let Some(identity) = self.by_bundle_id(trimmed) {
                debug!(query, path = %identity.bundle_path.display(), "resolved application by bundle id");
                return Ok(identity);
            }
        }
        Err(PrivacyError::AppNotFound {
            query: query.to_string(),
        }
        .into())
    }
}

fn is_app_bundle(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "app") && path.is_dir()
}

/// Reads `Contents/Info.plist` of an application bundle.
pub(crate) fn read_bundle(bundle: &Path) -> Result<AppIdentity> {
    let info_path = bundle.join("Contents").join("Info.plist");
    let info = plist::Value::from_file(&info_path)
        .with_context(|| format!("failed to read {}", info_path.display()))?;
    let dict = info
        .as_dictionary()
        .ok_or_else(|| anyhow!("{} is not a dictionary", info_path.display()))?;
    let stem = bundle
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let string = |key: &str| {
        dict.get(key)
            .and_then(plist::Value::as_string)
            .map(str::to_string)
    };
    let bundle_id = string("CFBundleIdentifier")
        .ok_or_else(|| anyhow!("{} has no CFBundleIdentifier", info_path.display()))?;
    let bundle_path = fs::canonicalize(bundle).unwrap_or_else(|_| bundle.to_path_buf());
    Ok(AppIdentity {
        bundle_id,
        bundle_path,
        executable: string("CFBundleExecutable").unwrap_or_else(|| stem.clone()),
        name: string("CFBundleName").unwrap_or(stem),
    })
}
