//! Property-list editing for the location daemon's preference files.
//!
//! Files are rewritten whole through a temporary file in the same directory and
//! renamed into place, so a crash never leaves a half-written dictionary.

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use plist::{Dictionary, Value};
use psm_domain::{AppIdentity, DarwinVersion, LocationFlagKey};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::PrivacyError;

const BINARY_MAGIC: &[u8] = b"bplist00";

/// On-disk encoding of a property list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlistFormat {
    Binary,
    Xml,
}

impl PlistFormat {
    fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(BINARY_MAGIC) {
            Self::Binary
        } else {
            Self::Xml
        }
    }
}

/// A loaded preference file whose top level is a dictionary.
#[derive(Debug, Clone)]
pub struct PreferenceFile {
    path: PathBuf,
    format: PlistFormat,
    entries: Dictionary,
}

impl PreferenceFile {
    /// Reads `path`; a missing or empty file loads as an empty binary dictionary.
    ///
    /// # Errors
    /// Fails when the file cannot be read, is not a property list, or its root
    /// is not a dictionary.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "preference file missing; starting empty");
                Vec::new()
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        if bytes.is_empty() {
            return Ok(Self {
                path: path.to_path_buf(),
                format: PlistFormat::Binary,
                entries: Dictionary::new(),
            });
        }
        let format = PlistFormat::detect(&bytes);
        let value = Value::from_reader(Cursor::new(bytes))
            .with_context(|| format!("failed to parse property list {}", path.display()))?;
        let Value::Dictionary(entries) = value else {
            anyhow::bail!("property list {} is not a dictionary", path.display());
        };
        Ok(Self {
            path: path.to_path_buf(),
            format,
            entries,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn format(&self) -> PlistFormat {
        self.format
    }

    #[must_use]
    pub fn entries(&self) -> &Dictionary {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut Dictionary {
        &mut self.entries
    }

    /// Atomically replaces the file on disk, keeping its encoding and mode.
    pub fn save(&self) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
        let mut tmp = NamedTempFile::new_in(parent)?;
        let value = Value::Dictionary(self.entries.clone());
        match self.format {
            PlistFormat::Binary => value.to_writer_binary(&mut tmp)?,
            PlistFormat::Xml => value.to_writer_xml(&mut tmp)?,
        }
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        if let Ok(metadata) = fs::metadata(&self.path) {
            fs::set_permissions(tmp.path(), metadata.permissions())?;
        }
        tmp.persist(&self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        debug!(path = %self.path.display(), format = ?self.format, "preference file written");
        Ok(())
    }
}

/// Loads `path`, applies `edit`, and writes the result only if `edit` succeeds.
pub fn edit_preferences<T>(
    path: &Path,
    edit: impl FnOnce(&mut Dictionary) -> Result<T>,
) -> Result<T> {
    let mut file = PreferenceFile::load(path)?;
    let result = edit(file.entries_mut())?;
    file.save()?;
    Ok(result)
}

/// Per-application authorization group in `clients.plist`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceRecord {
    pub authorized: bool,
    pub bundle_id: String,
    pub bundle_path: PathBuf,
    pub executable: String,
    pub requirement: String,
}

impl PreferenceRecord {
    /// An authorized record for `app`.
    ///
    /// # Errors
    /// `MalformedBundleId` when the identifier has no vendor component to anchor
    /// the requirement on.
    pub fn authorized(app: &AppIdentity) -> Result<Self, PrivacyError> {
        let requirement = app
            .requirement()
            .ok_or_else(|| PrivacyError::MalformedBundleId {
                bundle_id: app.bundle_id.clone(),
            })?;
        Ok(Self {
            authorized: true,
            bundle_id: app.bundle_id.clone(),
            bundle_path: app.bundle_path.clone(),
            executable: app.executable.clone(),
            requirement,
        })
    }

    #[must_use]
    pub fn to_dictionary(&self) -> Dictionary {
        let mut group = Dictionary::new();
        group.insert("Authorized".into(), Value::Boolean(self.authorized));
        group.insert("BundleID".into(), Value::from(self.bundle_id.as_str()));
        group.insert("BundleId".into(), Value::from(self.bundle_id.as_str()));
        group.insert(
            "BundlePath".into(),
            Value::from(self.bundle_path.display().to_string()),
        );
        group.insert("Executable".into(), Value::from(self.executable.as_str()));
        group.insert("Registered".into(), Value::from(self.executable.as_str()));
        group.insert("Hide".into(), Value::from(0_i64));
        group.insert("Requirement".into(), Value::from(self.requirement.as_str()));
        group.insert("Whitelisted".into(), Value::Boolean(false));
        group
    }
}

/// Writes (or merges into) the authorized group for `app`.
pub fn insert_client(entries: &mut Dictionary, app: &AppIdentity) -> Result<(), PrivacyError> {
    let record = PreferenceRecord::authorized(app)?;
    let fresh = record.to_dictionary();
    match entries
        .get_mut(&app.bundle_id)
        .and_then(Value::as_dictionary_mut)
    {
        Some(group) => {
            for (key, value) in fresh {
                group.insert(key, value);
            }
        }
        None => {
            entries.insert(app.bundle_id.clone(), Value::Dictionary(fresh));
        }
    }
    Ok(())
}

/// Drops the whole group for `bundle_id`; returns whether one existed.
pub fn remove_client(entries: &mut Dictionary, bundle_id: &str) -> bool {
    entries.remove(bundle_id).is_some()
}

/// Marks `app` unauthorized, inserting its group first when absent.
pub fn disable_client(entries: &mut Dictionary, app: &AppIdentity) -> Result<(), PrivacyError> {
    let present = entries
        .get(&app.bundle_id)
        .and_then(Value::as_dictionary)
        .is_some();
    if !present {
        debug!(bundle_id = %app.bundle_id, "no location record yet; inserting before disabling");
        insert_client(entries, app)?;
    }
    if let Some(group) = entries
        .get_mut(&app.bundle_id)
        .and_then(Value::as_dictionary_mut)
    {
        group.insert("Authorized".into(), Value::Boolean(false));
    }
    Ok(())
}

/// Sets the machine-wide location switch in the per-host file at `path`.
///
/// The value is written as an integer; the key depends on `darwin`.
pub fn set_global_flag(path: &Path, enabled: bool, darwin: DarwinVersion) -> Result<()> {
    let key = LocationFlagKey::for_darwin(darwin);
    info!(path = %path.display(), key = key.as_str(), enabled, "setting global location flag");
    edit_preferences(path, |entries| {
        entries.insert(key.as_str().into(), Value::from(i64::from(enabled)));
        Ok(())
    })
}

/// Reads the machine-wide switch back, `None` when the key is absent.
pub fn global_flag(path: &Path, darwin: DarwinVersion) -> Result<Option<bool>> {
    let file = PreferenceFile::load(path)?;
    let key = LocationFlagKey::for_darwin(darwin);
    Ok(file.entries().get(key.as_str()).and_then(|value| match value {
        Value::Boolean(flag) => Some(*flag),
        Value::Integer(number) => number.as_signed().map(|n| n != 0),
        _ => None,
    }))
}
