use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The account whose per-user store is refused unless explicitly forced.
pub const ROOT_USER: &str = "root";

/// Breadth of a permission store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scope {
    /// Machine-wide store; only an elevated process may touch it.
    Global,
    /// The per-user store of the named account.
    User(String),
    /// The store shipped in the OS user template for the given language.
    Template(String),
}

impl Scope {
    #[must_use]
    pub fn user(name: impl Into<String>) -> Self {
        Self::User(name.into())
    }

    #[must_use]
    pub fn template(language: impl Into<String>) -> Self {
        Self::Template(language.into())
    }

    /// True when this scope names the root account's own per-user store.
    #[must_use]
    pub fn is_root_user(&self) -> bool {
        matches!(self, Self::User(name) if name == ROOT_USER)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "all users"),
            Self::User(name) => write!(f, "user '{name}'"),
            Self::Template(language) => write!(f, "the {language} user template"),
        }
    }
}

/// The subject of an access record: a bundle identifier or an absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Client {
    BundleId(String),
    Path(PathBuf),
}

impl Client {
    #[must_use]
    pub fn bundle_id(id: impl Into<String>) -> Self {
        Self::BundleId(id.into())
    }

    /// Builds a path client, absolutising `path` against `cwd` when relative.
    #[must_use]
    pub fn path(path: &Path, cwd: &Path) -> Self {
        if path.is_absolute() {
            Self::Path(path.to_path_buf())
        } else {
            Self::Path(cwd.join(path))
        }
    }

    /// The literal value stored in the `client` column.
    #[must_use]
    pub fn as_column(&self) -> String {
        match self {
            Self::BundleId(id) => id.clone(),
            Self::Path(path) => path.display().to_string(),
        }
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_column())
    }
}
