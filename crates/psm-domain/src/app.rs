use std::path::PathBuf;

use serde::Serialize;

/// Canonical identity of an installed application bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppIdentity {
    pub bundle_id: String,
    pub bundle_path: PathBuf,
    pub executable: String,
    pub name: String,
}

impl AppIdentity {
    /// Code-requirement string recorded next to location authorizations:
    /// `identifier "<bundle id>" and anchor <second dot component>`.
    ///
    /// Returns `None` when the bundle identifier has no second component.
    #[must_use]
    pub fn requirement(&self) -> Option<String> {
        let anchor = self
            .bundle_id
            .split('.')
            .nth(1)
            .filter(|part| !part.is_empty())?;
        Some(format!(
            "identifier \"{}\" and anchor {anchor}",
            self.bundle_id
        ))
    }
}
