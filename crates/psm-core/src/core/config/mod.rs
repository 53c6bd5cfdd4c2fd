pub mod context;

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use psm_domain::DarwinVersion;
use serde::{Deserialize, Serialize};

use crate::core::store::locator::StoreLayout;

pub const ROOT_ENV: &str = "PSM_ROOT";
pub const DARWIN_VERSION_ENV: &str = "PSM_DARWIN_VERSION";
pub const LOG_FILTER_ENV: &str = "PSM_LOG";
pub const LOG_DEST_ENV: &str = "PSM_LOG_DEST";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
    pub json: bool,
    pub no_color: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) layout: StoreLayout,
    pub(crate) darwin_override: Option<DarwinVersion>,
    pub(crate) logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    pub filter: Option<String>,
    pub dest: Option<PathBuf>,
}

impl Config {
    /// Builds a configuration snapshot from the current process environment.
    ///
    /// # Errors
    /// Returns an error if an override variable holds an unparseable value.
    pub fn from_env() -> Result<Self> {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot) -> Result<Self> {
        let layout = snapshot
            .var(ROOT_ENV)
            .map_or_else(StoreLayout::system, |root| StoreLayout::new(PathBuf::from(root)));
        let darwin_override = snapshot
            .var(DARWIN_VERSION_ENV)
            .map(DarwinVersion::parse_release)
            .transpose()
            .with_context(|| format!("invalid {DARWIN_VERSION_ENV}"))?;
        Ok(Self {
            layout,
            darwin_override,
            logging: LoggingConfig {
                filter: snapshot.var(LOG_FILTER_ENV).map(ToOwned::to_owned),
                dest: snapshot.var(LOG_DEST_ENV).map(PathBuf::from),
            },
        })
    }

    /// Configuration rooted at `layout` with an optional pinned OS version.
    #[must_use]
    pub fn with_layout(layout: StoreLayout, darwin_override: Option<DarwinVersion>) -> Self {
        Self {
            layout,
            darwin_override,
            logging: LoggingConfig::default(),
        }
    }

    #[must_use]
    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    #[must_use]
    pub fn darwin_override(&self) -> Option<DarwinVersion> {
        self.darwin_override
    }

    #[must_use]
    pub fn logging(&self) -> &LoggingConfig {
        &self.logging
    }
}
