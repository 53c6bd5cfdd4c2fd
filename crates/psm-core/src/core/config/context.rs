use std::fmt;

use anyhow::Result;
use psm_domain::DarwinVersion;
use serde::{Deserialize, Serialize};

use crate::core::config::{Config, GlobalOptions};
use crate::core::runtime::effects::{self, Effects, SharedEffects};
use crate::core::store::locator::{PrivilegeContext, StoreLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandGroup {
    Add,
    Enable,
    Remove,
    Disable,
    Services,
}

impl fmt::Display for CommandGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandGroup::Add => "add",
            CommandGroup::Enable => "enable",
            CommandGroup::Remove => "remove",
            CommandGroup::Disable => "disable",
            CommandGroup::Services => "services",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CommandInfo {
    pub group: CommandGroup,
    pub name: &'static str,
}

impl CommandInfo {
    #[must_use]
    pub const fn new(group: CommandGroup, name: &'static str) -> Self {
        Self { group, name }
    }
}

pub struct CommandContext<'a> {
    pub global: &'a GlobalOptions,
    config: Config,
    effects: SharedEffects,
}

impl<'a> CommandContext<'a> {
    /// Creates a new command context with configuration read from the environment.
    ///
    /// # Errors
    /// Returns an error if the configuration cannot be prepared.
    pub fn new(global: &'a GlobalOptions, effects: SharedEffects) -> Result<Self> {
        Ok(Self::with_config(global, Config::from_env()?, effects))
    }

    #[must_use]
    pub fn with_config(global: &'a GlobalOptions, config: Config, effects: SharedEffects) -> Self {
        Self {
            global,
            config,
            effects,
        }
    }

    pub fn effects(&self) -> &dyn Effects {
        self.effects.as_ref()
    }

    pub fn host(&self) -> &dyn effects::HostInfo {
        self.effects.host()
    }

    pub fn users(&self) -> &dyn effects::UserDirectory {
        self.effects.users()
    }

    pub fn apps(&self) -> &dyn effects::AppResolver {
        self.effects.apps()
    }

    pub fn launch(&self) -> &dyn effects::LaunchControl {
        self.effects.launch()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &StoreLayout {
        self.config.layout()
    }

    /// The OS version, honouring a configured override.
    ///
    /// # Errors
    /// Returns an error if the running kernel's release cannot be read.
    pub fn darwin_version(&self) -> Result<DarwinVersion> {
        match self.config.darwin_override() {
            Some(version) => Ok(version),
            None => self.host().darwin_version(),
        }
    }

    /// Captures the effective privilege of this process.
    pub fn privilege(&self) -> PrivilegeContext {
        PrivilegeContext::capture(self.host())
    }
}
