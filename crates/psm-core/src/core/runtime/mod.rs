pub mod apps;
pub mod effects;
pub mod process;

pub use effects::{
    AppResolver, Effects, HostInfo, LaunchControl, SharedEffects, SystemEffects, UserDirectory,
};
pub use process::RunOutput;
