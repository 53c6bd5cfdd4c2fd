#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod app;
pub mod generation;
pub mod record;
pub mod scope;
pub mod services;

pub use app::AppIdentity;
pub use generation::{DarwinVersion, LocationFlagKey, SchemaGeneration};
pub use record::{AccessRecord, CLIENT_TYPE_BUNDLE_ID};
pub use scope::{Client, Scope, ROOT_USER};
pub use services::{lookup_service, Backend, ScopeClass, ServiceDescriptor, SERVICES};
