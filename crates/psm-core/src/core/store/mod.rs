pub mod access;
pub mod daemon;
pub mod errors;
pub mod locator;
pub mod location;
pub mod preferences;
pub mod schema;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::PrivacyError;
