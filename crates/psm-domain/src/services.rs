use std::fmt;

use serde::Serialize;

/// Which relational connection a service lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeClass {
    /// The machine-wide store.
    Root,
    /// The per-user (or template) store.
    Local,
}

impl fmt::Display for ScopeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::Local => f.write_str("local"),
        }
    }
}

/// Physical mechanism backing a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backend {
    /// Rows in the access-control database under `service_name`.
    AccessControl {
        service_name: &'static str,
        scope: ScopeClass,
    },
    /// Keys in the location daemon's preference files.
    Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceDescriptor {
    pub key: &'static str,
    pub backend: Backend,
    /// First Darwin major version shipping the service.
    pub min_darwin: u32,
    pub summary: &'static str,
}

impl ServiceDescriptor {
    /// Internal service name for relational services.
    #[must_use]
    pub fn service_name(&self) -> Option<&'static str> {
        match self.backend {
            Backend::AccessControl { service_name, .. } => Some(service_name),
            Backend::Location => None,
        }
    }

    /// Scope class for relational services; location is always machine-wide.
    #[must_use]
    pub fn scope_class(&self) -> ScopeClass {
        match self.backend {
            Backend::AccessControl { scope, .. } => scope,
            Backend::Location => ScopeClass::Root,
        }
    }

    #[must_use]
    pub fn is_location(&self) -> bool {
        matches!(self.backend, Backend::Location)
    }

    #[must_use]
    pub fn available_on(&self, darwin_major: u32) -> bool {
        darwin_major >= self.min_darwin
    }
}

pub static SERVICES: &[ServiceDescriptor] = &[
    ServiceDescriptor {
        key: "accessibility",
        backend: Backend::AccessControl {
            service_name: "kTCCServiceAccessibility",
            scope: ScopeClass::Root,
        },
        min_darwin: 13,
        summary: "Control the computer through the accessibility APIs.",
    },
    ServiceDescriptor {
        key: "contacts",
        backend: Backend::AccessControl {
            service_name: "kTCCServiceAddressBook",
            scope: ScopeClass::Local,
        },
        min_darwin: 12,
        summary: "Read the user's address book.",
    },
    ServiceDescriptor {
        key: "icloud",
        backend: Backend::AccessControl {
            service_name: "kTCCServiceUbiquity",
            scope: ScopeClass::Local,
        },
        min_darwin: 13,
        summary: "Use iCloud document storage.",
    },
    ServiceDescriptor {
        key: "calendar",
        backend: Backend::AccessControl {
            service_name: "kTCCServiceCalendar",
            scope: ScopeClass::Local,
        },
        min_darwin: 13,
        summary: "Read and write calendar events.",
    },
    ServiceDescriptor {
        key: "reminders",
        backend: Backend::AccessControl {
            service_name: "kTCCServiceReminders",
            scope: ScopeClass::Local,
        },
        min_darwin: 13,
        summary: "Read and write reminders.",
    },
    ServiceDescriptor {
        key: "location",
        backend: Backend::Location,
        min_darwin: 10,
        summary: "Determine the machine's physical location.",
    },
];

/// Looks up a service by key, ignoring ASCII case.
#[must_use]
pub fn lookup_service(key: &str) -> Option<&'static ServiceDescriptor> {
    SERVICES
        .iter()
        .find(|descriptor| descriptor.key.eq_ignore_ascii_case(key.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let descriptor = lookup_service("AcCeSsIbILITy").expect("accessibility");
        assert_eq!(descriptor.service_name(), Some("kTCCServiceAccessibility"));
        assert_eq!(descriptor.scope_class(), ScopeClass::Root);
        assert!(lookup_service("camera").is_none());
    }

    #[test]
    fn contacts_predates_the_other_services() {
        let contacts = lookup_service("contacts").expect("contacts");
        assert!(contacts.available_on(12));
        let calendar = lookup_service("calendar").expect("calendar");
        assert!(!calendar.available_on(12));
        assert!(calendar.available_on(13));
    }

    #[test]
    fn location_has_no_relational_name() {
        let location = lookup_service("location").expect("location");
        assert!(location.is_location());
        assert_eq!(location.service_name(), None);
        assert_eq!(location.scope_class(), ScopeClass::Root);
    }

    #[test]
    fn keys_are_unique() {
        let mut keys: Vec<_> = SERVICES.iter().map(|s| s.key).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), SERVICES.len());
    }
}
