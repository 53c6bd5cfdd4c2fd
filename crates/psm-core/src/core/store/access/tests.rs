use std::path::PathBuf;

use anyhow::Result;
use psm_domain::{AccessRecord, Client, DarwinVersion, Scope, ScopeClass, SchemaGeneration};
use rusqlite::Connection;
use tempfile::{tempdir, TempDir};

use super::*;
use crate::core::store::locator::ACCESS_DB_RELATIVE;
use crate::core::store::schema::create_access_store;
use crate::core::store::testing::{FakeHost, FakeUsers};

struct Fixture {
    temp: TempDir,
    layout: StoreLayout,
    users: FakeUsers,
    host: FakeHost,
}

impl Fixture {
    fn new() -> Result<Self> {
        let temp = tempdir()?;
        let layout = StoreLayout::new(temp.path().join("root"));
        let users = FakeUsers::new("alice")
            .with_home("alice", temp.path().join("homes/alice"))
            .with_home("root", temp.path().join("homes/root"));
        Ok(Self {
            temp,
            layout,
            users,
            host: FakeHost::new(13, false),
        })
    }

    fn env(&self, darwin: u32, privilege: PrivilegeContext) -> SessionEnv<'_> {
        SessionEnv {
            layout: &self.layout,
            users: &self.users,
            host: &self.host,
            privilege,
            darwin: DarwinVersion::new(darwin),
        }
    }

    fn alice_store(&self) -> PathBuf {
        self.temp.path().join("homes/alice").join(ACCESS_DB_RELATIVE)
    }

    fn open_alice(&self, darwin: u32) -> Result<AccessSession> {
        AccessSession::open(
            &self.env(darwin, PrivilegeContext::unprivileged()),
            Scope::user("alice"),
            &AccessSessionOptions::default(),
        )
    }
}

fn privacy_error(err: &anyhow::Error) -> Option<&PrivacyError> {
    err.downcast_ref::<PrivacyError>()
}

fn safari() -> Client {
    Client::bundle_id("com.apple.Safari")
}

fn row_count(path: &std::path::Path) -> Result<i64> {
    let conn = Connection::open(path)?;
    Ok(conn.query_row("SELECT count(*) FROM access", [], |row| row.get(0))?)
}

#[test]
fn contacts_lifecycle_on_generation_13() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut session = fixture.open_alice(13)?;
    assert_eq!(session.generation(), SchemaGeneration::V13Plus);
    assert_eq!(session.local_path(), Some(fixture.alice_store().as_path()));

    assert_eq!(
        session.insert(&safari(), Some("contacts"))?,
        MutationOutcome::Applied
    );
    assert_eq!(
        session.records(&safari(), "contacts")?,
        vec![AccessRecord {
            service: "kTCCServiceAddressBook".into(),
            client: "com.apple.Safari".into(),
            client_type: 0,
            allowed: true,
            prompt_count: 1,
            csreq: None,
        }]
    );

    session.disable(&safari(), Some("contacts"))?;
    assert_eq!(
        session.records(&safari(), "contacts")?,
        vec![AccessRecord::denied("kTCCServiceAddressBook", "com.apple.Safari")]
    );

    session.remove(&safari(), Some("contacts"))?;
    assert!(session.records(&safari(), "contacts")?.is_empty());
    session.close();

    let conn = Connection::open(fixture.alice_store())?;
    let rows: i64 = conn.query_row(
        "SELECT count(*) FROM access WHERE service = 'kTCCServiceAddressBook'",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(rows, 0);
    Ok(())
}

#[test]
fn insert_then_remove_restores_the_store() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut session = fixture.open_alice(13)?;
    session.insert(&Client::bundle_id("com.example.Keep"), Some("calendar"))?;
    let before = row_count(&fixture.alice_store())?;

    session.insert(&safari(), Some("reminders"))?;
    assert_eq!(row_count(&fixture.alice_store())?, before + 1);
    session.remove(&safari(), Some("reminders"))?;
    assert_eq!(row_count(&fixture.alice_store())?, before);

    // Removing again is a no-op.
    assert_eq!(
        session.remove(&safari(), Some("reminders"))?,
        MutationOutcome::Applied
    );
    assert_eq!(row_count(&fixture.alice_store())?, before);
    Ok(())
}

#[test]
fn disable_is_idempotent_and_creates_missing_rows() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut session = fixture.open_alice(13)?;
    let client = Client::bundle_id("com.example.Fresh");

    session.disable(&client, Some("icloud"))?;
    let first = session.records(&client, "icloud")?;
    session.disable(&client, Some("icloud"))?;
    let second = session.records(&client, "icloud")?;
    assert_eq!(first, second);

    let mut explicit = fixture.open_alice(13)?;
    let other = Client::bundle_id("com.example.Other");
    explicit.insert(&other, Some("icloud"))?;
    explicit.disable(&other, Some("icloud"))?;
    let expected: Vec<_> = explicit
        .records(&other, "icloud")?
        .into_iter()
        .map(|record| (record.client_type, record.allowed, record.prompt_count))
        .collect();
    let actual: Vec<_> = first
        .into_iter()
        .map(|record| (record.client_type, record.allowed, record.prompt_count))
        .collect();
    assert_eq!(actual, expected);
    assert_eq!(actual, vec![(0, false, 1)]);
    Ok(())
}

#[test]
fn legacy_generation_writes_five_columns() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut session = fixture.open_alice(12)?;
    assert_eq!(session.generation(), SchemaGeneration::V12);
    session.insert(&safari(), Some("contacts"))?;
    assert_eq!(
        session.records(&safari(), "contacts")?,
        vec![AccessRecord::allowed("kTCCServiceAddressBook", "com.apple.Safari")]
    );
    Ok(())
}

#[test]
fn dialects_do_not_cross_generations() -> Result<()> {
    let fixture = Fixture::new()?;

    create_access_store(&fixture.alice_store(), SchemaGeneration::V12)?;
    let mut modern = fixture.open_alice(13)?;
    let err = modern.insert(&safari(), Some("contacts")).unwrap_err();
    assert!(privacy_error(&err).is_none(), "unexpected typed error: {err}");
    let message = format!("{err:#}");
    assert!(
        message.contains("has 5 columns but 6 values were supplied"),
        "{message}"
    );
    modern.close();

    std::fs::remove_file(fixture.alice_store())?;
    create_access_store(&fixture.alice_store(), SchemaGeneration::V13Plus)?;
    let mut legacy = fixture.open_alice(12)?;
    let err = legacy.insert(&safari(), Some("contacts")).unwrap_err();
    assert!(privacy_error(&err).is_none(), "unexpected typed error: {err}");
    let message = format!("{err:#}");
    assert!(
        message.contains("has 6 columns but 5 values were supplied"),
        "{message}"
    );
    Ok(())
}

#[test]
fn missing_service_without_default_is_skipped() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut session = fixture.open_alice(13)?;
    assert_eq!(session.insert(&safari(), None)?, MutationOutcome::Skipped);
    assert_eq!(session.disable(&safari(), None)?, MutationOutcome::Skipped);
    assert_eq!(session.remove(&safari(), None)?, MutationOutcome::Skipped);
    assert_eq!(row_count(&fixture.alice_store())?, 0);

    let mut defaulted = AccessSession::open(
        &fixture.env(13, PrivilegeContext::unprivileged()),
        Scope::user("alice"),
        &AccessSessionOptions {
            force_root: false,
            default_service: Some("contacts".into()),
        },
    )?;
    assert_eq!(defaulted.insert(&safari(), None)?, MutationOutcome::Applied);
    assert_eq!(defaulted.records(&safari(), "contacts")?.len(), 1);
    Ok(())
}

#[test]
fn root_class_services_need_the_global_connection() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut session = fixture.open_alice(13)?;
    assert!(!session.has_connection(ScopeClass::Root));
    assert!(!fixture.layout.global_access_store().exists());
    let err = session.insert(&safari(), Some("accessibility")).unwrap_err();
    assert!(matches!(
        privacy_error(&err),
        Some(PrivacyError::PermissionDenied { .. })
    ));

    let mut elevated = AccessSession::open(
        &fixture.env(13, PrivilegeContext::elevated()),
        Scope::user("alice"),
        &AccessSessionOptions::default(),
    )?;
    assert!(fixture.layout.global_access_store().is_file());
    elevated.insert(&safari(), Some("accessibility"))?;
    assert_eq!(row_count(&fixture.layout.global_access_store())?, 1);
    assert_eq!(row_count(&fixture.alice_store())?, 0);
    Ok(())
}

#[test]
fn global_scope_requires_elevation_and_has_no_local_store() -> Result<()> {
    let fixture = Fixture::new()?;
    let err = AccessSession::open(
        &fixture.env(13, PrivilegeContext::unprivileged()),
        Scope::Global,
        &AccessSessionOptions::default(),
    )
    .err()
    .expect("global scope without elevation");
    assert!(matches!(
        privacy_error(&err),
        Some(PrivacyError::PermissionDenied { .. })
    ));

    let mut session = AccessSession::open(
        &fixture.env(13, PrivilegeContext::elevated()),
        Scope::Global,
        &AccessSessionOptions::default(),
    )?;
    assert!(session.has_connection(ScopeClass::Root));
    assert!(!session.has_connection(ScopeClass::Local));
    session.insert(&safari(), Some("accessibility"))?;
    let err = session.insert(&safari(), Some("contacts")).unwrap_err();
    assert!(matches!(
        privacy_error(&err),
        Some(PrivacyError::StoreNotOpen {
            scope_class: ScopeClass::Local,
            ..
        })
    ));
    Ok(())
}

#[test]
fn root_user_store_is_refused_unless_forced() -> Result<()> {
    let fixture = Fixture::new()?;
    let env = fixture.env(13, PrivilegeContext::elevated());
    let root_store = fixture.temp.path().join("homes/root").join(ACCESS_DB_RELATIVE);

    let mut session = AccessSession::open(&env, Scope::user("root"), &AccessSessionOptions::default())?;
    assert!(!session.has_connection(ScopeClass::Local));
    assert!(!root_store.exists());
    let err = session.insert(&safari(), Some("contacts")).unwrap_err();
    assert_eq!(privacy_error(&err), Some(&PrivacyError::RootStoreRefused));
    session.insert(&safari(), Some("accessibility"))?;
    session.close();

    let err = AccessSession::open(
        &env,
        Scope::user("root"),
        &AccessSessionOptions {
            force_root: false,
            default_service: Some("contacts".into()),
        },
    )
    .err()
    .expect("root store refused up front");
    assert_eq!(privacy_error(&err), Some(&PrivacyError::RootStoreRefused));

    let mut forced = AccessSession::open(
        &env,
        Scope::user("root"),
        &AccessSessionOptions {
            force_root: true,
            default_service: None,
        },
    )?;
    assert!(root_store.is_file());
    forced.insert(&safari(), Some("contacts"))?;
    Ok(())
}

#[test]
fn template_scope_creates_the_template_store() -> Result<()> {
    let fixture = Fixture::new()?;
    let err = AccessSession::open(
        &fixture.env(13, PrivilegeContext::unprivileged()),
        Scope::template("French"),
        &AccessSessionOptions::default(),
    )
    .err()
    .expect("template without elevation");
    assert!(matches!(
        privacy_error(&err),
        Some(PrivacyError::PermissionDenied { .. })
    ));

    let mut session = AccessSession::open(
        &fixture.env(13, PrivilegeContext::elevated()),
        Scope::template("French"),
        &AccessSessionOptions::default(),
    )?;
    let path = fixture.layout.template_access_store("French");
    assert_eq!(session.local_path(), Some(path.as_path()));
    session.insert(&safari(), Some("calendar"))?;
    assert_eq!(row_count(&path)?, 1);
    Ok(())
}

#[test]
fn version_gates_are_enforced() -> Result<()> {
    let fixture = Fixture::new()?;
    let err = fixture.open_alice(11).err().expect("darwin 11 unsupported");
    assert!(matches!(
        privacy_error(&err),
        Some(PrivacyError::UnsupportedOs { darwin: 11, .. })
    ));

    let mut session = fixture.open_alice(12)?;
    let err = session.insert(&safari(), Some("calendar")).unwrap_err();
    assert_eq!(
        privacy_error(&err),
        Some(&PrivacyError::ServiceUnsupported {
            service: "calendar".into(),
            darwin: 12,
            required: 13,
        })
    );

    let err = session.insert(&safari(), Some("location")).unwrap_err();
    assert!(matches!(
        privacy_error(&err),
        Some(PrivacyError::UnknownService { .. })
    ));
    Ok(())
}

#[test]
fn unwritable_user_store_is_denied() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if nix::unistd::geteuid().is_root() {
        // access(2) always grants W_OK to root.
        return Ok(());
    }
    let fixture = Fixture::new()?;
    create_access_store(&fixture.alice_store(), SchemaGeneration::V13Plus)?;
    std::fs::set_permissions(
        fixture.alice_store(),
        std::fs::Permissions::from_mode(0o444),
    )?;
    let err = fixture.open_alice(13).err().expect("read-only store");
    assert!(matches!(
        privacy_error(&err),
        Some(PrivacyError::PermissionDenied { .. })
    ));
    Ok(())
}

#[test]
fn close_is_idempotent() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut session = fixture.open_alice(13)?;
    session.close();
    session.close();
    let err = session.insert(&safari(), Some("contacts")).unwrap_err();
    assert!(matches!(
        privacy_error(&err),
        Some(PrivacyError::StoreNotOpen { .. })
    ));
    Ok(())
}
