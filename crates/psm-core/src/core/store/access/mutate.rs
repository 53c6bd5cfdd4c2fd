use anyhow::{Context, Result};
use psm_domain::{AccessRecord, Client, SchemaGeneration, ServiceDescriptor};
use rusqlite::{params, Transaction, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, info};

use super::{access_service, AccessSession};
use crate::core::store::PrivacyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOutcome {
    Applied,
    /// No service was named and the session has no default.
    Skipped,
}

/// Full-row upsert for `generation`; the parameter count matches the column count.
#[must_use]
pub fn upsert_statement(generation: SchemaGeneration) -> &'static str {
    match generation {
        SchemaGeneration::V12 => "INSERT OR REPLACE INTO access VALUES (?1, ?2, ?3, ?4, ?5)",
        SchemaGeneration::V13Plus => {
            "INSERT OR REPLACE INTO access VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        }
    }
}

fn write_record(
    tx: &Transaction<'_>,
    generation: SchemaGeneration,
    record: &AccessRecord,
) -> rusqlite::Result<usize> {
    let sql = upsert_statement(generation);
    match generation {
        SchemaGeneration::V12 => tx.execute(
            sql,
            params![
                record.service,
                record.client,
                record.client_type,
                record.allowed,
                record.prompt_count
            ],
        ),
        SchemaGeneration::V13Plus => tx.execute(
            sql,
            params![
                record.service,
                record.client,
                record.client_type,
                record.allowed,
                record.prompt_count,
                record.csreq
            ],
        ),
    }
}

impl AccessSession {
    /// Grants `client` access to `service` (or the session default).
    ///
    /// # Errors
    /// `UnknownService`, `ServiceUnsupported`, or the connection errors of
    /// [`AccessSession::connection`].
    pub fn insert(&mut self, client: &Client, service: Option<&str>) -> Result<MutationOutcome> {
        let Some(descriptor) = self.target(service, true)? else {
            return Ok(MutationOutcome::Skipped);
        };
        let name = service_name(descriptor)?;
        let generation = self.generation;
        let record = AccessRecord::allowed(name, &client.as_column());
        info!(service = descriptor.key, %client, "inserting into {}", self.scope);
        let conn = self.connection(descriptor.scope_class())?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        write_record(&tx, generation, &record)
            .with_context(|| format!("failed to insert {client} for {}", descriptor.key))?;
        tx.commit()?;
        info!(service = descriptor.key, %client, "inserted");
        Ok(MutationOutcome::Applied)
    }

    /// Deletes every row for `client` under `service`. Absent rows are fine.
    pub fn remove(&mut self, client: &Client, service: Option<&str>) -> Result<MutationOutcome> {
        let Some(descriptor) = self.target(service, false)? else {
            return Ok(MutationOutcome::Skipped);
        };
        let name = service_name(descriptor)?;
        info!(service = descriptor.key, %client, "removing from {}", self.scope);
        let conn = self.connection(descriptor.scope_class())?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let deleted = tx
            .execute(
                "DELETE FROM access WHERE service = ?1 AND client = ?2",
                params![name, client.as_column()],
            )
            .with_context(|| format!("failed to remove {client} from {}", descriptor.key))?;
        tx.commit()?;
        info!(service = descriptor.key, %client, rows = deleted, "removed");
        Ok(MutationOutcome::Applied)
    }

    /// Leaves a denied row behind, inserting a granted one first when none exists.
    pub fn disable(&mut self, client: &Client, service: Option<&str>) -> Result<MutationOutcome> {
        let Some(descriptor) = self.target(service, true)? else {
            return Ok(MutationOutcome::Skipped);
        };
        let name = service_name(descriptor)?;
        let generation = self.generation;
        let column = client.as_column();
        info!(service = descriptor.key, %client, "disabling in {}", self.scope);
        let conn = self.connection(descriptor.scope_class())?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing: i64 = tx.query_row(
            "SELECT count(*) FROM access WHERE service = ?1 AND client = ?2",
            params![name, column],
            |row| row.get(0),
        )?;
        if existing == 0 {
            debug!(service = descriptor.key, %client, "no record yet; inserting before disabling");
            write_record(&tx, generation, &AccessRecord::allowed(name, &column))?;
        }
        write_record(&tx, generation, &AccessRecord::denied(name, &column))
            .with_context(|| format!("failed to disable {client} for {}", descriptor.key))?;
        tx.commit()?;
        info!(service = descriptor.key, %client, "disabled");
        Ok(MutationOutcome::Applied)
    }

    /// Rows currently stored for `client` under the service `key`.
    pub fn records(&mut self, client: &Client, key: &str) -> Result<Vec<AccessRecord>> {
        let descriptor = access_service(key)?;
        let name = service_name(descriptor)?;
        let generation = self.generation;
        let conn = self.connection(descriptor.scope_class())?;
        let sql = if generation.has_csreq() {
            "SELECT service, client, client_type, allowed, prompt_count, csreq
             FROM access WHERE service = ?1 AND client = ?2"
        } else {
            "SELECT service, client, client_type, allowed, prompt_count, NULL
             FROM access WHERE service = ?1 AND client = ?2"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![name, client.as_column()], |row| {
                Ok(AccessRecord {
                    service: row.get(0)?,
                    client: row.get(1)?,
                    client_type: row.get(2)?,
                    allowed: row.get(3)?,
                    prompt_count: row.get(4)?,
                    csreq: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn target(
        &self,
        service: Option<&str>,
        gated: bool,
    ) -> Result<Option<&'static ServiceDescriptor>, PrivacyError> {
        let descriptor = match service {
            Some(key) => access_service(key)?,
            None => match self.default_service {
                Some(descriptor) => descriptor,
                None => {
                    debug!("no service given and no default configured; nothing to do");
                    return Ok(None);
                }
            },
        };
        let darwin = self.darwin.major();
        if gated && !descriptor.available_on(darwin) {
            return Err(PrivacyError::ServiceUnsupported {
                service: descriptor.key.to_string(),
                darwin,
                required: descriptor.min_darwin,
            });
        }
        Ok(Some(descriptor))
    }
}

fn service_name(descriptor: &ServiceDescriptor) -> Result<&'static str, PrivacyError> {
    descriptor
        .service_name()
        .ok_or_else(|| PrivacyError::UnknownService {
            key: descriptor.key.to_string(),
        })
}
