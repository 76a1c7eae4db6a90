//! Database operations and SQLite management.
//!
//! This module provides the storage side of the synchronization core. Every
//! structural mutation follows the same shape:
//!
//! 1. begin an immediate (write-locked) transaction,
//! 2. resolve the owning plan and compare its stamp with the caller's token,
//! 3. apply the change,
//! 4. advance the plan's stamp,
//! 5. commit.
//!
//! Steps 2-4 share one transaction, so a change is never visible without its
//! stamp bump and a stale token never writes anything.

use std::{path::Path, time::Duration};

use jiff::Timestamp;
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::{
    error::{DatabaseResultExt, Entity, Result, SpotterError},
    stamp::VersionStamp,
};

pub mod exercise_queries;
pub mod migrations;
pub mod phase_queries;
pub mod plan_queries;
pub mod session_queries;
pub mod workout_queries;

/// How long a connection waits for another writer before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_PLAN_STAMP_SQL: &str = "SELECT client_id, updated_at FROM plans WHERE id = ?1";
const UPDATE_PLAN_STAMP_SQL: &str = "UPDATE plans SET updated_at = ?1 WHERE id = ?2";

/// Database connection and operations handler.
pub struct Database {
    connection: Connection,
}

/// Result of a committed structural mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stamped<T> {
    pub plan_id: u64,
    /// Owner of the plan; keys downstream cache invalidation
    pub client_id: u64,
    /// Stamp written by this mutation
    pub updated_at: VersionStamp,
    pub value: T,
}

impl<T> Stamped<T> {
    /// Replaces the carried value, keeping plan and stamp.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Stamped<U> {
        Stamped {
            plan_id: self.plan_id,
            client_id: self.client_id,
            updated_at: self.updated_at,
            value: f(self.value),
        }
    }
}

/// The plan a mutation resolved to, with its stamp before the change.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PlanRef {
    pub plan_id: u64,
    pub client_id: u64,
    pub stamp: VersionStamp,
}

impl PlanRef {
    /// Advances the plan's stamp inside `tx` and wraps `value`.
    pub(crate) fn bump<T>(self, tx: &Connection, value: T) -> Result<Stamped<T>> {
        let next = self.stamp.advance();
        tx.execute(
            UPDATE_PLAN_STAMP_SQL,
            params![next.to_storage(), self.plan_id as i64],
        )
        .db_context("Failed to update plan version stamp")?;
        Ok(Stamped {
            plan_id: self.plan_id,
            client_id: self.client_id,
            updated_at: next,
            value,
        })
    }
}

impl Database {
    /// Creates a new database connection and initializes the schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let connection = Connection::open(path).db_context("Failed to open database connection")?;
        connection
            .busy_timeout(BUSY_TIMEOUT)
            .db_context("Failed to configure busy timeout")?;

        let db = Self { connection };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Opens a transaction that holds the write lock from the first statement.
    ///
    /// Stamp comparison and stamp bump must not interleave with another
    /// writer, so deferred transactions are never used for mutations.
    pub(crate) fn begin_write(&mut self) -> Result<rusqlite::Transaction<'_>> {
        self.connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .db_context("Failed to begin transaction")
    }

    /// Reads the current stamp of a plan.
    pub fn plan_stamp(&self, plan_id: u64) -> Result<VersionStamp> {
        resolve_plan(&self.connection, plan_id).map(|plan| plan.stamp)
    }
}

/// Loads the plan row's owner and stamp.
pub(crate) fn resolve_plan(conn: &Connection, plan_id: u64) -> Result<PlanRef> {
    let (client_id, stamp) = conn
        .query_row(SELECT_PLAN_STAMP_SQL, params![plan_id as i64], |row| {
            Ok((row.get::<_, i64>(0)? as u64, parse_stamp(row, 1)?))
        })
        .optional()
        .db_context("Failed to read plan version stamp")?
        .ok_or_else(|| SpotterError::not_found(Entity::Plan, plan_id))?;

    Ok(PlanRef {
        plan_id,
        client_id,
        stamp,
    })
}

/// Resolves the plan and rejects stale tokens.
pub(crate) fn check_plan(
    conn: &Connection,
    plan_id: u64,
    last_known: Option<&VersionStamp>,
) -> Result<PlanRef> {
    let plan = resolve_plan(conn, plan_id)?;
    if plan.stamp.is_stale(last_known) {
        log::debug!(
            "Rejecting mutation on plan {plan_id}: token {:?} != stored {}",
            last_known,
            plan.stamp
        );
        return Err(SpotterError::Conflict {
            plan_id,
            server_updated_at: plan.stamp,
        });
    }
    Ok(plan)
}

/// Looks up the owning plan of a child row with `sql` (one `?1` parameter,
/// returns a single plan id) and checks the stamp.
pub(crate) fn check_owner(
    conn: &Connection,
    sql: &str,
    entity: Entity,
    id: u64,
    last_known: Option<&VersionStamp>,
) -> Result<PlanRef> {
    let plan_id: i64 = conn
        .query_row(sql, params![id as i64], |row| row.get(0))
        .or_not_found(entity, id, "Failed to resolve owning plan")?;
    check_plan(conn, plan_id as u64, last_known)
}

pub(crate) fn parse_timestamp(row: &Row, idx: usize) -> rusqlite::Result<Timestamp> {
    row.get::<_, String>(idx)?
        .parse::<Timestamp>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_optional_timestamp(row: &Row, idx: usize) -> rusqlite::Result<Option<Timestamp>> {
    row.get::<_, Option<String>>(idx)?
        .map(|s| {
            s.parse::<Timestamp>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            })
        })
        .transpose()
}

pub(crate) fn parse_stamp(row: &Row, idx: usize) -> rusqlite::Result<VersionStamp> {
    parse_timestamp(row, idx).map(VersionStamp::from_timestamp)
}
