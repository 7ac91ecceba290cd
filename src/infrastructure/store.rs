//! SQLite event store: seen trades, dispositions and the append-only execution log

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, info, warn};

use crate::domain::execution::{ExecutionRecord, ExecutionStatus};
use crate::domain::trade::{Trade, TradeDisposition};
use crate::shared::errors::StoreError;
use crate::shared::types::TradeId;

const WRITE_MAX_RETRIES: usize = 3;
const WRITE_RETRY_BACKOFF_MS: [u64; WRITE_MAX_RETRIES] = [50, 150, 400];

const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_init.sql",
    include_str!("../../migrations/0001_init.sql"),
)];

const EXECUTION_COLUMNS: &str = "trade_id, attempt, instruction_hash, submitted_at, status, \
     signature, last_valid_block_height, retry_count, detail, recorded_at";

pub struct EventStore {
    conn: Mutex<Connection>,
}

impl EventStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Corrupt(format!("create {}: {}", parent.display(), e))
                })?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL
            );",
        )?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut applied = 0;
        for (version, sql) in MIGRATIONS {
            let already: Option<String> = tx
                .query_row(
                    "SELECT version FROM schema_migrations WHERE version = ?1",
                    params![version],
                    |row| row.get(0),
                )
                .optional()?;
            if already.is_some() {
                continue;
            }
            tx.execute_batch(sql)?;
            tx.execute(
                "INSERT INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![version, Utc::now().to_rfc3339()],
            )?;
            applied += 1;
            info!(version = *version, "Migration applied");
        }
        tx.commit()?;
        Ok(applied)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Corrupt("store connection lock poisoned".to_string()))
    }

    /// Runs a write, retrying while SQLite reports the database busy.
    fn execute_with_retry<T, F>(&self, mut operation: F) -> Result<T, StoreError>
    where
        F: FnMut(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self.lock()?;
        for attempt in 0..=WRITE_MAX_RETRIES {
            match operation(&conn) {
                Ok(value) => return Ok(value),
                Err(error) if attempt < WRITE_MAX_RETRIES && is_busy(&error) => {
                    warn!(attempt, "SQLite busy, retrying write");
                    pause(Duration::from_millis(WRITE_RETRY_BACKOFF_MS[attempt]));
                }
                Err(error) => return Err(error.into()),
            }
        }
        Err(StoreError::Corrupt("write retries exhausted".to_string()))
    }

    pub fn has_seen(&self, id: &TradeId) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM trades WHERE id = ?1", params![id.as_str()], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    /// Records a newly observed trade as `Queued`. Returns `false` when the id
    /// was already known; the existing row is left untouched.
    pub fn record_seen(&self, trade: &Trade) -> Result<bool, StoreError> {
        let payload = serde_json::to_string(trade)?;
        let now = Utc::now().to_rfc3339();
        let changed = self.execute_with_retry(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO trades
                    (id, actor, payload, disposition, in_flight, first_seen_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
                params![
                    trade.id.as_str(),
                    trade.actor,
                    payload,
                    TradeDisposition::Queued.as_str(),
                    now
                ],
            )
        })?;
        Ok(changed == 1)
    }

    pub fn trade(&self, id: &TradeId) -> Result<Option<Trade>, StoreError> {
        let conn = self.lock()?;
        let payload: Option<String> = conn
            .query_row("SELECT payload FROM trades WHERE id = ?1", params![id.as_str()], |row| {
                row.get(0)
            })
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(StoreError::from))
            .transpose()
    }

    pub fn disposition(&self, id: &TradeId) -> Result<Option<TradeDisposition>, StoreError> {
        let conn = self.lock()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT disposition FROM trades WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        value.map(|v| parse_disposition(&v)).transpose()
    }

    /// Disposition together with the note stored alongside it.
    pub fn disposition_detail(
        &self,
        id: &TradeId,
    ) -> Result<Option<(TradeDisposition, Option<String>)>, StoreError> {
        let conn = self.lock()?;
        let row: Option<(String, Option<String>)> = conn
            .query_row(
                "SELECT disposition, detail FROM trades WHERE id = ?1",
                params![id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        row.map(|(value, detail)| parse_disposition(&value).map(|d| (d, detail)))
            .transpose()
    }

    pub fn set_disposition(
        &self,
        id: &TradeId,
        disposition: TradeDisposition,
        detail: Option<&str>,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let changed = self.execute_with_retry(|conn| {
            conn.execute(
                "UPDATE trades SET disposition = ?2, detail = ?3, updated_at = ?4 WHERE id = ?1",
                params![id.as_str(), disposition.as_str(), detail, now],
            )
        })?;
        if changed == 0 {
            return Err(StoreError::Corrupt(format!("unknown trade {}", id)));
        }
        debug!(trade_id = %id, %disposition, "Disposition updated");
        Ok(())
    }

    /// Marks the trade in flight. `false` when another worker holds it or the
    /// trade is already settled.
    pub fn claim(&self, id: &TradeId) -> Result<bool, StoreError> {
        let now = Utc::now().to_rfc3339();
        let changed = self.execute_with_retry(|conn| {
            conn.execute(
                "UPDATE trades SET in_flight = 1, updated_at = ?2
                 WHERE id = ?1 AND in_flight = 0 AND disposition IN ('queued', 'deferred')",
                params![id.as_str(), now],
            )
        })?;
        Ok(changed == 1)
    }

    pub fn release(&self, id: &TradeId) -> Result<(), StoreError> {
        self.execute_with_retry(|conn| {
            conn.execute(
                "UPDATE trades SET in_flight = 0 WHERE id = ?1",
                params![id.as_str()],
            )
        })?;
        Ok(())
    }

    /// Clears claims left behind by a process that died mid-attempt.
    pub fn reset_in_flight(&self) -> Result<usize, StoreError> {
        self.execute_with_retry(|conn| {
            conn.execute("UPDATE trades SET in_flight = 0 WHERE in_flight = 1", [])
        })
    }

    pub fn append_execution(&self, record: &ExecutionRecord) -> Result<i64, StoreError> {
        let sql = format!(
            "INSERT INTO executions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            EXECUTION_COLUMNS
        );
        let submitted_at = record.submitted_at.to_rfc3339();
        let recorded_at = record.recorded_at.to_rfc3339();
        self.execute_with_retry(|conn| {
            conn.execute(
                &sql,
                params![
                    record.trade_id.as_str(),
                    record.attempt,
                    record.instruction_hash,
                    submitted_at,
                    record.status.as_str(),
                    record.signature,
                    record.last_valid_block_height as i64,
                    record.retry_count,
                    record.detail,
                    recorded_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn latest_record(&self, id: &TradeId) -> Result<Option<ExecutionRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM executions WHERE trade_id = ?1 ORDER BY seq DESC LIMIT 1",
            EXECUTION_COLUMNS
        ))?;
        let row = stmt
            .query_row(params![id.as_str()], read_execution_row)
            .optional()?;
        row.map(ExecutionRow::into_record).transpose()
    }

    pub fn latest_status(&self, id: &TradeId) -> Result<Option<ExecutionStatus>, StoreError> {
        Ok(self.latest_record(id)?.map(|r| r.status))
    }

    /// Number of attempts started for the trade.
    pub fn attempts_made(&self, id: &TradeId) -> Result<u32, StoreError> {
        let conn = self.lock()?;
        let max: Option<u32> = conn.query_row(
            "SELECT MAX(attempt) FROM executions WHERE trade_id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0))
    }

    /// Full audit trail in append order.
    pub fn history(&self, id: &TradeId) -> Result<Vec<ExecutionRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM executions WHERE trade_id = ?1 ORDER BY seq ASC",
            EXECUTION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![id.as_str()], read_execution_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }

    /// Trades whose most recent execution record is still `Pending`.
    pub fn pending_attempts(&self) -> Result<Vec<(Trade, ExecutionRecord)>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT t.payload, e.trade_id, e.attempt, e.instruction_hash, e.submitted_at, e.status,
                    e.signature, e.last_valid_block_height, e.retry_count, e.detail, e.recorded_at
             FROM executions e
             JOIN (SELECT trade_id, MAX(seq) AS seq FROM executions GROUP BY trade_id) last
               ON e.seq = last.seq
             JOIN trades t ON t.id = e.trade_id
             WHERE e.status = 'pending'
             ORDER BY t.rowid ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let payload: String = row.get(0)?;
            Ok((payload, read_execution_columns(row, 1)?))
        })?;
        let mut pending = Vec::new();
        for row in rows {
            let (payload, record) = row?;
            pending.push((serde_json::from_str(&payload)?, record.into_record()?));
        }
        Ok(pending)
    }

    /// Trades with the given disposition in first-seen order.
    pub fn trades_with(&self, disposition: TradeDisposition) -> Result<Vec<Trade>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT payload FROM trades WHERE disposition = ?1 ORDER BY rowid ASC")?;
        let rows = stmt.query_map(params![disposition.as_str()], |row| row.get::<_, String>(0))?;
        let mut trades = Vec::new();
        for payload in rows {
            trades.push(serde_json::from_str(&payload?)?);
        }
        Ok(trades)
    }

    pub fn deferred_trades(&self) -> Result<Vec<Trade>, StoreError> {
        self.trades_with(TradeDisposition::Deferred)
    }
}

/// Busy backoff. On a multi-threaded runtime the worker is handed off first
/// so other tasks keep running while the connection waits.
fn pause(delay: Duration) {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| std::thread::sleep(delay))
        }
        _ => std::thread::sleep(delay),
    }
}

fn is_busy(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(code, _)
            if matches!(code.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn parse_disposition(value: &str) -> Result<TradeDisposition, StoreError> {
    TradeDisposition::parse(value)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown disposition {:?}", value)))
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {:?}: {}", value, e)))
}

struct ExecutionRow {
    trade_id: String,
    attempt: u32,
    instruction_hash: String,
    submitted_at: String,
    status: String,
    signature: Option<String>,
    last_valid_block_height: i64,
    retry_count: u32,
    detail: Option<String>,
    recorded_at: String,
}

impl ExecutionRow {
    fn into_record(self) -> Result<ExecutionRecord, StoreError> {
        let status = ExecutionStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown status {:?}", self.status)))?;
        Ok(ExecutionRecord {
            trade_id: TradeId::new(self.trade_id),
            attempt: self.attempt,
            instruction_hash: self.instruction_hash,
            submitted_at: parse_time(&self.submitted_at)?,
            status,
            signature: self.signature,
            last_valid_block_height: self.last_valid_block_height.max(0) as u64,
            retry_count: self.retry_count,
            detail: self.detail,
            recorded_at: parse_time(&self.recorded_at)?,
        })
    }
}

fn read_execution_row(row: &Row<'_>) -> rusqlite::Result<ExecutionRow> {
    read_execution_columns(row, 0)
}

fn read_execution_columns(row: &Row<'_>, offset: usize) -> rusqlite::Result<ExecutionRow> {
    Ok(ExecutionRow {
        trade_id: row.get(offset)?,
        attempt: row.get(offset + 1)?,
        instruction_hash: row.get(offset + 2)?,
        submitted_at: row.get(offset + 3)?,
        status: row.get(offset + 4)?,
        signature: row.get(offset + 5)?,
        last_valid_block_height: row.get(offset + 6)?,
        retry_count: row.get(offset + 7)?,
        detail: row.get(offset + 8)?,
        recorded_at: row.get(offset + 9)?,
    })
}
