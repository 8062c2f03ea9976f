//! Embedded relational evidence store
//!
//! SQLite via `rusqlite`, three tables keyed by UUID:
//!
//! ```text
//! evidence_items   (evidence_id PK, type, timestamp, status, ..., content JSON)
//! custody_events   (evidence_id, sequence) PK, append-only
//! audit_packages   (package_id PK, created_at, retention_until, package JSON)
//! ```
//!
//! Every write runs in a transaction. A failed write is retried once after a
//! short backoff; a second failure surfaces as [`EvidenceError::Storage`].

use crate::evidence::types::{
    AuditPackage, CustodyEvent, EvidenceItem, EvidenceType, VerificationStatus,
};
use crate::evidence::EvidenceError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS evidence_items (
    evidence_id TEXT PRIMARY KEY,
    evidence_type TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    timestamp_epoch INTEGER NOT NULL,
    source_location TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    content TEXT NOT NULL,
    metadata TEXT NOT NULL,
    verification_status TEXT NOT NULL,
    digital_signature TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS custody_events (
    evidence_id TEXT NOT NULL REFERENCES evidence_items(evidence_id) ON DELETE CASCADE,
    sequence INTEGER NOT NULL,
    action TEXT NOT NULL,
    actor TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    details TEXT NOT NULL,
    previous_hash TEXT,
    entry_hash TEXT NOT NULL,
    PRIMARY KEY (evidence_id, sequence)
);
CREATE TABLE IF NOT EXISTS audit_packages (
    package_id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    retention_until_epoch INTEGER NOT NULL,
    package_hash TEXT NOT NULL,
    package TEXT NOT NULL
);
"#;

/// Row counts per table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub evidence_items: usize,
    pub custody_events: usize,
    pub audit_packages: usize,
}

/// Rows removed by a retention purge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PurgeStats {
    pub evidence_items: usize,
    pub audit_packages: usize,
}

pub struct EvidenceStore {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
    retry_backoff: Duration,
}

impl EvidenceStore {
    /// Open (creating if needed) a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EvidenceError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(storage_error)?;
        Self::init(conn, Some(path))
    }

    pub fn in_memory() -> Result<Self, EvidenceError> {
        let conn = Connection::open_in_memory().map_err(storage_error)?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, EvidenceError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .and_then(|_| conn.execute_batch(SCHEMA))
            .map_err(storage_error)?;
        tracing::debug!(path = ?path, "evidence store ready");
        Ok(Self {
            path,
            conn: Mutex::new(conn),
            retry_backoff: Duration::from_millis(100),
        })
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Run a write once, retry once after the backoff, then give up
    fn write<F>(&self, operation: &str, mut f: F) -> Result<(), EvidenceError>
    where
        F: FnMut(&mut Connection) -> rusqlite::Result<()>,
    {
        let first = {
            let mut conn = self.lock();
            f(&mut conn)
        };
        let Err(err) = first else {
            return Ok(());
        };

        tracing::warn!(operation, error = %err, "evidence store write failed, retrying");
        std::thread::sleep(self.retry_backoff);

        let mut conn = self.lock();
        f(&mut conn).map_err(|e| {
            EvidenceError::Storage(format!("{} failed after retry: {}", operation, e))
        })
    }

    /// Insert a new item with its custody events; existing rows are kept
    pub fn insert_item(&self, item: &EvidenceItem) -> Result<(), EvidenceError> {
        let content = serde_json::to_string(&item.content)?;
        let metadata = serde_json::to_string(&item.metadata)?;
        let id = item.evidence_id.to_string();

        self.write("insert_item", |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO evidence_items (evidence_id, evidence_type, timestamp, \
                 timestamp_epoch, source_location, content_hash, content, metadata, \
                 verification_status, digital_signature) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id,
                    item.evidence_type.as_str(),
                    item.timestamp.to_rfc3339(),
                    item.timestamp.timestamp(),
                    item.source_location,
                    item.content_hash,
                    content,
                    metadata,
                    item.verification_status.as_str(),
                    item.digital_signature,
                ],
            )?;
            for event in &item.chain_of_custody {
                insert_event(&tx, INSERT_EVENT_IF_ABSENT, &id, event)?;
            }
            tx.commit()
        })
    }

    /// Set the status and append one custody event in a single transaction
    ///
    /// The event must extend the stored chain; reusing a stored sequence
    /// number is a storage error.
    pub fn record_verification(
        &self,
        evidence_id: Uuid,
        status: VerificationStatus,
        event: &CustodyEvent,
    ) -> Result<(), EvidenceError> {
        let id = evidence_id.to_string();
        self.write("record_verification", |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE evidence_items SET verification_status = ?1 WHERE evidence_id = ?2",
                params![status.as_str(), id],
            )?;
            insert_event(&tx, INSERT_EVENT, &id, event)?;
            tx.commit()
        })
    }

    pub fn load_item(&self, evidence_id: Uuid) -> Result<Option<EvidenceItem>, EvidenceError> {
        let conn = self.lock();
        let id = evidence_id.to_string();

        let row = conn
            .query_row(
                "SELECT evidence_type, timestamp, source_location, content_hash, content, \
                 metadata, verification_status, digital_signature \
                 FROM evidence_items WHERE evidence_id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()
            .map_err(storage_error)?;

        let Some((kind, timestamp, source_location, content_hash, content, metadata, status, signature)) =
            row
        else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare(
                "SELECT sequence, action, actor, timestamp, details, previous_hash, entry_hash \
                 FROM custody_events WHERE evidence_id = ?1 ORDER BY sequence",
            )
            .map_err(storage_error)?;
        let events = stmt
            .query_map(params![id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(storage_error)?;

        let chain_of_custody = events
            .into_iter()
            .map(
                |(sequence, action, actor, ts, details, previous_hash, entry_hash)| {
                    Ok(CustodyEvent {
                        sequence: sequence as u64,
                        action,
                        actor,
                        timestamp: parse_timestamp(&ts)?,
                        details,
                        previous_hash,
                        entry_hash,
                    })
                },
            )
            .collect::<Result<Vec<_>, EvidenceError>>()?;

        Ok(Some(EvidenceItem {
            evidence_id,
            evidence_type: EvidenceType::parse(&kind)
                .ok_or_else(|| EvidenceError::Storage(format!("unknown evidence type '{}'", kind)))?,
            timestamp: parse_timestamp(&timestamp)?,
            source_location,
            content_hash,
            content: serde_json::from_str(&content)?,
            metadata: serde_json::from_str(&metadata)?,
            chain_of_custody,
            verification_status: VerificationStatus::parse(&status)
                .ok_or_else(|| EvidenceError::Storage(format!("unknown status '{}'", status)))?,
            digital_signature: signature,
        }))
    }

    pub fn insert_package(&self, package: &AuditPackage) -> Result<(), EvidenceError> {
        let body = serde_json::to_string(package)?;
        let id = package.package_id.to_string();
        self.write("insert_package", |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR REPLACE INTO audit_packages \
                 (package_id, created_at, retention_until_epoch, package_hash, package) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    package.created_at.to_rfc3339(),
                    package.retention_until.timestamp(),
                    package.package_hash,
                    body,
                ],
            )?;
            tx.commit()
        })
    }

    pub fn load_package(&self, package_id: Uuid) -> Result<Option<AuditPackage>, EvidenceError> {
        let body: Option<String> = self
            .lock()
            .query_row(
                "SELECT package FROM audit_packages WHERE package_id = ?1",
                params![package_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_error)?;
        body.map(|b| serde_json::from_str(&b).map_err(EvidenceError::from))
            .transpose()
    }

    /// Drop packages past `retention_until` and items older than the retention window
    pub fn purge_expired(
        &self,
        now: DateTime<Utc>,
        retention_days: i64,
    ) -> Result<PurgeStats, EvidenceError> {
        let item_cutoff = (now - ChronoDuration::days(retention_days)).timestamp();
        let package_cutoff = now.timestamp();
        let mut stats = PurgeStats::default();

        self.write("purge_expired", |conn| {
            let tx = conn.transaction()?;
            let packages = tx.execute(
                "DELETE FROM audit_packages WHERE retention_until_epoch < ?1",
                params![package_cutoff],
            )?;
            tx.execute(
                "DELETE FROM custody_events WHERE evidence_id IN \
                 (SELECT evidence_id FROM evidence_items WHERE timestamp_epoch < ?1)",
                params![item_cutoff],
            )?;
            let items = tx.execute(
                "DELETE FROM evidence_items WHERE timestamp_epoch < ?1",
                params![item_cutoff],
            )?;
            tx.commit()?;
            stats = PurgeStats {
                evidence_items: items,
                audit_packages: packages,
            };
            Ok(())
        })?;

        if stats.evidence_items + stats.audit_packages > 0 {
            tracing::info!(
                items = stats.evidence_items,
                packages = stats.audit_packages,
                "purged expired evidence"
            );
        }
        Ok(stats)
    }

    pub fn stats(&self) -> Result<StoreStats, EvidenceError> {
        let conn = self.lock();
        let count = |table: &str| -> Result<usize, EvidenceError> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as usize)
            .map_err(storage_error)
        };
        Ok(StoreStats {
            evidence_items: count("evidence_items")?,
            custody_events: count("custody_events")?,
            audit_packages: count("audit_packages")?,
        })
    }
}

const INSERT_EVENT: &str = "INSERT INTO custody_events (evidence_id, sequence, action, actor, \
     timestamp, details, previous_hash, entry_hash) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

const INSERT_EVENT_IF_ABSENT: &str = "INSERT OR IGNORE INTO custody_events (evidence_id, sequence, \
     action, actor, timestamp, details, previous_hash, entry_hash) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

fn insert_event(
    tx: &rusqlite::Transaction<'_>,
    sql: &str,
    id: &str,
    event: &CustodyEvent,
) -> rusqlite::Result<()> {
    tx.execute(
        sql,
        params![
            id,
            event.sequence as i64,
            event.action,
            event.actor,
            event.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
            event.details,
            event.previous_hash,
            event.entry_hash,
        ],
    )?;
    Ok(())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, EvidenceError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| EvidenceError::Storage(format!("bad timestamp '{}': {}", s, e)))
}

fn storage_error(err: rusqlite::Error) -> EvidenceError {
    EvidenceError::Storage(err.to_string())
}
