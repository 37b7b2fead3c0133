//! SQLite-backed decision store.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::metainfo::InfoHash;

use super::types::{
    Decision, DecisionKey, DecisionRecord, DecisionStore, IndexerRow, JobStatusRow,
    SearcheeTimestamp, StoreError,
};

/// Versioned schema migrations, applied in order at startup. The database's
/// `user_version` pragma records the last applied entry.
const MIGRATIONS: &[&str] = &[
    // v1: decisions, searchee timestamps, indexers.
    r#"
    CREATE TABLE decision (
        searchee_name TEXT NOT NULL,
        indexer_id TEXT NOT NULL,
        guid TEXT NOT NULL,
        decision TEXT NOT NULL,
        info_hash TEXT,
        first_seen TEXT NOT NULL,
        last_seen TEXT NOT NULL,
        PRIMARY KEY (searchee_name, indexer_id, guid)
    );

    CREATE INDEX idx_decision_info_hash ON decision(info_hash);

    CREATE TABLE searchee_timestamp (
        searchee_name TEXT PRIMARY KEY,
        first_searched TEXT,
        last_searched TEXT
    );

    CREATE INDEX idx_searchee_last_searched ON searchee_timestamp(last_searched);

    CREATE TABLE indexer (
        id TEXT PRIMARY KEY,
        url TEXT NOT NULL,
        active INTEGER NOT NULL DEFAULT 1,
        disabled_until TEXT,
        caps_json TEXT
    );

    CREATE TABLE indexer_category (
        indexer_id TEXT NOT NULL REFERENCES indexer(id) ON DELETE CASCADE,
        category_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        PRIMARY KEY (indexer_id, category_id)
    );
    "#,
    // v2: job status bookkeeping.
    r#"
    CREATE TABLE job_status (
        name TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        status TEXT NOT NULL,
        detail TEXT,
        updated_at TEXT NOT NULL
    );
    "#,
];

/// SQLite decision store. WAL journaling gives concurrent readers with
/// serialized writers; the connection itself is behind a mutex.
pub struct SqliteDecisionStore {
    conn: Mutex<Connection>,
}

impl SqliteDecisionStore {
    /// Open (or create) the database at `path` and apply pending migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        // WAL for concurrent readers; busy timeout instead of immediate
        // SQLITE_BUSY under writer contention. journal_mode reports the
        // resulting mode, so it goes through query_row.
        conn.query_row("PRAGMA journal_mode = wal", [], |_| Ok(()))
            .map_err(db_err)?;
        conn.pragma_update(None, "busy_timeout", 5000).map_err(db_err)?;
        conn.pragma_update(None, "foreign_keys", "on").map_err(db_err)?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.pragma_update(None, "foreign_keys", "on").map_err(db_err)?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &Connection) -> Result<(), StoreError> {
        let current: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(db_err)?;

        for (idx, migration) in MIGRATIONS.iter().enumerate() {
            let version = idx as i64 + 1;
            if version <= current {
                continue;
            }
            conn.execute_batch(&format!("BEGIN;\n{migration}\nPRAGMA user_version = {version};\nCOMMIT;"))
                .map_err(|e| StoreError::Migration {
                    version,
                    message: e.to_string(),
                })?;
            info!(version, "Applied decision store migration");
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow(format!("bad timestamp {raw:?}: {e}")))
}

impl DecisionStore for SqliteDecisionStore {
    fn record_decision(
        &self,
        key: &DecisionKey,
        decision: Decision,
        info_hash: Option<InfoHash>,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.lock()
            .execute(
                r#"
                INSERT INTO decision
                    (searchee_name, indexer_id, guid, decision, info_hash, first_seen, last_seen)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                ON CONFLICT (searchee_name, indexer_id, guid) DO UPDATE SET
                    decision = excluded.decision,
                    info_hash = excluded.info_hash,
                    last_seen = excluded.last_seen
                "#,
                params![
                    key.searchee_name,
                    key.indexer_id,
                    key.guid,
                    decision.as_str(),
                    info_hash.map(|h| h.to_hex()),
                    now,
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn has_decision(&self, key: &DecisionKey) -> Result<Option<DecisionRecord>, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT decision, info_hash, first_seen, last_seen
                 FROM decision
                 WHERE searchee_name = ?1 AND indexer_id = ?2 AND guid = ?3",
                params![key.searchee_name, key.indexer_id, key.guid],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err)?;

        let Some((tag, hash_hex, first_seen, last_seen)) = row else {
            return Ok(None);
        };

        let decision = Decision::from_str_tag(&tag)
            .ok_or_else(|| StoreError::CorruptRow(format!("unknown decision tag {tag:?}")))?;
        let info_hash = hash_hex
            .map(|h| {
                InfoHash::from_hex(&h)
                    .map_err(|_| StoreError::CorruptRow(format!("bad info hash {h:?}")))
            })
            .transpose()?;

        Ok(Some(DecisionRecord {
            key: key.clone(),
            decision,
            info_hash,
            first_seen: parse_ts(&first_seen)?,
            last_seen: parse_ts(&last_seen)?,
        }))
    }

    fn ensure_searchee(&self, searchee_name: &str) -> Result<(), StoreError> {
        self.lock()
            .execute(
                "INSERT OR IGNORE INTO searchee_timestamp (searchee_name) VALUES (?1)",
                params![searchee_name],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn mark_searched(&self, searchee_name: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let at = at.to_rfc3339();
        self.lock()
            .execute(
                r#"
                INSERT INTO searchee_timestamp (searchee_name, first_searched, last_searched)
                VALUES (?1, ?2, ?2)
                ON CONFLICT (searchee_name) DO UPDATE SET
                    first_searched = COALESCE(searchee_timestamp.first_searched, excluded.first_searched),
                    last_searched = excluded.last_searched
                "#,
                params![searchee_name, at],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn searchee_timestamp(
        &self,
        searchee_name: &str,
    ) -> Result<Option<SearcheeTimestamp>, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT first_searched, last_searched FROM searchee_timestamp
                 WHERE searchee_name = ?1",
                params![searchee_name],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err)?;

        row.map(|(first, last)| {
            Ok(SearcheeTimestamp {
                first_searched: first.as_deref().map(parse_ts).transpose()?,
                last_searched: last.as_deref().map(parse_ts).transpose()?,
            })
        })
        .transpose()
    }

    fn next_due_searchee(
        &self,
        now: DateTime<Utc>,
        cadence_secs: u64,
    ) -> Result<Option<String>, StoreError> {
        let cutoff = (now - chrono::Duration::seconds(cadence_secs as i64)).to_rfc3339();
        // NULL last_searched sorts first: never-searched searchees win.
        self.lock()
            .query_row(
                "SELECT searchee_name FROM searchee_timestamp
                 WHERE last_searched IS NULL OR last_searched < ?1
                 ORDER BY last_searched ASC
                 LIMIT 1",
                params![cutoff],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)
    }

    fn upsert_indexer(&self, row: &IndexerRow) -> Result<(), StoreError> {
        self.lock()
            .execute(
                r#"
                INSERT INTO indexer (id, url, active, disabled_until, caps_json)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT (id) DO UPDATE SET
                    url = excluded.url,
                    active = excluded.active,
                    disabled_until = excluded.disabled_until,
                    caps_json = excluded.caps_json
                "#,
                params![
                    row.id,
                    row.url,
                    row.active,
                    row.disabled_until.map(|t| t.to_rfc3339()),
                    row.caps_json,
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn get_indexer(&self, id: &str) -> Result<Option<IndexerRow>, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, url, active, disabled_until, caps_json FROM indexer WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err)?;

        row.map(|(id, url, active, disabled_until, caps_json)| {
            Ok(IndexerRow {
                id,
                url,
                active,
                disabled_until: disabled_until.as_deref().map(parse_ts).transpose()?,
                caps_json,
            })
        })
        .transpose()
    }

    fn replace_indexer_categories(
        &self,
        indexer_id: &str,
        categories: &[(i64, String)],
    ) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute(
            "DELETE FROM indexer_category WHERE indexer_id = ?1",
            params![indexer_id],
        )
        .map_err(db_err)?;
        for (category_id, name) in categories {
            tx.execute(
                "INSERT INTO indexer_category (indexer_id, category_id, name) VALUES (?1, ?2, ?3)",
                params![indexer_id, category_id, name],
            )
            .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)
    }

    fn set_job_status(
        &self,
        name: &str,
        kind: &str,
        status: &str,
        detail: Option<&str>,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.lock()
            .execute(
                r#"
                INSERT INTO job_status (name, kind, status, detail, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT (name) DO UPDATE SET
                    kind = excluded.kind,
                    status = excluded.status,
                    detail = excluded.detail,
                    updated_at = excluded.updated_at
                "#,
                params![name, kind, status, detail, now],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn list_job_status(&self) -> Result<Vec<JobStatusRow>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT name, kind, status, detail, updated_at FROM job_status ORDER BY name")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(db_err)?;

        let mut out = Vec::new();
        for row in rows {
            let (name, kind, status, detail, updated_at) = row.map_err(db_err)?;
            out.push(JobStatusRow {
                name,
                kind,
                status,
                detail,
                updated_at: parse_ts(&updated_at)?,
            });
        }
        Ok(out)
    }
}
