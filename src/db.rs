use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::RunOptions;
use crate::model::{ChurchRecord, ErrorEntry, RunStats};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to serialize session data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to create database directory {path}: {source}")]
    Directory { path: PathBuf, source: io::Error },
    #[error("scraping session {0} does not exist")]
    UnknownSession(i64),
    #[error("store is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub inserted_count: usize,
    pub updated_count: usize,
}

/// Persistence gateway the pipeline talks to. Sessions bracket a run;
/// churches are upserted in one batch.
pub trait Store: Send {
    fn initialize(&mut self) -> Result<(), StoreError>;
    fn start_session(&mut self, options: &RunOptions) -> Result<i64, StoreError>;
    fn save_churches(&mut self, records: &[ChurchRecord]) -> Result<SaveOutcome, StoreError>;
    fn end_session(
        &mut self,
        session_id: i64,
        stats: &RunStats,
        errors: &[ErrorEntry],
    ) -> Result<(), StoreError>;
    /// Terminal failure path: mark the session failed with a message.
    fn fail_session(&mut self, session_id: i64, message: &str) -> Result<(), StoreError>;
    fn close(&mut self) -> Result<(), StoreError>;
}

const CHURCH_COLUMNS: &[&str] = &[
    "name",
    "jurisdiction",
    "address",
    "city",
    "state",
    "zip_code",
    "website",
    "website_validated",
    "contact_email",
    "contact_phone",
    "parish_priest",
    "dean",
    "clergy_contact",
    "establishment_year",
    "patron_saint",
    "feast_day",
    "diocese",
    "deanery",
    "parish_size",
    "languages",
    "services_schedule",
    "facebook_url",
    "instagram_url",
    "youtube_url",
    "data_quality_score",
    "source_url",
    "scraper_version",
    "validation_score",
    "is_validated",
    "validation_flags",
    "validation_date",
    "last_updated",
];

/// Columns an update always overwrites; the rest keep their stored value
/// when the new record has none.
const OVERWRITTEN: &[&str] = &[
    "name",
    "jurisdiction",
    "website_validated",
    "data_quality_score",
    "scraper_version",
    "validation_score",
    "is_validated",
    "validation_flags",
    "last_updated",
];

pub struct SqliteStore {
    conn: Option<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::Directory {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Ok(SqliteStore { conn: Some(conn) })
    }

    /// Open and create any missing tables, so queries work before the
    /// first run.
    pub fn open_initialized(path: &Path) -> Result<Self, StoreError> {
        let mut store = Self::open(path)?;
        store.initialize()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(SqliteStore { conn: Some(conn) })
    }

    fn conn(&self) -> Result<&Connection, StoreError> {
        self.conn.as_ref().ok_or(StoreError::Closed)
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn()?;
        let churches: usize = conn.query_row("SELECT COUNT(*) FROM churches", [], |r| r.get(0))?;
        let validated: usize = conn.query_row(
            "SELECT COUNT(*) FROM churches WHERE is_validated = 1",
            [],
            |r| r.get(0),
        )?;
        let with_website: usize = conn.query_row(
            "SELECT COUNT(*) FROM churches WHERE website IS NOT NULL",
            [],
            |r| r.get(0),
        )?;
        let sessions: usize =
            conn.query_row("SELECT COUNT(*) FROM scraping_sessions", [], |r| r.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT jurisdiction, COUNT(*) FROM churches
             GROUP BY jurisdiction ORDER BY COUNT(*) DESC, jurisdiction",
        )?;
        let by_jurisdiction = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StoreStats {
            churches,
            validated,
            with_website,
            sessions,
            by_jurisdiction,
        })
    }

    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<SessionRow>, StoreError> {
        let mut stmt = self.conn()?.prepare(
            "SELECT id, status, started_at, ended_at, total_churches, error_count, error_message
             FROM scraping_sessions ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok(SessionRow {
                    id: row.get(0)?,
                    status: row.get(1)?,
                    started_at: row.get(2)?,
                    ended_at: row.get(3)?,
                    total_churches: row.get(4)?,
                    error_count: row.get(5)?,
                    error_message: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn find_existing(conn: &Connection, rec: &ChurchRecord) -> Result<Option<i64>, StoreError> {
        let id = conn
            .query_row(
                "SELECT id FROM churches
                 WHERE (lower(name) = lower(?1)
                        AND (lower(city) = lower(?2)
                             OR ((city IS NULL OR ?2 IS NULL) AND state = ?3)))
                    OR (?4 IS NOT NULL AND website = ?4)
                    OR (?5 IS NOT NULL AND contact_phone = ?5)
                 ORDER BY id LIMIT 1",
                params![rec.name, rec.city, rec.state, rec.website, rec.contact_phone],
                |r| r.get(0),
            )
            .optional()?;
        Ok(id)
    }
}

pub struct StoreStats {
    pub churches: usize,
    pub validated: usize,
    pub with_website: usize,
    pub sessions: usize,
    pub by_jurisdiction: Vec<(String, usize)>,
}

pub struct SessionRow {
    pub id: i64,
    pub status: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub total_churches: Option<i64>,
    pub error_count: Option<i64>,
    pub error_message: Option<String>,
}

fn insert_sql() -> String {
    let placeholders: Vec<String> = CHURCH_COLUMNS.iter().map(|c| format!(":{c}")).collect();
    format!(
        "INSERT INTO churches ({}) VALUES ({})",
        CHURCH_COLUMNS.join(", "),
        placeholders.join(", ")
    )
}

fn update_sql() -> String {
    let sets: Vec<String> = CHURCH_COLUMNS
        .iter()
        .map(|c| {
            if OVERWRITTEN.contains(c) {
                format!("{c} = :{c}")
            } else {
                format!("{c} = COALESCE(:{c}, {c})")
            }
        })
        .collect();
    format!(
        "UPDATE churches SET {}, updated_at = datetime('now') WHERE id = :id",
        sets.join(", ")
    )
}

impl Store for SqliteStore {
    fn initialize(&mut self) -> Result<(), StoreError> {
        self.conn()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS scraping_sessions (
                id             INTEGER PRIMARY KEY,
                status         TEXT NOT NULL CHECK(status IN ('running','completed','failed')),
                options        TEXT NOT NULL,
                started_at     TEXT NOT NULL,
                ended_at       TEXT,
                statistics     TEXT,
                total_churches INTEGER,
                error_count    INTEGER,
                error_message  TEXT
            );

            CREATE TABLE IF NOT EXISTS scraping_errors (
                id           INTEGER PRIMARY KEY,
                session_id   INTEGER NOT NULL REFERENCES scraping_sessions(id),
                kind         TEXT NOT NULL,
                jurisdiction TEXT,
                url          TEXT,
                error        TEXT NOT NULL,
                occurred_at  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_errors_session ON scraping_errors(session_id);

            CREATE TABLE IF NOT EXISTS churches (
                id                 INTEGER PRIMARY KEY,
                name               TEXT NOT NULL,
                jurisdiction       TEXT NOT NULL,
                address            TEXT,
                city               TEXT,
                state              TEXT,
                zip_code           TEXT,
                website            TEXT,
                website_validated  BOOLEAN NOT NULL DEFAULT 0,
                contact_email      TEXT,
                contact_phone      TEXT,
                parish_priest      TEXT,
                dean               TEXT,
                clergy_contact     TEXT,
                establishment_year INTEGER,
                patron_saint       TEXT,
                feast_day          TEXT,
                diocese            TEXT,
                deanery            TEXT,
                parish_size        TEXT,
                languages          TEXT,
                services_schedule  TEXT,
                facebook_url       TEXT,
                instagram_url      TEXT,
                youtube_url        TEXT,
                data_quality_score INTEGER NOT NULL DEFAULT 0,
                source_url         TEXT,
                scraper_version    TEXT,
                validation_score   INTEGER NOT NULL DEFAULT 0,
                is_validated       BOOLEAN NOT NULL DEFAULT 0,
                validation_flags   TEXT NOT NULL DEFAULT '[]',
                validation_date    TEXT,
                last_updated       TEXT,
                created_at         TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at         TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_churches_name ON churches(lower(name));
            CREATE INDEX IF NOT EXISTS idx_churches_website ON churches(website);
            CREATE INDEX IF NOT EXISTS idx_churches_phone ON churches(contact_phone);
            CREATE INDEX IF NOT EXISTS idx_churches_jurisdiction ON churches(jurisdiction);
            ",
        )?;
        Ok(())
    }

    fn start_session(&mut self, options: &RunOptions) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO scraping_sessions (status, options, started_at) VALUES ('running', ?1, ?2)",
            params![serde_json::to_string(options)?, Utc::now().to_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();
        info!(session_id = id, "Scraping session started");
        Ok(id)
    }

    fn save_churches(&mut self, records: &[ChurchRecord]) -> Result<SaveOutcome, StoreError> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let mut outcome = SaveOutcome::default();

        let tx = conn.unchecked_transaction()?;
        {
            let mut insert = tx.prepare(&insert_sql())?;
            let mut update = tx.prepare(&update_sql())?;
            for rec in records {
                let flags = serde_json::to_string(&rec.validation_flags)?;
                let validation_date = rec.validation_date.map(|d| d.to_rfc3339());
                let last_updated = rec
                    .last_updated
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_else(|| now.clone());
                let existing = Self::find_existing(&tx, rec)?;

                let mut bound: Vec<(&str, &dyn ToSql)> = vec![
                    (":name", &rec.name),
                    (":jurisdiction", &rec.jurisdiction),
                    (":address", &rec.address),
                    (":city", &rec.city),
                    (":state", &rec.state),
                    (":zip_code", &rec.zip_code),
                    (":website", &rec.website),
                    (":website_validated", &rec.website_validated),
                    (":contact_email", &rec.contact_email),
                    (":contact_phone", &rec.contact_phone),
                    (":parish_priest", &rec.parish_priest),
                    (":dean", &rec.dean),
                    (":clergy_contact", &rec.clergy_contact),
                    (":establishment_year", &rec.establishment_year),
                    (":patron_saint", &rec.patron_saint),
                    (":feast_day", &rec.feast_day),
                    (":diocese", &rec.diocese),
                    (":deanery", &rec.deanery),
                    (":parish_size", &rec.parish_size),
                    (":languages", &rec.languages),
                    (":services_schedule", &rec.services_schedule),
                    (":facebook_url", &rec.facebook_url),
                    (":instagram_url", &rec.instagram_url),
                    (":youtube_url", &rec.youtube_url),
                    (":data_quality_score", &rec.data_quality_score),
                    (":source_url", &rec.source_url),
                    (":scraper_version", &rec.scraper_version),
                    (":validation_score", &rec.validation_score),
                    (":is_validated", &rec.is_validated),
                    (":validation_flags", &flags),
                    (":validation_date", &validation_date),
                    (":last_updated", &last_updated),
                ];

                match &existing {
                    Some(id) => {
                        bound.push((":id", id));
                        update.execute(bound.as_slice())?;
                        outcome.updated_count += 1;
                    }
                    None => {
                        insert.execute(bound.as_slice())?;
                        outcome.inserted_count += 1;
                    }
                }
            }
        }
        tx.commit()?;

        info!(
            inserted = outcome.inserted_count,
            updated = outcome.updated_count,
            "Churches saved"
        );
        Ok(outcome)
    }

    fn end_session(
        &mut self,
        session_id: i64,
        stats: &RunStats,
        errors: &[ErrorEntry],
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let statistics = serde_json::to_string(stats)?;

        let tx = conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE scraping_sessions
             SET status = 'completed', ended_at = ?2, statistics = ?3,
                 total_churches = ?4, error_count = ?5
             WHERE id = ?1",
            params![
                session_id,
                Utc::now().to_rfc3339(),
                statistics,
                stats.total_churches as i64,
                errors.len() as i64
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::UnknownSession(session_id));
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO scraping_errors
                 (session_id, kind, jurisdiction, url, error, occurred_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for e in errors {
                let kind = serde_json::to_value(e.kind)?;
                stmt.execute(params![
                    session_id,
                    kind.as_str().unwrap_or_default(),
                    e.jurisdiction,
                    e.url,
                    e.error,
                    e.timestamp.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        debug!(session_id, errors = errors.len(), "Scraping session closed");
        Ok(())
    }

    fn fail_session(&mut self, session_id: i64, message: &str) -> Result<(), StoreError> {
        let changed = self.conn()?.execute(
            "UPDATE scraping_sessions
             SET status = 'failed', ended_at = ?2, error_message = ?3
             WHERE id = ?1",
            params![session_id, Utc::now().to_rfc3339(), message],
        )?;
        if changed == 0 {
            return Err(StoreError::UnknownSession(session_id));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
        }
        Ok(())
    }
}
