use super::schema::CHART_VERSIONED_SCHEMAS;
use super::{BatchLoader, ChartStore, ExtractionRun};
use crate::chart::{ChartDate, ChartEntry, DateRange};
use crate::pipeline::RunStatus;
use crate::sqlite_persistence::{read_schema_version, BASE_DB_VERSION};
use anyhow::{anyhow, bail, Context, Result};
use rusqlite::{params, types::Type, Connection};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

const UPSERT_ENTRY_SQL: &str = "INSERT INTO chart_entries
        (date, position, song, artists, main_artists, featured_artists)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
    ON CONFLICT(date, position) DO UPDATE SET
        song = excluded.song,
        artists = excluded.artists,
        main_artists = excluded.main_artists,
        featured_artists = excluded.featured_artists";

pub struct SqliteChartStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteChartStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();
        let conn = Connection::open(path).context("Failed to open chart database")?;
        if is_new_db {
            info!("Creating new chart database at {:?}", path);
        }
        Self::from_connection(conn, is_new_db)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn, true)
    }

    fn from_connection(mut conn: Connection, is_new_db: bool) -> Result<Self> {
        let latest = CHART_VERSIONED_SCHEMAS
            .last()
            .context("No chart schema versions defined")?;

        if is_new_db {
            latest.create(&conn)?;
        } else {
            let db_version = read_schema_version(&conn)?;
            if db_version < 1 {
                bail!(
                    "Chart database version {} is invalid (expected >= 1)",
                    db_version
                );
            }

            let schema = CHART_VERSIONED_SCHEMAS
                .iter()
                .find(|s| s.version as i64 == db_version)
                .with_context(|| format!("Unknown chart database version {}", db_version))?;
            schema.validate(&conn).with_context(|| {
                format!(
                    "Chart database schema validation failed for version {}",
                    db_version
                )
            })?;

            if schema.version < latest.version {
                info!(
                    "Migrating chart database from version {} to {}",
                    schema.version, latest.version
                );
                Self::migrate(&mut conn, schema.version)?;
            }
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate(conn: &mut Connection, from_version: usize) -> Result<()> {
        let tx = conn.transaction()?;
        let mut current = from_version;
        for schema in CHART_VERSIONED_SCHEMAS.iter().filter(|s| s.version > from_version) {
            if let Some(migration) = schema.migration {
                migration(&tx).with_context(|| {
                    format!("Failed to run migration to version {}", schema.version)
                })?;
            }
            current = schema.version;
        }
        tx.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + current),
            [],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Chart database lock poisoned"))
    }

    fn json_list(
        row: &rusqlite::Row,
        idx: usize,
    ) -> rusqlite::Result<Vec<String>> {
        let raw: String = row.get(idx)?;
        serde_json::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<ChartEntry> {
        let date_str: String = row.get(0)?;
        let date = ChartDate::parse_iso(&date_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                Type::Text,
                format!("not a chart date: {}", date_str).into(),
            )
        })?;
        Ok(ChartEntry {
            date,
            position: row.get(1)?,
            title: row.get(2)?,
            main_artists: Self::json_list(row, 3)?,
            featured_artists: Self::json_list(row, 4)?,
        })
    }

    fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<ExtractionRun> {
        let parse_date = |idx: usize| -> rusqlite::Result<ChartDate> {
            let s: String = row.get(idx)?;
            ChartDate::parse_iso(&s).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    Type::Text,
                    format!("not a chart date: {}", s).into(),
                )
            })
        };
        let status: String = row.get(8)?;
        let elapsed_ms: i64 = row.get(10)?;

        Ok(ExtractionRun {
            id: Some(row.get(0)?),
            chart_name: row.get(1)?,
            start_date: parse_date(2)?,
            end_date: parse_date(3)?,
            requested: row.get::<_, i64>(4)? as usize,
            succeeded: row.get::<_, i64>(5)? as usize,
            skipped: row.get::<_, i64>(6)? as usize,
            persisted: row.get::<_, i64>(7)? as usize,
            status: RunStatus::parse(&status).unwrap_or(RunStatus::Failed),
            error_message: row.get(9)?,
            elapsed: Duration::from_millis(elapsed_ms.max(0) as u64),
        })
    }
}

impl BatchLoader for SqliteChartStore {
    fn load_batch(&self, entries: &[ChartEntry]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare_cached(UPSERT_ENTRY_SQL)?;
            for entry in entries {
                written += stmt.execute(params![
                    entry.date.to_iso(),
                    entry.position,
                    entry.title,
                    serde_json::to_string(&entry.artists())?,
                    serde_json::to_string(&entry.main_artists)?,
                    serde_json::to_string(&entry.featured_artists)?,
                ])?;
            }
        }
        tx.commit().context("Failed to commit chart batch")?;
        Ok(written)
    }
}

impl ChartStore for SqliteChartStore {
    fn latest_chart_date(&self) -> Result<Option<ChartDate>> {
        let conn = self.conn()?;
        let latest: Option<String> =
            conn.query_row("SELECT MAX(date) FROM chart_entries", [], |row| row.get(0))?;
        latest
            .map(|s| {
                ChartDate::parse_iso(&s).with_context(|| format!("Stored date {} is not a chart date", s))
            })
            .transpose()
    }

    fn stored_dates(&self, range: &DateRange) -> Result<BTreeSet<ChartDate>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT date FROM chart_entries WHERE date BETWEEN ?1 AND ?2",
        )?;
        let raw = stmt
            .query_map(
                params![range.start().to_iso(), range.end().to_iso()],
                |row| row.get::<_, String>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        raw.iter()
            .map(|s| {
                ChartDate::parse_iso(s).with_context(|| format!("Stored date {} is not a chart date", s))
            })
            .collect()
    }

    fn count_entries(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chart_entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn get_chart(&self, date: ChartDate) -> Result<Vec<ChartEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT date, position, song, main_artists, featured_artists
             FROM chart_entries WHERE date = ?1 ORDER BY position",
        )?;
        let entries = stmt
            .query_map(params![date.to_iso()], Self::row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn record_run(&self, run: &ExtractionRun) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO extraction_runs
                (chart_name, start_date, end_date, requested, succeeded, skipped, persisted,
                 status, error_message, elapsed_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                run.chart_name,
                run.start_date.to_iso(),
                run.end_date.to_iso(),
                run.requested as i64,
                run.succeeded as i64,
                run.skipped as i64,
                run.persisted as i64,
                run.status.as_str(),
                run.error_message,
                run.elapsed.as_millis() as i64,
            ],
        )
        .context("Failed to record extraction run")?;
        Ok(conn.last_insert_rowid())
    }

    fn last_runs(&self, limit: usize) -> Result<Vec<ExtractionRun>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, chart_name, start_date, end_date, requested, succeeded, skipped,
                    persisted, status, error_message, elapsed_ms
             FROM extraction_runs ORDER BY id DESC LIMIT ?1",
        )?;
        let runs = stmt
            .query_map(params![limit as i64], Self::row_to_run)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }
}
